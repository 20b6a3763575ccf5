//! Invocation of the provisioned micromamba executable
//!
//! Builds argument vectors for `create` and `info` and runs the binary as
//! a child process. A non-zero exit is a fatal build failure with the
//! captured stderr surfaced in full; there is no retry and no
//! partial-success interpretation.

use crate::error::{SetupError, SetupResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Handle on the installed micromamba binary plus the flags every
/// invocation shares.
#[derive(Debug, Clone)]
pub struct Micromamba {
    bin_path: PathBuf,
    log_level: Option<String>,
    condarc_file: Option<PathBuf>,
}

/// Inputs for a `create` invocation, passed through verbatim
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub root_prefix: PathBuf,
    pub environment_file: Option<PathBuf>,
    /// Only set when the caller named the environment explicitly; when the
    /// name comes from the environment file micromamba reads it itself.
    pub explicit_name: Option<String>,
    /// Extra arguments forwarded verbatim, not validated
    pub extra_args: Vec<String>,
}

impl CreateRequest {
    /// The argument vector: `create -y -r <root> [-f <file>] [-n <name>] [<extra>...]`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "-y".to_string(),
            "-r".to_string(),
            self.root_prefix.display().to_string(),
        ];
        if let Some(file) = &self.environment_file {
            args.push("-f".to_string());
            args.push(file.display().to_string());
        }
        if let Some(name) = &self.explicit_name {
            args.push("-n".to_string());
            args.push(name.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

impl Micromamba {
    pub fn new(bin_path: PathBuf, log_level: Option<String>, condarc_file: Option<PathBuf>) -> Self {
        Self {
            bin_path,
            log_level,
            condarc_file,
        }
    }

    /// Run `create` for the given request
    pub async fn create(&self, request: &CreateRequest) -> SetupResult<()> {
        self.run(&request.to_args()).await
    }

    /// Run `info -r <root> [-n <name>]` and log the report
    pub async fn info(&self, root_prefix: &Path, name: Option<&str>) -> SetupResult<()> {
        let mut args = vec![
            "info".to_string(),
            "-r".to_string(),
            root_prefix.display().to_string(),
        ];
        if let Some(name) = name {
            args.push("-n".to_string());
            args.push(name.to_string());
        }
        self.run(&args).await
    }

    /// Run `shell init -s <flavor> -r <root>` to install the hook for a
    /// shell flavor
    pub async fn shell_init(&self, flavor: &str, root_prefix: &Path) -> SetupResult<()> {
        let args = vec![
            "shell".to_string(),
            "init".to_string(),
            "-s".to_string(),
            flavor.to_string(),
            "-r".to_string(),
            root_prefix.display().to_string(),
        ];
        self.run(&args).await
    }

    /// Spawn the binary, wait for exit, and surface diagnostics.
    ///
    /// stdout is logged; stderr is carried in the error on failure.
    async fn run(&self, args: &[String]) -> SetupResult<()> {
        let mut full_args = args.to_vec();
        if let Some(level) = &self.log_level {
            full_args.push("--log-level".to_string());
            full_args.push(level.clone());
        }
        if let Some(rc) = &self.condarc_file {
            full_args.push("--rc-file".to_string());
            full_args.push(rc.display().to_string());
        }

        let rendered = format!("{} {}", self.bin_path.display(), full_args.join(" "));
        debug!("Running: {}", rendered);

        let output = Command::new(&self.bin_path)
            .args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SetupError::CommandSpawn {
                command: rendered.clone(),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!("{}", stdout.trim_end());
        }

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        match output.status.code() {
            Some(code) => Err(SetupError::Build {
                command: rendered,
                code,
                stderr,
            }),
            None => Err(SetupError::BuildSignaled { command: rendered }),
        }
    }
}

/// Where a named environment is materialized under the root prefix
pub fn environment_path(root_prefix: &Path, name: &str) -> PathBuf {
    root_prefix.join("envs").join(name)
}

/// [`EnvironmentBuilder`] backed by `micromamba create`
pub struct MicromambaBuilder {
    mamba: Micromamba,
    request: CreateRequest,
}

impl MicromambaBuilder {
    pub fn new(mamba: Micromamba, request: CreateRequest) -> Self {
        Self { mamba, request }
    }
}

#[async_trait::async_trait]
impl crate::orchestrator::EnvironmentBuilder for MicromambaBuilder {
    async fn build(&self, name: &str) -> SetupResult<()> {
        debug!("Building environment `{}`", name);
        self.mamba.create(&self.request).await
    }
}
