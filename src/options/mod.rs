//! Resolved run options
//!
//! Merges CLI flags, an optional TOML config file, and built-in defaults
//! into one immutable [`Options`] value read once at process start.
//! Precedence: CLI over file over defaults.

pub mod schema;

pub use schema::FileConfig;

use crate::cli::args::ProvisionArgs;
use crate::download::MicromambaSource;
use crate::error::{SetupError, SetupResult};
use crate::shell::ShellFlavor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything a provisioning run needs, fully defaulted
#[derive(Debug, Clone)]
pub struct Options {
    pub environment_name: Option<String>,
    pub environment_file: Option<PathBuf>,
    pub create_args: Vec<String>,
    pub init_shells: Vec<ShellFlavor>,
    pub micromamba_source: MicromambaSource,
    pub log_level: Option<String>,

    pub home: PathBuf,
    pub root_prefix: PathBuf,
    pub bin_path: PathBuf,
    pub condarc_file: PathBuf,
    /// Inline condarc contents; `None` writes the conda-forge default
    pub condarc_contents: Option<String>,
    /// Whether we own the condarc file (off when the caller points at
    /// their own)
    pub write_condarc: bool,

    pub cache_dir: PathBuf,
    pub cache_environment: bool,
    pub cache_downloads: bool,

    /// Whether to create an environment at all; off when neither a name
    /// nor a file is given, or when explicitly disabled
    pub create_environment: bool,
    pub generate_run_shell: bool,
    pub run_shell_path: PathBuf,

    pub pipeline_env_file: Option<PathBuf>,
    pub state_file: PathBuf,
}

impl Options {
    /// Merge CLI arguments with an optional config file
    pub fn resolve(args: &ProvisionArgs, file: Option<FileConfig>) -> SetupResult<Self> {
        let file = file.unwrap_or_default();
        let home = dirs::home_dir().ok_or_else(|| {
            SetupError::Internal("cannot determine home directory".to_string())
        })?;

        let root_prefix = args
            .root_prefix
            .clone()
            .or(file.paths.root_prefix)
            .unwrap_or_else(|| home.join("micromamba"));
        let bin_path = args
            .bin_path
            .clone()
            .or(file.paths.bin_path)
            .unwrap_or_else(|| home.join("micromamba-bin").join("micromamba"));

        // A caller-supplied condarc is theirs; we only verify it exists.
        // Inline contents always mean we write.
        let write_condarc =
            args.condarc.is_some() || (args.condarc_file.is_none() && file.paths.condarc_file.is_none());
        let condarc_file = args
            .condarc_file
            .clone()
            .or(file.paths.condarc_file)
            .unwrap_or_else(|| root_prefix.join(".condarc"));

        let micromamba_source = match (&args.micromamba_url, &args.micromamba_version) {
            (Some(url), _) => MicromambaSource::Url(url.clone()),
            (None, Some(version)) => MicromambaSource::Version(version.clone()),
            (None, None) => match (file.micromamba.url, file.micromamba.version) {
                (Some(url), _) => MicromambaSource::Url(url),
                (None, Some(version)) => MicromambaSource::Version(version),
                (None, None) => MicromambaSource::Version("latest".to_string()),
            },
        };

        let cache_dir = args
            .cache_dir
            .clone()
            .or(file.cache.dir)
            .unwrap_or_else(|| {
                dirs::cache_dir()
                    .unwrap_or_else(|| home.join(".cache"))
                    .join("mamba-setup")
            });

        let state_file = args
            .state_file
            .clone()
            .or(file.paths.state_file)
            .unwrap_or_else(|| default_state_file(&home));

        let create_environment = !args.no_create
            && (args.environment_name.is_some() || args.environment_file.is_some());
        if args.no_create && args.generate_run_shell {
            debug!("Run shell generation requires an environment; skipping");
        }

        Ok(Self {
            environment_name: args.environment_name.clone(),
            environment_file: args.environment_file.clone(),
            create_args: args.create_args.clone(),
            init_shells: args.init_shell.clone(),
            micromamba_source,
            log_level: args.log_level.clone().or(file.micromamba.log_level),
            home,
            root_prefix,
            bin_path,
            condarc_file,
            condarc_contents: args.condarc.clone(),
            write_condarc,
            cache_dir,
            cache_environment: !args.no_cache_environment,
            cache_downloads: !args.no_cache_downloads,
            create_environment,
            generate_run_shell: args.generate_run_shell && create_environment,
            run_shell_path: args
                .run_shell_path
                .clone()
                .or(file.paths.run_shell)
                .unwrap_or_else(|| PathBuf::from("/usr/local/bin/micromamba-run-shell")),
            pipeline_env_file: args.pipeline_env_file.clone(),
            state_file,
        })
    }
}

/// Default location of the phase state file
pub fn default_state_file(home: &Path) -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| home.join(".local").join("state"))
        .join("mamba-setup")
        .join("phase.json")
}

/// Load a config file if a path was given
pub async fn load_file_config(path: Option<&Path>) -> SetupResult<Option<FileConfig>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SetupError::io(format!("reading config from {}", path.display()), e))?;
    Ok(Some(toml::from_str(&contents)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::ProvisionArgs;
    use clap::Parser;
    use serial_test::serial;

    /// Argument parsing reads MAMBA_* env vars; clear them so host state
    /// never leaks into assertions.
    fn parse(argv: &[&str]) -> ProvisionArgs {
        for var in ["MAMBA_ROOT_PREFIX", "MAMBA_SETUP_CACHE_DIR", "GITHUB_ENV"] {
            std::env::remove_var(var);
        }
        let mut full = vec!["provision"];
        full.extend_from_slice(argv);
        ProvisionArgs::parse_from(full)
    }

    #[test]
    #[serial]
    fn defaults_without_flags() {
        let options = Options::resolve(&parse(&[]), None).unwrap();
        assert!(options.root_prefix.ends_with("micromamba"));
        assert!(options.bin_path.ends_with("micromamba-bin/micromamba"));
        assert_eq!(options.condarc_file, options.root_prefix.join(".condarc"));
        assert!(options.write_condarc);
        assert!(options.cache_environment);
        assert!(options.cache_downloads);
        assert!(!options.create_environment);
        assert_eq!(
            options.micromamba_source,
            MicromambaSource::Version("latest".into())
        );
    }

    #[test]
    #[serial]
    fn name_enables_creation() {
        let options = Options::resolve(&parse(&["-n", "testenv"]), None).unwrap();
        assert!(options.create_environment);
        assert_eq!(options.environment_name.as_deref(), Some("testenv"));
    }

    #[test]
    #[serial]
    fn no_create_wins() {
        let options = Options::resolve(&parse(&["-n", "x", "--no-create"]), None).unwrap();
        assert!(!options.create_environment);
    }

    #[test]
    #[serial]
    fn own_condarc_file_is_not_overwritten() {
        let options =
            Options::resolve(&parse(&["--condarc-file", "/etc/condarc"]), None).unwrap();
        assert!(!options.write_condarc);
        assert_eq!(options.condarc_file, PathBuf::from("/etc/condarc"));
    }

    #[test]
    #[serial]
    fn inline_condarc_forces_write() {
        let options = Options::resolve(
            &parse(&["--condarc-file", "/etc/condarc", "--condarc", "channels: []"]),
            None,
        )
        .unwrap();
        assert!(options.write_condarc);
    }

    #[test]
    #[serial]
    fn url_beats_version() {
        let options = Options::resolve(
            &parse(&[
                "--micromamba-version",
                "1.5.8-0",
                "--micromamba-url",
                "https://example.com/mm",
            ]),
            None,
        )
        .unwrap();
        assert_eq!(
            options.micromamba_source,
            MicromambaSource::Url("https://example.com/mm".into())
        );
    }

    #[test]
    #[serial]
    fn file_config_fills_gaps_cli_wins() {
        let file: FileConfig = toml::from_str(
            r#"
            [paths]
            root_prefix = "/srv/micromamba"

            [micromamba]
            version = "1.5.8-0"
            "#,
        )
        .unwrap();

        let options =
            Options::resolve(&parse(&["--root-prefix", "/cli/root"]), Some(file)).unwrap();
        assert_eq!(options.root_prefix, PathBuf::from("/cli/root"));
        assert_eq!(
            options.micromamba_source,
            MicromambaSource::Version("1.5.8-0".into())
        );
    }

    #[test]
    #[serial]
    fn init_shell_list_parses() {
        let options =
            Options::resolve(&parse(&["--init-shell", "bash,zsh"]), None).unwrap();
        assert_eq!(
            options.init_shells,
            vec![ShellFlavor::Bash, ShellFlavor::Zsh]
        );
    }
}
