//! Shell activation: profile hooks and the run-shell wrapper
//!
//! Registers the resolved environment for auto-activation in future
//! shells by appending a `micromamba activate <name>` line to each
//! requested flavor's profile. Registration is idempotent: the same
//! (environment, shell) pair never duplicates the hook.

use crate::error::{SetupError, SetupResult};
use crate::orchestrator::ActivationRegistrar;
use async_trait::async_trait;
use clap::ValueEnum;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Shell flavors that support auto-activation hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum ShellFlavor {
    Bash,
    Zsh,
    Fish,
    Xonsh,
}

impl ShellFlavor {
    /// The flavor name micromamba's `shell init` expects
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Fish => "fish",
            Self::Xonsh => "xonsh",
        }
    }

    /// Profile file the activation hook is appended to, relative to home
    pub fn profile_path(&self, home: &Path) -> PathBuf {
        match self {
            // .bash_profile rather than .bashrc: pipeline steps run login shells
            Self::Bash => home.join(".bash_profile"),
            Self::Zsh => home.join(".zshrc"),
            Self::Fish => home.join(".config").join("fish").join("config.fish"),
            Self::Xonsh => home.join(".xonshrc"),
        }
    }
}

impl fmt::Display for ShellFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registrar that appends activation lines to shell profiles under `home`
#[derive(Debug, Clone)]
pub struct ProfileRegistrar {
    home: PathBuf,
}

impl ProfileRegistrar {
    pub fn new(home: PathBuf) -> Self {
        Self { home }
    }
}

#[async_trait]
impl ActivationRegistrar for ProfileRegistrar {
    async fn register(&self, environment_name: &str, flavor: ShellFlavor) -> SetupResult<()> {
        let profile = flavor.profile_path(&self.home);
        let line = format!("micromamba activate {}", environment_name);

        let registration_error = |reason: String| SetupError::ShellRegistration {
            shell: flavor.to_string(),
            reason,
        };

        let existing = match fs::read_to_string(&profile).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(registration_error(format!(
                    "reading {}: {e}",
                    profile.display()
                )))
            }
        };

        if existing.lines().any(|l| l.trim() == line) {
            debug!("{} already activates {}, skipping", profile.display(), environment_name);
            return Ok(());
        }

        if let Some(parent) = profile.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                registration_error(format!("creating {}: {e}", parent.display()))
            })?;
        }

        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&line);
        updated.push('\n');

        fs::write(&profile, updated)
            .await
            .map_err(|e| registration_error(format!("writing {}: {e}", profile.display())))?;

        info!("Registered {} activation in {}", environment_name, profile.display());
        Ok(())
    }
}

/// Write the `micromamba-run-shell` wrapper script.
///
/// The wrapper lets pipeline steps execute a script inside the
/// provisioned environment: `micromamba-run-shell <script>`.
pub async fn write_run_shell(
    script_path: &Path,
    bin_path: &Path,
    root_prefix: &Path,
    environment_name: &str,
) -> SetupResult<()> {
    let contents = format!(
        "#!/usr/bin/env sh\nchmod +x $1\n{} run -r {} -n {} $1\n",
        bin_path.display(),
        root_prefix.display(),
        environment_name,
    );

    debug!("Writing run shell to {}", script_path.display());
    if let Some(parent) = script_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| SetupError::io(format!("creating {}", parent.display()), e))?;
    }
    fs::write(script_path, contents)
        .await
        .map_err(|e| SetupError::io(format!("writing {}", script_path.display()), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(script_path, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| SetupError::io("setting run shell permissions", e))?;
    }

    Ok(())
}
