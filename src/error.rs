//! Error types for mamba-setup
//!
//! All modules use `SetupResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mamba-setup operations
pub type SetupResult<T> = Result<T, SetupError>;

/// All errors that can occur in mamba-setup
#[derive(Error, Debug)]
pub enum SetupError {
    // Environment identity errors - fatal, nothing can proceed without a name
    #[error("Cannot resolve environment name: {reason}")]
    Config { reason: String },

    #[error("Environment file not found: {0}")]
    EnvironmentFileNotFound(PathBuf),

    #[error("Invalid environment file {path}: {reason}")]
    EnvironmentFileInvalid { path: PathBuf, reason: String },

    // Binary provisioning errors - fatal within a run
    #[error("Failed to download {url}: {detail}")]
    Download {
        url: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("Unsupported platform: {os}/{arch}. No micromamba build is published for it.")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Invalid micromamba version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    // Cache errors - CacheUnavailable degrades to a miss, never aborts a run
    #[error("Cache unavailable while {context}: {reason}")]
    CacheUnavailable { context: String, reason: String },

    // Build errors - non-zero exit from the micromamba subprocess
    #[error("Build command failed: {command}, exit code: {code}\n{stderr}")]
    Build {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Build command terminated by signal: {command}")]
    BuildSignaled { command: String },

    // Shell registration - non-fatal per shell, accumulated by the orchestrator
    #[error("Failed to register {shell} activation: {reason}")]
    ShellRegistration { shell: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed to spawn: {command}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SetupError {
    /// Create a name-resolution error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a cache-unavailable error with context
    pub fn cache_unavailable(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CacheUnavailable {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Whether the orchestrator may proceed past this error
    ///
    /// Cache failures degrade to a rebuild; shell registration failures are
    /// accumulated and reported without failing the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::CacheUnavailable { .. } | Self::ShellRegistration { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Config { .. } => {
                Some("Pass --environment-name or add a `name:` field to the environment file")
            }
            Self::EnvironmentFileNotFound(_) => {
                Some("Check the --environment-file path relative to the working directory")
            }
            Self::Download { .. } => Some("Check network access, or pass --micromamba-url"),
            Self::InvalidVersion { .. } => {
                Some("Use 'latest' or an exact version such as 1.5.8-0")
            }
            _ => None,
        }
    }
}
