//! TOML config file schema for mamba-setup
//!
//! Everything here is an optional override of a built-in default; CLI
//! flags win over the file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root of the optional config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub paths: PathsConfig,
    pub micromamba: MicromambaConfig,
    pub cache: CacheConfig,
}

/// Install and state locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub root_prefix: Option<PathBuf>,
    pub bin_path: Option<PathBuf>,
    pub condarc_file: Option<PathBuf>,
    pub run_shell: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
}

/// Which micromamba to fetch and how chatty it is
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MicromambaConfig {
    pub version: Option<String>,
    pub url: Option<String>,
    pub log_level: Option<String>,
}

/// Cache store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: Option<PathBuf>,
}
