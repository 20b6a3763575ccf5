//! CLI argument definitions using clap derive

use crate::shell::ShellFlavor;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// mamba-setup - provision an isolated micromamba runtime
///
/// Fetches a versioned micromamba, configures its channels, creates or
/// restores a named environment with content-derived caching, and
/// exposes the runtime to later pipeline steps.
#[derive(Parser, Debug)]
#[command(name = "mamba-setup")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MAMBA_SETUP_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision micromamba and the requested environment (main phase)
    Provision(ProvisionArgs),

    /// Save outstanding caches after the pipeline's work (post phase)
    Post(PostArgs),
}

/// Arguments for the provision command
#[derive(Parser, Debug)]
pub struct ProvisionArgs {
    /// Environment name; overrides any name in the environment file
    #[arg(short = 'n', long)]
    pub environment_name: Option<String>,

    /// Environment file (environment.yml) describing the contents
    #[arg(short = 'f', long)]
    pub environment_file: Option<PathBuf>,

    /// Extra arguments passed verbatim to `micromamba create`
    #[arg(long = "create-args", num_args = 1.., allow_hyphen_values = true)]
    pub create_args: Vec<String>,

    /// Shells to register for auto-activation (comma-separated)
    #[arg(long = "init-shell", value_delimiter = ',')]
    pub init_shell: Vec<ShellFlavor>,

    /// micromamba version to install ("latest" or e.g. "1.5.8-0")
    #[arg(long)]
    pub micromamba_version: Option<String>,

    /// Explicit micromamba download URL; takes precedence over the version
    #[arg(long)]
    pub micromamba_url: Option<String>,

    /// Condarc file to use; when set, the file is yours and is only checked
    #[arg(long)]
    pub condarc_file: Option<PathBuf>,

    /// Inline condarc contents to write (defaults to conda-forge channels)
    #[arg(long)]
    pub condarc: Option<String>,

    /// micromamba root prefix
    #[arg(long, env = "MAMBA_ROOT_PREFIX")]
    pub root_prefix: Option<PathBuf>,

    /// Where to install the micromamba binary
    #[arg(long)]
    pub bin_path: Option<PathBuf>,

    /// Cache store directory (shared across runs)
    #[arg(long, env = "MAMBA_SETUP_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Skip environment creation even when a name or file is given
    #[arg(long)]
    pub no_create: bool,

    /// Disable the built-environment cache
    #[arg(long)]
    pub no_cache_environment: bool,

    /// Disable the downloaded-binary cache
    #[arg(long)]
    pub no_cache_downloads: bool,

    /// Write the micromamba-run-shell wrapper script
    #[arg(long)]
    pub generate_run_shell: bool,

    /// Where to write the run-shell wrapper
    #[arg(long)]
    pub run_shell_path: Option<PathBuf>,

    /// micromamba --log-level value (e.g. warning, info, debug)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Pipeline env file to append exported variables to
    #[arg(long, env = "GITHUB_ENV")]
    pub pipeline_env_file: Option<PathBuf>,

    /// Where the main phase records state for the post phase
    #[arg(long)]
    pub state_file: Option<PathBuf>,
}

/// Arguments for the post command
#[derive(Parser, Debug)]
pub struct PostArgs {
    /// Cache store directory (must match the main phase)
    #[arg(long, env = "MAMBA_SETUP_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// State file written by the main phase
    #[arg(long)]
    pub state_file: Option<PathBuf>,
}
