//! mamba-setup - micromamba provisioning for build pipelines
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use mamba_setup::cli::{Cli, Commands};
use mamba_setup::error::SetupResult;
use mamba_setup::options;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> SetupResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("mamba_setup=warn"),
        1 => EnvFilter::new("mamba_setup=info"),
        _ => EnvFilter::new("mamba_setup=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let file_config = options::load_file_config(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Provision(args) => mamba_setup::cli::commands::provision(args, file_config).await,
        Commands::Post(args) => mamba_setup::cli::commands::post(args).await,
    }
}
