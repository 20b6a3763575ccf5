//! Post command - save outstanding caches after the pipeline's work
//!
//! The downloads cache is saved here rather than in the main phase so the
//! binary is only cached once the run that fetched it has finished. The
//! environment cache was already saved right after its build.

use crate::cache::{CacheGateway, DirCache};
use crate::cli::args::PostArgs;
use crate::error::{SetupError, SetupResult};
use crate::options::default_state_file;
use crate::state::PhaseState;
use tracing::{info, warn};

/// Execute the post command
pub async fn execute(args: PostArgs) -> SetupResult<()> {
    let home = dirs::home_dir()
        .ok_or_else(|| SetupError::Internal("cannot determine home directory".to_string()))?;
    let state_file = args
        .state_file
        .clone()
        .unwrap_or_else(|| default_state_file(&home));

    let Some(state) = PhaseState::load(&state_file).await? else {
        info!("No provision state found; nothing to do.");
        return Ok(());
    };

    if !state.cache_downloads {
        info!("Downloads caching was disabled during provisioning; nothing to save.");
        return Ok(());
    }

    if state.downloads_cache_hit {
        info!("Downloads cache already hit during provisioning; nothing to save.");
        return Ok(());
    }

    let cache_dir = args.cache_dir.unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(|| home.join(".cache"))
            .join("mamba-setup")
    });
    let cache = DirCache::new(cache_dir);

    match cache.save(&state.downloads_key, &state.bin_path).await {
        Ok(()) => info!("Saved micromamba binary to downloads cache."),
        // The binary is already usable; a failed save only costs the next run
        Err(e) => warn!("Failed to save downloads cache: {e}"),
    }

    Ok(())
}
