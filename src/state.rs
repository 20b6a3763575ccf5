//! State handed from the main phase to the post phase
//!
//! The downloads cache can only be saved once the binary exists on disk,
//! and whether to save at all depends on the main phase's restore outcome.
//! That outcome is persisted here as a small JSON file keyed by fixed
//! field names, written by `provision` and read by `post`.

use crate::error::{SetupError, SetupResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// State surfaced to the post phase of the same pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    /// Whether the downloads cache was enabled at all during the main
    /// phase; the post phase never saves when it was off
    pub cache_downloads: bool,
    /// Whether the downloads cache restore hit during the main phase
    pub downloads_cache_hit: bool,
    /// Downloads keyspace key the main phase computed
    pub downloads_key: String,
    /// Installed binary path, the payload a post-phase save stores
    pub bin_path: PathBuf,
    pub recorded_at: DateTime<Utc>,
}

impl PhaseState {
    pub fn new(
        cache_downloads: bool,
        downloads_cache_hit: bool,
        downloads_key: String,
        bin_path: PathBuf,
    ) -> Self {
        Self {
            cache_downloads,
            downloads_cache_hit,
            downloads_key,
            bin_path,
            recorded_at: Utc::now(),
        }
    }

    /// Persist to `path`, creating parent directories as needed
    pub async fn save(&self, path: &Path) -> SetupResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SetupError::io(format!("creating {}", parent.display()), e))?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(path, bytes)
            .await
            .map_err(|e| SetupError::io(format!("writing state to {}", path.display()), e))?;
        debug!("Recorded phase state at {}", path.display());
        Ok(())
    }

    /// Load from `path`; `None` when no main phase ran
    pub async fn load(path: &Path) -> SetupResult<Option<Self>> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SetupError::io(
                    format!("reading state from {}", path.display()),
                    e,
                ))
            }
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}
