//! Artifact caching keyed by content-derived fingerprints
//!
//! The gateway abstracts a key-value artifact store with exactly two
//! operations: restore-by-key and save-by-key. Two independent keyspaces
//! share one store: built environments (`env-…`) and downloaded binaries
//! (`bin-…`). Keys never cross between them.
//!
//! A miss is a normal outcome, not an error. Store failures surface as
//! `SetupError::CacheUnavailable`, which callers treat as a miss and
//! rebuild - correctness over speed. Entries are never mutated in place;
//! a key is only saved after a confirmed miss.

pub mod dir;

pub use dir::DirCache;

use crate::error::SetupResult;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

/// Result of the single cache query an orchestrator run performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// An entry exists for this key; its payload has been materialized
    Hit(String),
    /// No entry for this key (or the store was unavailable)
    Miss,
}

impl CacheOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// The key that hit, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Hit(key) => Some(key),
            Self::Miss => None,
        }
    }
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit(key) => write!(f, "hit ({})", key),
            Self::Miss => write!(f, "miss"),
        }
    }
}

/// Abstract artifact cache interface
///
/// Implementations must distinguish "no entry" (`Ok(None)`) from store
/// failures (`Err(CacheUnavailable)`). `save` must be idempotent for an
/// existing key: the first write wins and later saves are no-ops.
#[async_trait]
pub trait CacheGateway: Send + Sync {
    /// Look up a previously saved entry by exact key match.
    ///
    /// On a hit the payload is materialized back at the path it was saved
    /// from and that path is returned.
    async fn restore(&self, key: &str) -> SetupResult<Option<PathBuf>>;

    /// Save the subtree (or file) at `path` under `key`.
    async fn save(&self, key: &str, path: &Path) -> SetupResult<()>;
}
