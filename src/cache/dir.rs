//! Filesystem-backed cache store
//!
//! Entries live under a shared cache directory, one subdirectory per key:
//!
//! ```text
//! <cache-dir>/<key>/meta.json    original path + timestamp
//! <cache-dir>/<key>/payload/…    the saved subtree (or single file)
//! ```
//!
//! `meta.json` is written last, so an entry without it is an interrupted
//! save and is treated as a miss.

use crate::cache::CacheGateway;
use crate::error::{SetupError, SetupResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const META_FILE: &str = "meta.json";
const PAYLOAD_DIR: &str = "payload";

/// What the payload was at save time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PayloadKind {
    File,
    Tree,
}

/// Entry metadata, written after the payload copy completes
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    /// Absolute path the payload was saved from (and is restored to)
    path: PathBuf,
    kind: PayloadKind,
    saved_at: DateTime<Utc>,
}

/// Cache store rooted at a directory on the build host
#[derive(Debug, Clone)]
pub struct DirCache {
    root: PathBuf,
}

impl DirCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn entry_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl CacheGateway for DirCache {
    async fn restore(&self, key: &str) -> SetupResult<Option<PathBuf>> {
        let entry = self.entry_dir(key);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || restore_entry(&entry, &key))
            .await
            .map_err(|e| SetupError::Internal(format!("cache restore task panicked: {e}")))?
    }

    async fn save(&self, key: &str, path: &Path) -> SetupResult<()> {
        let entry = self.entry_dir(key);
        let key = key.to_string();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || save_entry(&entry, &key, &path))
            .await
            .map_err(|e| SetupError::Internal(format!("cache save task panicked: {e}")))?
    }
}

fn restore_entry(entry: &Path, key: &str) -> SetupResult<Option<PathBuf>> {
    let meta_path = entry.join(META_FILE);
    if !meta_path.exists() {
        if entry.exists() {
            // Payload without metadata: an interrupted save
            warn!("Ignoring incomplete cache entry for key {}", key);
        }
        debug!("Cache miss for key {}", key);
        return Ok(None);
    }

    let meta: EntryMeta = fs::read(&meta_path)
        .map_err(|e| SetupError::cache_unavailable(format!("reading entry for {key}"), e.to_string()))
        .and_then(|bytes| {
            serde_json::from_slice(&bytes).map_err(|e| {
                SetupError::cache_unavailable(format!("parsing entry metadata for {key}"), e.to_string())
            })
        })?;

    let payload = entry.join(PAYLOAD_DIR);
    let materialize = || -> std::io::Result<()> {
        match meta.kind {
            PayloadKind::Tree => copy_tree(&payload, &meta.path),
            PayloadKind::File => {
                let name = meta.path.file_name().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "entry path has no file name")
                })?;
                if let Some(parent) = meta.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(payload.join(name), &meta.path)?;
                Ok(())
            }
        }
    };
    materialize().map_err(|e| {
        SetupError::cache_unavailable(format!("materializing entry for {key}"), e.to_string())
    })?;

    debug!("Cache hit for key {} -> {}", key, meta.path.display());
    Ok(Some(meta.path))
}

fn save_entry(entry: &Path, key: &str, path: &Path) -> SetupResult<()> {
    if entry.join(META_FILE).exists() {
        // Existing keys are never overwritten; the first write wins
        debug!("Cache entry for key {} already exists, skipping save", key);
        return Ok(());
    }

    let unavailable =
        |e: std::io::Error| SetupError::cache_unavailable(format!("saving entry for {key}"), e.to_string());

    let payload = entry.join(PAYLOAD_DIR);
    // Clear any partial payload from an interrupted earlier save
    if payload.exists() {
        fs::remove_dir_all(&payload).map_err(unavailable)?;
    }
    fs::create_dir_all(&payload).map_err(unavailable)?;
    copy_tree(path, &payload).map_err(unavailable)?;

    let meta = EntryMeta {
        path: path.to_path_buf(),
        kind: if path.is_file() {
            PayloadKind::File
        } else {
            PayloadKind::Tree
        },
        saved_at: Utc::now(),
    };
    let bytes = serde_json::to_vec_pretty(&meta)?;
    fs::write(entry.join(META_FILE), bytes).map_err(unavailable)?;

    debug!("Saved cache entry for key {}", key);
    Ok(())
}

/// Recursively copy `src` into `dst`.
///
/// A file source is copied to `dst/<file-name>`; a directory source has
/// its contents copied under `dst`. Unix permission bits survive via
/// `fs::copy`.
fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_file() {
        fs::create_dir_all(dst)?;
        let name = src.file_name().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "source file has no name")
        })?;
        fs::copy(src, dst.join(name))?;
        return Ok(());
    }

    fs::create_dir_all(dst)?;
    for child in fs::read_dir(src)? {
        let child = child?;
        let target = dst.join(child.file_name());
        let file_type = child.file_type()?;
        if file_type.is_dir() {
            copy_tree(&child.path(), &target)?;
        } else if file_type.is_symlink() {
            #[cfg(unix)]
            {
                let link = fs::read_link(child.path())?;
                // symlink_metadata, not exists(): a dangling link at the
                // target still has to be removed before relinking
                if fs::symlink_metadata(&target).is_ok() {
                    fs::remove_file(&target)?;
                }
                std::os::unix::fs::symlink(link, &target)?;
            }
            #[cfg(not(unix))]
            fs::copy(child.path(), &target)?;
        } else {
            fs::copy(child.path(), &target)?;
        }
    }
    Ok(())
}
