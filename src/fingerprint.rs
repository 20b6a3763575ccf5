//! Environment identity: name resolution and content-derived fingerprints
//!
//! A fingerprint identifies "this environment's desired end-state" and is
//! used as the cache key for built environments. It is derived from the
//! resolved environment name plus a SHA256 digest of the environment file's
//! raw bytes. No semantic normalization is applied: cosmetic edits to the
//! file invalidate the cache. False misses are safe, false hits are not.

use crate::error::{SetupError, SetupResult};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Name used when neither an explicit name nor an environment file name
/// is available.
pub const DEFAULT_ENVIRONMENT_NAME: &str = "base";

/// Key prefix for the built-environment keyspace.
///
/// Independent from the downloaded-binary keyspace (see [`binary_key`]);
/// a key computed for one must never be looked up in the other.
const ENVIRONMENT_KEY_PREFIX: &str = "env";

/// Key prefix for the downloaded-binary keyspace.
const BINARY_KEY_PREFIX: &str = "bin";

/// The subset of an environment file we care about for naming
#[derive(Debug, Deserialize)]
struct EnvironmentFileHeader {
    name: Option<String>,
}

/// Resolves the environment name once and memoizes the result.
///
/// An explicit name always wins; otherwise the `name:` field of the
/// environment file is used. Callers that need the name several times
/// (cache check, command construction, shell templating) share one
/// resolver so the file is parsed at most once per run.
#[derive(Debug)]
pub struct NameResolver {
    explicit_name: Option<String>,
    environment_file: Option<PathBuf>,
    resolved: OnceLock<String>,
}

impl NameResolver {
    pub fn new(explicit_name: Option<String>, environment_file: Option<PathBuf>) -> Self {
        Self {
            explicit_name,
            environment_file,
            resolved: OnceLock::new(),
        }
    }

    /// The environment file backing this resolver, if any
    pub fn environment_file(&self) -> Option<&Path> {
        self.environment_file.as_deref()
    }

    /// Resolve the environment name, falling back to
    /// [`DEFAULT_ENVIRONMENT_NAME`] when neither input is given.
    pub fn resolve(&self) -> SetupResult<&str> {
        if let Some(name) = self.resolved.get() {
            return Ok(name);
        }
        let name = self.resolve_uncached()?;
        Ok(self.memoize(name))
    }

    /// Resolve the environment name, requiring the environment file to
    /// carry a `name:` field when it is the only source of identity.
    ///
    /// The file is parsed at most once here; the result is memoized.
    pub fn resolve_required(&self) -> SetupResult<&str> {
        if let Some(name) = self.resolved.get() {
            return Ok(name);
        }
        if let Some(name) = &self.explicit_name {
            let name = name.clone();
            return Ok(self.memoize(name));
        }
        let Some(path) = &self.environment_file else {
            return Err(SetupError::config(
                "neither an explicit name nor an environment file was given",
            ));
        };
        match name_from_environment_file(path)? {
            Some(name) => Ok(self.memoize(name)),
            None => Err(SetupError::config(format!(
                "environment file {} has no `name:` field and no explicit name was given",
                path.display()
            ))),
        }
    }

    fn resolve_uncached(&self) -> SetupResult<String> {
        if let Some(name) = &self.explicit_name {
            return Ok(name.clone());
        }
        if let Some(path) = &self.environment_file {
            if let Some(name) = name_from_environment_file(path)? {
                return Ok(name);
            }
        }
        Ok(DEFAULT_ENVIRONMENT_NAME.to_string())
    }

    fn memoize(&self, name: String) -> &str {
        debug!("Resolved environment name: {}", name);
        self.resolved.get_or_init(|| name)
    }
}

/// Extract the `name:` field from an environment file
fn name_from_environment_file(path: &Path) -> SetupResult<Option<String>> {
    if !path.exists() {
        return Err(SetupError::EnvironmentFileNotFound(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| SetupError::io(format!("reading environment file {}", path.display()), e))?;
    let header: EnvironmentFileHeader =
        serde_yaml::from_str(&contents).map_err(|e| SetupError::EnvironmentFileInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(header.name)
}

/// Hash raw bytes with SHA256, returning the full hex digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Compute the cache key for a built environment.
///
/// Pure in the sense that identical `(name, file bytes)` always yield the
/// same key and any byte difference in the file yields a different key.
pub fn environment_key(name: &str, environment_file: Option<&Path>) -> SetupResult<String> {
    match environment_file {
        Some(path) => {
            let contents = fs::read(path).map_err(|e| {
                SetupError::io(format!("reading environment file {}", path.display()), e)
            })?;
            Ok(format!(
                "{}-{}-{}",
                ENVIRONMENT_KEY_PREFIX,
                name,
                sha256_hex(&contents)
            ))
        }
        None => Ok(format!("{}-{}", ENVIRONMENT_KEY_PREFIX, name)),
    }
}

/// Compute the cache key for a downloaded micromamba binary.
///
/// Keyed by the download URL so a version or platform change forces a
/// fresh download.
pub fn binary_key(url: &str) -> String {
    format!("{}-{}", BINARY_KEY_PREFIX, &sha256_hex(url.as_bytes())[..16])
}
