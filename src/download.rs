//! Binary provisioning: fetch micromamba and install it with exec permission
//!
//! A pure "fetch and place" step with no cache logic of its own. Callers
//! check the downloads keyspace before invoking [`provision`]; the binary
//! digest is logged for diagnostics, not enforced as a trust gate.

use crate::error::{SetupError, SetupResult};
use crate::fingerprint::sha256_hex;
use std::env::consts;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Base URL of the micromamba release API
const RELEASE_API: &str = "https://micro.mamba.pm/api/micromamba";

/// Hard ceiling on the downloaded payload size
const MAX_PAYLOAD_BYTES: u64 = 512 * 1024 * 1024;

/// A fetched and installed micromamba executable
#[derive(Debug, Clone)]
pub struct InstalledBinary {
    pub path: PathBuf,
    /// SHA256 of the payload, recorded for diagnostics
    pub sha256: String,
}

/// Where the micromamba payload comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicromambaSource {
    /// A published version ("latest" or an exact one such as "1.5.8-0")
    Version(String),
    /// A fully explicit download URL
    Url(String),
}

impl MicromambaSource {
    /// Resolve the download URL for the current platform
    pub fn url(&self) -> SetupResult<String> {
        match self {
            Self::Url(url) => Ok(url.clone()),
            Self::Version(version) => {
                validate_version(version)?;
                Ok(format!("{}/{}/{}", RELEASE_API, platform_slug()?, version))
            }
        }
    }
}

/// Validate a version input: "latest" or "<semver>[-<build>]"
fn validate_version(version: &str) -> SetupResult<()> {
    if version == "latest" {
        return Ok(());
    }
    let base = version.split('-').next().unwrap_or(version);
    semver::Version::parse(base).map_err(|e| SetupError::InvalidVersion {
        version: version.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// The platform component of the micromamba release URL
pub fn platform_slug() -> SetupResult<&'static str> {
    match (consts::OS, consts::ARCH) {
        ("linux", "x86_64") => Ok("linux-64"),
        ("linux", "aarch64") => Ok("linux-aarch64"),
        ("linux", "powerpc64") => Ok("linux-ppc64le"),
        ("macos", "x86_64") => Ok("osx-64"),
        ("macos", "aarch64") => Ok("osx-arm64"),
        ("windows", "x86_64") => Ok("win-64"),
        (os, arch) => Err(SetupError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

/// Fetch the payload at `url` and install it at `bin_path` with the
/// executable bit set, creating parent directories as needed.
pub async fn provision(url: &str, bin_path: &Path) -> SetupResult<InstalledBinary> {
    debug!("Downloading micromamba from {} ...", url);
    let payload = fetch(url.to_string()).await?;

    let sha256 = sha256_hex(&payload);
    debug!("micromamba binary sha256: {}", sha256);

    install_payload(&payload, bin_path)?;
    info!("micromamba installed to {}", bin_path.display());

    Ok(InstalledBinary {
        path: bin_path.to_path_buf(),
        sha256,
    })
}

/// HTTP GET, fully buffered. Blocking client moved off the runtime.
async fn fetch(url: String) -> SetupResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let mut response = ureq::get(&url).call().map_err(|e| match e {
            ureq::Error::StatusCode(code) => SetupError::Download {
                url: url.clone(),
                status: Some(code),
                detail: format!("HTTP status {code}"),
            },
            other => SetupError::Download {
                url: url.clone(),
                status: None,
                detail: other.to_string(),
            },
        })?;
        response
            .body_mut()
            .with_config()
            .limit(MAX_PAYLOAD_BYTES)
            .read_to_vec()
            .map_err(|e| SetupError::Download {
                url: url.clone(),
                status: None,
                detail: format!("reading response body: {e}"),
            })
    })
    .await
    .map_err(|e| SetupError::Internal(format!("download task panicked: {e}")))?
}

/// Write the payload to `bin_path` with mode 0o755
fn install_payload(payload: &[u8], bin_path: &Path) -> SetupResult<()> {
    if let Some(parent) = bin_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SetupError::io(format!("creating directory {}", parent.display()), e))?;
    }
    std::fs::write(bin_path, payload)
        .map_err(|e| SetupError::io(format!("writing binary to {}", bin_path.display()), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(bin_path, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| SetupError::io("setting binary permissions", e))?;
    }

    Ok(())
}
