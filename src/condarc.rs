//! Registry-source (condarc) file handling
//!
//! Writes the condarc the provisioned micromamba will use, or verifies a
//! pre-existing one is readable when told not to write. The file format
//! itself is not validated here; micromamba owns that.

use crate::error::{SetupError, SetupResult};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Fallback contents: the conda-forge channel
const DEFAULT_CONDARC: &str = "channels:\n  - conda-forge\n";

/// Materialize the condarc at `path`.
///
/// With `write` off, the file must already exist and be readable. With
/// `write` on, `contents` (or the conda-forge default) is written,
/// creating parent directories as needed.
pub async fn generate(path: &Path, write: bool, contents: Option<&str>) -> SetupResult<()> {
    if !write {
        debug!("Using existing condarc file {}", path.display());
        return fs::metadata(path).await.map(|_| ()).map_err(|e| {
            SetupError::io(format!("checking condarc file {}", path.display()), e)
        });
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| SetupError::io(format!("creating {}", parent.display()), e))?;
    }

    let body = match contents {
        Some(custom) => {
            info!("Writing condarc contents to {} ...", path.display());
            custom
        }
        None => {
            info!("Adding conda-forge to condarc channels ...");
            DEFAULT_CONDARC
        }
    };

    fs::write(path, body)
        .await
        .map_err(|e| SetupError::io(format!("writing condarc to {}", path.display()), e))
}
