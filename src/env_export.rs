//! Process-wide variable export for downstream pipeline steps
//!
//! Modeled as a narrow side-effecting interface rather than ambient
//! mutable state. The file-backed exporter appends `KEY=VALUE` lines to
//! the pipeline's environment file (the `GITHUB_ENV` convention); without
//! a file the variables are only logged.

use crate::error::{SetupError, SetupResult};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Variable names consumed by later pipeline steps
pub mod vars {
    pub const ROOT_PREFIX: &str = "MAMBA_ROOT_PREFIX";
    pub const EXE: &str = "MAMBA_EXE";
    pub const CONDARC: &str = "CONDARC";
}

/// Narrow export interface so orchestration stays testable
#[async_trait]
pub trait VariableExporter: Send + Sync {
    async fn export(&self, name: &str, value: &str) -> SetupResult<()>;
}

/// Exporter that appends to a pipeline environment file
#[derive(Debug, Clone)]
pub struct EnvFileExporter {
    env_file: Option<PathBuf>,
}

impl EnvFileExporter {
    pub fn new(env_file: Option<PathBuf>) -> Self {
        Self { env_file }
    }
}

#[async_trait]
impl VariableExporter for EnvFileExporter {
    async fn export(&self, name: &str, value: &str) -> SetupResult<()> {
        debug!("{}: {}", name, value);
        let Some(path) = &self.env_file else {
            info!("No pipeline env file configured; {} not persisted", name);
            return Ok(());
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| SetupError::io(format!("opening env file {}", path.display()), e))?;
        file.write_all(format!("{}={}\n", name, value).as_bytes())
            .await
            .map_err(|e| SetupError::io(format!("appending to env file {}", path.display()), e))?;
        file.flush()
            .await
            .map_err(|e| SetupError::io(format!("appending to env file {}", path.display()), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn appends_key_value_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.env");
        let exporter = EnvFileExporter::new(Some(path.clone()));

        exporter.export(vars::ROOT_PREFIX, "/home/u/micromamba").await.unwrap();
        exporter.export(vars::EXE, "/opt/bin/micromamba").await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "MAMBA_ROOT_PREFIX=/home/u/micromamba\nMAMBA_EXE=/opt/bin/micromamba\n"
        );
    }

    #[tokio::test]
    async fn no_file_is_a_noop() {
        let exporter = EnvFileExporter::new(None);
        exporter.export(vars::CONDARC, "/x/.condarc").await.unwrap();
    }
}
