//! mamba-setup - micromamba provisioning for build pipelines
//!
//! Fetches a versioned micromamba executable, configures its registry
//! sources, creates or restores a named environment with content-derived
//! caching, and exposes the runtime's state to later pipeline steps.

pub mod cache;
pub mod cli;
pub mod condarc;
pub mod download;
pub mod env_export;
pub mod error;
pub mod fingerprint;
pub mod mamba;
pub mod options;
pub mod orchestrator;
pub mod shell;
pub mod state;

pub use error::{SetupError, SetupResult};
