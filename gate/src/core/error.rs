//! Error taxonomy for gate runs.
//!
//! Fatal conditions are created at the failure site, travel through
//! `anyhow::Error` with whatever context callers attach, and are recovered
//! with `downcast_ref` at the CLI boundary to pick a stable exit code.

use std::path::PathBuf;

use thiserror::Error;

use crate::exit_codes;

/// Classified failure conditions for a gate run.
#[derive(Debug, Error)]
pub enum GateError {
    /// The merge queue promised a ref for the project under test that does
    /// not exist on the remote. Always process-fatal.
    #[error("no proposed ref resolved for {project} (tried: {tried})")]
    RefNotFound { project: String, tried: String },

    /// Network failure or timeout talking to a remote. Retried locally where
    /// a budget applies, then process-fatal.
    #[error("remote unreachable: {detail}")]
    RemoteUnreachable { detail: String },

    /// Force-clean failed twice. Tolerated and logged, never propagated.
    #[error("working tree clean failed twice in {path}: {detail}")]
    TreeCorrupt { path: PathBuf, detail: String },

    /// The configuration cannot describe a runnable gate pass.
    #[error("inconsistent configuration: {0}")]
    ConfigurationInconsistent(String),
}

impl GateError {
    /// Exit code this condition maps to at the process boundary.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::RefNotFound { .. } => exit_codes::REF_NOT_FOUND,
            Self::RemoteUnreachable { .. } => exit_codes::REMOTE_UNREACHABLE,
            Self::TreeCorrupt { .. } | Self::ConfigurationInconsistent(_) => exit_codes::INVALID,
        }
    }
}
