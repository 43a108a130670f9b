use std::path::PathBuf;

use thiserror::Error;

/// Conditions surfaced by the compile / merge / deploy / rollback pipeline.
///
/// Per-device variants are collected into run reports and never abort
/// sibling device tasks. `InvalidArgument` is fatal to the single call
/// that received it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("malformed row {line}: {message}")]
    MalformedRow { line: u64, message: String },

    #[error("no credential available for {hostname}")]
    CredentialNotFound { hostname: String },

    #[error("session error on {hostname}: {message}")]
    SessionError { hostname: String, message: String },

    #[error("no golden snapshot found for {hostname}")]
    NoSnapshotFound { hostname: String },

    #[error("config file for {hostname} not found: {}", path.display())]
    ConfigFileMissing { hostname: String, path: PathBuf },

    #[error("deployment to {hostname} cancelled before it started")]
    Cancelled { hostname: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl PipelineError {
    pub fn session(hostname: &str, message: impl Into<String>) -> Self {
        Self::SessionError {
            hostname: hostname.to_string(),
            message: message.into(),
        }
    }

    /// Short machine-friendly label used in run summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRow { .. } => "malformed_row",
            Self::CredentialNotFound { .. } => "credential_not_found",
            Self::SessionError { .. } => "session_error",
            Self::NoSnapshotFound { .. } => "no_snapshot_found",
            Self::ConfigFileMissing { .. } => "config_file_missing",
            Self::Cancelled { .. } => "cancelled",
            Self::InvalidArgument(_) => "invalid_argument",
        }
    }
}
