// src/error.rs

use std::path::PathBuf;

/// Every failure the library can report.
///
/// The first eight variants are raised by this crate itself. The rest wrap
/// infrastructure errors; anything a remote collaborator returns comes back
/// as `Remote` without being reinterpreted.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported agnostic type `{0}`")]
    UnsupportedType(String),

    #[error("job misconfigured: {0}")]
    Misconfigured(String),

    #[error("job not started: {0}")]
    NotStarted(String),

    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("job timed out: {0}")]
    JobTimedOut(String),

    #[error("job stopped: {0}")]
    JobStopped(String),

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Remote(#[from] anyhow::Error),
}

impl EtlError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// True for the three terminal outcomes a job run can end in, other than success.
    pub fn is_terminal_job_outcome(&self) -> bool {
        matches!(
            self,
            Self::JobFailed(_) | Self::JobTimedOut(_) | Self::JobStopped(_)
        )
    }

    /// Process exit code for a CLI built on this crate.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_)
            | Self::NotFound(_)
            | Self::UnsupportedType(_)
            | Self::Misconfigured(_)
            | Self::NotStarted(_) => 2,
            e if e.is_terminal_job_outcome() => 3,
            _ => 1,
        }
    }
}

pub type Result<T, E = EtlError> = std::result::Result<T, E>;
