//! Capabilities the core needs from remote services.
//!
//! Implementations return `anyhow::Result` and the core passes their errors
//! through untouched. Every call is blocking.

pub mod local;
pub mod memory;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt, path::Path};

use crate::job::definition::JobSubmission;

/// Object storage: upload, list and delete by key prefix.
pub trait ObjectStore {
    fn upload(&self, local_path: &Path, bucket: &str, key: &str) -> anyhow::Result<()>;

    fn list(&self, bucket: &str, prefix: &str) -> anyhow::Result<Vec<String>>;

    /// Delete every object under `prefix`, returning how many went.
    fn delete_prefix(&self, bucket: &str, prefix: &str) -> anyhow::Result<usize>;
}

/// Result of asking the catalog to delete a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

impl fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteOutcome::Deleted => f.write_str("database deleted"),
            DeleteOutcome::NotFound => {
                f.write_str("Cannot delete as database not found in glue catalogue")
            }
        }
    }
}

/// The managed data catalog.
pub trait CatalogClient {
    fn create_database(&self, name: &str, description: &str) -> anyhow::Result<()>;

    /// Must report a missing database as `DeleteOutcome::NotFound`, not as an error.
    fn delete_database(&self, name: &str) -> anyhow::Result<DeleteOutcome>;

    fn create_table(&self, database: &str, definition: &Value) -> anyhow::Result<()>;

    fn list_tables(&self, database: &str) -> anyhow::Result<Vec<String>>;
}

/// Status document for one job run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRunStatus {
    #[serde(rename = "JobRunState")]
    pub job_run_state: String,
    #[serde(rename = "ErrorMessage", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobRunStatus {
    pub fn new(state: &str) -> Self {
        Self {
            job_run_state: state.to_string(),
            error_message: None,
        }
    }

    pub fn with_error(state: &str, message: &str) -> Self {
        Self {
            job_run_state: state.to_string(),
            error_message: Some(message.to_string()),
        }
    }
}

/// The managed batch job service.
pub trait JobService {
    fn create_job(&self, definition: &JobSubmission) -> anyhow::Result<()>;

    /// Deleting a job that does not exist is not an error.
    fn delete_job(&self, name: &str) -> anyhow::Result<()>;

    /// Start a run and return its id.
    fn start_job_run(
        &self,
        name: &str,
        arguments: &BTreeMap<String, String>,
    ) -> anyhow::Result<String>;

    fn get_job_run(&self, name: &str, run_id: &str) -> anyhow::Result<JobRunStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reads_the_service_shape() {
        let s: JobRunStatus =
            serde_json::from_str(r#"{"JobRunState": "FAILED", "ErrorMessage": "oom"}"#).unwrap();
        assert_eq!(s, JobRunStatus::with_error("FAILED", "oom"));
        let s: JobRunStatus = serde_json::from_str(r#"{"JobRunState": "RUNNING"}"#).unwrap();
        assert_eq!(s.error_message, None);
    }

    #[test]
    fn delete_outcomes_read_differently() {
        assert_eq!(DeleteOutcome::Deleted.to_string(), "database deleted");
        assert_ne!(
            DeleteOutcome::Deleted.to_string(),
            DeleteOutcome::NotFound.to_string()
        );
    }
}
