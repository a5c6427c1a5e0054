// src/config.rs

use serde::Deserialize;
use std::{fs, path::Path, time::Duration};
use tracing::debug;

use crate::{
    error::{EtlError, Result},
    job::{definition::JobArguments, GlueJob, GlueJobOptions},
};

/// Job settings read from a YAML file. Every field is optional.
///
/// ```yaml
/// bucket: alpha-everyone
/// job_role: alpha_user_etl
/// include_shared_job_resources: false
/// arguments:
///   --snapshot_date: "2018-01-01"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    pub bucket: Option<String>,
    pub job_role: Option<String>,
    /// Defaults to the job folder's name.
    pub job_name: Option<String>,
    pub include_shared_job_resources: bool,
    pub max_retries: u32,
    pub max_concurrent_runs: u32,
    pub allocated_capacity: u32,
    pub poll_interval_secs: u64,
    pub arguments: JobArguments,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            job_role: None,
            job_name: None,
            include_shared_job_resources: true,
            max_retries: 0,
            max_concurrent_runs: 1,
            allocated_capacity: 2,
            poll_interval_secs: 10,
            arguments: JobArguments::default(),
        }
    }
}

impl JobConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&text)?;
        debug!(path = %path.display(), "loaded job config");
        Ok(config)
    }

    /// Build a job handle; `bucket` and `job_role` must be set by now.
    pub fn build_job(&self, job_folder: impl AsRef<Path>) -> Result<GlueJob> {
        let bucket = self
            .bucket
            .as_deref()
            .ok_or_else(|| EtlError::Misconfigured("missing `bucket`".into()))?;
        let job_role = self
            .job_role
            .as_deref()
            .ok_or_else(|| EtlError::Misconfigured("missing `job_role`".into()))?;

        let options = GlueJobOptions {
            job_name: self.job_name.clone(),
            job_arguments: self.arguments.clone(),
            include_shared_job_resources: self.include_shared_job_resources,
        };
        let mut job = GlueJob::new(job_folder, bucket, job_role, options)?;
        job.max_retries = self.max_retries;
        job.max_concurrent_runs = self.max_concurrent_runs;
        job.allocated_capacity = self.allocated_capacity;
        job.poll_interval = Duration::from_secs(self.poll_interval_secs);
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn fixture_job() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/glue_jobs/simple_etl_job")
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config: JobConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, JobConfig::default());
        assert!(config.include_shared_job_resources);
    }

    #[test]
    fn loads_yaml_and_builds_job() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("job.yaml");
        fs::write(
            &path,
            "bucket: alpha-everyone\njob_role: alpha_user_etl\nallocated_capacity: 5\narguments:\n  --snapshot_date: '2018-01-01'\n",
        )
        .unwrap();

        let config = JobConfig::load(&path).unwrap();
        let job = config.build_job(fixture_job()).unwrap();
        assert_eq!(job.allocated_capacity, 5);
        assert_eq!(job.max_retries, 0);
        assert_eq!(
            job.job_arguments().custom()["--snapshot_date"],
            "2018-01-01"
        );
    }

    #[test]
    fn reserved_argument_in_file_is_rejected() {
        let err = serde_yaml::from_str::<JobConfig>("arguments:\n  --JOB_NAME: x\n");
        assert!(err.is_err());
    }

    #[test]
    fn missing_bucket_is_misconfigured() {
        let config = JobConfig {
            job_role: Some("r".into()),
            ..Default::default()
        };
        match config.build_job(fixture_job()) {
            Err(EtlError::Misconfigured(msg)) => assert!(msg.contains("bucket")),
            other => panic!("expected Misconfigured, got {:?}", other),
        }
    }
}
