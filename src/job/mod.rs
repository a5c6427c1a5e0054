//! Job packaging and the run lifecycle.
//!
//! A `GlueJob` owns one run-scoped prefix (fixed when the handle is built)
//! and at most one remote run id. Submission deletes any existing job of
//! the same name, creates it again and starts a run; that sequence is not
//! atomic, so two handles submitting the same job name can race.

pub mod archive;
pub mod definition;
pub mod resources;

use chrono::Utc;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicI64, Ordering},
    thread,
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    clients::{JobRunStatus, JobService, ObjectStore},
    error::{EtlError, Result},
    utils::{base_name, join_path, validate_string},
};
use archive::ArchiveFetcher;
use definition::{check_unique_basenames, JobArguments, JobSettings, JobSubmission, RunPrefix};
use resources::JobResourceInventory;

const JOB_NAME_CHARS: &str = "-_:";
const BUCKET_CHARS: &str = "-.";
const UNKNOWN_ERROR: &str = "Unknown";

static LAST_RUN_EPOCH: AtomicI64 = AtomicI64::new(0);

/// Millisecond epoch id, strictly increasing within the process.
fn next_run_epoch_id() -> String {
    let now = Utc::now().timestamp_millis();
    let prev = LAST_RUN_EPOCH
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(prev + 1).to_string()
}

/// Local view of a run. The last four are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    NotStarted,
    Submitted,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Stopped,
}

impl JobState {
    /// Map a remote run state. Unrecognised states map to `None`.
    pub fn from_remote(state: &str) -> Option<Self> {
        match state {
            "STARTING" | "RUNNING" | "STOPPING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "TIMEOUT" => Some(Self::TimedOut),
            "STOPPED" => Some(Self::Stopped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Stopped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Submitted => "SUBMITTED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMEOUT",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional construction parameters for `GlueJob::new`.
#[derive(Debug, Clone)]
pub struct GlueJobOptions {
    /// Defaults to the job folder's name.
    pub job_name: Option<String>,
    pub job_arguments: JobArguments,
    pub include_shared_job_resources: bool,
}

impl Default for GlueJobOptions {
    fn default() -> Self {
        Self {
            job_name: None,
            job_arguments: JobArguments::default(),
            include_shared_job_resources: true,
        }
    }
}

/// The remote collaborators a submission talks to.
#[derive(Clone, Copy)]
pub struct GlueServices<'a> {
    pub jobs: &'a dyn JobService,
    pub store: &'a dyn ObjectStore,
    pub fetcher: &'a dyn ArchiveFetcher,
}

#[derive(Debug)]
pub struct GlueJob {
    job_folder: PathBuf,
    bucket: String,
    job_role: String,
    job_name: String,
    arguments: JobArguments,
    include_shared: bool,
    inventory: JobResourceInventory,
    github_py_resources: Vec<PathBuf>,
    job_id: String,
    job_run_id: Option<String>,
    state: JobState,
    pub max_retries: u32,
    pub max_concurrent_runs: u32,
    pub allocated_capacity: u32,
    pub poll_interval: Duration,
}

impl GlueJob {
    /// Build a job handle from a job folder on disk.
    ///
    /// Resources are discovered straight away, so a folder without a
    /// script fails here with a validation error.
    pub fn new(
        job_folder: impl AsRef<Path>,
        bucket: &str,
        job_role: &str,
        options: GlueJobOptions,
    ) -> Result<Self> {
        let job_folder = job_folder.as_ref();
        let job_folder = if job_folder.is_absolute() {
            job_folder.to_path_buf()
        } else {
            std::env::current_dir()?.join(job_folder)
        };

        let job_name = match options.job_name {
            Some(name) => name,
            None => base_name(&job_folder),
        };
        validate_string(&job_name, JOB_NAME_CHARS)?;
        validate_string(bucket, BUCKET_CHARS)?;

        let inventory =
            JobResourceInventory::discover(&job_folder, options.include_shared_job_resources)?;

        let job = Self {
            job_folder,
            bucket: bucket.to_string(),
            job_role: job_role.to_string(),
            job_name,
            arguments: options.job_arguments,
            include_shared: options.include_shared_job_resources,
            inventory,
            github_py_resources: Vec::new(),
            job_id: next_run_epoch_id(),
            job_run_id: None,
            state: JobState::NotStarted,
            max_retries: 0,
            max_concurrent_runs: 1,
            allocated_capacity: 2,
            poll_interval: Duration::from_secs(10),
        };
        debug!(job = %job.job_name, job_id = %job.job_id, "job handle created");
        Ok(job)
    }

    pub fn job_folder(&self) -> &Path {
        &self.job_folder
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn set_job_name(&mut self, job_name: &str) -> Result<()> {
        validate_string(job_name, JOB_NAME_CHARS)?;
        self.job_name = job_name.to_string();
        Ok(())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn set_bucket(&mut self, bucket: &str) -> Result<()> {
        validate_string(bucket, BUCKET_CHARS)?;
        self.bucket = bucket.to_string();
        Ok(())
    }

    pub fn job_role(&self) -> &str {
        &self.job_role
    }

    pub fn set_job_role(&mut self, job_role: &str) {
        self.job_role = job_role.to_string();
    }

    pub fn job_arguments(&self) -> &JobArguments {
        &self.arguments
    }

    pub fn set_job_arguments(&mut self, arguments: JobArguments) {
        self.arguments = arguments;
    }

    pub fn include_shared_job_resources(&self) -> bool {
        self.include_shared
    }

    pub fn inventory(&self) -> &JobResourceInventory {
        &self.inventory
    }

    pub fn resources(&self) -> &[PathBuf] {
        &self.inventory.resources
    }

    pub fn py_resources(&self) -> &[PathBuf] {
        &self.inventory.py_resources
    }

    pub fn github_zip_urls(&self) -> &[String] {
        &self.inventory.github_zip_urls
    }

    /// Repackaged archive names from the last sync.
    pub fn github_py_resources(&self) -> &[PathBuf] {
        &self.github_py_resources
    }

    /// Run epoch id, fixed for the handle's lifetime.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn job_run_id(&self) -> Option<&str> {
        self.job_run_id.as_deref()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn run_prefix(&self) -> RunPrefix {
        RunPrefix::new(&self.bucket, &self.job_name, &self.job_id)
    }

    pub fn s3_job_folder(&self) -> String {
        self.run_prefix().s3_prefix()
    }

    pub fn s3_metadata_base_folder(&self) -> String {
        self.run_prefix().metadata_s3_path()
    }

    fn settings(&self) -> JobSettings {
        JobSettings {
            job_name: self.job_name.clone(),
            job_role: self.job_role.clone(),
            max_retries: self.max_retries,
            max_concurrent_runs: self.max_concurrent_runs,
            allocated_capacity: self.allocated_capacity,
            arguments: self.arguments.clone(),
        }
    }

    fn require_configured(&self) -> Result<()> {
        if self.job_name.is_empty() {
            return Err(EtlError::Misconfigured("missing `job_name`".into()));
        }
        if self.job_role.is_empty() {
            return Err(EtlError::Misconfigured("missing `job_role`".into()));
        }
        Ok(())
    }

    /// Upload every job resource, fetched archive and metadata file under the run prefix.
    ///
    /// Whatever was under the prefix before is removed first.
    pub fn sync_job_to_s3_folder(
        &mut self,
        store: &dyn ObjectStore,
        fetcher: &dyn ArchiveFetcher,
    ) -> Result<()> {
        // 1. fetch and repackage remote archives
        let scratch = tempfile::tempdir()?;
        let mut fetched = Vec::new();
        for url in &self.inventory.github_zip_urls {
            fetched.push(fetcher.fetch(url, scratch.path())?);
        }

        let mut uploads: Vec<&PathBuf> = vec![&self.inventory.script];
        uploads.extend(self.inventory.py_resources.iter());
        uploads.extend(self.inventory.resources.iter());
        uploads.extend(fetched.iter());
        check_unique_basenames(&uploads)?;

        // 2. clear the prefix
        let prefix = self.run_prefix();
        let removed = self.delete_s3_job_temp_folder(store)?;
        if removed > 0 {
            debug!(prefix = %prefix.key_prefix(), removed, "cleared run prefix");
        }

        // 3. flat resources
        for path in &uploads {
            store.upload(path, &self.bucket, &prefix.object_key(path))?;
        }

        // 4. metadata keeps its folder structure
        let metadata_prefix = prefix.metadata_key_prefix();
        for path in &self.inventory.metadata_paths {
            let key = join_path(&metadata_prefix, &self.inventory.metadata_key(path)?);
            store.upload(path, &self.bucket, &key)?;
        }

        info!(
            job = %self.job_name,
            prefix = %prefix.s3_prefix(),
            files = uploads.len(),
            metadata = self.inventory.metadata_paths.len(),
            "synced job resources"
        );

        self.github_py_resources = fetched
            .iter()
            .map(|p| PathBuf::from(base_name(p)))
            .collect();
        Ok(())
    }

    /// The submission for this job. Archives only appear once they have been synced.
    pub fn job_definition(&self) -> Result<JobSubmission> {
        JobSubmission::build(
            &self.settings(),
            &self.run_prefix(),
            &self.inventory,
            &self.github_py_resources,
        )
    }

    /// Replace the remote job definition and start a run.
    pub fn run_job(&mut self, services: &GlueServices<'_>, sync_before_run: bool) -> Result<()> {
        self.require_configured()?;

        services.jobs.delete_job(&self.job_name)?;
        if sync_before_run {
            self.sync_job_to_s3_folder(services.store, services.fetcher)?;
        }

        let submission = self.job_definition()?;
        services.jobs.create_job(&submission)?;
        let run_id = services
            .jobs
            .start_job_run(&self.job_name, &submission.arguments)?;

        info!(job = %self.job_name, run_id = %run_id, "job run started");
        self.job_run_id = Some(run_id);
        self.state = JobState::Submitted;
        Ok(())
    }

    fn run_id(&self) -> Result<&str> {
        self.job_run_id.as_deref().ok_or_else(|| {
            EtlError::NotStarted(format!("job `{}` has no run id", self.job_name))
        })
    }

    /// Current status document of the recorded run.
    pub fn job_status(&self, jobs: &dyn JobService) -> Result<JobRunStatus> {
        let run_id = self.run_id()?;
        if self.job_name.is_empty() {
            return Err(EtlError::Misconfigured("missing `job_name`".into()));
        }
        Ok(jobs.get_job_run(&self.job_name, run_id)?)
    }

    pub fn job_run_state(&self, jobs: &dyn JobService) -> Result<String> {
        Ok(self.job_status(jobs)?.job_run_state)
    }

    pub fn is_running(&self, jobs: &dyn JobService) -> Result<bool> {
        Ok(self.job_run_state(jobs)? == "RUNNING")
    }

    /// Poll every `poll_interval` until the run ends.
    ///
    /// There is no cap on the wait; a run that never leaves a non-terminal
    /// state blocks forever.
    pub fn wait_for_completion(&mut self, jobs: &dyn JobService) -> Result<()> {
        self.run_id()?;
        loop {
            thread::sleep(self.poll_interval);
            let status = self.job_status(jobs)?;
            if let Some(state) = JobState::from_remote(&status.job_run_state) {
                self.state = state;
            }

            let message = || {
                status
                    .error_message
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
            };
            match status.job_run_state.as_str() {
                "SUCCEEDED" => {
                    info!(job = %self.job_name, "job run succeeded");
                    return Ok(());
                }
                "FAILED" => {
                    warn!(job = %self.job_name, error = %message(), "job run failed");
                    return Err(EtlError::JobFailed(message()));
                }
                "TIMEOUT" => {
                    warn!(job = %self.job_name, "job run timed out");
                    return Err(EtlError::JobTimedOut(message()));
                }
                "STOPPED" => {
                    warn!(job = %self.job_name, "job run stopped");
                    return Err(EtlError::JobStopped(message()));
                }
                other => debug!(job = %self.job_name, state = %other, "polled"),
            }
        }
    }

    /// Remove the remote job and everything under the run prefix. Safe to repeat.
    pub fn cleanup(&self, jobs: &dyn JobService, store: &dyn ObjectStore) -> Result<()> {
        self.delete_job(jobs)?;
        let removed = self.delete_s3_job_temp_folder(store)?;
        info!(job = %self.job_name, removed, "cleaned up job");
        Ok(())
    }

    pub fn delete_job(&self, jobs: &dyn JobService) -> Result<()> {
        jobs.delete_job(&self.job_name)?;
        Ok(())
    }

    /// Delete every object under the run prefix, returning how many went.
    pub fn delete_s3_job_temp_folder(&self, store: &dyn ObjectStore) -> Result<usize> {
        Ok(store.delete_prefix(&self.bucket, &self.run_prefix().key_prefix())?)
    }
}
