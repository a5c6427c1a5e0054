// src/job/definition.rs

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use super::resources::JobResourceInventory;
use crate::{
    error::{EtlError, Result},
    utils::{base_name, join_path},
};

/// Top-level key namespace for every job run's resources.
pub const JOB_NAMESPACE: &str = "_GlueJobs_";

/// Arguments the job service or this crate sets itself.
pub const RESERVED_ARGUMENTS: &[&str] = &["--JOB_NAME", "--debug", "--mode", "--metadata_base_path"];

pub const METADATA_ARGUMENT: &str = "--metadata_base_path";

const COMMAND_NAME: &str = "glueetl";
const TEMP_FOLDER: &str = "glue_temp_folder/";

/// Where one run's resources live: `{namespace}/{job_name}/{run_id}/resources/`.
///
/// `run_id` is fixed when the job handle is created, so concurrent runs of
/// the same job name never share a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPrefix {
    pub bucket: String,
    pub job_name: String,
    pub run_id: String,
}

impl RunPrefix {
    pub fn new(bucket: &str, job_name: &str, run_id: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            job_name: job_name.to_string(),
            run_id: run_id.to_string(),
        }
    }

    pub fn key_prefix(&self) -> String {
        format!("{}/{}/{}/resources/", JOB_NAMESPACE, self.job_name, self.run_id)
    }

    pub fn s3_prefix(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key_prefix())
    }

    pub fn metadata_key_prefix(&self) -> String {
        join_path(&self.key_prefix(), "meta_data")
    }

    pub fn metadata_s3_path(&self) -> String {
        join_path(&self.s3_prefix(), "meta_data")
    }

    /// Object key for a resource; every resource lands flat under the prefix.
    pub fn object_key(&self, path: &Path) -> String {
        format!("{}{}", self.key_prefix(), base_name(path))
    }

    pub fn s3_path(&self, path: &Path) -> String {
        format!("{}{}", self.s3_prefix(), base_name(path))
    }
}

/// Fail if two paths share a file name; they would overwrite each other under one prefix.
pub fn check_unique_basenames<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    let mut seen = HashSet::new();
    for p in paths {
        let name = base_name(p.as_ref());
        if !seen.insert(name.clone()) {
            return Err(EtlError::validation(format!(
                "duplicate resource file name `{}`; a job resource may share its name with a shared resource",
                name
            )));
        }
    }
    Ok(())
}

/// Caller-supplied run arguments. Keys start with `--` and avoid `RESERVED_ARGUMENTS`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct JobArguments(BTreeMap<String, String>);

impl JobArguments {
    pub fn new(arguments: BTreeMap<String, String>) -> Result<Self> {
        for key in arguments.keys() {
            if !key.starts_with("--") || RESERVED_ARGUMENTS.contains(&key.as_str()) {
                return Err(EtlError::validation(format!(
                    "bad job argument `{}`: arguments must begin with `--` and cannot be one of {}",
                    key,
                    RESERVED_ARGUMENTS.join(", ")
                )));
            }
        }
        Ok(Self(arguments))
    }

    pub fn custom(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// The custom arguments plus `--metadata_base_path`.
    pub fn with_metadata_base_path(&self, metadata_base_path: &str) -> BTreeMap<String, String> {
        let mut all = self.0.clone();
        all.insert(METADATA_ARGUMENT.to_string(), metadata_base_path.to_string());
        all
    }
}

impl TryFrom<BTreeMap<String, String>> for JobArguments {
    type Error = EtlError;

    fn try_from(value: BTreeMap<String, String>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<JobArguments> for BTreeMap<String, String> {
    fn from(value: JobArguments) -> Self {
        value.0
    }
}

/// Per-job knobs that feed the submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub job_name: String,
    pub job_role: String,
    pub max_retries: u32,
    pub max_concurrent_runs: u32,
    pub allocated_capacity: u32,
    pub arguments: JobArguments,
}

/// Everything sent to the job service for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSubmission {
    pub job_name: String,
    pub job_role: String,
    pub script_location: String,
    pub temp_dir: String,
    pub extra_files: Option<String>,
    pub extra_py_files: Option<String>,
    pub max_retries: u32,
    pub allocated_capacity: u32,
    pub max_concurrent_runs: u32,
    pub arguments: BTreeMap<String, String>,
}

impl JobSubmission {
    /// Assemble the submission from a resource inventory.
    ///
    /// `fetched_archives` are remote archives already downloaded and
    /// repackaged; they ship as python resources.
    pub fn build(
        settings: &JobSettings,
        prefix: &RunPrefix,
        inventory: &JobResourceInventory,
        fetched_archives: &[PathBuf],
    ) -> Result<Self> {
        let mut all: Vec<&PathBuf> = vec![&inventory.script];
        all.extend(inventory.py_resources.iter());
        all.extend(inventory.resources.iter());
        all.extend(fetched_archives.iter());
        check_unique_basenames(&all)?;

        Ok(Self {
            job_name: settings.job_name.clone(),
            job_role: settings.job_role.clone(),
            script_location: prefix.s3_path(&inventory.script),
            temp_dir: format!("{}{}", prefix.s3_prefix(), TEMP_FOLDER),
            extra_files: remote_list(prefix, inventory.resources.iter()),
            extra_py_files: remote_list(
                prefix,
                inventory.py_resources.iter().chain(fetched_archives.iter()),
            ),
            max_retries: settings.max_retries,
            allocated_capacity: settings.allocated_capacity,
            max_concurrent_runs: settings.max_concurrent_runs,
            arguments: settings
                .arguments
                .with_metadata_base_path(&prefix.metadata_s3_path()),
        })
    }

    /// Job-level default arguments. The extra file lists are left out when empty.
    pub fn default_arguments(&self) -> BTreeMap<String, String> {
        let mut args = BTreeMap::new();
        args.insert("--TempDir".to_string(), self.temp_dir.clone());
        args.insert(
            "--job-bookmark-option".to_string(),
            "job-bookmark-disable".to_string(),
        );
        if let Some(files) = &self.extra_files {
            args.insert("--extra-files".to_string(), files.clone());
        }
        if let Some(files) = &self.extra_py_files {
            args.insert("--extra-py-files".to_string(), files.clone());
        }
        args
    }

    /// The create-job request body in the job service's shape.
    pub fn to_payload(&self) -> Value {
        json!({
            "Name": self.job_name,
            "Role": self.job_role,
            "ExecutionProperty": { "MaxConcurrentRuns": self.max_concurrent_runs },
            "Command": {
                "Name": COMMAND_NAME,
                "ScriptLocation": self.script_location,
            },
            "DefaultArguments": self.default_arguments(),
            "MaxRetries": self.max_retries,
            "AllocatedCapacity": self.allocated_capacity,
        })
    }
}

/// Comma-joined remote paths, or `None` for an empty list.
fn remote_list<'a>(prefix: &RunPrefix, paths: impl Iterator<Item = &'a PathBuf>) -> Option<String> {
    let list: Vec<String> = paths.map(|p| prefix.s3_path(p)).collect();
    if list.is_empty() {
        None
    } else {
        Some(list.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(args: BTreeMap<String, String>) -> JobSettings {
        JobSettings {
            job_name: "simple_etl_job".into(),
            job_role: "etl_role".into(),
            max_retries: 0,
            max_concurrent_runs: 1,
            allocated_capacity: 2,
            arguments: JobArguments::new(args).unwrap(),
        }
    }

    fn prefix() -> RunPrefix {
        RunPrefix::new("alpha-everyone", "simple_etl_job", "1700000000")
    }

    fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn prefix_layout() {
        let p = prefix();
        assert_eq!(p.key_prefix(), "_GlueJobs_/simple_etl_job/1700000000/resources/");
        assert_eq!(
            p.metadata_s3_path(),
            "s3://alpha-everyone/_GlueJobs_/simple_etl_job/1700000000/resources/meta_data"
        );
        assert_eq!(
            p.object_key(Path::new("x/y/job.py")),
            "_GlueJobs_/simple_etl_job/1700000000/resources/job.py"
        );
    }

    #[test]
    fn argument_contract() {
        assert!(JobArguments::new(args(&[("--JOB_NAME", "x")])).is_err());
        assert!(JobArguments::new(args(&[("--metadata_base_path", "x")])).is_err());
        assert!(matches!(
            JobArguments::new(args(&[("bad", "x")])),
            Err(EtlError::Validation(_))
        ));

        let ok = JobArguments::new(args(&[("--custom", "x")])).unwrap();
        let all = ok.with_metadata_base_path("s3://b/meta");
        assert_eq!(all["--custom"], "x");
        assert_eq!(all["--metadata_base_path"], "s3://b/meta");
    }

    #[test]
    fn arguments_validate_when_deserialized() {
        let bad: std::result::Result<JobArguments, _> =
            serde_json::from_str(r#"{"--debug": "true"}"#);
        assert!(bad.is_err());
        let good: JobArguments = serde_json::from_str(r#"{"--x": "1"}"#).unwrap();
        assert_eq!(good.custom().len(), 1);
    }

    #[test]
    fn duplicate_basenames_are_rejected() {
        let inv = JobResourceInventory {
            script: "job/job.py".into(),
            py_resources: vec!["a/x.py".into(), "b/x.py".into()],
            ..Default::default()
        };
        assert!(matches!(
            JobSubmission::build(&settings(BTreeMap::new()), &prefix(), &inv, &[]),
            Err(EtlError::Validation(_))
        ));

        let inv = JobResourceInventory {
            script: "job/job.py".into(),
            resources: vec!["data/lookup.csv".into()],
            ..Default::default()
        };
        let fetched = vec![PathBuf::from("tmp/lookup.csv")];
        assert!(JobSubmission::build(&settings(BTreeMap::new()), &prefix(), &inv, &fetched).is_err());
    }

    #[test]
    fn empty_lists_are_omitted() {
        let inv = JobResourceInventory {
            script: "job/job.py".into(),
            ..Default::default()
        };
        let sub = JobSubmission::build(&settings(BTreeMap::new()), &prefix(), &inv, &[]).unwrap();
        assert_eq!(sub.extra_files, None);
        assert_eq!(sub.extra_py_files, None);
        let payload = sub.to_payload();
        let defaults = payload["DefaultArguments"].as_object().unwrap();
        assert!(!defaults.contains_key("--extra-files"));
        assert!(!defaults.contains_key("--extra-py-files"));
        assert_eq!(
            payload["Command"]["ScriptLocation"],
            "s3://alpha-everyone/_GlueJobs_/simple_etl_job/1700000000/resources/job.py"
        );
    }

    #[test]
    fn lists_are_comma_joined_remote_paths() {
        let inv = JobResourceInventory {
            script: "job/job.py".into(),
            py_resources: vec!["job/py/utils.py".into()],
            resources: vec!["job/data/a.sql".into(), "shared/data/b.json".into()],
            ..Default::default()
        };
        let fetched = vec![PathBuf::from("/tmp/x/gluejobutils.zip")];
        let sub = JobSubmission::build(
            &settings(args(&[("--custom", "x")])),
            &prefix(),
            &inv,
            &fetched,
        )
        .unwrap();
        let base = prefix().s3_prefix();
        assert_eq!(
            sub.extra_files.as_deref(),
            Some(format!("{base}a.sql,{base}b.json").as_str())
        );
        assert_eq!(
            sub.extra_py_files.as_deref(),
            Some(format!("{base}utils.py,{base}gluejobutils.zip").as_str())
        );
        assert_eq!(sub.temp_dir, format!("{base}glue_temp_folder/"));
        assert_eq!(sub.arguments.len(), 2);
        assert_eq!(sub.arguments["--metadata_base_path"], prefix().metadata_s3_path());
        assert_eq!(
            sub.to_payload()["DefaultArguments"]["--job-bookmark-option"],
            "job-bookmark-disable"
        );
    }
}
