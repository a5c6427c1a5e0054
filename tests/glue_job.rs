use etl_manager::{
    clients::{
        local::LocalObjectStore,
        memory::{MemoryJobService, MemoryObjectStore},
        JobRunStatus, ObjectStore,
    },
    job::{archive::ArchiveFetcher, definition::JobArguments},
    EtlError, GlueJob, GlueJobOptions, GlueServices, JobState,
};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::tempdir;

const GLUEJOBUTILS_URL: &str =
    "https://github.com/moj-analytical-services/gluejobutils/archive/master.zip";

/// Stands in for the network: every url becomes `gluejobutils.zip`.
struct LocalFetcher;

impl ArchiveFetcher for LocalFetcher {
    fn fetch(&self, _url: &str, dest_dir: &Path) -> anyhow::Result<PathBuf> {
        let out = dest_dir.join("gluejobutils.zip");
        fs::write(&out, b"PK")?;
        Ok(out)
    }
}

fn job_folder() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/glue_jobs/simple_etl_job")
}

fn names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect()
}

fn custom_arguments() -> JobArguments {
    let mut args = BTreeMap::new();
    args.insert("--custom".to_string(), "x".to_string());
    JobArguments::new(args).unwrap()
}

#[test]
fn inventory_from_job_folder() {
    let job = GlueJob::new(
        job_folder(),
        "alpha-everyone",
        "alpha_user_etl",
        GlueJobOptions::default(),
    )
    .unwrap();

    assert_eq!(names(job.resources()), vec!["employees.json", "teams.json"]);
    assert_eq!(names(job.py_resources()), vec!["my_dummy_utils.zip"]);
    assert_eq!(job.github_zip_urls(), [GLUEJOBUTILS_URL.to_string()]);
    assert_eq!(job.max_retries, 0);
    assert_eq!(job.max_concurrent_runs, 1);
    assert_eq!(job.allocated_capacity, 2);

    let own_only = GlueJob::new(
        job_folder(),
        "alpha-everyone",
        "alpha_user_etl",
        GlueJobOptions {
            include_shared_job_resources: false,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(names(own_only.resources()), vec!["employees.json"]);
    assert!(own_only.py_resources().is_empty());
}

#[test]
fn run_arguments_carry_metadata_path() {
    let mut job = GlueJob::new(
        job_folder(),
        "alpha-everyone",
        "alpha_user_etl",
        GlueJobOptions {
            job_arguments: custom_arguments(),
            ..Default::default()
        },
    )
    .unwrap();
    job.poll_interval = Duration::ZERO;

    let svc = MemoryJobService::with_states(vec![
        JobRunStatus::new("RUNNING"),
        JobRunStatus::new("RUNNING"),
        JobRunStatus::new("SUCCEEDED"),
    ]);
    let store = MemoryObjectStore::default();
    let services = GlueServices {
        jobs: &svc,
        store: &store,
        fetcher: &LocalFetcher,
    };
    job.run_job(&services, true).unwrap();

    let args = svc.last_run_arguments().unwrap();
    assert_eq!(args["--custom"], "x");
    assert!(args["--metadata_base_path"].contains("_GlueJobs_"));
    assert_eq!(args["--metadata_base_path"], job.s3_metadata_base_folder());

    let payload = svc.job("simple_etl_job").unwrap().to_payload();
    let extra_files = payload["DefaultArguments"]["--extra-files"]
        .as_str()
        .unwrap();
    assert!(extra_files.ends_with("employees.json") || extra_files.ends_with("teams.json"));
    assert_eq!(extra_files.split(',').count(), 2);

    job.wait_for_completion(&svc).unwrap();
    assert_eq!(job.state(), JobState::Succeeded);
}

#[test]
fn failed_run_surfaces_error_text() {
    let mut job = GlueJob::new(
        job_folder(),
        "alpha-everyone",
        "alpha_user_etl",
        GlueJobOptions::default(),
    )
    .unwrap();
    job.poll_interval = Duration::ZERO;

    let svc = MemoryJobService::with_states(vec![
        JobRunStatus::new("RUNNING"),
        JobRunStatus::with_error("FAILED", "NameError: name 'spark' is not defined"),
    ]);
    let store = MemoryObjectStore::default();
    let services = GlueServices {
        jobs: &svc,
        store: &store,
        fetcher: &LocalFetcher,
    };
    job.run_job(&services, false).unwrap();
    assert!(store.keys("alpha-everyone").is_empty());

    let err = job.wait_for_completion(&svc).unwrap_err();
    assert_eq!(err.exit_code(), 3);
    match err {
        EtlError::JobFailed(msg) => assert_eq!(msg, "NameError: name 'spark' is not defined"),
        other => panic!("expected JobFailed, got {:?}", other),
    }
}

#[test]
fn staging_into_a_directory_store() {
    let root = tempdir().unwrap();
    let store = LocalObjectStore::new(root.path());
    let mut job = GlueJob::new(
        job_folder(),
        "alpha-everyone",
        "alpha_user_etl",
        GlueJobOptions::default(),
    )
    .unwrap();

    job.sync_job_to_s3_folder(&store, &LocalFetcher).unwrap();
    assert_eq!(names(job.github_py_resources()), vec!["gluejobutils.zip"]);

    let prefix = job.run_prefix().key_prefix();
    let keys = store.list("alpha-everyone", &prefix).unwrap();
    for file in [
        "job.py",
        "employees.json",
        "teams.json",
        "my_dummy_utils.zip",
        "gluejobutils.zip",
        "meta_data/db1/database.json",
        "meta_data/db1/teams.json",
    ] {
        assert!(keys.contains(&format!("{prefix}{file}")), "{file} missing");
    }

    // a second sync replaces rather than accumulates
    job.sync_job_to_s3_folder(&store, &LocalFetcher).unwrap();
    assert_eq!(store.list("alpha-everyone", &prefix).unwrap(), keys);

    assert_eq!(job.delete_s3_job_temp_folder(&store).unwrap(), keys.len());
    assert!(store.list("alpha-everyone", &prefix).unwrap().is_empty());
}

#[test]
fn bad_identifiers_fail_at_construction() {
    let err = GlueJob::new(
        job_folder(),
        "Alpha_Everyone",
        "alpha_user_etl",
        GlueJobOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, EtlError::Validation(_)));

    let err = GlueJob::new(
        job_folder(),
        "alpha-everyone",
        "alpha_user_etl",
        GlueJobOptions {
            job_name: Some("bad name".into()),
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, EtlError::Validation(_)));
}
