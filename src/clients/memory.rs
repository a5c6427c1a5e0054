// src/clients/memory.rs

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::{
    collections::{BTreeMap, VecDeque},
    fs,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use super::{CatalogClient, DeleteOutcome, JobRunStatus, JobService, ObjectStore};
use crate::job::definition::JobSubmission;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Object store kept in a map of `(bucket, key) → bytes`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn upload(&self, local_path: &Path, bucket: &str, key: &str) -> Result<()> {
        let bytes =
            fs::read(local_path).with_context(|| format!("reading {}", local_path.display()))?;
        lock(&self.objects).insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys(bucket)
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize> {
        let mut objects = lock(&self.objects);
        let before = objects.len();
        objects.retain(|(b, k), _| !(b == bucket && k.starts_with(prefix)));
        Ok(before - objects.len())
    }
}

/// Catalog holding database name → table definitions.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    databases: Mutex<BTreeMap<String, Vec<Value>>>,
}

impl CatalogClient for MemoryCatalog {
    fn create_database(&self, name: &str, _description: &str) -> Result<()> {
        let mut dbs = lock(&self.databases);
        if dbs.contains_key(name) {
            return Err(anyhow!("AlreadyExistsException: database `{}`", name));
        }
        dbs.insert(name.to_string(), Vec::new());
        Ok(())
    }

    fn delete_database(&self, name: &str) -> Result<DeleteOutcome> {
        Ok(match lock(&self.databases).remove(name) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    fn create_table(&self, database: &str, definition: &Value) -> Result<()> {
        let mut dbs = lock(&self.databases);
        let tables = dbs
            .get_mut(database)
            .ok_or_else(|| anyhow!("EntityNotFoundException: database `{}`", database))?;
        tables.push(definition.clone());
        Ok(())
    }

    fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        let dbs = lock(&self.databases);
        let tables = dbs
            .get(database)
            .ok_or_else(|| anyhow!("EntityNotFoundException: database `{}`", database))?;
        Ok(tables
            .iter()
            .filter_map(|t| t["Name"].as_str().map(str::to_string))
            .collect())
    }
}

/// Job service that replays a scripted sequence of run states.
///
/// Once the script runs out the last state is repeated. Every call is
/// appended to `calls` so tests can check ordering.
#[derive(Debug, Default)]
pub struct MemoryJobService {
    jobs: Mutex<BTreeMap<String, JobSubmission>>,
    runs: Mutex<Vec<(String, String, BTreeMap<String, String>)>>,
    script: Mutex<VecDeque<JobRunStatus>>,
    last: Mutex<Option<JobRunStatus>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryJobService {
    pub fn with_states(states: Vec<JobRunStatus>) -> Self {
        Self {
            script: Mutex::new(states.into()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn job(&self, name: &str) -> Option<JobSubmission> {
        lock(&self.jobs).get(name).cloned()
    }

    /// Arguments passed to the most recent run.
    pub fn last_run_arguments(&self) -> Option<BTreeMap<String, String>> {
        lock(&self.runs).last().map(|(_, _, args)| args.clone())
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }
}

impl JobService for MemoryJobService {
    fn create_job(&self, definition: &JobSubmission) -> Result<()> {
        self.record(format!("create_job:{}", definition.job_name));
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(&definition.job_name) {
            return Err(anyhow!(
                "AlreadyExistsException: job `{}`",
                definition.job_name
            ));
        }
        jobs.insert(definition.job_name.clone(), definition.clone());
        Ok(())
    }

    fn delete_job(&self, name: &str) -> Result<()> {
        self.record(format!("delete_job:{}", name));
        lock(&self.jobs).remove(name);
        Ok(())
    }

    fn start_job_run(&self, name: &str, arguments: &BTreeMap<String, String>) -> Result<String> {
        self.record(format!("start_job_run:{}", name));
        if !lock(&self.jobs).contains_key(name) {
            return Err(anyhow!("EntityNotFoundException: job `{}`", name));
        }
        let mut runs = lock(&self.runs);
        let run_id = format!("jr_{:04}", runs.len() + 1);
        runs.push((name.to_string(), run_id.clone(), arguments.clone()));
        Ok(run_id)
    }

    fn get_job_run(&self, name: &str, run_id: &str) -> Result<JobRunStatus> {
        self.record(format!("get_job_run:{}", name));
        let known = lock(&self.runs)
            .iter()
            .any(|(n, id, _)| n == name && id == run_id);
        if !known {
            return Err(anyhow!(
                "EntityNotFoundException: run `{}` of job `{}`",
                run_id,
                name
            ));
        }

        let mut last = lock(&self.last);
        let status = match lock(&self.script).pop_front() {
            Some(next) => next,
            None => last.clone().unwrap_or_else(|| JobRunStatus::new("RUNNING")),
        };
        *last = Some(status.clone());
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn object_store_prefix_delete() {
        let tmp = tempdir().unwrap();
        let f = tmp.path().join("a.txt");
        fs::write(&f, "a").unwrap();

        let store = MemoryObjectStore::default();
        store.upload(&f, "b", "p/1/a.txt").unwrap();
        store.upload(&f, "b", "p/2/a.txt").unwrap();
        store.upload(&f, "other", "p/1/a.txt").unwrap();

        assert_eq!(store.list("b", "p/1/").unwrap(), vec!["p/1/a.txt"]);
        assert_eq!(store.delete_prefix("b", "p/1/").unwrap(), 1);
        assert_eq!(store.keys("b"), vec!["p/2/a.txt"]);
        assert_eq!(store.keys("other").len(), 1);
        assert_eq!(store.get("b", "p/2/a.txt").unwrap(), b"a");
    }

    #[test]
    fn job_service_repeats_last_state() {
        let svc = MemoryJobService::with_states(vec![JobRunStatus::new("SUCCEEDED")]);
        assert!(svc.get_job_run("j", "nope").is_err());
        svc.jobs
            .lock()
            .unwrap()
            .insert("j".into(), JobSubmission::default());
        let id = svc.start_job_run("j", &BTreeMap::new()).unwrap();
        assert_eq!(svc.get_job_run("j", &id).unwrap().job_run_state, "SUCCEEDED");
        assert_eq!(svc.get_job_run("j", &id).unwrap().job_run_state, "SUCCEEDED");
    }
}
