// src/job/resources.rs

use glob::{glob, Pattern};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::error::{EtlError, Result};

pub const SCRIPT_FILE: &str = "job.py";
pub const PY_RESOURCES_DIR: &str = "py_resources";
pub const DATA_RESOURCES_DIR: &str = "data_resources";
pub const SHARED_RESOURCES_DIR: &str = "shared_job_resources";
pub const ZIP_URLS_FILE: &str = "github_zip_urls.txt";
pub const METADATA_DIR: &str = "meta_data";

static PY_RESOURCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r".+\.(py|zip)$").expect("py resource pattern should be valid"));
static DATA_RESOURCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r".+\.(sql|json|csv|txt)$").expect("data resource pattern should be valid")
});

/// Shorter lines in a urls file are treated as blank.
const MIN_URL_LEN: usize = 11;

/// Everything a job run needs uploaded, as found on local disk.
///
/// Layout, with `shared_job_resources/` a sibling of the job folder:
/// ```text
/// etl_root/
///   meta_data/**/*.json
///   glue_jobs/
///     shared_job_resources/{py_resources,data_resources}/
///     my_job/
///       job.py
///       py_resources/    .py, .zip, github_zip_urls.txt
///       data_resources/  .sql, .json, .csv, .txt
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobResourceInventory {
    pub script: PathBuf,
    pub py_resources: Vec<PathBuf>,
    pub resources: Vec<PathBuf>,
    pub metadata_root: PathBuf,
    pub metadata_paths: Vec<PathBuf>,
    pub github_zip_urls: Vec<String>,
}

impl JobResourceInventory {
    /// Scan `job_folder` (and the shared folder next to it, if `include_shared`).
    ///
    /// The job's own files come first, then the shared ones; each directory
    /// listing is sorted by name.
    pub fn discover(job_folder: &Path, include_shared: bool) -> Result<Self> {
        let script = job_folder.join(SCRIPT_FILE);
        if !script.is_file() {
            return Err(EtlError::validation(format!(
                "could not find {} in job folder {}",
                SCRIPT_FILE,
                job_folder.display()
            )));
        }

        let parent = job_folder.parent().unwrap_or(Path::new(""));
        let etl_root = parent.parent().unwrap_or(Path::new(""));
        let shared = parent.join(SHARED_RESOURCES_DIR);

        let mut folders = vec![job_folder.to_path_buf()];
        if include_shared {
            folders.push(shared);
        }

        let mut inventory = Self {
            script,
            metadata_root: etl_root.join(METADATA_DIR),
            ..Default::default()
        };
        for folder in &folders {
            let py_dir = folder.join(PY_RESOURCES_DIR);
            inventory
                .py_resources
                .extend(list_folder_with_regex(&py_dir, &PY_RESOURCE)?);
            inventory.resources.extend(list_folder_with_regex(
                &folder.join(DATA_RESOURCES_DIR),
                &DATA_RESOURCE,
            )?);
            inventory
                .github_zip_urls
                .extend(read_zip_urls(&py_dir.join(ZIP_URLS_FILE))?);
        }
        inventory.metadata_paths = metadata_paths(&inventory.metadata_root)?;

        debug!(
            job_folder = %job_folder.display(),
            py = inventory.py_resources.len(),
            data = inventory.resources.len(),
            metadata = inventory.metadata_paths.len(),
            urls = inventory.github_zip_urls.len(),
            "discovered job resources"
        );
        Ok(inventory)
    }

    /// Key of a metadata file relative to the `meta_data` folder, `/`-separated.
    pub fn metadata_key(&self, path: &Path) -> Result<String> {
        let rel = path.strip_prefix(&self.metadata_root).map_err(|_| {
            EtlError::validation(format!(
                "{} is not under {}",
                path.display(),
                self.metadata_root.display()
            ))
        })?;
        Ok(rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }
}

/// Files directly inside `folder` whose name matches `pattern`, sorted. A missing folder is empty.
fn list_folder_with_regex(folder: &Path, pattern: &Regex) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Ok(Vec::new());
    }
    let mut listing = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| pattern.is_match(n));
        if path.is_file() && matches {
            listing.push(path);
        }
    }
    listing.sort();
    Ok(listing)
}

fn read_zip_urls(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| l.len() >= MIN_URL_LEN)
        .map(str::to_string)
        .collect())
}

/// Every `*.json` under `metadata_root`, recursively.
pub fn metadata_paths(metadata_root: &Path) -> Result<Vec<PathBuf>> {
    if !metadata_root.is_dir() {
        return Ok(Vec::new());
    }
    let root = Pattern::escape(&metadata_root.to_string_lossy());
    let pattern = format!("{}/**/*.json", root);
    let entries = glob(&pattern).map_err(|e| {
        EtlError::validation(format!("bad metadata pattern `{}`: {}", pattern, e))
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        paths.push(entry.map_err(|e| EtlError::Io(e.into_error()))?);
    }
    paths.sort();
    Ok(paths)
}
