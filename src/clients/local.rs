// src/clients/local.rs

use anyhow::{Context, Result};
use glob::{glob, Pattern};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use super::ObjectStore;

/// Object store mirrored onto a local directory: `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key.trim_start_matches('/'))
    }
}

impl ObjectStore for LocalObjectStore {
    fn upload(&self, local_path: &Path, bucket: &str, key: &str) -> Result<()> {
        let dest = self.object_path(bucket, key);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::copy(local_path, &dest).with_context(|| {
            format!("copying {} -> {}", local_path.display(), dest.display())
        })?;
        debug!(key = %key, dest = %dest.display(), "stored object");
        Ok(())
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let bucket_dir = self.root.join(bucket);
        if !bucket_dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = format!("{}/**/*", Pattern::escape(&bucket_dir.to_string_lossy()));
        let mut keys = Vec::new();
        for entry in glob(&pattern)? {
            let path = entry?;
            if !path.is_file() {
                continue;
            }
            let rel = path.strip_prefix(&bucket_dir).with_context(|| {
                format!(
                    "path {} is not under {}",
                    path.display(),
                    bucket_dir.display()
                )
            })?;
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize> {
        let keys = self.list(bucket, prefix)?;
        for key in &keys {
            let path = self.object_path(bucket, key);
            fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mirrors_into_directory() {
        let src = tempdir().unwrap();
        let f = src.path().join("job.py");
        fs::write(&f, "print(1)").unwrap();

        let root = tempdir().unwrap();
        let store = LocalObjectStore::new(root.path());
        store.upload(&f, "bkt", "_GlueJobs_/j/1/resources/job.py").unwrap();
        store.upload(&f, "bkt", "_GlueJobs_/j/2/resources/job.py").unwrap();

        assert!(root
            .path()
            .join("bkt/_GlueJobs_/j/1/resources/job.py")
            .is_file());
        assert_eq!(
            store.list("bkt", "_GlueJobs_/j/1/").unwrap(),
            vec!["_GlueJobs_/j/1/resources/job.py"]
        );
        assert_eq!(store.delete_prefix("bkt", "_GlueJobs_/j/1/").unwrap(), 1);
        assert_eq!(store.list("bkt", "").unwrap().len(), 1);
        assert!(store.list("missing", "").unwrap().is_empty());
    }
}
