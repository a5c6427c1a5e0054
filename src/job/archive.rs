// src/job/archive.rs

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info};
use url::Url;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

/// Fetches a remote archive and leaves a job-ready zip in `dest_dir`.
pub trait ArchiveFetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// Downloads repository archives over HTTP and repackages them.
#[derive(Debug, Clone, Default)]
pub struct HttpArchiveFetcher {
    client: Client,
}

impl HttpArchiveFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ArchiveFetcher for HttpArchiveFetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        let download_dir = tempfile::tempdir().context("creating download dir")?;
        let downloaded = download_zip(&self.client, url, download_dir.path())?;
        let out = repackage_github_zip(&downloaded, dest_dir)?;
        info!(url = %url, zip = %out.display(), "fetched remote archive");
        Ok(out)
    }
}

/// Download `url_str` into `dest_dir`, keeping the URL's file name.
pub fn download_zip(client: &Client, url_str: &str, dest_dir: &Path) -> Result<PathBuf> {
    let url = Url::parse(url_str).with_context(|| format!("parsing url {}", url_str))?;
    let filename = url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .unwrap_or("download.zip");
    let dest_path = dest_dir.join(filename);
    fs::create_dir_all(dest_dir)?;

    let resp = client
        .get(url.as_str())
        .send()
        .with_context(|| format!("requesting {}", url))?
        .error_for_status()?;
    let bytes = resp.bytes()?;
    fs::write(&dest_path, &bytes)?;
    debug!(url = %url, bytes = bytes.len(), "downloaded");

    Ok(dest_path)
}

/// Turn a repository archive (`<repo>-<ref>/<package>/...`) into `<package>.zip`.
///
/// The archive's top folder is stripped and its whole content re-zipped, so
/// the package directory sits at the root of the new zip.
pub fn repackage_github_zip(zip_path: &Path, out_dir: &Path) -> Result<PathBuf> {
    let unpacked = tempfile::tempdir().context("creating unpack dir")?;
    let file =
        File::open(zip_path).with_context(|| format!("opening {}", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)?;
    archive
        .extract(unpacked.path())
        .with_context(|| format!("extracting {}", zip_path.display()))?;

    let top = first_subdir(unpacked.path())?
        .ok_or_else(|| anyhow!("{} has no top-level folder", zip_path.display()))?;
    let package = first_subdir(&top)?
        .ok_or_else(|| anyhow!("{} has no package folder", zip_path.display()))?;
    let package_name = package
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("unnamed package folder in {}", zip_path.display()))?;

    fs::create_dir_all(out_dir)?;
    let out = out_dir.join(format!("{}.zip", package_name));
    zip_dir(&top, &out)?;
    Ok(out)
}

fn first_subdir(dir: &Path) -> Result<Option<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs.into_iter().next())
}

fn zip_dir(src: &Path, out: &Path) -> Result<()> {
    let file = File::create(out).with_context(|| format!("creating {}", out.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut stack = vec![src.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(&dir)?
            .map(|e| e.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        for path in entries {
            let rel = path
                .strip_prefix(src)?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if path.is_dir() {
                zip.add_directory(format!("{}/", rel), options)?;
                stack.push(path);
            } else {
                zip.start_file(rel, options)?;
                let mut f = File::open(&path)?;
                io::copy(&mut f, &mut zip)?;
            }
        }
    }
    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn github_style_zip(path: &Path) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let opts = SimpleFileOptions::default();
        zip.add_directory("gluejobutils-master/", opts).unwrap();
        zip.add_directory("gluejobutils-master/gluejobutils/", opts)
            .unwrap();
        zip.start_file("gluejobutils-master/gluejobutils/__init__.py", opts)
            .unwrap();
        zip.write_all(b"VERSION = 1\n").unwrap();
        zip.start_file("gluejobutils-master/README.md", opts).unwrap();
        zip.write_all(b"# utils\n").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn repackages_around_the_package_folder() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("master.zip");
        github_style_zip(&src);

        let out = repackage_github_zip(&src, &tmp.path().join("out")).unwrap();
        assert_eq!(out.file_name().unwrap(), "gluejobutils.zip");

        let archive = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(
            names,
            vec!["README.md", "gluejobutils/", "gluejobutils/__init__.py"]
        );
    }

    #[test]
    fn archive_without_package_folder_fails() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("flat.zip");
        let mut zip = ZipWriter::new(File::create(&src).unwrap());
        zip.start_file("only.txt", SimpleFileOptions::default())
            .unwrap();
        zip.finish().unwrap();
        assert!(repackage_github_zip(&src, tmp.path()).is_err());
    }
}
