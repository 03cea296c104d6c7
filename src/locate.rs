//! # locate: find the files a pattern selects
//!
//! Patterns are regular expressions matched (unanchored) against a file's path
//! relative to its source root, using `/` as separator. The resulting handles are
//! those relative paths, sorted, so [`crate::fetch`] can resolve them against the
//! same root.
//!
//! - [`DirectoryLocator`]: walks a local directory tree
//! - [`HttpManifestLocator`]: downloads a JSON manifest listing and filters it
//! - [`SourceLocator`]: the config-selected variant, used by the CLI

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bundle_relay_core::contract::{FileHandle, FileLocator, LocateError};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// Manifest file name used when the config does not name one.
pub const DEFAULT_MANIFEST_PATH: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum LocateFailure {
    #[error("Invalid pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to list directory {path}")]
    ListFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest request to {url} failed")]
    ManifestRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Manifest request to {url} returned {status}")]
    ManifestStatus {
        url: String,
        status: reqwest::StatusCode,
    },
}

fn compile(pattern: &str) -> Result<Regex, LocateFailure> {
    Regex::new(pattern).map_err(|source| LocateFailure::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Join a base URL and a relative path with exactly one `/` between them.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn relative_handle(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Finds files below a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    root: PathBuf,
    recursive: bool,
}

impl DirectoryLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: true,
        }
    }

    /// Only consider files directly inside the root when `recursive` is false.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn list(&self, matcher: &Regex) -> Result<Vec<FileHandle>, LocateFailure> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries =
                tokio::fs::read_dir(&dir)
                    .await
                    .map_err(|source| LocateFailure::ListFailed {
                        path: dir.clone(),
                        source,
                    })?;
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(source) => {
                        return Err(LocateFailure::ListFailed {
                            path: dir.clone(),
                            source,
                        })
                    }
                };
                let path = entry.path();
                let file_type =
                    entry
                        .file_type()
                        .await
                        .map_err(|source| LocateFailure::ListFailed {
                            path: path.clone(),
                            source,
                        })?;
                if file_type.is_dir() {
                    if self.recursive {
                        pending.push(path);
                    }
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                if let Some(handle) = relative_handle(&self.root, &path) {
                    if matcher.is_match(&handle) {
                        debug!(handle = %handle, "Matched file");
                        found.push(FileHandle::new(handle));
                    }
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

#[async_trait]
impl FileLocator for DirectoryLocator {
    async fn locate(&self, pattern: &str) -> Result<Vec<FileHandle>, LocateError> {
        info!(root = %self.root.display(), pattern, "Searching directory for matching files");
        let matcher = compile(pattern)?;
        let found = self.list(&matcher).await?;
        info!(matches = found.len(), "Directory search finished");
        Ok(found)
    }
}

/// Shape of a remote manifest: either a bare list of paths or `{"files": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Manifest {
    List(Vec<String>),
    Object { files: Vec<String> },
}

impl Manifest {
    fn into_files(self) -> Vec<String> {
        match self {
            Manifest::List(files) | Manifest::Object { files } => files,
        }
    }
}

fn filter_manifest(files: Vec<String>, matcher: &Regex) -> Vec<FileHandle> {
    let mut found: Vec<FileHandle> = files
        .into_iter()
        .map(|f| f.trim_start_matches('/').to_string())
        .filter(|f| !f.is_empty() && matcher.is_match(f))
        .map(FileHandle::new)
        .collect();
    found.sort();
    found.dedup();
    found
}

/// Finds files listed in a JSON manifest served next to them over HTTP.
#[derive(Debug, Clone)]
pub struct HttpManifestLocator {
    client: reqwest::Client,
    base_url: String,
    manifest_path: String,
}

impl HttpManifestLocator {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        manifest_path: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            manifest_path: manifest_path.into(),
        }
    }

    pub fn manifest_url(&self) -> String {
        join_url(&self.base_url, &self.manifest_path)
    }
}

#[async_trait]
impl FileLocator for HttpManifestLocator {
    async fn locate(&self, pattern: &str) -> Result<Vec<FileHandle>, LocateError> {
        let matcher = compile(pattern)?;
        let url = self.manifest_url();
        info!(url = %url, pattern, "Fetching remote manifest");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| LocateFailure::ManifestRequest {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(LocateFailure::ManifestStatus { url, status }.into());
        }
        let manifest: Manifest =
            response
                .json()
                .await
                .map_err(|source| LocateFailure::ManifestRequest {
                    url: url.clone(),
                    source,
                })?;

        let found = filter_manifest(manifest.into_files(), &matcher);
        info!(matches = found.len(), "Manifest search finished");
        Ok(found)
    }
}

/// Locator chosen by the `source` section of the config.
#[derive(Debug, Clone)]
pub enum SourceLocator {
    Directory(DirectoryLocator),
    Http(HttpManifestLocator),
}

#[async_trait]
impl FileLocator for SourceLocator {
    async fn locate(&self, pattern: &str) -> Result<Vec<FileHandle>, LocateError> {
        match self {
            SourceLocator::Directory(locator) => locator.locate(pattern).await,
            SourceLocator::Http(locator) => locator.locate(pattern).await,
        }
    }
}
