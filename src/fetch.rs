//! File fetchers: resolve a handle against its source root and read the bytes.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bundle_relay_core::contract::{FetchError, FileFetcher, FileHandle, FilePayload};
use thiserror::Error;
use tracing::debug;

use crate::locate::join_url;

#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("Handle {handle:?} is not a path inside the source root")]
    OutsideRoot { handle: String },

    #[error("Failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{handle} is {size} bytes, over the {limit} byte limit")]
    TooLarge { handle: String, size: u64, limit: u64 },

    #[error("Request for {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request for {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

fn check_size(handle: &FileHandle, size: u64, limit: Option<u64>) -> Result<(), FetchFailure> {
    match limit {
        Some(limit) if size > limit => Err(FetchFailure::TooLarge {
            handle: handle.to_string(),
            size,
            limit,
        }),
        _ => Ok(()),
    }
}

/// Resolve `handle` below `root`, refusing anything that could leave it.
fn resolve(root: &Path, handle: &FileHandle) -> Result<PathBuf, FetchFailure> {
    let relative = Path::new(handle.as_str());
    let escapes = relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(FetchFailure::OutsideRoot {
            handle: handle.to_string(),
        });
    }
    Ok(root.join(relative))
}

/// Reads files from a local directory.
#[derive(Debug, Clone)]
pub struct LocalFileFetcher {
    root: PathBuf,
    max_file_bytes: Option<u64>,
}

impl LocalFileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_bytes: None,
        }
    }

    pub fn with_max_file_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_file_bytes = limit;
        self
    }
}

#[async_trait]
impl FileFetcher for LocalFileFetcher {
    async fn fetch(&self, handle: FileHandle) -> Result<FilePayload, FetchError> {
        let path = resolve(&self.root, &handle)?;
        let read_error = |source| FetchFailure::Read {
            path: path.clone(),
            source,
        };

        let metadata = tokio::fs::metadata(&path).await.map_err(read_error)?;
        check_size(&handle, metadata.len(), self.max_file_bytes)?;
        let content = tokio::fs::read(&path).await.map_err(read_error)?;
        debug!(handle = %handle, bytes = content.len(), "Read local file");
        Ok(FilePayload::new(handle, content))
    }
}

/// Downloads files relative to a base URL.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    max_file_bytes: Option<u64>,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            max_file_bytes: None,
        }
    }

    pub fn with_max_file_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_file_bytes = limit;
        self
    }

    pub fn url_for(&self, handle: &FileHandle) -> String {
        join_url(&self.base_url, handle.as_str())
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn fetch(&self, handle: FileHandle) -> Result<FilePayload, FetchError> {
        let url = self.url_for(&handle);
        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchFailure::Request {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status { url, status }.into());
        }
        if let Some(length) = response.content_length() {
            check_size(&handle, length, self.max_file_bytes)?;
        }
        // Content-Length may be absent or wrong, so count while reading.
        let mut content = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| FetchFailure::Request {
                url: url.clone(),
                source,
            })?
        {
            content.extend_from_slice(&chunk);
            check_size(&handle, content.len() as u64, self.max_file_bytes)?;
        }
        debug!(handle = %handle, url = %url, bytes = content.len(), "Downloaded file");
        Ok(FilePayload::new(handle, content))
    }
}

/// Fetcher chosen by the `source` section of the config.
#[derive(Debug, Clone)]
pub enum SourceFetcher {
    Local(LocalFileFetcher),
    Http(HttpFetcher),
}

#[async_trait]
impl FileFetcher for SourceFetcher {
    async fn fetch(&self, handle: FileHandle) -> Result<FilePayload, FetchError> {
        match self {
            SourceFetcher::Local(fetcher) => fetcher.fetch(handle).await,
            SourceFetcher::Http(fetcher) => fetcher.fetch(handle).await,
        }
    }
}
