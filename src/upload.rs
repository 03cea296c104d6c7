#![doc = "Object store uploaders: where the finished archive ends up."]
//
//! # Uploader implementations
//!
//! Both uploaders store the archive under `<bucket>/<object name>` and return an
//! [`ObjectId`] of the form `<bucket>/<object name>@<version>`:
//!
//! - [`DirectoryUploader`]: writes into a local directory tree (one folder per bucket).
//!   The version is the first 16 hex digits of the archive's SHA-256.
//! - [`HttpObjectStoreUploader`]: `PUT`s to an S3-style endpoint with a bearer token.
//!   The version is the returned `ETag`, or the content digest when there is none.
//!
//! Neither retries; an upload is attempted at most once per call.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bundle_relay_core::contract::{ArchivePayload, ObjectId, ObjectStoreUploader, UploadError};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

use crate::locate::join_url;

/// Bucket used when the config does not name one.
pub const DEFAULT_BUCKET: &str = "my-bucket";

#[derive(Debug, Error)]
pub enum UploadFailure {
    #[error("Invalid object name {name:?}")]
    InvalidName { name: String },

    #[error("Failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload task failed")]
    Task(#[from] tokio::task::JoinError),

    #[error("Upload request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upload to {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

/// Hex encoded SHA-256 of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Object names may contain `/` but must stay inside their bucket.
fn validate_name(name: &str) -> Result<(), UploadFailure> {
    let path = Path::new(name);
    let valid = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(UploadFailure::InvalidName {
            name: name.to_string(),
        })
    }
}

fn object_id(bucket: &str, name: &str, version: &str) -> ObjectId {
    ObjectId::new(format!("{bucket}/{name}@{version}"))
}

/// Write `bytes` to a fresh temp file beside `path`, then rename it into place.
///
/// Readers never see a partial archive, and an abandoned temp file is removed on drop.
fn persist(path: &Path, bytes: &[u8]) -> Result<(), UploadFailure> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let write_error = |source| UploadFailure::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = NamedTempFile::new_in(parent).map_err(write_error)?;
    file.write_all(bytes).map_err(write_error)?;
    file.as_file().sync_all().map_err(write_error)?;
    file.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}

/// Stores archives as plain files below `root/<bucket>/`.
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    root: PathBuf,
    bucket: String,
}

impl DirectoryUploader {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    pub fn object_path(&self, name: &str) -> PathBuf {
        self.root.join(&self.bucket).join(name)
    }
}

#[async_trait]
impl ObjectStoreUploader for DirectoryUploader {
    async fn upload(
        &self,
        destination: &str,
        payload: ArchivePayload,
    ) -> Result<ObjectId, UploadError> {
        validate_name(destination)?;
        let path = self.object_path(destination);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| UploadFailure::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let digest = content_digest(payload.as_bytes());
        let size = payload.len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || persist(&target, payload.as_bytes()))
            .await
            .map_err(UploadFailure::Task)??;

        let id = object_id(&self.bucket, destination, &digest[..16]);
        info!(path = %path.display(), bytes = size, object_id = %id, "Stored archive in directory");
        Ok(id)
    }
}

/// Uploads archives to an S3-compatible HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpObjectStoreUploader {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

impl HttpObjectStoreUploader {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            token,
        }
    }

    pub fn object_url(&self, name: &str) -> String {
        join_url(&join_url(&self.endpoint, &self.bucket), name)
    }
}

#[async_trait]
impl ObjectStoreUploader for HttpObjectStoreUploader {
    async fn upload(
        &self,
        destination: &str,
        payload: ArchivePayload,
    ) -> Result<ObjectId, UploadError> {
        validate_name(destination)?;
        let url = self.object_url(destination);
        let digest = content_digest(payload.as_bytes());
        let size = payload.len();
        info!(url = %url, bytes = size, "Uploading archive to object store");

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .header("x-amz-content-sha256", digest.as_str())
            .body(payload.into_bytes());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|source| UploadFailure::Request {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadFailure::Status { url, status }.into());
        }

        let version = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|etag| etag.trim_matches('"').to_string())
            .filter(|etag| !etag.is_empty())
            .unwrap_or_else(|| digest[..16].to_string());
        let id = object_id(&self.bucket, destination, &version);
        info!(object_id = %id, bytes = size, "Archive uploaded");
        Ok(id)
    }
}

/// Uploader chosen by the `upload` section of the config.
#[derive(Debug, Clone)]
pub enum ObjectStore {
    Directory(DirectoryUploader),
    Http(HttpObjectStoreUploader),
}

#[async_trait]
impl ObjectStoreUploader for ObjectStore {
    async fn upload(
        &self,
        destination: &str,
        payload: ArchivePayload,
    ) -> Result<ObjectId, UploadError> {
        match self {
            ObjectStore::Directory(uploader) => uploader.upload(destination, payload).await,
            ObjectStore::Http(uploader) => uploader.upload(destination, payload).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::PUT, MockServer};
    use tempfile::tempdir;

    #[tokio::test]
    async fn directory_uploader_writes_archive_and_returns_versioned_id() {
        let dir = tempdir().unwrap();
        let uploader = DirectoryUploader::new(dir.path(), "my-bucket");
        let payload = ArchivePayload::new(b"ZIPPED_CONTENT".to_vec());

        let id = uploader.upload("result.zip", payload).await.unwrap();

        let stored = std::fs::read(dir.path().join("my-bucket/result.zip")).unwrap();
        assert_eq!(stored, b"ZIPPED_CONTENT");
        let digest = content_digest(b"ZIPPED_CONTENT");
        assert_eq!(id.as_str(), format!("my-bucket/result.zip@{}", &digest[..16]));
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("my-bucket"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec!["result.zip"]);
    }

    #[tokio::test]
    async fn directory_uploader_creates_nested_object_paths() {
        let dir = tempdir().unwrap();
        let uploader = DirectoryUploader::new(dir.path(), "b");
        uploader
            .upload("2026/10/batch.zip", ArchivePayload::new(vec![1, 2, 3]))
            .await
            .unwrap();
        assert!(dir.path().join("b/2026/10/batch.zip").is_file());
    }

    #[tokio::test]
    async fn object_names_cannot_escape_the_bucket() {
        let dir = tempdir().unwrap();
        let uploader = DirectoryUploader::new(dir.path(), "b");
        for name in ["", "../x.zip", "/abs.zip"] {
            let err = uploader
                .upload(name, ArchivePayload::new(vec![1]))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("Invalid object name"), "{name}: {err}");
        }
    }

    #[tokio::test]
    async fn concurrent_uploads_to_one_name_leave_one_complete_archive() {
        let dir = tempdir().unwrap();
        let uploader = DirectoryUploader::new(dir.path(), "my-bucket");
        let first = ArchivePayload::new(vec![b'a'; 256 * 1024]);
        let second = ArchivePayload::new(vec![b'b'; 256 * 1024]);

        let (a, b) = tokio::join!(
            uploader.upload("result.zip", first.clone()),
            uploader.upload("result.zip", second.clone()),
        );
        a.unwrap();
        b.unwrap();

        let stored = std::fs::read(dir.path().join("my-bucket/result.zip")).unwrap();
        assert!(stored == first.as_bytes() || stored == second.as_bytes());
        let entries = std::fs::read_dir(dir.path().join("my-bucket")).unwrap().count();
        assert_eq!(entries, 1, "temp files must not be left behind");
    }

    #[tokio::test]
    async fn http_uploader_puts_archive_with_token_and_digest() {
        let server = MockServer::start_async().await;
        let digest = content_digest(b"ZIPPED_CONTENT");
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/my-bucket/result.zip")
                .header("authorization", "Bearer secret-token")
                .header("content-type", "application/zip")
                .header("x-amz-content-sha256", digest.as_str())
                .body("ZIPPED_CONTENT");
            then.status(200).header("etag", "\"abc123\"");
        });

        let uploader = HttpObjectStoreUploader::new(
            reqwest::Client::new(),
            server.base_url(),
            "my-bucket",
            Some("secret-token".to_string()),
        );
        let id = uploader
            .upload("result.zip", ArchivePayload::new(b"ZIPPED_CONTENT".to_vec()))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(id.as_str(), "my-bucket/result.zip@abc123");
    }

    #[tokio::test]
    async fn http_uploader_falls_back_to_digest_without_etag() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(PUT).path("/b/batch.zip");
            then.status(201);
        });

        let id = HttpObjectStoreUploader::new(reqwest::Client::new(), server.base_url(), "b", None)
            .upload("batch.zip", ArchivePayload::new(vec![1, 2, 3]))
            .await
            .unwrap();

        let digest = content_digest(&[1, 2, 3]);
        assert_eq!(id.as_str(), format!("b/batch.zip@{}", &digest[..16]));
    }

    #[tokio::test]
    async fn http_uploader_maps_error_status() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(PUT).path("/my-bucket/result.zip");
            then.status(403);
        });

        let err = HttpObjectStoreUploader::new(
            reqwest::Client::new(),
            server.base_url(),
            "my-bucket",
            Some("wrong".to_string()),
        )
        .upload("result.zip", ArchivePayload::new(vec![1]))
        .await
        .unwrap_err();
        match err.downcast_ref::<UploadFailure>() {
            Some(UploadFailure::Status { status, .. }) => assert_eq!(status.as_u16(), 403),
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn content_digest_is_sha256_hex() {
        assert_eq!(
            content_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn http_uploader_addresses_bucket_and_object() {
        let uploader = HttpObjectStoreUploader::new(
            reqwest::Client::new(),
            "http://localhost:9000/",
            "my-bucket",
            None,
        );
        assert_eq!(
            uploader.object_url("result.zip"),
            "http://localhost:9000/my-bucket/result.zip"
        );
    }
}
