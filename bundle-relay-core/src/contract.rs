//! # contract: collaborator interfaces for the bundle pipeline
//!
//! The orchestrator in [`crate::pipeline`] never touches the network or the
//! filesystem itself. Everything it does goes through four narrow traits:
//!
//! - [`FileLocator`]: turns a match pattern into a finite list of [`FileHandle`]s
//! - [`FileFetcher`]: turns one handle into its raw [`FilePayload`]
//! - [`Archiver`]: combines all payloads into a single [`ArchivePayload`]
//! - [`ObjectStoreUploader`]: stores the archive and returns its [`ObjectId`]
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`, so `MockFileLocator`, `MockFileFetcher`,
//!   `MockArchiver` and `MockObjectStoreUploader` are available to tests and, with the
//!   `test-export-mocks` feature, to downstream crates.
//!
//! ## Errors
//! Collaborator errors are boxed trait objects. The orchestrator wraps them into
//! [`crate::error::PipelineError`] and keeps them reachable through `source()`.

use std::fmt;

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Error returned by a [`FileLocator`].
pub type LocateError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by a [`FileFetcher`].
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by an [`Archiver`].
pub type ArchiveError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by an [`ObjectStoreUploader`].
pub type UploadError = Box<dyn std::error::Error + Send + Sync>;

/// Opaque identifier of one remote file (usually a path).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileHandle(String);

impl FileHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileHandle {
    fn from(handle: &str) -> Self {
        Self::new(handle)
    }
}

impl From<String> for FileHandle {
    fn from(handle: String) -> Self {
        Self(handle)
    }
}

impl AsRef<str> for FileHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Raw content of one fetched file, tied to the handle it was fetched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub handle: FileHandle,
    pub content: Vec<u8>,
}

impl FilePayload {
    pub fn new(handle: FileHandle, content: Vec<u8>) -> Self {
        Self { handle, content }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// All payloads of one run, in the order their fetches completed.
pub type PayloadCollection = Vec<FilePayload>;

/// The combined archive produced once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePayload(Vec<u8>);

impl ArchivePayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identifier of a stored object, as returned by the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Finds the remote files matching a pattern.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FileLocator: Send + Sync {
    /// Return every file matching `pattern`. An empty list is a valid answer.
    async fn locate(&self, pattern: &str) -> Result<Vec<FileHandle>, LocateError>;
}

/// Retrieves the content of a single remote file.
///
/// Calls are independent of each other; the orchestrator runs many of them at once
/// and may drop any in-flight call when the run is cancelled or fails.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, handle: FileHandle) -> Result<FilePayload, FetchError>;
}

/// Packs a collection of payloads into one archive.
///
/// Implementations must produce identical bytes for identical payload content,
/// whatever order the payloads arrive in.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(&self, payloads: PayloadCollection) -> Result<ArchivePayload, ArchiveError>;
}

/// Stores an archive under a destination name.
///
/// Called at most once per run; the orchestrator never retries an upload.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStoreUploader: Send + Sync {
    async fn upload(
        &self,
        destination: &str,
        payload: ArchivePayload,
    ) -> Result<ObjectId, UploadError>;
}
