//! Error type for pipeline runs.

use thiserror::Error;

use crate::contract::{ArchiveError, FetchError, FileHandle, LocateError, UploadError};
use crate::state::PipelineState;

/// The single failure outcome of a pipeline run.
///
/// Every variant is terminal. Variants caused by a collaborator keep that
/// collaborator's error as their `source()`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The locator could not list files.
    #[error("Discovery failed for pattern {pattern:?}")]
    DiscoveryFailed {
        pattern: String,
        #[source]
        source: LocateError,
    },

    /// The locator succeeded but matched nothing.
    #[error("No files found matching pattern {pattern:?}")]
    NoFilesFound { pattern: String },

    /// The first fetch that failed; all other fetches were cancelled.
    #[error("Fetch failed for {handle}")]
    FetchFailed {
        handle: FileHandle,
        #[source]
        source: FetchError,
    },

    /// The archiver rejected the collected payloads.
    #[error("Archive failed for {files} files")]
    ArchiveFailed {
        files: usize,
        #[source]
        source: ArchiveError,
    },

    /// The object store rejected the archive.
    #[error("Upload to {destination:?} failed")]
    UploadFailed {
        destination: String,
        #[source]
        source: UploadError,
    },

    /// The caller cancelled the run.
    #[error("Pipeline cancelled while {stage}")]
    Cancelled { stage: PipelineState },
}

impl PipelineError {
    /// Stage the run was in when it failed.
    pub fn stage(&self) -> PipelineState {
        match self {
            Self::DiscoveryFailed { .. } | Self::NoFilesFound { .. } => PipelineState::Discovering,
            Self::FetchFailed { .. } => PipelineState::Fetching,
            Self::ArchiveFailed { .. } => PipelineState::Archiving,
            Self::UploadFailed { .. } => PipelineState::Uploading,
            Self::Cancelled { stage } => *stage,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Short machine-friendly name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DiscoveryFailed { .. } => "discovery_failed",
            Self::NoFilesFound { .. } => "no_files_found",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::ArchiveFailed { .. } => "archive_failed",
            Self::UploadFailed { .. } => "upload_failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn fetch_failure_keeps_collaborator_error_as_source() {
        let err = PipelineError::FetchFailed {
            handle: FileHandle::from("/r/b.txt"),
            source: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "Fetch failed for /r/b.txt");
        assert_eq!(err.source().unwrap().to_string(), "connection reset");
        assert_eq!(err.stage(), PipelineState::Fetching);
        assert_eq!(err.kind(), "fetch_failed");
    }

    #[test]
    fn cancelled_reports_its_stage_and_has_no_source() {
        let err = PipelineError::Cancelled {
            stage: PipelineState::Archiving,
        };
        assert!(err.is_cancelled());
        assert!(err.source().is_none());
        assert_eq!(err.stage(), PipelineState::Archiving);
        assert_eq!(err.to_string(), "Pipeline cancelled while archiving");
    }

    #[test]
    fn no_files_found_is_a_discovery_stage_failure() {
        let err = PipelineError::NoFilesFound {
            pattern: "abc".to_string(),
        };
        assert!(!err.is_cancelled());
        assert_eq!(err.stage(), PipelineState::Discovering);
        assert_eq!(err.to_string(), "No files found matching pattern \"abc\"");
    }
}
