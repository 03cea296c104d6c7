#![doc = "bundle-relay-core: the pipeline orchestrator behind bundle-relay."]

//! This crate holds the collaborator contracts, the error taxonomy and the
//! orchestrator that runs locate → fetch → archive → upload as one cancellable
//! operation. Concrete locators, fetchers, archivers and uploaders live in the
//! `bundle-relay` crate or in tests.
//!
//! # Usage
//! Build a [`PipelineOrchestrator`] from four collaborators and call
//! [`PipelineOrchestrator::run`] with a match pattern.

pub mod contract;
pub mod error;
pub mod pipeline;
pub mod state;

pub use contract::{
    ArchiveError, ArchivePayload, Archiver, FetchError, FileFetcher, FileHandle, FileLocator,
    FilePayload, LocateError, ObjectId, ObjectStoreUploader, PayloadCollection, UploadError,
};
pub use error::PipelineError;
pub use pipeline::{PipelineConfig, PipelineOrchestrator, PipelineReport, DEFAULT_DESTINATION};
pub use state::PipelineState;
pub use tokio_util::sync::CancellationToken;
