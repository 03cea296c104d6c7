//! High-level pipeline: orchestrates locate → fetch → archive → upload for one pattern.
//!
//! [`PipelineOrchestrator`] composes the four collaborators from [`crate::contract`]
//! into a single cancellable async operation:
//!   - Discovers every file matching the pattern through the [`FileLocator`]
//!   - Fetches all of them concurrently, one tokio task per file
//!   - Waits for every fetch (join barrier), failing fast on the first error
//!   - Archives the collected payloads once and uploads the archive once
//!
//! # Responsibilities
//! - Exactly one outcome per run: an [`ObjectId`] or one [`PipelineError`]
//! - Cancellation is honoured at every await point; in-flight fetches are aborted
//! - Holds no state between runs: every run gets its own `PipelineRun`
//!
//! # Navigation
//! - Main entrypoints: [`PipelineOrchestrator::run`], [`PipelineOrchestrator::run_with_cancel`]
//! - Detailed report: [`PipelineOrchestrator::execute`] returning [`PipelineReport`]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::contract::{
    Archiver, FetchError, FileFetcher, FileHandle, FileLocator, ObjectId, ObjectStoreUploader,
    PayloadCollection,
};
use crate::error::PipelineError;
use crate::state::PipelineState;

/// Destination name used when none is configured.
pub const DEFAULT_DESTINATION: &str = "result.zip";

/// Per-orchestrator settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Name the archive is uploaded under.
    pub destination: String,
    /// Upper bound on simultaneous fetches. `None` fetches every file at once.
    pub max_concurrent_fetches: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            destination: DEFAULT_DESTINATION.to_string(),
            max_concurrent_fetches: None,
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub pattern: String,
    /// Handles as returned by the locator.
    pub handles: Vec<FileHandle>,
    pub payload_bytes: usize,
    pub archive_bytes: usize,
    pub destination: String,
    pub object_id: ObjectId,
}

/// Transient state of one invocation. Dropped when the run settles.
struct PipelineRun {
    id: Uuid,
    state: PipelineState,
    progress: Option<mpsc::UnboundedSender<PipelineState>>,
}

impl PipelineRun {
    fn new(progress: Option<mpsc::UnboundedSender<PipelineState>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: PipelineState::Idle,
            progress,
        }
    }

    fn advance(&mut self, to: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "invalid pipeline transition {} -> {}",
            self.state,
            to
        );
        info!(from = %self.state, to = %to, "[PIPELINE] State transition");
        self.state = to;
        if let Some(tx) = &self.progress {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(to);
        }
    }
}

/// Runs the locate → fetch → archive → upload pipeline with injected collaborators.
pub struct PipelineOrchestrator<L, F, A, U> {
    config: PipelineConfig,
    locator: Arc<L>,
    fetcher: Arc<F>,
    archiver: Arc<A>,
    uploader: Arc<U>,
}

impl<L, F, A, U> PipelineOrchestrator<L, F, A, U>
where
    L: FileLocator,
    F: FileFetcher + 'static,
    A: Archiver,
    U: ObjectStoreUploader,
{
    pub fn new(config: PipelineConfig, locator: L, fetcher: F, archiver: A, uploader: U) -> Self {
        Self {
            config,
            locator: Arc::new(locator),
            fetcher: Arc::new(fetcher),
            archiver: Arc::new(archiver),
            uploader: Arc::new(uploader),
        }
    }

    /// Replace the settings, keeping the collaborators.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline to completion and return the uploaded object's id.
    pub async fn run(&self, pattern: &str) -> Result<ObjectId, PipelineError> {
        self.run_with_cancel(pattern, &CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but settles with [`PipelineError::Cancelled`]
    /// as soon as `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        pattern: &str,
        cancel: &CancellationToken,
    ) -> Result<ObjectId, PipelineError> {
        self.execute(pattern, cancel, None).await.map(|report| report.object_id)
    }

    /// Run the pipeline and return a full [`PipelineReport`].
    ///
    /// If `progress` is given, every state the run enters is sent to it.
    pub async fn execute(
        &self,
        pattern: &str,
        cancel: &CancellationToken,
        progress: Option<mpsc::UnboundedSender<PipelineState>>,
    ) -> Result<PipelineReport, PipelineError> {
        let mut run = PipelineRun::new(progress);
        let span = info_span!("pipeline_run", run_id = %run.id, pattern = %pattern);

        async {
            info!("[PIPELINE] Starting run");
            let result = self.drive(&mut run, pattern, cancel).await;
            match &result {
                Ok(report) => {
                    run.advance(PipelineState::Done);
                    info!(
                        object_id = %report.object_id,
                        files = report.handles.len(),
                        archive_bytes = report.archive_bytes,
                        "[PIPELINE] Run complete"
                    );
                }
                Err(e) if e.is_cancelled() => {
                    warn!(stage = %e.stage(), "[PIPELINE] Run cancelled");
                    run.advance(PipelineState::Failed);
                }
                Err(e) => {
                    error!(kind = e.kind(), stage = %e.stage(), error = ?e, "[PIPELINE][ERROR] Run failed");
                    run.advance(PipelineState::Failed);
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        run: &mut PipelineRun,
        pattern: &str,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        // --- Discovery ---
        run.advance(PipelineState::Discovering);
        checkpoint(cancel, PipelineState::Discovering)?;
        let handles = settle(cancel, PipelineState::Discovering, self.locator.locate(pattern))
            .await?
            .map_err(|source| PipelineError::DiscoveryFailed {
                pattern: pattern.to_string(),
                source,
            })?;
        if handles.is_empty() {
            return Err(PipelineError::NoFilesFound {
                pattern: pattern.to_string(),
            });
        }
        info!(files = handles.len(), "[PIPELINE] Discovery succeeded");

        // --- Fetch (fan-out + join barrier) ---
        run.advance(PipelineState::Fetching);
        checkpoint(cancel, PipelineState::Fetching)?;
        let payloads = self.fetch_all(&handles, cancel).await?;

        // --- Aggregate ---
        run.advance(PipelineState::Aggregating);
        debug_assert_eq!(payloads.len(), handles.len());
        let files = payloads.len();
        let payload_bytes: usize = payloads.iter().map(|p| p.len()).sum();
        info!(files, payload_bytes, "[PIPELINE] All fetches completed");

        // --- Archive ---
        run.advance(PipelineState::Archiving);
        checkpoint(cancel, PipelineState::Archiving)?;
        let archive = settle(cancel, PipelineState::Archiving, self.archiver.archive(payloads))
            .await?
            .map_err(|source| PipelineError::ArchiveFailed { files, source })?;
        let archive_bytes = archive.len();
        info!(archive_bytes, "[PIPELINE] Archive built");

        // --- Upload ---
        run.advance(PipelineState::Uploading);
        checkpoint(cancel, PipelineState::Uploading)?;
        let destination = self.config.destination.as_str();
        let object_id = settle(
            cancel,
            PipelineState::Uploading,
            self.uploader.upload(destination, archive),
        )
        .await?
        .map_err(|source| PipelineError::UploadFailed {
            destination: destination.to_string(),
            source,
        })?;
        info!(%object_id, destination, "[PIPELINE] Upload succeeded");

        Ok(PipelineReport {
            run_id: run.id,
            pattern: pattern.to_string(),
            handles,
            payload_bytes,
            archive_bytes,
            destination: destination.to_string(),
            object_id,
        })
    }

    /// Fetch every handle on its own task and wait for all of them.
    ///
    /// Payloads are returned in completion order. The first failure, or a
    /// cancellation, aborts every task still running.
    async fn fetch_all(
        &self,
        handles: &[FileHandle],
        cancel: &CancellationToken,
    ) -> Result<PayloadCollection, PipelineError> {
        let limiter = self
            .config
            .max_concurrent_fetches
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        let mut tasks = JoinSet::new();
        let mut pending = HashMap::with_capacity(handles.len());
        for handle in handles {
            let fetcher = Arc::clone(&self.fetcher);
            let limiter = limiter.clone();
            let task_handle = handle.clone();
            let abort = tasks.spawn(async move {
                let _permit = match limiter {
                    Some(semaphore) => Some(
                        semaphore
                            .acquire_owned()
                            .await
                            .map_err(|e| Box::new(e) as FetchError)?,
                    ),
                    None => None,
                };
                fetcher.fetch(task_handle).await
            });
            pending.insert(abort.id(), handle.clone());
        }
        debug!(tasks = pending.len(), "[PIPELINE] Fetch tasks scheduled");

        let mut payloads = Vec::with_capacity(handles.len());
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(outstanding = tasks.len(), "[PIPELINE] Cancelling in-flight fetches");
                    tasks.abort_all();
                    return Err(PipelineError::Cancelled { stage: PipelineState::Fetching });
                }
                joined = tasks.join_next_with_id() => joined,
            };
            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((id, Ok(payload))) => {
                    pending.remove(&id);
                    debug!(handle = %payload.handle, bytes = payload.len(), remaining = pending.len(), "[PIPELINE] Fetched file");
                    payloads.push(payload);
                }
                Ok((id, Err(source))) => {
                    let handle = pending
                        .remove(&id)
                        .unwrap_or_else(|| FileHandle::new("<unknown>"));
                    error!(handle = %handle, error = ?source, outstanding = tasks.len(), "[PIPELINE][ERROR] Fetch failed, aborting remaining fetches");
                    tasks.abort_all();
                    return Err(PipelineError::FetchFailed { handle, source });
                }
                Err(join_error) => {
                    let handle = pending
                        .remove(&join_error.id())
                        .unwrap_or_else(|| FileHandle::new("<unknown>"));
                    error!(handle = %handle, error = %join_error, "[PIPELINE][ERROR] Fetch task died, aborting remaining fetches");
                    tasks.abort_all();
                    return Err(PipelineError::FetchFailed {
                        handle,
                        source: Box::new(join_error),
                    });
                }
            }
        }

        Ok(payloads)
    }
}

/// Fail with `Cancelled` before starting a stage whose token already fired.
fn checkpoint(cancel: &CancellationToken, stage: PipelineState) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled { stage });
    }
    Ok(())
}

/// Await `fut` unless `cancel` fires first.
async fn settle<T>(
    cancel: &CancellationToken,
    stage: PipelineState,
    fut: impl Future<Output = T>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled { stage }),
        out = fut => Ok(out),
    }
}
