//! Document state machine: `queued -> processing -> complete | failed`.
//!
//! [`Orchestrator::trigger`] claims a queued document with an atomic
//! compare-and-update and hands it to a spawned task, so the caller returns
//! immediately. The task fetches the raw upload, runs the converter and stores
//! the result, all under one deadline, and then writes the terminal state.
//! The result blob is always stored before the row flips to `complete`.
//!
//! Failures are terminal. Nothing here retries a conversion; a new upload is
//! the only way to try again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::converter::{ConversionError, ConversionRequest, Converter};
use crate::error::{AppError, AppResult, ErrorCode};
use crate::models::{Document, DocumentStatus, ErrorInfo, Finalization};
use crate::repository::{DocumentRepository, RepositoryResult};
use crate::storage::{ArtifactRef, ArtifactStore, Collection};
use crate::utils::filename::markdown_filename;

pub const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";

pub const TIMEOUT_MESSAGE: &str =
    "Processing took too long - try Fast mode or a simpler document, then upload it again.";
pub const RESULT_STORAGE_MESSAGE: &str =
    "Storage service error while handling your document - please upload it again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// This call claimed the document and spawned its processing task.
    Started,
    /// Another trigger already claimed it; nothing was done.
    AlreadyProcessing,
    /// The document already reached a terminal state; nothing was done.
    AlreadyFinished(DocumentStatus),
}

impl TriggerOutcome {
    fn for_status(status: DocumentStatus) -> Self {
        if status.is_terminal() {
            TriggerOutcome::AlreadyFinished(status)
        } else {
            TriggerOutcome::AlreadyProcessing
        }
    }
}

#[derive(Debug)]
enum ProcessingFailure {
    Conversion(ConversionError),
    Storage(anyhow::Error),
}

impl ProcessingFailure {
    fn error_info(&self) -> ErrorInfo {
        match self {
            ProcessingFailure::Conversion(err) => {
                ErrorInfo::new(ErrorCode::ConversionFailure, err.user_message())
            }
            ProcessingFailure::Storage(_) => {
                ErrorInfo::new(ErrorCode::StorageFailure, RESULT_STORAGE_MESSAGE)
            }
        }
    }

    fn log(&self, document_id: Uuid) {
        match self {
            ProcessingFailure::Conversion(err) => {
                warn!(document_id = %document_id, error = %err, "conversion failed");
            }
            ProcessingFailure::Storage(err) => {
                error!(document_id = %document_id, error = ?err, "artifact storage failed during processing");
            }
        }
    }
}

pub fn timeout_error() -> ErrorInfo {
    ErrorInfo::new(ErrorCode::ProcessingTimeout, TIMEOUT_MESSAGE)
}

/// Ids with a live processing task in this process.
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<Uuid>>>);

impl InFlight {
    fn enter(&self, id: Uuid) -> InFlightGuard {
        if let Ok(mut ids) = self.0.lock() {
            ids.insert(id);
        }
        InFlightGuard {
            set: self.clone(),
            id,
        }
    }

    fn contains(&self, id: Uuid) -> bool {
        self.0.lock().map(|ids| ids.contains(&id)).unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.0.lock().map(|ids| ids.len()).unwrap_or(0)
    }
}

struct InFlightGuard {
    set: InFlight,
    id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut ids) = self.set.0.lock() {
            ids.remove(&self.id);
        }
    }
}

pub struct Orchestrator {
    documents: Arc<dyn DocumentRepository>,
    artifacts: ArtifactStore,
    converter: Arc<dyn Converter>,
    deadline: Duration,
    in_flight: InFlight,
}

impl Orchestrator {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        artifacts: ArtifactStore,
        converter: Arc<dyn Converter>,
        deadline: Duration,
    ) -> Self {
        Self {
            documents,
            artifacts,
            converter,
            deadline,
            in_flight: InFlight::default(),
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Begins processing a queued document. Repeated or concurrent calls for
    /// the same id are no-ops reported through [`TriggerOutcome`].
    pub async fn trigger(self: &Arc<Self>, id: Uuid) -> AppResult<TriggerOutcome> {
        let document = self
            .documents
            .find(id)
            .await?
            .ok_or_else(AppError::not_found)?;
        if document.status != DocumentStatus::Queued {
            debug!(document_id = %id, status = %document.status, "ignoring duplicate trigger");
            return Ok(TriggerOutcome::for_status(document.status));
        }

        let Some(claimed) = self.documents.begin_processing(id, Utc::now()).await? else {
            let current = self
                .documents
                .find(id)
                .await?
                .ok_or_else(AppError::not_found)?;
            debug!(document_id = %id, status = %current.status, "lost processing claim to a concurrent trigger");
            return Ok(TriggerOutcome::for_status(current.status));
        };

        let guard = self.in_flight.enter(id);
        info!(
            document_id = %id,
            filename = %claimed.filename,
            ocr_enabled = claimed.processing_options.ocr_enabled,
            mode = claimed.processing_options.mode.as_str(),
            deadline_ms = self.deadline.as_millis() as u64,
            "document processing started"
        );

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            orchestrator.process(claimed).await;
        });

        Ok(TriggerOutcome::Started)
    }

    /// Runs one claimed document to a terminal state and returns the final
    /// row, or `None` when the terminal write did not happen.
    async fn process(&self, document: Document) -> Option<Document> {
        let id = document.id;
        let started = Instant::now();

        let outcome = match timeout(self.deadline, self.convert_and_store(&document)).await {
            Ok(Ok(result_artifact)) => Finalization::Complete { result_artifact },
            Ok(Err(failure)) => {
                failure.log(id);
                Finalization::Failed {
                    error: failure.error_info(),
                }
            }
            Err(_) => {
                warn!(
                    document_id = %id,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "processing deadline elapsed"
                );
                Finalization::Failed {
                    error: timeout_error(),
                }
            }
        };

        let status = outcome.status();
        match self.documents.finalize(id, outcome, Utc::now()).await {
            Ok(Some(finished)) => {
                info!(
                    document_id = %id,
                    status = %status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "document processing finished"
                );
                Some(finished)
            }
            Ok(None) => {
                warn!(document_id = %id, status = %status, "document was already finalized; outcome dropped");
                None
            }
            Err(err) => {
                error!(
                    document_id = %id,
                    status = %status,
                    error = %err,
                    "failed to record processing outcome; document stays in processing until swept"
                );
                None
            }
        }
    }

    async fn convert_and_store(&self, document: &Document) -> Result<ArtifactRef, ProcessingFailure> {
        let bytes = self
            .artifacts
            .fetch(&document.raw_artifact)
            .await
            .map_err(ProcessingFailure::Storage)?;

        let converted = self
            .converter
            .convert(ConversionRequest {
                document_id: document.id,
                filename: document.filename.clone(),
                content_type: document.content_type.clone(),
                bytes,
                options: document.processing_options,
            })
            .await
            .map_err(ProcessingFailure::Conversion)?;

        if converted.markdown.trim().is_empty() {
            return Err(ProcessingFailure::Conversion(
                ConversionError::UnsupportedContent("converter produced no text".into()),
            ));
        }

        self.artifacts
            .store(
                Collection::Processed,
                document.id,
                &markdown_filename(&document.filename),
                converted.markdown.into_bytes(),
                MARKDOWN_CONTENT_TYPE,
            )
            .await
            .map_err(ProcessingFailure::Storage)
    }

    /// Fails documents stuck in `processing` since before `now - older_than`
    /// that have no live task in this process. Returns how many were failed.
    pub async fn sweep_stale(&self, older_than: Duration) -> RepositoryResult<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::hours(1));
        let stale = self.documents.list_stale_processing(cutoff).await?;

        let mut swept = 0;
        for document in stale {
            if self.in_flight.contains(document.id) {
                continue;
            }
            let failed = self
                .documents
                .finalize(
                    document.id,
                    Finalization::Failed {
                        error: timeout_error(),
                    },
                    Utc::now(),
                )
                .await?;
            if failed.is_some() {
                warn!(
                    document_id = %document.id,
                    processing_started_at = ?document.processing_started_at,
                    "marked stale processing document as failed"
                );
                swept += 1;
            }
        }
        Ok(swept)
    }
}
