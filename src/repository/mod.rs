use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Document, Finalization, NewDocument};

pub mod memory;
pub mod postgres;

pub use memory::MemoryDocumentRepository;
pub use postgres::PgDocumentRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("repository task failed: {0}")]
    Task(String),
    #[error("document {0} already exists")]
    Duplicate(Uuid),
    #[error("stored document {id} is malformed: {reason}")]
    Corrupt { id: Uuid, reason: String },
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Durable storage for document rows.
///
/// Status changes only happen through the compare-and-update methods
/// [`begin_processing`](Self::begin_processing) and
/// [`finalize`](Self::finalize), which return `None` when the row was not in
/// an eligible state. Callers use that to detect lost races instead of
/// reading and writing separately.
#[async_trait]
pub trait DocumentRepository: Send + Sync + 'static {
    async fn insert(&self, document: NewDocument) -> RepositoryResult<Document>;

    async fn find(&self, id: Uuid) -> RepositoryResult<Option<Document>>;

    /// Atomically moves `queued -> processing`.
    async fn begin_processing(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Document>>;

    /// Atomically applies a terminal outcome if the row is still in one of
    /// [`Finalization::allowed_from`].
    async fn finalize(
        &self,
        id: Uuid,
        outcome: Finalization,
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Document>>;

    /// Documents that entered `processing` before `cutoff` and never finished.
    async fn list_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Document>>;

    async fn ping(&self) -> RepositoryResult<()>;
}
