use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{DocumentRepository, RepositoryError, RepositoryResult};
use crate::models::{Document, DocumentStatus, Finalization, NewDocument};

/// Rows held in a process-local map. The lock is never held across an await,
/// so every method is a single atomic step.
#[derive(Default)]
pub struct MemoryDocumentRepository {
    rows: Mutex<HashMap<Uuid, Document>>,
}

impl MemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, HashMap<Uuid, Document>>> {
        self.rows
            .lock()
            .map_err(|_| RepositoryError::Unavailable("document map lock poisoned".into()))
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocumentRepository {
    async fn insert(&self, document: NewDocument) -> RepositoryResult<Document> {
        let mut rows = self.lock()?;
        if rows.contains_key(&document.id) {
            return Err(RepositoryError::Duplicate(document.id));
        }
        let document = document.into_queued();
        rows.insert(document.id, document.clone());
        Ok(document)
    }

    async fn find(&self, id: Uuid) -> RepositoryResult<Option<Document>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn begin_processing(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Document>> {
        let mut rows = self.lock()?;
        let Some(document) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if document.status != DocumentStatus::Queued {
            return Ok(None);
        }
        document.status = DocumentStatus::Processing;
        document.processing_started_at = Some(started_at);
        Ok(Some(document.clone()))
    }

    async fn finalize(
        &self,
        id: Uuid,
        outcome: Finalization,
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Document>> {
        let mut rows = self.lock()?;
        let Some(document) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if !outcome.allowed_from().contains(&document.status) {
            return Ok(None);
        }
        outcome.apply(document, completed_at);
        Ok(Some(document.clone()))
    }

    async fn list_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Document>> {
        let rows = self.lock()?;
        let mut stale: Vec<Document> = rows
            .values()
            .filter(|doc| doc.status == DocumentStatus::Processing)
            .filter(|doc| doc.processing_started_at.is_some_and(|at| at < cutoff))
            .cloned()
            .collect();
        stale.sort_by_key(|doc| doc.processing_started_at);
        Ok(stale)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::error::ErrorCode;
    use crate::models::{ErrorInfo, ProcessingMode, ProcessingOptions};
    use crate::storage::ArtifactRef;

    fn new_document() -> NewDocument {
        let id = Uuid::new_v4();
        NewDocument {
            id,
            filename: "deck.pptx".into(),
            processing_options: ProcessingOptions {
                ocr_enabled: true,
                mode: ProcessingMode::Quality,
            },
            content_type: "application/vnd.openxmlformats-officedocument.presentationml.presentation"
                .into(),
            size_bytes: 42,
            checksum: "abc".into(),
            raw_artifact: ArtifactRef::from_key(format!("uploads/{id}/deck.pptx")),
            created_at: Utc::now(),
        }
    }

    fn failure() -> Finalization {
        Finalization::Failed {
            error: ErrorInfo::new(ErrorCode::ConversionFailure, "bad file"),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let repo = MemoryDocumentRepository::new();
        let doc = new_document();
        repo.insert(doc.clone()).await.unwrap();
        let err = repo.insert(doc).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Duplicate(_)));
    }

    #[tokio::test]
    async fn begin_processing_only_wins_once() {
        let repo = MemoryDocumentRepository::new();
        let doc = repo.insert(new_document()).await.unwrap();

        let first = repo.begin_processing(doc.id, Utc::now()).await.unwrap();
        assert_eq!(first.unwrap().status, DocumentStatus::Processing);
        assert!(repo
            .begin_processing(doc.id, Utc::now())
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .begin_processing(Uuid::new_v4(), Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn terminal_rows_are_never_rewritten() {
        let repo = MemoryDocumentRepository::new();
        let doc = repo.insert(new_document()).await.unwrap();

        let complete = Finalization::Complete {
            result_artifact: ArtifactRef::from_key("processed/x.md"),
        };
        assert!(
            repo.finalize(doc.id, complete.clone(), Utc::now())
                .await
                .unwrap()
                .is_none(),
            "complete requires processing"
        );

        repo.begin_processing(doc.id, Utc::now()).await.unwrap();
        let done = repo
            .finalize(doc.id, complete, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, DocumentStatus::Complete);

        assert!(repo
            .finalize(doc.id, failure(), Utc::now())
            .await
            .unwrap()
            .is_none());
        let stored = repo.find(doc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Complete);
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn queued_documents_may_fail_directly() {
        let repo = MemoryDocumentRepository::new();
        let doc = repo.insert(new_document()).await.unwrap();
        let failed = repo
            .finalize(doc.id, failure(), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, DocumentStatus::Failed);
        assert!(failed.completed_at.is_some());
    }

    #[tokio::test]
    async fn lists_only_old_processing_rows() {
        let repo = MemoryDocumentRepository::new();
        let old = repo.insert(new_document()).await.unwrap();
        let fresh = repo.insert(new_document()).await.unwrap();
        let _queued = repo.insert(new_document()).await.unwrap();

        let now = Utc::now();
        repo.begin_processing(old.id, now - Duration::minutes(30))
            .await
            .unwrap();
        repo.begin_processing(fresh.id, now).await.unwrap();

        let stale = repo
            .list_stale_processing(now - Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old.id);
    }
}
