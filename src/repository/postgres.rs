use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use tokio::task;
use uuid::Uuid;

use super::{DocumentRepository, RepositoryError, RepositoryResult};
use crate::db::PgPool;
use crate::error::ErrorCode;
use crate::models::{
    Document, DocumentStatus, ErrorInfo, Finalization, NewDocument, ProcessingMode,
    ProcessingOptions, STATUS_PROCESSING, STATUS_QUEUED,
};
use crate::schema::documents;
use crate::storage::ArtifactRef;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = documents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DocumentRow {
    pub id: Uuid,
    pub filename: String,
    pub status: String,
    pub ocr_enabled: bool,
    pub processing_mode: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub raw_artifact_key: String,
    pub result_artifact_key: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocumentRow {
    pub id: Uuid,
    pub filename: String,
    pub status: String,
    pub ocr_enabled: bool,
    pub processing_mode: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub raw_artifact_key: String,
    pub created_at: DateTime<Utc>,
}

impl From<&NewDocument> for NewDocumentRow {
    fn from(value: &NewDocument) -> Self {
        Self {
            id: value.id,
            filename: value.filename.clone(),
            status: STATUS_QUEUED.to_string(),
            ocr_enabled: value.processing_options.ocr_enabled,
            processing_mode: value.processing_options.mode.as_str().to_string(),
            content_type: value.content_type.clone(),
            size_bytes: value.size_bytes,
            checksum: value.checksum.clone(),
            raw_artifact_key: value.raw_artifact.key().to_string(),
            created_at: value.created_at,
        }
    }
}

impl TryFrom<DocumentRow> for Document {
    type Error = RepositoryError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| RepositoryError::Corrupt { id: row.id, reason };

        let status = DocumentStatus::parse(&row.status)
            .ok_or_else(|| corrupt(format!("unknown status {:?}", row.status)))?;
        let mode = ProcessingMode::parse(&row.processing_mode)
            .ok_or_else(|| corrupt(format!("unknown processing mode {:?}", row.processing_mode)))?;
        let error = match (row.error_code.as_deref(), row.error_message.clone()) {
            (None, _) => None,
            (Some(code), message) => {
                let code = ErrorCode::parse(code)
                    .ok_or_else(|| corrupt(format!("unknown error code {code:?}")))?;
                Some(ErrorInfo::new(code, message.unwrap_or_default()))
            }
        };

        Ok(Document {
            id: row.id,
            filename: row.filename,
            status,
            processing_options: ProcessingOptions {
                ocr_enabled: row.ocr_enabled,
                mode,
            },
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            checksum: row.checksum,
            raw_artifact: ArtifactRef::from_key(row.raw_artifact_key),
            result_artifact: row.result_artifact_key.map(ArtifactRef::from_key),
            error,
            created_at: row.created_at,
            processing_started_at: row.processing_started_at,
            completed_at: row.completed_at,
        })
    }
}

pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_conn<F, T>(&self, f: F) -> RepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| RepositoryError::Pool(err.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|err| RepositoryError::Task(err.to_string()))?
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn insert(&self, document: NewDocument) -> RepositoryResult<Document> {
        let row = NewDocumentRow::from(&document);
        self.with_conn(move |conn| {
            let inserted = diesel::insert_into(documents::table)
                .values(&row)
                .returning(DocumentRow::as_returning())
                .get_result(conn)
                .map_err(|err| match err {
                    diesel::result::Error::DatabaseError(
                        diesel::result::DatabaseErrorKind::UniqueViolation,
                        _,
                    ) => RepositoryError::Duplicate(row.id),
                    other => RepositoryError::from(other),
                })?;
            Document::try_from(inserted)
        })
        .await
    }

    async fn find(&self, id: Uuid) -> RepositoryResult<Option<Document>> {
        self.with_conn(move |conn| {
            documents::table
                .find(id)
                .select(DocumentRow::as_select())
                .first(conn)
                .optional()?
                .map(Document::try_from)
                .transpose()
        })
        .await
    }

    async fn begin_processing(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Document>> {
        self.with_conn(move |conn| {
            diesel::update(
                documents::table
                    .filter(documents::id.eq(id))
                    .filter(documents::status.eq(STATUS_QUEUED)),
            )
            .set((
                documents::status.eq(STATUS_PROCESSING),
                documents::processing_started_at.eq(Some(started_at)),
            ))
            .returning(DocumentRow::as_returning())
            .get_result(conn)
            .optional()?
            .map(Document::try_from)
            .transpose()
        })
        .await
    }

    async fn finalize(
        &self,
        id: Uuid,
        outcome: Finalization,
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Document>> {
        let allowed: Vec<&'static str> = outcome
            .allowed_from()
            .iter()
            .map(|status| status.as_str())
            .collect();
        let status = outcome.status().as_str();
        let (result_key, error_code, error_message) = match outcome {
            Finalization::Complete { result_artifact } => {
                (Some(result_artifact.key().to_string()), None, None)
            }
            Finalization::Failed { error } => {
                (None, Some(error.code.as_str().to_string()), Some(error.message))
            }
        };

        self.with_conn(move |conn| {
            diesel::update(
                documents::table
                    .filter(documents::id.eq(id))
                    .filter(documents::status.eq_any(allowed)),
            )
            .set((
                documents::status.eq(status),
                documents::result_artifact_key.eq(result_key),
                documents::error_code.eq(error_code),
                documents::error_message.eq(error_message),
                documents::completed_at.eq(Some(completed_at)),
            ))
            .returning(DocumentRow::as_returning())
            .get_result(conn)
            .optional()?
            .map(Document::try_from)
            .transpose()
        })
        .await
    }

    async fn list_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Document>> {
        self.with_conn(move |conn| {
            documents::table
                .filter(documents::status.eq(STATUS_PROCESSING))
                .filter(documents::processing_started_at.lt(cutoff))
                .order(documents::processing_started_at.asc())
                .select(DocumentRow::as_select())
                .load(conn)?
                .into_iter()
                .map(Document::try_from)
                .collect()
        })
        .await
    }

    async fn ping(&self) -> RepositoryResult<()> {
        self.with_conn(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }
}
