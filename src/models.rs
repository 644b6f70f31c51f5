use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::storage::ArtifactRef;

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_COMPLETE: &str = "complete";
pub const STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Queued,
    Processing,
    Complete,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Queued => STATUS_QUEUED,
            DocumentStatus::Processing => STATUS_PROCESSING,
            DocumentStatus::Complete => STATUS_COMPLETE,
            DocumentStatus::Failed => STATUS_FAILED,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            STATUS_QUEUED => Some(DocumentStatus::Queued),
            STATUS_PROCESSING => Some(DocumentStatus::Processing),
            STATUS_COMPLETE => Some(DocumentStatus::Complete),
            STATUS_FAILED => Some(DocumentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Complete | DocumentStatus::Failed)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Fast,
    Quality,
}

impl ProcessingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingMode::Fast => "fast",
            ProcessingMode::Quality => "quality",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fast" => Some(ProcessingMode::Fast),
            "quality" => Some(ProcessingMode::Quality),
            _ => None,
        }
    }
}

/// Fixed at upload time. Both fields are required on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessingOptions {
    pub ocr_enabled: bool,
    pub mode: ProcessingMode,
}

impl ProcessingOptions {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub status: DocumentStatus,
    pub processing_options: ProcessingOptions,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub raw_artifact: ArtifactRef,
    pub result_artifact: Option<ArtifactRef>,
    pub error: Option<ErrorInfo>,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Everything known about a document before its metadata row exists.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub filename: String,
    pub processing_options: ProcessingOptions,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub raw_artifact: ArtifactRef,
    pub created_at: DateTime<Utc>,
}

impl NewDocument {
    pub fn into_queued(self) -> Document {
        Document {
            id: self.id,
            filename: self.filename,
            status: DocumentStatus::Queued,
            processing_options: self.processing_options,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
            checksum: self.checksum,
            raw_artifact: self.raw_artifact,
            result_artifact: None,
            error: None,
            created_at: self.created_at,
            processing_started_at: None,
            completed_at: None,
        }
    }
}

/// Terminal write applied by the orchestrator (or the stale sweep).
#[derive(Debug, Clone, PartialEq)]
pub enum Finalization {
    Complete { result_artifact: ArtifactRef },
    Failed { error: ErrorInfo },
}

impl Finalization {
    pub fn status(&self) -> DocumentStatus {
        match self {
            Finalization::Complete { .. } => DocumentStatus::Complete,
            Finalization::Failed { .. } => DocumentStatus::Failed,
        }
    }

    /// Statuses from which this finalization may be applied.
    pub fn allowed_from(&self) -> &'static [DocumentStatus] {
        match self {
            Finalization::Complete { .. } => &[DocumentStatus::Processing],
            Finalization::Failed { .. } => &[DocumentStatus::Queued, DocumentStatus::Processing],
        }
    }

    pub fn apply(self, document: &mut Document, completed_at: DateTime<Utc>) {
        document.status = self.status();
        document.completed_at = Some(completed_at);
        match self {
            Finalization::Complete { result_artifact } => {
                document.result_artifact = Some(result_artifact);
                document.error = None;
            }
            Finalization::Failed { error } => {
                document.result_artifact = None;
                document.error = Some(error);
            }
        }
    }
}
