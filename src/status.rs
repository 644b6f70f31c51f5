use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Document, DocumentStatus, ErrorInfo, ProcessingMode, ProcessingOptions};
use crate::repository::DocumentRepository;

const UPLOADING_WINDOW_SECS: i64 = 5;
const FINALIZING_AFTER_SECS: i64 = 100;
const FAST_EXPECTED_SECS: f64 = 30.0;
const QUALITY_EXPECTED_SECS: f64 = 90.0;
const PROCESSING_FLOOR: f64 = 10.0;
const PROCESSING_SPAN: f64 = 85.0;
const PROCESSING_CAP: u8 = 95;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub id: Uuid,
    pub filename: String,
    pub status: DocumentStatus,
    pub processing_options: ProcessingOptions,
    pub error: Option<ErrorInfo>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress_stage: &'static str,
    pub progress: u8,
    pub elapsed_time: i64,
    pub download_url: Option<String>,
}

/// Read-only view over document rows for pollers.
#[derive(Clone)]
pub struct StatusService {
    documents: Arc<dyn DocumentRepository>,
}

impl StatusService {
    pub fn new(documents: Arc<dyn DocumentRepository>) -> Self {
        Self { documents }
    }

    pub async fn get_status(&self, id: Uuid) -> AppResult<StatusReport> {
        let document = self
            .documents
            .find(id)
            .await?
            .ok_or_else(AppError::not_found)?;
        Ok(report(&document, Utc::now()))
    }
}

pub fn report(document: &Document, now: DateTime<Utc>) -> StatusReport {
    let end = document.completed_at.unwrap_or(now);
    let elapsed_time = (end - document.created_at).num_seconds().max(0);
    let (progress_stage, progress) = estimate_progress(
        document.status,
        &document.processing_options,
        elapsed_time,
    );
    let download_url = (document.status == DocumentStatus::Complete)
        .then(|| format!("/api/download/{}", document.id));

    StatusReport {
        id: document.id,
        filename: document.filename.clone(),
        status: document.status,
        processing_options: document.processing_options,
        error: document.error.clone(),
        created_at: document.created_at,
        completed_at: document.completed_at,
        progress_stage,
        progress,
        elapsed_time,
        download_url,
    }
}

/// Stage label and an estimated completion percentage.
pub fn estimate_progress(
    status: DocumentStatus,
    options: &ProcessingOptions,
    elapsed_secs: i64,
) -> (&'static str, u8) {
    match status {
        DocumentStatus::Queued if elapsed_secs < UPLOADING_WINDOW_SECS => {
            ("Uploading file...", (elapsed_secs * 2).clamp(0, 10) as u8)
        }
        DocumentStatus::Queued => ("Queued for processing", 5),
        DocumentStatus::Processing => {
            let mut expected = match options.mode {
                ProcessingMode::Fast => FAST_EXPECTED_SECS,
                ProcessingMode::Quality => QUALITY_EXPECTED_SECS,
            };
            if options.ocr_enabled {
                expected *= 2.0;
            }
            let ratio = elapsed_secs as f64 / expected;
            let estimate = (PROCESSING_FLOOR + PROCESSING_SPAN * ratio).round();
            let progress = estimate.clamp(PROCESSING_FLOOR, PROCESSING_CAP as f64) as u8;
            let stage = if elapsed_secs < FINALIZING_AFTER_SECS {
                "Converting document"
            } else {
                "Finalizing..."
            };
            (stage, progress)
        }
        DocumentStatus::Complete => ("Processing complete", 100),
        DocumentStatus::Failed => ("Processing failed", 0),
    }
}
