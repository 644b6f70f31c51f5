use axum::body::Body;
use axum::extract::{Json, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Document, DocumentStatus, NewDocument, ProcessingOptions};
use crate::orchestrator::{TriggerOutcome, MARKDOWN_CONTENT_TYPE};
use crate::state::AppState;
use crate::status::StatusReport;
use crate::storage::Collection;
use crate::utils::filename::{markdown_filename, storage_name};
use crate::validation::{Candidate, ValidationError};

#[derive(Serialize)]
pub struct UploadResponse {
    pub id: Uuid,
    pub filename: String,
    pub status: DocumentStatus,
    pub processing_started: bool,
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct TriggerResponse {
    pub document_id: Uuid,
    pub accepted: bool,
    pub status: DocumentStatus,
}

struct UploadRequest {
    bytes: Vec<u8>,
    original_name: String,
    content_type: Option<String>,
    options_raw: Option<String>,
    auto_process: Option<bool>,
}

fn attachment_content_disposition(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    format!("attachment; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}

/// Unparseable ids cannot name a document, so they are reported as unknown.
fn parse_document_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::not_found())
}

fn parse_processing_options(raw: Option<&str>, filename: &str) -> AppResult<ProcessingOptions> {
    match raw {
        Some(raw) => ProcessingOptions::from_json(raw).map_err(|err| {
            info!(filename, error = %err, "upload rejected: invalid processing options");
            AppError::from(ValidationError::InvalidOptions)
        }),
        None => {
            info!(filename, "upload rejected: missing processing options");
            Err(ValidationError::InvalidOptions.into())
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let max_mb = state.config.max_file_size.div_ceil(1024 * 1024);
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut options_raw: Option<String> = None;
    let mut auto_process: Option<bool> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        warn!(error = %err, "invalid multipart data");
        AppError::validation(format!("invalid upload payload: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                original_name = field.file_name().map(|n| n.to_string());
                content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    warn!(error = %err, "failed to read file bytes");
                    AppError::validation(format!(
                        "Could not read the uploaded file - make sure it is under {max_mb}MB and try again."
                    ))
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("processing_options") => {
                let value = field.text().await.map_err(|err| {
                    warn!(error = %err, "invalid processing options field");
                    AppError::from(ValidationError::InvalidOptions)
                })?;
                options_raw = Some(value);
            }
            Some("auto_process") => {
                let value = field.text().await.map_err(|err| {
                    warn!(error = %err, "invalid auto_process field");
                    AppError::validation("auto_process must be true or false")
                })?;
                auto_process = Some(
                    parse_flag(&value)
                        .ok_or_else(|| AppError::validation("auto_process must be true or false"))?,
                );
            }
            Some(other) => {
                warn!(field = other, "upload rejected: unexpected field");
                return Err(AppError::validation(format!(
                    "unexpected upload field '{other}'"
                )));
            }
            None => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| {
        warn!("upload rejected: missing file field");
        AppError::validation("file field is required")
    })?;
    let original_name = original_name.unwrap_or_default();

    let request = UploadRequest {
        bytes: file_bytes,
        original_name,
        content_type,
        options_raw,
        auto_process,
    };

    let response = process_upload(&state, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn process_upload(
    state: &AppState,
    request: UploadRequest,
) -> AppResult<UploadResponse> {
    let UploadRequest {
        bytes,
        original_name,
        content_type,
        options_raw,
        auto_process,
    } = request;

    let kind = state
        .config
        .upload_policy()
        .validate(&Candidate {
            filename: &original_name,
            declared_content_type: content_type.as_deref(),
            size_bytes: bytes.len(),
        })
        .map_err(|err| {
            info!(filename = %original_name, size_bytes = bytes.len(), reason = %err, "upload rejected");
            AppError::from(err)
        })?;

    let options = parse_processing_options(options_raw.as_deref(), &original_name)?;

    let id = Uuid::new_v4();
    let checksum = hex::encode(Sha256::digest(&bytes));
    let size_bytes = bytes.len() as i64;
    let content_type = kind.mime_type().to_string();

    let raw_artifact = state
        .artifacts
        .store(
            Collection::Uploads,
            id,
            &storage_name(&original_name),
            bytes,
            &content_type,
        )
        .await
        .map_err(|err| {
            error!(document_id = %id, error = ?err, "failed to store raw upload");
            AppError::storage(err)
        })?;

    let new_document = NewDocument {
        id,
        filename: original_name.trim().to_string(),
        processing_options: options,
        content_type,
        size_bytes,
        checksum,
        raw_artifact: raw_artifact.clone(),
        created_at: Utc::now(),
    };

    let document: Document = match state.documents.insert(new_document).await {
        Ok(document) => document,
        Err(err) => {
            error!(document_id = %id, error = %err, "failed to create document row; removing raw upload");
            if let Err(cleanup) = state.artifacts.remove(&raw_artifact).await {
                error!(
                    document_id = %id,
                    key = %raw_artifact,
                    error = ?cleanup,
                    "compensating delete failed; raw upload is orphaned"
                );
            }
            return Err(AppError::storage(err));
        }
    };

    info!(
        document_id = %document.id,
        filename = %document.filename,
        size_bytes = document.size_bytes,
        checksum = %document.checksum,
        "document upload accepted"
    );

    let mut processing_started = false;
    if auto_process.unwrap_or(state.config.auto_process_uploads) {
        match state.orchestrator.trigger(document.id).await {
            Ok(outcome) => processing_started = outcome == TriggerOutcome::Started,
            Err(err) => {
                warn!(document_id = %document.id, error = %err, "automatic processing trigger failed; document stays queued");
            }
        }
    }

    Ok(UploadResponse {
        id: document.id,
        filename: document.filename,
        status: document.status,
        processing_started,
        message: "File uploaded successfully",
    })
}

pub async fn trigger_processing(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<(StatusCode, Json<TriggerResponse>)> {
    let document_id = parse_document_id(&raw_id)?;

    match state.orchestrator.trigger(document_id).await? {
        TriggerOutcome::Started => Ok((
            StatusCode::ACCEPTED,
            Json(TriggerResponse {
                document_id,
                accepted: true,
                status: DocumentStatus::Processing,
            }),
        )),
        TriggerOutcome::AlreadyProcessing => Ok((
            StatusCode::ACCEPTED,
            Json(TriggerResponse {
                document_id,
                accepted: false,
                status: DocumentStatus::Processing,
            }),
        )),
        TriggerOutcome::AlreadyFinished(status) => Err(AppError::invalid_state(format!(
            "Document processing already finished with status '{status}' - upload the file again to process it again."
        ))),
    }
}

pub async fn get_status(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<StatusReport>> {
    let document_id = parse_document_id(&raw_id)?;
    let report = state.status.get_status(document_id).await?;
    Ok(Json(report))
}

pub async fn download_document(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let document_id = parse_document_id(&raw_id)?;
    let document = state
        .documents
        .find(document_id)
        .await?
        .ok_or_else(AppError::not_found)?;

    if document.status != DocumentStatus::Complete {
        return Err(AppError::invalid_state(format!(
            "Document is not ready for download (status: {}). Wait until processing is complete.",
            document.status
        )));
    }

    let artifact = document.result_artifact.as_ref().ok_or_else(|| {
        error!(document_id = %document_id, "complete document has no result artifact");
        AppError::storage("complete document without result artifact")
    })?;

    let bytes = state.artifacts.fetch(artifact).await.map_err(|err| {
        error!(document_id = %document_id, key = %artifact, error = ?err, "failed to load result artifact");
        AppError::storage(err)
    })?;

    let filename = markdown_filename(&document.filename);
    let headers = [
        (header::CONTENT_TYPE, MARKDOWN_CONTENT_TYPE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            attachment_content_disposition(&filename),
        ),
        (header::CONTENT_LENGTH, bytes.len().to_string()),
        (header::CACHE_CONTROL, "no-cache".to_string()),
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
    ];

    Ok((headers, Body::from(bytes)))
}
