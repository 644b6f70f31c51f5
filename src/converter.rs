//! Boundary to the external conversion engine.
//!
//! The engine is a black box: it receives the raw document bytes plus the
//! document's [`ProcessingOptions`] and answers with Markdown text or a typed
//! failure. [`HttpConverter`] talks to a conversion service over HTTP; tests
//! substitute their own [`Converter`] implementations.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ProcessingOptions;

/// Indicators that the engine could not read the input at all.
const CORRUPTION_INDICATORS: &[&str] = &[
    "password",
    "encrypted",
    "protected",
    "corrupt",
    "damaged",
    "invalid",
];

#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub document_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub options: ProcessingOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedArtifact {
    pub markdown: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("input is corrupted or password protected: {0}")]
    CorruptedInput(String),
    #[error("document content is not supported: {0}")]
    UnsupportedContent(String),
    #[error("converter failed: {0}")]
    Internal(String),
}

impl ConversionError {
    /// Picks a failure kind from free-form engine output.
    pub fn classify(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let lowered = detail.to_lowercase();
        if CORRUPTION_INDICATORS
            .iter()
            .any(|indicator| lowered.contains(indicator))
        {
            ConversionError::CorruptedInput(detail)
        } else {
            ConversionError::Internal(detail)
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ConversionError::CorruptedInput(_) => {
                "Unable to process file - ensure the document isn't password-protected or corrupted, then upload it again."
            }
            ConversionError::UnsupportedContent(_) => {
                "This document contains content that could not be converted - try disabling OCR or switching processing mode, then upload it again."
            }
            ConversionError::Internal(_) => {
                "Document processing failed - please try uploading the file again or use a different file."
            }
        }
    }
}

#[async_trait]
pub trait Converter: Send + Sync + 'static {
    async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConvertedArtifact, ConversionError>;
}

#[derive(Deserialize)]
struct ConvertResponse {
    markdown: String,
}

/// Converter backed by a remote conversion service.
///
/// `POST {base}/convert?ocr_enabled=..&mode=..` with the document as the body.
pub struct HttpConverter {
    client: Client,
    endpoint: String,
}

impl HttpConverter {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/convert", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl Converter for HttpConverter {
    async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConvertedArtifact, ConversionError> {
        let ConversionRequest {
            document_id,
            filename,
            content_type,
            bytes,
            options,
        } = request;

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("ocr_enabled", options.ocr_enabled.to_string()),
                ("mode", options.mode.as_str().to_string()),
                ("document_id", document_id.to_string()),
            ])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(
                "x-filename",
                utf8_percent_encode(&filename, NON_ALPHANUMERIC).to_string(),
            )
            .body(bytes)
            .send()
            .await
            .map_err(|err| ConversionError::Internal(format!("converter request failed: {err}")))?;

        let status = response.status();
        if status.is_success() {
            let body: ConvertResponse = response.json().await.map_err(|err| {
                ConversionError::Internal(format!("malformed converter response: {err}"))
            })?;
            return Ok(ConvertedArtifact {
                markdown: body.markdown,
            });
        }

        let detail = response
            .text()
            .await
            .unwrap_or_else(|err| format!("<unreadable body: {err}>"));
        Err(match status {
            StatusCode::UNSUPPORTED_MEDIA_TYPE => ConversionError::UnsupportedContent(detail),
            StatusCode::UNPROCESSABLE_ENTITY => ConversionError::CorruptedInput(detail),
            _ => ConversionError::classify(format!("converter returned {status}: {detail}")),
        })
    }
}
