use std::path::Path;

use thiserror::Error;

pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
pub const MAX_FILENAME_LENGTH: usize = 255;
const GENERIC_BINARY_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Pdf,
        DocumentKind::Docx,
        DocumentKind::Pptx,
        DocumentKind::Xlsx,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Docx => "docx",
            DocumentKind::Pptx => "pptx",
            DocumentKind::Xlsx => "xlsx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentKind::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            DocumentKind::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.extension() == ext)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("File is empty - select a document with content and upload it again.")]
    EmptyFile,
    #[error(
        "File too large ({size_mb:.1}MB) - maximum size is {max_mb}MB. Try compressing your file or splitting it into multiple files."
    )]
    TooLarge { size_mb: f64, max_mb: usize },
    #[error("Cannot process .{extension} files - supported formats: PDF, DOCX, PPTX, XLSX.")]
    UnsupportedFormat { extension: String },
    #[error(
        "File type mismatch - the file is named .{extension} but was sent as {declared}. Supported formats: PDF, DOCX, PPTX, XLSX."
    )]
    ContentTypeMismatch { extension: String, declared: String },
    #[error("A filename is required and must be at most 255 characters.")]
    InvalidFilename,
    #[error("Invalid processing options - expected {{\"ocr_enabled\": true|false, \"mode\": \"fast\"|\"quality\"}}.")]
    InvalidOptions,
}

/// An upload as declared by the client, before anything is persisted.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub filename: &'a str,
    pub declared_content_type: Option<&'a str>,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    pub max_file_size: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl UploadPolicy {
    /// Size first, then type; the first failing check wins.
    pub fn validate(&self, candidate: &Candidate<'_>) -> Result<DocumentKind, ValidationError> {
        if candidate.size_bytes == 0 {
            return Err(ValidationError::EmptyFile);
        }
        if candidate.size_bytes > self.max_file_size {
            return Err(ValidationError::TooLarge {
                size_mb: candidate.size_bytes as f64 / (1024.0 * 1024.0),
                max_mb: self.max_file_size.div_ceil(1024 * 1024),
            });
        }

        let filename = candidate.filename.trim();
        if filename.is_empty() || filename.chars().count() > MAX_FILENAME_LENGTH {
            return Err(ValidationError::InvalidFilename);
        }

        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let kind = DocumentKind::from_extension(&extension)
            .ok_or_else(|| ValidationError::UnsupportedFormat {
                extension: if extension.is_empty() {
                    "unknown".to_string()
                } else {
                    extension.clone()
                },
            })?;

        if let Some(declared) = candidate.declared_content_type {
            let essence = declared
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            if !essence.is_empty() && essence != GENERIC_BINARY_MIME && essence != kind.mime_type()
            {
                return Err(ValidationError::ContentTypeMismatch {
                    extension,
                    declared: essence,
                });
            }
        }

        Ok(kind)
    }
}
