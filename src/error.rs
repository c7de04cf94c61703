use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to initialize OCR engine: {0}")]
    InitializationError(String),

    #[error("Failed to read image: {0}")]
    ImageRead(String),

    #[error("Image enhancement failed: {0}")]
    Enhancement(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("OCR timed out after {timeout:?}")]
    OcrTimeout { timeout: Duration },

    #[error("No text survived normalization")]
    EmptyText,

    #[error("Document has no pages")]
    NoPages,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// The page-scoped kind for errors that can occur while processing one page.
    pub fn page_kind(&self) -> PageErrorKind {
        match self {
            PipelineError::ImageRead(_) | PipelineError::UnsupportedFormat(_) => {
                PageErrorKind::ImageRead
            }
            PipelineError::Enhancement(_) => PageErrorKind::Enhancement,
            PipelineError::Ocr(_) | PipelineError::OcrTimeout { .. } => PageErrorKind::Ocr,
            PipelineError::EmptyText => PageErrorKind::EmptyText,
            _ => PageErrorKind::Internal,
        }
    }
}

/// Category of a failure recorded against a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageErrorKind {
    ImageRead,
    Enhancement,
    Ocr,
    EmptyText,
    Internal,
}

/// A page-scoped error marker. Stage errors are converted into this and
/// stored on the page; they never abort the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageError {
    pub kind: PageErrorKind,
    pub message: String,
}

impl From<PipelineError> for PageError {
    fn from(err: PipelineError) -> Self {
        Self {
            kind: err.page_kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            PipelineError::InitializationError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INIT_ERROR")
            }
            PipelineError::ImageRead(_) => (StatusCode::UNPROCESSABLE_ENTITY, "IMAGE_READ_ERROR"),
            PipelineError::Enhancement(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ENHANCEMENT_ERROR")
            }
            PipelineError::Ocr(_) => (StatusCode::INTERNAL_SERVER_ERROR, "OCR_ERROR"),
            PipelineError::OcrTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "OCR_TIMEOUT"),
            PipelineError::EmptyText => (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_TEXT"),
            PipelineError::NoPages => (StatusCode::UNPROCESSABLE_ENTITY, "NO_PAGES"),
            PipelineError::UnsupportedFormat(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_FORMAT"),
            PipelineError::ImageTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "IMAGE_TOO_LARGE")
            }
            PipelineError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            PipelineError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            PipelineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
