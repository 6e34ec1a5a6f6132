use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::compiler::{CompileError, CompileOutcome};
use crate::extraction::ExtractError;
use crate::storage::StorageError;
use crate::synthesis::SynthError;

/// Seconds a client is asked to wait after an admission rejection.
const BUSY_RETRY_AFTER_SECS: &str = "5";

/// Everything a render or extraction request can fail with.
///
/// The first four variants are caller faults; the rest are server-side and
/// never expose their details in a response.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt input: {0}")]
    CorruptInput(String),

    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("Not enough content: {0}")]
    EmptyContent(String),

    #[error("Compilation failed ({outcome:?}) after {attempts} attempt(s)")]
    Compilation {
        outcome: CompileOutcome,
        attempts: u32,
        log_excerpt: String,
    },

    #[error("Request timed out")]
    Timeout,

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Too many concurrent compilations")]
    Busy,
}

impl From<ExtractError> for PipelineError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::UnsupportedFormat(msg) => Self::UnsupportedFormat(msg),
            ExtractError::CorruptInput(msg) => Self::CorruptInput(msg),
        }
    }
}

impl From<SynthError> for PipelineError {
    fn from(e: SynthError) -> Self {
        match e {
            SynthError::SchemaValidation(msg) => Self::SchemaValidation(msg),
            SynthError::EmptyContent(msg) => Self::EmptyContent(msg),
        }
    }
}

impl From<CompileError> for PipelineError {
    fn from(e: CompileError) -> Self {
        Self::Resource(e.to_string())
    }
}

impl From<StorageError> for PipelineError {
    fn from(e: StorageError) -> Self {
        Self::Resource(e.to_string())
    }
}

/// HTTP-facing error: a pipeline failure plus the request's correlation id.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct AppError {
    pub kind: PipelineError,
    pub request_id: Option<String>,
}

impl AppError {
    pub fn new(kind: PipelineError, request_id: &str) -> Self {
        Self {
            kind,
            request_id: Some(request_id.to_string()),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(kind: PipelineError) -> Self {
        Self {
            kind,
            request_id: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = self.request_id.as_deref().unwrap_or("-");
        let (status, code, message) = match &self.kind {
            PipelineError::UnsupportedFormat(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_FORMAT",
                msg.clone(),
            ),
            PipelineError::CorruptInput(msg) => {
                (StatusCode::BAD_REQUEST, "CORRUPT_INPUT", msg.clone())
            }
            PipelineError::SchemaValidation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "SCHEMA_VALIDATION_ERROR",
                msg.clone(),
            ),
            PipelineError::EmptyContent(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "EMPTY_CONTENT",
                msg.clone(),
            ),
            PipelineError::Compilation {
                outcome,
                attempts,
                log_excerpt,
            } => {
                tracing::error!(
                    request_id,
                    ?outcome,
                    attempts,
                    "Compilation error. Log excerpt:\n{log_excerpt}"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "COMPILATION_ERROR",
                    "The document could not be compiled".to_string(),
                )
            }
            PipelineError::Timeout => {
                tracing::error!(request_id, "Request timed out");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "TIMEOUT",
                    "The request took too long to complete".to_string(),
                )
            }
            PipelineError::Resource(msg) => {
                tracing::error!(request_id, "Resource error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "RESOURCE_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
            PipelineError::Busy => {
                tracing::warn!(request_id, "Admission rejected, compiler pool saturated");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "BUSY",
                    "The service is busy, retry shortly".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(id) = &self.request_id {
            error["request_id"] = json!(id);
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if matches!(self.kind, PipelineError::Busy) {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from_static(BUSY_RETRY_AFTER_SECS),
            );
        }
        response
    }
}
