use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifacts::Artifact;
use crate::errors::{AppError, PipelineError};
use crate::extraction::{CanonicalText, InputFormat};
use crate::models::resume::StructuredResume;
use crate::state::AppState;
use crate::synthesis::{SynthesisInput, Template};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const FILE_FIELD: &str = "resume_file";
const TEMPLATE_FIELD: &str = "template";

#[derive(Debug, Deserialize)]
pub struct StructuredRenderRequest {
    pub resume: StructuredResume,
    #[serde(default)]
    pub template: Template,
}

#[derive(Debug, Serialize)]
pub struct StoredArtifactResponse {
    pub resume_link: String,
    pub pdf_filename: String,
}

/// Multipart upload: the file plus an optional template name.
struct Upload {
    bytes: Bytes,
    format: InputFormat,
    template: Template,
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, PipelineError> {
    let mut file: Option<(Bytes, Option<String>, Option<String>)> = None;
    let mut template = Template::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::CorruptInput(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                let content_type = field.content_type().map(str::to_string);
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    PipelineError::CorruptInput(format!("could not read uploaded file: {e}"))
                })?;
                file = Some((bytes, content_type, filename));
            }
            Some(TEMPLATE_FIELD) => {
                let value = field.text().await.map_err(|e| {
                    PipelineError::CorruptInput(format!("could not read template field: {e}"))
                })?;
                template = value.parse().map_err(PipelineError::SchemaValidation)?;
            }
            _ => {}
        }
    }

    let (bytes, content_type, filename) = file.ok_or_else(|| {
        PipelineError::SchemaValidation(format!("multipart field '{FILE_FIELD}' is required"))
    })?;
    let format = InputFormat::resolve(content_type.as_deref(), filename.as_deref())?;
    Ok(Upload {
        bytes,
        format,
        template,
    })
}

/// Returns the PDF inline, or uploads it and returns its link when storage is configured.
async fn deliver(state: &AppState, artifact: Artifact) -> Result<Response, PipelineError> {
    if let Some(store) = &state.store {
        let resume_link = store.put(artifact.bytes, &artifact.filename).await?;
        return Ok(Json(StoredArtifactResponse {
            resume_link,
            pdf_filename: artifact.filename,
        })
        .into_response());
    }

    let disposition = format!("attachment; filename=\"{}\"", artifact.filename);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}

/// POST /api/v1/render/upload
pub async fn handle_render_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let request_id = request_id(&headers);
    let result = async {
        let upload = read_upload(multipart).await?;
        let artifact = state
            .pipeline
            .render_upload(upload.bytes, upload.format, upload.template, &request_id)
            .await?;
        deliver(&state, artifact).await
    }
    .await;
    result.map_err(|e| AppError::new(e, &request_id))
}

/// POST /api/v1/render/structured
pub async fn handle_render_structured(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let request_id = request_id(&headers);
    let result = async {
        // Parsed by hand so schema errors use the API's error envelope.
        let request: StructuredRenderRequest = serde_json::from_slice(&body)
            .map_err(|e| PipelineError::SchemaValidation(format!("invalid resume JSON: {e}")))?;
        let artifact = state
            .pipeline
            .render(
                SynthesisInput::Structured(request.resume),
                request.template,
                &request_id,
            )
            .await?;
        deliver(&state, artifact).await
    }
    .await;
    result.map_err(|e| AppError::new(e, &request_id))
}

/// POST /api/v1/extract
pub async fn handle_extract(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<CanonicalText>, AppError> {
    let request_id = request_id(&headers);
    let result = async {
        let upload = read_upload(multipart).await?;
        state
            .pipeline
            .extract(upload.bytes, upload.format, &request_id)
            .await
    }
    .await;
    result
        .map(Json)
        .map_err(|e| AppError::new(e, &request_id))
}
