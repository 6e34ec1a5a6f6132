//! Format Extractor — normalizes uploaded resume bytes into canonical text.
//!
//! Extraction is purely format-to-text. Nothing here inspects what the text
//! means; that belongs to the synthesizer. Parsing is CPU-bound, so callers on
//! the async side run `extract_text` inside `tokio::task::spawn_blocking`.

pub mod docx;
pub mod pdf;
pub mod text;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

pub(crate) const PDF_MAGIC: &[u8] = b"%PDF-";
pub(crate) const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt input: {0}")]
    CorruptInput(String),
}

/// The closed set of input formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    Pdf,
    Docx,
    Markdown,
    PlainText,
}

impl InputFormat {
    /// Resolves the declared format from an upload's content type, falling back
    /// to the filename extension when the content type is missing or generic.
    pub fn resolve(content_type: Option<&str>, filename: Option<&str>) -> Result<Self, ExtractError> {
        if let Some(format) = content_type.and_then(Self::from_content_type) {
            return Ok(format);
        }
        if let Some(format) = filename.and_then(Self::from_filename) {
            return Ok(format);
        }

        let declared = content_type
            .or_else(|| filename.and_then(|f| f.rsplit_once('.').map(|(_, ext)| ext)))
            .unwrap_or("unknown");
        Err(ExtractError::UnsupportedFormat(format!(
            "'{declared}' is not accepted; upload PDF, DOCX, Markdown, or plain text"
        )))
    }

    fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            DOCX_MIME => Some(Self::Docx),
            "text/markdown" | "text/x-markdown" => Some(Self::Markdown),
            "text/plain" => Some(Self::PlainText),
            _ => None,
        }
    }

    fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" => Some(Self::PlainText),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Markdown => "markdown",
            Self::PlainText => "plain_text",
        }
    }
}

/// An uploaded document: immutable bytes plus the format the caller declared.
#[derive(Debug, Clone)]
pub struct RawInput {
    bytes: Bytes,
    format: InputFormat,
}

impl RawInput {
    /// Wraps caller bytes, rejecting empty buffers and anything above `max_bytes`.
    pub fn new(bytes: Bytes, format: InputFormat, max_bytes: usize) -> Result<Self, ExtractError> {
        if bytes.is_empty() {
            return Err(ExtractError::CorruptInput("uploaded file is empty".to_string()));
        }
        if bytes.len() > max_bytes {
            return Err(ExtractError::CorruptInput(format!(
                "input of {} bytes exceeds the {} byte limit",
                bytes.len(),
                max_bytes
            )));
        }
        Ok(Self { bytes, format })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> InputFormat {
        self.format
    }
}

/// A hyperlink annotation: the visible text span and the URL it points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hyperlink {
    pub text: String,
    pub url: String,
}

/// Normalized plain text of an input document plus its hyperlinks, in document order.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalText {
    text: String,
    links: Vec<Hyperlink>,
}

impl CanonicalText {
    pub fn new(text: String, links: Vec<Hyperlink>) -> Self {
        Self { text, links }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn links(&self) -> &[Hyperlink] {
        &self.links
    }
}

/// Extracts canonical text from `input` according to its declared format.
pub fn extract_text(input: &RawInput) -> Result<CanonicalText, ExtractError> {
    match input.format() {
        InputFormat::Pdf => pdf::extract(input.bytes()),
        InputFormat::Docx => docx::extract(input.bytes()),
        InputFormat::Markdown | InputFormat::PlainText => text::extract(input.bytes()),
    }
}
