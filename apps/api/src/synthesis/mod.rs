//! Document Synthesizer — canonical text or a structured record → LaTeX source.
//!
//! Synthesis is deterministic and CPU-only. Every caller-supplied string is
//! sanitized (escaped, then stripped of dangerous primitives) before it is
//! embedded, and the generated source never names a caller-controlled path.

pub mod canonical;
pub mod escape;
pub mod structured;
pub mod templates;

use thiserror::Error;
use tracing::debug;

use crate::extraction::CanonicalText;
use crate::models::resume::StructuredResume;

pub use templates::Template;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("Not enough content: {0}")]
    EmptyContent(String),
}

/// What the synthesizer renders from.
#[derive(Debug, Clone)]
pub enum SynthesisInput {
    Canonical(CanonicalText),
    Structured(StructuredResume),
}

impl SynthesisInput {
    fn kind(&self) -> &'static str {
        match self {
            Self::Canonical(_) => "canonical",
            Self::Structured(_) => "structured",
        }
    }
}

/// Generated LaTeX source plus the template it was rendered with.
#[derive(Debug, Clone)]
pub struct TypesettingDocument {
    source: String,
    template: Template,
}

impl TypesettingDocument {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn template(&self) -> Template {
        self.template
    }
}

pub fn synthesize(
    input: &SynthesisInput,
    template: Template,
) -> Result<TypesettingDocument, SynthError> {
    let body = match input {
        SynthesisInput::Canonical(canonical) => canonical::render_body(canonical)?,
        SynthesisInput::Structured(resume) => {
            structured::validate(resume)?;
            structured::render_body(resume)
        }
    };

    let source = template.render(&body);
    debug!(
        input = input.kind(),
        template = %template,
        bytes = source.len(),
        "Synthesized typesetting source"
    );
    Ok(TypesettingDocument { source, template })
}
