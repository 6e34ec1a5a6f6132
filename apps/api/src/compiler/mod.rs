//! Compilation Engine — drives a compiler backend with bounded auto-recovery.
//!
//! The engine is an explicit state machine:
//!
//! ```text
//! Compiling ─► Succeeded
//!     │
//!     └─► AnalyzingFailure ─► Retrying ─► Compiling
//!                 │
//!                 └─► Failed (no applicable rule, budget spent, or timeout)
//! ```
//!
//! Success is lenient: any attempt that leaves a structurally valid PDF
//! behind succeeds, whatever the exit status or warnings.

pub mod backend;
pub mod diagnostics;
#[cfg(test)]
pub(crate) mod fake;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::synthesis::TypesettingDocument;

pub use backend::{BackendError, CompilerBackend, Invocation, PdflatexBackend};
use diagnostics::RecoveryRule;

pub const SOURCE_FILE: &str = "resume.tex";
pub const JOB_NAME: &str = "resume";
/// Outputs removed before every attempt so a stale artifact never counts.
const ATTEMPT_OUTPUTS: [&str; 3] = ["pdf", "log", "aux"];
/// Trailing window searched for the `%%EOF` marker.
const EOF_WINDOW: usize = 1024;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("workspace I/O failed: {0}")]
    Workspace(#[from] std::io::Error),

    #[error(transparent)]
    Backend(BackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileOutcome {
    Success,
    RecoverableFailureExhausted,
    Timeout,
    FatalError,
}

#[derive(Debug, Clone)]
pub struct CompilationResult {
    pub outcome: CompileOutcome,
    pub artifact: Option<Vec<u8>>,
    pub log_excerpt: String,
    pub attempts: u32,
    /// Recovery rules applied, in order.
    pub applied_rules: Vec<&'static str>,
}

enum State {
    Compiling,
    AnalyzingFailure,
    Retrying { rule: RecoveryRule, patched: String },
    Succeeded(Vec<u8>),
    Failed(CompileOutcome),
}

/// `%PDF-` signature, non-empty body, and `%%EOF` in the trailing kilobyte.
pub fn is_valid_pdf(bytes: &[u8]) -> bool {
    if !bytes.starts_with(b"%PDF-") || bytes.len() <= 5 {
        return false;
    }
    let tail = &bytes[bytes.len().saturating_sub(EOF_WINDOW)..];
    tail.windows(5).any(|w| w == b"%%EOF")
}

#[derive(Clone)]
pub struct CompilationEngine {
    backend: Arc<dyn CompilerBackend>,
    attempt_timeout: Duration,
    max_retries: u32,
}

impl CompilationEngine {
    pub fn new(
        backend: Arc<dyn CompilerBackend>,
        attempt_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            backend,
            attempt_timeout,
            max_retries,
        }
    }

    /// Compiles `document` inside `workspace`, retrying recoverable failures.
    ///
    /// Non-success outcomes are reported in the result; `Err` is reserved for
    /// the backend or the workspace failing outright.
    pub async fn compile(
        &self,
        document: &TypesettingDocument,
        workspace: &Path,
    ) -> Result<CompilationResult, CompileError> {
        let invocation = Invocation {
            workspace,
            source_file: SOURCE_FILE,
            job_name: JOB_NAME,
            timeout: self.attempt_timeout,
        };

        let mut source = document.source().to_string();
        let mut attempts = 0u32;
        let mut applied_rules = Vec::new();
        let mut log = String::new();
        let mut state = State::Compiling;

        loop {
            state = match state {
                State::Compiling => {
                    attempts += 1;
                    clear_outputs(&invocation).await?;
                    tokio::fs::write(workspace.join(SOURCE_FILE), &source).await?;

                    match self.backend.run(&invocation).await {
                        Ok(output) => {
                            debug!(attempt = attempts, exit_code = ?output.exit_code, "Compiler exited");
                            log = output.log;
                            match output.artifact {
                                Some(artifact) if is_valid_pdf(&artifact) => {
                                    State::Succeeded(artifact)
                                }
                                _ => State::AnalyzingFailure,
                            }
                        }
                        Err(BackendError::Timeout(limit)) => {
                            warn!(attempt = attempts, ?limit, "Compilation attempt timed out");
                            State::Failed(CompileOutcome::Timeout)
                        }
                        Err(e) => return Err(CompileError::Backend(e)),
                    }
                }

                State::AnalyzingFailure => {
                    let candidate = diagnostics::diagnose(&log)
                        .into_iter()
                        .find_map(|rule| rule.apply(&source).map(|patched| (rule, patched)));

                    match candidate {
                        None => {
                            warn!(attempt = attempts, "No recovery rule matches the compiler log");
                            State::Failed(CompileOutcome::FatalError)
                        }
                        Some(_) if attempts > self.max_retries => {
                            warn!(attempts, "Recovery budget exhausted");
                            State::Failed(CompileOutcome::RecoverableFailureExhausted)
                        }
                        Some((rule, patched)) => State::Retrying { rule, patched },
                    }
                }

                State::Retrying { rule, patched } => {
                    info!(attempt = attempts, rule = rule.name(), "Applying recovery rule");
                    applied_rules.push(rule.name());
                    source = patched;
                    State::Compiling
                }

                State::Succeeded(artifact) => {
                    info!(attempts, bytes = artifact.len(), "Compilation succeeded");
                    return Ok(CompilationResult {
                        outcome: CompileOutcome::Success,
                        artifact: Some(artifact),
                        log_excerpt: diagnostics::log_excerpt(&log),
                        attempts,
                        applied_rules,
                    });
                }

                State::Failed(outcome) => {
                    return Ok(CompilationResult {
                        outcome,
                        artifact: None,
                        log_excerpt: diagnostics::log_excerpt(&log),
                        attempts,
                        applied_rules,
                    });
                }
            };
        }
    }
}

async fn clear_outputs(invocation: &Invocation<'_>) -> Result<(), std::io::Error> {
    for extension in ATTEMPT_OUTPUTS {
        match tokio::fs::remove_file(invocation.output_path(extension)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
