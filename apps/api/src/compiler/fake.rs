//! In-process compiler double for tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::compiler::backend::{BackendError, BackendOutput, CompilerBackend, Invocation};

pub(crate) enum FakeResponse {
    /// Write a valid PDF embedding the source, then exit with `exit_code`.
    Pdf { exit_code: i32 },
    /// Write a PDF-looking file that lacks the `%%EOF` trailer.
    Garbage,
    /// Write `log` and no artifact.
    Failure { log: String },
    /// Never finish within the attempt timeout.
    Hang,
}

type Responder = dyn Fn(u32, &str) -> FakeResponse + Send + Sync;

/// Decides each attempt's outcome from the attempt number (1-based) and the source on disk.
pub(crate) struct FakeBackend {
    responder: Box<Responder>,
    calls: AtomicU32,
}

impl FakeBackend {
    pub(crate) fn new(responder: impl Fn(u32, &str) -> FakeResponse + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompilerBackend for FakeBackend {
    async fn run(&self, invocation: &Invocation<'_>) -> Result<BackendOutput, BackendError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let source =
            tokio::fs::read_to_string(invocation.workspace.join(invocation.source_file)).await?;

        let (exit_code, log) = match (self.responder)(attempt, &source) {
            FakeResponse::Pdf { exit_code } => {
                let pdf = format!("%PDF-1.7\n{source}\n%%EOF\n");
                tokio::fs::write(invocation.output_path("pdf"), pdf).await?;
                (exit_code, "Output written on resume.pdf".to_string())
            }
            FakeResponse::Garbage => {
                tokio::fs::write(invocation.output_path("pdf"), b"%PDF-1.7\ntruncated").await?;
                (1, "! Emergency stop.".to_string())
            }
            FakeResponse::Failure { log } => (1, log),
            FakeResponse::Hang => {
                tokio::time::sleep(invocation.timeout).await;
                return Err(BackendError::Timeout(invocation.timeout));
            }
        };
        tokio::fs::write(invocation.output_path("log"), &log).await?;

        let artifact = match tokio::fs::read(invocation.output_path("pdf")).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(BackendOutput {
            exit_code: Some(exit_code),
            log,
            artifact,
        })
    }
}
