//! Request pipeline — extract → synthesize → compile, per request.
//!
//! Flow: RawInput → spawn_blocking(extract) → spawn_blocking(synthesize)
//!       → admission permit → workspace → compile (with recovery) → Artifact.
//!
//! The whole flow runs under the request timeout. Dropping the future on
//! timeout kills the compiler child (`kill_on_drop`) and removes the
//! workspace (its guard drops), so nothing outlives the request.

pub mod handlers;

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::artifacts::{Artifact, ArtifactManager};
use crate::compiler::{CompilationEngine, CompileOutcome, CompilerBackend};
use crate::config::EngineConfig;
use crate::errors::PipelineError;
use crate::extraction::{extract_text, CanonicalText, InputFormat, RawInput};
use crate::synthesis::{synthesize, SynthesisInput, Template, TypesettingDocument};

pub struct Pipeline {
    config: Arc<EngineConfig>,
    engine: CompilationEngine,
    artifacts: ArtifactManager,
    /// FIFO admission for compilations.
    permits: Semaphore,
}

impl Pipeline {
    pub fn new(config: Arc<EngineConfig>, backend: Arc<dyn CompilerBackend>) -> Self {
        let engine = CompilationEngine::new(
            backend,
            config.compile_timeout,
            config.max_compile_retries,
        );
        let artifacts = ArtifactManager::new(&config.workspace_root, config.max_artifact_bytes);
        let permits = Semaphore::new(config.max_concurrent_compiles);
        Self {
            config,
            engine,
            artifacts,
            permits,
        }
    }

    pub fn artifacts(&self) -> &ArtifactManager {
        &self.artifacts
    }

    /// Extracts canonical text from an upload on the blocking pool, under the
    /// request timeout.
    pub async fn extract(
        &self,
        bytes: Bytes,
        format: InputFormat,
        request_id: &str,
    ) -> Result<CanonicalText, PipelineError> {
        self.with_request_timeout(request_id, self.extract_inner(bytes, format))
            .await
    }

    async fn extract_inner(&self, bytes: Bytes, format: InputFormat) -> Result<CanonicalText, PipelineError> {
        let input = RawInput::new(bytes, format, self.config.max_input_bytes)?;
        let canonical = tokio::task::spawn_blocking(move || extract_text(&input))
            .await
            .map_err(|e| PipelineError::Resource(format!("extraction task failed: {e}")))??;

        info!(
            format = format.as_str(),
            chars = canonical.text().len(),
            links = canonical.links().len(),
            "Extracted canonical text"
        );
        Ok(canonical)
    }

    /// Renders an already-parsed input into a PDF artifact.
    pub async fn render(
        &self,
        input: SynthesisInput,
        template: Template,
        request_id: &str,
    ) -> Result<Artifact, PipelineError> {
        self.with_request_timeout(request_id, self.render_inner(input, template, request_id))
            .await
    }

    /// Extracts an upload and renders it, all under one request timeout.
    pub async fn render_upload(
        &self,
        bytes: Bytes,
        format: InputFormat,
        template: Template,
        request_id: &str,
    ) -> Result<Artifact, PipelineError> {
        self.with_request_timeout(request_id, async {
            let canonical = self.extract_inner(bytes, format).await?;
            self.render_inner(SynthesisInput::Canonical(canonical), template, request_id)
                .await
        })
        .await
    }

    async fn with_request_timeout<T, F>(&self, request_id: &str, work: F) -> Result<T, PipelineError>
    where
        F: std::future::Future<Output = Result<T, PipelineError>>,
    {
        match tokio::time::timeout(self.config.request_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(request_id, limit = ?self.config.request_timeout, "Request timed out, work cancelled");
                Err(PipelineError::Timeout)
            }
        }
    }

    async fn render_inner(
        &self,
        input: SynthesisInput,
        template: Template,
        request_id: &str,
    ) -> Result<Artifact, PipelineError> {
        let document: TypesettingDocument =
            tokio::task::spawn_blocking(move || synthesize(&input, template))
                .await
                .map_err(|e| PipelineError::Resource(format!("synthesis task failed: {e}")))??;

        let _permit = match tokio::time::timeout(self.config.admission_wait, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PipelineError::Resource("compiler pool is closed".to_string())),
            Err(_) => return Err(PipelineError::Busy),
        };

        let engine = &self.engine;
        let document = &document;
        let artifact = self
            .artifacts
            .with_workspace(|workspace| async move {
                let result = engine.compile(document, &workspace).await?;
                match (result.outcome, result.artifact) {
                    (CompileOutcome::Success, Some(bytes)) => {
                        info!(
                            request_id,
                            attempts = result.attempts,
                            rules = ?result.applied_rules,
                            "Document compiled"
                        );
                        Ok(bytes)
                    }
                    (CompileOutcome::Timeout, _) => Err(PipelineError::Timeout),
                    (outcome, _) => Err(PipelineError::Compilation {
                        outcome,
                        attempts: result.attempts,
                        log_excerpt: result.log_excerpt,
                    }),
                }
            })
            .await?;

        info!(
            request_id,
            template = %document.template(),
            filename = %artifact.filename,
            bytes = artifact.bytes.len(),
            "Rendered artifact"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use super::*;
    use crate::artifacts::count_workspaces;
    use crate::compiler::fake::{FakeBackend, FakeResponse};
    use crate::models::resume::StructuredResume;

    fn make_config(root: &std::path::Path) -> EngineConfig {
        EngineConfig {
            workspace_root: root.to_path_buf(),
            compile_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            max_concurrent_compiles: 4,
            admission_wait: Duration::from_secs(10),
            ..EngineConfig::default()
        }
    }

    fn make_pipeline(config: EngineConfig, backend: FakeBackend) -> Pipeline {
        Pipeline::new(Arc::new(config), Arc::new(backend))
    }

    fn make_resume(name: &str) -> StructuredResume {
        serde_json::from_value(serde_json::json!({
            "basicInfo": {
                "fullName": name,
                "phone": "555-0100",
                "email": "jane@example.com"
            },
            "education": [],
            "experience": [{
                "organization": "Acme",
                "jobTitle": "Engineer",
                "location": "Remote",
                "startDate": "2021-03-01",
                "endDate": null,
                "isPresent": true,
                "description": ["Improved performance by 35%"]
            }],
            "projects": [],
            "skills": {
                "languages": "Rust",
                "frameworks": "",
                "developerTools": "",
                "libraries": ""
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_structured_render_end_to_end() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = make_pipeline(
            make_config(root.path()),
            FakeBackend::new(|_, _| FakeResponse::Pdf { exit_code: 0 }),
        );

        let artifact = pipeline
            .render(
                SynthesisInput::Structured(make_resume("Jane Smith")),
                Template::Classic,
                "req-e2e",
            )
            .await
            .unwrap();

        // The fake embeds the compiled source in the artifact.
        let body = String::from_utf8(artifact.bytes).unwrap();
        assert!(body.starts_with("%PDF-"));
        assert!(body.contains("Jane Smith"));
        assert!(body.contains(r"35\%"));
        assert_eq!(count_workspaces(root.path()), 0);
    }

    #[tokio::test]
    async fn test_upload_render_extracts_then_compiles() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = make_pipeline(
            make_config(root.path()),
            FakeBackend::new(|_, _| FakeResponse::Pdf { exit_code: 0 }),
        );
        let text = "Jane Smith\n\nEXPERIENCE\n- Improved performance by 35% across the fleet\n- Cut costs by $2M";

        let artifact = pipeline
            .render_upload(Bytes::from(text), InputFormat::PlainText, Template::Compact, "req-up")
            .await
            .unwrap();

        let body = String::from_utf8(artifact.bytes).unwrap();
        assert!(body.contains(r"\resumeItem{Cut costs by \$2M}"));
        assert!(body.contains(r"\documentclass[letterpaper,10pt]{article}"));
    }

    #[tokio::test]
    async fn test_client_errors_are_reported_before_compiling() {
        let root = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new(|_, _| FakeResponse::Pdf { exit_code: 0 });
        let pipeline = make_pipeline(make_config(root.path()), backend);

        let err = pipeline
            .render_upload(Bytes::from_static(b"too short"), InputFormat::PlainText, Template::Classic, "r")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyContent(_)));

        let err = pipeline
            .render_upload(Bytes::new(), InputFormat::Markdown, Template::Classic, "r")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CorruptInput(_)));
        assert_eq!(count_workspaces(root.path()), 0);
    }

    #[tokio::test]
    async fn test_compilation_failure_surfaces_log_excerpt() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = make_pipeline(
            make_config(root.path()),
            FakeBackend::new(|_, _| FakeResponse::Failure {
                log: "! Emergency stop.".to_string(),
            }),
        );

        let err = pipeline
            .render(SynthesisInput::Structured(make_resume("Jane")), Template::Classic, "r")
            .await
            .unwrap_err();
        match err {
            PipelineError::Compilation {
                outcome,
                attempts,
                log_excerpt,
            } => {
                assert_eq!(outcome, CompileOutcome::FatalError);
                assert_eq!(attempts, 1);
                assert!(log_excerpt.contains("Emergency stop"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(count_workspaces(root.path()), 0);
    }

    #[tokio::test]
    async fn test_concurrent_renders_are_isolated() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Arc::new(make_pipeline(
            make_config(root.path()),
            FakeBackend::new(|_, _| FakeResponse::Pdf { exit_code: 0 }),
        ));

        let mut handles = Vec::new();
        for i in 0..20 {
            let pipeline = pipeline.clone();
            handles.push(tokio::spawn(async move {
                let name = format!("Candidate Number{i:02}");
                let artifact = pipeline
                    .render(
                        SynthesisInput::Structured(make_resume(&name)),
                        Template::Classic,
                        &format!("req-{i}"),
                    )
                    .await
                    .unwrap();
                (name, artifact)
            }));
        }

        let mut filenames = HashSet::new();
        for handle in handles {
            let (name, artifact) = handle.await.unwrap();
            let body = String::from_utf8(artifact.bytes).unwrap();
            assert!(body.contains(&name));
            let others = (0..20)
                .map(|i| format!("Candidate Number{i:02}"))
                .filter(|other| *other != name);
            for other in others {
                assert!(!body.contains(&other), "{name} artifact contains {other}");
            }
            filenames.insert(artifact.filename);
        }

        assert_eq!(filenames.len(), 20);
        assert_eq!(count_workspaces(root.path()), 0);
    }

    #[tokio::test]
    async fn test_request_timeout_cancels_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            request_timeout: Duration::from_millis(100),
            compile_timeout: Duration::from_secs(30),
            ..make_config(root.path())
        };
        let pipeline = make_pipeline(config, FakeBackend::new(|_, _| FakeResponse::Hang));

        let err = pipeline
            .render(SynthesisInput::Structured(make_resume("Jane")), Template::Classic, "r")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout));
        assert_eq!(count_workspaces(root.path()), 0);
    }

    #[tokio::test]
    async fn test_extract_runs_under_request_timeout() {
        let root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            request_timeout: Duration::ZERO,
            ..make_config(root.path())
        };
        let pipeline = make_pipeline(config, FakeBackend::new(|_, _| FakeResponse::Pdf { exit_code: 0 }));
        let text = "Jane Smith\n- Improved performance by 35%\n".repeat(20_000);

        let err = pipeline
            .extract(Bytes::from(text), InputFormat::PlainText, "req-slow")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout));
    }

    #[tokio::test]
    async fn test_extract_within_timeout_returns_text() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = make_pipeline(
            make_config(root.path()),
            FakeBackend::new(|_, _| FakeResponse::Pdf { exit_code: 0 }),
        );

        let canonical = pipeline
            .extract(Bytes::from("Jane Smith\r\nEngineer"), InputFormat::PlainText, "req-fast")
            .await
            .unwrap();
        assert_eq!(canonical.text(), "Jane Smith\nEngineer");
    }

    #[tokio::test]
    async fn test_compiler_timeout_maps_to_timeout() {
        let root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            compile_timeout: Duration::from_millis(50),
            ..make_config(root.path())
        };
        let pipeline = make_pipeline(config, FakeBackend::new(|_, _| FakeResponse::Hang));

        let err = pipeline
            .render(SynthesisInput::Structured(make_resume("Jane")), Template::Classic, "r")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout));
        assert_eq!(count_workspaces(root.path()), 0);
    }

    #[tokio::test]
    async fn test_saturated_pool_returns_busy() {
        let root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            max_concurrent_compiles: 1,
            admission_wait: Duration::from_millis(50),
            compile_timeout: Duration::from_millis(500),
            ..make_config(root.path())
        };
        let pipeline = Arc::new(make_pipeline(config, FakeBackend::new(|_, _| FakeResponse::Hang)));

        let holder = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .render(SynthesisInput::Structured(make_resume("First")), Template::Classic, "a")
                    .await
            })
        };
        // Let the first request take the only permit.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let err = pipeline
            .render(SynthesisInput::Structured(make_resume("Second")), Template::Classic, "b")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Busy));

        assert!(matches!(holder.await.unwrap(), Err(PipelineError::Timeout)));
        assert_eq!(count_workspaces(root.path()), 0);
    }

    #[tokio::test]
    #[ignore = "requires a local pdflatex installation"]
    async fn test_real_pdflatex_renders_structured_resume() {
        let root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            compile_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(120),
            ..make_config(root.path())
        };
        let backend = Arc::new(crate::compiler::PdflatexBackend::new(config.pdflatex_path.clone()));
        let pipeline = Pipeline::new(Arc::new(config), backend);

        let artifact = pipeline
            .render(
                SynthesisInput::Structured(make_resume("Jane Smith")),
                Template::Classic,
                "req-real",
            )
            .await
            .unwrap();
        assert!(crate::compiler::is_valid_pdf(&artifact.bytes));
        assert_eq!(count_workspaces(root.path()), 0);
    }
}
