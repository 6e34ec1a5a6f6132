//! Compiler backends — the narrow capability the engine drives.
//!
//! A backend runs one compilation attempt inside a prepared workspace and
//! reports what it produced. It never decides success; the engine does.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("compiler exceeded its {0:?} time limit")]
    Timeout(Duration),

    #[error("failed to start compiler: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("compiler I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One compilation attempt: `source_file` inside `workspace`, outputs named by `job_name`.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub workspace: &'a Path,
    pub source_file: &'a str,
    pub job_name: &'a str,
    pub timeout: Duration,
}

impl Invocation<'_> {
    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.workspace.join(format!("{}.{extension}", self.job_name))
    }
}

/// What a finished attempt left behind. `artifact` is whatever the compiler
/// wrote, valid or not.
#[derive(Debug, Clone, Default)]
pub struct BackendOutput {
    pub exit_code: Option<i32>,
    pub log: String,
    pub artifact: Option<Vec<u8>>,
}

#[async_trait]
pub trait CompilerBackend: Send + Sync {
    async fn run(&self, invocation: &Invocation<'_>) -> Result<BackendOutput, BackendError>;
}

// ────────────────────────────────────────────────────────────────────────────
// pdflatex
// ────────────────────────────────────────────────────────────────────────────

/// Runs an external `pdflatex` binary as a child process.
#[derive(Debug, Clone)]
pub struct PdflatexBackend {
    binary: PathBuf,
}

impl PdflatexBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, invocation: &Invocation<'_>) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("-interaction=nonstopmode")
            .arg("-no-shell-escape")
            .arg("-file-line-error")
            .arg(format!("-jobname={}", invocation.job_name))
            .arg(invocation.source_file)
            .current_dir(invocation.workspace)
            // Confine kpathsea reads and writes to the working directory.
            .env("openin_any", "p")
            .env("openout_any", "p")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "Compiler output pipe closed early");
        }
    }
    buf
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, std::io::Error> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl CompilerBackend for PdflatexBackend {
    async fn run(&self, invocation: &Invocation<'_>) -> Result<BackendOutput, BackendError> {
        let mut child = self
            .command(invocation)
            .spawn()
            .map_err(BackendError::Spawn)?;

        // Drain both pipes concurrently so a chatty compiler never blocks on a full pipe.
        let stdout = tokio::spawn(drain(child.stdout.take()));
        let stderr = tokio::spawn(drain(child.stderr.take()));

        let status = match tokio::time::timeout(invocation.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                // kill() also reaps the child.
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out compiler process");
                }
                stdout.abort();
                stderr.abort();
                return Err(BackendError::Timeout(invocation.timeout));
            }
        };

        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();

        let log = match read_optional(&invocation.output_path("log")).await? {
            Some(log) => String::from_utf8_lossy(&log).into_owned(),
            None => format!(
                "{}{}",
                String::from_utf8_lossy(&stdout),
                String::from_utf8_lossy(&stderr)
            ),
        };
        let artifact = read_optional(&invocation.output_path("pdf")).await?;

        debug!(
            exit_code = ?status.code(),
            artifact_bytes = artifact.as_ref().map(Vec::len),
            "pdflatex attempt finished"
        );
        Ok(BackendOutput {
            exit_code: status.code(),
            log,
            artifact,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn make_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-pdflatex");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn make_invocation(workspace: &Path, timeout: Duration) -> Invocation<'_> {
        Invocation {
            workspace,
            source_file: "resume.tex",
            job_name: "resume",
            timeout,
        }
    }

    #[tokio::test]
    async fn test_collects_artifact_despite_nonzero_exit() {
        let bin_dir = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let script = make_script(
            bin_dir.path(),
            r#"echo "$@" > args.txt
echo "$openin_any $openout_any" > env.txt
printf '%%PDF-1.5\nbody\n%%%%EOF\n' > resume.pdf
echo "LaTeX Warning: something minor" > resume.log
exit 1"#,
        );

        let backend = PdflatexBackend::new(&script);
        let output = backend
            .run(&make_invocation(workspace.path(), Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(1));
        assert!(output.log.contains("something minor"));
        assert_eq!(output.artifact.unwrap(), b"%PDF-1.5\nbody\n%%EOF\n");

        let args = std::fs::read_to_string(workspace.path().join("args.txt")).unwrap();
        assert!(args.contains("-interaction=nonstopmode"));
        assert!(args.contains("-no-shell-escape"));
        assert!(args.contains("-jobname=resume"));
        assert!(!args.contains("-halt-on-error"));
        let env = std::fs::read_to_string(workspace.path().join("env.txt")).unwrap();
        assert_eq!(env.trim(), "p p");
    }

    #[tokio::test]
    async fn test_log_falls_back_to_process_output() {
        let bin_dir = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let script = make_script(bin_dir.path(), "echo 'emergency stop'; echo 'fatal' >&2; exit 1");

        let output = PdflatexBackend::new(&script)
            .run(&make_invocation(workspace.path(), Duration::from_secs(10)))
            .await
            .unwrap();

        assert!(output.artifact.is_none());
        assert!(output.log.contains("emergency stop"));
        assert!(output.log.contains("fatal"));
    }

    #[tokio::test]
    async fn test_timeout_kills_the_process() {
        let bin_dir = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let script = make_script(bin_dir.path(), "echo $$ > pid.txt\nexec sleep 30");

        let started = std::time::Instant::now();
        let err = PdflatexBackend::new(&script)
            .run(&make_invocation(workspace.path(), Duration::from_millis(500)))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid = std::fs::read_to_string(workspace.path().join("pid.txt")).unwrap();
        let alive = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("kill -0 {}", pid.trim()))
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(!alive.success(), "compiler process {} survived", pid.trim());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let workspace = tempfile::tempdir().unwrap();
        let err = PdflatexBackend::new("/nonexistent/pdflatex")
            .run(&make_invocation(workspace.path(), Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Spawn(_)));
    }
}
