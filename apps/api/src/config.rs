use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

const MIB: usize = 1024 * 1024;

/// Application configuration loaded from environment variables.
/// Startup fails if a variable is present but malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub engine: EngineConfig,
    /// `None` unless `S3_BUCKET` is set; rendered PDFs are then returned inline.
    pub storage: Option<StorageConfig>,
}

/// Read-only limits and paths shared by every request.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub pdflatex_path: PathBuf,
    pub workspace_root: PathBuf,
    pub compile_timeout: Duration,
    pub request_timeout: Duration,
    pub max_compile_retries: u32,
    pub max_input_bytes: usize,
    pub max_artifact_bytes: usize,
    pub max_concurrent_compiles: usize,
    pub admission_wait: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pdflatex_path: PathBuf::from("pdflatex"),
            workspace_root: std::env::temp_dir(),
            compile_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(90),
            max_compile_retries: 2,
            max_input_bytes: 10 * MIB,
            max_artifact_bytes: 5 * MIB,
            max_concurrent_compiles: available_cores(),
            admission_wait: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub public_base_url: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            pdflatex_path: optional_env("PDFLATEX_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.pdflatex_path),
            workspace_root: optional_env("WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            compile_timeout: parse_env("COMPILE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.compile_timeout),
            request_timeout: parse_env("REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_compile_retries: parse_env("MAX_COMPILE_RETRIES")?
                .unwrap_or(defaults.max_compile_retries),
            max_input_bytes: parse_env("MAX_INPUT_BYTES")?.unwrap_or(defaults.max_input_bytes),
            max_artifact_bytes: parse_env("MAX_ARTIFACT_BYTES")?
                .unwrap_or(defaults.max_artifact_bytes),
            max_concurrent_compiles: parse_env::<usize>("MAX_CONCURRENT_COMPILES")?
                .unwrap_or(defaults.max_concurrent_compiles)
                .max(1),
            admission_wait: parse_env("ADMISSION_WAIT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.admission_wait),
        };

        let storage = optional_env("S3_BUCKET").map(|bucket| StorageConfig {
            bucket,
            endpoint: optional_env("S3_ENDPOINT"),
            public_base_url: optional_env("S3_PUBLIC_BASE_URL"),
            region: optional_env("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            access_key_id: optional_env("AWS_ACCESS_KEY_ID"),
            secret_access_key: optional_env("AWS_SECRET_ACCESS_KEY"),
        });

        Ok(Config {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            engine,
            storage,
        })
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    optional_env(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'"))
        })
        .transpose()
}
