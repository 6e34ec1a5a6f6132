//! Artifact Store — optional upload of finished PDFs to S3-compatible storage.

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;
use tracing::info;

use crate::config::StorageConfig;

const KEY_PREFIX: &str = "resumes";

#[derive(Debug, Error)]
#[error("Storage error: {0}")]
pub struct StorageError(pub String);

/// Persists an artifact and returns the public URL it can be fetched from.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, bytes: Vec<u8>, filename: &str) -> Result<String, StorageError>;
}

pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3ArtifactStore {
    pub async fn from_config(config: &StorageConfig) -> Self {
        let client = build_s3_client(config).await;
        Self {
            client,
            bucket: config.bucket.clone(),
            public_base_url: public_base_url(config),
        }
    }
}

fn public_base_url(config: &StorageConfig) -> String {
    let base = match (&config.public_base_url, &config.endpoint) {
        (Some(base), _) => base.clone(),
        (None, Some(endpoint)) => format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
        (None, None) => format!("https://{}.s3.{}.amazonaws.com", config.bucket, config.region),
    };
    base.trim_end_matches('/').to_string()
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &StorageConfig) -> aws_sdk_s3::Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.region.clone()));

    if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            key_id,
            secret,
            None,
            None,
            "vitae-static",
        ));
    }
    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(config.endpoint.is_some())
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put(&self, bytes: Vec<u8>, filename: &str) -> Result<String, StorageError> {
        let key = format!("{KEY_PREFIX}/{filename}");
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type("application/pdf")
            .send()
            .await
            .map_err(|e| StorageError(format!("S3 upload failed: {e}")))?;

        info!(bucket = %self.bucket, key = %key, bytes = size, "Uploaded artifact");
        Ok(format!("{}/{key}", self.public_base_url))
    }
}
