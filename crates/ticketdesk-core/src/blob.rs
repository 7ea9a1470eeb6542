//! Durable media storage.
//!
//! Media attached to tickets is copied into a [`BlobStore`] so the transcript
//! keeps a reference that outlives the transport's file handles.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CorsConfiguration, CorsRule};
use aws_sdk_s3::Client;

use ticketdesk_models::{MediaKind, TicketId};

use crate::config::{StorageBackend, StorageConfig};

/// Blob storage errors.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object storage error: {0}")]
    Backend(String),

    #[error("blob storage misconfigured: {0}")]
    Config(String),
}

fn backend_error(e: impl std::error::Error) -> BlobError {
    BlobError::Backend(DisplayErrorContext(e).to_string())
}

pub type BlobResult<T> = std::result::Result<T, BlobError>;

/// Put/get object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `data` under `key` and returns a URL the transports can fetch.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> BlobResult<String>;

    async fn get(&self, key: &str) -> BlobResult<Vec<u8>>;
}

/// Storage key for a ticket's media: `tickets/{ticketId}/{kind}_{unixMillis}{ext}`.
pub fn blob_key(ticket_id: &TicketId, kind: MediaKind, extension: &str) -> String {
    format!(
        "tickets/{}/{}_{}{}",
        ticket_id,
        kind.as_str(),
        Utc::now().timestamp_millis(),
        extension
    )
}

fn validate_key(key: &str) -> BlobResult<()> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(BlobError::InvalidKey(key.to_string()))
    }
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Blob store on the local filesystem.
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url,
        }
    }

    fn path_for(&self, key: &str) -> BlobResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> BlobResult<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        debug!(key, content_type, bytes = data.len(), "Stored blob");

        Ok(match &self.public_base_url {
            Some(base) => join_url(base, key),
            None => format!("file://{}", path.display()),
        })
    }

    async fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Blob store on S3 or an S3-compatible service (MinIO, LocalStack).
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    endpoint: Option<String>,
    region: String,
    public_base_url: Option<String>,
    cors_origins: Vec<String>,
}

impl S3BlobStore {
    /// Builds a client from `[storage]`. Bucket and credentials are required.
    pub fn from_config(storage: &StorageConfig) -> BlobResult<Self> {
        let bucket = storage
            .bucket
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| BlobError::Config("storage.bucket is required".into()))?;
        let (Some(key_id), Some(secret)) = (
            storage.access_key_id.clone(),
            storage.secret_access_key.clone(),
        ) else {
            return Err(BlobError::Config(
                "storage.access_key_id and storage.secret_access_key are required".into(),
            ));
        };

        let credentials = Credentials::new(key_id, secret, None, None, "ticketdesk-config");
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(storage.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(storage.force_path_style);
        if let Some(endpoint) = &storage.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket,
            endpoint: storage.endpoint.clone(),
            region: storage.region.clone(),
            public_base_url: storage.public_base_url.clone(),
            cors_origins: storage.cors_origins.clone(),
        })
    }

    /// Creates the bucket when missing and applies the media CORS rule.
    pub async fn ensure_bucket(&self) -> BlobResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => debug!(bucket = %self.bucket, "Bucket exists"),
            Err(e) if e.as_service_error().is_some_and(|s| s.is_not_found()) => {
                info!(bucket = %self.bucket, "Creating bucket");
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map_err(backend_error)?;
            }
            Err(e) => return Err(backend_error(e)),
        }

        if self.cors_origins.is_empty() {
            return Ok(());
        }
        let rule = CorsRule::builder()
            .set_allowed_origins(Some(self.cors_origins.clone()))
            .allowed_methods("GET")
            .allowed_methods("HEAD")
            .allowed_headers("*")
            .max_age_seconds(3600)
            .build()
            .map_err(backend_error)?;
        let cors = CorsConfiguration::builder()
            .cors_rules(rule)
            .build()
            .map_err(backend_error)?;
        self.client
            .put_bucket_cors()
            .bucket(&self.bucket)
            .cors_configuration(cors)
            .send()
            .await
            .map_err(backend_error)?;
        info!(bucket = %self.bucket, origins = self.cors_origins.len(), "Bucket CORS applied");
        Ok(())
    }

    /// URL under which `key` is served.
    fn object_url(&self, key: &str) -> String {
        match (&self.public_base_url, &self.endpoint) {
            (Some(base), _) => join_url(base, key),
            (None, Some(endpoint)) => join_url(&join_url(endpoint, &self.bucket), key),
            (None, None) => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> BlobResult<String> {
        validate_key(key)?;
        let bytes = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(backend_error)?;
        debug!(key, content_type, bytes, "Uploaded blob");
        Ok(self.object_url(key))
    }

    async fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
        validate_key(key)?;
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|s| s.is_no_such_key()) => {
                return Err(BlobError::NotFound(key.to_string()));
            }
            Err(e) => return Err(backend_error(e)),
        };
        let data = output.body.collect().await.map_err(backend_error)?;
        Ok(data.into_bytes().to_vec())
    }
}

/// Builds the configured blob store. For S3 the bucket is created and its
/// CORS rule applied before the store is returned.
pub async fn from_config(storage: &StorageConfig, default_dir: &Path) -> BlobResult<Arc<dyn BlobStore>> {
    match storage.backend {
        StorageBackend::Fs => Ok(Arc::new(FsBlobStore::new(
            storage.dir.clone().unwrap_or_else(|| default_dir.to_path_buf()),
            storage.public_base_url.clone(),
        ))),
        StorageBackend::S3 => {
            let store = S3BlobStore::from_config(storage)?;
            store.ensure_bucket().await?;
            Ok(Arc::new(store))
        }
    }
}
