//! Google Cloud Storage backend.
//!
//! # Credentials
//!
//! Application default credentials are discovered from the ambient
//! environment (`GOOGLE_APPLICATION_CREDENTIALS`, gcloud user credentials or
//! the metadata server).

use crate::backend::PROBE_TIMEOUT;
use crate::config::GcsConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::{Binary, StorageBackend};
use async_trait::async_trait;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::Error as GcsError;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use std::sync::Arc;
use tracing::instrument;

/// The handful of object operations the backend needs, so that the backend
/// logic can be exercised without a real bucket.
#[async_trait]
pub(crate) trait ObjectClient: Send + Sync {
    async fn download(&self, bucket: &str, object: &str) -> Result<Vec<u8>>;
    async fn exists(&self, bucket: &str, object: &str) -> Result<bool>;
    async fn upload(&self, bucket: &str, object: &str, data: Vec<u8>) -> Result<()>;
}

fn map_gcs_error(err: GcsError, bucket: &str, object: &str) -> Error {
    let uri = format!("gs://{bucket}/{object}");
    match &err {
        GcsError::Response(response) if response.code == 404 => ErrorKind::NotFound(uri).into(),
        _ => ErrorKind::Transport(format!("{uri}: {err}")).into(),
    }
}

/// A metadata lookup that 404s means the object is absent, not that the
/// lookup failed.
fn object_exists<T>(outcome: std::result::Result<T, GcsError>, bucket: &str, object: &str) -> Result<bool> {
    match outcome {
        Ok(_) => Ok(true),
        Err(GcsError::Response(response)) if response.code == 404 => Ok(false),
        Err(err) => Err(map_gcs_error(err, bucket, object)),
    }
}

fn object_request(bucket: &str, object: &str) -> GetObjectRequest {
    GetObjectRequest {
        bucket: bucket.to_string(),
        object: object.to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl ObjectClient for Client {
    async fn download(&self, bucket: &str, object: &str) -> Result<Vec<u8>> {
        self.download_object(&object_request(bucket, object), &Range::default())
            .await
            .map_err(|e| map_gcs_error(e, bucket, object))
    }

    async fn exists(&self, bucket: &str, object: &str) -> Result<bool> {
        object_exists(self.get_object(&object_request(bucket, object)).await, bucket, object)
    }

    async fn upload(&self, bucket: &str, object: &str, data: Vec<u8>) -> Result<()> {
        let request = UploadObjectRequest {
            bucket: bucket.to_string(),
            ..Default::default()
        };
        let upload_type = UploadType::Simple(Media::new(object.to_string()));
        self.upload_object(&request, data, &upload_type)
            .await
            .map_err(|e| map_gcs_error(e, bucket, object))?;
        Ok(())
    }
}

pub struct GcsBackend {
    client: Arc<dyn ObjectClient>,
    config: GcsConfig,
    description: String,
}

impl GcsBackend {
    /// Create a client from application default credentials.
    pub async fn connect(config: GcsConfig) -> Result<Self> {
        let client_config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| ErrorKind::InvalidConfig(format!("unable to load GCS credentials: {e}")))?;
        Ok(Self::with_client(Arc::new(Client::new(client_config)), config))
    }

    pub(crate) fn with_client(client: Arc<dyn ObjectClient>, config: GcsConfig) -> Self {
        let description = format!("gs://{}/{}", config.bucket, config.path_template);
        Self {
            client,
            config,
            description,
        }
    }

    fn object(&self, binary: &Binary) -> String {
        self.config.common.resolve(binary, &self.config.path_template)
    }
}

#[async_trait]
impl StorageBackend for GcsBackend {
    fn describe(&self) -> &str {
        &self.description
    }

    /// Not bounded by a timeout so that large downloads are never aborted
    /// mid-stream.
    #[instrument(skip(self), fields(backend = self.describe(), binary = %binary))]
    async fn fetch(&self, binary: &Binary) -> Result<Vec<u8>> {
        let object = self.object(binary);
        let raw = self.client.download(&self.config.bucket, &object).await?;
        self.config.common.extract(raw, &object, binary)
    }

    #[instrument(skip(self, content), fields(backend = self.describe(), binary = %binary, size = content.len()))]
    async fn store(&self, binary: &Binary, content: &[u8]) -> Result<()> {
        let object = self.object(binary);
        let uri = format!("gs://{}/{}", self.config.bucket, object);
        let exists = tokio::time::timeout(PROBE_TIMEOUT, self.client.exists(&self.config.bucket, &object))
            .await
            .map_err(|_| ErrorKind::Transport(format!("{uri}: existence probe timed out")))??;
        if exists {
            exn::bail!(ErrorKind::AlreadyExists(uri));
        }
        self.client.upload(&self.config.bucket, &object, content.to_vec()).await?;
        tracing::debug!(uri = %uri, "Stored binary");
        Ok(())
    }
}
