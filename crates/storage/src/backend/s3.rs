//! S3-compatible storage backend.
//!
//! # Credentials
//!
//! Credentials, and the region unless configured, come from the ambient AWS
//! environment (environment variables, profiles, instance metadata) through
//! `aws-config`. Setting an endpoint switches to path-style addressing for
//! S3-compatible services such as MinIO or Backblaze B2.

use crate::backend::PROBE_TIMEOUT;
use crate::config::S3Config;
use crate::error::{ErrorKind, Result};
use crate::{Binary, StorageBackend};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Region, retry::RetryConfig};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    config: S3Config,
    description: String,
}

impl S3Backend {
    /// Create a client from the ambient AWS configuration.
    pub async fn connect(config: S3Config) -> Result<Self> {
        let shared = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared)
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4));
        if let Some(region) = &config.region {
            builder = builder.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Ok(Self::with_client(Client::from_conf(builder.build()), config))
    }

    /// Use an already-configured client.
    pub fn with_client(client: Client, config: S3Config) -> Self {
        let description = format!("s3://{}/{}", config.bucket, config.path_template);
        Self {
            client,
            config,
            description,
        }
    }

    fn key(&self, binary: &Binary) -> String {
        self.config.common.resolve(binary, &self.config.path_template)
    }

    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.config.bucket, key)
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn describe(&self) -> &str {
        &self.description
    }

    /// Deliberately not bounded by a timeout: a large download must not be
    /// cut off halfway through.
    #[instrument(skip(self), fields(backend = self.describe(), binary = %binary))]
    async fn fetch(&self, binary: &Binary) -> Result<Vec<u8>> {
        let key = self.key(binary);
        let output = match self.client.get_object().bucket(&self.config.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(err) => {
                if matches!(err.as_service_error(), Some(GetObjectError::NoSuchKey(_))) {
                    exn::bail!(ErrorKind::NotFound(self.uri(&key)));
                }
                exn::bail!(ErrorKind::Transport(format!("{}: {}", self.uri(&key), DisplayErrorContext(&err))));
            },
        };
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| ErrorKind::Transport(format!("{}: {e}", self.uri(&key))))?
            .into_bytes();
        self.config.common.extract(body.to_vec(), &key, binary)
    }

    #[instrument(skip(self, content), fields(backend = self.describe(), binary = %binary, size = content.len()))]
    async fn store(&self, binary: &Binary, content: &[u8]) -> Result<()> {
        let key = self.key(binary);
        let probe = self.client.head_object().bucket(&self.config.bucket).key(&key).send();
        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Err(_elapsed) => exn::bail!(ErrorKind::Transport(format!("{}: existence probe timed out", self.uri(&key)))),
            Ok(Ok(_)) => exn::bail!(ErrorKind::AlreadyExists(self.uri(&key))),
            Ok(Err(err)) if matches!(err.as_service_error(), Some(HeadObjectError::NotFound(_))) => {},
            Ok(Err(err)) => {
                exn::bail!(ErrorKind::Transport(format!("{}: {}", self.uri(&key), DisplayErrorContext(&err))))
            },
        }
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .body(ByteStream::from(content.to_vec()))
            .send()
            .await
            .map_err(|e| ErrorKind::Transport(format!("{}: {}", self.uri(&key), DisplayErrorContext(&e))))?;
        tracing::debug!(uri = %self.uri(&key), "Stored binary");
        Ok(())
    }
}
