//! Plain HTTPS storage backend (read-only).

use crate::backend::{CONNECT_TIMEOUT, DOWNLOAD_TIMEOUT, USER_AGENT};
use crate::config::HttpsConfig;
use crate::error::{ErrorKind, Result};
use crate::{Binary, StorageBackend};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::{Client, Url};
use tracing::instrument;

/// Downloads binaries from a templated URL.
///
/// There is no authenticated write path for arbitrary HTTP endpoints, so
/// [`store`](StorageBackend::store) always fails with
/// [`Unsupported`](ErrorKind::Unsupported).
#[derive(Debug, Clone)]
pub struct HttpsBackend {
    config: HttpsConfig,
    client: Client,
}

impl HttpsBackend {
    pub fn new(config: HttpsConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .or_raise(|| ErrorKind::InvalidConfig("unable to build HTTP client".into()))?;
        Ok(Self { config, client })
    }

    pub fn url(&self, binary: &Binary) -> String {
        self.config.common.resolve(binary, &self.config.url_template)
    }
}

/// The part of a URL that carries the file name; query strings and fragments
/// would otherwise hide the archive suffix.
pub(crate) fn source_name(url: &str) -> String {
    Url::parse(url).map(|u| u.path().to_string()).unwrap_or_else(|_| url.to_string())
}

#[async_trait]
impl StorageBackend for HttpsBackend {
    fn describe(&self) -> &str {
        &self.config.url_template
    }

    #[instrument(skip(self), fields(backend = self.describe(), binary = %binary))]
    async fn fetch(&self, binary: &Binary) -> Result<Vec<u8>> {
        let url = self.url(binary);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .or_raise(|| ErrorKind::Transport(format!("GET {url}")))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        let body = response
            .bytes()
            .await
            .or_raise(|| ErrorKind::Transport(format!("reading body of {url}")))?;
        tracing::debug!(url = %url, size = body.len(), "Downloaded binary");
        self.config.common.extract(body.to_vec(), &source_name(&url), binary)
    }

    async fn store(&self, _binary: &Binary, _content: &[u8]) -> Result<()> {
        exn::bail!(ErrorKind::Unsupported("HTTPS backends are read-only".into()))
    }
}
