//! GitHub releases storage backend (read-only).
//!
//! Releases are listed through the REST API until one whose tag matches the
//! requested version is found, then the asset named by the configured
//! template is downloaded through the asset endpoint. GitHub Enterprise is
//! supported by pointing `github_base_url` at the instance's API root.
//!
//! # Credentials
//!
//! `GITHUB_TOKEN` (or `GH_TOKEN`) is sent as a bearer token when set, which
//! raises rate limits and grants access to private repositories.

use crate::backend::{CONNECT_TIMEOUT, DOWNLOAD_TIMEOUT, USER_AGENT};
use crate::config::GitHubConfig;
use crate::error::{ErrorKind, Result};
use crate::{Binary, StorageBackend};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::instrument;

const DEFAULT_API_URL: &str = "https://api.github.com";
const RELEASES_PER_PAGE: usize = 50;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    id: u64,
    name: String,
}

#[derive(Debug, Clone)]
pub struct GitHubBackend {
    config: GitHubConfig,
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
    token: Option<String>,
    description: String,
}

impl GitHubBackend {
    /// # Errors
    ///
    /// Returns [`InvalidConfig`](ErrorKind::InvalidConfig) if the slug is not
    /// of the form `owner/repo`.
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let (owner, repo) = config
            .slug
            .split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty() && !repo.contains('/'))
            .ok_or_raise(|| ErrorKind::InvalidConfig(format!("invalid GitHub slug `{}`", config.slug)))?;
        let (owner, repo) = (owner.to_string(), repo.to_string());
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .or_raise(|| ErrorKind::InvalidConfig("unable to build HTTP client".into()))?;
        let api_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();
        let token = ["GITHUB_TOKEN", "GH_TOKEN"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|token| !token.is_empty());
        let description = format!(
            "{}/{}:{}",
            config.base_url.as_deref().unwrap_or("github.com"),
            config.slug,
            config.asset_template
        );
        Ok(Self {
            config,
            client,
            api_url,
            owner,
            repo,
            token,
            description,
        })
    }

    fn request(&self, url: &str, accept: &str) -> RequestBuilder {
        let request = self.client.get(url).header(ACCEPT, accept);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .or_raise(|| ErrorKind::Transport(format!("GET {url}")))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Walk release pages until a tag matches `version`, ignoring a leading
    /// `v` on either side.
    async fn find_release(&self, version: &str) -> Result<Release> {
        let wanted = version.strip_prefix('v').unwrap_or(version);
        for page in 1.. {
            let url = format!(
                "{}/repos/{}/{}/releases?per_page={RELEASES_PER_PAGE}&page={page}",
                self.api_url, self.owner, self.repo
            );
            let response = self.send(self.request(&url, "application/vnd.github+json"), &url).await?;
            let releases: Vec<Release> = response
                .json()
                .await
                .or_raise(|| ErrorKind::Transport(format!("decoding releases from {url}")))?;
            let exhausted = releases.len() < RELEASES_PER_PAGE;
            if let Some(release) = releases
                .into_iter()
                .find(|r| r.tag_name.strip_prefix('v').unwrap_or(&r.tag_name) == wanted)
            {
                return Ok(release);
            }
            if exhausted {
                break;
            }
        }
        exn::bail!(ErrorKind::NotFound(format!("release {version} of {}/{}", self.owner, self.repo)))
    }

    async fn download_asset(&self, asset: &Asset) -> Result<Vec<u8>> {
        let url = format!(
            "{}/repos/{}/{}/releases/assets/{}",
            self.api_url, self.owner, self.repo, asset.id
        );
        let response = self.send(self.request(&url, "application/octet-stream"), &url).await?;
        let body = response
            .bytes()
            .await
            .or_raise(|| ErrorKind::Transport(format!("reading body of {url}")))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl StorageBackend for GitHubBackend {
    fn describe(&self) -> &str {
        &self.description
    }

    #[instrument(skip(self), fields(backend = self.describe(), binary = %binary))]
    async fn fetch(&self, binary: &Binary) -> Result<Vec<u8>> {
        let release = self.find_release(&binary.version).await?;
        let asset_name = self.config.common.resolve(binary, &self.config.asset_template);
        let asset = release
            .assets
            .iter()
            .find(|asset| asset.name == asset_name)
            .ok_or_raise(|| ErrorKind::NotFound(format!("asset {asset_name} in release {}", release.tag_name)))?;
        tracing::debug!(tag = %release.tag_name, asset = %asset.name, id = asset.id, "Downloading release asset");
        let raw = self.download_asset(asset).await?;
        self.config.common.extract(raw, &asset.name, binary)
    }

    async fn store(&self, _binary: &Binary, _content: &[u8]) -> Result<()> {
        exn::bail!(ErrorKind::Unsupported("GitHub releases are read-only".into()))
    }
}
