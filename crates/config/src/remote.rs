use crate::error::{ErrorKind, Result};
use serde::Deserialize;
use toolpin_storage::CACHE_LAYOUT;
use toolpin_storage::config::SourceConfig;

/// Shared cache consulted before a tool's origin source.
///
/// At most one host may be named. With none, `path_prefix` is taken to be a
/// directory (typically a network mount).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteCacheConfig {
    pub path_prefix: Option<String>,
    pub gcs_bucket: Option<String>,
    pub https_host: Option<String>,
    pub s3_bucket: Option<String>,
}

impl RemoteCacheConfig {
    /// The source configuration addressing the cache layout on the remote.
    pub fn to_source(&self) -> Result<SourceConfig> {
        let hosts: Vec<&str> = [
            ("gcs_bucket", &self.gcs_bucket),
            ("https_host", &self.https_host),
            ("s3_bucket", &self.s3_bucket),
        ]
        .into_iter()
        .filter(|(_, value)| non_empty(value).is_some())
        .map(|(name, _)| name)
        .collect();
        if hosts.len() > 1 {
            exn::bail!(ErrorKind::RemoteCache(format!("multiple remote hosts set: {}", hosts.join(", "))));
        }

        let prefix = non_empty(&self.path_prefix);
        let layout = || join([prefix, Some(CACHE_LAYOUT.join("/").as_str())]);
        // Object keys are never rooted.
        let key_layout = || layout().trim_start_matches('/').to_string();
        let mut source = SourceConfig::default();
        if let Some(bucket) = non_empty(&self.gcs_bucket) {
            source.gcs_bucket = Some(bucket.to_string());
            source.gcs_path_template = Some(key_layout());
        } else if let Some(host) = non_empty(&self.https_host) {
            let host = if host.contains("://") { host.to_string() } else { format!("https://{host}") };
            source.https_url_template = Some(join([Some(host.as_str()), Some(layout().as_str())]));
        } else if let Some(bucket) = non_empty(&self.s3_bucket) {
            source.s3_bucket = Some(bucket.to_string());
            source.s3_path_template = Some(key_layout());
        } else if prefix.is_some() {
            source.file_path_template = Some(layout());
        } else {
            exn::bail!(ErrorKind::RemoteCache("neither a host nor a path prefix is set".into()));
        }
        Ok(source)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Join with `/`, collapsing separators at the seams. A leading `/` on the
/// first part survives, so a root prefix stays absolute.
fn join<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    let mut joined = String::new();
    for (i, part) in parts.into_iter().flatten().enumerate() {
        if i == 0 {
            joined.push_str(part.trim_end_matches('/'));
        } else {
            joined.push('/');
            joined.push_str(part.trim_matches('/'));
        }
    }
    joined
}
