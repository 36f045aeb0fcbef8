//! Resolve tool binaries into the local cache.
//!
//! ```no_run
//! use toolpin_config::Settings;
//! use toolpin_storage::Binary;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(None)?;
//! let fetcher = toolpin_fetch::connect(&settings, "shellcheck").await?;
//! let path = fetcher.resolve(&Binary::current("shellcheck", "v0.10.0")).await?;
//! println!("{}", path.display());
//! # Ok(())
//! # }
//! ```

pub mod error;
mod fetcher;

pub use crate::fetcher::Fetcher;

use crate::error::{ErrorKind, Result};
use toolpin_config::Settings;
use toolpin_storage::config::Source;
use toolpin_storage::{BackendHandle, LocalCache, backend};

/// Build the fetcher for `tool` from settings: the local cache, the remote
/// cache (if configured) and the tool's origin source (if it has one).
pub async fn connect(settings: &Settings, tool: &str) -> Result<Fetcher> {
    let cache = LocalCache::new(settings.cache_dir().map_err(ErrorKind::config)?);
    let remote = connect_source(settings.remote_source().map_err(ErrorKind::config)?).await?;
    let origin = connect_source(settings.origin(tool).map_err(ErrorKind::config)?).await?;
    if origin.is_none() {
        tracing::debug!(tool, "No origin source configured");
    }
    Ok(Fetcher::new(cache, remote, origin))
}

async fn connect_source(source: Option<Source>) -> Result<Option<BackendHandle>> {
    match source {
        Some(source) => backend::connect(&source).await.map(Some).map_err(ErrorKind::backend),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::BTreeMap;
    use toolpin_config::{RemoteCacheConfig, ToolConfig};
    use toolpin_storage::config::SourceConfig;
    use toolpin_storage::{Arch, Binary, Platform};

    fn settings(cache: &std::path::Path, remote: Option<&std::path::Path>, origin: Option<&std::path::Path>) -> Settings {
        let mut tools = BTreeMap::new();
        if let Some(origin) = origin {
            let template = origin.join("{tool}-{version}-{platform}-{arch}{exe}");
            tools.insert(
                "tool".to_string(),
                ToolConfig {
                    source: Some(SourceConfig {
                        file_path_template: Some(template.to_string_lossy().into_owned()),
                        ..Default::default()
                    }),
                },
            );
        }
        Settings {
            cache_dir: Some(cache.to_path_buf()),
            remote_cache: remote.map(|prefix| RemoteCacheConfig {
                path_prefix: Some(prefix.to_string_lossy().into_owned()),
                ..Default::default()
            }),
            tools,
        }
    }

    #[tokio::test]
    async fn resolves_from_configured_origin() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, origin) = (dir.path().join("cache"), dir.path().join("origin"));
        std::fs::create_dir_all(&origin).unwrap();
        std::fs::write(origin.join("tool-1.0-windows-arm64.exe"), b"MZ").unwrap();

        let fetcher = connect(&settings(&cache, None, Some(&origin)), "tool").await.unwrap();
        let binary = Binary::new("tool", "1.0", Platform::Windows, Arch::Arm64);
        let path = fetcher.resolve(&binary).await.unwrap();
        assert_eq!(path, cache.join("v1/tool/1.0/windows/arm64/tool.exe"));
        assert_eq!(std::fs::read(path).unwrap(), b"MZ");
    }

    #[tokio::test]
    async fn remote_cache_uses_the_cache_layout() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, shared) = (dir.path().join("cache"), dir.path().join("shared"));
        let entry = shared.join("v1/tool/2.0/linux/x86_64/tool");
        std::fs::create_dir_all(entry.parent().unwrap()).unwrap();
        std::fs::write(&entry, b"ELF").unwrap();

        let fetcher = connect(&settings(&cache, Some(&shared), None), "tool").await.unwrap();
        let binary = Binary::new("tool", "2.0", Platform::Linux, Arch::X86_64);
        let path = fetcher.resolve(&binary).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"ELF");
    }

    #[rstest]
    #[case("tool")]
    #[case("unknown")]
    #[tokio::test]
    async fn tool_without_any_source_has_no_backends(#[case] tool: &str) {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = connect(&settings(dir.path(), None, None), tool).await.unwrap();
        let err = fetcher.resolve(&Binary::new(tool, "1.0", Platform::Linux, Arch::X86)).await.unwrap_err();
        assert!(matches!(&*err, error::ErrorKind::NoBackends(_)));
    }

    #[tokio::test]
    async fn invalid_remote_cache_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path(), None, None);
        settings.remote_cache = Some(RemoteCacheConfig::default());
        let Err(err) = connect(&settings, "tool").await else {
            panic!("expected an error");
        };
        assert!(matches!(&*err, error::ErrorKind::Config(_)));
    }
}
