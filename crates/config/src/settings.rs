use crate::error::{ErrorKind, Result};
use crate::remote::RemoteCacheConfig;
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use toolpin_storage::config::{Source, SourceConfig};

const QUALIFIER: &str = "";
const ORGANIZATION: &str = "";
const APPLICATION: &str = "toolpin";
/// Environment variables with this prefix override file settings; nested keys
/// are separated by `__` (`TOOLPIN_REMOTE_CACHE__S3_BUCKET`).
pub const ENV_PREFIX: &str = "TOOLPIN_";

/// Per-tool settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Where the tool's binaries are published.
    pub source: Option<SourceConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Root of the local cache. Defaults to the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    pub remote_cache: Option<RemoteCacheConfig>,
    pub tools: BTreeMap<String, ToolConfig>,
}

// Only the keys that have defaults; everything else starts out absent.
#[derive(Serialize)]
struct Defaults {
    cache_dir: Option<PathBuf>,
}

impl Settings {
    /// Layer defaults, the settings file (if any) and the environment.
    ///
    /// The file format follows the extension: `.yaml`/`.yml` are YAML,
    /// anything else TOML. A missing file contributes nothing.
    pub fn figment(file: Option<&Path>) -> Figment {
        let defaults = Defaults {
            cache_dir: project_dirs().map(|dirs| dirs.cache_dir().to_path_buf()),
        };
        let mut figment = Figment::from(Serialized::defaults(defaults));
        if let Some(file) = file.map(Path::to_path_buf).or_else(default_file) {
            tracing::debug!(file = %file.display(), "Reading settings file");
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                _ => figment.merge(Toml::file(file)),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate settings.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_figment(&Self::figment(file))
    }

    /// Extract and validate settings from any figment.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let settings: Self = match figment.extract() {
            Ok(settings) => settings,
            Err(err) => exn::bail!(ErrorKind::Load(err.to_string())),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check the remote cache block and every tool source.
    pub fn validate(&self) -> Result<()> {
        self.remote_source()?;
        for tool in self.tools.keys() {
            self.origin(tool)?;
        }
        Ok(())
    }

    /// The local cache root.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.cache_dir().to_path_buf()))
            .ok_or_raise(|| ErrorKind::NoCacheDir)
    }

    /// The validated remote cache source, if one is configured.
    pub fn remote_source(&self) -> Result<Option<Source>> {
        let Some(remote) = &self.remote_cache else {
            return Ok(None);
        };
        let source = remote
            .to_source()?
            .validate()
            .or_raise(|| ErrorKind::RemoteCache("layout did not yield a valid source".into()))?;
        Ok(Some(source))
    }

    /// The validated origin source of `tool`. Unknown tools have none.
    pub fn origin(&self, tool: &str) -> Result<Option<Source>> {
        let Some(config) = self.tools.get(tool).and_then(|t| t.source.as_ref()) else {
            return Ok(None);
        };
        config.validate().map(Some).map_err(|err| ErrorKind::invalid_source(tool, err))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

fn default_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}
