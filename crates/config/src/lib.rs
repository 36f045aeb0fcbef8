//! Settings for toolpin.
//!
//! A [`Settings`] document names the local cache root, an optional shared
//! remote cache and the origin source of each tool:
//!
//! ```toml
//! cache_dir = "/var/cache/toolpin"
//!
//! [remote_cache]
//! gcs_bucket = "acme-tools"
//! path_prefix = "toolpin"
//!
//! [tools.shellcheck.source]
//! github_slug = "koalaman/shellcheck"
//! github_release_asset_template = "shellcheck-{version}.{platform}.{arch}.tar.xz"
//! archive_path_template = "shellcheck-{version}/shellcheck"
//! ```
//!
//! Sources are validated as the document is loaded, so a misconfigured tool
//! is reported before anything is fetched.

pub mod error;
mod remote;
mod settings;

pub use crate::remote::RemoteCacheConfig;
pub use crate::settings::{ENV_PREFIX, Settings, ToolConfig};
