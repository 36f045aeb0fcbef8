pub mod backend;
mod cache;
pub mod config;
pub mod error;
mod models;
mod template;

pub use crate::backend::StorageBackend;
pub use crate::cache::{CACHE_LAYOUT, LocalCache};
pub use crate::models::{Arch, Binary, Platform};
pub use crate::template::{CommonConfig, TemplateMappings, resolve as resolve_template};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
