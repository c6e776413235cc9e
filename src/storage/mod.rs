//! Persistence backends
//!
//! A [`Storage`] prepares the destination tree, fetches a URL into it and embeds
//! metadata into the result. [`LocalStorage`] (registry key `"fs"`) writes to the
//! local filesystem.

mod local;
pub(crate) mod naming;

pub use local::{LOCAL_STORAGE_KEY, LocalStorage, LocalStorageProvider};
pub use naming::{destination_file_name, failure_record_name, sanitize_file_name, url_basename};

use crate::error::Result;
use crate::types::MediaMetadata;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Persistence backend consumed by the persist workers
#[async_trait]
pub trait Storage: Send + Sync {
    /// Resolve and create the root directory of a run
    async fn prepare(&self, root: &Path) -> Result<PathBuf>;

    /// Create (if absent) the directory for one album or conversation
    async fn create_album_dir(&self, root: &Path, album: &str) -> Result<PathBuf>;

    /// Fetch `url` and persist it in `dir`; returns the persisted path
    async fn download_to(&self, url: &str, dir: &Path, file_name: &str) -> Result<PathBuf>;

    /// Embed metadata into a persisted file
    async fn write_metadata(&self, path: &Path, metadata: Option<&MediaMetadata>) -> Result<()>;
}
