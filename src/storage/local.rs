//! Local filesystem storage

use super::Storage;
use super::naming::{destination_file_name, sanitize_file_name};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{HttpTransport, RetryingFetcher};
use crate::metadata::{MetadataChain, MetadataWriter};
use crate::registry::StorageProvider;
use crate::types::MediaMetadata;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Registry key of [`LocalStorage`]
pub const LOCAL_STORAGE_KEY: &str = "fs";

/// Storage that writes into a directory tree on the local filesystem
///
/// Files land at `<root>/<album>/<url-basename>_<file-name>`.
#[derive(Clone)]
pub struct LocalStorage {
    fetcher: RetryingFetcher,
    metadata: Option<Arc<dyn MetadataWriter>>,
}

impl LocalStorage {
    /// Create a storage from a fetcher and an optional metadata writer (None disables metadata)
    pub fn new(fetcher: RetryingFetcher, metadata: Option<Arc<dyn MetadataWriter>>) -> Self {
        Self { fetcher, metadata }
    }

    /// Shared HTTP client, configured backoff schedule and the EXIF/exiftool chain
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.http)?;
        let fetcher = RetryingFetcher::new(Arc::new(transport), config.retry.backoff());
        let metadata: Option<Arc<dyn MetadataWriter>> = if config.metadata.enabled {
            Some(Arc::new(MetadataChain::from_config(&config.metadata)))
        } else {
            None
        };
        Ok(Self::new(fetcher, metadata))
    }

    /// Expand a leading `~` to the user's home directory
    fn resolve_root(root: &Path) -> Result<PathBuf> {
        if root.as_os_str().is_empty() {
            return Err(Error::storage("destination directory is empty", None));
        }
        match root.strip_prefix("~") {
            Ok(rest) => {
                let home = std::env::var_os("HOME")
                    .or_else(|| std::env::var_os("USERPROFILE"))
                    .ok_or_else(|| Error::storage("cannot resolve home directory", None))?;
                Ok(PathBuf::from(home).join(rest))
            }
            Err(_) => Ok(root.to_path_buf()),
        }
    }
}

async fn create_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o750);
    builder.create(path).await
}

#[async_trait]
impl Storage for LocalStorage {
    async fn prepare(&self, root: &Path) -> Result<PathBuf> {
        let root = Self::resolve_root(root)?;
        create_dir(&root).await.map_err(|e| {
            Error::storage(
                format!("dir can't be created: {}", root.display()),
                Some(e),
            )
        })?;
        Ok(root)
    }

    async fn create_album_dir(&self, root: &Path, album: &str) -> Result<PathBuf> {
        let album_dir = root.join(sanitize_file_name(album));
        create_dir(&album_dir).await.map_err(|e| {
            Error::storage(
                format!("album dir can't be created: {}", album_dir.display()),
                Some(e),
            )
        })?;
        Ok(album_dir)
    }

    async fn download_to(&self, url: &str, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let mut body = self.fetcher.fetch(url).await?;

        let path = dir.join(destination_file_name(url, file_name));
        let mut out = tokio::fs::File::create(&path).await.map_err(|e| {
            Error::storage(format!("cannot create {}", path.display()), Some(e))
        })?;

        let mut written: u64 = 0;
        let copied = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                out.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            out.flush().await?;
            Ok::<(), Error>(())
        }
        .await;

        if let Err(e) = copied {
            drop(out);
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %remove_err,
                    "Failed to remove partial download"
                );
            }
            return Err(e);
        }

        tracing::debug!(url = %url, path = %path.display(), bytes = written, "File persisted");
        Ok(path)
    }

    async fn write_metadata(&self, path: &Path, metadata: Option<&MediaMetadata>) -> Result<()> {
        match &self.metadata {
            Some(writer) => match metadata {
                Some(metadata) => writer.write(path, metadata).await,
                None => Err(crate::error::MetadataError::Empty {
                    path: path.to_path_buf(),
                }
                .into()),
            },
            None => Ok(()),
        }
    }
}

/// Registers [`LocalStorage`] under key `"fs"`
pub struct LocalStorageProvider {
    config: Config,
}

impl LocalStorageProvider {
    /// Provider building storages from `config`
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl StorageProvider for LocalStorageProvider {
    fn key(&self) -> &str {
        LOCAL_STORAGE_KEY
    }

    fn create(&self) -> Result<Arc<dyn Storage>> {
        Ok(Arc::new(LocalStorage::from_config(&self.config)?))
    }
}
