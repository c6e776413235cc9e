//! Provider registry
//!
//! Maps short keys (`"fs"`, `"vk"`, ...) to constructors for [`Source`] and
//! [`Storage`] implementations. Registration happens once at startup; afterwards the
//! registry is only read, so it is usually wrapped in an `Arc` and shared.
//!
//! ```
//! use media_dumper::registry::ProviderRegistry;
//! use media_dumper::source::MemorySource;
//! use std::sync::Arc;
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register_source("mock", |_credentials| Ok(Arc::new(MemorySource::new())));
//! assert!(registry.resolve_source("mock", "token").is_ok());
//! assert!(registry.resolve_source("nope", "token").is_err());
//! ```

pub use crate::error::ProviderKind;

use crate::error::{Error, Result};
use crate::source::Source;
use crate::storage::Storage;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds a source from the caller's credentials (typically an access token)
pub type SourceConstructor = Arc<dyn Fn(&str) -> Result<Arc<dyn Source>> + Send + Sync>;

/// Builds a storage backend
pub type StorageConstructor = Arc<dyn Fn() -> Result<Arc<dyn Storage>> + Send + Sync>;

/// A source implementation that knows its own registry key
pub trait SourceProvider: Send + Sync {
    /// Registry key
    fn key(&self) -> &str;

    /// Build a source authenticated with `credentials`
    fn create(&self, credentials: &str) -> Result<Arc<dyn Source>>;
}

/// A storage implementation that knows its own registry key
pub trait StorageProvider: Send + Sync {
    /// Registry key
    fn key(&self) -> &str;

    /// Build a storage backend
    fn create(&self) -> Result<Arc<dyn Storage>>;
}

/// Startup-time directory of pluggable sources and storages
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    sources: BTreeMap<String, SourceConstructor>,
    storages: BTreeMap<String, StorageConstructor>,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source constructor; an existing key is overwritten
    pub fn register_source<F>(&mut self, key: impl Into<String>, constructor: F)
    where
        F: Fn(&str) -> Result<Arc<dyn Source>> + Send + Sync + 'static,
    {
        let key = key.into();
        if self.sources.insert(key.clone(), Arc::new(constructor)).is_some() {
            tracing::debug!(key = %key, "Replaced source provider");
        } else {
            tracing::debug!(key = %key, "Registered source provider");
        }
    }

    /// Register a storage constructor; an existing key is overwritten
    pub fn register_storage<F>(&mut self, key: impl Into<String>, constructor: F)
    where
        F: Fn() -> Result<Arc<dyn Storage>> + Send + Sync + 'static,
    {
        let key = key.into();
        if self.storages.insert(key.clone(), Arc::new(constructor)).is_some() {
            tracing::debug!(key = %key, "Replaced storage provider");
        } else {
            tracing::debug!(key = %key, "Registered storage provider");
        }
    }

    /// Register a [`SourceProvider`] under its own key
    pub fn add_source<P: SourceProvider + 'static>(&mut self, provider: P) {
        let key = provider.key().to_string();
        self.register_source(key, move |credentials| provider.create(credentials));
    }

    /// Register a [`StorageProvider`] under its own key
    pub fn add_storage<P: StorageProvider + 'static>(&mut self, provider: P) {
        let key = provider.key().to_string();
        self.register_storage(key, move || provider.create());
    }

    /// Build the source registered under `key`
    pub fn resolve_source(&self, key: &str, credentials: &str) -> Result<Arc<dyn Source>> {
        let constructor = self
            .sources
            .get(key)
            .ok_or_else(|| Error::ProviderNotFound {
                kind: ProviderKind::Source,
                key: key.to_string(),
            })?;
        constructor(credentials)
    }

    /// Build the storage registered under `key`, or any registered storage when `key`
    /// is `None` (the first in key order)
    pub fn resolve_storage(&self, key: Option<&str>) -> Result<Arc<dyn Storage>> {
        let constructor = match key {
            Some(key) => self.storages.get(key),
            None => self.storages.values().next(),
        }
        .ok_or_else(|| Error::ProviderNotFound {
            kind: ProviderKind::Storage,
            key: key.unwrap_or_default().to_string(),
        })?;
        constructor()
    }

    /// Registered source keys, sorted
    pub fn source_keys(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    /// Registered storage keys, sorted
    pub fn storage_keys(&self) -> Vec<&str> {
        self.storages.keys().map(String::as_str).collect()
    }

    /// True when a provider of `kind` is registered under `key`
    pub fn contains(&self, kind: ProviderKind, key: &str) -> bool {
        match kind {
            ProviderKind::Source => self.sources.contains_key(key),
            ProviderKind::Storage => self.storages.contains_key(key),
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("sources", &self.source_keys())
            .field("storages", &self.storage_keys())
            .finish()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::source::MemorySource;
    use crate::storage::LocalStorageProvider;
    use crate::types::AlbumDescriptor;
    use std::sync::Mutex;

    fn album(id: &str) -> AlbumDescriptor {
        AlbumDescriptor {
            id: id.into(),
            title: format!("album {id}"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_registered_source() {
        let mut registry = ProviderRegistry::new();
        registry.register_source("mock", |_| {
            Ok(Arc::new(MemorySource::new().with_album(album("1"), vec![])))
        });

        let source = registry.resolve_source("mock", "").unwrap();
        assert_eq!(source.list_albums().await.unwrap(), vec![album("1")]);
    }

    #[test]
    fn test_unknown_key_is_provider_not_found() {
        let registry = ProviderRegistry::new();

        match registry.resolve_source("vk", "token") {
            Err(Error::ProviderNotFound { kind, key }) => {
                assert_eq!(kind, ProviderKind::Source);
                assert_eq!(key, "vk");
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("expected ProviderNotFound"),
        }
        assert!(matches!(
            registry.resolve_storage(None),
            Err(Error::ProviderNotFound {
                kind: ProviderKind::Storage,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_key_overwrites() {
        let mut registry = ProviderRegistry::new();
        registry.register_source("mock", |_| {
            Ok(Arc::new(MemorySource::new().with_album(album("old"), vec![])))
        });
        registry.register_source("mock", |_| {
            Ok(Arc::new(MemorySource::new().with_album(album("new"), vec![])))
        });

        assert_eq!(registry.source_keys(), vec!["mock"]);
        let source = registry.resolve_source("mock", "").unwrap();
        assert_eq!(source.list_albums().await.unwrap()[0].id, "new");
    }

    #[test]
    fn test_credentials_reach_constructor() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ProviderRegistry::new();
        let recorder = Arc::clone(&seen);
        registry.register_source("mock", move |credentials| {
            recorder.lock().unwrap().push(credentials.to_string());
            Ok(Arc::new(MemorySource::new()))
        });

        registry.resolve_source("mock", "secret-token").unwrap();
        registry.resolve_source("mock", "other-token").unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["secret-token", "other-token"]);
    }

    #[test]
    fn test_storage_without_key_returns_a_registered_storage() {
        let mut registry = ProviderRegistry::new();
        registry.add_storage(LocalStorageProvider::new(Config::default()));

        assert!(registry.contains(ProviderKind::Storage, "fs"));
        assert!(registry.resolve_storage(None).is_ok());
        assert!(registry.resolve_storage(Some("fs")).is_ok());
        assert!(registry.resolve_storage(Some("s3")).is_err());
    }

    #[test]
    fn test_source_keys_are_sorted() {
        let mut registry = ProviderRegistry::new();
        for key in ["vk", "mock", "flickr"] {
            registry.register_source(key, |_| Ok(Arc::new(MemorySource::new())));
        }
        assert_eq!(registry.source_keys(), vec!["flickr", "mock", "vk"]);
        assert!(!registry.contains(ProviderKind::Source, "fs"));
    }
}
