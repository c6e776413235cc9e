//! # media-dumper
//!
//! Concurrent fetch-and-persist pipeline for media referenced by social-network
//! albums and private conversations.
//!
//! ## Overview
//!
//! - **Provider registry** - sources and storages are plugged in by key
//! - **Persist pipeline** - a fixed worker pool drains one bounded request queue
//! - **Deduplication** - a URL is fetched at most once, even when enumerations overlap
//! - **Retries** - transient failures follow a fixed backoff schedule, 404s fail fast
//! - **Metadata** - description, capture time and GPS are embedded after download
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dumper::source::MemorySource;
//! use media_dumper::storage::LocalStorageProvider;
//! use media_dumper::{Config, Pipeline, ProviderRegistry, Social};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!
//!     let mut registry = ProviderRegistry::new();
//!     registry.add_storage(LocalStorageProvider::new(config.clone()));
//!     registry.register_source("mock", |_token| Ok(Arc::new(MemorySource::new())));
//!
//!     let pipeline = Pipeline::start(&config, registry.resolve_storage(None)?)?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let social = Social::from_registry(&registry, "mock", "token", pipeline.handle())?;
//!     let report = social.download_all_albums(Path::new("~/Pictures/dump")).await?.wait().await;
//!     println!("queued {} items", report.items_queued);
//!
//!     pipeline.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Download deduplication
pub mod dedup;
/// Error types
pub mod error;
/// Network fetching
pub mod fetch;
/// Metadata embedding
pub mod metadata;
/// Persist worker pool
pub mod pipeline;
/// Provider registry
pub mod registry;
/// Retry logic with a fixed backoff schedule
pub mod retry;
/// Enumeration dispatcher
pub mod social;
/// Remote content sources
pub mod source;
/// Persistence backends
pub mod storage;
/// Core types and events
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, MetadataError, ProviderKind, Result, TransferError};
pub use pipeline::{Pipeline, PipelineHandle};
pub use registry::ProviderRegistry;
pub use social::{Dispatch, DispatchReport, Social};
pub use types::{
    AlbumDescriptor, ConversationDescriptor, DownloadRequest, Event, GpsCoordinates, ItemOutcome,
    MediaItem, MediaMetadata,
};

/// Run `pipeline` until the process is asked to stop, then shut it down
///
/// Stops on SIGTERM or SIGINT on Unix and on Ctrl+C elsewhere. A signal whose
/// handler cannot be registered is ignored rather than treated as received, so
/// the pipeline is never stopped by a registration failure.
///
/// # Example
///
/// ```no_run
/// use media_dumper::storage::LocalStorage;
/// use media_dumper::{Config, Pipeline, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let pipeline = Pipeline::start(&config, Arc::new(LocalStorage::from_config(&config)?))?;
///
///     run_with_shutdown(pipeline).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(pipeline: Pipeline) -> Result<()> {
    let signal = first_signal(terminate_signal(), interrupt_signal()).await;
    tracing::info!(
        signal,
        pending = pipeline.handle().pending(),
        "Stop requested, shutting down persist pipeline"
    );
    pipeline.shutdown().await
}

/// Which of the two stop requests resolves first
async fn first_signal(
    terminate: impl std::future::Future<Output = ()>,
    interrupt: impl std::future::Future<Output = ()>,
) -> &'static str {
    tokio::select! {
        () = terminate => "SIGTERM",
        () = interrupt => "SIGINT",
    }
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, relying on Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}

async fn interrupt_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
}
