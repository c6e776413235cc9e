//! Enumeration dispatcher
//!
//! [`Social`] walks the albums and conversations a [`Source`] exposes and streams
//! their items into a [`PipelineHandle`]. Every download call returns a [`Dispatch`]
//! handle; awaiting [`Dispatch::wait`] yields a [`DispatchReport`] listing the
//! albums or conversations that could not be enumerated.
//!
//! Album enumerations fan out freely, since transfer concurrency is capped by the
//! worker pool anyway. Conversation enumerations go through a semaphore
//! sized from the pipeline's `pipeline.conversation_concurrency` setting (default 5)
//! so the remote API is not hit by bursts of parallel pagination.

use crate::error::{Error, Result};
use crate::pipeline::PipelineHandle;
use crate::registry::ProviderRegistry;
use crate::source::{ItemFetcher, Source};
use crate::types::{AlbumDescriptor, ConversationDescriptor, DownloadRequest, Event};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// What a dispatch task was enumerating
#[derive(Clone, Debug, PartialEq)]
pub enum Descriptor {
    /// An album
    Album(AlbumDescriptor),
    /// A conversation
    Conversation(ConversationDescriptor),
}

impl Descriptor {
    /// Display title
    pub fn title(&self) -> &str {
        match self {
            Descriptor::Album(album) => &album.title,
            Descriptor::Conversation(conversation) => &conversation.title,
        }
    }
}

/// An album or conversation whose enumeration failed
#[derive(Debug)]
pub struct DispatchFailure {
    /// What was being enumerated
    pub descriptor: Descriptor,
    /// Why it stopped
    pub error: Error,
}

/// Outcome of a finished [`Dispatch`]
#[derive(Debug)]
pub struct DispatchReport {
    /// Resolved root directory of the run
    pub root: PathBuf,
    /// Number of albums or conversations dispatched
    pub descriptors: usize,
    /// Requests pushed into the pipeline
    pub items_queued: usize,
    /// Enumerations that failed (items queued before the failure still count)
    pub failures: Vec<DispatchFailure>,
    /// Tasks that panicked or were aborted
    pub aborted: usize,
}

impl DispatchReport {
    /// True when every enumeration completed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.aborted == 0
    }

    /// True when some enumeration was refused for authentication or permission reasons
    pub fn needs_reauth(&self) -> bool {
        self.failures.iter().any(|f| f.error.is_access_error())
    }
}

/// Handle to running enumeration tasks
///
/// The enumeration tasks keep running if the handle is dropped; await
/// [`wait`](Dispatch::wait) to observe their outcome.
pub struct Dispatch {
    root: PathBuf,
    descriptors: usize,
    tasks: Vec<JoinHandle<(Descriptor, Result<usize>)>>,
    pipeline: PipelineHandle,
}

impl Dispatch {
    /// Resolved root directory files are written under
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of albums or conversations being enumerated
    pub fn descriptors(&self) -> usize {
        self.descriptors
    }

    /// Wait for every enumeration to finish streaming into the pipeline
    ///
    /// This does not wait for the downloads themselves; use
    /// [`PipelineHandle::wait_idle`] for that.
    pub async fn wait(mut self) -> DispatchReport {
        let mut items_queued = 0;
        let mut failures = Vec::new();
        let mut aborted = 0;

        for task in std::mem::take(&mut self.tasks) {
            match task.await {
                Ok((_, Ok(count))) => items_queued += count,
                Ok((descriptor, Err(error))) => {
                    if error.is_access_error() {
                        tracing::warn!(
                            title = %descriptor.title(),
                            error = %error,
                            "Access denied, re-authentication required"
                        );
                    } else {
                        tracing::warn!(
                            title = %descriptor.title(),
                            error = %error,
                            "Enumeration failed"
                        );
                    }
                    failures.push(DispatchFailure { descriptor, error });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Dispatch task ended abnormally");
                    aborted += 1;
                }
            }
        }

        tracing::info!(
            root = %self.root.display(),
            descriptors = self.descriptors,
            items_queued,
            failures = failures.len(),
            "Dispatch finished"
        );
        self.pipeline.emit(Event::DispatchFinished {
            root: self.root.clone(),
            items: items_queued,
            failures: failures.len() + aborted,
        });

        DispatchReport {
            root: std::mem::take(&mut self.root),
            descriptors: self.descriptors,
            items_queued,
            failures,
            aborted,
        }
    }
}

/// Orchestrates downloads from one [`Source`] into a pipeline
#[derive(Clone)]
pub struct Social {
    source: Arc<dyn Source>,
    pipeline: PipelineHandle,
    conversation_concurrency: usize,
}

impl Social {
    /// Dispatcher over `source` feeding `pipeline`
    ///
    /// Conversation fan-out follows the pipeline's configured limit.
    pub fn new(source: Arc<dyn Source>, pipeline: PipelineHandle) -> Self {
        let conversation_concurrency = pipeline.conversation_concurrency().max(1);
        Self {
            source,
            pipeline,
            conversation_concurrency,
        }
    }

    /// Resolve the source registered under `key` and build a dispatcher over it
    pub fn from_registry(
        registry: &ProviderRegistry,
        key: &str,
        credentials: &str,
        pipeline: PipelineHandle,
    ) -> Result<Self> {
        let source = registry.resolve_source(key, credentials)?;
        Ok(Self::new(source, pipeline))
    }

    /// Override the bound on concurrently enumerated conversations (minimum 1)
    #[must_use]
    pub fn with_conversation_concurrency(mut self, limit: usize) -> Self {
        self.conversation_concurrency = limit.max(1);
        self
    }

    /// All albums visible to the source
    pub async fn albums(&self) -> Result<Vec<AlbumDescriptor>> {
        self.source.list_albums().await
    }

    /// All conversations visible to the source
    pub async fn conversations(&self) -> Result<Vec<ConversationDescriptor>> {
        self.source.list_conversations().await
    }

    /// Download one album into `dir`
    pub async fn download_album(&self, album_id: &str, dir: &Path) -> Result<Dispatch> {
        let root = self.prepare(dir).await?;
        let album = AlbumDescriptor {
            id: album_id.to_string(),
            title: album_id.to_string(),
            ..Default::default()
        };
        Ok(self.dispatch_albums(root, vec![album]))
    }

    /// Download every album into `dir`
    pub async fn download_all_albums(&self, dir: &Path) -> Result<Dispatch> {
        let root = self.prepare(dir).await?;
        let albums = self.source.list_albums().await?;
        tracing::info!(albums = albums.len(), root = %root.display(), "Dispatching albums");
        Ok(self.dispatch_albums(root, albums))
    }

    /// Download one conversation's attachments into `dir`
    pub async fn download_conversation(
        &self,
        peer_id: &str,
        title: &str,
        dir: &Path,
    ) -> Result<Dispatch> {
        let root = self.prepare(dir).await?;
        let conversation = ConversationDescriptor {
            id: peer_id.to_string(),
            title: title.to_string(),
            ..Default::default()
        };
        Ok(self.dispatch_conversations(root, vec![conversation]))
    }

    /// Download the attachments of every conversation into `dir`
    pub async fn download_all_conversations(&self, dir: &Path) -> Result<Dispatch> {
        let root = self.prepare(dir).await?;
        let conversations = self.source.list_conversations().await?;
        tracing::info!(
            conversations = conversations.len(),
            concurrency = self.conversation_concurrency,
            root = %root.display(),
            "Dispatching conversations"
        );
        Ok(self.dispatch_conversations(root, conversations))
    }

    async fn prepare(&self, dir: &Path) -> Result<PathBuf> {
        self.pipeline
            .storage()
            .prepare(dir)
            .await
            .inspect_err(|e| {
                tracing::error!(dir = %dir.display(), error = %e, "Root directory can't be prepared");
            })
    }

    fn dispatch_albums(&self, root: PathBuf, albums: Vec<AlbumDescriptor>) -> Dispatch {
        let descriptors = albums.len();
        let mut tasks = Vec::with_capacity(descriptors);

        for album in albums {
            let source = Arc::clone(&self.source);
            let pipeline = self.pipeline.clone();
            let root = root.clone();
            tasks.push(tokio::spawn(async move {
                let result = async {
                    let fetcher = source.album_items(&album.id).await?;
                    stream_items(fetcher, &pipeline, &root).await
                }
                .await;
                (Descriptor::Album(album), result)
            }));
        }

        Dispatch {
            root,
            descriptors,
            tasks,
            pipeline: self.pipeline.clone(),
        }
    }

    fn dispatch_conversations(
        &self,
        root: PathBuf,
        conversations: Vec<ConversationDescriptor>,
    ) -> Dispatch {
        let limiter = Arc::new(Semaphore::new(self.conversation_concurrency));
        let descriptors = conversations.len();
        let mut tasks = Vec::with_capacity(descriptors);

        for conversation in conversations {
            let source = Arc::clone(&self.source);
            let pipeline = self.pipeline.clone();
            let root = root.clone();
            let limiter = Arc::clone(&limiter);
            tasks.push(tokio::spawn(async move {
                let result = async {
                    // Held until this conversation is fully streamed
                    let _permit = limiter
                        .acquire_owned()
                        .await
                        .map_err(|_| Error::ShuttingDown)?;
                    let fetcher = source
                        .conversation_items(&conversation.id, &conversation.title)
                        .await?;
                    stream_items(fetcher, &pipeline, &root).await
                }
                .await;
                (Descriptor::Conversation(conversation), result)
            }));
        }

        Dispatch {
            root,
            descriptors,
            tasks,
            pipeline: self.pipeline.clone(),
        }
    }
}

/// Pull items from `fetcher` one at a time and push each into the pipeline
async fn stream_items(
    mut fetcher: Box<dyn ItemFetcher>,
    pipeline: &PipelineHandle,
    root: &Path,
) -> Result<usize> {
    let mut queued = 0;
    while fetcher.advance().await? {
        let Some(item) = fetcher.current() else {
            continue;
        };
        pipeline
            .submit(DownloadRequest {
                item: item.clone(),
                root_dir: root.to_path_buf(),
            })
            .await?;
        queued += 1;
    }
    Ok(queued)
}
