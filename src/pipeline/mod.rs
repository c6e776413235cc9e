//! Persist pipeline
//!
//! A [`Pipeline`] owns a fixed pool of long-lived workers draining one bounded queue
//! of [`DownloadRequest`]s. Each worker runs a request end to end:
//!
//! 1. create the album directory
//! 2. claim and fetch the candidate URLs in order until one is persisted
//! 3. embed metadata (never fatal)
//! 4. if every candidate failed, write a sidecar failure record
//!
//! Producers push through a cloneable [`PipelineHandle`]. A full queue blocks the
//! producer, which is how slow downloads throttle fast enumeration.
//!
//! ```no_run
//! use media_dumper::pipeline::Pipeline;
//! use media_dumper::storage::LocalStorage;
//! use media_dumper::{Config, DownloadRequest, MediaItem};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # async fn example() -> media_dumper::Result<()> {
//! let config = Config::default();
//! let storage = Arc::new(LocalStorage::from_config(&config)?);
//! let pipeline = Pipeline::start(&config, storage)?;
//!
//! let handle = pipeline.handle();
//! handle
//!     .submit(DownloadRequest {
//!         item: MediaItem::new(vec!["https://example.com/a.jpg".into()], "Trip", "", ""),
//!         root_dir: PathBuf::from("/tmp/out"),
//!     })
//!     .await?;
//! handle.wait_idle().await;
//!
//! pipeline.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod worker;


use crate::config::Config;
use crate::dedup::DedupCache;
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::types::{DownloadRequest, Event};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use worker::Worker;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// State shared by the handle and the workers
struct Shared {
    /// Requests submitted but not yet fully processed
    pending: AtomicUsize,
    /// Notified when `pending` drops to zero
    idle: Notify,
    /// Cleared by shutdown; submit fails afterwards
    accepting: AtomicBool,
    cancel: CancellationToken,
}

impl Shared {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Running worker pool
///
/// Dropping the pipeline cancels the workers; call [`shutdown`](Pipeline::shutdown)
/// to let queued requests finish first.
pub struct Pipeline {
    handle: PipelineHandle,
    queue_rx: Arc<Mutex<mpsc::Receiver<DownloadRequest>>>,
    workers: Vec<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl Pipeline {
    /// Validate `config` and spawn the workers
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &Config, storage: Arc<dyn Storage>) -> Result<Self> {
        config.validate()?;

        let capacity = config.pipeline.queue_capacity();
        let (queue_tx, queue_rx) = mpsc::channel(capacity);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            accepting: AtomicBool::new(true),
            cancel: CancellationToken::new(),
        });
        let dedup = DedupCache::new(&config.dedup, config.retry.backoff());

        let workers = (0..config.pipeline.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    storage: Arc::clone(&storage),
                    dedup: dedup.clone(),
                    event_tx: event_tx.clone(),
                    shared: Arc::clone(&shared),
                };
                tokio::spawn(worker.run(Arc::clone(&queue_rx)))
            })
            .collect();

        tracing::info!(
            workers = config.pipeline.workers,
            queue_capacity = capacity,
            "Persist pipeline started"
        );

        Ok(Self {
            handle: PipelineHandle {
                queue_tx,
                shared,
                event_tx,
                dedup,
                storage,
                conversation_concurrency: config.pipeline.conversation_concurrency,
            },
            queue_rx,
            workers,
            shutdown_timeout: config.pipeline.shutdown_timeout,
        })
    }

    /// A handle for submitting requests
    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.handle.subscribe()
    }

    /// The pipeline's dedup cache
    pub fn dedup(&self) -> &DedupCache {
        &self.handle.dedup
    }

    /// Stop accepting requests, wait for queued work, then stop the workers
    ///
    /// Waiting is bounded by `pipeline.shutdown_timeout`; requests still queued or in
    /// flight after that are abandoned (their dedup claims are released).
    pub async fn shutdown(mut self) -> Result<()> {
        tracing::info!("Initiating pipeline shutdown");

        // 1. Stop accepting new requests
        self.handle.shared.accepting.store(false, Ordering::SeqCst);

        // 2. Let queued and in-flight requests finish
        match tokio::time::timeout(self.shutdown_timeout, self.handle.wait_idle()).await {
            Ok(()) => tracing::info!("All queued requests processed"),
            Err(_) => tracing::warn!(
                pending = self.handle.pending(),
                "Timeout waiting for queued requests, abandoning them"
            ),
        }

        // 3. Stop the workers
        self.handle.shared.cancel.cancel();
        for worker in std::mem::take(&mut self.workers) {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Persist worker ended abnormally");
            }
        }

        // 4. Drop whatever is still queued
        let abandoned = {
            let mut queue_rx = self.queue_rx.lock().await;
            queue_rx.close();
            let mut abandoned = 0usize;
            while queue_rx.try_recv().is_ok() {
                self.handle.shared.finish_one();
                abandoned += 1;
            }
            abandoned
        };
        if abandoned > 0 {
            tracing::warn!(abandoned, "Dropped queued requests at shutdown");
        }

        // 5. Emit shutdown event
        self.handle.emit(Event::Shutdown);

        tracing::info!("Pipeline shutdown complete");
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.handle.shared.cancel.cancel();
    }
}

/// Cloneable producer side of a [`Pipeline`]
#[derive(Clone)]
pub struct PipelineHandle {
    queue_tx: mpsc::Sender<DownloadRequest>,
    shared: Arc<Shared>,
    event_tx: broadcast::Sender<Event>,
    dedup: DedupCache,
    storage: Arc<dyn Storage>,
    conversation_concurrency: usize,
}

impl PipelineHandle {
    /// Push a request onto the shared queue
    ///
    /// Waits while the queue is full. Fails with [`Error::ShuttingDown`] once the
    /// pipeline stops accepting work. Cancel-safe: a request is either queued or
    /// returned to nobody, never half-counted.
    pub async fn submit(&self, request: DownloadRequest) -> Result<()> {
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let permit = tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => return Err(Error::ShuttingDown),
            permit = self.queue_tx.reserve() => permit.map_err(|_| Error::ShuttingDown)?,
        };

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.emit(Event::ItemQueued {
            album: request.item.album.clone(),
            source_url: request.item.source_url.clone(),
        });
        permit.send(request);
        Ok(())
    }

    /// Resolve once every submitted request has been processed
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Requests submitted but not yet processed
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Storage the workers persist into
    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configured bound on conversations enumerated at once
    pub fn conversation_concurrency(&self) -> usize {
        self.conversation_concurrency
    }

    /// True while the pipeline accepts requests
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst) && !self.shared.cancel.is_cancelled()
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("pending", &self.pending())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}
