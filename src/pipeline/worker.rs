//! Persist worker

use super::Shared;
use crate::dedup::{ClaimOutcome, DedupCache};
use crate::error::{Error, MetadataError};
use crate::storage::{Storage, failure_record_name};
use crate::types::{DownloadRequest, Event, ItemOutcome, MediaItem};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc};

pub(super) struct Worker {
    pub(super) id: usize,
    pub(super) storage: Arc<dyn Storage>,
    pub(super) dedup: DedupCache,
    pub(super) event_tx: broadcast::Sender<Event>,
    pub(super) shared: Arc<Shared>,
}

impl Worker {
    /// Drain the shared queue until it closes or the pipeline is cancelled
    pub(super) async fn run(self, queue: Arc<Mutex<mpsc::Receiver<DownloadRequest>>>) {
        tracing::debug!(worker = self.id, "Persist worker started");
        let cancel = self.shared.cancel.clone();

        loop {
            let request = {
                let mut queue = queue.lock().await;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    request = queue.recv() => request,
                }
            };
            let Some(request) = request else {
                break;
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(
                        worker = self.id,
                        source_url = %request.item.source_url,
                        "Abandoning request at shutdown"
                    );
                }
                outcome = self.process(&request) => {
                    tracing::debug!(worker = self.id, outcome = ?outcome, "Request processed");
                }
            }
            self.shared.finish_one();
        }

        tracing::debug!(worker = self.id, "Persist worker stopped");
    }

    /// Run one request end to end; failures stay inside this call
    pub(super) async fn process(&self, request: &DownloadRequest) -> ItemOutcome {
        let item = &request.item;

        let dir = match self
            .storage
            .create_album_dir(&request.root_dir, &item.album)
            .await
        {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(
                    album = %item.album,
                    error = %e,
                    "Album directory can't be created, recording failure in root"
                );
                return self.fail(&request.root_dir, item).await;
            }
        };

        for url in &item.urls {
            let claim = match self.dedup.try_claim(url).await {
                ClaimOutcome::Claimed(claim) => claim,
                ClaimOutcome::AlreadyDone => {
                    tracing::debug!(url = %url, "Already downloaded, skipping");
                    self.emit(Event::ItemSkipped { url: url.clone() });
                    return ItemOutcome::Skipped { url: url.clone() };
                }
            };

            let download = self.storage.download_to(url, &dir, &item.file_name);
            match claim.keep_alive(download).await {
                Ok(path) => {
                    claim.complete();
                    self.embed_metadata(&path, item).await;
                    tracing::debug!(url = %url, path = %path.display(), "Item persisted");
                    self.emit(Event::ItemDownloaded {
                        url: url.clone(),
                        path: path.clone(),
                    });
                    return ItemOutcome::Downloaded {
                        url: url.clone(),
                        path,
                    };
                }
                Err(e) => {
                    // Dropping the claim releases the URL for a later attempt
                    tracing::warn!(url = %url, error = %e, "Candidate URL failed");
                }
            }
        }

        self.fail(&dir, item).await
    }

    async fn embed_metadata(&self, path: &Path, item: &MediaItem) {
        match self
            .storage
            .write_metadata(path, item.metadata.as_ref())
            .await
        {
            Ok(()) => {}
            Err(Error::Metadata(
                e @ (MetadataError::Empty { .. } | MetadataError::MissingField { .. }),
            )) => {
                tracing::debug!(path = %path.display(), reason = %e, "Metadata partially written");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Metadata can't be written");
                self.emit(Event::MetadataFailed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// Every candidate failed: leave a sidecar record holding the source URL
    async fn fail(&self, dir: &Path, item: &MediaItem) -> ItemOutcome {
        let record = write_failure_record(dir, &item.source_url).await;
        tracing::warn!(
            source_url = %item.source_url,
            candidates = item.urls.len(),
            record = ?record,
            "Item failed, no candidate URL could be persisted"
        );
        self.emit(Event::ItemFailed {
            source_url: item.source_url.clone(),
            record: record.clone(),
        });
        ItemOutcome::Failed { record }
    }

    fn emit(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }
}

async fn write_failure_record(dir: &Path, source_url: &str) -> Option<PathBuf> {
    let path = dir.join(failure_record_name(source_url));
    match tokio::fs::write(&path, source_url).await {
        Ok(()) => Some(path),
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Failure record can't be written"
            );
            None
        }
    }
}
