//! Shared fakes for unit tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::error::{Error, Result, TransferError};
use crate::fetch::{ByteStream, RetryingFetcher, Transport};
use crate::retry::BackoffSchedule;
use crate::storage::{LocalStorage, Storage};
use crate::types::MediaMetadata;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Reply {
    Body(Vec<u8>),
    NotFound,
    BrokenBody(Vec<u8>),
    /// Transient failures before the body is served
    Flaky { failures: usize, body: Vec<u8> },
}

/// In-memory [`Transport`] that counts requests per URL
///
/// Unknown URLs fail with a transient error.
#[derive(Default)]
pub(crate) struct FakeTransport {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Mutex<Duration>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, url: &str, body: &[u8]) {
        self.set(url, Reply::Body(body.to_vec()));
    }

    pub(crate) fn not_found(&self, url: &str) {
        self.set(url, Reply::NotFound);
    }

    pub(crate) fn broken_body(&self, url: &str, partial: &[u8]) {
        self.set(url, Reply::BrokenBody(partial.to_vec()));
    }

    pub(crate) fn flaky(&self, url: &str, failures: usize, body: &[u8]) {
        self.set(
            url,
            Reply::Flaky {
                failures,
                body: body.to_vec(),
            },
        );
    }

    /// Hold every request for `delay` before answering
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn set(&self, url: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &str) -> Result<ByteStream> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = self.replies.lock().unwrap().get(url).cloned();
        match reply {
            Some(Reply::Body(body)) => Ok(futures::stream::iter(vec![Ok(Bytes::from(body))]).boxed()),
            Some(Reply::NotFound) => Err(TransferError::NotFound {
                url: url.to_string(),
            }
            .into()),
            Some(Reply::BrokenBody(partial)) => {
                let chunks: Vec<Result<Bytes>> = vec![
                    Ok(Bytes::from(partial)),
                    Err(Error::Transfer(TransferError::Transient {
                        url: url.to_string(),
                        reason: "connection reset mid-body".to_string(),
                    })),
                ];
                Ok(futures::stream::iter(chunks).boxed())
            }
            Some(Reply::Flaky { failures, body }) if attempt > failures => {
                Ok(futures::stream::iter(vec![Ok(Bytes::from(body))]).boxed())
            }
            Some(Reply::Flaky { .. }) | None => Err(TransferError::Transient {
                url: url.to_string(),
                reason: "code is 503".to_string(),
            }
            .into()),
        }
    }
}

/// Five retries a few milliseconds apart
pub(crate) fn fast_schedule() -> BackoffSchedule {
    BackoffSchedule::new(vec![Duration::from_millis(5); 5])
}

/// Local storage over `transport` with metadata disabled
pub(crate) fn local_storage(transport: Arc<FakeTransport>) -> Arc<LocalStorage> {
    Arc::new(LocalStorage::new(
        RetryingFetcher::new(transport, fast_schedule()),
        None,
    ))
}

/// [`Storage`] that touches no network or disk and records what it was asked to fetch
#[derive(Default)]
pub(crate) struct RecordingStorage {
    downloads: Mutex<Vec<String>>,
}

impl RecordingStorage {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn prepare(&self, root: &Path) -> Result<PathBuf> {
        Ok(root.to_path_buf())
    }

    async fn create_album_dir(&self, root: &Path, album: &str) -> Result<PathBuf> {
        Ok(root.join(album))
    }

    async fn download_to(&self, url: &str, dir: &Path, file_name: &str) -> Result<PathBuf> {
        self.downloads.lock().unwrap().push(url.to_string());
        Ok(dir.join(file_name))
    }

    async fn write_metadata(&self, _path: &Path, _metadata: Option<&MediaMetadata>) -> Result<()> {
        Ok(())
    }
}
