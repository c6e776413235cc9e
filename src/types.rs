//! Core types for media-dumper

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Latitude/longitude pair in decimal degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinates {
    /// Degrees north (negative for south)
    pub latitude: f64,
    /// Degrees east (negative for west)
    pub longitude: f64,
}

/// Provenance metadata carried by a media item
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Caption or post text
    pub description: String,
    /// Capture (or upload) time
    pub created: Option<DateTime<Utc>>,
    /// Where the photo was taken, when the source knows
    pub gps: Option<GpsCoordinates>,
}

/// One downloadable asset
///
/// Produced by a [`Source`](crate::source::Source) enumeration and consumed exactly
/// once by a persist worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Candidate URLs, best quality first
    pub urls: Vec<String>,
    /// Album or conversation the item belongs to (destination subdirectory)
    pub album: String,
    /// Generated file name, usually derived from the capture time (empty = storage chooses)
    pub file_name: String,
    /// Page the item was found on; written to the failure record when every URL fails
    pub source_url: String,
    /// Description, capture time and GPS to embed
    pub metadata: Option<MediaMetadata>,
}

impl MediaItem {
    /// Create an item with no metadata
    pub fn new(
        urls: Vec<String>,
        album: impl Into<String>,
        file_name: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            urls,
            album: album.into(),
            file_name: file_name.into(),
            source_url: source_url.into(),
            metadata: None,
        }
    }

    /// Attach metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// File name derived from a capture timestamp, e.g. `20240131_154502.jpg`
    pub fn file_name_for(created: DateTime<Utc>, extension: &str) -> String {
        format!("{}.{}", created.format("%Y%m%d_%H%M%S"), extension)
    }
}

/// A media item paired with the destination root of the run that produced it
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// The item to persist
    pub item: MediaItem,
    /// Root directory of the current run (already prepared by storage)
    pub root_dir: PathBuf,
}

/// Album returned by source enumeration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumDescriptor {
    /// Source-specific album id
    pub id: String,
    /// Display title
    pub title: String,
    /// Cover image URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Number of items, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Creation time, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// Conversation returned by source enumeration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationDescriptor {
    /// Peer id used to page the conversation's attachments
    pub id: String,
    /// Display title (also the destination directory name)
    pub title: String,
    /// Avatar URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Number of messages, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Time of the first message, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// Result of one worker processing one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// A candidate URL was fetched and persisted
    Downloaded {
        /// URL that succeeded
        url: String,
        /// Persisted file
        path: PathBuf,
    },
    /// The first reachable candidate was already downloaded elsewhere
    Skipped {
        /// URL that was already done
        url: String,
    },
    /// Every candidate failed
    Failed {
        /// Sidecar failure record, if it could be written
        record: Option<PathBuf>,
    },
}

/// Events emitted by the pipeline
///
/// Subscribers receive events through [`Pipeline::subscribe`](crate::pipeline::Pipeline::subscribe).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A request entered the shared queue
    ItemQueued {
        /// Album/conversation name
        album: String,
        /// Page the item came from
        source_url: String,
    },
    /// An item was persisted
    ItemDownloaded {
        /// URL that was fetched
        url: String,
        /// Persisted file
        path: PathBuf,
    },
    /// An item was skipped because its URL was already downloaded
    ItemSkipped {
        /// URL that was already done
        url: String,
    },
    /// Every candidate URL of an item failed
    ItemFailed {
        /// Page the item came from
        source_url: String,
        /// Sidecar failure record, if written
        record: Option<PathBuf>,
    },
    /// Metadata could not be embedded (the file itself is kept)
    MetadataFailed {
        /// Persisted file
        path: PathBuf,
        /// Failure description
        error: String,
    },
    /// A dispatch finished streaming all of its descriptors into the queue
    DispatchFinished {
        /// Root directory of the run
        root: PathBuf,
        /// Number of requests queued
        items: usize,
        /// Number of albums/conversations that failed to enumerate
        failures: usize,
    },
    /// The pipeline is shutting down
    Shutdown,
}
