//! Metadata embedding
//!
//! Downloaded files get their provenance (description, capture time, GPS) written
//! back into the file. Writers implement [`MetadataWriter`]; the [`MetadataChain`]
//! tries a lightweight in-process writer first and falls back to the external
//! `exiftool` binary when the primary cannot open or parse the file.
//!
//! Metadata failures are never fatal to an item: by the time metadata is written the
//! media file is already safely on disk.
//!
//! ## Usage
//!
//! ```no_run
//! use media_dumper::config::MetadataConfig;
//! use media_dumper::metadata::MetadataChain;
//! use media_dumper::MediaMetadata;
//! use std::path::Path;
//!
//! # async fn example() -> media_dumper::Result<()> {
//! let chain = MetadataChain::from_config(&MetadataConfig::default());
//! let metadata = MediaMetadata {
//!     description: "Sunset".to_string(),
//!     ..Default::default()
//! };
//! chain.write_metadata(Path::new("photo.jpg"), Some(&metadata)).await?;
//! # Ok(())
//! # }
//! ```

mod exif;
mod exiftool;
mod noop;

pub use exif::ExifWriter;
pub use exiftool::ExifToolWriter;
pub use noop::NoOpMetadataWriter;

use crate::config::MetadataConfig;
use crate::error::{Error, MetadataError, Result};
use crate::types::MediaMetadata;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

/// Something that can embed [`MediaMetadata`] into a persisted file
///
/// Writers return [`MetadataError::Unreadable`] when they cannot open or parse the
/// file, which is the signal for the chain to try the next writer.
#[async_trait]
pub trait MetadataWriter: Send + Sync {
    /// Write description, capture time and GPS (when present) into `path`
    async fn write(&self, path: &Path, metadata: &MediaMetadata) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Primary writer with a fallback for files the primary cannot handle
#[derive(Clone)]
pub struct MetadataChain {
    primary: Arc<dyn MetadataWriter>,
    fallback: Arc<dyn MetadataWriter>,
}

impl MetadataChain {
    /// Chain two writers
    pub fn new(primary: Arc<dyn MetadataWriter>, fallback: Arc<dyn MetadataWriter>) -> Self {
        Self { primary, fallback }
    }

    /// In-process EXIF writer first, then exiftool (explicit path, PATH lookup, or none)
    pub fn from_config(config: &MetadataConfig) -> Self {
        let fallback: Arc<dyn MetadataWriter> = match &config.exiftool_path {
            Some(path) => Arc::new(ExifToolWriter::new(path.clone())),
            None if config.search_path => match ExifToolWriter::from_path() {
                Some(writer) => Arc::new(writer),
                None => {
                    tracing::debug!("exiftool not found in PATH, fallback writer disabled");
                    Arc::new(NoOpMetadataWriter)
                }
            },
            None => Arc::new(NoOpMetadataWriter),
        };
        Self::new(Arc::new(ExifWriter), fallback)
    }

    /// Embed `metadata` into `path`
    ///
    /// Missing metadata is reported as [`MetadataError::Empty`] without touching the
    /// file. When the primary writer cannot open the file the fallback is invoked once
    /// with the same values; if it fails too, its error is returned and the file is
    /// left as downloaded.
    pub async fn write_metadata(
        &self,
        path: &Path,
        metadata: Option<&MediaMetadata>,
    ) -> Result<()> {
        let Some(metadata) = metadata else {
            return Err(MetadataError::Empty {
                path: path.to_path_buf(),
            }
            .into());
        };

        match self.primary.write(path, metadata).await {
            Err(Error::Metadata(MetadataError::Unreadable { reason, .. })) => {
                tracing::debug!(
                    path = %path.display(),
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    reason = %reason,
                    "Primary metadata writer cannot open file, trying fallback"
                );
                self.fallback.write(path, metadata).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl MetadataWriter for MetadataChain {
    async fn write(&self, path: &Path, metadata: &MediaMetadata) -> Result<()> {
        self.write_metadata(path, Some(metadata)).await
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

/// EXIF date format: `YYYY:MM:DD HH:MM:SS`
pub(crate) fn exif_timestamp(created: DateTime<Utc>) -> String {
    created.format("%Y:%m:%d %H:%M:%S").to_string()
}

/// Split a decimal coordinate into degrees, minutes and seconds as EXIF rationals
/// `(numerator, denominator)`. The sign is dropped; callers write it as the ref tag.
pub(crate) fn to_dms_rationals(value: f64) -> [(u32, u32); 3] {
    const SECONDS_SCALE: u32 = 10_000;
    let value = value.abs();
    let degrees = value.trunc();
    let minutes_full = (value - degrees) * 60.0;
    let minutes = minutes_full.trunc();
    let seconds = (minutes_full - minutes) * 60.0;
    [
        (degrees as u32, 1),
        (minutes as u32, 1),
        (
            (seconds * f64::from(SECONDS_SCALE)).round() as u32,
            SECONDS_SCALE,
        ),
    ]
}

/// EXIF reference letter for a latitude
pub(crate) fn latitude_ref(latitude: f64) -> &'static str {
    if latitude < 0.0 { "S" } else { "N" }
}

/// EXIF reference letter for a longitude
pub(crate) fn longitude_ref(longitude: f64) -> &'static str {
    if longitude < 0.0 { "W" } else { "E" }
}
