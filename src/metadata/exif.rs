//! In-process EXIF writer

use super::{MetadataWriter, exif_timestamp, latitude_ref, longitude_ref, to_dms_rationals};
use crate::error::{Error, MetadataError, Result};
use crate::types::MediaMetadata;
use async_trait::async_trait;
use little_exif::exif_tag::ExifTag;
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;
use std::path::Path;

/// Writes EXIF tags directly into JPEG/PNG/WebP/TIFF files using `little_exif`
///
/// Sets the image description, original capture time and GPS position. Images
/// without an EXIF block get a fresh one. Files the parser does not understand
/// (videos, documents) are reported as [`MetadataError::Unreadable`] so the
/// chain can hand them to exiftool. When the
/// item has no GPS position the other tags are still written and a
/// [`MetadataError::MissingField`] is returned.
pub struct ExifWriter;

#[async_trait]
impl MetadataWriter for ExifWriter {
    async fn write(&self, path: &Path, metadata: &MediaMetadata) -> Result<()> {
        let path = path.to_path_buf();
        let metadata = metadata.clone();
        tokio::task::spawn_blocking(move || write_tags(&path, &metadata))
            .await
            .map_err(|e| Error::Other(format!("EXIF writer task failed: {}", e)))?
    }

    fn name(&self) -> &'static str {
        "little-exif"
    }
}

/// Extensions `little_exif` can write a fresh EXIF block into
const WRITABLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tif", "tiff"];

fn write_tags(path: &Path, metadata: &MediaMetadata) -> Result<()> {
    let (mut exif, fresh) = match Metadata::new_from_path(path) {
        Ok(exif) => (exif, false),
        // Images downloaded without any EXIF block still get one
        Err(e) if has_writable_extension(path) => {
            tracing::trace!(path = %path.display(), reason = %e, "No EXIF block, starting empty");
            (Metadata::new(), true)
        }
        Err(e) => {
            return Err(MetadataError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
            .into());
        }
    };

    exif.set_tag(ExifTag::ImageDescription(metadata.description.clone()));
    if let Some(created) = metadata.created {
        exif.set_tag(ExifTag::DateTimeOriginal(exif_timestamp(created)));
    }
    if let Some(gps) = metadata.gps {
        exif.set_tag(ExifTag::GPSLatitudeRef(latitude_ref(gps.latitude).to_string()));
        exif.set_tag(ExifTag::GPSLatitude(rationals(gps.latitude)));
        exif.set_tag(ExifTag::GPSLongitudeRef(
            longitude_ref(gps.longitude).to_string(),
        ));
        exif.set_tag(ExifTag::GPSLongitude(rationals(gps.longitude)));
    }

    exif.write_to_file(path).map_err(|e| {
        let path = path.to_path_buf();
        let reason = e.to_string();
        // A fresh block that still cannot be written means the image itself is not parseable
        if fresh {
            MetadataError::Unreadable { path, reason }
        } else {
            MetadataError::WriteFailed { path, reason }
        }
    })?;

    if metadata.gps.is_none() {
        return Err(MetadataError::MissingField {
            path: path.to_path_buf(),
            field: "gps",
        }
        .into());
    }
    Ok(())
}

fn has_writable_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            WRITABLE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn rationals(value: f64) -> Vec<uR64> {
    to_dms_rationals(value)
        .into_iter()
        .map(|(nominator, denominator)| uR64 {
            nominator,
            denominator,
        })
        .collect()
}
