//! External metadata writer using the exiftool binary

use super::{MetadataWriter, exif_timestamp, latitude_ref, longitude_ref};
use crate::error::{MetadataError, Result};
use crate::types::MediaMetadata;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Writer that shells out to `exiftool`
///
/// exiftool understands far more containers than the in-process writer (MP4, MOV,
/// HEIC, PDF), so it serves as the fallback. Title, original capture time and GPS
/// position are written in place with `-overwrite_original`.
///
/// # Examples
///
/// ```no_run
/// use media_dumper::metadata::{ExifToolWriter, MetadataWriter};
/// use media_dumper::MediaMetadata;
/// use std::path::Path;
///
/// # async fn example() -> media_dumper::Result<()> {
/// let writer = ExifToolWriter::from_path().expect("exiftool not found in PATH");
/// writer
///     .write(Path::new("clip.mp4"), &MediaMetadata::default())
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ExifToolWriter {
    binary_path: PathBuf,
}

impl ExifToolWriter {
    /// Create a writer with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find exiftool in PATH
    pub fn from_path() -> Option<Self> {
        which::which("exiftool").ok().map(Self::new)
    }
}

/// Command-line arguments that write `metadata` into `path`
fn exiftool_args(path: &Path, metadata: &MediaMetadata) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-overwrite_original".into(),
        format!("-Title={}", metadata.description).into(),
    ];
    if let Some(created) = metadata.created {
        args.push(format!("-DateTimeOriginal={}", exif_timestamp(created)).into());
    }
    if let Some(gps) = metadata.gps {
        args.push(format!("-GPSLatitude={}", gps.latitude.abs()).into());
        args.push(format!("-GPSLatitudeRef={}", latitude_ref(gps.latitude)).into());
        args.push(format!("-GPSLongitude={}", gps.longitude.abs()).into());
        args.push(format!("-GPSLongitudeRef={}", longitude_ref(gps.longitude)).into());
    }
    args.push(path.as_os_str().to_os_string());
    args
}

#[async_trait]
impl MetadataWriter for ExifToolWriter {
    async fn write(&self, path: &Path, metadata: &MediaMetadata) -> Result<()> {
        let output = Command::new(&self.binary_path)
            .args(exiftool_args(path, metadata))
            .output()
            .await
            .map_err(|e| MetadataError::ExternalTool(format!("Failed to execute exiftool: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MetadataError::ExternalTool(format!(
                "exiftool failed on {} ({}): {}",
                path.display(),
                output.status,
                stderr.trim()
            ))
            .into());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "exiftool"
    }
}
