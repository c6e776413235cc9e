//! No-op metadata writer for graceful degradation

use super::MetadataWriter;
use crate::error::{MetadataError, Result};
use crate::types::MediaMetadata;
use async_trait::async_trait;
use std::path::Path;

/// Writer used as the fallback when exiftool is not available
///
/// Always reports [`MetadataError::NotSupported`], which the pipeline logs and moves on.
pub struct NoOpMetadataWriter;

#[async_trait]
impl MetadataWriter for NoOpMetadataWriter {
    async fn write(&self, _path: &Path, _metadata: &MediaMetadata) -> Result<()> {
        Err(MetadataError::NotSupported(
            "writing metadata to this file type requires exiftool. \
             Configure exiftool_path or ensure exiftool is in PATH."
                .into(),
        )
        .into())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
