//! Error types for media-dumper
//!
//! Failures are classified by where they happen, because that decides how far they
//! propagate:
//! - provider lookup failures abort the run that asked for the provider
//! - storage failures abort the affected download (or the run, for the root directory)
//! - source failures abort one album or conversation
//! - transfer and metadata failures stay inside the worker that hit them

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for media-dumper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which registry table a provider lookup went to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Remote content backend
    Source,
    /// Persistence backend
    Storage,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Source => write!(f, "source"),
            ProviderKind::Storage => write!(f, "storage"),
        }
    }
}

/// Main error type for media-dumper
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "pipeline.workers")
        key: Option<String>,
    },

    /// No provider is registered under the requested key
    #[error("{kind} provider not found: {key}")]
    ProviderNotFound {
        /// Registry table that was searched
        kind: ProviderKind,
        /// Requested key (empty when any storage was acceptable)
        key: String,
    },

    /// Directory or file-system failure in a storage backend
    #[error("storage error: {message}")]
    Storage {
        /// What the storage was trying to do
        message: String,
        /// Underlying I/O failure, if any
        #[source]
        source: Option<std::io::Error>,
    },

    /// Enumeration failure in a content source
    #[error("source error: {message}")]
    Source {
        /// What the source was trying to enumerate
        message: String,
        /// Underlying failure, if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication or permission failure reported by the remote
    #[error("access error: {message}")]
    Access {
        /// Message from the remote, suitable for prompting re-authentication
        message: String,
    },

    /// Network fetch failure
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Metadata embedding failure (never fatal to an item)
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Pipeline is shutting down and no longer accepts requests
    #[error("shutdown in progress: not accepting new download requests")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a storage error from a message and optional I/O cause
    pub fn storage(message: impl Into<String>, source: Option<std::io::Error>) -> Self {
        Error::Storage {
            message: message.into(),
            source,
        }
    }

    /// Build a source error without an underlying cause
    pub fn enumeration(message: impl Into<String>) -> Self {
        Error::Source {
            message: message.into(),
            source: None,
        }
    }

    /// True for authentication/permission failures that call for re-authentication
    /// rather than treating the whole run as failed.
    #[must_use]
    pub fn is_access_error(&self) -> bool {
        matches!(self, Error::Access { .. })
    }
}

/// Failures of a single network fetch
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network error or unexpected status; worth retrying
    #[error("{url} is unavailable: {reason}")]
    Transient {
        /// URL being fetched
        url: String,
        /// Status code or network failure description
        reason: String,
    },

    /// The remote answered 404; retrying cannot help
    #[error("{url} not found")]
    NotFound {
        /// URL being fetched
        url: String,
    },
}

/// Metadata embedding failures
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The item carries no metadata at all
    #[error("no metadata for {path}")]
    Empty {
        /// Persisted media file
        path: PathBuf,
    },

    /// A writer could not open or parse the file
    #[error("cannot read {path}: {reason}")]
    Unreadable {
        /// Persisted media file
        path: PathBuf,
        /// Parser or open failure
        reason: String,
    },

    /// Some fields were written but one was absent from the item
    #[error("{field} is empty for {path}")]
    MissingField {
        /// Persisted media file
        path: PathBuf,
        /// Name of the absent field
        field: &'static str,
    },

    /// Writing the tags back failed
    #[error("failed to write metadata to {path}: {reason}")]
    WriteFailed {
        /// Persisted media file
        path: PathBuf,
        /// Writer failure
        reason: String,
    },

    /// The external metadata tool could not be run or reported failure
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// No writer able to handle the file is available
    #[error("not supported: {0}")]
    NotSupported(String),
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_not_found_names_kind_and_key() {
        let err = Error::ProviderNotFound {
            kind: ProviderKind::Source,
            key: "vk".to_string(),
        };
        assert_eq!(err.to_string(), "source provider not found: vk");
    }

    #[test]
    fn access_errors_are_distinguishable() {
        let access = Error::Access {
            message: "token expired".to_string(),
        };
        assert!(access.is_access_error());
        assert!(!Error::enumeration("listing failed").is_access_error());
        assert!(
            !Error::Transfer(TransferError::NotFound {
                url: "http://x/a.jpg".to_string()
            })
            .is_access_error()
        );
    }

    #[test]
    fn transfer_errors_convert_into_crate_error() {
        let err: Error = TransferError::Transient {
            url: "http://x/a.jpg".to_string(),
            reason: "status 503".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Transfer(TransferError::Transient { .. })));
        assert!(err.to_string().contains("status 503"));
    }

    #[test]
    fn storage_error_keeps_io_source() {
        use std::error::Error as _;

        let err = Error::storage(
            "dir can't be created",
            Some(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "denied",
            )),
        );
        assert_eq!(err.to_string(), "storage error: dir can't be created");
        assert!(err.source().is_some(), "io cause must be chained");
    }
}
