//! Remote content sources
//!
//! A [`Source`] knows how to enumerate a user's albums and conversations and how to
//! page through the media in each one. API call shapes, pagination cursors and
//! attachment parsing are the implementation's business; the pipeline only sees
//! descriptors and [`ItemFetcher`] cursors.
//!
//! Authentication or permission failures must be reported as
//! [`Error::Access`](crate::Error::Access) so callers can prompt for a new token
//! instead of treating the whole run as failed.

mod memory;

pub use memory::{MemorySource, VecItemFetcher};

use crate::error::Result;
use crate::types::{AlbumDescriptor, ConversationDescriptor, MediaItem};
use async_trait::async_trait;

/// Cursor over the media items of one album or conversation
///
/// Call [`advance`](ItemFetcher::advance) before each [`current`](ItemFetcher::current).
/// A cursor is consumed once; it does not rewind.
#[async_trait]
pub trait ItemFetcher: Send {
    /// Move to the next item, fetching the next page if needed; `false` at exhaustion
    async fn advance(&mut self) -> Result<bool>;

    /// Item under the cursor (None before the first successful advance)
    fn current(&self) -> Option<&MediaItem>;
}

/// Remote content backend
#[async_trait]
pub trait Source: Send + Sync {
    /// All albums visible with the current credentials
    async fn list_albums(&self) -> Result<Vec<AlbumDescriptor>>;

    /// Cursor over one album's items
    async fn album_items(&self, album_id: &str) -> Result<Box<dyn ItemFetcher>>;

    /// All conversations visible with the current credentials
    async fn list_conversations(&self) -> Result<Vec<ConversationDescriptor>>;

    /// Cursor over the attachments of the conversation with `peer_id`;
    /// `title` names the destination directory
    async fn conversation_items(&self, peer_id: &str, title: &str)
    -> Result<Box<dyn ItemFetcher>>;
}
