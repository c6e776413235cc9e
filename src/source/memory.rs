//! In-memory source backed by fixed descriptors and items

use super::{ItemFetcher, Source};
use crate::error::{Error, Result};
use crate::types::{AlbumDescriptor, ConversationDescriptor, MediaItem};
use async_trait::async_trait;
use std::collections::HashMap;

/// [`ItemFetcher`] over an owned list of items
pub struct VecItemFetcher {
    items: Vec<MediaItem>,
    next: usize,
    current: Option<usize>,
}

impl VecItemFetcher {
    /// Cursor positioned before the first item
    pub fn new(items: Vec<MediaItem>) -> Self {
        Self {
            items,
            next: 0,
            current: None,
        }
    }
}

#[async_trait]
impl ItemFetcher for VecItemFetcher {
    async fn advance(&mut self) -> Result<bool> {
        if self.next < self.items.len() {
            self.current = Some(self.next);
            self.next += 1;
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn current(&self) -> Option<&MediaItem> {
        self.current.and_then(|p| self.items.get(p))
    }
}

/// [`Source`] serving a fixed set of albums and conversations
///
/// Useful for wiring tests and demos without a remote API.
///
/// # Examples
///
/// ```
/// use media_dumper::source::MemorySource;
/// use media_dumper::{AlbumDescriptor, MediaItem};
///
/// let source = MemorySource::new().with_album(
///     AlbumDescriptor {
///         id: "1".into(),
///         title: "Trip".into(),
///         ..Default::default()
///     },
///     vec![MediaItem::new(
///         vec!["http://x/a.jpg".into()],
///         "Trip",
///         "",
///         "http://x/photo1",
///     )],
/// );
/// ```
#[derive(Clone, Default)]
pub struct MemorySource {
    albums: Vec<AlbumDescriptor>,
    album_items: HashMap<String, Vec<MediaItem>>,
    conversations: Vec<ConversationDescriptor>,
    conversation_items: HashMap<String, Vec<MediaItem>>,
}

impl MemorySource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an album with its items
    #[must_use]
    pub fn with_album(mut self, album: AlbumDescriptor, items: Vec<MediaItem>) -> Self {
        self.album_items.insert(album.id.clone(), items);
        self.albums.push(album);
        self
    }

    /// Add a conversation with its attachments
    #[must_use]
    pub fn with_conversation(
        mut self,
        conversation: ConversationDescriptor,
        items: Vec<MediaItem>,
    ) -> Self {
        self.conversation_items
            .insert(conversation.id.clone(), items);
        self.conversations.push(conversation);
        self
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn list_albums(&self) -> Result<Vec<AlbumDescriptor>> {
        Ok(self.albums.clone())
    }

    async fn album_items(&self, album_id: &str) -> Result<Box<dyn ItemFetcher>> {
        let items = self
            .album_items
            .get(album_id)
            .cloned()
            .ok_or_else(|| Error::enumeration(format!("album {} not found", album_id)))?;
        Ok(Box::new(VecItemFetcher::new(items)))
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationDescriptor>> {
        Ok(self.conversations.clone())
    }

    async fn conversation_items(
        &self,
        peer_id: &str,
        title: &str,
    ) -> Result<Box<dyn ItemFetcher>> {
        let items = self.conversation_items.get(peer_id).ok_or_else(|| {
            Error::enumeration(format!("conversation {} ({}) not found", peer_id, title))
        })?;
        Ok(Box::new(VecItemFetcher::new(items.clone())))
    }
}
