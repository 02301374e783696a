//! Transport abstractions for the source and destination networks.

pub mod bale;
pub mod telegram;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::{DispatchError, ResolutionError, SourceError};

pub use bale::BaleClient;
pub use telegram::TelegramSource;

/// Kind of binary attachment the bridge forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
}

/// Handle to a media attachment; bytes are fetched lazily at dispatch time.
#[derive(Debug, Clone)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    /// Source-transport file id used by `SourceClient::fetch_media`.
    pub file_id: String,
}

/// One inbound event from the source transport.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Sender identity; channel posts have none.
    pub sender_id: Option<i64>,
    /// Origin chat identity (stable per channel).
    pub chat_id: i64,
    pub message_id: i64,
    pub text: Option<String>,
    pub media: Option<MediaAttachment>,
    /// Whether this arrived in a private chat (admin dialog candidates).
    pub is_private: bool,
}

/// Stream of inbound events from the source subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// Source-network capabilities the bridge consumes.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Subscribe to all inbound events. Events arrive serially.
    async fn subscribe(&self) -> Result<EventStream, SourceError>;

    /// Resolve a human-readable channel reference to its stable chat id.
    async fn resolve_entity(&self, reference: &str) -> Result<i64, ResolutionError>;

    /// Fetch the bytes of a media attachment.
    async fn fetch_media(&self, media: &MediaAttachment) -> Result<Vec<u8>, DispatchError>;

    /// Send a text message back on the source network (admin replies).
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), SourceError>;
}

/// Destination-network capabilities the bridge consumes.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    async fn send_text(&self, dest: &str, text: &str) -> Result<(), DispatchError>;

    async fn send_photo(
        &self,
        dest: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), DispatchError>;

    async fn send_video(
        &self,
        dest: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), DispatchError>;
}
