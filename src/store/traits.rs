//! `Storage` trait — single async interface for all bridge persistence.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::routing::ChannelRoute;

/// Backend-agnostic store for channel routes and forwarded-message records.
///
/// Each operation is a single statement; the store owns the atomicity of
/// every call, so concurrent logical flows never observe partial writes.
#[async_trait]
pub trait Storage: Send + Sync {
    // ── Routes ──────────────────────────────────────────────────────

    /// Insert a new route and return its row id. New routes start
    /// enabled, with an empty caption.
    async fn create_route(
        &self,
        source_chat_id: i64,
        source_ref: &str,
        dest_address: &str,
    ) -> Result<i64, StorageError>;

    /// Replace a route's fixed caption.
    async fn update_caption(&self, route_id: i64, caption: &str) -> Result<(), StorageError>;

    /// Replace a route's destination address.
    async fn update_dest(&self, route_id: i64, dest_address: &str) -> Result<(), StorageError>;

    /// Toggle a route on or off without deleting it.
    async fn set_enabled(&self, route_id: i64, enabled: bool) -> Result<(), StorageError>;

    /// Delete a route. Forwarded records for its channel are kept.
    async fn delete_route(&self, route_id: i64) -> Result<(), StorageError>;

    /// All routes, ordered by route id ascending.
    async fn list_routes(&self) -> Result<Vec<ChannelRoute>, StorageError>;

    // ── Dedup guard ─────────────────────────────────────────────────

    /// Whether this exact inbound message was already dispatched.
    async fn has_forwarded(
        &self,
        source_chat_id: i64,
        message_id: i64,
    ) -> Result<bool, StorageError>;

    /// Record a dispatched message. Idempotent: recording the same pair
    /// twice is a no-op, not an error.
    async fn record_forwarded(
        &self,
        source_chat_id: i64,
        message_id: i64,
    ) -> Result<(), StorageError>;
}
