//! In-memory routing table — an atomically swappable snapshot of the store.
//!
//! The store is the source of truth; this cache is rebuilt wholesale after
//! every mutation and readers only ever see a fully built snapshot.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// One source-channel → destination mapping with its settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRoute {
    /// Store row id, used as the handle in admin commands.
    pub id: i64,
    /// Stable numeric id of the monitored Telegram channel.
    pub source_chat_id: i64,
    /// Human-readable reference the admin entered (@handle or t.me link).
    pub source_ref: String,
    /// Bale chat id or @handle that receives forwarded content.
    pub dest_address: String,
    /// Fixed text appended to every forwarded message; empty means none.
    pub caption: String,
    pub enabled: bool,
}

/// An immutable view of all routes, keyed by source chat id.
///
/// When two rows share a source chat id the higher route id wins, so the
/// map holds at most one active route per channel.
#[derive(Debug, Default)]
pub struct RouteSnapshot {
    version: u64,
    by_source: HashMap<i64, ChannelRoute>,
}

impl RouteSnapshot {
    fn build(version: u64, routes: Vec<ChannelRoute>) -> Self {
        let mut by_source = HashMap::with_capacity(routes.len());
        // Routes arrive in id-ascending order; later inserts overwrite.
        for route in routes {
            by_source.insert(route.source_chat_id, route);
        }
        Self { version, by_source }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Look up the route for a monitored source channel.
    pub fn get(&self, source_chat_id: i64) -> Option<&ChannelRoute> {
        self.by_source.get(&source_chat_id)
    }

    /// Look up a route by its store row id (admin manage target).
    pub fn find_by_id(&self, route_id: i64) -> Option<&ChannelRoute> {
        self.by_source.values().find(|r| r.id == route_id)
    }

    /// All routes ordered by route id ascending.
    pub fn sorted_by_id(&self) -> Vec<&ChannelRoute> {
        let mut routes: Vec<&ChannelRoute> = self.by_source.values().collect();
        routes.sort_by_key(|r| r.id);
        routes
    }

    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}

/// Shared routing cache. Writers publish a complete replacement snapshot;
/// readers grab an `Arc` and never observe a partially applied update.
#[derive(Debug, Default)]
pub struct RoutingTable {
    inner: RwLock<Arc<RouteSnapshot>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. Cheap (one Arc clone); never held across awaits
    /// by callers that want to observe later publishes.
    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        Arc::clone(&self.inner.read().expect("routing table lock poisoned"))
    }

    /// Replace the table wholesale with a freshly loaded route list.
    pub fn publish(&self, routes: Vec<ChannelRoute>) {
        let mut guard = self.inner.write().expect("routing table lock poisoned");
        let next = RouteSnapshot::build(guard.version + 1, routes);
        *guard = Arc::new(next);
    }
}
