//! libSQL backend — async `Storage` trait implementation.
//!
//! Supports local file and in-memory databases; the in-memory variant is
//! what the tests use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::routing::ChannelRoute;
use crate::store::traits::Storage;

const ROUTE_COLUMNS: &str = "id, source_chat_id, source_ref, dest_address, caption, enabled";

/// libSQL store backend.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct SqliteStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Open(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StorageError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Route store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn open_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StorageError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StorageError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS channels (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    source_chat_id INTEGER NOT NULL,
                    source_ref TEXT NOT NULL,
                    dest_address TEXT NOT NULL,
                    caption TEXT NOT NULL DEFAULT '',
                    enabled INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_channels_source_chat
                    ON channels(source_chat_id);

                CREATE TABLE IF NOT EXISTS sent_messages (
                    source_chat_id INTEGER NOT NULL,
                    message_id INTEGER NOT NULL,
                    forwarded_at TEXT NOT NULL,
                    PRIMARY KEY (source_chat_id, message_id)
                );",
            )
            .await
            .map_err(|e| StorageError::Open(format!("init_schema: {e}")))?;

        debug!("Schema initialized");
        Ok(())
    }
}

fn row_to_route(row: &libsql::Row) -> Result<ChannelRoute, libsql::Error> {
    let enabled: i64 = row.get(5)?;
    Ok(ChannelRoute {
        id: row.get(0)?,
        source_chat_id: row.get(1)?,
        source_ref: row.get(2)?,
        dest_address: row.get(3)?,
        caption: row.get(4)?,
        enabled: enabled != 0,
    })
}

#[async_trait]
impl Storage for SqliteStore {
    async fn create_route(
        &self,
        source_chat_id: i64,
        source_ref: &str,
        dest_address: &str,
    ) -> Result<i64, StorageError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO channels (source_chat_id, source_ref, dest_address, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![source_chat_id, source_ref, dest_address, now],
            )
            .await
            .map_err(|e| StorageError::Query(format!("create_route: {e}")))?;

        let route_id = self.conn.last_insert_rowid();
        debug!(route_id, source_chat_id, "Route created");
        Ok(route_id)
    }

    async fn update_caption(&self, route_id: i64, caption: &str) -> Result<(), StorageError> {
        self.conn
            .execute(
                "UPDATE channels SET caption = ?1 WHERE id = ?2",
                params![caption, route_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("update_caption: {e}")))?;
        Ok(())
    }

    async fn update_dest(&self, route_id: i64, dest_address: &str) -> Result<(), StorageError> {
        self.conn
            .execute(
                "UPDATE channels SET dest_address = ?1 WHERE id = ?2",
                params![dest_address, route_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("update_dest: {e}")))?;
        Ok(())
    }

    async fn set_enabled(&self, route_id: i64, enabled: bool) -> Result<(), StorageError> {
        self.conn
            .execute(
                "UPDATE channels SET enabled = ?1 WHERE id = ?2",
                params![enabled as i64, route_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("set_enabled: {e}")))?;
        Ok(())
    }

    async fn delete_route(&self, route_id: i64) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM channels WHERE id = ?1", params![route_id])
            .await
            .map_err(|e| StorageError::Query(format!("delete_route: {e}")))?;
        debug!(route_id, "Route deleted");
        Ok(())
    }

    async fn list_routes(&self) -> Result<Vec<ChannelRoute>, StorageError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ROUTE_COLUMNS} FROM channels ORDER BY id ASC"),
                (),
            )
            .await
            .map_err(|e| StorageError::Query(format!("list_routes: {e}")))?;

        let mut routes = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let route = row_to_route(&row)
                .map_err(|e| StorageError::Query(format!("list_routes row parse: {e}")))?;
            routes.push(route);
        }
        Ok(routes)
    }

    async fn has_forwarded(
        &self,
        source_chat_id: i64,
        message_id: i64,
    ) -> Result<bool, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM sent_messages WHERE source_chat_id = ?1 AND message_id = ?2",
                params![source_chat_id, message_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("has_forwarded: {e}")))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(StorageError::Query(format!("has_forwarded: {e}"))),
        }
    }

    async fn record_forwarded(
        &self,
        source_chat_id: i64,
        message_id: i64,
    ) -> Result<(), StorageError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT OR IGNORE INTO sent_messages (source_chat_id, message_id, forwarded_at)
                 VALUES (?1, ?2, ?3)",
                params![source_chat_id, message_id, now],
            )
            .await
            .map_err(|e| StorageError::Query(format!("record_forwarded: {e}")))?;
        Ok(())
    }
}
