//! Durable routing store — routes plus the forwarded-message dedup guard.

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStore;
pub use traits::Storage;
