//! Error types for the bridge.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Source transport error: {0}")]
    Source(#[from] SourceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors. A failing store operation abandons only that
/// step; the process continues with the next event.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),
}

/// The admin supplied a source reference the transport cannot resolve.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Could not resolve source reference {0:?}")]
    NotFound(String),

    #[error("Entity resolution request failed: {0}")]
    Transport(String),
}

/// The destination transport rejected or failed a send. The affected
/// message is logged and dropped — there is no retry.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{method} failed: {reason}")]
    SendFailed { method: &'static str, reason: String },

    #[error("Media fetch failed: {0}")]
    MediaFetch(String),
}

/// Source transport failures (update polling, admin replies).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Update poll failed: {0}")]
    Poll(String),

    #[error("Failed to send message on source transport: {0}")]
    Send(String),
}

/// Result type alias for the bridge.
pub type Result<T> = std::result::Result<T, Error>;
