//! Error types for the reminder scheduler.

/// Top-level error type for nudge.
#[derive(Debug, thiserror::Error)]
pub enum NudgeError {
    /// Persisted reminder collection or ledger could not be read or written.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Caller supplied a request the core cannot act on (e.g. empty text).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Delivery through the notifier failed.
    #[error("notify error: {0}")]
    Notify(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NudgeError>;
