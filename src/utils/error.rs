//! The `error` module defines the error type shared by every layer of `pushrelay`.
//!
//! Library functions return `Result<_, RelayError>` and propagate with `?`.
//! Per-message problems (a malformed ingest line, a client that went away) are
//! logged and swallowed where they happen; only failures that stop a whole
//! component surface as a `RelayError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("snapshot store error: {0}")]
    Store(#[from] sled::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("unsupported payload for '{category}': {reason}")]
    Payload { category: String, reason: String },

    #[error("relay task has shut down")]
    RelayClosed,
}
