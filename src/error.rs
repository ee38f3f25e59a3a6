//! Error types for the chat hub
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (send error message to client).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Join attempted with a name another connection holds
    #[error("Username is already taken")]
    NameTaken,

    /// Join attempted with an empty (post-trim) name
    #[error("Username is empty")]
    EmptyName,

    /// Join attempted on a connection that already claimed a name
    #[error("Already joined")]
    AlreadyJoined,

    /// Chat attempted before a successful join
    #[error("Not joined")]
    NotJoined,

    /// Chat message with empty (post-trim) text
    #[error("Message is empty")]
    EmptyMessage,
}

/// Message send errors
///
/// Occurs when attempting to deliver a message to a client's
/// outbound queue. Broadcasts treat these as per-recipient no-ops.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The client's outbound queue is full (slow consumer)
    #[error("Channel full")]
    ChannelFull,
}
