//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization. Also hosts the
//! server-assigned display timestamp for chat messages.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
/// Disconnect is implicit: the transport signals it on connection loss.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Claim a display name (required before chatting)
    Join { name: String },
    /// Send a chat message. `user` is advisory only; the server
    /// broadcasts under the connection's claimed name.
    ChatMessage { user: String, text: String },
    /// Indicate typing activity
    Typing,
    /// Indicate typing stopped
    StopTyping,
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
/// Each variant targets one of three audiences: the sender only,
/// everyone but the sender, or everyone.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Name accepted; sent to the joiner only
    LoginSuccess { name: String },
    /// Name rejected; sent to the joiner only
    LoginFailed { reason: String },
    /// Join/leave announcement
    SystemMessage { text: String },
    /// Full snapshot of claimed names; sent to everyone
    ActiveUsers { users: Vec<String> },
    /// Chat message with the server-assigned timestamp; sent to everyone
    ChatMessage {
        user: String,
        text: String,
        time: String,
    },
    /// A user started typing; sent to everyone but them
    Typing { name: String },
    /// A user stopped typing; sent to everyone but them
    StopTyping { name: String },
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
///
/// Represents different error scenarios that can be communicated to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Attempted action before a successful join
    NotJoined,
    /// Attempted a second join on the same connection
    AlreadyJoined,
    /// Chat message with empty text
    EmptyMessage,
    /// Invalid message format
    InvalidMessage,
}

/// Convert AppError to ServerMessage for client notification
///
/// Join rejections become `login_failed` (the client shows them on the
/// login screen); everything else becomes a generic `error`.
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        match &err {
            AppError::NameTaken => ServerMessage::LoginFailed {
                reason: "Username is already taken.".to_string(),
            },
            AppError::EmptyName => ServerMessage::LoginFailed {
                reason: "Username cannot be empty.".to_string(),
            },
            AppError::AlreadyJoined => ServerMessage::Error {
                code: ErrorCode::AlreadyJoined,
                message: "You have already joined".to_string(),
            },
            AppError::NotJoined => ServerMessage::Error {
                code: ErrorCode::NotJoined,
                message: "Join with a username first".to_string(),
            },
            AppError::EmptyMessage => ServerMessage::Error {
                code: ErrorCode::EmptyMessage,
                message: "Message cannot be empty".to_string(),
            },
            AppError::Json(e) => ServerMessage::Error {
                code: ErrorCode::InvalidMessage,
                message: format!("Invalid message format: {}", e),
            },
            // Fatal errors are not typically converted (connection closes)
            _ => ServerMessage::Error {
                code: ErrorCode::InvalidMessage,
                message: "Internal error".to_string(),
            },
        }
    }
}

/// Current display timestamp in server-local time
///
/// Assigned at broadcast time so every recipient of a chat message,
/// the author included, sees the identical value.
pub fn display_timestamp() -> String {
    format_display_time(&Local::now())
}

/// Format a timestamp as two-digit day, abbreviated month, hour:minute
fn format_display_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format("%d %b %H:%M").to_string()
}
