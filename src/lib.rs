//! Group Chat WebSocket Server Library
//!
//! A single-room group chat server built with tokio-tungstenite using the
//! Actor pattern for state management. Clients claim a unique display
//! name, broadcast messages to everyone, and see live presence and typing
//! indicators.
//!
//! # Features
//! - WebSocket connection handling
//! - Unique display name claiming (login success/failure)
//! - Group chat with server-assigned timestamps
//! - Live active-user list
//! - Debounced typing indicators
//! - Disconnection handling with presence reconciliation
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatHub` is the central actor owning all state
//! - Each connection has a `handler` task communicating with the hub
//! - Typing expiry timers post back into the hub's own command channel
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_hub::{ChatHub, handle_connection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
//!     let (cmd_tx, hub) = ChatHub::new(256);
//!
//!     tokio::spawn(hub.run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx));
//!     }
//! }
//! ```

pub mod client;
pub mod error;
pub mod handler;
pub mod hub;
pub mod message;
pub mod registry;
pub mod typing;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use hub::{ChatHub, HubCommand, DEFAULT_TYPING_TIMEOUT};
pub use message::{ClientMessage, ErrorCode, ServerMessage};
pub use registry::NameRegistry;
pub use typing::TypingState;
pub use types::ConnectionId;
