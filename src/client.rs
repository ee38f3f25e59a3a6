//! Client struct definition
//!
//! Represents a connected client session: identity, outbound channel,
//! and typing state.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::typing::TypingState;
use crate::types::ConnectionId;

/// Connected client session
///
/// `name` is None while the connection is still in the login screen and is
/// set exactly once, on a successful join. The typing state (and its owned
/// expiry timer) is torn down with the session.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Claimed display name (None until join succeeds)
    pub name: Option<String>,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
    /// Typing debounce state for this connection
    pub typing: TypingState,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ConnectionId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            name: None,
            sender,
            typing: TypingState::default(),
        }
    }

    /// Queue a message for this client without blocking
    ///
    /// Delivery is best-effort: a closed channel means the client is gone,
    /// a full one means it is too slow to keep up. Broadcasts ignore both.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
            mpsc::error::TrySendError::Full(_) => SendError::ChannelFull,
        })
    }

    /// Check if this client has claimed a name (completed the join)
    pub fn has_joined(&self) -> bool {
        self.name.is_some()
    }

    /// Bind the claimed name to this session
    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let client = Client::new(ConnectionId::new(), tx);

        assert!(client.name.is_none());
        assert!(!client.has_joined());
        assert!(!client.typing.is_active());
    }

    #[tokio::test]
    async fn test_client_set_name() {
        let (tx, _rx) = mpsc::channel(32);
        let mut client = Client::new(ConnectionId::new(), tx);

        client.set_name("alice".to_string());

        assert!(client.has_joined());
        assert_eq!(client.name.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_send_to_closed_channel_fails() {
        let (tx, rx) = mpsc::channel(32);
        let client = Client::new(ConnectionId::new(), tx);
        drop(rx);

        let result = client.send(ServerMessage::SystemMessage {
            text: "alice joined".to_string(),
        });
        assert!(matches!(result, Err(SendError::ChannelClosed)));
    }
}
