//! ChatHub actor implementation
//!
//! The central actor owning all state: connected clients, the name
//! registry, and per-connection typing state. Uses the Actor pattern with
//! mpsc channels for message passing; processing one command at a time
//! makes every registry mutation plus its broadcasts one critical section.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::AppError;
use crate::message::{display_timestamp, ServerMessage};
use crate::registry::NameRegistry;
use crate::types::ConnectionId;

/// Quiet period after which a typing connection is considered stopped
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(1000);

/// Commands sent from handlers (and timer tasks) to the ChatHub actor
#[derive(Debug)]
pub enum HubCommand {
    /// New client connected
    Connect {
        connection_id: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Client disconnected
    Disconnect {
        connection_id: ConnectionId,
    },
    /// Claim a display name
    Join {
        connection_id: ConnectionId,
        name: String,
    },
    /// Send a chat message
    Chat {
        connection_id: ConnectionId,
        user: String,
        text: String,
    },
    /// Client signalled typing activity
    Typing {
        connection_id: ConnectionId,
    },
    /// Client explicitly stopped typing
    StopTyping {
        connection_id: ConnectionId,
    },
    /// Internal: a typing expiry timer fired without being re-armed
    TypingExpired {
        connection_id: ConnectionId,
    },
}

/// The main ChatHub actor
///
/// Manages all state and processes commands from connection handlers.
/// Holds a sender to its own command channel so typing expiry timers can
/// post back into the same serialized event loop.
pub struct ChatHub {
    /// All connected clients: ConnectionId -> Client
    clients: HashMap<ConnectionId, Client>,
    /// Claimed display names
    registry: NameRegistry,
    /// Command receiver channel
    receiver: mpsc::Receiver<HubCommand>,
    /// Handle to our own command channel, for timer tasks
    self_tx: mpsc::Sender<HubCommand>,
    /// Typing debounce window
    typing_timeout: Duration,
}

impl ChatHub {
    /// Create a new ChatHub and the sender half of its command channel
    pub fn new(capacity: usize) -> (mpsc::Sender<HubCommand>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let hub = Self {
            clients: HashMap::new(),
            registry: NameRegistry::new(),
            receiver: rx,
            self_tx: tx.clone(),
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
        };
        (tx, hub)
    }

    /// Override the typing debounce window
    pub fn with_typing_timeout(mut self, timeout: Duration) -> Self {
        self.typing_timeout = timeout;
        self
    }

    /// Run the ChatHub event loop
    ///
    /// Continuously receives and processes commands until all senders are
    /// dropped. Note the hub keeps a sender to itself, so shutdown is
    /// normally driven by dropping the hub task.
    pub async fn run(mut self) {
        info!("ChatHub started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatHub shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect { connection_id, sender } => {
                self.handle_connect(connection_id, sender);
            }
            HubCommand::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id);
            }
            HubCommand::Join { connection_id, name } => {
                self.handle_join(connection_id, name);
            }
            HubCommand::Chat { connection_id, user, text } => {
                self.handle_chat(connection_id, user, text);
            }
            HubCommand::Typing { connection_id } => {
                self.handle_typing(connection_id);
            }
            HubCommand::StopTyping { connection_id } => {
                self.handle_stop_typing(connection_id);
            }
            HubCommand::TypingExpired { connection_id } => {
                self.handle_typing_expired(connection_id);
            }
        }
    }

    /// Handle new client connection
    fn handle_connect(&mut self, connection_id: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        info!("Client {} connected", connection_id);
        let client = Client::new(connection_id, sender);
        self.clients.insert(connection_id, client);
        debug!(
            "Total clients: {}, joined: {}",
            self.clients.len(),
            self.registry.len()
        );
    }

    /// Handle client disconnection
    ///
    /// Removing the client first makes a duplicate disconnect a no-op, and
    /// cancelling its timer guarantees no stale expiry fires afterwards.
    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        let Some(mut client) = self.clients.remove(&connection_id) else {
            return;
        };
        info!("Client {} disconnected", connection_id);

        let was_typing = client.typing.quiesce();

        if let Some(name) = self.registry.release(connection_id) {
            if was_typing {
                self.broadcast_all(ServerMessage::StopTyping { name: name.clone() });
            }
            self.broadcast_all(ServerMessage::SystemMessage {
                text: format!("{} left the chat", name),
            });
            self.broadcast_all(ServerMessage::ActiveUsers {
                users: self.registry.names(),
            });
        }

        debug!(
            "Total clients: {}, joined: {}",
            self.clients.len(),
            self.registry.len()
        );
    }

    /// Handle a join attempt
    ///
    /// On success emits, in order: login_success to the sender, the join
    /// announcement to everyone else, and the presence snapshot to everyone.
    fn handle_join(&mut self, connection_id: ConnectionId, name: String) {
        let Some(client) = self.clients.get(&connection_id) else {
            return;
        };

        let name = name.trim();
        if name.is_empty() {
            let _ = client.send(AppError::EmptyName.into());
            return;
        }

        // One name per session; re-joining is not supported
        if client.has_joined() {
            let _ = client.send(AppError::AlreadyJoined.into());
            return;
        }

        if !self.registry.try_claim(connection_id, name) {
            debug!("Client {} join rejected, '{}' is taken", connection_id, name);
            let _ = client.send(AppError::NameTaken.into());
            return;
        }

        let name = name.to_string();
        if let Some(client) = self.clients.get_mut(&connection_id) {
            client.set_name(name.clone());
        }
        info!("Client {} joined as '{}'", connection_id, name);

        self.send_to(
            connection_id,
            ServerMessage::LoginSuccess { name: name.clone() },
        );
        self.broadcast_except(
            connection_id,
            ServerMessage::SystemMessage {
                text: format!("{} joined", name),
            },
        );
        self.broadcast_all(ServerMessage::ActiveUsers {
            users: self.registry.names(),
        });
    }

    /// Handle a chat message
    ///
    /// The author identity is the claimed name and the timestamp is
    /// assigned here, so every recipient (sender included) renders the
    /// identical message.
    fn handle_chat(&mut self, connection_id: ConnectionId, user: String, text: String) {
        let Some(client) = self.clients.get_mut(&connection_id) else {
            return;
        };

        let Some(author) = client.name.clone() else {
            let _ = client.send(AppError::NotJoined.into());
            return;
        };

        let text = text.trim().to_string();
        if text.is_empty() {
            let _ = client.send(AppError::EmptyMessage.into());
            return;
        }

        if user != author {
            warn!(
                "Client {} sent user '{}', broadcasting as claimed name '{}'",
                connection_id, user, author
            );
        }

        // A sent message ends the typing indicator for its author
        let was_typing = client.typing.quiesce();
        if was_typing {
            self.broadcast_except(
                connection_id,
                ServerMessage::StopTyping {
                    name: author.clone(),
                },
            );
        }

        self.broadcast_all(ServerMessage::ChatMessage {
            user: author,
            text,
            time: display_timestamp(),
        });
    }

    /// Handle a typing signal
    ///
    /// Pre-join signals are ignored. Emits `typing` only on the
    /// idle -> typing edge; every signal re-arms the single expiry timer.
    fn handle_typing(&mut self, connection_id: ConnectionId) {
        let Some(name) = self.registry.name_of(connection_id).map(str::to_string) else {
            return;
        };

        let timer = self.arm_typing_timer(connection_id);
        let Some(client) = self.clients.get_mut(&connection_id) else {
            return;
        };

        if client.typing.signal(timer) {
            self.broadcast_except(connection_id, ServerMessage::Typing { name });
        }
    }

    /// Handle an explicit stop-typing signal
    fn handle_stop_typing(&mut self, connection_id: ConnectionId) {
        self.stop_typing(connection_id);
    }

    /// Handle a fired expiry timer
    ///
    /// A timer that lost the race with a disconnect finds no client here
    /// and is a safe no-op.
    fn handle_typing_expired(&mut self, connection_id: ConnectionId) {
        self.stop_typing(connection_id);
    }

    /// Shared stop path: edge-triggered, notifies everyone but the typer
    fn stop_typing(&mut self, connection_id: ConnectionId) {
        let Some(client) = self.clients.get_mut(&connection_id) else {
            return;
        };

        if !client.typing.quiesce() {
            return;
        }

        let Some(name) = client.name.clone() else {
            return;
        };
        self.broadcast_except(connection_id, ServerMessage::StopTyping { name });
    }

    /// Spawn a single-shot expiry timer posting back into the command loop
    fn arm_typing_timer(&self, connection_id: ConnectionId) -> JoinHandle<()> {
        let tx = self.self_tx.clone();
        let window = self.typing_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(HubCommand::TypingExpired { connection_id }).await;
        })
    }

    /// Send a message to a single connection, best-effort
    fn send_to(&self, connection_id: ConnectionId, msg: ServerMessage) {
        if let Some(client) = self.clients.get(&connection_id) {
            if let Err(e) = client.send(msg) {
                debug!("Dropped message for {}: {}", connection_id, e);
            }
        }
    }

    /// Send a message to every connected client, best-effort per recipient
    fn broadcast_all(&self, msg: ServerMessage) {
        for client in self.clients.values() {
            if let Err(e) = client.send(msg.clone()) {
                debug!("Dropped broadcast for {}: {}", client.id, e);
            }
        }
    }

    /// Send a message to every connected client except `skip`
    fn broadcast_except(&self, skip: ConnectionId, msg: ServerMessage) {
        for client in self.clients.values() {
            if client.id == skip {
                continue;
            }
            if let Err(e) = client.send(msg.clone()) {
                debug!("Dropped broadcast for {}: {}", client.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Spawn a hub with a short test window and return its command sender
    fn start_hub() -> mpsc::Sender<HubCommand> {
        let (tx, hub) = ChatHub::new(64);
        tokio::spawn(hub.with_typing_timeout(Duration::from_millis(100)).run());
        tx
    }

    /// Register a fake client and return its id and outbound receiver
    async fn connect(tx: &mpsc::Sender<HubCommand>) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let connection_id = ConnectionId::new();
        let (sender, receiver) = mpsc::channel(64);
        tx.send(HubCommand::Connect { connection_id, sender })
            .await
            .unwrap();
        (connection_id, receiver)
    }

    async fn join(tx: &mpsc::Sender<HubCommand>, connection_id: ConnectionId, name: &str) {
        tx.send(HubCommand::Join {
            connection_id,
            name: name.to_string(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_join_emits_to_correct_audiences() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;
        let (b, mut b_rx) = connect(&tx).await;

        join(&tx, a, "alice").await;

        // Sender: login_success then the snapshot, no self join announcement
        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::LoginSuccess { name }) if name == "alice"
        ));
        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::ActiveUsers { users }) if users == vec!["alice"]
        ));

        // Everyone else: announcement then the snapshot
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::SystemMessage { text }) if text == "alice joined"
        ));
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::ActiveUsers { users }) if users == vec!["alice"]
        ));

        join(&tx, b, "bob").await;
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::LoginSuccess { name }) if name == "bob"
        ));
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::ActiveUsers { users }) if users == vec!["alice", "bob"]
        ));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_then_retry_succeeds() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;
        let (b, mut b_rx) = connect(&tx).await;

        join(&tx, a, "alice").await;
        a_rx.recv().await;
        a_rx.recv().await;
        b_rx.recv().await;
        b_rx.recv().await;

        join(&tx, b, "alice").await;
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::LoginFailed { reason }) if reason == "Username is already taken."
        ));

        // Connection stays un-joined and may retry with a different name
        join(&tx, b, "bob").await;
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::LoginSuccess { name }) if name == "bob"
        ));
    }

    #[tokio::test]
    async fn test_empty_name_rejected_without_side_effects() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;
        let (_b, mut b_rx) = connect(&tx).await;

        join(&tx, a, "   ").await;
        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::LoginFailed { reason }) if reason == "Username cannot be empty."
        ));

        // The other client saw nothing: its next message is a's real join
        join(&tx, a, "alice").await;
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::SystemMessage { text }) if text == "alice joined"
        ));
    }

    #[tokio::test]
    async fn test_second_join_rejected() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;

        join(&tx, a, "alice").await;
        a_rx.recv().await;
        a_rx.recv().await;

        join(&tx, a, "alice2").await;
        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::Error { message, .. }) if message.contains("already joined")
        ));
    }

    #[tokio::test]
    async fn test_chat_broadcast_includes_sender_with_identical_time() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;
        let (b, mut b_rx) = connect(&tx).await;

        join(&tx, a, "alice").await;
        a_rx.recv().await;
        a_rx.recv().await;
        b_rx.recv().await;
        b_rx.recv().await;

        tx.send(HubCommand::Chat {
            connection_id: a,
            user: "alice".to_string(),
            text: "hi".to_string(),
        })
        .await
        .unwrap();

        let Some(ServerMessage::ChatMessage { user, text, time }) = a_rx.recv().await else {
            panic!("sender did not receive its own message");
        };
        assert_eq!(user, "alice");
        assert_eq!(text, "hi");

        let Some(ServerMessage::ChatMessage { time: b_time, .. }) = b_rx.recv().await else {
            panic!("peer did not receive the message");
        };
        assert_eq!(time, b_time);
    }

    #[tokio::test]
    async fn test_chat_author_is_claimed_name_not_payload() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;

        join(&tx, a, "alice").await;
        a_rx.recv().await;
        a_rx.recv().await;

        tx.send(HubCommand::Chat {
            connection_id: a,
            user: "mallory".to_string(),
            text: "hi".to_string(),
        })
        .await
        .unwrap();

        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::ChatMessage { user, .. }) if user == "alice"
        ));
    }

    #[tokio::test]
    async fn test_chat_before_join_rejected() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;
        let (_b, mut b_rx) = connect(&tx).await;

        tx.send(HubCommand::Chat {
            connection_id: a,
            user: "ghost".to_string(),
            text: "hi".to_string(),
        })
        .await
        .unwrap();

        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::Error { code: crate::message::ErrorCode::NotJoined, .. })
        ));

        // Nothing was broadcast
        join(&tx, a, "alice").await;
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::SystemMessage { text }) if text == "alice joined"
        ));
    }

    #[tokio::test]
    async fn test_empty_chat_text_rejected() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;

        join(&tx, a, "alice").await;
        a_rx.recv().await;
        a_rx.recv().await;

        tx.send(HubCommand::Chat {
            connection_id: a,
            user: "alice".to_string(),
            text: "   ".to_string(),
        })
        .await
        .unwrap();

        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::Error { code: crate::message::ErrorCode::EmptyMessage, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_debounce_single_start_and_stop() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;
        let (_b, mut b_rx) = connect(&tx).await;

        join(&tx, a, "alice").await;
        a_rx.recv().await;
        a_rx.recv().await;
        b_rx.recv().await;
        b_rx.recv().await;

        // Rapid signals within the window
        for _ in 0..3 {
            tx.send(HubCommand::Typing { connection_id: a }).await.unwrap();
        }

        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::Typing { name }) if name == "alice"
        ));

        // No duplicate start: the next event is the debounced stop
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::StopTyping { name }) if name == "alice"
        ));
    }

    #[tokio::test]
    async fn test_explicit_stop_typing() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;
        let (_b, mut b_rx) = connect(&tx).await;

        join(&tx, a, "alice").await;
        a_rx.recv().await;
        a_rx.recv().await;
        b_rx.recv().await;
        b_rx.recv().await;

        tx.send(HubCommand::Typing { connection_id: a }).await.unwrap();
        tx.send(HubCommand::StopTyping { connection_id: a }).await.unwrap();

        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::Typing { name }) if name == "alice"
        ));
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::StopTyping { name }) if name == "alice"
        ));
    }

    #[tokio::test]
    async fn test_stop_typing_without_typing_is_silent() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;
        let (_b, mut b_rx) = connect(&tx).await;

        join(&tx, a, "alice").await;
        a_rx.recv().await;
        a_rx.recv().await;
        b_rx.recv().await;
        b_rx.recv().await;

        tx.send(HubCommand::StopTyping { connection_id: a }).await.unwrap();

        // Nothing was emitted: the next thing b sees is a chat message
        tx.send(HubCommand::Chat {
            connection_id: a,
            user: "alice".to_string(),
            text: "hi".to_string(),
        })
        .await
        .unwrap();
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::ChatMessage { .. })
        ));
    }

    #[tokio::test]
    async fn test_chat_clears_typing_indicator() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;
        let (_b, mut b_rx) = connect(&tx).await;

        join(&tx, a, "alice").await;
        a_rx.recv().await;
        a_rx.recv().await;
        b_rx.recv().await;
        b_rx.recv().await;

        tx.send(HubCommand::Typing { connection_id: a }).await.unwrap();
        tx.send(HubCommand::Chat {
            connection_id: a,
            user: "alice".to_string(),
            text: "hi".to_string(),
        })
        .await
        .unwrap();

        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::Typing { .. })
        ));
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::StopTyping { .. })
        ));
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::ChatMessage { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_typing_timer_and_frees_name() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;
        let (b, mut b_rx) = connect(&tx).await;

        join(&tx, a, "alice").await;
        join(&tx, b, "bob").await;
        // Each side sees its own join replies plus the other's announcement pair
        for _ in 0..4 {
            a_rx.recv().await;
            b_rx.recv().await;
        }

        tx.send(HubCommand::Typing { connection_id: b }).await.unwrap();
        tx.send(HubCommand::Disconnect { connection_id: b }).await.unwrap();

        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::Typing { name }) if name == "bob"
        ));
        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::StopTyping { name }) if name == "bob"
        ));
        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::SystemMessage { text }) if text == "bob left the chat"
        ));
        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::ActiveUsers { users }) if users == vec!["alice"]
        ));

        // The freed name is claimable again
        let (c, mut c_rx) = connect(&tx).await;
        join(&tx, c, "bob").await;
        assert!(matches!(
            c_rx.recv().await,
            Some(ServerMessage::LoginSuccess { name }) if name == "bob"
        ));
    }

    #[tokio::test]
    async fn test_disconnect_before_join_is_silent() {
        let tx = start_hub();
        let (a, _a_rx) = connect(&tx).await;
        let (b, mut b_rx) = connect(&tx).await;

        tx.send(HubCommand::Disconnect { connection_id: a }).await.unwrap();

        // No announcement: b's next message is c's join
        let (c, _c_rx) = connect(&tx).await;
        join(&tx, c, "carol").await;
        assert!(matches!(
            b_rx.recv().await,
            Some(ServerMessage::SystemMessage { text }) if text == "carol joined"
        ));
    }

    #[tokio::test]
    async fn test_duplicate_disconnect_announces_once() {
        let tx = start_hub();
        let (a, mut a_rx) = connect(&tx).await;
        let (b, mut b_rx) = connect(&tx).await;

        join(&tx, a, "alice").await;
        join(&tx, b, "bob").await;
        // Drain a's own join replies plus bob's join announcement pair
        for _ in 0..4 {
            a_rx.recv().await;
        }

        tx.send(HubCommand::Disconnect { connection_id: b }).await.unwrap();
        tx.send(HubCommand::Disconnect { connection_id: b }).await.unwrap();

        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::SystemMessage { text }) if text == "bob left the chat"
        ));
        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::ActiveUsers { users }) if users == vec!["alice"]
        ));

        // No second announcement: next event is a fresh join
        let (c, _c_rx) = connect(&tx).await;
        join(&tx, c, "carol").await;
        assert!(matches!(
            a_rx.recv().await,
            Some(ServerMessage::SystemMessage { text }) if text == "carol joined"
        ));
    }
}
