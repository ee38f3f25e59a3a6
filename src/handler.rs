//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake,
//! message parsing, and bidirectional communication with the ChatHub.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::hub::HubCommand;
use crate::message::{ClientMessage, ServerMessage};
use crate::types::ConnectionId;

/// Handle a new TCP connection
///
/// Performs WebSocket handshake, sets up bidirectional communication,
/// and manages the connection lifecycle. Whichever way the connection
/// ends, exactly one Disconnect is posted to the hub.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<HubCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Generate connection ID
    let connection_id = ConnectionId::new();
    info!("Client {} connected from {}", connection_id, peer_addr);

    // Create channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

    // Register with ChatHub
    if cmd_tx
        .send(HubCommand::Connect {
            connection_id,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - hub closed", connection_id);
        return Err(AppError::ChannelSend);
    }

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (WebSocket -> HubCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => {
                            let cmd = client_message_to_command(connection_id, client_msg);
                            if cmd_tx_read.send(cmd).await.is_err() {
                                debug!("Hub closed, ending read task for {}", connection_id);
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Invalid JSON from {}: {}", connection_id, e);
                            // The hub never sees malformed frames; dropping
                            // them here keeps broadcast state untouched.
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", connection_id);
                    break;
                }
                Ok(Message::Ping(data)) => {
                    debug!("Ping from {}", connection_id);
                    // Pong is handled automatically by tungstenite
                    let _ = data; // Suppress unused warning
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", connection_id);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", connection_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", connection_id);
    });

    // Spawn write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for client");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", connection_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", connection_id);
        }
    }

    // Send disconnect command
    let _ = cmd_tx
        .send(HubCommand::Disconnect { connection_id })
        .await;

    info!("Client {} disconnected", connection_id);

    Ok(())
}

/// Convert a ClientMessage to a HubCommand
fn client_message_to_command(connection_id: ConnectionId, msg: ClientMessage) -> HubCommand {
    match msg {
        ClientMessage::Join { name } => HubCommand::Join { connection_id, name },
        ClientMessage::ChatMessage { user, text } => HubCommand::Chat {
            connection_id,
            user,
            text,
        },
        ClientMessage::Typing => HubCommand::Typing { connection_id },
        ClientMessage::StopTyping => HubCommand::StopTyping { connection_id },
    }
}
