//! WebSocket client for the session server.
//!
//! Used by front-ends and by the integration suite. Provides connection
//! lifecycle, typed event send helpers, and a channel of decoded server
//! events.

use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::model::{Identity, Point, ProjectData};
use crate::protocol::{ClientEvent, ProtocolError, ServerEvent};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events surfaced to the application.
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// Connection established and identity presented.
    Connected,
    /// Connection lost.
    Disconnected,
    /// A decoded server event.
    Server(ServerEvent),
}

/// The collaboration client.
pub struct CollabClient {
    identity: Identity,
    server_url: String,
    state: Arc<RwLock<ConnectionState>>,
    /// Channel to the WebSocket writer task.
    outgoing_tx: Option<mpsc::Sender<Vec<u8>>>,
    /// Event receiver handed to the application.
    event_rx: Option<mpsc::Receiver<CollabEvent>>,
    event_tx: mpsc::Sender<CollabEvent>,
}

impl CollabClient {
    pub fn new(identity: Identity, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            identity,
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<CollabEvent>> {
        self.event_rx.take()
    }

    /// Connect and present this client's identity.
    ///
    /// Spawns reader/writer tasks for the socket.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.server_url)
            .await
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outgoing frames to the socket.
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(bytes) = out_rx.recv().await {
                if ws_writer.send(Message::Binary(bytes.into())).await.is_err() {
                    break;
                }
            }
            // Channel closed — tell the server we are gone.
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        // Identity goes first; everything else is rejected until it lands.
        self.send(&ClientEvent::Authenticate {
            identity: self.identity.clone(),
        })
        .await?;

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(CollabEvent::Connected).await;

        // Reader task: decode server frames into application events.
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        match ServerEvent::decode(&bytes) {
                            Ok(event) => {
                                if event_tx.send(CollabEvent::Server(event)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => log::warn!("Undecodable server frame: {e}"),
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(CollabEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Encode and queue one client event.
    pub async fn send(&self, event: &ClientEvent) -> Result<(), ProtocolError> {
        let bytes = event.encode()?;
        let tx = self
            .outgoing_tx
            .as_ref()
            .ok_or(ProtocolError::ConnectionClosed)?;
        tx.send(bytes)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    pub async fn join_project(&self, project_id: Uuid) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::JoinProject { project_id }).await
    }

    pub async fn leave_project(&self, project_id: Uuid) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::LeaveProject { project_id }).await
    }

    pub async fn send_chat(
        &self,
        project_id: Uuid,
        body: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::ChatMessage {
            project_id,
            body: body.into(),
        })
        .await
    }

    pub async fn send_cursor(
        &self,
        project_id: Uuid,
        position: Point,
    ) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::CursorMove {
            project_id,
            position,
        })
        .await
    }

    pub async fn send_selection(
        &self,
        project_id: Uuid,
        selection: Vec<String>,
    ) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::ObjectSelection {
            project_id,
            selection,
        })
        .await
    }

    pub async fn send_geometry(
        &self,
        project_id: Uuid,
        updated: ProjectData,
    ) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::GeometryUpdate {
            project_id,
            updated,
        })
        .await
    }

    /// Close the connection by dropping the writer channel.
    pub async fn disconnect(&mut self) {
        self.outgoing_tx = None;
        *self.state.write().await = ConnectionState::Disconnected;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}
