//! WebSocket session server with project-room routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!             ├── RoomGroup (project_id) ── broadcast fan-out
//! Client B ──┘        │
//!                     ├── TelemetryRegistry (one timer per occupied room)
//!                     ├── CommandInterpreter ── CompletionService (opaque)
//!                     └── VersionLedger ── ProjectStore (RocksDB)
//! ```
//!
//! One task per connection multiplexes socket input against room output via
//! `tokio::select!`. Chat commands run fire-and-forget: the connection loop
//! never blocks on the completion service, and every interpreter or
//! mutation failure is converted into an assistant chat message — a broken
//! command must never drop a client's connection.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::broadcast::{RoomGroup, RoomRegistry};
use crate::engine;
use crate::interpreter::{
    strip_trigger, CommandInterpreter, CompletionService, Interpretation,
};
use crate::ledger::VersionLedger;
use crate::model::{ChatMessage, Identity, VersionKind};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::storage::{ProjectStore, StoreConfig, StoreError};
use crate::telemetry::{TelemetryRegistry, DEFAULT_TELEMETRY_INTERVAL};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
    /// Telemetry tick period
    pub telemetry_interval: Duration,
    /// Document store path
    pub storage_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9470".to_string(),
            broadcast_capacity: 256,
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
            storage_path: PathBuf::from("aura_data"),
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub commands_interpreted: u64,
    pub active_rooms: usize,
}

/// The collaborative session server.
pub struct CollabServer {
    config: ServerConfig,
    store: Arc<ProjectStore>,
    ledger: Arc<VersionLedger>,
    rooms: Arc<RoomRegistry>,
    telemetry: Arc<TelemetryRegistry>,
    interpreter: Arc<CommandInterpreter<dyn CompletionService>>,
    stats: Arc<RwLock<ServerStats>>,
}

impl CollabServer {
    /// Create a server, opening (or creating) the document store at the
    /// configured path.
    pub fn new(
        config: ServerConfig,
        completion: Arc<dyn CompletionService>,
    ) -> Result<Self, StoreError> {
        let store = Arc::new(ProjectStore::open(StoreConfig {
            path: config.storage_path.clone(),
            ..StoreConfig::default()
        })?);
        let ledger = Arc::new(VersionLedger::new(store.clone()));
        let rooms = Arc::new(RoomRegistry::new(config.broadcast_capacity));
        let telemetry = Arc::new(TelemetryRegistry::new(config.telemetry_interval));
        let interpreter = Arc::new(CommandInterpreter::new(completion));

        Ok(Self {
            config,
            store,
            ledger,
            rooms,
            telemetry,
            interpreter,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        })
    }

    /// Start listening for WebSocket connections.
    pub async fn run(
        self: Arc<Self>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Session server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, addr).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        log::info!("WebSocket connection established from {addr}");
        {
            let mut s = self.stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // Per-connection state
        let conn_id = Uuid::new_v4();
        let mut identity: Option<Identity> = None;
        let mut joined: Option<Uuid> = None;
        let mut room: Option<Arc<RoomGroup>> = None;
        let mut room_rx: Option<
            tokio::sync::broadcast::Receiver<Arc<crate::broadcast::RoomFrame>>,
        > = None;

        loop {
            tokio::select! {
                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            let event = match ClientEvent::decode(&bytes) {
                                Ok(event) => event,
                                Err(e) => {
                                    log::warn!("Undecodable frame from {addr}: {e}");
                                    continue;
                                }
                            };
                            self.stats.write().await.total_messages += 1;

                            match event {
                                ClientEvent::Authenticate { identity: verified } => {
                                    log::info!(
                                        "Connection {conn_id} authenticated as {} ({})",
                                        verified.name,
                                        verified.user_id
                                    );
                                    identity = Some(verified);
                                }

                                ClientEvent::JoinProject { project_id } => {
                                    let who = match identity.clone() {
                                        Some(who) => who,
                                        None => {
                                            send_event(
                                                &mut ws_sender,
                                                &ServerEvent::error(
                                                    "join_project requires authentication",
                                                ),
                                            )
                                            .await?;
                                            continue;
                                        }
                                    };

                                    // Joining a second project implies leaving
                                    // the first.
                                    if let (Some(prev_id), Some(prev_room)) =
                                        (joined.take(), room.take())
                                    {
                                        room_rx = None;
                                        self.depart(conn_id, prev_id, &prev_room).await;
                                    }

                                    let group = self.rooms.get_or_create(project_id).await;
                                    room_rx = Some(group.join(conn_id, who.clone()).await);
                                    joined = Some(project_id);
                                    room = Some(group.clone());

                                    send_event(
                                        &mut ws_sender,
                                        &ServerEvent::ProjectJoined { project_id },
                                    )
                                    .await?;

                                    // Chat history and telemetry both depend on a
                                    // store lookup; a failure here is logged and
                                    // the client simply receives neither.
                                    match self.store.load_project(project_id) {
                                        Ok(project) => {
                                            if project.data.wall_count() > 0 {
                                                self.telemetry
                                                    .ensure_started(
                                                        project_id,
                                                        self.store.clone(),
                                                        group.clone(),
                                                    )
                                                    .await;
                                            }

                                            send_event(
                                                &mut ws_sender,
                                                &ServerEvent::LoadChatHistory {
                                                    messages: project.chat_log.clone(),
                                                },
                                            )
                                            .await?;
                                        }
                                        Err(e) => {
                                            log::warn!(
                                                "Join lookup failed for project \
                                                 {project_id}: {e}"
                                            );
                                        }
                                    }

                                    self.stats.write().await.active_rooms =
                                        self.rooms.room_count().await;
                                    log::info!(
                                        "{} joined project {project_id}",
                                        who.name
                                    );
                                }

                                ClientEvent::LeaveProject { project_id } => {
                                    if joined == Some(project_id) {
                                        if let Some(group) = room.take() {
                                            joined = None;
                                            room_rx = None;
                                            self.depart(conn_id, project_id, &group).await;
                                        }
                                        self.stats.write().await.active_rooms =
                                            self.rooms.room_count().await;
                                    }
                                }

                                ClientEvent::ChatMessage { project_id, body } => {
                                    let (who, group) = match (identity.clone(), room.clone()) {
                                        (Some(who), Some(group))
                                            if joined == Some(project_id) =>
                                        {
                                            (who, group)
                                        }
                                        _ => {
                                            send_event(
                                                &mut ws_sender,
                                                &ServerEvent::error(
                                                    "chat_message requires a joined room",
                                                ),
                                            )
                                            .await?;
                                            continue;
                                        }
                                    };

                                    let message = ChatMessage::from_user(&who, &body);
                                    if let Err(e) = self.store.update_project(project_id, |p| {
                                        p.chat_log.push(message.clone())
                                    }) {
                                        log::warn!(
                                            "Chat persist failed for {project_id}: {e}"
                                        );
                                    }
                                    let _ = group.broadcast(
                                        &ServerEvent::ChatMessage { message },
                                        None,
                                    );

                                    // Assistant pipeline is fire-and-forget: the
                                    // sender does not block on the completion
                                    // service or the mutation.
                                    if let Some(instruction) = strip_trigger(&body) {
                                        self.stats.write().await.commands_interpreted += 1;
                                        let server = self.clone();
                                        let instruction = instruction.to_string();
                                        tokio::spawn(async move {
                                            server
                                                .run_assistant(
                                                    project_id, who, instruction, group,
                                                )
                                                .await;
                                        });
                                    }
                                }

                                ClientEvent::CursorMove { project_id, position } => {
                                    if let (Some(who), Some(group)) = (&identity, &room) {
                                        if joined == Some(project_id) {
                                            let _ = group.broadcast(
                                                &ServerEvent::CursorUpdate {
                                                    user_id: who.user_id,
                                                    position,
                                                },
                                                Some(conn_id),
                                            );
                                        }
                                    }
                                }

                                ClientEvent::ObjectSelection { project_id, selection } => {
                                    if let (Some(who), Some(group)) = (&identity, &room) {
                                        if joined == Some(project_id) {
                                            let _ = group.broadcast(
                                                &ServerEvent::SelectionUpdate {
                                                    user_id: who.user_id,
                                                    selection,
                                                },
                                                Some(conn_id),
                                            );
                                        }
                                    }
                                }

                                ClientEvent::GeometryUpdate { project_id, updated } => {
                                    let (who, group) = match (identity.clone(), room.clone()) {
                                        (Some(who), Some(group))
                                            if joined == Some(project_id) =>
                                        {
                                            (who, group)
                                        }
                                        _ => {
                                            send_event(
                                                &mut ws_sender,
                                                &ServerEvent::error(
                                                    "geometry_update requires a joined room",
                                                ),
                                            )
                                            .await?;
                                            continue;
                                        }
                                    };

                                    match self.ledger.save(
                                        project_id,
                                        &who,
                                        updated,
                                        "Geometry update",
                                        VersionKind::Auto,
                                    ) {
                                        Ok(saved) => {
                                            let _ = group.broadcast(
                                                &ServerEvent::GeometryUpdate {
                                                    project_id,
                                                    data: saved.data,
                                                    version: saved.version,
                                                },
                                                None,
                                            );
                                        }
                                        Err(e) => {
                                            send_event(
                                                &mut ws_sender,
                                                &ServerEvent::error(e.to_string()),
                                            )
                                            .await?;
                                        }
                                    }
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                // Outgoing room frame
                frame = async {
                    match room_rx {
                        Some(ref mut rx) => rx.recv().await,
                        // Not in a room yet — wait forever.
                        None => std::future::pending().await,
                    }
                } => {
                    match frame {
                        Ok(frame) => {
                            if frame.origin == Some(conn_id) {
                                continue; // presence echo suppression
                            }
                            ws_sender
                                .send(Message::Binary(frame.bytes.clone().into()))
                                .await?;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("Connection {conn_id} lagged by {n} frames");
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        // Cleanup: disconnect counts as leaving.
        if let (Some(project_id), Some(group)) = (joined, room) {
            self.depart(conn_id, project_id, &group).await;
        }
        {
            let mut s = self.stats.write().await;
            s.active_connections -= 1;
            s.active_rooms = self.rooms.room_count().await;
        }

        Ok(())
    }

    /// Remove a connection from a room; when the room empties, cancel its
    /// telemetry timer and drop the room.
    async fn depart(&self, conn_id: Uuid, project_id: Uuid, group: &Arc<RoomGroup>) {
        group.leave(&conn_id).await;
        if group.member_count().await == 0 {
            self.telemetry.cancel(&project_id).await;
            self.rooms.remove_if_empty(&project_id).await;
            log::info!("Room {project_id} removed (empty)");
        }
    }

    /// The assistant pipeline behind a triggered chat message.
    ///
    /// Every exit posts exactly one assistant chat message to the room —
    /// the narrative on success, the error text otherwise.
    async fn run_assistant(
        self: Arc<Self>,
        project_id: Uuid,
        caller: Identity,
        instruction: String,
        room: Arc<RoomGroup>,
    ) {
        let project = match self.store.load_project(project_id) {
            Ok(p) => p,
            Err(e) => {
                self.post_assistant(project_id, &room, e.to_string()).await;
                return;
            }
        };

        match self.interpreter.interpret(&instruction, &project.data).await {
            Ok(Interpretation::Action { command, narrative }) => {
                if !command.mutates() {
                    self.post_assistant(project_id, &room, narrative).await;
                    return;
                }

                let mut data = project.data.clone();
                if let Err(e) = engine::apply(&mut data, &command) {
                    self.post_assistant(project_id, &room, e.to_string()).await;
                    return;
                }

                match self.ledger.save(
                    project_id,
                    &caller,
                    data,
                    command.describe(),
                    VersionKind::Auto,
                ) {
                    Ok(saved) => {
                        let _ = room.broadcast(
                            &ServerEvent::GeometryUpdate {
                                project_id,
                                data: saved.data,
                                version: saved.version,
                            },
                            None,
                        );
                        self.post_assistant(project_id, &room, narrative).await;
                    }
                    Err(e) => {
                        self.post_assistant(project_id, &room, e.to_string()).await;
                    }
                }
            }

            Ok(Interpretation::Solutions { narrative, candidates }) => {
                // Candidate fixes are surfaced for manual selection only;
                // no geometry changes here.
                let _ = room.broadcast(
                    &ServerEvent::SamaranganSolutions {
                        solutions: candidates,
                    },
                    None,
                );
                self.post_assistant(project_id, &room, narrative).await;
            }

            Err(e) => {
                self.post_assistant(project_id, &room, e.to_string()).await;
            }
        }
    }

    /// Append one assistant message to the chat log and broadcast it.
    async fn post_assistant(&self, project_id: Uuid, room: &Arc<RoomGroup>, body: String) {
        let message = ChatMessage::from_assistant(body);
        if let Err(e) = self
            .store
            .update_project(project_id, |p| p.chat_log.push(message.clone()))
        {
            log::warn!("Assistant chat persist failed for {project_id}: {e}");
        }
        let _ = room.broadcast(&ServerEvent::ChatMessage { message }, None);
    }

    /// Server statistics snapshot.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// The configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn store(&self) -> &Arc<ProjectStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<VersionLedger> {
        &self.ledger
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn telemetry(&self) -> &Arc<TelemetryRegistry> {
        &self.telemetry
    }
}

/// Encode and send one server event on a connection's own socket.
async fn send_event<S>(
    sender: &mut S,
    event: &ServerEvent,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let bytes = event.encode()?;
    sender.send(Message::Binary(bytes.into())).await?;
    Ok(())
}
