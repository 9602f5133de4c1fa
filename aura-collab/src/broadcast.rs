//! Room-scoped fan-out for server events.
//!
//! Every project with at least one connected member has a `RoomGroup`: a
//! tokio broadcast channel carrying pre-encoded frames plus a membership
//! map. Frames optionally name an origin connection so high-frequency
//! presence events (cursor, selection) are not echoed back to their sender,
//! while chat, geometry, and telemetry reach the whole room.
//!
//! `RoomRegistry` maps project ids to room groups — an explicit object
//! owned by the server, injected where needed, never ambient state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::model::Identity;
use crate::protocol::{ProtocolError, ServerEvent};

/// A frame queued for delivery to room members.
#[derive(Debug)]
pub struct RoomFrame {
    /// Connection that produced the frame; that connection skips delivery.
    /// `None` delivers to everyone, sender included.
    pub origin: Option<Uuid>,
    /// Pre-encoded `ServerEvent`.
    pub bytes: Vec<u8>,
}

/// Statistics for monitoring room health.
#[derive(Debug, Clone, Default)]
pub struct RoomStats {
    pub frames_sent: u64,
    pub active_members: usize,
}

/// Fan-out group for a single project room.
pub struct RoomGroup {
    sender: broadcast::Sender<Arc<RoomFrame>>,
    /// Connected members: connection id → identity.
    members: Arc<RwLock<HashMap<Uuid, Identity>>>,
    capacity: usize,
    frames_sent: AtomicU64,
}

impl RoomGroup {
    /// Create a group buffering up to `capacity` frames per receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            members: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            frames_sent: AtomicU64::new(0),
        }
    }

    /// Add a member; returns the receiver for that connection.
    pub async fn join(
        &self,
        conn_id: Uuid,
        identity: Identity,
    ) -> broadcast::Receiver<Arc<RoomFrame>> {
        self.members.write().await.insert(conn_id, identity);
        self.sender.subscribe()
    }

    /// Remove a member. Safe to call for connections that never joined.
    pub async fn leave(&self, conn_id: &Uuid) -> Option<Identity> {
        self.members.write().await.remove(conn_id)
    }

    /// Broadcast an event to the room.
    ///
    /// Returns the number of receivers the frame reached (zero when the
    /// room has no live subscribers).
    pub fn broadcast(
        &self,
        event: &ServerEvent,
        origin: Option<Uuid>,
    ) -> Result<usize, ProtocolError> {
        let bytes = event.encode()?;
        let count = self
            .sender
            .send(Arc::new(RoomFrame { origin, bytes }))
            .unwrap_or(0);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(count)
    }

    /// Current member count.
    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    /// Identities of all connected members.
    pub async fn members(&self) -> Vec<Identity> {
        self.members.read().await.values().cloned().collect()
    }

    /// Statistics snapshot.
    pub async fn stats(&self) -> RoomStats {
        RoomStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            active_members: self.members.read().await.len(),
        }
    }

    /// Channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe without joining (used by the telemetry tests).
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RoomFrame>> {
        self.sender.subscribe()
    }
}

/// Registry of project rooms, keyed by project id.
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<Uuid, Arc<RoomGroup>>>>,
    default_capacity: usize,
}

impl RoomRegistry {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            default_capacity,
        }
    }

    /// Get or create the room for a project.
    pub async fn get_or_create(&self, project_id: Uuid) -> Arc<RoomGroup> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(&project_id) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        // Double-check after acquiring the write lock.
        if let Some(room) = rooms.get(&project_id) {
            return room.clone();
        }
        let room = Arc::new(RoomGroup::new(self.default_capacity));
        rooms.insert(project_id, room.clone());
        room
    }

    /// Look up a room without creating one.
    pub async fn get(&self, project_id: Uuid) -> Option<Arc<RoomGroup>> {
        self.rooms.read().await.get(&project_id).cloned()
    }

    /// Remove the room if it has no members. Returns true when removed.
    pub async fn remove_if_empty(&self, project_id: &Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(project_id) {
            if room.member_count().await == 0 {
                rooms.remove(project_id);
                return true;
            }
        }
        false
    }

    /// Number of active rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Project ids with an active room.
    pub async fn active_projects(&self) -> Vec<Uuid> {
        self.rooms.read().await.keys().cloned().collect()
    }
}
