//! Shared data model for collaborative floor-plan projects.
//!
//! A `Project` is the aggregate root: an ordered list of levels (stories),
//! site-context collections, a monotonically increasing version counter, a
//! chat log, and a role-tagged collaborator list. Walls, rooms, placements,
//! and placed models live inside a level; their string ids are opaque and
//! scoped to that level, never globally unique.
//!
//! `ProjectVersion` is the immutable snapshot record appended by the version
//! ledger. Its `data` field holds a full copy of the project's mutable
//! geometry/context fields as they existed under `version_number`.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Seconds since the Unix epoch.
pub(crate) fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A verified caller identity, as handed to the session layer.
///
/// Token verification happens upstream; by the time an `Identity` reaches
/// this crate it is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub name: String,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    pub fn with_id(user_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
        }
    }
}

/// Role granted to a non-owner collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorRole {
    /// May mutate geometry and restore versions.
    Editor,
    /// Read-only access.
    Viewer,
}

/// A non-owner identity granted access to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: Uuid,
    pub role: CollaboratorRole,
}

/// 2D point in plan coordinates (centimeters).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A straight wall segment between two endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wall {
    pub id: String,
    pub start: Point,
    pub end: Point,
    /// Wall thickness in plan units.
    pub thickness: f32,
    /// Wall height in plan units.
    pub height: f32,
}

/// A named room bounded by a set of walls in the same level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub wall_ids: Vec<String>,
}

/// Kind of opening anchored to a host wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementKind {
    Door,
    Window,
}

/// A door or window opening, positioned fractionally along its host wall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub id: String,
    pub kind: PlacementKind,
    /// Host wall id, resolved within the same level.
    pub wall_id: String,
    /// Fractional position along the wall, in [0, 1].
    pub position_ratio: f32,
    pub width: f32,
    pub height: f32,
}

/// A catalogue model (furniture, fixture) placed on a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedModel {
    pub id: String,
    pub catalog_key: String,
    pub position: Point,
    /// Rotation around the vertical axis, degrees.
    pub rotation: f32,
}

/// One story of a project.
///
/// The level is the scoping boundary for entity ids: every wall id referenced
/// by a room, placement, or model must resolve within this level.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub name: String,
    pub walls: Vec<Wall>,
    pub rooms: Vec<Room>,
    pub placements: Vec<Placement>,
    pub models: Vec<PlacedModel>,
}

impl Level {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn wall(&self, id: &str) -> Option<&Wall> {
        self.walls.iter().find(|w| w.id == id)
    }

    pub fn wall_mut(&mut self, id: &str) -> Option<&mut Wall> {
        self.walls.iter_mut().find(|w| w.id == id)
    }

    pub fn model_mut(&mut self, id: &str) -> Option<&mut PlacedModel> {
        self.models.iter_mut().find(|m| m.id == id)
    }

    /// True if `id` is taken by any entity in this level.
    pub fn id_in_use(&self, id: &str) -> bool {
        self.walls.iter().any(|w| w.id == id)
            || self.rooms.iter().any(|r| r.id == id)
            || self.placements.iter().any(|p| p.id == id)
            || self.models.iter().any(|m| m.id == id)
    }

    /// Generate a fresh entity id with the given prefix, unique within this
    /// level. Ids are opaque strings; a UUID suffix makes collisions
    /// vanishingly rare, and the loop guarantees uniqueness regardless.
    pub fn fresh_id(&self, prefix: &str) -> String {
        loop {
            let candidate = format!("{prefix}_{}", Uuid::new_v4().simple());
            if !self.id_in_use(&candidate) {
                return candidate;
            }
        }
    }
}

/// A site zone carried as project context (setbacks, garden, parking).
///
/// Zones are never touched by geometry commands; they ride along in
/// snapshots and restores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub category: String,
    pub boundary: Vec<Point>,
}

/// A service line carried as project context (plumbing, electrical).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureElement {
    pub id: String,
    pub kind: String,
    pub path: Vec<Point>,
}

/// The mutable geometry/context fields of a project.
///
/// This is the unit the mutation engine operates on and the payload a
/// `ProjectVersion` snapshot stores in full.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
    /// Ordered list of stories, ground floor first.
    pub levels: Vec<Level>,
    pub zones: Vec<Zone>,
    pub infrastructure: Vec<InfrastructureElement>,
}

impl ProjectData {
    /// Total wall count across all levels.
    pub fn wall_count(&self) -> usize {
        self.levels.iter().map(|l| l.walls.len()).sum()
    }

    /// All wall ids across all levels, level order preserved.
    pub fn wall_ids(&self) -> Vec<String> {
        self.levels
            .iter()
            .flat_map(|l| l.walls.iter().map(|w| w.id.clone()))
            .collect()
    }

    /// True if `token` names a wall or placed model anywhere in the project.
    pub fn references_entity(&self, token: &str) -> bool {
        self.levels.iter().any(|l| {
            l.walls.iter().any(|w| w.id == token)
                || l.models.iter().any(|m| m.id == token)
        })
    }
}

/// Who authored a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChatAuthor {
    User { user_id: Uuid, name: String },
    Assistant,
}

/// One entry in a project's chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub author: ChatAuthor,
    pub body: String,
    /// Seconds since the Unix epoch.
    pub sent_at: u64,
}

impl ChatMessage {
    pub fn from_user(identity: &Identity, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author: ChatAuthor::User {
                user_id: identity.user_id,
                name: identity.name.clone(),
            },
            body: body.into(),
            sent_at: now_epoch_secs(),
        }
    }

    pub fn from_assistant(body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author: ChatAuthor::Assistant,
            body: body.into(),
            sent_at: now_epoch_secs(),
        }
    }
}

/// The project aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    /// Owner identity; always has full access.
    pub owner: Uuid,
    pub collaborators: Vec<Collaborator>,
    pub data: ProjectData,
    /// Strictly increases by exactly 1 per successful mutating save,
    /// including restores. Never decreases.
    pub version: u64,
    pub chat_log: Vec<ChatMessage>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Project {
    pub fn new(name: impl Into<String>, owner: Uuid, data: ProjectData) -> Self {
        let now = now_epoch_secs();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner,
            collaborators: Vec::new(),
            data,
            version: 1,
            chat_log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn role_of(&self, user_id: Uuid) -> Option<CollaboratorRole> {
        self.collaborators
            .iter()
            .find(|c| c.user_id == user_id)
            .map(|c| c.role)
    }

    /// Owner or any collaborator.
    pub fn can_view(&self, user_id: Uuid) -> bool {
        self.owner == user_id || self.role_of(user_id).is_some()
    }

    /// Owner or an `editor` collaborator.
    pub fn can_edit(&self, user_id: Uuid) -> bool {
        self.owner == user_id || self.role_of(user_id) == Some(CollaboratorRole::Editor)
    }
}

/// Whether a version was cut by an explicit user action or by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionKind {
    Manual,
    Auto,
}

/// Immutable snapshot record of a project's mutable fields.
///
/// Never mutated after creation; deleted only when the owning project is
/// deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectVersion {
    pub project_id: Uuid,
    pub version_number: u64,
    pub commit_message: String,
    pub kind: VersionKind,
    /// Full copy of the mutable geometry/context fields under
    /// `version_number`.
    pub data: ProjectData,
    /// Set when this version was produced by restoring an earlier one.
    pub restored_from: Option<u64>,
    pub created_at: u64,
}

/// Metadata-only view of a version, for bulk listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version_number: u64,
    pub commit_message: String,
    pub kind: VersionKind,
    pub restored_from: Option<u64>,
    pub created_at: u64,
}

impl From<&ProjectVersion> for VersionSummary {
    fn from(v: &ProjectVersion) -> Self {
        Self {
            version_number: v.version_number,
            commit_message: v.commit_message.clone(),
            kind: v.kind,
            restored_from: v.restored_from,
            created_at: v.created_at,
        }
    }
}
