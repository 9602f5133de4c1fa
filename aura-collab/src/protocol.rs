//! Binary wire protocol between clients and the session server.
//!
//! Events are serde enums encoded with bincode and carried in WebSocket
//! binary frames:
//! ```text
//! Client ──ClientEvent──► Server        Server ──ServerEvent──► Room
//!   authenticate / join / leave           project_joined / chat history
//!   chat / cursor / selection             chat / geometry / solutions
//!   geometry_update                       cursor / selection / iot / error
//! ```
//!
//! Identity is presented once per connection (`Authenticate`) and is treated
//! as pre-verified; joining a project without it is rejected with
//! `ErrorMessage`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interpreter::SolutionCandidate;
use crate::model::{ChatMessage, Identity, Point, ProjectData};

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Present the connection's verified identity. Must precede any join.
    Authenticate { identity: Identity },
    /// Join the room for a project.
    JoinProject { project_id: Uuid },
    /// Leave the room for a project.
    LeaveProject { project_id: Uuid },
    /// Post a chat message; a leading trigger marker invokes the assistant.
    ChatMessage { project_id: Uuid, body: String },
    /// High-frequency cursor position update.
    CursorMove { project_id: Uuid, position: Point },
    /// Current object selection (entity ids).
    ObjectSelection {
        project_id: Uuid,
        selection: Vec<String>,
    },
    /// Push a full replacement of the project's mutable geometry fields.
    GeometryUpdate {
        project_id: Uuid,
        updated: ProjectData,
    },
}

/// Messages the server sends to room members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// Join acknowledged.
    ProjectJoined { project_id: Uuid },
    /// Existing chat history, sent once on join.
    LoadChatHistory { messages: Vec<ChatMessage> },
    /// A chat message (user or assistant) appended to the log.
    ChatMessage { message: ChatMessage },
    /// New authoritative geometry after a persisted mutation.
    GeometryUpdate {
        project_id: Uuid,
        data: ProjectData,
        version: u64,
    },
    /// Ranked candidate fixes for a complex change; applied only by a human.
    SamaranganSolutions { solutions: Vec<SolutionCandidate> },
    /// A peer's cursor moved.
    CursorUpdate { user_id: Uuid, position: Point },
    /// A peer's selection changed.
    SelectionUpdate {
        user_id: Uuid,
        selection: Vec<String>,
    },
    /// Synthetic sensor tick for one wall.
    IotDataUpdate { wall_id: String, stress_factor: f32 },
    /// Transport-level failure report.
    ErrorMessage { message: String },
}

impl ClientEvent {
    /// Serialize to the binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from the binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (event, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        Ok(event)
    }
}

impl ServerEvent {
    /// Serialize to the binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from the binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (event, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        Ok(event)
    }

    /// Convenience constructor for error reports.
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::ErrorMessage {
            message: message.into(),
        }
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Serialization(String),
    Deserialization(String),
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "Serialization error: {e}"),
            Self::Deserialization(e) => write!(f, "Deserialization error: {e}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChatAuthor, Level};

    #[test]
    fn test_client_event_roundtrip() {
        let identity = Identity::new("Asha");
        let event = ClientEvent::Authenticate {
            identity: identity.clone(),
        };
        let bytes = event.encode().unwrap();
        let decoded = ClientEvent::decode(&bytes).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_chat_event_roundtrip() {
        let event = ClientEvent::ChatMessage {
            project_id: Uuid::new_v4(),
            body: "@aura add a window on wall_12 at position 0.5".to_string(),
        };
        let decoded = ClientEvent::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_geometry_update_roundtrip() {
        let mut data = ProjectData::default();
        data.levels.push(Level::named("Ground"));
        let event = ServerEvent::GeometryUpdate {
            project_id: Uuid::new_v4(),
            data: data.clone(),
            version: 7,
        };
        match ServerEvent::decode(&event.encode().unwrap()).unwrap() {
            ServerEvent::GeometryUpdate {
                data: decoded,
                version,
                ..
            } => {
                assert_eq!(decoded, data);
                assert_eq!(version, 7);
            }
            other => panic!("Expected GeometryUpdate, got {other:?}"),
        }
    }

    #[test]
    fn test_chat_history_roundtrip() {
        let message = ChatMessage::from_assistant("Added a window to wall_12.");
        let event = ServerEvent::LoadChatHistory {
            messages: vec![message.clone()],
        };
        match ServerEvent::decode(&event.encode().unwrap()).unwrap() {
            ServerEvent::LoadChatHistory { messages } => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].author, ChatAuthor::Assistant);
                assert_eq!(messages[0].body, message.body);
            }
            other => panic!("Expected LoadChatHistory, got {other:?}"),
        }
    }

    #[test]
    fn test_iot_event_roundtrip() {
        let event = ServerEvent::IotDataUpdate {
            wall_id: "wall_12".to_string(),
            stress_factor: 0.42,
        };
        let decoded = ServerEvent::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(ClientEvent::decode(&[0xFF, 0xFE, 0xFD]).is_err());
        assert!(ServerEvent::decode(&[0xFF, 0xFE, 0xFD]).is_err());
    }
}
