//! # aura-collab — real-time sync & versioning engine for a floor-plan editor
//!
//! Many clients view and mutate a shared, deeply nested floor-plan document;
//! this crate keeps every client's view consistent and maintains a durable,
//! restorable edit history.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌──────────────┐
//! │ CollabClient │ ◄────────────────► │ CollabServer │
//! │ (per user)   │    Binary Proto    │ (central)    │
//! └─────────────┘                    └──────┬───────┘
//!                                           │ per project
//!                        ┌──────────────────┼─────────────────┐
//!                        ▼                  ▼                 ▼
//!                 ┌────────────┐    ┌──────────────┐   ┌────────────┐
//!                 │ RoomGroup  │    │ Telemetry    │   │ Command    │
//!                 │ (fan-out)  │    │ Registry     │   │ Interpreter│
//!                 └────────────┘    └──────────────┘   └─────┬──────┘
//!                                                           │
//!                                          ┌────────────────┼──────────┐
//!                                          ▼                ▼          ▼
//!                                   ┌────────────┐   ┌────────────┐ opaque
//!                                   │ Mutation   │   │ Version    │ completion
//!                                   │ Engine     │   │ Ledger     │ service
//!                                   └────────────┘   └─────┬──────┘
//!                                                          ▼
//!                                                   ┌──────────────┐
//!                                                   │ ProjectStore │
//!                                                   │ (RocksDB)    │
//!                                                   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`model`] — shared project/level/wall data model and version records
//! - [`protocol`] — binary wire protocol (bincode-encoded events)
//! - [`broadcast`] — room fan-out groups and the room registry
//! - [`engine`] — geometry mutation engine over a closed command set
//! - [`interpreter`] — chat-command classification and completion parsing
//! - [`ledger`] — append-only version ledger (save / restore / list)
//! - [`storage`] — RocksDB-backed project & version document store
//! - [`telemetry`] — per-project synthetic sensor timers
//! - [`server`] — WebSocket session server
//! - [`client`] — WebSocket client for front-ends and tests
//!
//! ## Consistency model
//!
//! Persistence is last-writer-wins: saves are read-modify-write with no
//! compare-and-swap on the version counter, so concurrent editors on the
//! same project can silently clobber each other while both append ledger
//! entries. This matches the upstream system and is a documented hazard,
//! not an accident; see the `ledger` and `storage` module docs.
//!
//! Reference: Kleppmann — Designing Data-Intensive Applications, Chapter 5

pub mod broadcast;
pub mod client;
pub mod engine;
pub mod interpreter;
pub mod ledger;
pub mod model;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod telemetry;

// Re-exports for convenience
pub use broadcast::{RoomFrame, RoomGroup, RoomRegistry, RoomStats};
pub use client::{CollabClient, CollabEvent, ConnectionState};
pub use engine::{apply, DesignCommand, EngineError, WallPatch};
pub use interpreter::{
    classify, strip_trigger, CommandClass, CommandInterpreter, CompletionError,
    CompletionMode, CompletionRequest, CompletionService, ImpactSummary, Interpretation,
    InterpreterError, SolutionCandidate, TRIGGER,
};
pub use ledger::{LedgerError, VersionLedger};
pub use model::{
    ChatAuthor, ChatMessage, Collaborator, CollaboratorRole, Identity, InfrastructureElement,
    Level, PlacedModel, Placement, PlacementKind, Point, Project, ProjectData, ProjectVersion,
    Room, VersionKind, VersionSummary, Wall, Zone,
};
pub use protocol::{ClientEvent, ProtocolError, ServerEvent};
pub use server::{CollabServer, ServerConfig, ServerStats};
pub use storage::{ProjectStore, StoreConfig, StoreError};
pub use telemetry::{TelemetryRegistry, DEFAULT_TELEMETRY_INTERVAL};
