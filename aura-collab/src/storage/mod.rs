//! Persistent document store for projects and their version history.
//!
//! Architecture:
//! ```text
//! ┌─────────────┐   save / restore   ┌──────────────┐
//! │ VersionLedger│ ─────────────────► │ ProjectStore │
//! └──────┬──────┘                    │ (RocksDB)    │
//!        │                           └──────┬───────┘
//!        │                                  │ column families
//!        ▼                                  ▼
//! ┌─────────────┐     ┌────────────────────────────────────────┐
//! │ CollabServer │     │ CF "projects" — full documents (LZ4)   │
//! │ (rooms)      │     │ CF "versions" — immutable snapshots,   │
//! └─────────────┘     │   keyed project_id:version, prefix-scan │
//!                     └────────────────────────────────────────┘
//! ```
//!
//! Documents are bincode-encoded and LZ4-compressed. Writes are
//! read-modify-write with no compare-and-swap: two concurrent savers on the
//! same project can silently overwrite each other (last writer wins). That
//! matches the upstream system and is covered by tests rather than "fixed".

pub mod store;

pub use store::{ProjectStore, StoreConfig, StoreError};
