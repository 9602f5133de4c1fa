//! Append-only version ledger over the project store.
//!
//! Versioning discipline ("commit before mutate"): a snapshot tagged with
//! version N holds the project's mutable fields *as they existed under*
//! version N, written just before the transition to N+1. The live project's
//! `version` only ever moves forward — restoring an old snapshot is itself a
//! new version, never a rewind.
//!
//! Concurrency: saves are read-modify-write with no compare-and-swap on
//! `version`. Two concurrent saves can interleave and silently clobber each
//! other while both append ledger entries; this matches the source system
//! and is exercised by tests rather than corrected.
//!
//! Authorization: mutating operations require the owner or an `editor`
//! collaborator; reads require the owner or any collaborator.

use std::sync::Arc;
use uuid::Uuid;

use crate::model::{
    now_epoch_secs, Identity, Project, ProjectData, ProjectVersion, VersionKind, VersionSummary,
};
use crate::storage::{ProjectStore, StoreError};

/// Ledger failures, mapped onto the crate-wide taxonomy.
#[derive(Debug, Clone)]
pub enum LedgerError {
    /// Missing project or version record.
    NotFound(String),
    /// Caller lacks the role the operation requires.
    Forbidden(String),
    /// Underlying storage failure.
    Store(StoreError),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::NotFound(what) => write!(f, "Not found: {what}"),
            LedgerError::Forbidden(why) => write!(f, "Forbidden: {why}"),
            LedgerError::Store(e) => write!(f, "Storage error: {e}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => LedgerError::NotFound(what),
            other => LedgerError::Store(other),
        }
    }
}

/// The version ledger: snapshot-then-apply saves, forward-only restores.
pub struct VersionLedger {
    store: Arc<ProjectStore>,
}

impl VersionLedger {
    pub fn new(store: Arc<ProjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ProjectStore> {
        &self.store
    }

    /// Create a project and its initial version record.
    pub fn create_project(
        &self,
        name: impl Into<String>,
        owner: &Identity,
        data: ProjectData,
    ) -> Result<Project, LedgerError> {
        let project = Project::new(name, owner.user_id, data);
        self.store.put_project(&project)?;
        self.store.put_version(&ProjectVersion {
            project_id: project.id,
            version_number: project.version,
            commit_message: "Initial version".to_string(),
            kind: VersionKind::Manual,
            data: project.data.clone(),
            restored_from: None,
            created_at: now_epoch_secs(),
        })?;
        Ok(project)
    }

    /// Load a project for a viewing caller.
    pub fn get_project(&self, project_id: Uuid, caller: &Identity) -> Result<Project, LedgerError> {
        let project = self.store.load_project(project_id)?;
        if !project.can_view(caller.user_id) {
            return Err(LedgerError::Forbidden(format!(
                "{} is not a collaborator on project {project_id}",
                caller.name
            )));
        }
        Ok(project)
    }

    /// Save new mutable fields onto a project.
    ///
    /// Order is load → snapshot current state under the current version →
    /// apply incoming fields → increment `version` → persist. The snapshot
    /// is skipped when a record for the current version already exists
    /// (creation and restore write their version records eagerly); records
    /// are never overwritten.
    pub fn save(
        &self,
        project_id: Uuid,
        caller: &Identity,
        incoming: ProjectData,
        commit_message: impl Into<String>,
        kind: VersionKind,
    ) -> Result<Project, LedgerError> {
        let mut project = self.store.load_project(project_id)?;
        if !project.can_edit(caller.user_id) {
            return Err(LedgerError::Forbidden(format!(
                "{} may not modify project {project_id}",
                caller.name
            )));
        }

        if self
            .store
            .load_version(project_id, project.version)
            .is_err()
        {
            self.store.put_version(&ProjectVersion {
                project_id,
                version_number: project.version,
                commit_message: commit_message.into(),
                kind,
                data: project.data.clone(),
                restored_from: None,
                created_at: now_epoch_secs(),
            })?;
        }

        project.data = incoming;
        project.version += 1;
        project.updated_at = now_epoch_secs();
        self.store.put_project(&project)?;
        Ok(project)
    }

    /// Restore a project to a previously recorded version.
    ///
    /// The target must belong to this project. Restoration moves forward:
    /// the live `version` increments and a fresh record tagged
    /// `restored_from` is appended; history is never rewound.
    pub fn restore(
        &self,
        project_id: Uuid,
        caller: &Identity,
        target_version: u64,
    ) -> Result<Project, LedgerError> {
        let mut project = self.store.load_project(project_id)?;
        if !project.can_edit(caller.user_id) {
            return Err(LedgerError::Forbidden(format!(
                "{} may not restore project {project_id}",
                caller.name
            )));
        }

        let snapshot = self.store.load_version(project_id, target_version)?;

        project.data = snapshot.data.clone();
        project.version += 1;
        project.updated_at = now_epoch_secs();
        self.store.put_project(&project)?;

        self.store.put_version(&ProjectVersion {
            project_id,
            version_number: project.version,
            commit_message: format!("Restored from version {target_version}"),
            kind: VersionKind::Manual,
            data: snapshot.data,
            restored_from: Some(target_version),
            created_at: now_epoch_secs(),
        })?;
        Ok(project)
    }

    /// Version metadata, newest first. Never returns snapshot payloads.
    pub fn list_versions(
        &self,
        project_id: Uuid,
        caller: &Identity,
    ) -> Result<Vec<VersionSummary>, LedgerError> {
        let project = self.store.load_project(project_id)?;
        if !project.can_view(caller.user_id) {
            return Err(LedgerError::Forbidden(format!(
                "{} may not read project {project_id}",
                caller.name
            )));
        }
        Ok(self.store.list_versions(project_id)?)
    }

    /// One full version record, payload included.
    pub fn get_version(
        &self,
        project_id: Uuid,
        caller: &Identity,
        version_number: u64,
    ) -> Result<ProjectVersion, LedgerError> {
        let project = self.store.load_project(project_id)?;
        if !project.can_view(caller.user_id) {
            return Err(LedgerError::Forbidden(format!(
                "{} may not read project {project_id}",
                caller.name
            )));
        }
        Ok(self.store.load_version(project_id, version_number)?)
    }

    /// Delete a project and cascade-delete its version history.
    pub fn delete_project(&self, project_id: Uuid, caller: &Identity) -> Result<(), LedgerError> {
        let project = self.store.load_project(project_id)?;
        if project.owner != caller.user_id {
            return Err(LedgerError::Forbidden(format!(
                "only the owner may delete project {project_id}"
            )));
        }
        Ok(self.store.delete_project(project_id)?)
    }
}
