//! RocksDB-backed project/version document store.
//!
//! Column families:
//! - `projects` — full project documents (bincode, LZ4 compressed)
//! - `versions` — immutable version snapshots (bincode, LZ4 compressed),
//!   keyed by `project_id (16B) : version_number (8B BE)` for prefix scans
//!
//! Reference: Kleppmann — DDIA, Chapter 3 (LSM Trees, SSTables)

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::model::{Project, ProjectVersion, VersionSummary};

const CF_PROJECTS: &str = "projects";
const CF_VERSIONS: &str = "versions";

const COLUMN_FAMILIES: &[&str] = &[CF_PROJECTS, CF_VERSIONS];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("aura_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches, temp directory).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            bloom_filter_bits: 10,
            max_open_files: 64,
            write_buffer_size: 1024 * 1024,
        }
    }
}

/// Storage errors.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// RocksDB internal error
    Database(String),
    /// Project or version record not found
    NotFound(String),
    /// Serialization failed
    Serialization(String),
    /// Deserialization failed
    Deserialization(String),
    /// Decompression failed
    Compression(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {e}"),
            StoreError::NotFound(what) => write!(f, "Not found: {what}"),
            StoreError::Serialization(e) => write!(f, "Serialization error: {e}"),
            StoreError::Deserialization(e) => write!(f, "Deserialization error: {e}"),
            StoreError::Compression(e) => write!(f, "Compression error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

fn encode_doc<T: Serialize>(doc: &T) -> Result<Vec<u8>, StoreError> {
    let raw = bincode::serde::encode_to_vec(doc, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&raw))
}

fn decode_doc<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let raw = lz4_flex::decompress_size_prepended(bytes)
        .map_err(|e| StoreError::Compression(e.to_string()))?;
    let (doc, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;
    Ok(doc)
}

/// Composite key for the versions CF: project id prefix + big-endian version.
fn version_key(project_id: Uuid, version_number: u64) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..16].copy_from_slice(project_id.as_bytes());
    key[16..].copy_from_slice(&version_number.to_be_bytes());
    key
}

/// RocksDB-backed document store for projects and version snapshots.
///
/// Single-threaded RocksDB mode; callers serialize access behind `Arc` and
/// the async layer. Project updates are read-modify-write without a
/// compare-and-swap on `version` — last writer wins, by design of the
/// source system.
pub struct ProjectStore {
    db: DBWithThreadMode<SingleThreaded>,
}

impl ProjectStore {
    /// Open the store at the configured path, creating it if missing.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        Ok(Self { db })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);

        // Documents are LZ4-compressed before insertion; skip double work.
        opts.set_compression_type(DBCompressionType::None);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_PROJECTS => {
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            CF_VERSIONS => {
                // Prefix-scanned by the 16-byte project id.
                opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(16));
            }
            _ => {}
        }

        opts
    }

    fn projects_cf(&self) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(CF_PROJECTS)
            .ok_or_else(|| StoreError::Database("missing projects CF".to_string()))
    }

    fn versions_cf(&self) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(CF_VERSIONS)
            .ok_or_else(|| StoreError::Database("missing versions CF".to_string()))
    }

    // ─── Projects ─────────────────────────────────────────────────────

    /// Write a full project document (create or replace).
    pub fn put_project(&self, project: &Project) -> Result<(), StoreError> {
        let cf = self.projects_cf()?;
        self.db
            .put_cf(cf, project.id.as_bytes(), encode_doc(project)?)?;
        Ok(())
    }

    /// Load a project by id.
    pub fn load_project(&self, project_id: Uuid) -> Result<Project, StoreError> {
        let cf = self.projects_cf()?;
        let bytes = self
            .db
            .get_cf(cf, project_id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(format!("project {project_id}")))?;
        decode_doc(&bytes)
    }

    /// Read-modify-write a project document in one call.
    ///
    /// No compare-and-swap: if two callers race, the last `put` wins and the
    /// first caller's write is silently lost.
    pub fn update_project<F>(&self, project_id: Uuid, mutate: F) -> Result<Project, StoreError>
    where
        F: FnOnce(&mut Project),
    {
        let mut project = self.load_project(project_id)?;
        mutate(&mut project);
        self.put_project(&project)?;
        Ok(project)
    }

    /// All project ids in the store.
    pub fn list_projects(&self) -> Result<Vec<Uuid>, StoreError> {
        let cf = self.projects_cf()?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            if key.len() == 16 {
                let mut buf = [0u8; 16];
                buf.copy_from_slice(&key);
                ids.push(Uuid::from_bytes(buf));
            }
        }
        Ok(ids)
    }

    /// Delete a project and all of its version records in one atomic batch.
    pub fn delete_project(&self, project_id: Uuid) -> Result<(), StoreError> {
        let projects = self.projects_cf()?;
        let versions = self.versions_cf()?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(projects, project_id.as_bytes());
        for item in self
            .db
            .prefix_iterator_cf(versions, project_id.as_bytes())
        {
            let (key, _) = item?;
            if !key.starts_with(project_id.as_bytes()) {
                break;
            }
            batch.delete_cf(versions, key);
        }
        self.db.write(batch)?;
        Ok(())
    }

    // ─── Version snapshots ────────────────────────────────────────────

    /// Append an immutable version snapshot.
    pub fn put_version(&self, version: &ProjectVersion) -> Result<(), StoreError> {
        let cf = self.versions_cf()?;
        let key = version_key(version.project_id, version.version_number);
        self.db.put_cf(cf, key, encode_doc(version)?)?;
        Ok(())
    }

    /// Load one full version snapshot.
    pub fn load_version(
        &self,
        project_id: Uuid,
        version_number: u64,
    ) -> Result<ProjectVersion, StoreError> {
        let cf = self.versions_cf()?;
        let key = version_key(project_id, version_number);
        let bytes = self.db.get_cf(cf, key)?.ok_or_else(|| {
            StoreError::NotFound(format!("version {version_number} of project {project_id}"))
        })?;
        decode_doc(&bytes)
    }

    /// Metadata for every version of a project, newest first.
    ///
    /// Full payloads are decoded but only summaries are returned; bulk
    /// listings never hand out snapshot data.
    pub fn list_versions(&self, project_id: Uuid) -> Result<Vec<VersionSummary>, StoreError> {
        let cf = self.versions_cf()?;
        let mut summaries = Vec::new();
        let start = version_key(project_id, u64::MAX);
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Reverse));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(project_id.as_bytes()) {
                break;
            }
            let version: ProjectVersion = decode_doc(&value)?;
            summaries.push(VersionSummary::from(&version));
        }
        Ok(summaries)
    }

    /// Number of version records stored for a project.
    pub fn count_versions(&self, project_id: Uuid) -> Result<usize, StoreError> {
        let cf = self.versions_cf()?;
        let mut count = 0;
        for item in self.db.prefix_iterator_cf(cf, project_id.as_bytes()) {
            let (key, _) = item?;
            if !key.starts_with(project_id.as_bytes()) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}
