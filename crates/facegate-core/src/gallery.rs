//! Enrollment registry.
//!
//! Holds every [`EnrolledFace`], active or revoked, in insertion order.
//! Writes go through a single lock so two enrollments can never interleave;
//! matching works on a cloned snapshot and never blocks writers for long.

use crate::types::{Embedding, EnrolledFace, DEFAULT_CONFIDENCE_MINIMUM};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::io::Write;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("embedding carries no face ({0})")]
    NoFace(String),
    #[error("confidence minimum {0} outside [0, 1]")]
    InvalidMinimum(f64),
    #[error("owner must not be empty")]
    EmptyOwner,
    #[error("snapshot version {0} not supported")]
    UnsupportedVersion(u32),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    records: Vec<EnrolledFace>,
}

#[derive(Debug, Default)]
pub struct Registry {
    records: RwLock<Vec<EnrolledFace>>,
    path: Option<PathBuf>,
    /// Held across snapshot, write and rename so saves land in order.
    save_lock: Mutex<()>,
}

impl Registry {
    /// Empty, memory-only registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the snapshot at `path`. A missing file yields an empty registry
    /// that will be written there on the first [`save`](Self::save).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, GalleryError> {
        let path = path.into();
        let records = match std::fs::read(&path) {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(GalleryError::UnsupportedVersion(snapshot.version));
                }
                snapshot.records
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(path = %path.display(), records = records.len(), "registry loaded");
        Ok(Self {
            records: RwLock::new(records),
            path: Some(path),
            save_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist to the load path. No-op for memory-only registries.
    ///
    /// Concurrent callers are serialized; the file on disk always reflects
    /// the registry state as of the last save to finish.
    pub fn save(&self) -> Result<(), GalleryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            records: self.read().clone(),
        };
        let dir = match path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(&snapshot)?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        tracing::debug!(path = %path.display(), records = snapshot.records.len(), "registry saved");
        Ok(())
    }

    /// Add a new active enrollment for `owner`.
    pub fn enroll(
        &self,
        owner: &str,
        label: &str,
        embedding: Embedding,
        confidence_minimum: Option<f64>,
    ) -> Result<EnrolledFace, GalleryError> {
        if owner.trim().is_empty() {
            return Err(GalleryError::EmptyOwner);
        }
        if !embedding.has_face() {
            return Err(GalleryError::NoFace(embedding.method.to_string()));
        }
        let minimum = confidence_minimum.unwrap_or(DEFAULT_CONFIDENCE_MINIMUM);
        if !(0.0..=1.0).contains(&minimum) {
            return Err(GalleryError::InvalidMinimum(minimum));
        }

        let method = embedding.method;
        let face = EnrolledFace {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            label: label.to_string(),
            embedding: Some(embedding),
            active: true,
            confidence_minimum: minimum,
            created_at: Utc::now().to_rfc3339(),
        };
        self.write().push(face.clone());

        tracing::info!(
            id = %face.id,
            owner,
            label,
            %method,
            "enrolled"
        );
        Ok(face)
    }

    /// Deactivate an enrollment. Returns false when the id is unknown or
    /// already revoked.
    pub fn revoke(&self, id: &str) -> bool {
        let mut records = self.write();
        match records.iter_mut().find(|r| r.id == id && r.active) {
            Some(record) => {
                record.active = false;
                tracing::info!(id, owner = %record.owner, "enrollment revoked");
                true
            }
            None => false,
        }
    }

    /// Active enrollments in insertion order: the gallery for one request.
    pub fn snapshot(&self) -> Vec<EnrolledFace> {
        self.read().iter().filter(|r| r.active).cloned().collect()
    }

    /// Every enrollment of `owner`, revoked ones included.
    pub fn list(&self, owner: &str) -> Vec<EnrolledFace> {
        self.read().iter().filter(|r| r.owner == owner).cloned().collect()
    }

    pub fn records(&self) -> Vec<EnrolledFace> {
        self.read().clone()
    }

    pub fn active_count(&self) -> usize {
        self.read().iter().filter(|r| r.active).count()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<EnrolledFace>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<EnrolledFace>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }
}
