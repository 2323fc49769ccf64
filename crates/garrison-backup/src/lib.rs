//! ---
//! gsn_section: "06-backup-restore"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Snapshot and restore of mutable save-state trees."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Backup/restore manager.
//!
//! Snapshots copy an owner's mutable save-state subtree (never the
//! installed binaries) into a timestamp-qualified directory with a
//! digest-carrying metadata record alongside. A process-wide guard set
//! allows at most one in-flight backup per owner name; restore carries
//! no equivalent guard, but refuses to overwrite an existing owner.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use garrison_common::config::BackupConfig;
use garrison_common::time::now_slug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

mod restore;
mod snapshot;

/// Result alias used throughout the backup crate.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Error type for the backup subsystem.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// A second backup for the same owner was requested while one is in flight.
    #[error("a backup for '{owner}' is already in flight")]
    ConcurrencyConflict {
        /// Owner whose backup is already running.
        owner: String,
    },
    /// The computed snapshot directory already exists; snapshots never overwrite.
    #[error("snapshot destination {0} already exists")]
    SnapshotExists(PathBuf),
    /// Restore refuses to overwrite an existing owner tree.
    #[error("restore target {0} already exists")]
    RestoreTargetExists(PathBuf),
    /// The owner directory to back up does not exist.
    #[error("backup origin {0} does not exist")]
    MissingOrigin(PathBuf),
    /// Filesystem access failed.
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    /// Metadata (de)serialization failed.
    #[error("metadata serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a snapshot keeps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionClass {
    /// The complete save-state subtree.
    FullTree,
    /// Save-state files capped at the newest N per server directory.
    StateOnly,
}

/// Metadata record written alongside every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMetadata {
    /// Cluster or standalone server the snapshot belongs to.
    pub owner_name: String,
    /// Timestamp-qualified snapshot directory name (`owner-timestamp`).
    pub snapshot_name: String,
    /// Directory the snapshot was taken from.
    pub origin_path: PathBuf,
    /// Directory the snapshot was written to.
    pub snapshot_path: PathBuf,
    /// What the snapshot keeps.
    pub retention_class: RetentionClass,
    /// When the snapshot was taken.
    pub created: DateTime<Utc>,
    /// Files copied.
    pub file_count: u64,
    /// Bytes copied.
    pub total_bytes: u64,
    /// SHA-256 over the record itself (with this field blank).
    pub digest: String,
}

/// Metadata file name inside a snapshot directory.
pub const SNAPSHOT_METADATA_FILE: &str = "backup-meta.json";

impl SnapshotMetadata {
    fn compute_digest(&self) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.digest = String::new();
        let serialized = serde_json::to_vec(&unsigned)?;
        let mut hasher = Sha256::new();
        hasher.update(serialized);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Verify the record against its embedded digest.
    pub fn verify(&self) -> bool {
        self.compute_digest()
            .map(|digest| digest == self.digest)
            .unwrap_or(false)
    }
}

/// Manager owning the guard set and retention policy.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
    state_files_per_server: usize,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

struct InFlightGuard {
    owner: String,
    set: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.owner);
    }
}

impl BackupManager {
    /// Build a manager from backup settings.
    pub fn from_config(config: &BackupConfig) -> Self {
        Self {
            root: config.root.clone(),
            state_files_per_server: config.state_files_per_server.max(1),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Default snapshot destination.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn acquire(&self, owner: &str) -> Result<InFlightGuard> {
        let mut set = self.in_flight.lock();
        if !set.insert(owner.to_owned()) {
            return Err(BackupError::ConcurrencyConflict {
                owner: owner.to_owned(),
            });
        }
        Ok(InFlightGuard {
            owner: owner.to_owned(),
            set: self.in_flight.clone(),
        })
    }

    /// Snapshot `origin` into a fresh timestamp-qualified directory under
    /// `destination` (or the configured root) and write the metadata
    /// record alongside.
    pub async fn backup(
        &self,
        owner: &str,
        origin: &Path,
        destination: Option<&Path>,
        class: RetentionClass,
    ) -> Result<SnapshotMetadata> {
        let _guard = self.acquire(owner)?;

        if !origin.exists() {
            return Err(BackupError::MissingOrigin(origin.to_path_buf()));
        }

        let snapshot_name = format!("{owner}-{}", now_slug());
        let snapshot_path = destination.unwrap_or(self.root.as_path()).join(&snapshot_name);
        if snapshot_path.exists() {
            return Err(BackupError::SnapshotExists(snapshot_path));
        }

        let (file_count, total_bytes) =
            snapshot::copy_snapshot_tree(origin, &snapshot_path, class, self.state_files_per_server)?;

        let mut metadata = SnapshotMetadata {
            owner_name: owner.to_owned(),
            snapshot_name,
            origin_path: origin.to_path_buf(),
            snapshot_path: snapshot_path.clone(),
            retention_class: class,
            created: Utc::now(),
            file_count,
            total_bytes,
            digest: String::new(),
        };
        metadata.digest = metadata.compute_digest()?;
        std::fs::write(
            snapshot_path.join(SNAPSHOT_METADATA_FILE),
            serde_json::to_vec_pretty(&metadata)?,
        )?;

        info!(
            owner = %owner,
            snapshot = %metadata.snapshot_name,
            files = file_count,
            bytes = total_bytes,
            class = ?class,
            "snapshot complete"
        );
        Ok(metadata)
    }

    /// Recreate an owner tree at `target` from a snapshot directory.
    /// Refuses when `target` already exists; the metadata record is not
    /// carried over.
    pub async fn restore(&self, owner: &str, source: &Path, target: &Path) -> Result<()> {
        restore::restore_tree(owner, source, target)
    }

    /// Enumerate snapshot metadata under the configured root. Corrupt
    /// entries are logged and skipped rather than failing the listing.
    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotMetadata>> {
        let mut snapshots = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(snapshots),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = entry?;
            let meta_path = entry.path().join(SNAPSHOT_METADATA_FILE);
            if !meta_path.is_file() {
                continue;
            }
            let raw = std::fs::read(&meta_path)?;
            match serde_json::from_slice::<SnapshotMetadata>(&raw) {
                Ok(metadata) => snapshots.push(metadata),
                Err(err) => {
                    warn!(path = %meta_path.display(), error = %err, "skipping unreadable snapshot metadata");
                }
            }
        }
        snapshots.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(snapshots)
    }
}
