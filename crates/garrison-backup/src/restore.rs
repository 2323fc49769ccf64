//! ---
//! gsn_section: "06-backup-restore"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Snapshot and restore of mutable save-state trees."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Tree restoration from a snapshot directory.

use std::path::Path;

use tracing::info;
use walkdir::WalkDir;

use crate::{BackupError, Result, SNAPSHOT_METADATA_FILE};

/// Recreate `target` from the snapshot at `source`. The metadata record
/// is stripped; everything else is copied verbatim.
pub(crate) fn restore_tree(owner: &str, source: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        return Err(BackupError::RestoreTargetExists(target.to_path_buf()));
    }
    if !source.exists() {
        return Err(BackupError::MissingOrigin(source.to_path_buf()));
    }

    std::fs::create_dir_all(target)?;
    let mut file_count = 0u64;
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(source)
            .expect("walk never leaves the source");
        if rel == Path::new(SNAPSHOT_METADATA_FILE) {
            continue;
        }
        let dest = target.join(rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(entry.path(), &dest)?;
        file_count += 1;
    }

    info!(owner = %owner, target = %target.display(), files = file_count, "restore complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seed_snapshot(source: &Path) {
        std::fs::create_dir_all(source.join("s1/ShooterGame/Saved")).unwrap();
        std::fs::write(source.join("s1/ShooterGame/Saved/world.ark"), b"save").unwrap();
        std::fs::write(source.join(SNAPSHOT_METADATA_FILE), b"{}").unwrap();
    }

    #[test]
    fn restore_recreates_tree_and_strips_metadata() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("snap");
        seed_snapshot(&source);
        let target = dir.path().join("alpha");

        restore_tree("alpha", &source, &target).unwrap();

        assert!(target.join("s1/ShooterGame/Saved/world.ark").exists());
        assert!(!target.join(SNAPSHOT_METADATA_FILE).exists());
    }

    #[test]
    fn restore_refuses_existing_target() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("snap");
        seed_snapshot(&source);
        let target = dir.path().join("alpha");
        std::fs::create_dir_all(&target).unwrap();

        assert!(matches!(
            restore_tree("alpha", &source, &target),
            Err(BackupError::RestoreTargetExists(_))
        ));
    }

    #[test]
    fn restore_requires_an_existing_snapshot() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            restore_tree("alpha", &dir.path().join("ghost"), &dir.path().join("alpha")),
            Err(BackupError::MissingOrigin(_))
        ));
    }
}
