//! ---
//! gsn_section: "06-backup-restore"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Snapshot and restore of mutable save-state trees."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Snapshot tree copying and retention.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::{Result, RetentionClass};

/// World-save file extension subject to the per-server retention cap.
const STATE_FILE_EXTENSION: &str = "ark";

/// Root-level artifacts that travel with the save state so a restored
/// tree is immediately usable.
const CARRIED_ARTIFACTS: [&str; 4] = [
    "cluster.json",
    "start_server.sh",
    "stop_server.sh",
    "stop_filter.sh",
];

/// Copy the backup-relevant subset of `origin` into `snapshot_path`.
/// Returns `(file_count, total_bytes)`.
pub(crate) fn copy_snapshot_tree(
    origin: &Path,
    snapshot_path: &Path,
    class: RetentionClass,
    keep_per_server: usize,
) -> Result<(u64, u64)> {
    let skip = match class {
        RetentionClass::StateOnly => stale_state_files(origin, keep_per_server)?,
        RetentionClass::FullTree => HashSet::new(),
    };

    std::fs::create_dir_all(snapshot_path)?;
    let mut file_count = 0u64;
    let mut total_bytes = 0u64;

    for entry in WalkDir::new(origin) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = path
            .strip_prefix(origin)
            .expect("walk never leaves the origin");
        if !is_backup_candidate(rel) {
            continue;
        }
        if skip.contains(path) {
            continue;
        }
        let dest = snapshot_path.join(rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        total_bytes += std::fs::copy(path, &dest)?;
        file_count += 1;
    }

    Ok((file_count, total_bytes))
}

/// Whether a file belongs in a snapshot: anything under a
/// `ShooterGame/Saved` subtree, plus the small generated artifacts.
/// Installed binaries never qualify.
fn is_backup_candidate(rel: &Path) -> bool {
    if in_save_state_subtree(rel) {
        return true;
    }
    rel.file_name()
        .and_then(|n| n.to_str())
        .map(|n| CARRIED_ARTIFACTS.contains(&n))
        .unwrap_or(false)
}

fn in_save_state_subtree(rel: &Path) -> bool {
    let components: Vec<&str> = rel
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    components
        .windows(2)
        .any(|pair| pair == ["ShooterGame", "Saved"])
}

/// World-save files beyond the newest `keep` per directory. Ordering is
/// by modification time with the file name as a deterministic tie-break.
fn stale_state_files(origin: &Path, keep: usize) -> Result<HashSet<PathBuf>> {
    let mut by_dir: HashMap<PathBuf, Vec<(SystemTime, PathBuf)>> = HashMap::new();
    for entry in WalkDir::new(origin) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(STATE_FILE_EXTENSION) {
            continue;
        }
        let modified = entry.metadata().map_err(std::io::Error::from)?.modified()?;
        let parent = path.parent().unwrap_or(origin).to_path_buf();
        by_dir
            .entry(parent)
            .or_default()
            .push((modified, path.to_path_buf()));
    }

    let mut stale = HashSet::new();
    for (_, mut files) in by_dir {
        files.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        if files.len() > keep {
            let excess = files.len() - keep;
            for (_, path) in files.into_iter().take(excess) {
                stale.insert(path);
            }
        }
    }
    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn lay_out_server(origin: &Path, server: &str) {
        let saved = origin.join(server).join("ShooterGame/Saved/SavedArks");
        std::fs::create_dir_all(&saved).unwrap();
        let binaries = origin.join(server).join("ShooterGame/Binaries/Win64");
        std::fs::create_dir_all(&binaries).unwrap();
        std::fs::write(binaries.join("ArkAscendedServer.exe"), b"binary").unwrap();
    }

    #[test]
    fn binaries_are_never_copied() {
        let dir = tempdir().unwrap();
        let origin = dir.path().join("alpha");
        lay_out_server(&origin, "alpha-01");
        std::fs::write(
            origin.join("alpha-01/ShooterGame/Saved/SavedArks/world.ark"),
            b"save",
        )
        .unwrap();
        std::fs::write(origin.join("cluster.json"), b"{}").unwrap();

        let snapshot = dir.path().join("snap");
        copy_snapshot_tree(&origin, &snapshot, RetentionClass::FullTree, 5).unwrap();

        assert!(snapshot
            .join("alpha-01/ShooterGame/Saved/SavedArks/world.ark")
            .exists());
        assert!(snapshot.join("cluster.json").exists());
        assert!(!snapshot
            .join("alpha-01/ShooterGame/Binaries/Win64/ArkAscendedServer.exe")
            .exists());
    }

    #[test]
    fn state_only_retention_keeps_newest_per_directory() {
        let dir = tempdir().unwrap();
        let origin = dir.path().join("alpha");
        lay_out_server(&origin, "alpha-01");
        let saved = origin.join("alpha-01/ShooterGame/Saved/SavedArks");
        for i in 1..=7 {
            std::fs::write(saved.join(format!("world-{i}.ark")), b"save").unwrap();
        }
        // A non-state file in the same directory is not subject to the cap.
        std::fs::write(saved.join("players.profile"), b"profile").unwrap();

        let snapshot = dir.path().join("snap");
        copy_snapshot_tree(&origin, &snapshot, RetentionClass::StateOnly, 5).unwrap();

        let copied = snapshot.join("alpha-01/ShooterGame/Saved/SavedArks");
        let mut names: Vec<String> = std::fs::read_dir(&copied)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "players.profile",
                "world-3.ark",
                "world-4.ark",
                "world-5.ark",
                "world-6.ark",
                "world-7.ark",
            ]
        );
    }

    #[test]
    fn retention_applies_per_server_directory() {
        let dir = tempdir().unwrap();
        let origin = dir.path().join("alpha");
        for server in ["alpha-01", "alpha-02"] {
            lay_out_server(&origin, server);
            let saved = origin.join(server).join("ShooterGame/Saved/SavedArks");
            for i in 1..=6 {
                std::fs::write(saved.join(format!("world-{i}.ark")), b"save").unwrap();
            }
        }

        let snapshot = dir.path().join("snap");
        copy_snapshot_tree(&origin, &snapshot, RetentionClass::StateOnly, 5).unwrap();

        for server in ["alpha-01", "alpha-02"] {
            let copied = snapshot.join(server).join("ShooterGame/Saved/SavedArks");
            assert_eq!(std::fs::read_dir(&copied).unwrap().count(), 5);
        }
    }
}
