//! ---
//! gsn_section: "07-host-preflight"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Host resource inspection for preflight checks."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Host resource inspection.
//!
//! Provisioning a server pulls a multi-gigabyte application tree, so the
//! orchestrator asks this crate for a disk/memory/tool report before it
//! commits to anything. The report is plain data; policy lives in the
//! threshold helpers.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sysinfo::{Disks, System};
use tracing::debug;

/// Result alias used throughout the preflight crate.
pub type Result<T> = std::result::Result<T, PreflightError>;

/// Error type for host inspection.
#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    /// No mounted filesystem covers the requested path.
    #[error("no mounted filesystem covers {0}")]
    NoFilesystem(PathBuf),
}

/// Rough size of one installed server tree. Used to decide whether a
/// provisioning run can fit at all.
pub const INSTALL_SIZE_ESTIMATE_BYTES: u64 = 30 * 1024 * 1024 * 1024;

/// Memory below which a host is flagged as tight for one more server.
pub const MEMORY_HEADROOM_BYTES: u64 = 12 * 1024 * 1024 * 1024;

/// Snapshot of the host resources relevant to provisioning.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    /// Path the disk figures were resolved for.
    pub fleet_root: PathBuf,
    /// Free space on the filesystem backing `fleet_root`.
    pub available_disk_bytes: u64,
    /// Total physical memory.
    pub total_memory_bytes: u64,
    /// Currently available memory.
    pub available_memory_bytes: u64,
    /// Whether the fetch tool executable was found at the given path.
    pub tool_available: bool,
}

impl ResourceReport {
    /// True when `count` fresh installs fit on disk.
    pub fn has_disk_for_installs(&self, count: usize) -> bool {
        let needed = INSTALL_SIZE_ESTIMATE_BYTES.saturating_mul(count as u64);
        self.available_disk_bytes >= needed
    }

    /// True when the host has comfortable memory headroom for one more
    /// running server.
    pub fn memory_headroom(&self) -> bool {
        self.available_memory_bytes >= MEMORY_HEADROOM_BYTES
    }
}

/// Inspect the host: disk space backing `fleet_root`, memory, and
/// whether the fetch tool is present at `tool_path`.
pub fn inspect(fleet_root: &Path, tool_path: Option<&Path>) -> Result<ResourceReport> {
    let available_disk_bytes = available_space_for(fleet_root)?;

    let mut system = System::new();
    system.refresh_memory();

    let report = ResourceReport {
        fleet_root: fleet_root.to_path_buf(),
        available_disk_bytes,
        total_memory_bytes: system.total_memory(),
        available_memory_bytes: system.available_memory(),
        tool_available: tool_path.map(|p| p.exists()).unwrap_or(false),
    };
    debug!(
        fleet_root = %report.fleet_root.display(),
        disk_free_gib = report.available_disk_bytes / (1024 * 1024 * 1024),
        mem_free_gib = report.available_memory_bytes / (1024 * 1024 * 1024),
        tool = report.tool_available,
        "host inspected"
    );
    Ok(report)
}

/// Free bytes on the filesystem with the longest mount point covering
/// `path`. The path itself does not need to exist yet.
fn available_space_for(path: &Path) -> Result<u64> {
    let disks = Disks::new_with_refreshed_list();
    let mut best: Option<(usize, u64)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if path.starts_with(mount) {
            let depth = mount.components().count();
            if best.map(|(d, _)| depth > d).unwrap_or(true) {
                best = Some((depth, disk.available_space()));
            }
        }
    }
    best.map(|(_, space)| space)
        .ok_or_else(|| PreflightError::NoFilesystem(path.to_path_buf()))
}
