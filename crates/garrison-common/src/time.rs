//! ---
//! gsn_section: "01-shared-runtime"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Shared primitives and utilities for the fleet runtime."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};

/// Render a timestamp as a filesystem-safe slug (`YYYYMMDD-HHMMSS`).
///
/// Snapshot directories are qualified with this so that repeated backups
/// of the same owner never collide.
pub fn timestamp_slug(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d-%H%M%S").to_string()
}

/// Slug for the current instant.
pub fn now_slug() -> String {
    timestamp_slug(Utc::now())
}
