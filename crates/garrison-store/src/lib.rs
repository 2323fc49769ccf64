//! ---
//! gsn_section: "02-fleet-data"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Fleet records and configuration-store bindings."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Fleet data model and the configuration-store collaborator.
//!
//! The store is the source of truth for [`ServerRecord`]s, keyed by
//! server name. Cluster manifests live next to the cluster tree on disk
//! and carry the ordered server list that default port derivation
//! depends on.

/// Result alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for the store subsystem.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Wrapper for IO errors encountered while reading/writing records.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// A settings patch was not a JSON object.
    #[error("settings patch must be a JSON object")]
    InvalidPatch,
}

pub mod json_store;
pub mod manifest;
pub mod records;

pub use json_store::{ConfigStore, JsonFileStore};
pub use manifest::{load_cluster_manifest, save_cluster_manifest, CLUSTER_MANIFEST_FILE};
pub use records::{ClusterRecord, PortAllocationMode, PortTriple, ServerRecord};
