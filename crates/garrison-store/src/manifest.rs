//! ---
//! gsn_section: "02-fleet-data"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Fleet records and configuration-store bindings."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Cluster manifests persisted next to the cluster tree.

use std::path::Path;

use tokio::fs;
use tracing::debug;

use crate::records::ClusterRecord;
use crate::Result;

/// Manifest file name inside a cluster directory.
pub const CLUSTER_MANIFEST_FILE: &str = "cluster.json";

/// Write the cluster manifest into the cluster directory.
pub async fn save_cluster_manifest(cluster_dir: &Path, record: &ClusterRecord) -> Result<()> {
    fs::create_dir_all(cluster_dir).await?;
    let path = cluster_dir.join(CLUSTER_MANIFEST_FILE);
    let serialized = serde_json::to_vec_pretty(record)?;
    fs::write(&path, serialized).await?;
    debug!(cluster = %record.name, path = %path.display(), "cluster manifest persisted");
    Ok(())
}

/// Load the cluster manifest from a cluster directory, `None` when the
/// directory carries none.
pub async fn load_cluster_manifest(cluster_dir: &Path) -> Result<Option<ClusterRecord>> {
    let path = cluster_dir.join(CLUSTER_MANIFEST_FILE);
    let raw = match fs::read(&path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    Ok(Some(serde_json::from_slice(&raw)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{PortAllocationMode, PortTriple, ServerRecord};
    use tempfile::tempdir;

    #[tokio::test]
    async fn manifest_round_trip() {
        let dir = tempdir().unwrap();
        let mut cluster = ClusterRecord::new("alpha", 7777, PortAllocationMode::Sequential);
        let mut server = ServerRecord::new("alpha-01", PortTriple::from_game(7777));
        server.cluster_id = "alpha".into();
        cluster.servers.push(server);

        save_cluster_manifest(dir.path(), &cluster).await.unwrap();
        let loaded = load_cluster_manifest(dir.path()).await.unwrap().unwrap();
        assert_eq!(loaded, cluster);
    }

    #[tokio::test]
    async fn missing_manifest_is_none() {
        let dir = tempdir().unwrap();
        assert!(load_cluster_manifest(dir.path()).await.unwrap().is_none());
    }
}
