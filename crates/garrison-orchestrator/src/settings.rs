//! ---
//! gsn_section: "01-orchestration"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Primary provisioning orchestration and lifecycle management."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Settings updates and artifact regeneration.

use std::path::PathBuf;

use garrison_launch::{write_start_script, write_stop_scripts};
use garrison_store::{load_cluster_manifest, save_cluster_manifest, ClusterRecord, ServerRecord};
use garrison_store::PortAllocationMode;
use tracing::info;

use crate::lifecycle::{dir_name, list_subdirs, Orchestrator};
use crate::{OrchestratorError, Result};

/// What to regenerate after a settings update.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsFlags {
    /// Re-run the configuration materializer.
    pub regenerate_configs: bool,
    /// Re-synthesize the start/stop artifacts.
    pub regenerate_scripts: bool,
}

/// Mutations applicable to a cluster record.
#[derive(Debug, Clone, Default)]
pub struct ClusterSettingsPatch {
    /// New description.
    pub description: Option<String>,
    /// New default port derivation strategy for future members.
    pub port_allocation_mode: Option<PortAllocationMode>,
    /// New base port for future members.
    pub base_port: Option<u16>,
}

impl Orchestrator {
    /// Shallow-merge `patch` over the persisted record (patch keys win),
    /// persist the result, and regenerate artifacts per `flags`.
    ///
    /// Lookup order: standalone storage first, then every cluster's
    /// server list. Cluster-owned servers also get their entry inside
    /// the owning cluster's manifest updated.
    pub async fn update_server_settings(
        &self,
        name: &str,
        patch: &serde_json::Value,
        flags: SettingsFlags,
    ) -> Result<ServerRecord> {
        let existing = match self.store().get_one(name).await? {
            Some(record) => record,
            None => self
                .find_in_cluster_manifests(name)
                .await?
                .ok_or_else(|| OrchestratorError::ServerNotFound(name.to_owned()))?,
        };

        let merged = existing.merged_with(patch)?;
        self.store().upsert(name, &merged).await?;

        let server_dir = if merged.is_clustered() {
            let cluster_dir = self.config().paths.cluster_dir(&merged.cluster_id);
            if let Some(mut manifest) = load_cluster_manifest(&cluster_dir).await? {
                if let Some(entry) = manifest.server_mut(name) {
                    *entry = merged.clone();
                    save_cluster_manifest(&cluster_dir, &manifest).await?;
                }
            }
            cluster_dir.join(name)
        } else {
            self.config().paths.standalone_server_dir(name)
        };

        if flags.regenerate_configs {
            self.materializer()
                .create_server_config(&server_dir, &merged)
                .await?;
        }
        if flags.regenerate_scripts {
            let cluster_dir = merged
                .is_clustered()
                .then(|| self.config().paths.cluster_dir(&merged.cluster_id));
            let mods = self.mod_resolver().resolve(&merged);
            write_start_script(&server_dir, &merged, cluster_dir.as_deref(), &mods).await?;
            write_stop_scripts(&server_dir, &merged.name).await?;
        }

        info!(
            server = %name,
            regenerate_configs = flags.regenerate_configs,
            regenerate_scripts = flags.regenerate_scripts,
            "server settings updated"
        );
        Ok(merged)
    }

    /// Mutate a cluster's own settings and persist its manifest.
    pub async fn update_cluster_settings(
        &self,
        name: &str,
        patch: ClusterSettingsPatch,
    ) -> Result<ClusterRecord> {
        let cluster_dir = self.config().paths.cluster_dir(name);
        let mut manifest = load_cluster_manifest(&cluster_dir)
            .await?
            .ok_or_else(|| OrchestratorError::OwnerNotFound(name.to_owned()))?;

        if let Some(description) = patch.description {
            manifest.description = description;
        }
        if let Some(mode) = patch.port_allocation_mode {
            manifest.port_allocation_mode = mode;
        }
        if let Some(base_port) = patch.base_port {
            manifest.base_port = base_port;
        }
        save_cluster_manifest(&cluster_dir, &manifest).await?;
        info!(cluster = %name, "cluster settings updated");
        Ok(manifest)
    }

    /// Rebuild a server's start artifact.
    ///
    /// Resolution order: configuration store → every cluster's in-record
    /// server list → last resort, reverse-parsing an existing start
    /// artifact found by directory scan.
    pub async fn regenerate_start_script(&self, name: &str) -> Result<PathBuf> {
        let (record, server_dir) = self.resolve_server(name).await?;
        let cluster_dir = record
            .is_clustered()
            .then(|| self.config().paths.cluster_dir(&record.cluster_id));
        let mods = self.mod_resolver().resolve(&record);
        let path = write_start_script(&server_dir, &record, cluster_dir.as_deref(), &mods).await?;
        info!(server = %name, path = %path.display(), "start artifact regenerated");
        Ok(path)
    }

    async fn find_in_cluster_manifests(&self, name: &str) -> Result<Option<ServerRecord>> {
        for cluster_dir in list_subdirs(&self.config().paths.clusters_dir()).await? {
            if let Some(manifest) = load_cluster_manifest(&cluster_dir).await? {
                if let Some(record) = manifest.server(name) {
                    let mut record = record.clone();
                    if record.cluster_id.is_empty() {
                        record.cluster_id = dir_name(&cluster_dir);
                    }
                    return Ok(Some(record));
                }
            }
        }
        Ok(None)
    }
}
