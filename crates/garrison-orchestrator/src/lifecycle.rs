//! ---
//! gsn_section: "01-orchestration"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Primary provisioning orchestration and lifecycle management."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Cluster and server lifecycle operations.
//!
//! `create()` walks a fixed state machine: INIT → VALIDATING →
//! DIR_CREATED → {INSTALLING → CONFIGURING → SCRIPTING} per server →
//! FINALIZING → DONE. FAILED is reachable from any state and terminal
//! for that call only: completed servers are never compensated away.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use garrison_backup::{BackupManager, RetentionClass, SnapshotMetadata, SNAPSHOT_METADATA_FILE};
use garrison_common::config::AppConfig;
use garrison_common::paths;
use garrison_confgen::ConfigMaterializer;
use garrison_installer::{InstallOutcome, Installer, OutputMode, UpdateReport};
use garrison_launch::{parse_start_artifact, write_start_script, write_stop_scripts};
use garrison_launch::{ModResolver, ServerListOnly};
use garrison_store::{
    load_cluster_manifest, save_cluster_manifest, ClusterRecord, ConfigStore, PortAllocationMode,
    PortTriple, ServerRecord,
};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::ports::next_available_triple;
use crate::progress::{percent_of, ProgressEvent, ProgressHandler};
use crate::{OrchestratorError, Result};

const MAX_SERVERS_PER_CLUSTER: usize = 10;
const MIN_BASE_PORT: u16 = 1024;

/// Request to provision a cluster of coordinated servers.
#[derive(Debug, Clone)]
pub struct ClusterProvisionSpec {
    /// Cluster name, charset `[A-Za-z0-9_-]+`, unique in the fleet.
    pub name: String,
    /// Operator-facing description.
    pub description: String,
    /// Servers to provision, `1..=10`.
    pub server_count: usize,
    /// First game port considered for default assignment, `>= 1024`.
    pub base_port: u16,
    /// Default port derivation strategy.
    pub port_allocation_mode: PortAllocationMode,
    /// Map applied to every server lacking an override.
    pub map: Option<String>,
    /// Player cap applied to every server.
    pub max_players: Option<u32>,
    /// Remote-console password shared by the cluster.
    pub admin_password: String,
    /// Join password; empty means open.
    pub server_password: String,
    /// Mod identifiers applied to every server.
    pub mods: Vec<String>,
    /// Launch every server with anti-cheat disabled.
    pub disable_anti_cheat: bool,
    /// Dynamic-config URL applied to every server.
    pub custom_dynamic_config_url: String,
    /// Positional per-server overrides; may be shorter than
    /// `server_count`.
    pub overrides: Vec<ServerOverride>,
}

impl ClusterProvisionSpec {
    /// Spec with defaults for everything but the essentials.
    pub fn new(name: impl Into<String>, server_count: usize, base_port: u16) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            server_count,
            base_port,
            port_allocation_mode: PortAllocationMode::Sequential,
            map: None,
            max_players: None,
            admin_password: String::new(),
            server_password: String::new(),
            mods: Vec::new(),
            disable_anti_cheat: false,
            custom_dynamic_config_url: String::new(),
            overrides: Vec::new(),
        }
    }
}

/// Optional per-server deviations from the cluster spec.
#[derive(Debug, Clone, Default)]
pub struct ServerOverride {
    /// Server name; defaults to `<cluster>-NN`.
    pub name: Option<String>,
    /// Map for this server only.
    pub map: Option<String>,
    /// Explicit game port. Validated against the fleet-wide claimed
    /// set; the query/rcon offsets are derived.
    pub game_port: Option<u16>,
}

/// Request to provision one standalone server.
#[derive(Debug, Clone)]
pub struct ServerProvisionSpec {
    /// Server name, charset `[A-Za-z0-9_-]+`, unique in the fleet.
    pub name: String,
    /// Map identifier.
    pub map: Option<String>,
    /// Explicit game port; allocated from `base_port` when absent.
    pub game_port: Option<u16>,
    /// First game port considered when allocating.
    pub base_port: u16,
    /// Player cap.
    pub max_players: Option<u32>,
    /// Remote-console password.
    pub admin_password: String,
    /// Join password; empty means open.
    pub server_password: String,
    /// Mod identifiers.
    pub mods: Vec<String>,
    /// Launch with anti-cheat disabled.
    pub disable_anti_cheat: bool,
    /// Dynamic-config URL.
    pub custom_dynamic_config_url: String,
}

impl ServerProvisionSpec {
    /// Spec with defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map: None,
            game_port: None,
            base_port: 7777,
            max_players: None,
            admin_password: String::new(),
            server_password: String::new(),
            mods: Vec::new(),
            disable_anti_cheat: false,
            custom_dynamic_config_url: String::new(),
        }
    }
}

/// Options for [`Orchestrator::delete`].
#[derive(Debug, Clone, Copy)]
pub struct DeleteOptions {
    /// Continue deleting even when the pre-delete backup fails.
    pub force: bool,
    /// Back the entity up before any destructive action.
    pub backup: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            force: false,
            backup: true,
        }
    }
}

/// Reconstructed view of the whole fleet.
#[derive(Debug, Default)]
pub struct FleetView {
    /// Clusters, grouped by cluster identifier.
    pub clusters: Vec<ClusterView>,
    /// Servers with no owning cluster.
    pub standalone: Vec<ServerRecord>,
}

/// One cluster as seen by `list()`.
#[derive(Debug)]
pub struct ClusterView {
    /// Cluster identifier.
    pub name: String,
    /// The on-disk manifest, when one is readable.
    pub record: Option<ClusterRecord>,
    /// Member servers, from the store or reverse-parsed artifacts.
    pub servers: Vec<ServerRecord>,
}

/// Result of `start()`.
#[derive(Debug)]
pub struct StartOutcome {
    /// Server that was started.
    pub server: String,
    /// Process id of the spawned launcher, when the platform reports one.
    pub pid: Option<u32>,
    /// Start artifact that was executed.
    pub script: PathBuf,
}

#[derive(Default)]
struct NamedLocks {
    locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NamedLocks {
    async fn acquire(&self, name: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// The provisioning orchestrator.
pub struct Orchestrator {
    config: Arc<AppConfig>,
    store: Arc<dyn ConfigStore>,
    installer: Installer,
    materializer: ConfigMaterializer,
    backups: BackupManager,
    mods: Box<dyn ModResolver>,
    progress: OnceCell<ProgressHandler>,
    name_locks: NamedLocks,
}

impl Orchestrator {
    /// Build an orchestrator over the given store.
    pub fn new(config: AppConfig, store: Arc<dyn ConfigStore>) -> Self {
        let installer = Installer::from_config(&config);
        let materializer = ConfigMaterializer::new(config.global_config.clone());
        let backups = BackupManager::from_config(&config.backup);
        Self {
            config: Arc::new(config),
            store,
            installer,
            materializer,
            backups,
            mods: Box::new(ServerListOnly),
            progress: OnceCell::new(),
            name_locks: NamedLocks::default(),
        }
    }

    /// Replace the mod-list resolver (the collaborator merging shared
    /// and per-server mod lists).
    pub fn with_mod_resolver(mut self, resolver: Box<dyn ModResolver>) -> Self {
        self.mods = resolver;
        self
    }

    /// Install the progress callback. One handler per instance; returns
    /// false when a handler was already set.
    pub fn set_progress_handler(&self, handler: ProgressHandler) -> bool {
        self.progress.set(handler).is_ok()
    }

    /// Effective configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The installer collaborator, for update operations.
    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    pub(crate) fn store(&self) -> &dyn ConfigStore {
        self.store.as_ref()
    }

    pub(crate) fn materializer(&self) -> &ConfigMaterializer {
        &self.materializer
    }

    pub(crate) fn mod_resolver(&self) -> &dyn ModResolver {
        self.mods.as_ref()
    }

    fn emit(&self, step: usize, total: usize, step_name: &str, message: String) {
        if let Some(handler) = self.progress.get() {
            handler(ProgressEvent {
                step,
                step_name: step_name.to_owned(),
                percent: percent_of(step, total),
                message,
            });
        }
    }

    /// Provision a cluster. See the module docs for the state machine;
    /// on a mid-cluster failure the call rejects with aggregated context
    /// and the already completed servers stay in place.
    pub async fn create(&self, spec: ClusterProvisionSpec) -> Result<ClusterRecord> {
        let _lock = self.name_locks.acquire(&spec.name).await;
        let total_steps = spec.server_count * 3 + 4;
        let mut step = 0;

        self.emit(step, total_steps, "validating", format!("validating cluster '{}'", spec.name));
        let fleet = self.store.get_all().await?;
        self.validate_cluster_spec(&spec, &fleet).await?;
        self.preflight(spec.server_count);

        // Port assignment: explicit overrides are honored after
        // fleet-wide collision checking; everything else comes from the
        // allocator, seeded with every triple known to the fleet plus
        // the triples assigned so far in this call.
        let mut claimed: Vec<PortTriple> = fleet.iter().map(|r| r.port_triple()).collect();
        let mut members: Vec<(String, PortTriple, Option<String>)> = Vec::new();
        let mut member_names = HashSet::new();
        for index in 0..spec.server_count {
            let override_ = spec.overrides.get(index);
            let name = override_
                .and_then(|o| o.name.clone())
                .unwrap_or_else(|| format!("{}-{:02}", spec.name, index + 1));
            validate_entity_name(&name, "server")?;
            if !member_names.insert(name.clone()) {
                return Err(OrchestratorError::Validation(format!(
                    "duplicate server name '{name}' in cluster spec"
                )));
            }
            let triple = match override_.and_then(|o| o.game_port) {
                Some(game) => {
                    let triple = PortTriple::from_game(game);
                    if !claimed.iter().all(|t| t.disjoint_from(&triple)) {
                        return Err(OrchestratorError::Validation(format!(
                            "explicit port {game} for server '{name}' collides with an existing allocation"
                        )));
                    }
                    triple
                }
                None => next_available_triple(&claimed, spec.base_port, spec.port_allocation_mode)
                    .ok_or_else(|| {
                        OrchestratorError::Validation(format!(
                            "port space exhausted while allocating for server '{name}'"
                        ))
                    })?,
            };
            claimed.push(triple);
            members.push((name, triple, override_.and_then(|o| o.map.clone())));
        }

        step += 1;
        self.emit(step, total_steps, "creating-directories", format!("creating directory tree for '{}'", spec.name));
        let cluster_dir = self.config.paths.cluster_dir(&spec.name);
        tokio::fs::create_dir_all(&cluster_dir).await?;

        let mut cluster = ClusterRecord::new(&spec.name, spec.base_port, spec.port_allocation_mode);
        cluster.description = spec.description.clone();
        for (name, triple, map) in &members {
            let mut record = ServerRecord::new(name.clone(), *triple);
            record.cluster_id = spec.name.clone();
            if let Some(map) = map.clone().or_else(|| spec.map.clone()) {
                record.map = map;
            }
            if let Some(max_players) = spec.max_players {
                record.max_players = max_players;
            }
            record.admin_password = spec.admin_password.clone();
            record.server_password = spec.server_password.clone();
            record.mods = spec.mods.clone();
            record.disable_anti_cheat = spec.disable_anti_cheat;
            record.custom_dynamic_config_url = spec.custom_dynamic_config_url.clone();
            self.store.upsert(name, &record).await?;
            cluster.servers.push(record);
        }
        save_cluster_manifest(&cluster_dir, &cluster).await?;
        info!(cluster = %spec.name, servers = cluster.servers.len(), "cluster records persisted");

        for (index, record) in cluster.servers.iter().enumerate() {
            if let Err(err) = self
                .provision_one(&cluster_dir, record, index, spec.server_count, total_steps, &mut step)
                .await
            {
                error!(
                    cluster = %spec.name,
                    server = %record.name,
                    completed = index,
                    error = %err,
                    "provisioning aborted; completed servers are kept"
                );
                return Err(OrchestratorError::PartialFailure {
                    server: record.name.clone(),
                    completed: index,
                    total: spec.server_count,
                    source: Box::new(err),
                });
            }
        }

        step += 1;
        self.emit(step, total_steps, "finalizing", format!("finalizing cluster '{}'", spec.name));
        save_cluster_manifest(&cluster_dir, &cluster).await?;

        step += 1;
        self.emit(step, total_steps, "done", format!("cluster '{}' provisioned", spec.name));
        info!(cluster = %spec.name, "cluster provisioned");
        Ok(cluster)
    }

    /// Provision one standalone server through the same pipeline.
    pub async fn create_standalone(&self, spec: ServerProvisionSpec) -> Result<ServerRecord> {
        let _lock = self.name_locks.acquire(&spec.name).await;
        let total_steps = 7;
        let mut step = 0;

        self.emit(step, total_steps, "validating", format!("validating server '{}'", spec.name));
        validate_entity_name(&spec.name, "server")?;
        let fleet = self.store.get_all().await?;
        if fleet.iter().any(|r| r.name == spec.name) {
            return Err(OrchestratorError::Validation(format!(
                "server name '{}' is already in use",
                spec.name
            )));
        }
        let server_dir = self.config.paths.standalone_server_dir(&spec.name);
        if server_dir.exists() {
            return Err(OrchestratorError::Validation(format!(
                "directory for server '{}' already exists",
                spec.name
            )));
        }
        self.preflight(1);

        let claimed: Vec<PortTriple> = fleet.iter().map(|r| r.port_triple()).collect();
        let triple = match spec.game_port {
            Some(game) => {
                let triple = PortTriple::from_game(game);
                if !claimed.iter().all(|t| t.disjoint_from(&triple)) {
                    return Err(OrchestratorError::Validation(format!(
                        "explicit port {game} for server '{}' collides with an existing allocation",
                        spec.name
                    )));
                }
                triple
            }
            None => next_available_triple(&claimed, spec.base_port, PortAllocationMode::Sequential)
                .ok_or_else(|| {
                    OrchestratorError::Validation("port space exhausted".to_owned())
                })?,
        };

        step += 1;
        self.emit(step, total_steps, "creating-directories", format!("creating directory tree for '{}'", spec.name));
        tokio::fs::create_dir_all(&server_dir).await?;

        let mut record = ServerRecord::new(spec.name.clone(), triple);
        if let Some(map) = spec.map {
            record.map = map;
        }
        if let Some(max_players) = spec.max_players {
            record.max_players = max_players;
        }
        record.admin_password = spec.admin_password;
        record.server_password = spec.server_password;
        record.mods = spec.mods;
        record.disable_anti_cheat = spec.disable_anti_cheat;
        record.custom_dynamic_config_url = spec.custom_dynamic_config_url;
        self.store.upsert(&record.name, &record).await?;

        step += 1;
        self.emit(step, total_steps, "installing", format!("installing executable tree for '{}'", record.name));
        self.installer
            .install_for_server(&record.name, OutputMode::Captured)
            .await?;

        step += 1;
        self.emit(step, total_steps, "configuring", format!("materializing configuration for '{}'", record.name));
        self.materializer
            .create_server_config(&server_dir, &record)
            .await?;

        step += 1;
        self.emit(step, total_steps, "scripting", format!("writing launch artifacts for '{}'", record.name));
        let mods = self.mods.resolve(&record);
        write_start_script(&server_dir, &record, None, &mods).await?;
        write_stop_scripts(&server_dir, &record.name).await?;

        step += 1;
        self.emit(step, total_steps, "finalizing", format!("finalizing server '{}'", record.name));
        step += 1;
        self.emit(step, total_steps, "done", format!("server '{}' provisioned", record.name));
        info!(server = %record.name, "standalone server provisioned");
        Ok(record)
    }

    async fn provision_one(
        &self,
        cluster_dir: &Path,
        record: &ServerRecord,
        index: usize,
        total_servers: usize,
        total_steps: usize,
        step: &mut usize,
    ) -> Result<()> {
        let server_dir = cluster_dir.join(&record.name);
        let position = format!("{}/{}", index + 1, total_servers);

        *step += 1;
        self.emit(*step, total_steps, "installing", format!("installing executable tree for '{}' ({position})", record.name));
        self.installer
            .install_for_server_in_cluster(&record.cluster_id, &record.name, OutputMode::Captured)
            .await?;

        *step += 1;
        self.emit(*step, total_steps, "configuring", format!("materializing configuration for '{}' ({position})", record.name));
        self.materializer
            .create_server_config(&server_dir, record)
            .await?;

        *step += 1;
        self.emit(*step, total_steps, "scripting", format!("writing launch artifacts for '{}' ({position})", record.name));
        let mods = self.mods.resolve(record);
        write_start_script(&server_dir, record, Some(cluster_dir), &mods).await?;
        write_stop_scripts(&server_dir, &record.name).await?;

        Ok(())
    }

    /// Reconstruct the fleet view. The store is authoritative; trees on
    /// disk that the store never saw are recovered by reverse-parsing
    /// their start artifacts.
    pub async fn list(&self) -> Result<FleetView> {
        let mut clusters: IndexMap<String, Vec<ServerRecord>> = IndexMap::new();
        let mut standalone = Vec::new();
        let mut known_names = HashSet::new();

        for record in self.store.get_all().await? {
            known_names.insert(record.name.clone());
            if record.is_clustered() {
                clusters
                    .entry(record.cluster_id.clone())
                    .or_insert_with(Vec::new)
                    .push(record);
            } else {
                standalone.push(record);
            }
        }

        // Legacy or manually created trees: recover what the store is
        // missing from the generated artifacts.
        for cluster_dir in list_subdirs(&self.config.paths.clusters_dir()).await? {
            let cluster_name = dir_name(&cluster_dir);
            let entries = clusters.entry(cluster_name.clone()).or_insert_with(Vec::new);
            for server_dir in list_subdirs(&cluster_dir).await? {
                let server_name = dir_name(&server_dir);
                if known_names.contains(&server_name) {
                    continue;
                }
                if let Some(mut record) = self.recover_from_artifact(&server_dir).await {
                    if record.cluster_id.is_empty() {
                        record.cluster_id = cluster_name.clone();
                    }
                    known_names.insert(record.name.clone());
                    entries.push(record);
                }
            }
        }
        for server_dir in list_subdirs(&self.config.paths.servers_dir()).await? {
            let server_name = dir_name(&server_dir);
            if known_names.contains(&server_name) {
                continue;
            }
            if let Some(record) = self.recover_from_artifact(&server_dir).await {
                known_names.insert(record.name.clone());
                standalone.push(record);
            }
        }

        let mut view = FleetView::default();
        for (name, servers) in clusters {
            if servers.is_empty() {
                continue;
            }
            let record = load_cluster_manifest(&self.config.paths.cluster_dir(&name))
                .await
                .unwrap_or_else(|err| {
                    warn!(cluster = %name, error = %err, "unreadable cluster manifest");
                    None
                });
            view.clusters.push(ClusterView {
                name,
                record,
                servers,
            });
        }
        view.standalone = standalone;
        Ok(view)
    }

    async fn recover_from_artifact(&self, server_dir: &Path) -> Option<ServerRecord> {
        let artifact = server_dir.join(paths::START_SCRIPT_NAME);
        let content = tokio::fs::read_to_string(&artifact).await.ok()?;
        match parse_start_artifact(&content) {
            Ok(parsed) => {
                let fallback = dir_name(server_dir);
                info!(dir = %server_dir.display(), "recovered server record from start artifact");
                Some(parsed.into_record(&fallback))
            }
            Err(err) => {
                warn!(path = %artifact.display(), error = %err, "unparsable start artifact");
                None
            }
        }
    }

    /// Delete a cluster or standalone server: back it up first (unless
    /// disabled), remove its store entries, then best-effort remove the
    /// tree. A failing backup aborts before any destructive action
    /// unless `force` is set.
    pub async fn delete(&self, name: &str, options: DeleteOptions) -> Result<()> {
        let _lock = self.name_locks.acquire(name).await;

        let records = self.store.get_all().await?;
        let cluster_dir = self.config.paths.cluster_dir(name);
        let owned: Vec<String> = records
            .iter()
            .filter(|r| r.cluster_id == name)
            .map(|r| r.name.clone())
            .collect();

        let (dir, doomed) = if cluster_dir.exists() || !owned.is_empty() {
            (cluster_dir, owned)
        } else {
            let standalone_dir = self.config.paths.standalone_server_dir(name);
            let known = records.iter().any(|r| r.name == name && !r.is_clustered());
            if !known && !standalone_dir.exists() {
                return Err(OrchestratorError::OwnerNotFound(name.to_owned()));
            }
            (standalone_dir, vec![name.to_owned()])
        };

        if options.backup && dir.exists() {
            match self
                .backups
                .backup(name, &dir, None, self.retention_class())
                .await
            {
                Ok(snapshot) => {
                    info!(owner = %name, snapshot = %snapshot.snapshot_name, "pre-delete backup complete");
                }
                Err(err) if options.force => {
                    warn!(owner = %name, error = %err, "pre-delete backup failed; continuing because force is set");
                }
                Err(err) => {
                    error!(owner = %name, error = %err, "pre-delete backup failed; aborting delete");
                    return Err(err.into());
                }
            }
        }

        for server in &doomed {
            self.store.delete(server).await?;
        }
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            // Already gone is fine on a delete path.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        info!(owner = %name, servers = doomed.len(), "deleted");
        Ok(())
    }

    /// Snapshot a cluster or standalone server.
    pub async fn backup(
        &self,
        owner: &str,
        destination: Option<&Path>,
    ) -> Result<SnapshotMetadata> {
        let dir = self.resolve_owner_dir(owner)?;
        Ok(self
            .backups
            .backup(owner, &dir, destination, self.retention_class())
            .await?)
    }

    /// Recreate a cluster or standalone server tree from a snapshot.
    /// The original location is taken from the snapshot metadata, with
    /// the cluster layout as fallback.
    pub async fn restore(&self, owner: &str, source: &Path) -> Result<()> {
        let target = match read_snapshot_origin(source).await {
            Some(origin) => origin,
            None => self.config.paths.cluster_dir(owner),
        };
        Ok(self.backups.restore(owner, source, &target).await?)
    }

    /// Start a provisioned server by executing its start artifact.
    /// Process supervision is out of scope: the child is spawned
    /// detached and never awaited.
    pub async fn start(&self, name: &str) -> Result<StartOutcome> {
        let (record, server_dir) = self.resolve_server(name).await?;
        if !Installer::is_installed(&server_dir) {
            return Err(OrchestratorError::NotInstalled(name.to_owned()));
        }

        let script = server_dir.join(paths::START_SCRIPT_NAME);
        if !script.exists() {
            let cluster_dir = record
                .is_clustered()
                .then(|| self.config.paths.cluster_dir(&record.cluster_id));
            let mods = self.mods.resolve(&record);
            write_start_script(&server_dir, &record, cluster_dir.as_deref(), &mods).await?;
            write_stop_scripts(&server_dir, &record.name).await?;
        }

        let child = tokio::process::Command::new("/bin/sh")
            .arg(&script)
            .current_dir(&server_dir)
            .spawn()?;
        let pid = child.id();
        info!(server = %name, pid = ?pid, "server started");
        Ok(StartOutcome {
            server: name.to_owned(),
            pid,
            script,
        })
    }

    /// Re-run the install path for one server.
    pub async fn update_server(&self, name: &str, mode: OutputMode) -> Result<InstallOutcome> {
        Ok(self.installer.update_for_server(name, mode).await?)
    }

    /// Re-run the install path for every server directory in the fleet,
    /// returning per-item results instead of failing on the first error.
    pub async fn update_all(&self, mode: OutputMode) -> Result<Vec<UpdateReport>> {
        Ok(self.installer.update_all(mode).await?)
    }

    pub(crate) fn retention_class(&self) -> RetentionClass {
        if self.config.backup.state_only {
            RetentionClass::StateOnly
        } else {
            RetentionClass::FullTree
        }
    }

    pub(crate) fn resolve_owner_dir(&self, owner: &str) -> Result<PathBuf> {
        let cluster_dir = self.config.paths.cluster_dir(owner);
        if cluster_dir.is_dir() {
            return Ok(cluster_dir);
        }
        let standalone_dir = self.config.paths.standalone_server_dir(owner);
        if standalone_dir.is_dir() {
            return Ok(standalone_dir);
        }
        Err(OrchestratorError::OwnerNotFound(owner.to_owned()))
    }

    /// Resolve a server record and its directory: store first, then
    /// every cluster manifest, then, as a last resort, reverse-parsing a
    /// start artifact found by directory scan.
    pub(crate) async fn resolve_server(&self, name: &str) -> Result<(ServerRecord, PathBuf)> {
        if let Some(record) = self.store.get_one(name).await? {
            let dir = if record.is_clustered() {
                self.config
                    .paths
                    .server_dir_in_cluster(&record.cluster_id, name)
            } else {
                self.config.paths.standalone_server_dir(name)
            };
            return Ok((record, dir));
        }

        for cluster_dir in list_subdirs(&self.config.paths.clusters_dir()).await? {
            if let Some(manifest) = load_cluster_manifest(&cluster_dir).await? {
                if let Some(record) = manifest.server(name) {
                    return Ok((record.clone(), cluster_dir.join(name)));
                }
            }
        }

        let standalone_dir = self.config.paths.standalone_server_dir(name);
        if let Some(record) = self.recover_from_artifact(&standalone_dir).await {
            return Ok((record, standalone_dir));
        }
        for cluster_dir in list_subdirs(&self.config.paths.clusters_dir()).await? {
            let candidate = cluster_dir.join(name);
            if let Some(mut record) = self.recover_from_artifact(&candidate).await {
                if record.cluster_id.is_empty() {
                    record.cluster_id = dir_name(&cluster_dir);
                }
                return Ok((record, candidate));
            }
        }

        Err(OrchestratorError::ServerNotFound(name.to_owned()))
    }

    async fn validate_cluster_spec(
        &self,
        spec: &ClusterProvisionSpec,
        fleet: &[ServerRecord],
    ) -> Result<()> {
        validate_entity_name(&spec.name, "cluster")?;
        if spec.server_count < 1 || spec.server_count > MAX_SERVERS_PER_CLUSTER {
            return Err(OrchestratorError::Validation(format!(
                "server count must be between 1 and {MAX_SERVERS_PER_CLUSTER}, got {}",
                spec.server_count
            )));
        }
        if spec.base_port < MIN_BASE_PORT {
            return Err(OrchestratorError::Validation(format!(
                "base port must be between {MIN_BASE_PORT} and 65535, got {}",
                spec.base_port
            )));
        }
        if fleet.iter().any(|r| r.cluster_id == spec.name) {
            return Err(OrchestratorError::Validation(format!(
                "cluster name '{}' is already in use",
                spec.name
            )));
        }
        if self.config.paths.cluster_dir(&spec.name).exists() {
            return Err(OrchestratorError::Validation(format!(
                "directory for cluster '{}' already exists",
                spec.name
            )));
        }
        Ok(())
    }

    /// Log resource headroom before committing to a provisioning run.
    /// Shortfalls are surfaced as warnings; the installer produces the
    /// authoritative failure if the host really cannot fit the tree.
    fn preflight(&self, server_count: usize) {
        let tool = self.config.installer.executable.as_path();
        match garrison_preflight::inspect(&self.config.paths.fleet_root, Some(tool)) {
            Ok(report) => {
                if !report.has_disk_for_installs(server_count) {
                    warn!(
                        servers = server_count,
                        free_bytes = report.available_disk_bytes,
                        "disk space looks too small for the requested installs"
                    );
                }
                if !report.memory_headroom() {
                    warn!(
                        free_bytes = report.available_memory_bytes,
                        "memory headroom is tight for another running server"
                    );
                }
                if !report.tool_available {
                    info!("fetch tool not yet present; discovery will run during install");
                }
            }
            Err(err) => warn!(error = %err, "host inspection failed; continuing"),
        }
    }
}

fn validate_entity_name(name: &str, kind: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(OrchestratorError::Validation(format!(
            "{kind} name '{name}' must match [A-Za-z0-9_-]+"
        )))
    }
}

async fn read_snapshot_origin(source: &Path) -> Option<PathBuf> {
    let raw = tokio::fs::read(source.join(SNAPSHOT_METADATA_FILE))
        .await
        .ok()?;
    let metadata: SnapshotMetadata = serde_json::from_slice(&raw).ok()?;
    Some(metadata.origin_path)
}

pub(crate) async fn list_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut subdirs = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(subdirs),
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            subdirs.push(entry.path());
        }
    }
    subdirs.sort();
    Ok(subdirs)
}

pub(crate) fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
