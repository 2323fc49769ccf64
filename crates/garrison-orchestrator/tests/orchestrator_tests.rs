//! ---
//! gsn_section: "01-orchestration"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Primary provisioning orchestration and lifecycle management."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use garrison_common::config::AppConfig;
use garrison_common::paths;
use garrison_orchestrator::{
    ClusterProvisionSpec, DeleteOptions, Orchestrator, OrchestratorError, ProgressEvent,
    ServerOverride, ServerProvisionSpec, SettingsFlags,
};
use garrison_store::{ConfigStore, JsonFileStore};
use tempfile::TempDir;

// A stand-in for the fetch tool: materializes the launch executable the
// way the real tool unpacks its archive ($2 is the +force_install_dir
// argument), refusing for directories marked as sabotaged.
const STUB_BODY: &str = r#"case "$2" in *sabotage*) exit 1;; esac
mkdir -p "$2/ShooterGame/Binaries/Win64"
touch "$2/ShooterGame/Binaries/Win64/ArkAscendedServer.exe"
exit 0"#;

fn write_stub(dir: &Path) -> PathBuf {
    let path = dir.join("steamcmd-stub.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{STUB_BODY}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn test_config(root: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.paths.fleet_root = root.path().join("fleet");
    config.paths.steamcmd_dir = root.path().join("steamcmd");
    config.installer.executable = write_stub(root.path());
    config.installer.auto_install = false;
    config.backup.root = root.path().join("backups");
    config.logging.directory = root.path().join("logs");
    config
}

fn orchestrator(config: &AppConfig) -> (Orchestrator, Arc<JsonFileStore>) {
    let store = Arc::new(JsonFileStore::new(config.paths.records_dir()));
    (Orchestrator::new(config.clone(), store.clone()), store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn create_assigns_disjoint_sequential_triples() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, store) = orchestrator(&config);

    let cluster = orchestrator
        .create(ClusterProvisionSpec::new("TestCluster", 2, 7000))
        .await
        .unwrap();

    assert_eq!(cluster.servers.len(), 2);
    let first = &cluster.servers[0];
    assert_eq!(
        (first.game_port, first.query_port, first.rcon_port),
        (7000, 7001, 7002)
    );
    let second = &cluster.servers[1];
    assert_eq!(
        (second.game_port, second.query_port, second.rcon_port),
        (7003, 7004, 7005)
    );

    // Records are in the store, and the whole pipeline ran per server.
    for server in &cluster.servers {
        let record = store.get_one(&server.name).await.unwrap().unwrap();
        assert_eq!(record.cluster_id, "TestCluster");
        let dir = config
            .paths
            .server_dir_in_cluster("TestCluster", &server.name);
        assert!(paths::marker_path(&dir).exists());
        assert!(dir
            .join(paths::CONFIG_DIR_RELATIVE)
            .join(paths::SESSION_SETTINGS_FILE)
            .exists());
        assert!(dir.join(paths::START_SCRIPT_NAME).exists());
        assert!(dir.join(paths::STOP_SCRIPT_NAME).exists());
    }
    assert!(config
        .paths
        .cluster_dir("TestCluster")
        .join("cluster.json")
        .exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn progress_events_span_zero_to_hundred() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, _) = orchestrator(&config);

    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    assert!(orchestrator.set_progress_handler(Box::new(move |event| {
        sink.lock().unwrap().push(event);
    })));
    // One handler per instance.
    assert!(!orchestrator.set_progress_handler(Box::new(|_| {})));

    orchestrator
        .create(ClusterProvisionSpec::new("Progressive", 2, 7100))
        .await
        .unwrap();

    let events = events.lock().unwrap();
    // validating, creating-directories, 3 steps x 2 servers, finalizing, done
    assert_eq!(events.len(), 10);
    assert_eq!(events[0].step_name, "validating");
    assert_eq!(events[0].percent, 0);
    assert_eq!(events.last().unwrap().step_name, "done");
    assert_eq!(events.last().unwrap().percent, 100);
    for pair in events.windows(2) {
        assert!(pair[0].step < pair[1].step);
        assert!(pair[0].percent <= pair[1].percent);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_specs_reject_before_any_side_effect() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, store) = orchestrator(&config);

    for spec in [
        ClusterProvisionSpec::new("bad name", 2, 7000),
        ClusterProvisionSpec::new("ok-name", 0, 7000),
        ClusterProvisionSpec::new("ok-name", 11, 7000),
        ClusterProvisionSpec::new("ok-name", 2, 1000),
    ] {
        match orchestrator.create(spec).await {
            Err(OrchestratorError::Validation(_)) => {}
            other => panic!("expected Validation error, got {other:?}"),
        }
    }

    assert!(store.get_all().await.unwrap().is_empty());
    assert!(!config.paths.clusters_dir().exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_cluster_name_is_rejected() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, _) = orchestrator(&config);

    orchestrator
        .create(ClusterProvisionSpec::new("Twice", 1, 7000))
        .await
        .unwrap();
    match orchestrator
        .create(ClusterProvisionSpec::new("Twice", 1, 8000))
        .await
    {
        Err(OrchestratorError::Validation(message)) => {
            assert!(message.contains("already in use"), "{message}");
        }
        other => panic!("expected Validation error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn explicit_port_overrides_are_validated_fleet_wide() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, _) = orchestrator(&config);

    orchestrator
        .create(ClusterProvisionSpec::new("First", 1, 7000))
        .await
        .unwrap();

    // 7001 is the first cluster's query port.
    let mut spec = ClusterProvisionSpec::new("Second", 1, 9000);
    spec.overrides = vec![ServerOverride {
        game_port: Some(7001),
        ..ServerOverride::default()
    }];
    match orchestrator.create(spec).await {
        Err(OrchestratorError::Validation(message)) => {
            assert!(message.contains("collides"), "{message}");
        }
        other => panic!("expected Validation error, got {other:?}"),
    }

    // A clean override is honored verbatim.
    let mut spec = ClusterProvisionSpec::new("Second", 1, 9000);
    spec.overrides = vec![ServerOverride {
        game_port: Some(12000),
        ..ServerOverride::default()
    }];
    let cluster = orchestrator.create(spec).await.unwrap();
    assert_eq!(cluster.servers[0].game_port, 12000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mid_cluster_failure_keeps_completed_servers() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, store) = orchestrator(&config);

    let mut spec = ClusterProvisionSpec::new("Partial", 3, 7200);
    spec.overrides = vec![
        ServerOverride::default(),
        ServerOverride {
            name: Some("Partial-sabotage".to_owned()),
            ..ServerOverride::default()
        },
    ];
    let err = orchestrator.create(spec).await.unwrap_err();
    match &err {
        OrchestratorError::PartialFailure {
            server,
            completed,
            total,
            ..
        } => {
            assert_eq!(server, "Partial-sabotage");
            assert_eq!(*completed, 1);
            assert_eq!(*total, 3);
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }

    // The first server is fully provisioned and never rolled back.
    let first_dir = config.paths.server_dir_in_cluster("Partial", "Partial-01");
    assert!(paths::marker_path(&first_dir).exists());
    assert!(first_dir.join(paths::START_SCRIPT_NAME).exists());
    assert!(store.get_one("Partial-01").await.unwrap().is_some());

    // The third server was abandoned: no executable tree was installed.
    let third_dir = config.paths.server_dir_in_cluster("Partial", "Partial-03");
    assert!(!paths::marker_path(&third_dir).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_with_failing_backup_mutates_nothing() {
    let root = TempDir::new().unwrap();
    let mut config = test_config(&root);
    let (orchestrator, store) = {
        // Sabotage the backup destination: a regular file where the
        // snapshot root should be makes every backup fail.
        let blocker = root.path().join("backups-blocked");
        std::fs::write(&blocker, b"not a directory").unwrap();
        config.backup.root = blocker;
        orchestrator(&config)
    };

    orchestrator
        .create(ClusterProvisionSpec::new("Protected", 1, 7300))
        .await
        .unwrap();

    let err = orchestrator
        .delete(
            "Protected",
            DeleteOptions {
                force: false,
                backup: true,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Backup(_)));

    // No filesystem or store mutation happened.
    assert!(config.paths.cluster_dir("Protected").exists());
    assert_eq!(store.get_all().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forced_delete_survives_backup_failure() {
    let root = TempDir::new().unwrap();
    let mut config = test_config(&root);
    let blocker = root.path().join("backups-blocked");
    std::fs::write(&blocker, b"not a directory").unwrap();
    config.backup.root = blocker;
    let (orchestrator, store) = orchestrator(&config);

    orchestrator
        .create(ClusterProvisionSpec::new("Doomed", 1, 7400))
        .await
        .unwrap();
    orchestrator
        .delete(
            "Doomed",
            DeleteOptions {
                force: true,
                backup: true,
            },
        )
        .await
        .unwrap();

    assert!(!config.paths.cluster_dir("Doomed").exists());
    assert!(store.get_all().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_backs_up_before_removing() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, store) = orchestrator(&config);

    orchestrator
        .create(ClusterProvisionSpec::new("Archived", 1, 7500))
        .await
        .unwrap();
    orchestrator
        .delete("Archived", DeleteOptions::default())
        .await
        .unwrap();

    assert!(!config.paths.cluster_dir("Archived").exists());
    assert!(store.get_all().await.unwrap().is_empty());

    let snapshots: Vec<_> = std::fs::read_dir(&config.backup.root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].starts_with("Archived-"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restore_recreates_a_deleted_cluster() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, _) = orchestrator(&config);

    orchestrator
        .create(ClusterProvisionSpec::new("Phoenix", 1, 7600))
        .await
        .unwrap();
    let snapshot = orchestrator.backup("Phoenix", None).await.unwrap();
    orchestrator
        .delete(
            "Phoenix",
            DeleteOptions {
                force: false,
                backup: false,
            },
        )
        .await
        .unwrap();
    assert!(!config.paths.cluster_dir("Phoenix").exists());

    orchestrator
        .restore("Phoenix", &snapshot.snapshot_path)
        .await
        .unwrap();
    let cluster_dir = config.paths.cluster_dir("Phoenix");
    assert!(cluster_dir.join("cluster.json").exists());
    assert!(!cluster_dir.join("backup-meta.json").exists());

    // Restore refuses a second run over the recreated tree.
    let err = orchestrator
        .restore("Phoenix", &snapshot.snapshot_path)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Backup(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_recovers_legacy_trees_by_reverse_parsing() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, _) = orchestrator(&config);

    orchestrator
        .create(ClusterProvisionSpec::new("Known", 1, 7700))
        .await
        .unwrap();

    // A manually created standalone tree the store never saw: only its
    // start artifact describes it.
    let rogue_dir = config.paths.standalone_server_dir("rogue");
    std::fs::create_dir_all(&rogue_dir).unwrap();
    std::fs::write(
        rogue_dir.join(paths::START_SCRIPT_NAME),
        "#!/bin/sh\n/x/ArkAscendedServer.exe \"TheIsland_WP?SessionName=rogue?Port=9100?QueryPort=9101?RCONPort=9102\" -mods=77\n",
    )
    .unwrap();

    let view = orchestrator.list().await.unwrap();
    assert_eq!(view.clusters.len(), 1);
    assert_eq!(view.clusters[0].name, "Known");
    assert!(view.clusters[0].record.is_some());
    assert_eq!(view.standalone.len(), 1);
    let rogue = &view.standalone[0];
    assert_eq!(rogue.name, "rogue");
    assert_eq!(rogue.game_port, 9100);
    assert_eq!(rogue.mods, vec!["77"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn settings_update_merges_and_syncs_the_cluster_manifest() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, store) = orchestrator(&config);

    orchestrator
        .create(ClusterProvisionSpec::new("Tunable", 1, 7800))
        .await
        .unwrap();

    let updated = orchestrator
        .update_server_settings(
            "Tunable-01",
            &serde_json::json!({"max_players": 120, "season_tag": "winter"}),
            SettingsFlags {
                regenerate_configs: true,
                regenerate_scripts: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.max_players, 120);
    assert_eq!(updated.extra["season_tag"], serde_json::json!("winter"));

    let stored = store.get_one("Tunable-01").await.unwrap().unwrap();
    assert_eq!(stored.max_players, 120);

    let manifest =
        garrison_store::load_cluster_manifest(&config.paths.cluster_dir("Tunable"))
            .await
            .unwrap()
            .unwrap();
    assert_eq!(manifest.server("Tunable-01").unwrap().max_players, 120);

    // Regenerated config documents carry the merged values.
    let dir = config.paths.server_dir_in_cluster("Tunable", "Tunable-01");
    let content = std::fs::read_to_string(
        dir.join(paths::CONFIG_DIR_RELATIVE)
            .join(paths::SESSION_SETTINGS_FILE),
    )
    .unwrap();
    assert!(content.contains("MaxPlayers=120"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_script_regenerates_from_artifact_when_store_forgot() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, store) = orchestrator(&config);

    orchestrator
        .create_standalone(ServerProvisionSpec::new("amnesiac"))
        .await
        .unwrap();
    // Simulate a lost store: the generated artifact is all that's left.
    store.delete("amnesiac").await.unwrap();

    let path = orchestrator
        .regenerate_start_script("amnesiac")
        .await
        .unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("SessionName=amnesiac"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn standalone_and_cluster_allocations_share_the_port_space() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, _) = orchestrator(&config);

    let record = orchestrator
        .create_standalone({
            let mut spec = ServerProvisionSpec::new("solo");
            spec.base_port = 7000;
            spec
        })
        .await
        .unwrap();
    assert_eq!(record.game_port, 7000);

    let cluster = orchestrator
        .create(ClusterProvisionSpec::new("Shared", 2, 7000))
        .await
        .unwrap();
    // The cluster must not reuse any port of the standalone triple.
    assert_eq!(cluster.servers[0].game_port, 7003);
    assert_eq!(cluster.servers[1].game_port, 7006);

    // Fleet-wide pairwise disjointness.
    let view = orchestrator.list().await.unwrap();
    let mut all_ports = Vec::new();
    for record in view
        .standalone
        .iter()
        .chain(view.clusters.iter().flat_map(|c| c.servers.iter()))
    {
        all_ports.extend_from_slice(&record.port_triple().ports());
    }
    let unique: std::collections::HashSet<_> = all_ports.iter().collect();
    assert_eq!(unique.len(), all_ports.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_refuses_servers_without_a_marker() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (orchestrator, store) = orchestrator(&config);

    // A record without an installed tree.
    let record = garrison_store::ServerRecord::new(
        "ghost",
        garrison_store::PortTriple::from_game(7900),
    );
    store.upsert("ghost", &record).await.unwrap();
    std::fs::create_dir_all(config.paths.standalone_server_dir("ghost")).unwrap();

    assert!(matches!(
        orchestrator.start("ghost").await,
        Err(OrchestratorError::NotInstalled(_))
    ));
}
