//! ---
//! gsn_section: "05-launch-artifacts"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Launch artifact synthesis and reverse parsing."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Start artifact synthesis.
//!
//! Grammar, one line per server:
//! `<executable> "<map>?key=value?..." [-mods=<id,...>] [-NoAntiCheat]
//! [-ClusterDirOverride=<path>] [-clusterid=<id>]`

use std::path::{Path, PathBuf};

use garrison_common::paths;
use garrison_store::ServerRecord;
use tokio::fs;
use tracing::info;

use crate::Result;

/// Merges server-specific and shared mod lists into the list that ends
/// up on the command line. The shared-list source is an installation
/// concern, so it stays behind this seam.
pub trait ModResolver: Send + Sync {
    /// Resolve the effective mod list for `record`.
    fn resolve(&self, record: &ServerRecord) -> Vec<String>;
}

/// Default resolver: the record's own list, no shared additions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerListOnly;

impl ModResolver for ServerListOnly {
    fn resolve(&self, record: &ServerRecord) -> Vec<String> {
        record.mods.clone()
    }
}

/// Build the start invocation line for a server.
///
/// `cluster_dir` must be the shared cluster data directory for
/// cluster-owned servers and `None` for standalone ones. The admin
/// password rides the command line only for standalone servers; cluster
/// servers carry it in their configuration documents instead.
pub fn build_start_line(
    record: &ServerRecord,
    server_dir: &Path,
    cluster_dir: Option<&Path>,
    resolved_mods: &[String],
) -> String {
    let executable = paths::marker_path(server_dir);

    let mut query = format!(
        "{map}?SessionName={name}?Port={game}?QueryPort={qp}?RCONPort={rcon}?RCONEnabled=True?MaxPlayers={max}",
        map = record.map,
        name = record.name,
        game = record.game_port,
        qp = record.query_port,
        rcon = record.rcon_port,
        max = record.max_players,
    );
    if !record.server_password.is_empty() {
        query.push_str(&format!("?ServerPassword={}", record.server_password));
    }
    if !record.is_clustered() && !record.admin_password.is_empty() {
        query.push_str(&format!("?ServerAdminPassword={}", record.admin_password));
    }
    if !record.custom_dynamic_config_url.is_empty() {
        query.push_str(&format!(
            "?CustomDynamicConfigUrl={}",
            record.custom_dynamic_config_url
        ));
    }

    let mut line = format!("{} \"{}\"", executable.display(), query);
    if !resolved_mods.is_empty() {
        line.push_str(&format!(" -mods={}", resolved_mods.join(",")));
    }
    if record.disable_anti_cheat {
        line.push_str(" -NoAntiCheat");
    }
    if let Some(cluster_dir) = cluster_dir {
        line.push_str(&format!(" -ClusterDirOverride={}", cluster_dir.display()));
        line.push_str(&format!(" -clusterid={}", record.cluster_id));
    }
    line
}

/// Write the start artifact into the server directory and return its path.
pub async fn write_start_script(
    server_dir: &Path,
    record: &ServerRecord,
    cluster_dir: Option<&Path>,
    resolved_mods: &[String],
) -> Result<PathBuf> {
    let line = build_start_line(record, server_dir, cluster_dir, resolved_mods);
    let script = format!(
        "#!/bin/sh\n# Start artifact for {name}; regenerate instead of editing.\n{line}\n",
        name = record.name,
    );
    let path = server_dir.join(paths::START_SCRIPT_NAME);
    fs::create_dir_all(server_dir).await?;
    fs::write(&path, script).await?;
    make_executable(&path).await?;
    info!(server = %record.name, path = %path.display(), "start artifact written");
    Ok(path)
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path).await?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use garrison_store::PortTriple;

    fn base_record() -> ServerRecord {
        let mut record = ServerRecord::new("alpha-01", PortTriple::from_game(7010));
        record.map = "ScorchedEarth_WP".into();
        record.max_players = 50;
        record
    }

    #[test]
    fn minimal_line_has_no_optional_flags() {
        let line = build_start_line(&base_record(), Path::new("/srv/alpha-01"), None, &[]);
        assert!(line.starts_with("/srv/alpha-01/ShooterGame/Binaries/Win64/ArkAscendedServer.exe \"ScorchedEarth_WP?"));
        assert!(line.contains("?SessionName=alpha-01?Port=7010?QueryPort=7011?RCONPort=7012"));
        assert!(!line.contains("-mods="));
        assert!(!line.contains("-NoAntiCheat"));
        assert!(!line.contains("-clusterid="));
    }

    #[test]
    fn mods_flag_appears_only_when_resolved_list_is_non_empty() {
        let record = base_record();
        let line = build_start_line(
            &record,
            Path::new("/srv/a"),
            None,
            &["931211".into(), "89001".into()],
        );
        assert!(line.contains(" -mods=931211,89001"));
    }

    #[test]
    fn cluster_servers_get_override_flags_and_lose_admin_password() {
        let mut record = base_record();
        record.cluster_id = "alpha".into();
        record.admin_password = "secret".into();
        let line = build_start_line(
            &record,
            Path::new("/srv/clusters/alpha/alpha-01"),
            Some(Path::new("/srv/clusters/alpha")),
            &[],
        );
        assert!(line.contains("-ClusterDirOverride=/srv/clusters/alpha"));
        assert!(line.contains("-clusterid=alpha"));
        assert!(!line.contains("ServerAdminPassword"));
    }

    #[test]
    fn standalone_servers_carry_admin_password_inline() {
        let mut record = base_record();
        record.admin_password = "secret".into();
        let line = build_start_line(&record, Path::new("/srv/a"), None, &[]);
        assert!(line.contains("?ServerAdminPassword=secret"));
    }

    #[test]
    fn anti_cheat_flag_follows_record() {
        let mut record = base_record();
        record.disable_anti_cheat = true;
        let line = build_start_line(&record, Path::new("/srv/a"), None, &[]);
        assert!(line.ends_with("-NoAntiCheat"));
    }

    #[tokio::test]
    async fn script_is_written_with_shebang() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_start_script(dir.path(), &base_record(), None, &[])
            .await
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("#!/bin/sh\n"));
        assert!(content.contains("ArkAscendedServer.exe"));
    }
}
