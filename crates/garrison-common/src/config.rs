//! ---
//! gsn_section: "01-shared-runtime"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Shared primitives and utilities for the fleet runtime."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_fleet_root() -> PathBuf {
    PathBuf::from("/var/lib/garrison")
}

fn default_steamcmd_dir() -> PathBuf {
    PathBuf::from("/var/lib/garrison/steamcmd")
}

fn default_steamcmd_executable() -> PathBuf {
    PathBuf::from("/var/lib/garrison/steamcmd/steamcmd.sh")
}

fn default_well_known_locations() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/games/steamcmd"),
        PathBuf::from("/usr/bin/steamcmd"),
        PathBuf::from("/opt/steamcmd/steamcmd.sh"),
    ]
}

fn default_auto_install() -> bool {
    true
}

fn default_download_url() -> String {
    // Pinned installer archive published by Valve.
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz".to_owned()
}

fn default_app_id() -> String {
    "2430930".to_owned()
}

fn default_install_timeout() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("/var/log/garrison")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_backup_root() -> PathBuf {
    PathBuf::from("/var/lib/garrison/backups")
}

fn default_state_files_per_server() -> usize {
    5
}

/// Primary configuration object for the Garrison runtime.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub installer: InstallerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub global_config: GlobalConfigSettings,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "GARRISON_CONFIG";

    /// Load configuration from disk, respecting the `GARRISON_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.paths.fleet_root.as_os_str().is_empty() {
            return Err(anyhow!("paths.fleet_root must not be empty"));
        }
        self.installer.validate()?;
        if self.backup.state_files_per_server == 0 {
            return Err(anyhow!("backup.state_files_per_server must be at least 1"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Root directories the fleet lives under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root directory holding `clusters/` and `servers/` trees.
    #[serde(default = "default_fleet_root")]
    pub fleet_root: PathBuf,
    /// Directory where an auto-installed fetch tool is unpacked.
    #[serde(default = "default_steamcmd_dir")]
    pub steamcmd_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            fleet_root: default_fleet_root(),
            steamcmd_dir: default_steamcmd_dir(),
        }
    }
}

impl PathsConfig {
    /// Directory holding every cluster tree.
    pub fn clusters_dir(&self) -> PathBuf {
        self.fleet_root.join("clusters")
    }

    /// Directory holding every standalone server tree.
    pub fn servers_dir(&self) -> PathBuf {
        self.fleet_root.join("servers")
    }

    /// Directory of one cluster.
    pub fn cluster_dir(&self, cluster: &str) -> PathBuf {
        self.clusters_dir().join(cluster)
    }

    /// Directory of one server inside a cluster.
    pub fn server_dir_in_cluster(&self, cluster: &str, server: &str) -> PathBuf {
        self.cluster_dir(cluster).join(server)
    }

    /// Directory of one standalone server.
    pub fn standalone_server_dir(&self, server: &str) -> PathBuf {
        self.servers_dir().join(server)
    }

    /// Directory where server records are persisted by the shipped store.
    pub fn records_dir(&self) -> PathBuf {
        self.fleet_root.join("records")
    }
}

/// Settings for the external binary-fetch tool.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Configured tool location, checked before the well-known list.
    #[serde(default = "default_steamcmd_executable")]
    pub executable: PathBuf,
    /// Ordered fallback locations searched when the configured path is absent.
    #[serde(default = "default_well_known_locations")]
    pub well_known_locations: Vec<PathBuf>,
    /// Whether a missing tool may be downloaded and unpacked automatically.
    #[serde(default = "default_auto_install")]
    pub auto_install: bool,
    /// Pinned archive fetched when auto-install kicks in.
    #[serde(default = "default_download_url")]
    pub download_url: String,
    /// Steam application identifier of the game-server build.
    #[serde(default = "default_app_id")]
    pub app_id: String,
    /// Hard ceiling for one tool invocation.
    #[serde(default = "default_install_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            executable: default_steamcmd_executable(),
            well_known_locations: default_well_known_locations(),
            auto_install: default_auto_install(),
            download_url: default_download_url(),
            app_id: default_app_id(),
            timeout: default_install_timeout(),
        }
    }
}

impl InstallerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.app_id.is_empty() || !self.app_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow!("installer.app_id must be a numeric identifier"));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("installer.timeout must be positive"));
        }
        Ok(())
    }
}

/// Logging sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Snapshot retention and placement settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Default destination for snapshots when the caller supplies none.
    #[serde(default = "default_backup_root")]
    pub root: PathBuf,
    /// Newest save-state files kept per server in state-only snapshots.
    #[serde(default = "default_state_files_per_server")]
    pub state_files_per_server: usize,
    /// Restrict snapshots to save-state files instead of the full tree.
    #[serde(default)]
    pub state_only: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            root: default_backup_root(),
            state_files_per_server: default_state_files_per_server(),
            state_only: false,
        }
    }
}

/// Shared configuration documents that override generated per-server
/// content unless a server is excluded by name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlobalConfigSettings {
    /// Directory holding the global document pair; `None` disables the
    /// override entirely.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Servers that keep generated content even when globals exist.
    #[serde(default)]
    pub excluded_servers: Vec<String>,
}

impl GlobalConfigSettings {
    pub fn is_excluded(&self, server: &str) -> bool {
        self.excluded_servers.iter().any(|s| s == server)
    }
}
