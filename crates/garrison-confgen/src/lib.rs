//! ---
//! gsn_section: "04-configuration-materialization"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Materializes per-server configuration documents."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Configuration materializer.
//!
//! Produces the two documents a server process reads at startup: the
//! session/network document (`GameUserSettings.ini`) and the
//! gameplay-rules document (`Game.ini`). A per-installation pair of
//! global documents silently wins over generated content unless the
//! server is excluded by name; that precedence order is a contract.

use std::path::{Path, PathBuf};

use garrison_common::config::GlobalConfigSettings;
use garrison_common::paths;
use garrison_store::ServerRecord;
use tokio::fs;
use tracing::{debug, info};

pub mod documents;

pub use documents::{render_gameplay_rules, render_session_settings};

/// Result alias used throughout the confgen crate.
pub type Result<T> = std::result::Result<T, ConfgenError>;

/// Error type for configuration materialization.
#[derive(Debug, thiserror::Error)]
pub enum ConfgenError {
    /// Filesystem access failed.
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// Paths of the two documents written for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedConfig {
    /// Session/network document location.
    pub session_settings: PathBuf,
    /// Gameplay-rules document location.
    pub gameplay_rules: PathBuf,
    /// Whether global content was used instead of generated content.
    pub from_global: bool,
}

/// Materializes configuration documents, honoring the
/// global-override-with-exclusion precedence.
#[derive(Debug, Clone)]
pub struct ConfigMaterializer {
    globals: GlobalConfigSettings,
}

impl ConfigMaterializer {
    /// Build a materializer from the installation's global-config settings.
    pub fn new(globals: GlobalConfigSettings) -> Self {
        Self { globals }
    }

    /// Write both documents for `record` under `server_path`.
    ///
    /// Precedence: when the server is not excluded and the global
    /// document pair exists, its raw content is used verbatim; excluded
    /// servers and missing globals fall back to generated per-server
    /// content. A missing global pair is not an error.
    pub async fn create_server_config(
        &self,
        server_path: &Path,
        record: &ServerRecord,
    ) -> Result<MaterializedConfig> {
        let dir = paths::config_dir(server_path);
        fs::create_dir_all(&dir).await?;

        let session_settings = dir.join(paths::SESSION_SETTINGS_FILE);
        let gameplay_rules = dir.join(paths::GAMEPLAY_RULES_FILE);

        if !self.globals.is_excluded(&record.name) {
            if let Some((session, rules)) = self.load_globals().await {
                fs::write(&session_settings, session).await?;
                fs::write(&gameplay_rules, rules).await?;
                info!(server = %record.name, "global configuration applied verbatim");
                return Ok(MaterializedConfig {
                    session_settings,
                    gameplay_rules,
                    from_global: true,
                });
            }
        } else {
            debug!(server = %record.name, "server excluded from global configuration");
        }

        fs::write(&session_settings, render_session_settings(record)).await?;
        fs::write(&gameplay_rules, render_gameplay_rules(record)).await?;
        info!(server = %record.name, dir = %dir.display(), "configuration documents generated");
        Ok(MaterializedConfig {
            session_settings,
            gameplay_rules,
            from_global: false,
        })
    }

    /// Read the global document pair. Both files must be present for
    /// the override to apply; any read failure quietly disables it.
    async fn load_globals(&self) -> Option<(String, String)> {
        let dir = self.globals.directory.as_ref()?;
        let session = fs::read_to_string(dir.join(paths::SESSION_SETTINGS_FILE))
            .await
            .ok()?;
        let rules = fs::read_to_string(dir.join(paths::GAMEPLAY_RULES_FILE))
            .await
            .ok()?;
        Some((session, rules))
    }
}
