//! ---
//! gsn_section: "03-binary-installation"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Fetch-tool discovery and server executable installation."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Fetch-tool discovery and auto-installation.

use std::path::PathBuf;

use flate2::read::GzDecoder;
use garrison_common::config::InstallerConfig;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{InstallerError, Result};

/// Handle on the external fetch tool.
///
/// Owns its configuration and the discovered executable path. One
/// instance per process; isolation across fleets is achieved with
/// separate instances, never shared globals.
#[derive(Debug)]
pub struct SteamCmd {
    config: InstallerConfig,
    install_dir: PathBuf,
    resolved: Mutex<Option<PathBuf>>,
}

impl SteamCmd {
    /// Create a handle from installer settings; `install_dir` is where
    /// an auto-installed copy of the tool is unpacked.
    pub fn new(config: InstallerConfig, install_dir: PathBuf) -> Self {
        Self {
            config,
            install_dir,
            resolved: Mutex::new(None),
        }
    }

    /// Settings this handle was built from.
    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Locate the tool executable, downloading it when permitted.
    ///
    /// Order: previously discovered path → configured path → well-known
    /// locations → auto-install. Fails with `ToolMissing` listing every
    /// location that was checked.
    pub async fn ensure(&self) -> Result<PathBuf> {
        let mut resolved = self.resolved.lock().await;
        if let Some(path) = resolved.as_ref() {
            if path.exists() {
                return Ok(path.clone());
            }
            // The tool vanished since discovery; fall through and search again.
            warn!(path = %path.display(), "previously discovered fetch tool disappeared");
            *resolved = None;
        }

        let mut searched = Vec::new();

        if self.config.executable.exists() {
            debug!(path = %self.config.executable.display(), "fetch tool found at configured path");
            *resolved = Some(self.config.executable.clone());
            return Ok(self.config.executable.clone());
        }
        searched.push(self.config.executable.clone());

        for candidate in &self.config.well_known_locations {
            if candidate.exists() {
                info!(path = %candidate.display(), "fetch tool found at well-known location");
                *resolved = Some(candidate.clone());
                return Ok(candidate.clone());
            }
            searched.push(candidate.clone());
        }

        if !self.config.auto_install {
            return Err(InstallerError::ToolMissing { searched });
        }

        self.download_and_unpack().await?;

        let unpacked = self.install_dir.join("steamcmd.sh");
        if unpacked.exists() {
            info!(path = %unpacked.display(), "fetch tool auto-installed");
            *resolved = Some(unpacked.clone());
            return Ok(unpacked);
        }
        searched.push(unpacked);
        Err(InstallerError::ToolMissing { searched })
    }

    /// Fetch the pinned archive and unpack it into the install directory.
    async fn download_and_unpack(&self) -> Result<()> {
        info!(
            url = %self.config.download_url,
            dir = %self.install_dir.display(),
            "downloading fetch tool archive"
        );
        tokio::fs::create_dir_all(&self.install_dir).await?;

        let response = reqwest::get(&self.config.download_url)
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        let mut archive = tar::Archive::new(GzDecoder::new(&bytes[..]));
        archive.unpack(&self.install_dir)?;
        debug!(bytes = bytes.len(), "fetch tool archive unpacked");
        Ok(())
    }
}
