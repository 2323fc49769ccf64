//! ---
//! gsn_section: "03-binary-installation"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Fetch-tool discovery and server executable installation."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Binary installer.
//!
//! Drives the external fetch tool (SteamCMD) to materialize a server's
//! executable tree inside the server's own directory. The tool's exit
//! code is unreliable (it reports nonzero on benign conditions), so
//! success is judged solely by the presence of the launch executable
//! after the run (see [`install::Installer`]).

use std::path::PathBuf;
use std::time::Duration;

pub mod install;
pub mod steamcmd;

pub use install::{InstallOutcome, Installer, OutputMode, UpdateReport};
pub use steamcmd::SteamCmd;

/// Result alias used throughout the installer crate.
pub type Result<T> = std::result::Result<T, InstallerError>;

/// Error type for the installation subsystem.
#[derive(Debug, thiserror::Error)]
pub enum InstallerError {
    /// The fetch tool could not be located anywhere.
    #[error("fetch tool not found; searched {searched:?}")]
    ToolMissing {
        /// Locations that were checked, in order.
        searched: Vec<PathBuf>,
    },
    /// The tool ran and failed, and the launch executable is absent.
    #[error("fetch tool invocation failed for {target} (exit status {status:?})")]
    ToolInvocation {
        /// Entity the installation was for.
        target: String,
        /// Reported exit code, when the process exited at all.
        status: Option<i32>,
    },
    /// The tool exceeded its hard deadline and the executable is absent.
    #[error("fetch tool timed out after {timeout:?} for {target}")]
    ToolInvocationTimeout {
        /// Entity the installation was for.
        target: String,
        /// Configured ceiling that was exceeded.
        timeout: Duration,
    },
    /// The tool claimed success yet the launch executable never appeared.
    #[error("launch executable missing after apparently successful run for {target}")]
    VerificationMismatch {
        /// Entity the installation was for.
        target: String,
    },
    /// No installation directory exists for the named server.
    #[error("no installation directory found for server '{name}'")]
    TargetMissing {
        /// Server that was looked for.
        name: String,
    },
    /// Filesystem access failed.
    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
    /// Downloading the pinned tool archive failed.
    #[error("fetch tool download failed: {0}")]
    Download(#[from] reqwest::Error),
}
