//! ---
//! gsn_section: "01-orchestration"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Primary provisioning orchestration and lifecycle management."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Provisioning orchestration engine.
//!
//! Composes the installer, configuration materializer, launch script
//! synthesizer, and backup manager into cluster/server lifecycle
//! operations. Within one `create()` call servers are provisioned
//! strictly in order, each server's three steps sequential before the
//! next server begins; completed servers are never rolled back when a
//! later one fails.

pub mod lifecycle;
pub mod ports;
pub mod progress;
pub mod settings;

pub use lifecycle::{
    ClusterProvisionSpec, ClusterView, DeleteOptions, FleetView, Orchestrator, ServerOverride,
    ServerProvisionSpec, StartOutcome,
};
pub use ports::next_available_triple;
pub use progress::{ProgressEvent, ProgressHandler};
pub use settings::{ClusterSettingsPatch, SettingsFlags};

/// Result alias used throughout the orchestrator crate.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Error type composing every subsystem failure the orchestrator can
/// surface.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A request was rejected before any side effect took place.
    #[error("validation failed: {0}")]
    Validation(String),
    /// No record or directory exists for the named server.
    #[error("server '{0}' not found")]
    ServerNotFound(String),
    /// No cluster or standalone server carries the name.
    #[error("no cluster or server named '{0}'")]
    OwnerNotFound(String),
    /// The server's launch executable is absent.
    #[error("server '{0}' is not installed")]
    NotInstalled(String),
    /// A mid-cluster provisioning failure. Completed servers are kept;
    /// remaining servers were abandoned.
    #[error("provisioning aborted at server '{server}' ({completed}/{total} completed, completed servers are kept): {source}")]
    PartialFailure {
        /// Server whose pipeline step failed.
        server: String,
        /// Servers fully provisioned before the failure.
        completed: usize,
        /// Servers the call was asked for.
        total: usize,
        /// The underlying step failure.
        #[source]
        source: Box<OrchestratorError>,
    },
    /// Configuration-store failure.
    #[error(transparent)]
    Store(#[from] garrison_store::StoreError),
    /// Binary-installer failure.
    #[error(transparent)]
    Installer(#[from] garrison_installer::InstallerError),
    /// Configuration materializer failure.
    #[error(transparent)]
    Confgen(#[from] garrison_confgen::ConfgenError),
    /// Launch artifact failure.
    #[error(transparent)]
    Launch(#[from] garrison_launch::LaunchError),
    /// Backup/restore failure.
    #[error(transparent)]
    Backup(#[from] garrison_backup::BackupError),
    /// Direct filesystem failure.
    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
}
