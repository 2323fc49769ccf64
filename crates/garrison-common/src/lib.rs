//! ---
//! gsn_section: "01-shared-runtime"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Shared primitives and utilities for the fleet runtime."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Shared primitives for the Garrison orchestrator workspace.
//! This crate exposes configuration loading, logging initialisation,
//! fleet path conventions, and timestamp helpers consumed across the
//! workspace.

pub mod config;
pub mod logging;
pub mod paths;
pub mod time;

pub use config::{
    AppConfig, BackupConfig, GlobalConfigSettings, InstallerConfig, LoggingConfig, PathsConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use paths::{
    CONFIG_DIR_RELATIVE, GAMEPLAY_RULES_FILE, SAVE_STATE_RELATIVE, SERVER_BINARY_NAME,
    SERVER_BINARY_RELATIVE, SESSION_SETTINGS_FILE, START_SCRIPT_NAME, STOP_FILTER_SCRIPT_NAME,
    STOP_SCRIPT_NAME,
};
pub use time::timestamp_slug;
