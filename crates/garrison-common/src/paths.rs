//! ---
//! gsn_section: "01-shared-runtime"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Shared primitives and utilities for the fleet runtime."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Fixed on-disk layout contracts shared by every subsystem.
//!
//! The game-server process dictates most of these: SteamCMD unpacks the
//! application archive directly into a server directory, and the server
//! reads its configuration documents from a fixed relative path inside
//! that tree. Installation state is derived solely from the presence of
//! [`SERVER_BINARY_RELATIVE`]; nothing else is trusted.

use std::path::{Path, PathBuf};

/// File name of the launch executable.
pub const SERVER_BINARY_NAME: &str = "ArkAscendedServer.exe";

/// Relative path of the launch executable inside a server directory.
/// Its presence is the sole signal that an installation succeeded.
pub const SERVER_BINARY_RELATIVE: &str = "ShooterGame/Binaries/Win64/ArkAscendedServer.exe";

/// Relative directory holding the two configuration documents the
/// server process reads at startup.
pub const CONFIG_DIR_RELATIVE: &str = "ShooterGame/Saved/Config/WindowsServer";

/// Session/network configuration document file name.
pub const SESSION_SETTINGS_FILE: &str = "GameUserSettings.ini";

/// Gameplay-rules configuration document file name.
pub const GAMEPLAY_RULES_FILE: &str = "Game.ini";

/// Relative root of the mutable save-state subtree (world saves, player
/// profiles, generated config). Backups copy this, never binaries.
pub const SAVE_STATE_RELATIVE: &str = "ShooterGame/Saved";

/// Generated start artifact file name inside a server directory.
pub const START_SCRIPT_NAME: &str = "start_server.sh";

/// Generated stop wrapper file name inside a server directory.
pub const STOP_SCRIPT_NAME: &str = "stop_server.sh";

/// Generated process-filter-and-terminate script file name.
pub const STOP_FILTER_SCRIPT_NAME: &str = "stop_filter.sh";

/// Marker (launch executable) path for a given server directory.
pub fn marker_path(server_dir: &Path) -> PathBuf {
    server_dir.join(SERVER_BINARY_RELATIVE)
}

/// Directory holding the generated configuration documents.
pub fn config_dir(server_dir: &Path) -> PathBuf {
    server_dir.join(CONFIG_DIR_RELATIVE)
}

/// Root of the save-state subtree for a server directory.
pub fn save_state_dir(server_dir: &Path) -> PathBuf {
    server_dir.join(SAVE_STATE_RELATIVE)
}
