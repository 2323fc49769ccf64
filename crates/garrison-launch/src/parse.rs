//! ---
//! gsn_section: "05-launch-artifacts"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Launch artifact synthesis and reverse parsing."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Tolerant reverse parser for start artifacts.
//!
//! Last-resort state recovery: when the configuration store has no
//! record for a directory, a previously generated start artifact is the
//! only authoritative trace left. The parser is kept separate from the
//! generator; the round-trip tests below are its contract. Fields that
//! are never encoded on the command line (a cluster server's admin
//! password, for example) are intentionally lost.

use garrison_common::paths;
use garrison_store::{PortTriple, ServerRecord};

use crate::{LaunchError, Result};

const DEFAULT_GAME_PORT: u16 = 7777;

/// Fields recovered from one start invocation line. Everything is
/// optional; conversion into a [`ServerRecord`] fills defaults.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedStart {
    /// Map identifier (first query segment).
    pub map: Option<String>,
    /// `SessionName` token.
    pub session_name: Option<String>,
    /// `Port` token.
    pub game_port: Option<u16>,
    /// `QueryPort` token.
    pub query_port: Option<u16>,
    /// `RCONPort` token.
    pub rcon_port: Option<u16>,
    /// `MaxPlayers` token.
    pub max_players: Option<u32>,
    /// `ServerPassword` token.
    pub server_password: Option<String>,
    /// `ServerAdminPassword` token (standalone artifacts only).
    pub admin_password: Option<String>,
    /// `CustomDynamicConfigUrl` token.
    pub custom_dynamic_config_url: Option<String>,
    /// `-mods=` trailing flag.
    pub mods: Vec<String>,
    /// `-NoAntiCheat` trailing flag.
    pub disable_anti_cheat: bool,
    /// `-clusterid=` trailing flag.
    pub cluster_id: Option<String>,
}

impl ParsedStart {
    /// Convert into a record, defaulting every missing field.
    /// `fallback_name` is used when the artifact carries no session name
    /// (typically the directory name the artifact was found in).
    pub fn into_record(self, fallback_name: &str) -> ServerRecord {
        let game = self.game_port.unwrap_or(DEFAULT_GAME_PORT);
        let triple = PortTriple {
            game,
            query: self.query_port.unwrap_or(game + 1),
            rcon: self.rcon_port.unwrap_or(game + 2),
        };
        let name = self
            .session_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| fallback_name.to_owned());

        let mut record = ServerRecord::new(name, triple);
        if let Some(map) = self.map.filter(|m| !m.is_empty()) {
            record.map = map;
        }
        if let Some(max_players) = self.max_players {
            record.max_players = max_players;
        }
        record.server_password = self.server_password.unwrap_or_default();
        record.admin_password = self.admin_password.unwrap_or_default();
        record.custom_dynamic_config_url = self.custom_dynamic_config_url.unwrap_or_default();
        record.mods = self.mods;
        record.disable_anti_cheat = self.disable_anti_cheat;
        record.cluster_id = self.cluster_id.unwrap_or_default();
        record
    }
}

/// Parse a start artifact's content back into its encoded fields.
///
/// Accepts the whole script: comments, shebang and blank lines are
/// skipped, an optional leading `exec` is tolerated, and unknown
/// query keys or trailing flags are ignored rather than rejected.
pub fn parse_start_artifact(content: &str) -> Result<ParsedStart> {
    let line = content
        .lines()
        .map(str::trim)
        .find(|line| {
            !line.is_empty() && !line.starts_with('#') && line.contains(paths::SERVER_BINARY_NAME)
        })
        .ok_or(LaunchError::MissingInvocation)?;

    let line = line.strip_prefix("exec ").unwrap_or(line).trim();

    let open = line
        .find('"')
        .ok_or_else(|| LaunchError::Malformed("missing opening quote".into()))?;
    let close = line[open + 1..]
        .find('"')
        .map(|i| open + 1 + i)
        .ok_or_else(|| LaunchError::Malformed("missing closing quote".into()))?;

    let query = &line[open + 1..close];
    let trailing = &line[close + 1..];

    let mut parsed = ParsedStart::default();

    let mut segments = query.split('?');
    parsed.map = segments.next().map(str::to_owned);
    for segment in segments {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        match key {
            "SessionName" => parsed.session_name = Some(value.to_owned()),
            "Port" => parsed.game_port = value.parse().ok(),
            "QueryPort" => parsed.query_port = value.parse().ok(),
            "RCONPort" => parsed.rcon_port = value.parse().ok(),
            "MaxPlayers" => parsed.max_players = value.parse().ok(),
            "ServerPassword" => parsed.server_password = Some(value.to_owned()),
            "ServerAdminPassword" => parsed.admin_password = Some(value.to_owned()),
            "CustomDynamicConfigUrl" => {
                parsed.custom_dynamic_config_url = Some(value.trim_matches('"').to_owned())
            }
            _ => {}
        }
    }

    for token in trailing.split_whitespace() {
        if let Some(mods) = token.strip_prefix("-mods=") {
            parsed.mods = mods
                .split(',')
                .filter(|m| !m.is_empty())
                .map(str::to_owned)
                .collect();
        } else if token == "-NoAntiCheat" {
            parsed.disable_anti_cheat = true;
        } else if let Some(id) = token.strip_prefix("-clusterid=") {
            parsed.cluster_id = Some(id.to_owned());
        }
        // -ClusterDirOverride and unknown flags are derivable or
        // irrelevant for recovery; skip them.
    }

    Ok(parsed)
}
