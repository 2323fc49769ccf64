//! ---
//! gsn_section: "02-fleet-data"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Fleet records and configuration-store bindings."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Server and cluster records.
//!
//! Both record types carry a fixed required field set plus a flattened
//! `extra` bag: unknown keys written by older or newer tooling survive a
//! load/store round trip untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

fn default_map() -> String {
    "TheIsland_WP".to_owned()
}

fn default_max_players() -> u32 {
    70
}

/// Strategy for deriving default game ports inside a cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PortAllocationMode {
    /// Consecutive game ports (`base`, `base+1`, ...).
    #[default]
    Sequential,
    /// Even game ports only (`base`, `base+2`, ...).
    Even,
}

impl PortAllocationMode {
    /// Candidate step width for this mode.
    pub fn increment(&self) -> u16 {
        match self {
            PortAllocationMode::Sequential => 1,
            PortAllocationMode::Even => 2,
        }
    }
}

/// The three ports one server process claims.
///
/// The game process binds fixed offsets: query = game + 1,
/// rcon = game + 2. Fleet-wide, no two servers may share any member of
/// their triples.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortTriple {
    /// Primary game traffic port.
    pub game: u16,
    /// Server-browser query port.
    pub query: u16,
    /// Remote-console port.
    pub rcon: u16,
}

impl PortTriple {
    /// Derive the triple from a game port using the fixed offsets.
    pub fn from_game(game: u16) -> Self {
        Self {
            game,
            query: game + 1,
            rcon: game + 2,
        }
    }

    /// All three ports, for claimed-set accounting.
    pub fn ports(&self) -> [u16; 3] {
        [self.game, self.query, self.rcon]
    }

    /// True when no member of `self` appears in `other`.
    pub fn disjoint_from(&self, other: &PortTriple) -> bool {
        !self.ports().iter().any(|p| other.ports().contains(p))
    }
}

/// One provisioned game-server instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerRecord {
    /// Server name; unique within its owning cluster and used as the
    /// store key, so global uniqueness is strongly recommended.
    pub name: String,
    /// Map identifier passed on the launch command line.
    #[serde(default = "default_map")]
    pub map: String,
    /// Primary game traffic port.
    pub game_port: u16,
    /// Server-browser query port (game + 1).
    pub query_port: u16,
    /// Remote-console port (game + 2).
    pub rcon_port: u16,
    /// Player cap advertised to the session.
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    /// Remote-console password.
    #[serde(default)]
    pub admin_password: String,
    /// Join password; empty means open.
    #[serde(default)]
    pub server_password: String,
    /// Owning cluster name; empty for standalone servers.
    #[serde(default)]
    pub cluster_id: String,
    /// Ordered workshop/mod identifiers.
    #[serde(default)]
    pub mods: Vec<String>,
    /// Launch with the anti-cheat service disabled.
    #[serde(default)]
    pub disable_anti_cheat: bool,
    /// URL the server polls for dynamic configuration.
    #[serde(default)]
    pub custom_dynamic_config_url: String,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Last settings-update timestamp.
    pub updated: DateTime<Utc>,
    /// Passthrough bag for fields this tooling does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ServerRecord {
    /// Construct a record with defaults for everything but identity and ports.
    pub fn new(name: impl Into<String>, ports: PortTriple) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            map: default_map(),
            game_port: ports.game,
            query_port: ports.query,
            rcon_port: ports.rcon,
            max_players: default_max_players(),
            admin_password: String::new(),
            server_password: String::new(),
            cluster_id: String::new(),
            mods: Vec::new(),
            disable_anti_cheat: false,
            custom_dynamic_config_url: String::new(),
            created: now,
            updated: now,
            extra: serde_json::Map::new(),
        }
    }

    /// The port triple this server claims.
    pub fn port_triple(&self) -> PortTriple {
        PortTriple {
            game: self.game_port,
            query: self.query_port,
            rcon: self.rcon_port,
        }
    }

    /// True when the server belongs to a cluster.
    pub fn is_clustered(&self) -> bool {
        !self.cluster_id.is_empty()
    }

    /// Shallow-merge a JSON settings patch over this record.
    ///
    /// Patch keys win over existing values; keys the record does not
    /// model land in the `extra` bag. `updated` is stamped, `created`
    /// and `name` are preserved from the original record.
    pub fn merged_with(&self, patch: &serde_json::Value) -> Result<ServerRecord> {
        let patch_map = patch.as_object().ok_or(StoreError::InvalidPatch)?;
        let mut value = serde_json::to_value(self)?;
        let map = value
            .as_object_mut()
            .expect("serialized record is an object");
        for (key, val) in patch_map {
            map.insert(key.clone(), val.clone());
        }
        let mut merged: ServerRecord = serde_json::from_value(value)?;
        merged.name = self.name.clone();
        merged.created = self.created;
        merged.updated = Utc::now();
        Ok(merged)
    }
}

/// One named group of coordinated servers sharing a cluster identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterRecord {
    /// Cluster name, charset `[A-Za-z0-9_-]+`.
    pub name: String,
    /// Operator-facing description.
    #[serde(default)]
    pub description: String,
    /// First game port considered for default assignment.
    pub base_port: u16,
    /// Default port derivation strategy.
    #[serde(default)]
    pub port_allocation_mode: PortAllocationMode,
    /// Ordered member servers. The ordering is stable and is the basis
    /// for deterministic default port derivation.
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Passthrough bag for fields this tooling does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ClusterRecord {
    /// Construct an empty cluster record.
    pub fn new(name: impl Into<String>, base_port: u16, mode: PortAllocationMode) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            base_port,
            port_allocation_mode: mode,
            servers: Vec::new(),
            created: Utc::now(),
            extra: serde_json::Map::new(),
        }
    }

    /// Find a member server by name.
    pub fn server(&self, name: &str) -> Option<&ServerRecord> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Find a member server by name, mutably.
    pub fn server_mut(&mut self, name: &str) -> Option<&mut ServerRecord> {
        self.servers.iter_mut().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn triple_offsets_are_fixed() {
        let triple = PortTriple::from_game(7777);
        assert_eq!(triple.query, 7778);
        assert_eq!(triple.rcon, 7779);
    }

    #[test]
    fn triples_sharing_any_port_are_not_disjoint() {
        let a = PortTriple::from_game(7000);
        let b = PortTriple::from_game(7002); // b.game == a.rcon
        assert!(!a.disjoint_from(&b));
        assert!(a.disjoint_from(&PortTriple::from_game(7003)));
    }

    #[test]
    fn extra_fields_survive_round_trip() {
        let raw = json!({
            "name": "alpha-01",
            "game_port": 7777,
            "query_port": 7778,
            "rcon_port": 7779,
            "created": "2026-01-05T10:00:00Z",
            "updated": "2026-01-05T10:00:00Z",
            "legacy_flag": true,
        });
        let record: ServerRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.extra["legacy_flag"], json!(true));
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["legacy_flag"], json!(true));
    }

    #[test]
    fn merge_overwrites_known_and_keeps_unknown_keys() {
        let mut record = ServerRecord::new("alpha-01", PortTriple::from_game(7777));
        record.max_players = 40;
        let merged = record
            .merged_with(&json!({"max_players": 100, "theme": "winter"}))
            .unwrap();
        assert_eq!(merged.max_players, 100);
        assert_eq!(merged.extra["theme"], json!("winter"));
        assert_eq!(merged.name, "alpha-01");
        assert_eq!(merged.created, record.created);
        assert!(merged.updated >= record.updated);
    }

    #[test]
    fn merge_rejects_non_object_patch() {
        let record = ServerRecord::new("alpha-01", PortTriple::from_game(7777));
        assert!(matches!(
            record.merged_with(&json!([1, 2])),
            Err(StoreError::InvalidPatch)
        ));
    }
}
