//! ---
//! gsn_section: "04-configuration-materialization"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Materializes per-server configuration documents."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Document generators.
//!
//! The game process consumes a foreign format: flat `key=value` lists
//! under bracketed section headers. Every field the record leaves unset
//! falls back to a compiled-in default so a fresh server always boots
//! with a complete document.

use std::fmt::Write as _;

use garrison_store::ServerRecord;

/// Render the session/network document (`GameUserSettings.ini`).
pub fn render_session_settings(record: &ServerRecord) -> String {
    let mut doc = String::new();

    push_section(&mut doc, "ServerSettings");
    push_kv(&mut doc, "RCONEnabled", "True");
    push_kv(&mut doc, "RCONPort", &record.rcon_port.to_string());
    push_kv(&mut doc, "ServerAdminPassword", &record.admin_password);
    push_kv(&mut doc, "ServerPassword", &record.server_password);
    push_kv(&mut doc, "ServerPVE", "False");
    push_kv(&mut doc, "ServerCrosshair", "True");
    push_kv(&mut doc, "AllowThirdPersonPlayer", "True");
    push_kv(&mut doc, "DifficultyOffset", "1.0");
    push_kv(&mut doc, "XPMultiplier", "1.0");
    push_kv(&mut doc, "TamingSpeedMultiplier", "1.0");
    push_kv(&mut doc, "HarvestAmountMultiplier", "1.0");
    if !record.custom_dynamic_config_url.is_empty() {
        push_kv(
            &mut doc,
            "CustomDynamicConfigUrl",
            &format!("\"{}\"", record.custom_dynamic_config_url),
        );
    }
    doc.push('\n');

    push_section(&mut doc, "SessionSettings");
    push_kv(&mut doc, "SessionName", &record.name);
    push_kv(&mut doc, "Port", &record.game_port.to_string());
    push_kv(&mut doc, "QueryPort", &record.query_port.to_string());
    doc.push('\n');

    push_section(&mut doc, "/Script/Engine.GameSession");
    push_kv(&mut doc, "MaxPlayers", &record.max_players.to_string());
    doc.push('\n');

    push_section(&mut doc, "MessageOfTheDay");
    push_kv(&mut doc, "Message", "");
    push_kv(&mut doc, "Duration", "20");

    doc
}

/// Render the gameplay-rules document (`Game.ini`).
pub fn render_gameplay_rules(_record: &ServerRecord) -> String {
    let mut doc = String::new();
    push_section(&mut doc, "/script/shootergame.shootergamemode");
    push_kv(&mut doc, "BabyMatureSpeedMultiplier", "1.0");
    push_kv(&mut doc, "EggHatchSpeedMultiplier", "1.0");
    push_kv(&mut doc, "MatingIntervalMultiplier", "1.0");
    push_kv(&mut doc, "LayEggIntervalMultiplier", "1.0");
    push_kv(&mut doc, "bDisableStructureDecayPvE", "False");
    push_kv(&mut doc, "bAllowUnlimitedRespecs", "True");
    doc
}

fn push_section(doc: &mut String, name: &str) {
    let _ = writeln!(doc, "[{name}]");
}

fn push_kv(doc: &mut String, key: &str, value: &str) {
    let _ = writeln!(doc, "{key}={value}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use garrison_store::PortTriple;

    fn record() -> ServerRecord {
        let mut record = ServerRecord::new("alpha-01", PortTriple::from_game(7010));
        record.admin_password = "rcon-secret".into();
        record.server_password = "join-me".into();
        record.max_players = 42;
        record
    }

    #[test]
    fn session_document_carries_record_fields() {
        let doc = render_session_settings(&record());
        assert!(doc.contains("[ServerSettings]"));
        assert!(doc.contains("RCONPort=7012"));
        assert!(doc.contains("ServerAdminPassword=rcon-secret"));
        assert!(doc.contains("ServerPassword=join-me"));
        assert!(doc.contains("SessionName=alpha-01"));
        assert!(doc.contains("Port=7010"));
        assert!(doc.contains("QueryPort=7011"));
        assert!(doc.contains("MaxPlayers=42"));
    }

    #[test]
    fn dynamic_config_url_is_quoted_and_optional() {
        let mut with_url = record();
        with_url.custom_dynamic_config_url = "https://example.invalid/dyn.ini".into();
        let doc = render_session_settings(&with_url);
        assert!(doc.contains("CustomDynamicConfigUrl=\"https://example.invalid/dyn.ini\""));

        let doc = render_session_settings(&record());
        assert!(!doc.contains("CustomDynamicConfigUrl"));
    }

    #[test]
    fn every_line_is_a_section_header_or_key_value() {
        let doc = render_session_settings(&record());
        for line in doc.lines().filter(|l| !l.is_empty()) {
            assert!(
                line.starts_with('[') || line.contains('='),
                "unexpected line: {line}"
            );
        }
    }

    #[test]
    fn gameplay_rules_document_has_the_game_mode_section() {
        let doc = render_gameplay_rules(&record());
        assert!(doc.starts_with("[/script/shootergame.shootergamemode]"));
        assert!(doc.contains("BabyMatureSpeedMultiplier=1.0"));
    }
}
