//! ---
//! gsn_section: "05-launch-artifacts"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Launch artifact synthesis and reverse parsing."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Launch script synthesizer.
//!
//! Builds the start invocation line and the stop artifact pair for a
//! server, and keeps a deliberately separate reverse parser that can
//! reconstruct a tolerant [`garrison_store::ServerRecord`] from a
//! previously generated start artifact, the last-resort state-recovery
//! path when the configuration store has no record.

pub mod parse;
pub mod start;
pub mod stop;

pub use parse::{parse_start_artifact, ParsedStart};
pub use start::{build_start_line, write_start_script, ModResolver, ServerListOnly};
pub use stop::write_stop_scripts;

/// Result alias used throughout the launch crate.
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Error type for launch artifact handling.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// Filesystem access failed.
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    /// The artifact contains no recognizable start invocation.
    #[error("no start invocation found in artifact")]
    MissingInvocation,
    /// The invocation line was found but cannot be tokenized.
    #[error("malformed start invocation: {0}")]
    Malformed(String),
}
