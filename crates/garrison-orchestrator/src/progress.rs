//! ---
//! gsn_section: "01-orchestration"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Primary provisioning orchestration and lifecycle management."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Progress reporting collaborator.

use serde::Serialize;

/// One lifecycle transition inside a provisioning call.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Zero-based step index within the call.
    pub step: usize,
    /// Machine-readable step name (`validating`, `installing`, ...).
    pub step_name: String,
    /// `step / (total_steps - 1) * 100`, rounded.
    pub percent: u8,
    /// Operator-facing description of the transition.
    pub message: String,
}

/// Callback invoked at every transition. Set once per orchestrator
/// instance; a no-op when unset.
pub type ProgressHandler = Box<dyn Fn(ProgressEvent) + Send + Sync>;

pub(crate) fn percent_of(step: usize, total_steps: usize) -> u8 {
    if total_steps <= 1 {
        return 100;
    }
    let ratio = step as f64 / (total_steps - 1) as f64;
    (ratio * 100.0).round() as u8
}
