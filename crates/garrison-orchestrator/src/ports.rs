//! ---
//! gsn_section: "01-orchestration"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Primary provisioning orchestration and lifecycle management."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Port allocation.
//!
//! Pure computation over the set of triples already claimed by the
//! entire fleet, every cluster plus every standalone server, since
//! the non-overlap invariant is global, not per cluster.

use std::collections::BTreeSet;

use garrison_store::{PortAllocationMode, PortTriple};

/// Compute the next non-conflicting port triple.
///
/// The candidate game port starts at `max(base_port,
/// highest_existing_game_port + 1)` and advances by the mode's
/// increment (even mode also rounds the start up to an even port) until
/// the candidate and both fixed offsets are simultaneously unclaimed.
/// Returns `None` when the search runs off the end of the port space.
pub fn next_available_triple(
    existing: &[PortTriple],
    base_port: u16,
    mode: PortAllocationMode,
) -> Option<PortTriple> {
    let claimed: BTreeSet<u32> = existing
        .iter()
        .flat_map(|t| t.ports())
        .map(u32::from)
        .collect();
    let highest_game = existing.iter().map(|t| u32::from(t.game)).max();

    let mut candidate = highest_game
        .map(|h| h + 1)
        .unwrap_or(0)
        .max(u32::from(base_port));
    if mode == PortAllocationMode::Even && candidate % 2 == 1 {
        candidate += 1;
    }
    let step = u32::from(mode.increment());

    while candidate + 2 <= u32::from(u16::MAX) {
        let free = (candidate..=candidate + 2).all(|p| !claimed.contains(&p));
        if free {
            return Some(PortTriple::from_game(candidate as u16));
        }
        candidate += step;
    }
    None
}
