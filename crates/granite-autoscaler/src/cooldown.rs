//! Cooldown admission policy.
//!
//! Pure apart from logging: the decision is a function of the snapshot,
//! the suggested size, the saved state, and the clock. It neither reads
//! nor writes state; the orchestrator owns both.

use tracing::{debug, info};

use crate::state::ScalingState;
use crate::types::InstanceSnapshot;

const MS_PER_MINUTE: i64 = 60_000;

/// Decides whether a non-trivial suggested size may be acted on now.
///
/// Direction picks the cooldown: scale-out uses
/// `scale_out_cooling_minutes`, scale-in uses `scale_in_cooling_minutes`.
/// An overloaded instance overrides both with
/// `overload_cooling_minutes`, defaulting to the scale-out cooldown when
/// unset. The cooldown is measured from the last completion when known,
/// otherwise from the last request; an instance that has never scaled is
/// admitted unconditionally.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn admits(
    snapshot: &InstanceSnapshot,
    suggested_size: u64,
    state: &ScalingState,
    now_ms: i64,
) -> bool {
    let scaling_out = suggested_size > snapshot.current_size;

    let cooling_minutes = if snapshot.is_overloaded {
        match snapshot.overload_cooling_minutes {
            Some(minutes) => minutes,
            None => {
                info!(
                    instance = %snapshot.instance_id,
                    minutes = snapshot.scale_out_cooling_minutes,
                    "no overload cooldown configured, using scale-out cooldown"
                );
                snapshot.scale_out_cooling_minutes
            }
        }
    } else if scaling_out {
        snapshot.scale_out_cooling_minutes
    } else {
        snapshot.scale_in_cooling_minutes
    };

    let reference = state.cooldown_reference();
    if reference == 0 {
        debug!(instance = %snapshot.instance_id, "no previous resize, admitting");
        return true;
    }

    let elapsed = now_ms - reference;
    let required = cooling_minutes as i64 * MS_PER_MINUTE;
    let admitted = elapsed >= required;

    debug!(
        instance = %snapshot.instance_id,
        scaling_out,
        overloaded = snapshot.is_overloaded,
        elapsed_ms = elapsed,
        required_ms = required,
        admitted,
        "cooldown evaluated"
    );
    admitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CapacityUnits, StateStoreSpec};

    const NOW: i64 = 1_700_000_000_000;

    fn snapshot() -> InstanceSnapshot {
        InstanceSnapshot {
            project_id: "proj-1".to_string(),
            instance_id: "db-main".to_string(),
            units: CapacityUnits::Nodes,
            current_size: 3,
            min_size: 1,
            max_size: 10,
            scale_out_cooling_minutes: 5,
            scale_in_cooling_minutes: 30,
            overload_cooling_minutes: None,
            is_overloaded: false,
            scaling_method: "STEPWISE".to_string(),
            downstream_topic: None,
            metrics: Vec::new(),
            state_store: StateStoreSpec::default(),
        }
    }

    fn completed_at(ms: i64) -> ScalingState {
        ScalingState {
            last_scaling_timestamp: ms,
            last_scaling_complete_timestamp: Some(ms),
            ..ScalingState::default()
        }
    }

    #[test]
    fn never_scaled_admits_unconditionally() {
        assert!(admits(&snapshot(), 5, &ScalingState::default(), NOW));
    }

    #[test]
    fn scale_out_within_cooldown_denied() {
        // Completed 1 minute ago, scale-out cooldown is 5 minutes.
        let state = completed_at(NOW - 60_000);
        assert!(!admits(&snapshot(), 5, &state, NOW));
    }

    #[test]
    fn scale_out_after_cooldown_admitted() {
        let state = completed_at(NOW - 5 * 60_000);
        assert!(admits(&snapshot(), 5, &state, NOW));
    }

    #[test]
    fn scale_in_uses_longer_cooldown() {
        // 10 minutes ago: past the 5-minute scale-out window, inside the
        // 30-minute scale-in window.
        let state = completed_at(NOW - 10 * 60_000);
        assert!(admits(&snapshot(), 5, &state, NOW));
        assert!(!admits(&snapshot(), 2, &state, NOW));
    }

    #[test]
    fn overload_override_shortens_the_window() {
        let mut snap = snapshot();
        snap.is_overloaded = true;
        snap.scale_out_cooling_minutes = 10;
        snap.overload_cooling_minutes = Some(1);

        let state = completed_at(NOW - 120_000);
        assert!(admits(&snap, 5, &state, NOW));
    }

    #[test]
    fn overload_without_override_defaults_to_scale_out() {
        let mut snap = snapshot();
        snap.is_overloaded = true;
        snap.overload_cooling_minutes = None;

        // 2 minutes ago with a 5-minute scale-out cooldown: denied, even
        // for a scale-in suggestion.
        let state = completed_at(NOW - 120_000);
        assert!(!admits(&snap, 2, &state, NOW));

        let state = completed_at(NOW - 6 * 60_000);
        assert!(admits(&snap, 2, &state, NOW));
    }

    #[test]
    fn falls_back_to_request_timestamp_without_completion() {
        let state = ScalingState {
            last_scaling_timestamp: NOW - 60_000,
            ..ScalingState::default()
        };
        assert!(!admits(&snapshot(), 5, &state, NOW));
    }

    #[test]
    fn decision_is_deterministic() {
        let snap = snapshot();
        let state = completed_at(NOW - 4 * 60_000);
        let first = admits(&snap, 5, &state, NOW);
        for _ in 0..10 {
            assert_eq!(admits(&snap, 5, &state, NOW), first);
        }
    }
}
