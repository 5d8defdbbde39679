//! Ground↔air edge detection.
//!
//! Runs before the general phase pass each tick. A flip of `on_ground`
//! between the previous and current observation produces an immediate `T/O`
//! or `T/D` row; the phase pass then skips the hex. Flips that arrive inside
//! the flap window of the opposite edge are suppressed, and flips that
//! contradict the recorded previous state are dropped as state violations.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::aircraft::{Aircraft, Phase, PhaseChange, PhaseEvent};
use crate::config::PhasesConfig;

/// An immediate edge detected for one hex this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroundTransition {
    pub phase: Phase,
    pub event: PhaseEvent,
}

/// Compare the previous reconciled state against the current observation.
/// Returns the edge to record, or None.
pub fn detect_transition(
    previous: &Aircraft,
    now_on_ground: bool,
    last_phase: Option<&PhaseChange>,
    now: DateTime<Utc>,
    config: &PhasesConfig,
) -> Option<GroundTransition> {
    if previous.on_ground == now_on_ground {
        return None;
    }

    let flap_window = config.phase_flapping_prevention_seconds;
    let within_flap_window = |phase: Phase| {
        last_phase
            .map(|p| p.phase == phase && (now - p.timestamp).num_seconds() < flap_window)
            .unwrap_or(false)
    };

    if now_on_ground {
        // Airborne → ground: touchdown, unless we just recorded a takeoff
        // (one bounced transponder frame must not undo a real departure)
        if within_flap_window(Phase::Takeoff) {
            debug!(
                hex = previous.hex,
                "suppressing T/D within flap window of recent T/O"
            );
            metrics::counter!("tracker.transitions.suppressed_total").increment(1);
            return None;
        }
        Some(GroundTransition {
            phase: Phase::Touchdown,
            event: PhaseEvent::Landing,
        })
    } else {
        // Ground → airborne: takeoff, symmetric anti-flap against T/D
        if within_flap_window(Phase::Touchdown) {
            debug!(
                hex = previous.hex,
                "suppressing T/O within flap window of recent T/D"
            );
            metrics::counter!("tracker.transitions.suppressed_total").increment(1);
            return None;
        }
        Some(GroundTransition {
            phase: Phase::Takeoff,
            event: PhaseEvent::Takeoff,
        })
    }
}

/// Invariant guard: a `T/O` must come from an on-ground predecessor and a
/// `T/D` from an airborne one. Conflicting transitions are logged and
/// dropped; the previous phase stands.
pub fn check_transition_invariant(
    hex: &str,
    previous_on_ground: bool,
    transition: GroundTransition,
) -> bool {
    let valid = match transition.phase {
        Phase::Takeoff => previous_on_ground,
        Phase::Touchdown => !previous_on_ground,
        _ => true,
    };
    if !valid {
        warn!(
            hex,
            phase = %transition.phase,
            previous_on_ground,
            "dropping transition conflicting with previous ground state"
        );
        metrics::counter!("tracker.transitions.state_violations_total").increment(1);
    }
    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adsb::{SourceKind, Target};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn aircraft(on_ground: bool) -> Aircraft {
        let mut a = Aircraft::from_target(Target {
            hex: "c0ffee".to_string(),
            flight: "ACA101".to_string(),
            lat: 43.68,
            lon: -79.65,
            alt_baro: if on_ground { 0.0 } else { 500.0 },
            alt_geom: 0.0,
            gs: if on_ground { 15.0 } else { 150.0 },
            tas: 0.0,
            true_heading: 90.0,
            mag_heading: 90.0,
            track: 90.0,
            baro_rate: 0.0,
            squawk: "1200".to_string(),
            category: "A3".to_string(),
            on_ground: Some(on_ground),
            source: SourceKind::Local,
            timestamp: now(),
        });
        a.on_ground = on_ground;
        a
    }

    fn phase_at(phase: Phase, seconds_ago: i64) -> PhaseChange {
        PhaseChange {
            phase,
            timestamp: now() - chrono::Duration::seconds(seconds_ago),
            event_type: None,
            adsb_id: None,
        }
    }

    #[test]
    fn no_edge_without_flip() {
        let config = PhasesConfig::default();
        assert!(detect_transition(&aircraft(true), true, None, now(), &config).is_none());
        assert!(detect_transition(&aircraft(false), false, None, now(), &config).is_none());
    }

    #[test]
    fn ground_to_air_is_takeoff() {
        let config = PhasesConfig::default();
        let t = detect_transition(&aircraft(true), false, None, now(), &config).unwrap();
        assert_eq!(t.phase, Phase::Takeoff);
        assert_eq!(t.event, PhaseEvent::Takeoff);
    }

    #[test]
    fn air_to_ground_is_landing() {
        let config = PhasesConfig::default();
        let t = detect_transition(&aircraft(false), true, None, now(), &config).unwrap();
        assert_eq!(t.phase, Phase::Touchdown);
        assert_eq!(t.event, PhaseEvent::Landing);
    }

    #[test]
    fn touchdown_suppressed_right_after_takeoff() {
        let config = PhasesConfig::default();
        let last = phase_at(Phase::Takeoff, 10);
        let t = detect_transition(&aircraft(false), true, Some(&last), now(), &config);
        assert!(t.is_none(), "bounced ground flag must not undo a takeoff");
    }

    #[test]
    fn touchdown_allowed_after_flap_window() {
        let config = PhasesConfig::default();
        let last = phase_at(
            Phase::Takeoff,
            config.phase_flapping_prevention_seconds + 1,
        );
        let t = detect_transition(&aircraft(false), true, Some(&last), now(), &config);
        assert_eq!(t.unwrap().phase, Phase::Touchdown);
    }

    #[test]
    fn takeoff_suppressed_right_after_touchdown() {
        let config = PhasesConfig::default();
        let last = phase_at(Phase::Touchdown, 10);
        let t = detect_transition(&aircraft(true), false, Some(&last), now(), &config);
        assert!(t.is_none());
    }

    #[test]
    fn invariant_rejects_takeoff_from_airborne_state() {
        let takeoff = GroundTransition {
            phase: Phase::Takeoff,
            event: PhaseEvent::Takeoff,
        };
        assert!(check_transition_invariant("c0ffee", true, takeoff));
        assert!(!check_transition_invariant("c0ffee", false, takeoff));

        let touchdown = GroundTransition {
            phase: Phase::Touchdown,
            event: PhaseEvent::Landing,
        };
        assert!(check_transition_invariant("c0ffee", false, touchdown));
        assert!(!check_transition_invariant("c0ffee", true, touchdown));
    }
}
