//! Sensor sanity checks and ground-state inference.
//!
//! ADS-B feeds occasionally emit a zeroed altitude or speed for one frame
//! while the aircraft is obviously still at altitude. The validator keeps the
//! previous value in those cases; everything else passes through untouched.

use tracing::debug;

use crate::config::PhasesConfig;

/// Corrected (tas, gs, altitude) triple
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedSensors {
    pub tas: f64,
    pub gs: f64,
    pub altitude: f64,
}

/// Validate the current sensor readings against the previous observation.
/// Corrections are idempotent: applying the result a second time with the
/// same previous values yields the same output.
pub fn validate_sensors(
    hex: &str,
    current_tas: f64,
    current_gs: f64,
    current_alt: f64,
    previous_tas: f64,
    previous_gs: f64,
    previous_alt: f64,
    config: &PhasesConfig,
) -> CorrectedSensors {
    let mut corrected = CorrectedSensors {
        tas: current_tas,
        gs: current_gs,
        altitude: current_alt,
    };

    // Altitude collapsing to zero from high altitude in one frame is a
    // decode artifact, not a 5,000 fpm descent.
    if previous_alt >= config.impossible_alt_drop_threshold_ft && current_alt == 0.0 {
        debug!(
            hex,
            previous_alt, "altitude dropped to 0 from altitude, keeping previous"
        );
        metrics::counter!("sensors.corrections.altitude_total").increment(1);
        corrected.altitude = previous_alt;
    }

    // Same for speed zeroing out while established at altitude.
    let speed_anomaly = previous_tas >= config.impossible_speed_drop_threshold_kts
        && previous_alt >= config.impossible_speed_drop_min_alt_ft;
    if speed_anomaly && current_tas == 0.0 {
        debug!(
            hex,
            previous_tas, "TAS dropped to 0 at altitude, keeping previous"
        );
        metrics::counter!("sensors.corrections.tas_total").increment(1);
        corrected.tas = previous_tas;
    }
    let gs_anomaly = previous_gs >= config.impossible_speed_drop_threshold_kts
        && previous_alt >= config.impossible_speed_drop_min_alt_ft;
    if gs_anomaly && current_gs == 0.0 {
        debug!(
            hex,
            previous_gs, "ground speed dropped to 0 at altitude, keeping previous"
        );
        metrics::counter!("sensors.corrections.gs_total").increment(1);
        corrected.gs = previous_gs;
    }

    corrected
}

/// Infer whether an aircraft is airborne from its corrected sensors.
///
/// The explicit `on_ground` flag from a source, when present, overrides this
/// (handled by the caller): the inference only runs for feeds that do not
/// carry the flag.
pub fn is_airborne(tas: f64, gs: f64, altitude: f64, config: &PhasesConfig) -> bool {
    // High altitude wins regardless of speed; a transponder can report
    // TAS 0 at FL350.
    if altitude >= config.high_altitude_override_ft {
        return true;
    }
    // Some feeds never report TAS; ground speed stands in when it is absent
    let airspeed = if tas > 0.0 { tas } else { gs };
    if airspeed >= config.high_speed_threshold_kts {
        return true;
    }
    airspeed >= config.flying_min_tas_kts && altitude >= config.flying_min_alt_ft
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PhasesConfig {
        PhasesConfig::default()
    }

    #[test]
    fn passthrough_when_plausible() {
        let c = validate_sensors("abc123", 250.0, 240.0, 12000.0, 255.0, 245.0, 12200.0, &config());
        assert_eq!(
            c,
            CorrectedSensors {
                tas: 250.0,
                gs: 240.0,
                altitude: 12000.0
            }
        );
    }

    #[test]
    fn impossible_altitude_drop_restores_previous() {
        let c = validate_sensors("abc123", 250.0, 240.0, 0.0, 255.0, 245.0, 12000.0, &config());
        assert_eq!(c.altitude, 12000.0);
    }

    #[test]
    fn altitude_drop_below_threshold_passes_through() {
        // Previous altitude under the threshold: a zero reading is plausible
        let c = validate_sensors("abc123", 60.0, 55.0, 0.0, 60.0, 55.0, 3000.0, &config());
        assert_eq!(c.altitude, 0.0);
    }

    #[test]
    fn impossible_speed_drop_restores_previous() {
        let c = validate_sensors("abc123", 0.0, 0.0, 11000.0, 250.0, 245.0, 11500.0, &config());
        assert_eq!(c.tas, 250.0);
        assert_eq!(c.gs, 245.0);
    }

    #[test]
    fn speed_drop_at_low_altitude_passes_through() {
        // Rolling out after landing: speed legitimately reaches 0
        let c = validate_sensors("abc123", 0.0, 0.0, 0.0, 120.0, 115.0, 50.0, &config());
        assert_eq!(c.tas, 0.0);
        assert_eq!(c.gs, 0.0);
    }

    #[test]
    fn validation_is_idempotent() {
        let first = validate_sensors("abc123", 0.0, 0.0, 0.0, 250.0, 245.0, 12000.0, &config());
        let second = validate_sensors(
            "abc123",
            first.tas,
            first.gs,
            first.altitude,
            250.0,
            245.0,
            12000.0,
            &config(),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn airborne_high_altitude_override_wins_at_boundary() {
        let config = config();
        // Exactly at the override altitude with zero airspeed: flying
        assert!(is_airborne(
            0.0,
            0.0,
            config.high_altitude_override_ft,
            &config
        ));
        assert!(!is_airborne(
            0.0,
            0.0,
            config.high_altitude_override_ft - 1.0,
            &config
        ));
    }

    #[test]
    fn airborne_high_speed_alone() {
        let config = config();
        assert!(is_airborne(config.high_speed_threshold_kts, 0.0, 0.0, &config));
    }

    #[test]
    fn airborne_requires_both_speed_and_altitude_in_low_band() {
        let config = config();
        // Fast enough but on the deck
        assert!(!is_airborne(60.0, 60.0, 0.0, &config));
        // High enough (below override) but slow
        assert!(!is_airborne(10.0, 10.0, 500.0, &config));
        // Both
        assert!(is_airborne(60.0, 60.0, 500.0, &config));
    }

    #[test]
    fn airborne_falls_back_to_ground_speed_when_tas_missing() {
        let config = config();
        assert!(is_airborne(0.0, 120.0, 0.0, &config));
    }
}
