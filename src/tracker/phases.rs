//! Flight phase state machine.
//!
//! A primary classification maps one observation to a candidate phase;
//! stability rules then decide whether the candidate is allowed to replace
//! the previous phase. The edge phases `T/O` and `T/D` are never produced
//! here (they come from the ground-transition detector), but once present
//! they are preserved and used by the recent-takeoff predicate.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::aircraft::{Aircraft, Phase, PhaseChange};
use crate::config::PhasesConfig;
use crate::geometry::{angular_difference, haversine_distance_nm, initial_bearing};
use crate::runways::RunwayDb;

pub struct PhaseEngine {
    config: PhasesConfig,
    airport_range_nm: f64,
}

impl PhaseEngine {
    pub fn new(config: PhasesConfig, airport_range_nm: f64) -> Self {
        Self {
            config,
            airport_range_nm,
        }
    }

    /// Resolve the phase for one aircraft this tick. `prev` is the latest
    /// phase-log entry for the hex (None for a first sighting).
    pub fn classify(
        &self,
        aircraft: &Aircraft,
        prev: Option<&PhaseChange>,
        runways: &RunwayDb,
        station_lat: f64,
        station_lon: f64,
        now: DateTime<Utc>,
    ) -> Phase {
        let primary = self.primary(aircraft, prev, runways, station_lat, station_lon, now);
        let resolved = self.stabilize(primary, prev, now);
        trace!(
            hex = aircraft.hex,
            primary = %primary,
            resolved = %resolved,
            "phase classification"
        );
        resolved
    }

    /// A phase-change row is written only when the resolved phase differs
    /// from the hex's latest record, or no record exists yet.
    pub fn should_emit(resolved: Phase, prev: Option<&PhaseChange>) -> bool {
        match prev {
            None => true,
            Some(prev) => prev.phase != resolved,
        }
    }

    fn primary(
        &self,
        aircraft: &Aircraft,
        prev: Option<&PhaseChange>,
        runways: &RunwayDb,
        station_lat: f64,
        station_lon: f64,
        now: DateTime<Utc>,
    ) -> Phase {
        let Some(target) = aircraft.adsb.as_ref() else {
            return Phase::New;
        };
        let config = &self.config;

        if aircraft.on_ground {
            if (config.taxiing_min_speed_kts..=config.taxiing_max_speed_kts).contains(&target.gs) {
                return Phase::Taxi;
            }
            if let Some(prev) = prev {
                // Holding still after rollout or between taxi legs: keep the
                // previous ground phase until the debounce expires.
                if matches!(prev.phase, Phase::Touchdown | Phase::Taxi)
                    && target.gs < config.taxiing_min_speed_kts
                    && (now - prev.timestamp).num_seconds()
                        >= config.phase_transition_timeout_seconds
                {
                    return Phase::New;
                }
                if prev.phase.is_ground_phase() {
                    return prev.phase;
                }
            }
            return Phase::New;
        }

        // Airborne branch
        let altitude = target.alt_baro;
        if altitude >= config.cruise_altitude_ft {
            return Phase::Cruise;
        }

        let track = target.best_track();
        let bearing_to_station =
            initial_bearing(target.lat, target.lon, station_lat, station_lon);
        let inbound = angular_difference(track, bearing_to_station) <= 90.0;
        let aligned = runways
            .detect_approach(target.lat, target.lon, track, altitude, config)
            .is_some();

        if aligned
            && inbound
            && target.baro_rate <= config.approach_vertical_rate_threshold_fpm
            && altitude <= config.takeoff_altitude_threshold_ft
        {
            return Phase::Approach;
        }

        let outbound_aligned = runways
            .detect_departure(target.lat, target.lon, track, station_lat, station_lon, config)
            .is_some();
        let climbing_out = outbound_aligned
            && target.baro_rate >= config.departure_min_vertical_rate_fpm
            && altitude <= config.departure_altitude_ft;

        if self.recently_took_off(aircraft, prev, station_lat, station_lon, now) || climbing_out {
            return Phase::Departure;
        }

        Phase::Arrival
    }

    /// Three-way OR: the latest log row is a fresh `T/O`; or the derived
    /// last-takeoff timestamp is fresh; or the aircraft is still in the
    /// departure bubble around the station.
    fn recently_took_off(
        &self,
        aircraft: &Aircraft,
        prev: Option<&PhaseChange>,
        station_lat: f64,
        station_lon: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let window = chrono::Duration::minutes(self.config.recent_takeoff_timeout_minutes);

        if let Some(prev) = prev
            && prev.phase == Phase::Takeoff
            && now - prev.timestamp <= window
        {
            return true;
        }
        if let Some(takeoff) = aircraft.date_of_last_takeoff
            && now - takeoff <= window
        {
            return true;
        }
        if let Some(target) = aircraft.adsb.as_ref() {
            let distance =
                haversine_distance_nm(target.lat, target.lon, station_lat, station_lon);
            if distance <= 2.0 * self.airport_range_nm
                && target.alt_baro < 2.0 * self.config.departure_altitude_ft
                && target.baro_rate >= self.config.departure_min_vertical_rate_fpm
            {
                return true;
            }
        }
        false
    }

    fn stabilize(&self, primary: Phase, prev: Option<&PhaseChange>, now: DateTime<Utc>) -> Phase {
        let Some(prev) = prev else {
            return primary;
        };
        let elapsed = (now - prev.timestamp).num_seconds();
        let config = &self.config;

        if primary == prev.phase {
            // Inactivity decay: a phase that never moves on goes stale
            if prev.phase != Phase::New && elapsed >= config.phase_change_timeout_seconds {
                return Phase::New;
            }
            return primary;
        }

        // Critical-edge preservation: T/O and T/D hold against any
        // reclassification until the preservation window passes.
        if prev.phase.is_critical_edge() && elapsed < config.phase_preservation_seconds {
            return prev.phase;
        }

        // Flap suppression between adjacent airborne phases
        let flap = matches!(
            (prev.phase, primary),
            (Phase::Departure, Phase::Approach)
                | (Phase::Arrival, Phase::Departure)
                | (Phase::Departure, Phase::Arrival)
        );
        if flap && elapsed < config.phase_flapping_prevention_seconds {
            return prev.phase;
        }

        primary
    }
}
