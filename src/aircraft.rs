//! Reconciled per-aircraft state and the flight phase model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::adsb::Target;

/// Flight phase. Wire strings match the transponder-log convention
/// (`T/O` and `T/D` are the instantaneous takeoff and touchdown edges).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "TAX")]
    Taxi,
    #[serde(rename = "T/O")]
    Takeoff,
    #[serde(rename = "DEP")]
    Departure,
    #[serde(rename = "CRZ")]
    Cruise,
    #[serde(rename = "ARR")]
    Arrival,
    #[serde(rename = "APP")]
    Approach,
    #[serde(rename = "T/D")]
    Touchdown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::New => "NEW",
            Phase::Taxi => "TAX",
            Phase::Takeoff => "T/O",
            Phase::Departure => "DEP",
            Phase::Cruise => "CRZ",
            Phase::Arrival => "ARR",
            Phase::Approach => "APP",
            Phase::Touchdown => "T/D",
        }
    }

    pub fn from_str(s: &str) -> Option<Phase> {
        match s {
            "NEW" => Some(Phase::New),
            "TAX" => Some(Phase::Taxi),
            "T/O" => Some(Phase::Takeoff),
            "DEP" => Some(Phase::Departure),
            "CRZ" => Some(Phase::Cruise),
            "ARR" => Some(Phase::Arrival),
            "APP" => Some(Phase::Approach),
            "T/D" => Some(Phase::Touchdown),
            _ => None,
        }
    }

    /// Phases compatible with being on the ground
    pub fn is_ground_phase(&self) -> bool {
        matches!(
            self,
            Phase::New | Phase::Taxi | Phase::Takeoff | Phase::Touchdown
        )
    }

    /// The two critical edge phases that get preservation treatment
    pub fn is_critical_edge(&self) -> bool {
        matches!(self, Phase::Takeoff | Phase::Touchdown)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What triggered a phase-change record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEvent {
    Takeoff,
    Landing,
    SignalLostLanding,
    PhaseChange,
}

impl PhaseEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseEvent::Takeoff => "takeoff",
            PhaseEvent::Landing => "landing",
            PhaseEvent::SignalLostLanding => "signal_lost_landing",
            PhaseEvent::PhaseChange => "phase_change",
        }
    }

    pub fn from_str(s: &str) -> Option<PhaseEvent> {
        match s {
            "takeoff" => Some(PhaseEvent::Takeoff),
            "landing" => Some(PhaseEvent::Landing),
            "signal_lost_landing" => Some(PhaseEvent::SignalLostLanding),
            "phase_change" => Some(PhaseEvent::PhaseChange),
            _ => None,
        }
    }
}

/// One entry in the append-only phase log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<PhaseEvent>,
    /// Row id of the observation that triggered the change, when persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adsb_id: Option<i64>,
}

/// Current phase plus a short history tail for API consumers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseData {
    pub current: Option<PhaseChange>,
    pub history: Vec<PhaseChange>,
}

/// How many phase changes an Aircraft carries in memory; the full log lives
/// in the phase_changes table.
const PHASE_HISTORY_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AircraftStatus {
    Active,
    SignalLost,
}

/// A single point of the bounded position history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    /// Barometric altitude, feet
    pub altitude: f64,
    pub timestamp: DateTime<Utc>,
}

/// Dead-reckoning controls for a simulated aircraft
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationControls {
    /// Commanded track, degrees
    pub heading: f64,
    /// Commanded ground speed, knots
    pub gs: f64,
    /// Commanded vertical rate, feet/minute
    pub vertical_rate: f64,
}

/// Accumulated state for one transponder hex. One instance per hex at any
/// moment; mutated only by the tick orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aircraft {
    pub hex: String,
    pub flight: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub airline: Option<String>,
    pub status: AircraftStatus,
    pub last_seen: DateTime<Utc>,
    pub on_ground: bool,
    /// Derived from the phase log; never zero-valued in outbound payloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_last_takeoff: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_last_landing: Option<DateTime<Utc>>,
    /// Distance from the station, NM
    pub distance_nm: f64,
    /// Latest normalized observation
    pub adsb: Option<Target>,
    /// Time-ascending, capped position history
    pub history: VecDeque<Position>,
    pub phase: PhaseData,
    pub simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationControls>,
}

impl Aircraft {
    /// Create a fresh Aircraft from its first observation
    pub fn from_target(target: Target) -> Self {
        Self {
            hex: target.hex.clone(),
            flight: target.flight.clone(),
            airline: None,
            status: AircraftStatus::Active,
            last_seen: target.timestamp,
            on_ground: false,
            date_of_last_takeoff: None,
            date_of_last_landing: None,
            distance_nm: 0.0,
            adsb: Some(target),
            history: VecDeque::new(),
            phase: PhaseData::default(),
            simulated: false,
            simulation: None,
        }
    }

    /// Append a position, holding the strictly-monotonic invariant and the
    /// configured cap. Out-of-order or duplicate timestamps are dropped.
    pub fn push_position(&mut self, position: Position, cap: usize) {
        if let Some(last) = self.history.back()
            && position.timestamp <= last.timestamp
        {
            return;
        }
        if self.history.len() >= cap {
            self.history.pop_front();
        }
        self.history.push_back(position);
    }

    /// Record a phase change as current, keeping a short in-memory tail
    pub fn record_phase(&mut self, change: PhaseChange) {
        if matches!(change.event_type, Some(PhaseEvent::Takeoff)) {
            self.date_of_last_takeoff = Some(change.timestamp);
        }
        if matches!(
            change.event_type,
            Some(PhaseEvent::Landing) | Some(PhaseEvent::SignalLostLanding)
        ) {
            self.date_of_last_landing = Some(change.timestamp);
        }
        self.phase.history.push(change.clone());
        if self.phase.history.len() > PHASE_HISTORY_LEN {
            self.phase.history.remove(0);
        }
        self.phase.current = Some(change);
    }

    pub fn current_phase(&self) -> Option<Phase> {
        self.phase.current.as_ref().map(|p| p.phase)
    }

    /// Seconds since this aircraft was last observed
    pub fn seconds_since_seen(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_seen).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adsb::SourceKind;
    use chrono::TimeZone;

    fn target_at(ts: DateTime<Utc>) -> Target {
        Target {
            hex: "c0ffee".to_string(),
            flight: "ACA101".to_string(),
            lat: 43.6,
            lon: -79.6,
            alt_baro: 2000.0,
            alt_geom: 2100.0,
            gs: 150.0,
            tas: 160.0,
            true_heading: 240.0,
            mag_heading: 250.0,
            track: 240.0,
            baro_rate: 0.0,
            squawk: "1200".to_string(),
            category: "A1".to_string(),
            on_ground: None,
            source: SourceKind::Local,
            timestamp: ts,
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn phase_wire_strings_round_trip() {
        for phase in [
            Phase::New,
            Phase::Taxi,
            Phase::Takeoff,
            Phase::Departure,
            Phase::Cruise,
            Phase::Arrival,
            Phase::Approach,
            Phase::Touchdown,
        ] {
            assert_eq!(Phase::from_str(phase.as_str()), Some(phase));
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{}\"", phase.as_str()));
        }
        assert_eq!(Phase::from_str("XXX"), None);
    }

    #[test]
    fn ground_phases() {
        assert!(Phase::Taxi.is_ground_phase());
        assert!(Phase::Takeoff.is_ground_phase());
        assert!(Phase::Touchdown.is_ground_phase());
        assert!(Phase::New.is_ground_phase());
        assert!(!Phase::Cruise.is_ground_phase());
        assert!(!Phase::Approach.is_ground_phase());
    }

    #[test]
    fn position_history_is_strictly_monotonic() {
        let t0 = base_time();
        let mut aircraft = Aircraft::from_target(target_at(t0));
        let p = |offset: i64| Position {
            lat: 43.6,
            lon: -79.6,
            altitude: 2000.0,
            timestamp: t0 + chrono::Duration::seconds(offset),
        };
        aircraft.push_position(p(0), 10);
        aircraft.push_position(p(5), 10);
        // Duplicate timestamp dropped
        aircraft.push_position(p(5), 10);
        // Out-of-order dropped
        aircraft.push_position(p(3), 10);
        aircraft.push_position(p(10), 10);

        let stamps: Vec<_> = aircraft.history.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps.len(), 3);
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn position_history_respects_cap() {
        let t0 = base_time();
        let mut aircraft = Aircraft::from_target(target_at(t0));
        for i in 0..20 {
            aircraft.push_position(
                Position {
                    lat: 43.6,
                    lon: -79.6,
                    altitude: 2000.0,
                    timestamp: t0 + chrono::Duration::seconds(i),
                },
                5,
            );
        }
        assert_eq!(aircraft.history.len(), 5);
        // Oldest entries were evicted
        assert_eq!(
            aircraft.history.front().unwrap().timestamp,
            t0 + chrono::Duration::seconds(15)
        );
    }

    #[test]
    fn record_phase_tracks_takeoff_and_landing_dates() {
        let t0 = base_time();
        let mut aircraft = Aircraft::from_target(target_at(t0));
        assert!(aircraft.date_of_last_takeoff.is_none());

        aircraft.record_phase(PhaseChange {
            phase: Phase::Takeoff,
            timestamp: t0,
            event_type: Some(PhaseEvent::Takeoff),
            adsb_id: None,
        });
        assert_eq!(aircraft.date_of_last_takeoff, Some(t0));
        assert!(aircraft.date_of_last_landing.is_none());

        let t1 = t0 + chrono::Duration::minutes(30);
        aircraft.record_phase(PhaseChange {
            phase: Phase::Touchdown,
            timestamp: t1,
            event_type: Some(PhaseEvent::SignalLostLanding),
            adsb_id: None,
        });
        assert_eq!(aircraft.date_of_last_landing, Some(t1));
        assert_eq!(aircraft.current_phase(), Some(Phase::Touchdown));
        assert_eq!(aircraft.phase.history.len(), 2);
    }
}
