//! Simulated aircraft: operator-created traffic dead-reckoned each tick and
//! injected into the pipeline ahead of reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::adsb::{SourceKind, Target};
use crate::aircraft::SimulationControls;
use crate::geometry::destination_point;

#[derive(Debug, Clone, Serialize)]
pub struct SimulatedAircraft {
    pub hex: String,
    pub flight: String,
    pub lat: f64,
    pub lon: f64,
    /// Barometric altitude, feet
    pub altitude: f64,
    pub controls: SimulationControls,
    last_advance: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSimulatedAircraft {
    #[serde(default)]
    pub flight: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub altitude: f64,
    pub controls: SimulationControls,
}

/// Registry of simulated aircraft. Interior mutability is a plain RwLock:
/// nothing here awaits.
#[derive(Default)]
pub struct SimulationService {
    inner: RwLock<HashMap<String, SimulatedAircraft>>,
}

impl SimulationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, request: CreateSimulatedAircraft, now: DateTime<Utc>) -> SimulatedAircraft {
        let hex = format!("{:06x}", Uuid::new_v4().as_u128() & 0xFF_FFFF);
        let count = self.inner.read().expect("simulation lock poisoned").len();
        let flight = if request.flight.trim().is_empty() {
            format!("SIM{:03}", count + 1)
        } else {
            request.flight.trim().to_string()
        };
        let aircraft = SimulatedAircraft {
            hex: hex.clone(),
            flight,
            lat: request.lat,
            lon: request.lon,
            altitude: request.altitude.max(0.0),
            controls: request.controls,
            last_advance: now,
        };
        info!(hex, flight = aircraft.flight, "created simulated aircraft");
        self.inner
            .write()
            .expect("simulation lock poisoned")
            .insert(hex, aircraft.clone());
        aircraft
    }

    pub fn update_controls(&self, hex: &str, controls: SimulationControls) -> bool {
        let mut guard = self.inner.write().expect("simulation lock poisoned");
        match guard.get_mut(hex) {
            Some(aircraft) => {
                aircraft.controls = controls;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, hex: &str) -> bool {
        self.inner
            .write()
            .expect("simulation lock poisoned")
            .remove(hex)
            .is_some()
    }

    pub fn is_simulated(&self, hex: &str) -> bool {
        self.inner
            .read()
            .expect("simulation lock poisoned")
            .contains_key(hex)
    }

    pub fn list(&self) -> Vec<SimulatedAircraft> {
        self.inner
            .read()
            .expect("simulation lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Dead-reckon every simulated aircraft forward to `now` and return one
    /// observation each, shaped like feed traffic.
    pub fn advance(&self, now: DateTime<Utc>) -> Vec<Target> {
        let mut guard = self.inner.write().expect("simulation lock poisoned");
        guard
            .values_mut()
            .map(|aircraft| {
                let dt_secs = (now - aircraft.last_advance).num_milliseconds() as f64 / 1000.0;
                if dt_secs > 0.0 {
                    let distance_nm = aircraft.controls.gs * dt_secs / 3600.0;
                    let (lat, lon) = destination_point(
                        aircraft.lat,
                        aircraft.lon,
                        aircraft.controls.heading,
                        distance_nm,
                    );
                    aircraft.lat = lat;
                    aircraft.lon = lon;
                    aircraft.altitude =
                        (aircraft.altitude + aircraft.controls.vertical_rate * dt_secs / 60.0)
                            .max(0.0);
                    aircraft.last_advance = now;
                }

                let on_ground = aircraft.altitude <= 0.0;
                Target {
                    hex: aircraft.hex.clone(),
                    flight: aircraft.flight.clone(),
                    lat: aircraft.lat,
                    lon: aircraft.lon,
                    alt_baro: aircraft.altitude,
                    alt_geom: aircraft.altitude,
                    gs: aircraft.controls.gs,
                    tas: aircraft.controls.gs,
                    true_heading: aircraft.controls.heading,
                    mag_heading: aircraft.controls.heading,
                    track: aircraft.controls.heading,
                    baro_rate: if on_ground {
                        0.0
                    } else {
                        aircraft.controls.vertical_rate
                    },
                    squawk: "1200".to_string(),
                    category: "A1".to_string(),
                    on_ground: Some(on_ground),
                    source: SourceKind::Local,
                    timestamp: now,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::haversine_distance_nm;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn request(gs: f64, vertical_rate: f64) -> CreateSimulatedAircraft {
        CreateSimulatedAircraft {
            flight: String::new(),
            lat: 43.68,
            lon: -79.65,
            altitude: 1000.0,
            controls: SimulationControls {
                heading: 90.0,
                gs,
                vertical_rate,
            },
        }
    }

    #[tokio::test]
    async fn advance_moves_aircraft_along_heading() {
        let service = SimulationService::new();
        let created = service.create(request(360.0, 0.0), now());

        // 360 kt for 60 s = 6 NM
        let targets = service.advance(now() + chrono::Duration::seconds(60));
        assert_eq!(targets.len(), 1);
        let moved = haversine_distance_nm(43.68, -79.65, targets[0].lat, targets[0].lon);
        assert!((moved - 6.0).abs() < 0.05, "got {moved}");
        assert_eq!(targets[0].hex, created.hex);
        assert_eq!(targets[0].on_ground, Some(false));
    }

    #[tokio::test]
    async fn descending_aircraft_lands_and_flags_ground() {
        let service = SimulationService::new();
        service.create(request(120.0, -2000.0), now());

        // 1,000 ft at -2,000 fpm reaches the ground in 30 s
        let targets = service.advance(now() + chrono::Duration::seconds(60));
        assert_eq!(targets[0].alt_baro, 0.0);
        assert_eq!(targets[0].on_ground, Some(true));
        assert_eq!(targets[0].baro_rate, 0.0);
    }

    #[tokio::test]
    async fn controls_update_and_removal() {
        let service = SimulationService::new();
        let created = service.create(request(120.0, 0.0), now());
        assert!(service.is_simulated(&created.hex));

        assert!(service.update_controls(
            &created.hex,
            SimulationControls {
                heading: 180.0,
                gs: 200.0,
                vertical_rate: 500.0,
            }
        ));
        assert!(!service.update_controls("ffffff", created.controls));

        assert!(service.remove(&created.hex));
        assert!(!service.is_simulated(&created.hex));
        assert!(service.advance(now()).is_empty());
    }

    #[tokio::test]
    async fn generated_identity_is_stable_shape() {
        let service = SimulationService::new();
        let created = service.create(request(120.0, 0.0), now());
        assert_eq!(created.hex.len(), 6);
        assert!(created.flight.starts_with("SIM"));
    }
}
