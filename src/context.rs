//! Airspace context renderer: an ephemeral natural-language snapshot of the
//! station, weather, and tracked aircraft for a downstream assistant.
//!
//! The renderer is constructed after its collaborators (store, weather).
//! Services created later, like transcription and clearance storage, attach
//! through write-once slots instead of rebuilding the renderer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use crate::aircraft::{Aircraft, AircraftStatus, Phase};
use crate::config::StationConfig;
use crate::tracker::AircraftStore;
use crate::weather::WeatherService;

/// Recent radio transcriptions, supplied by the transcription pipeline
#[async_trait]
pub trait TranscriptionStore: Send + Sync {
    async fn recent(&self, minutes: i64) -> Vec<String>;
}

/// Recent clearances per callsign, supplied by the clearance tracker
#[async_trait]
pub trait ClearanceStore: Send + Sync {
    async fn recent_for_callsign(&self, callsign: &str) -> Vec<String>;
}

const TRANSCRIPTION_WINDOW_MINUTES: i64 = 10;

pub struct ContextRenderer {
    station: StationConfig,
    store: AircraftStore,
    weather: Arc<WeatherService>,
    transcriptions: OnceLock<Arc<dyn TranscriptionStore>>,
    clearances: OnceLock<Arc<dyn ClearanceStore>>,
}

impl ContextRenderer {
    pub fn new(station: StationConfig, store: AircraftStore, weather: Arc<WeatherService>) -> Self {
        Self {
            station,
            store,
            weather,
            transcriptions: OnceLock::new(),
            clearances: OnceLock::new(),
        }
    }

    /// Late-bind the transcription collaborator; only the first bind wins
    pub fn bind_transcriptions(&self, store: Arc<dyn TranscriptionStore>) {
        let _ = self.transcriptions.set(store);
    }

    pub fn bind_clearances(&self, store: Arc<dyn ClearanceStore>) {
        let _ = self.clearances.set(store);
    }

    /// Render the full context blob for the current instant
    pub async fn render(&self, now: DateTime<Utc>) -> String {
        let mut out = String::new();

        let _ = writeln!(
            out,
            "Airspace context for {} (station {:.4}, {:.4}, elev {} ft) at {}",
            self.station.airport_code,
            self.station.latitude,
            self.station.longitude,
            self.station.elevation_feet as i64,
            now.format("%Y-%m-%d %H:%M:%SZ"),
        );

        if let Some(weather) = self.weather.current().await {
            if let Some(metar) = &weather.metar {
                let _ = writeln!(out, "METAR: {metar}");
            }
            if let Some(taf) = &weather.taf {
                let _ = writeln!(out, "TAF: {taf}");
            }
            for notam in &weather.notams {
                let _ = writeln!(out, "NOTAM: {notam}");
            }
        } else {
            let _ = writeln!(out, "Weather: unavailable");
        }

        let mut aircraft = self.store.get_all().await;
        aircraft.retain(|a| a.status == AircraftStatus::Active);
        aircraft.sort_by(|a, b| {
            a.distance_nm
                .partial_cmp(&b.distance_nm)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let _ = writeln!(out, "\nTracked aircraft ({}):", aircraft.len());
        for a in &aircraft {
            let _ = writeln!(out, "{}", describe_aircraft(a));
        }

        if let Some(transcriptions) = self.transcriptions.get() {
            let recent = transcriptions.recent(TRANSCRIPTION_WINDOW_MINUTES).await;
            if !recent.is_empty() {
                let _ = writeln!(
                    out,
                    "\nRadio transcriptions (last {TRANSCRIPTION_WINDOW_MINUTES} min):"
                );
                for line in recent {
                    let _ = writeln!(out, "- {line}");
                }
            }
        }

        if let Some(clearances) = self.clearances.get() {
            let mut lines: Vec<String> = Vec::new();
            for a in &aircraft {
                for clearance in clearances.recent_for_callsign(&a.flight).await {
                    lines.push(format!("{}: {clearance}", a.flight));
                }
            }
            if !lines.is_empty() {
                let _ = writeln!(out, "\nRecent clearances:");
                for line in lines {
                    let _ = writeln!(out, "- {line}");
                }
            }
        }

        out
    }
}

/// One aircraft as a single line: identity, phase, geometry, trend
fn describe_aircraft(a: &Aircraft) -> String {
    let identity = if a.flight.is_empty() {
        a.hex.clone()
    } else {
        a.flight.clone()
    };
    let phase = a
        .current_phase()
        .map(|p| p.as_str())
        .unwrap_or(Phase::New.as_str());
    let (altitude, gs, trend) = match a.adsb.as_ref() {
        Some(t) => {
            let trend = if t.baro_rate > 300.0 {
                "climbing"
            } else if t.baro_rate < -300.0 {
                "descending"
            } else {
                "level"
            };
            (t.alt_baro, t.gs, trend)
        }
        None => (0.0, 0.0, "unknown"),
    };
    let ground = if a.on_ground { ", on ground" } else { "" };
    let airline = a
        .airline
        .as_deref()
        .map(|name| format!(" ({name})"))
        .unwrap_or_default();
    format!(
        "- {identity}{airline}: {phase}, {:.1} NM out, {} ft, {} kt, {trend}{ground}",
        a.distance_nm, altitude as i64, gs as i64,
    )
}
