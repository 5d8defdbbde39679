//! TOML configuration. Every tunable threshold referenced by the phase
//! engine, sensor validator and runway classifier lives here with a default,
//! so a minimal config file only needs the station and source sections.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub station: StationConfig,
    pub source: SourceConfig,
    pub phases: PhasesConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_feet: f64,
    pub airport_code: String,
    pub runways_db_path: String,
    pub airlines_db_path: String,
    /// Radius around the station considered "at the airport", NM
    pub airport_range_nm: f64,
    /// How far extended centerlines are projected past each threshold, NM
    pub runway_extension_length_nm: f64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            elevation_feet: 0.0,
            airport_code: String::new(),
            runways_db_path: "data/runways.csv".to_string(),
            airlines_db_path: "data/airlines.csv".to_string(),
            airport_range_nm: 10.0,
            runway_extension_length_nm: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Local,
    RadiusExternal,
    BboxExternal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub source_type: SourceType,
    /// Local JSON endpoint, e.g. a readsb aircraft.json URL
    pub local_source_url: String,
    /// URL template with {lat}, {lon} and {radius} placeholders
    pub external_source_url: String,
    pub api_host: String,
    pub api_key: String,
    pub search_radius_nm: f64,
    /// JSON file holding OAuth2 client credentials; absent file means anonymous
    pub bbox_credentials_path: String,
    pub bbox_token_url: String,
    /// Explicit bounding box; all four must be set to take precedence over
    /// the flat-earth derivation from station + radius
    pub bbox_lamin: Option<f64>,
    pub bbox_lomin: Option<f64>,
    pub bbox_lamax: Option<f64>,
    pub bbox_lomax: Option<f64>,
    pub fetch_interval_seconds: u64,
    pub signal_lost_timeout_seconds: i64,
    /// HTTP request timeout for adapter calls, seconds
    pub request_timeout_seconds: u64,
    /// Toggle for incremental aircraft change broadcasting over WebSocket
    pub websocket_aircraft_updates: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_type: SourceType::Local,
            local_source_url: "http://localhost:8080/data/aircraft.json".to_string(),
            external_source_url: String::new(),
            api_host: String::new(),
            api_key: String::new(),
            search_radius_nm: 30.0,
            bbox_credentials_path: String::new(),
            bbox_token_url: "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token".to_string(),
            bbox_lamin: None,
            bbox_lomin: None,
            bbox_lamax: None,
            bbox_lomax: None,
            fetch_interval_seconds: 5,
            signal_lost_timeout_seconds: 60,
            request_timeout_seconds: 10,
            websocket_aircraft_updates: true,
        }
    }
}

/// Thresholds for the flight phase state machine, sensor validation and
/// ground-state inference. Units are in the field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhasesConfig {
    // Ground-state inference
    pub high_altitude_override_ft: f64,
    pub high_speed_threshold_kts: f64,
    pub flying_min_tas_kts: f64,
    pub flying_min_alt_ft: f64,

    // Sensor validation
    pub impossible_alt_drop_threshold_ft: f64,
    pub impossible_speed_drop_threshold_kts: f64,
    pub impossible_speed_drop_min_alt_ft: f64,

    // Taxi band
    pub taxiing_min_speed_kts: f64,
    pub taxiing_max_speed_kts: f64,

    // Airborne classification
    pub cruise_altitude_ft: f64,
    pub takeoff_altitude_threshold_ft: f64,
    pub departure_altitude_ft: f64,
    pub departure_min_vertical_rate_fpm: f64,
    pub approach_vertical_rate_threshold_fpm: f64,
    pub recent_takeoff_timeout_minutes: i64,

    // Runway alignment
    pub approach_max_distance_nm: f64,
    pub approach_centerline_tolerance_nm: f64,
    pub approach_heading_tolerance_deg: f64,

    // Stability
    pub phase_flapping_prevention_seconds: i64,
    pub phase_preservation_seconds: i64,
    pub phase_transition_timeout_seconds: i64,
    pub phase_change_timeout_seconds: i64,

    // Signal-lost landing heuristic
    pub signal_lost_landing_enabled: bool,
    pub signal_lost_landing_max_alt_ft: f64,
}

impl Default for PhasesConfig {
    fn default() -> Self {
        Self {
            high_altitude_override_ft: 3000.0,
            high_speed_threshold_kts: 100.0,
            flying_min_tas_kts: 50.0,
            flying_min_alt_ft: 100.0,
            impossible_alt_drop_threshold_ft: 5000.0,
            impossible_speed_drop_threshold_kts: 100.0,
            impossible_speed_drop_min_alt_ft: 1000.0,
            taxiing_min_speed_kts: 2.0,
            taxiing_max_speed_kts: 40.0,
            cruise_altitude_ft: 10000.0,
            takeoff_altitude_threshold_ft: 3000.0,
            departure_altitude_ft: 5000.0,
            departure_min_vertical_rate_fpm: 300.0,
            approach_vertical_rate_threshold_fpm: 0.0,
            recent_takeoff_timeout_minutes: 10,
            approach_max_distance_nm: 15.0,
            approach_centerline_tolerance_nm: 1.0,
            approach_heading_tolerance_deg: 30.0,
            phase_flapping_prevention_seconds: 300,
            phase_preservation_seconds: 60,
            phase_transition_timeout_seconds: 60,
            phase_change_timeout_seconds: 3600,
            signal_lost_landing_enabled: true,
            signal_lost_landing_max_alt_ft: 1500.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the daily-rotated database files
    /// (`co-atc-YYYY-MM-DD.sqlite`)
    pub base_path: String,
    /// Cap on per-aircraft position history returned by the API and kept
    /// in memory
    pub max_positions_in_api: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: "data".to_string(),
            max_positions_in_api: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Directory served as the static frontend; empty disables it
    pub static_dir: String,
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            static_dir: String::new(),
            cors_permissive: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Endpoint returning `{metar, taf, notams}` for the station; empty
    /// disables weather refresh
    pub url: String,
    pub refresh_interval_seconds: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            refresh_interval_seconds: 600,
        }
    }
}

impl Config {
    /// Load and validate a config file. Validation failures here are fatal:
    /// the process exits nonzero rather than running with a bad station.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.station.latitude)
            || !(-180.0..=180.0).contains(&self.station.longitude)
        {
            bail!(
                "station coordinates ({}, {}) out of range",
                self.station.latitude,
                self.station.longitude
            );
        }
        if self.station.latitude == 0.0 && self.station.longitude == 0.0 {
            bail!("station coordinates are unset");
        }
        if self.source.fetch_interval_seconds == 0 {
            bail!("fetch_interval_seconds must be at least 1");
        }
        if self.phases.taxiing_min_speed_kts > self.phases.taxiing_max_speed_kts {
            bail!("taxiing speed band is inverted");
        }
        match self.source.source_type {
            SourceType::Local if self.source.local_source_url.is_empty() => {
                bail!("source_type is local but local_source_url is empty")
            }
            SourceType::RadiusExternal if self.source.external_source_url.is_empty() => {
                bail!("source_type is radius-external but external_source_url is empty")
            }
            _ => {}
        }
        Ok(())
    }
}
