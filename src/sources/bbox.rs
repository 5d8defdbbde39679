//! Bounding-box feed adapter with OAuth2 client-credentials authentication.
//!
//! The upstream (OpenSky-style) returns one positional array per aircraft
//! with SI units; the adapter converts to feet/knots/fpm. The bearer token
//! is cached until shortly before expiry and refreshed single-flight under
//! a mutex. A missing credentials file permits anonymous access.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, from_value};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use super::{AdsbSource, SourceError, clean_callsign, clean_hex, read_json};
use crate::adsb::{SourceKind, Target};
use crate::config::Config;
use crate::geometry::{meters_to_feet, mps_to_fpm, mps_to_knots};

const DEFAULT_API_BASE: &str = "https://opensky-network.org/api";
/// Refresh this many seconds before the token's advertised expiry
const TOKEN_SAFETY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lamin: f64,
    pub lomin: f64,
    pub lamax: f64,
    pub lomax: f64,
}

impl BoundingBox {
    /// Flat-earth box around a station: 1° of latitude ≈ 60 NM, longitude
    /// scaled by cos(latitude). Good enough at feed-query granularity.
    pub fn around(station_lat: f64, station_lon: f64, radius_nm: f64) -> Self {
        let dlat = radius_nm / 60.0;
        let dlon = radius_nm / (60.0 * station_lat.to_radians().cos().max(0.01));
        Self {
            lamin: (station_lat - dlat).max(-90.0),
            lamax: (station_lat + dlat).min(90.0),
            lomin: (station_lon - dlon).max(-180.0),
            lomax: (station_lon + dlon).min(180.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ClientCredentials {
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    bearer: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct StatesResponse {
    #[serde(default)]
    #[allow(dead_code)]
    time: i64,
    states: Option<Vec<StateVector>>,
}

/// The positional per-aircraft array. Only the fields the normalizer needs
/// are kept; the rest of the 17/18 slots are skipped by index.
#[derive(Debug)]
struct StateVector {
    icao24: String,
    callsign: Option<String>,
    longitude: Option<f64>,
    latitude: Option<f64>,
    baro_altitude_m: Option<f64>,
    on_ground: bool,
    velocity_mps: Option<f64>,
    true_track: Option<f64>,
    vertical_rate_mps: Option<f64>,
    geo_altitude_m: Option<f64>,
    squawk: Option<String>,
    last_contact: i64,
}

impl<'de> Deserialize<'de> for StateVector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let values: Vec<Value> = Deserialize::deserialize(deserializer)?;
        if values.len() < 17 {
            return Err(serde::de::Error::invalid_length(
                values.len(),
                &"at least 17 elements",
            ));
        }
        let field = |i: usize| values[i].clone();
        Ok(StateVector {
            icao24: from_value(field(0)).map_err(serde::de::Error::custom)?,
            callsign: from_value(field(1)).map_err(serde::de::Error::custom)?,
            last_contact: from_value(field(4)).map_err(serde::de::Error::custom)?,
            longitude: from_value(field(5)).map_err(serde::de::Error::custom)?,
            latitude: from_value(field(6)).map_err(serde::de::Error::custom)?,
            baro_altitude_m: from_value(field(7)).map_err(serde::de::Error::custom)?,
            on_ground: from_value(field(8)).map_err(serde::de::Error::custom)?,
            velocity_mps: from_value(field(9)).map_err(serde::de::Error::custom)?,
            true_track: from_value(field(10)).map_err(serde::de::Error::custom)?,
            vertical_rate_mps: from_value(field(11)).map_err(serde::de::Error::custom)?,
            geo_altitude_m: from_value(field(13)).map_err(serde::de::Error::custom)?,
            squawk: from_value(field(14)).map_err(serde::de::Error::custom)?,
        })
    }
}

pub struct BboxSource {
    client: reqwest::Client,
    api_base: String,
    token_url: String,
    credentials: Option<ClientCredentials>,
    bbox: BoundingBox,
    token: Mutex<Option<CachedToken>>,
}

impl BboxSource {
    pub fn from_config(client: reqwest::Client, config: &Config) -> Result<Self> {
        let bbox = match (
            config.source.bbox_lamin,
            config.source.bbox_lomin,
            config.source.bbox_lamax,
            config.source.bbox_lomax,
        ) {
            (Some(lamin), Some(lomin), Some(lamax), Some(lomax)) => BoundingBox {
                lamin,
                lomin,
                lamax,
                lomax,
            },
            _ => BoundingBox::around(
                config.station.latitude,
                config.station.longitude,
                config.source.search_radius_nm,
            ),
        };

        let credentials = load_credentials(&config.source.bbox_credentials_path)?;
        if credentials.is_none() {
            info!("no bbox credentials configured, using anonymous access");
        }

        let api_base = if config.source.api_host.is_empty() {
            DEFAULT_API_BASE.to_string()
        } else {
            config.source.api_host.trim_end_matches('/').to_string()
        };

        Ok(Self {
            client,
            api_base,
            token_url: config.source.bbox_token_url.clone(),
            credentials,
            bbox,
            token: Mutex::new(None),
        })
    }

    /// Current bearer, refreshing when absent or within the safety margin of
    /// expiry. The mutex spans the refresh, so concurrent callers wait for
    /// one request instead of racing their own.
    async fn bearer(&self) -> Result<Option<String>, SourceError> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };

        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref()
            && Utc::now() < cached.expires_at
        {
            return Ok(Some(cached.bearer.clone()));
        }

        debug!("requesting fresh OAuth2 token");
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Auth(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Auth(format!(
                "token endpoint returned HTTP {}",
                status.as_u16()
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Auth(e.to_string()))?;

        let cached = CachedToken {
            bearer: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token_lifetime_secs(token.expires_in)),
        };
        let bearer = cached.bearer.clone();
        *guard = Some(cached);
        metrics::counter!("sources.bbox.token_refresh_total").increment(1);
        Ok(Some(bearer))
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch_states(&self, bearer: Option<&str>) -> Result<StatesResponse, SourceError> {
        let url = format!(
            "{}/states/all?lamin={}&lomin={}&lamax={}&lomax={}",
            self.api_base, self.bbox.lamin, self.bbox.lomin, self.bbox.lamax, self.bbox.lomax
        );
        let mut request = self.client.get(&url);
        if let Some(bearer) = bearer {
            request = request.bearer_auth(bearer);
        }
        let response = request.send().await.map_err(SourceError::from_reqwest)?;
        read_json(response).await
    }

    fn normalize(response: StatesResponse) -> Vec<Target> {
        response
            .states
            .unwrap_or_default()
            .into_iter()
            .map(|s| {
                let timestamp =
                    DateTime::from_timestamp(s.last_contact, 0).unwrap_or_else(Utc::now);
                Target {
                    hex: clean_hex(&s.icao24),
                    flight: clean_callsign(s.callsign.as_deref().unwrap_or("")),
                    lat: s.latitude.unwrap_or(0.0),
                    lon: s.longitude.unwrap_or(0.0),
                    alt_baro: s.baro_altitude_m.map(meters_to_feet).unwrap_or(0.0),
                    alt_geom: s.geo_altitude_m.map(meters_to_feet).unwrap_or(0.0),
                    gs: s.velocity_mps.map(mps_to_knots).unwrap_or(0.0),
                    tas: 0.0,
                    true_heading: 0.0,
                    mag_heading: 0.0,
                    track: s.true_track.unwrap_or(0.0),
                    baro_rate: s.vertical_rate_mps.map(mps_to_fpm).unwrap_or(0.0),
                    squawk: s.squawk.unwrap_or_default().trim().to_string(),
                    category: String::new(),
                    on_ground: Some(s.on_ground),
                    source: SourceKind::BboxExternal,
                    timestamp,
                }
            })
            .collect()
    }
}

#[async_trait]
impl AdsbSource for BboxSource {
    fn name(&self) -> &'static str {
        "bbox-external"
    }

    async fn fetch(&self) -> Result<Vec<Target>, SourceError> {
        let bearer = self.bearer().await?;

        let response = match self.fetch_states(bearer.as_deref()).await {
            Err(SourceError::Auth(reason)) if bearer.is_some() => {
                // Stale or revoked token: one refresh-and-retry, then fall
                // back to anonymous access rather than losing the tick.
                warn!("bbox fetch rejected ({reason}), refreshing token");
                self.invalidate_token().await;
                let fresh = self.bearer().await?;
                match self.fetch_states(fresh.as_deref()).await {
                    Err(SourceError::Auth(reason)) => {
                        warn!("refreshed token rejected ({reason}), trying anonymous");
                        self.fetch_states(None).await?
                    }
                    other => other?,
                }
            }
            other => other?,
        };

        let targets = Self::normalize(response);
        trace!("bbox feed returned {} aircraft", targets.len());
        Ok(targets)
    }
}

/// Usable token lifetime: the advertised expiry minus the safety margin,
/// floored so a short-lived grant is still cached briefly
fn token_lifetime_secs(expires_in: i64) -> i64 {
    (expires_in - TOKEN_SAFETY_MARGIN_SECS).max(30)
}

fn load_credentials(path: &str) -> Result<Option<ClientCredentials>> {
    if path.is_empty() {
        return Ok(None);
    }
    let path = std::path::Path::new(path);
    if !path.exists() {
        // Anonymous access is a supported mode, not an error
        warn!(
            "bbox credentials file {} not found, using anonymous access",
            path.display()
        );
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read credentials file {}", path.display()))?;
    let credentials: ClientCredentials = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse credentials file {}", path.display()))?;
    Ok(Some(credentials))
}
