//! Local feed adapter: a readsb/dump1090-style `aircraft.json` endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::trace;

use super::{AdsbSource, SourceError, clean_callsign, clean_hex, read_json};
use crate::adsb::{FlexValue, SourceKind, Target};

#[derive(Debug, Deserialize)]
struct LocalFeed {
    /// Feed epoch seconds (fractional)
    #[serde(default)]
    now: f64,
    #[serde(default)]
    #[allow(dead_code)]
    messages: u64,
    #[serde(default)]
    aircraft: Vec<LocalAircraft>,
}

/// One aircraft as reported by readsb. `alt_baro` is the string `"ground"`
/// for surface traffic, a number otherwise.
#[derive(Debug, Deserialize)]
struct LocalAircraft {
    hex: String,
    #[serde(default)]
    flight: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    alt_baro: FlexValue,
    #[serde(default)]
    alt_geom: f64,
    #[serde(default)]
    gs: f64,
    #[serde(default)]
    tas: f64,
    #[serde(default)]
    true_heading: f64,
    #[serde(default)]
    mag_heading: f64,
    #[serde(default)]
    track: f64,
    #[serde(default)]
    baro_rate: f64,
    #[serde(default)]
    squawk: String,
    #[serde(default)]
    category: String,
}

pub struct LocalSource {
    client: reqwest::Client,
    url: String,
}

impl LocalSource {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    fn normalize(feed: LocalFeed) -> Vec<Target> {
        let timestamp = if feed.now > 0.0 {
            DateTime::from_timestamp(feed.now as i64, 0).unwrap_or_else(Utc::now)
        } else {
            Utc::now()
        };

        feed.aircraft
            .into_iter()
            .map(|a| {
                let on_ground = a.alt_baro.is_ground_sentinel().then_some(true);
                Target {
                    hex: clean_hex(&a.hex),
                    flight: clean_callsign(&a.flight),
                    lat: a.lat,
                    lon: a.lon,
                    alt_baro: a.alt_baro.as_f64().unwrap_or(0.0),
                    alt_geom: a.alt_geom,
                    gs: a.gs,
                    tas: a.tas,
                    true_heading: a.true_heading,
                    mag_heading: a.mag_heading,
                    track: a.track,
                    baro_rate: a.baro_rate,
                    squawk: a.squawk.trim().to_string(),
                    category: a.category.trim().to_string(),
                    on_ground,
                    source: SourceKind::Local,
                    timestamp,
                }
            })
            .collect()
    }
}

#[async_trait]
impl AdsbSource for LocalSource {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self) -> Result<Vec<Target>, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;
        let feed: LocalFeed = read_json(response).await?;
        let targets = Self::normalize(feed);
        trace!("local feed returned {} aircraft", targets.len());
        Ok(targets)
    }
}
