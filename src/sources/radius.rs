//! Radius feed adapter: point-plus-radius queries against a hosted
//! aggregator. The feed is loosely typed; numbers arrive as numbers or
//! strings, grounded aircraft report `"alt_baro": "ground"`. Every scalar
//! goes through `FlexValue`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::trace;

use super::{AdsbSource, SourceError, clean_callsign, clean_hex, read_json};
use crate::adsb::{FlexValue, SourceKind, Target};

#[derive(Debug, Deserialize)]
struct RadiusFeed {
    #[serde(default)]
    ac: Vec<RadiusAircraft>,
    /// Feed epoch milliseconds
    #[serde(default)]
    now: u64,
}

#[derive(Debug, Deserialize)]
struct RadiusAircraft {
    hex: String,
    #[serde(default)]
    flight: String,
    #[serde(default)]
    lat: FlexValue,
    #[serde(default)]
    lon: FlexValue,
    #[serde(default)]
    alt_baro: FlexValue,
    #[serde(default)]
    alt_geom: FlexValue,
    #[serde(default)]
    gs: FlexValue,
    #[serde(default)]
    tas: FlexValue,
    #[serde(default)]
    true_heading: FlexValue,
    #[serde(default)]
    mag_heading: FlexValue,
    #[serde(default)]
    track: FlexValue,
    #[serde(default)]
    baro_rate: FlexValue,
    #[serde(default)]
    squawk: FlexValue,
    #[serde(default)]
    category: FlexValue,
}

pub struct RadiusSource {
    client: reqwest::Client,
    url: String,
    api_host: String,
    api_key: String,
}

impl RadiusSource {
    pub fn new(
        client: reqwest::Client,
        url_template: String,
        station_lat: f64,
        station_lon: f64,
        radius_nm: f64,
        api_host: String,
        api_key: String,
    ) -> Self {
        let url = url_template
            .replace("{lat}", &format!("{station_lat:.6}"))
            .replace("{lon}", &format!("{station_lon:.6}"))
            .replace("{radius}", &format!("{radius_nm:.0}"));
        Self {
            client,
            url,
            api_host,
            api_key,
        }
    }

    fn normalize(feed: RadiusFeed) -> Vec<Target> {
        let timestamp = if feed.now > 0 {
            DateTime::from_timestamp_millis(feed.now as i64).unwrap_or_else(Utc::now)
        } else {
            Utc::now()
        };

        feed.ac
            .into_iter()
            .map(|a| {
                let on_ground = a.alt_baro.is_ground_sentinel().then_some(true);
                Target {
                    hex: clean_hex(&a.hex),
                    flight: clean_callsign(&a.flight),
                    lat: a.lat.as_f64().unwrap_or(0.0),
                    lon: a.lon.as_f64().unwrap_or(0.0),
                    alt_baro: a.alt_baro.as_f64().unwrap_or(0.0),
                    alt_geom: a.alt_geom.as_f64().unwrap_or(0.0),
                    gs: a.gs.as_f64().unwrap_or(0.0),
                    tas: a.tas.as_f64().unwrap_or(0.0),
                    true_heading: a.true_heading.as_f64().unwrap_or(0.0),
                    mag_heading: a.mag_heading.as_f64().unwrap_or(0.0),
                    track: a.track.as_f64().unwrap_or(0.0),
                    baro_rate: a.baro_rate.as_f64().unwrap_or(0.0),
                    squawk: a.squawk.as_string(),
                    category: a.category.as_string(),
                    on_ground,
                    source: SourceKind::RadiusExternal,
                    timestamp,
                }
            })
            .collect()
    }
}

#[async_trait]
impl AdsbSource for RadiusSource {
    fn name(&self) -> &'static str {
        "radius-external"
    }

    async fn fetch(&self) -> Result<Vec<Target>, SourceError> {
        let mut request = self.client.get(&self.url);
        if !self.api_key.is_empty() {
            request = request
                .header("x-rapidapi-host", &self.api_host)
                .header("x-rapidapi-key", &self.api_key);
        }
        let response = request.send().await.map_err(SourceError::from_reqwest)?;
        let feed: RadiusFeed = read_json(response).await?;
        let targets = Self::normalize(feed);
        trace!("radius feed returned {} aircraft", targets.len());
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Numbers-as-strings and the ground sentinel, as shipped by the feed
    const SAMPLE: &str = r#"{
        "now": 1748779200500,
        "ac": [
            {"hex": "C0FFEE", "flight": "ACA101 ", "lat": "43.68", "lon": -79.63,
             "alt_baro": "12000", "alt_geom": 12100, "gs": "250.5", "tas": 260,
             "track": "57.5", "baro_rate": "-640", "squawk": 3421, "category": "A3"},
            {"hex": "abc123", "flight": "WJA55", "lat": 43.67, "lon": -79.62,
             "alt_baro": "ground", "gs": 8, "track": 240}
        ]
    }"#;

    #[test]
    fn url_template_substitution() {
        let source = RadiusSource::new(
            reqwest::Client::new(),
            "https://feed.example/v2/point/{lat}/{lon}/{radius}".to_string(),
            43.6777,
            -79.6248,
            30.0,
            String::new(),
            String::new(),
        );
        assert_eq!(source.url, "https://feed.example/v2/point/43.677700/-79.624800/30");
    }

    #[test]
    fn coerces_string_numbers() {
        let feed: RadiusFeed = serde_json::from_str(SAMPLE).unwrap();
        let targets = RadiusSource::normalize(feed);
        let t = &targets[0];
        assert_eq!(t.lat, 43.68);
        assert_eq!(t.alt_baro, 12000.0);
        assert_eq!(t.gs, 250.5);
        assert_eq!(t.baro_rate, -640.0);
        assert_eq!(t.squawk, "3421");
        assert_eq!(t.source, SourceKind::RadiusExternal);
        assert_eq!(t.timestamp.timestamp_millis(), 1748779200500);
    }

    #[test]
    fn ground_sentinel_zeroes_altitude_and_flags() {
        let feed: RadiusFeed = serde_json::from_str(SAMPLE).unwrap();
        let targets = RadiusSource::normalize(feed);
        let t = &targets[1];
        assert_eq!(t.alt_baro, 0.0);
        assert_eq!(t.on_ground, Some(true));
    }

    #[test]
    fn normalization_is_deterministic() {
        let a = RadiusSource::normalize(serde_json::from_str(SAMPLE).unwrap());
        let b = RadiusSource::normalize(serde_json::from_str(SAMPLE).unwrap());
        assert_eq!(a, b, "same response must normalize identically");
    }
}
