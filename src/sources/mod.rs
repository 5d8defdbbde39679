//! Source adapters: heterogeneous ADS-B feeds normalized to `Target`.
//!
//! Every adapter implements the same contract. The tick orchestrator treats
//! any adapter error as a tick-level failure and leaves prior aircraft state
//! intact; the next tick retries.

mod bbox;
mod local;
mod radius;

pub use bbox::BboxSource;
pub use local::LocalSource;
pub use radius::RadiusSource;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::adsb::Target;
use crate::config::{Config, SourceType};

/// Adapter failure taxonomy; the categories drive recovery behavior
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("failed to parse feed: {0}")]
    Parse(String),
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl SourceError {
    /// Split a reqwest error into the network/parse categories
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Parse(e.to_string())
        } else {
            SourceError::Network(e.to_string())
        }
    }
}

/// Uniform fetch contract for all feed variants
#[async_trait]
pub trait AdsbSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self) -> Result<Vec<Target>, SourceError>;
}

/// Construct the adapter selected by the configuration
pub fn build_source(config: &Config) -> Result<Arc<dyn AdsbSource>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.source.request_timeout_seconds))
        .build()?;

    Ok(match config.source.source_type {
        SourceType::Local => Arc::new(LocalSource::new(
            client,
            config.source.local_source_url.clone(),
        )),
        SourceType::RadiusExternal => Arc::new(RadiusSource::new(
            client,
            config.source.external_source_url.clone(),
            config.station.latitude,
            config.station.longitude,
            config.source.search_radius_nm,
            config.source.api_host.clone(),
            config.source.api_key.clone(),
        )),
        SourceType::BboxExternal => Arc::new(BboxSource::from_config(client, config)?),
    })
}

/// Shared response handling: non-2xx to `Status`, body decode to `Parse`
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, SourceError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(SourceError::Auth(format!("HTTP {}", status.as_u16())));
    }
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| SourceError::Network(e.to_string()))?;
    serde_json::from_slice(&body).map_err(|e| SourceError::Parse(e.to_string()))
}

/// Normalize a raw callsign: trim, never null
pub(crate) fn clean_callsign(raw: &str) -> String {
    raw.trim().to_string()
}

/// Normalize a hex address to the canonical lowercase 6-char form
pub(crate) fn clean_hex(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_callsign_trims() {
        assert_eq!(clean_callsign(" ACA101  "), "ACA101");
        assert_eq!(clean_callsign("        "), "");
    }

    #[test]
    fn clean_hex_lowercases() {
        assert_eq!(clean_hex(" C0FFEE"), "c0ffee");
    }

    #[test]
    fn source_error_display_names_category() {
        assert!(SourceError::Status(503).to_string().contains("503"));
        assert!(
            SourceError::Auth("HTTP 401".into())
                .to_string()
                .contains("authentication")
        );
    }
}
