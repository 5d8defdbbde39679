//! Weather collaborator: a provider interface plus a periodically refreshed
//! cache. The service only consumes `WeatherProvider::get`; what sits behind
//! it (aviation weather APIs, files, fixtures) is not this crate's concern
//! beyond the thin HTTP implementation used by default.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherReport {
    #[serde(default)]
    pub metar: Option<String>,
    #[serde(default)]
    pub taf: Option<String>,
    #[serde(default)]
    pub notams: Vec<String>,
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn get(&self) -> Result<WeatherReport>;
}

/// Provider that GETs a JSON `{metar, taf, notams}` document
pub struct HttpWeatherProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpWeatherProvider {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl WeatherProvider for HttpWeatherProvider {
    async fn get(&self) -> Result<WeatherReport> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("weather request failed")?
            .error_for_status()
            .context("weather endpoint returned an error")?;
        let mut report: WeatherReport = response
            .json()
            .await
            .context("failed to parse weather document")?;
        report.fetched_at = Utc::now();
        Ok(report)
    }
}

/// Cached weather refreshed on an interval by a background task. A failed
/// refresh keeps the previous report; staleness is visible via
/// `fetched_at`.
pub struct WeatherService {
    provider: Option<Arc<dyn WeatherProvider>>,
    cache: RwLock<Option<WeatherReport>>,
    refresh_interval: Duration,
}

impl WeatherService {
    pub fn new(provider: Option<Arc<dyn WeatherProvider>>, refresh_interval: Duration) -> Self {
        Self {
            provider,
            cache: RwLock::new(None),
            refresh_interval,
        }
    }

    pub async fn current(&self) -> Option<WeatherReport> {
        self.cache.read().await.clone()
    }

    pub async fn refresh(&self) {
        let Some(provider) = &self.provider else {
            return;
        };
        match provider.get().await {
            Ok(report) => {
                info!("weather refreshed");
                *self.cache.write().await = Some(report);
            }
            Err(e) => {
                warn!("weather refresh failed, keeping previous report: {e:#}");
                metrics::counter!("weather.refresh_errors_total").increment(1);
            }
        }
    }

    /// Refresh immediately, then on the configured interval until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        if self.provider.is_none() {
            info!("weather refresh disabled (no provider configured)");
            return;
        }
        self.refresh().await;
        let mut interval = tokio::time::interval(self.refresh_interval);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.refresh().await,
            }
        }
    }
}
