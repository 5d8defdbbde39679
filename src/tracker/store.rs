//! In-memory reconciliation store: one `Aircraft` per hex.
//!
//! The tick orchestrator is the only writer; API handlers and the context
//! renderer read concurrently through the RwLock. Aircraft are never
//! removed, they only transition to `SignalLost`.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::aircraft::{Aircraft, AircraftStatus};

#[derive(Clone, Default)]
pub struct AircraftStore {
    inner: Arc<RwLock<HashMap<String, Aircraft>>>,
}

impl AircraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_by_hex(&self, hex: &str) -> Option<Aircraft> {
        self.inner.read().await.get(hex).cloned()
    }

    pub async fn upsert(&self, aircraft: Aircraft) {
        self.inner
            .write()
            .await
            .insert(aircraft.hex.clone(), aircraft);
    }

    pub async fn upsert_batch(&self, aircraft: Vec<Aircraft>) {
        let mut guard = self.inner.write().await;
        for a in aircraft {
            guard.insert(a.hex.clone(), a);
        }
    }

    pub async fn get_all(&self) -> Vec<Aircraft> {
        self.inner.read().await.values().cloned().collect()
    }

    /// Full keyed snapshot, used by the change detector and the aging pass
    pub async fn snapshot(&self) -> HashMap<String, Aircraft> {
        self.inner.read().await.clone()
    }

    pub async fn remove(&self, hex: &str) -> Option<Aircraft> {
        self.inner.write().await.remove(hex)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn active_count(&self) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|a| a.status == AircraftStatus::Active)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adsb::{SourceKind, Target};
    use chrono::Utc;

    fn aircraft(hex: &str) -> Aircraft {
        Aircraft::from_target(Target {
            hex: hex.to_string(),
            flight: String::new(),
            lat: 43.6,
            lon: -79.6,
            alt_baro: 0.0,
            alt_geom: 0.0,
            gs: 0.0,
            tas: 0.0,
            true_heading: 0.0,
            mag_heading: 0.0,
            track: 0.0,
            baro_rate: 0.0,
            squawk: String::new(),
            category: String::new(),
            on_ground: None,
            source: SourceKind::Local,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn one_aircraft_per_hex() {
        let store = AircraftStore::new();
        store.upsert(aircraft("c0ffee")).await;
        store.upsert(aircraft("c0ffee")).await;
        assert_eq!(store.len().await, 1);
        assert!(store.get_by_hex("c0ffee").await.is_some());
        assert!(store.get_by_hex("other0").await.is_none());
    }

    #[tokio::test]
    async fn batch_upsert_and_counts() {
        let store = AircraftStore::new();
        let mut lost = aircraft("aaa111");
        lost.status = AircraftStatus::SignalLost;
        store.upsert_batch(vec![aircraft("c0ffee"), lost]).await;
        assert_eq!(store.len().await, 2);
        assert_eq!(store.active_count().await, 1);
    }
}
