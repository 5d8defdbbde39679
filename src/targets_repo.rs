//! Append-only storage for per-tick normalized observations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::adsb::Target;
use crate::aircraft::Position;
use crate::db::Database;

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::adsb_targets)]
struct NewTargetRow {
    hex: String,
    flight: String,
    lat: f64,
    lon: f64,
    alt_baro: f64,
    alt_geom: f64,
    gs: f64,
    tas: f64,
    true_heading: f64,
    mag_heading: f64,
    track: f64,
    baro_rate: f64,
    squawk: String,
    category: String,
    on_ground: bool,
    source: String,
    timestamp: DateTime<Utc>,
}

impl From<&Target> for NewTargetRow {
    fn from(t: &Target) -> Self {
        Self {
            hex: t.hex.clone(),
            flight: t.flight.clone(),
            lat: t.lat,
            lon: t.lon,
            alt_baro: t.alt_baro,
            alt_geom: t.alt_geom,
            gs: t.gs,
            tas: t.tas,
            true_heading: t.true_heading,
            mag_heading: t.mag_heading,
            track: t.track,
            baro_rate: t.baro_rate,
            squawk: t.squawk.clone(),
            category: t.category.clone(),
            on_ground: t.on_ground.unwrap_or(false),
            source: t.source.to_string(),
            timestamp: t.timestamp,
        }
    }
}

#[derive(Clone)]
pub struct TargetsRepository {
    db: Arc<Database>,
}

impl TargetsRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert one tick's observations in a single transaction, returning the
    /// row id per hex so phase-change rows can link back to the observation
    /// that triggered them.
    pub async fn insert_batch(&self, targets: Vec<Target>) -> Result<HashMap<String, i64>> {
        if targets.is_empty() {
            return Ok(HashMap::new());
        }
        let pool = self.db.pool();

        tokio::task::spawn_blocking(move || {
            use crate::schema::adsb_targets::dsl::*;

            let mut conn = pool.get()?;
            let ids = conn.transaction::<_, anyhow::Error, _>(|conn| {
                let mut ids = HashMap::with_capacity(targets.len());
                for target in &targets {
                    let row = NewTargetRow::from(target);
                    let row_id: i64 = diesel::insert_into(adsb_targets)
                        .values(&row)
                        .returning(id)
                        .get_result(conn)?;
                    ids.insert(target.hex.clone(), row_id);
                }
                Ok(ids)
            })?;

            metrics::counter!("storage.targets.inserted_total").increment(ids.len() as u64);
            trace!("inserted {} observation rows", ids.len());
            Ok(ids)
        })
        .await?
    }

    /// Most recent positions for one hex, time-ascending, capped at `limit`
    pub async fn get_position_history(
        &self,
        target_hex: &str,
        limit: usize,
    ) -> Result<Vec<Position>> {
        let pool = self.db.pool();
        let target_hex = target_hex.to_string();

        tokio::task::spawn_blocking(move || {
            use crate::schema::adsb_targets::dsl::*;

            let mut conn = pool.get()?;
            let mut rows: Vec<(f64, f64, f64, DateTime<Utc>)> = adsb_targets
                .filter(hex.eq(&target_hex))
                .order(timestamp.desc())
                .limit(limit as i64)
                .select((lat, lon, alt_baro, timestamp))
                .load(&mut conn)?;
            rows.reverse();

            Ok(rows
                .into_iter()
                .map(|(row_lat, row_lon, altitude, ts)| Position {
                    lat: row_lat,
                    lon: row_lon,
                    altitude,
                    timestamp: ts,
                })
                .collect())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adsb::SourceKind;
    use chrono::TimeZone;

    fn target(hex: &str, offset_secs: i64) -> Target {
        Target {
            hex: hex.to_string(),
            flight: "ACA101".to_string(),
            lat: 43.6,
            lon: -79.6,
            alt_baro: 2000.0 + offset_secs as f64,
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
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
                + chrono::Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn insert_batch_returns_ids_per_hex() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(dir.path()).unwrap());
        let repo = TargetsRepository::new(db);

        let ids = repo
            .insert_batch(vec![target("c0ffee", 0), target("abc123", 0)])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains_key("c0ffee"));
        assert!(ids.contains_key("abc123"));
    }

    #[tokio::test]
    async fn position_history_is_ascending_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(dir.path()).unwrap());
        let repo = TargetsRepository::new(db);

        for i in 0..10 {
            repo.insert_batch(vec![target("c0ffee", i * 5)]).await.unwrap();
        }

        let history = repo.get_position_history("c0ffee", 4).await.unwrap();
        assert_eq!(history.len(), 4);
        assert!(
            history
                .windows(2)
                .all(|w| w[0].timestamp < w[1].timestamp),
            "history must be time-ascending"
        );
        // The cap keeps the latest rows
        assert_eq!(history.last().unwrap().altitude, 2045.0);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(dir.path()).unwrap());
        let repo = TargetsRepository::new(db);
        let ids = repo.insert_batch(vec![]).await.unwrap();
        assert!(ids.is_empty());
    }
}
