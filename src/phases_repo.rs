//! Append-only flight phase log.
//!
//! One row per phase change per hex; the current phase of an aircraft is the
//! latest row. Takeoff and landing timestamps derive from rows whose
//! `event_type` marks them.

use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::aircraft::{Phase, PhaseChange, PhaseEvent};
use crate::db::Database;

/// Insert payload for one phase-change row
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::phase_changes)]
pub struct PhaseChangeInsert {
    pub hex: String,
    pub flight: String,
    pub phase: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: Option<String>,
    pub adsb_id: Option<i64>,
}

impl PhaseChangeInsert {
    pub fn new(
        hex: &str,
        flight: &str,
        phase: Phase,
        timestamp: DateTime<Utc>,
        event_type: Option<PhaseEvent>,
        adsb_id: Option<i64>,
    ) -> Self {
        Self {
            hex: hex.to_string(),
            flight: flight.to_string(),
            phase: phase.as_str().to_string(),
            timestamp,
            event_type: event_type.map(|e| e.as_str().to_string()),
            adsb_id,
        }
    }
}

type PhaseRow = (String, String, DateTime<Utc>, Option<String>, Option<i64>);

fn row_to_change(row: PhaseRow) -> Option<(String, PhaseChange)> {
    let (row_hex, phase_str, ts, event, adsb_id) = row;
    let phase = Phase::from_str(&phase_str)?;
    Some((
        row_hex,
        PhaseChange {
            phase,
            timestamp: ts,
            event_type: event.as_deref().and_then(PhaseEvent::from_str),
            adsb_id,
        },
    ))
}

#[derive(Clone)]
pub struct PhasesRepository {
    db: Arc<Database>,
}

impl PhasesRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn insert_batch(&self, rows: Vec<PhaseChangeInsert>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let pool = self.db.pool();

        tokio::task::spawn_blocking(move || {
            use crate::schema::phase_changes::dsl::*;

            let mut conn = pool.get()?;
            let inserted = diesel::insert_into(phase_changes)
                .values(&rows)
                .execute(&mut conn)?;
            metrics::counter!("storage.phase_changes.inserted_total").increment(inserted as u64);
            trace!("inserted {inserted} phase-change rows");
            Ok(())
        })
        .await?
    }

    /// Latest phase-change row for one hex
    pub async fn get_current_phase(&self, target_hex: &str) -> Result<Option<PhaseChange>> {
        let pool = self.db.pool();
        let target_hex = target_hex.to_string();

        tokio::task::spawn_blocking(move || {
            use crate::schema::phase_changes::dsl::*;

            let mut conn = pool.get()?;
            let row: Option<PhaseRow> = phase_changes
                .filter(hex.eq(&target_hex))
                .order(timestamp.desc())
                .select((hex, phase, timestamp, event_type, adsb_id))
                .first(&mut conn)
                .optional()?;

            Ok(row.and_then(row_to_change).map(|(_, change)| change))
        })
        .await?
    }

    /// Latest phase-change row per hex, for one tick's worth of aircraft
    pub async fn get_current_phases_batch(
        &self,
        hexes: Vec<String>,
    ) -> Result<HashMap<String, PhaseChange>> {
        if hexes.is_empty() {
            return Ok(HashMap::new());
        }
        let pool = self.db.pool();

        tokio::task::spawn_blocking(move || {
            use crate::schema::phase_changes::dsl::*;

            let mut conn = pool.get()?;
            // Time-ascending scan; the last row per hex wins
            let rows: Vec<PhaseRow> = phase_changes
                .filter(hex.eq_any(&hexes))
                .order(timestamp.asc())
                .select((hex, phase, timestamp, event_type, adsb_id))
                .load(&mut conn)?;

            let mut current = HashMap::new();
            for row in rows {
                if let Some((row_hex, change)) = row_to_change(row) {
                    current.insert(row_hex, change);
                }
            }
            Ok(current)
        })
        .await?
    }

    /// Full log tail for one hex, time-ascending, capped at `limit`
    pub async fn get_phase_history(
        &self,
        target_hex: &str,
        limit: usize,
    ) -> Result<Vec<PhaseChange>> {
        let pool = self.db.pool();
        let target_hex = target_hex.to_string();

        tokio::task::spawn_blocking(move || {
            use crate::schema::phase_changes::dsl::*;

            let mut conn = pool.get()?;
            let mut rows: Vec<PhaseRow> = phase_changes
                .filter(hex.eq(&target_hex))
                .order(timestamp.desc())
                .limit(limit as i64)
                .select((hex, phase, timestamp, event_type, adsb_id))
                .load(&mut conn)?;
            rows.reverse();

            Ok(rows
                .into_iter()
                .filter_map(row_to_change)
                .map(|(_, change)| change)
                .collect())
        })
        .await?
    }

    pub async fn get_latest_takeoff_time(&self, hex: &str) -> Result<Option<DateTime<Utc>>> {
        self.latest_event_time(hex, PhaseEvent::Takeoff).await
    }

    pub async fn get_latest_landing_time(&self, hex: &str) -> Result<Option<DateTime<Utc>>> {
        self.latest_event_time(hex, PhaseEvent::Landing).await
    }

    async fn latest_event_time(
        &self,
        target_hex: &str,
        event: PhaseEvent,
    ) -> Result<Option<DateTime<Utc>>> {
        let pool = self.db.pool();
        let target_hex = target_hex.to_string();
        let event_name = event.as_str().to_string();

        tokio::task::spawn_blocking(move || {
            use crate::schema::phase_changes::dsl::*;

            let mut conn = pool.get()?;
            let ts: Option<DateTime<Utc>> = phase_changes
                .filter(hex.eq(&target_hex))
                .filter(event_type.eq(&event_name))
                .order(timestamp.desc())
                .select(timestamp)
                .first(&mut conn)
                .optional()?;
            Ok(ts)
        })
        .await?
    }
}
