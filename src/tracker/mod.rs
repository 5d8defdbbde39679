//! The aircraft state engine: one tick per fetch interval through
//! fetch → validate → reconcile → edge detection → phase pass → broadcast.

mod changes;
mod phases;
mod store;
mod transitions;

pub use changes::{ChangeDetector, EVENT_QUEUE_CAPACITY, EventSender};
pub use phases::PhaseEngine;
pub use store::AircraftStore;
pub use transitions::{GroundTransition, check_transition_invariant, detect_transition};

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adsb::Target;
use crate::aircraft::{Aircraft, AircraftStatus, Phase, PhaseChange, PhaseEvent};
use crate::airlines::{AirlineDb, display_identity};
use crate::config::Config;
use crate::events::{PhaseChangeEvent, StatusUpdateEvent, WsMessage};
use crate::geometry::haversine_distance_nm;
use crate::phases_repo::{PhaseChangeInsert, PhasesRepository};
use crate::runways::RunwayDb;
use crate::sensors::{is_airborne, validate_sensors};
use crate::simulation::SimulationService;
use crate::sources::AdsbSource;
use crate::targets_repo::TargetsRepository;

/// Drives the per-tick data flow. Sole writer of the aircraft store.
pub struct TrackerService {
    config: Arc<Config>,
    source: Arc<dyn AdsbSource>,
    store: AircraftStore,
    targets_repo: TargetsRepository,
    phases_repo: PhasesRepository,
    runways: Arc<RunwayDb>,
    airlines: Arc<AirlineDb>,
    engine: PhaseEngine,
    changes: Mutex<ChangeDetector>,
    events: EventSender,
    simulation: Arc<SimulationService>,
    /// Runtime-settable station coordinates; None means the configured ones
    station_override: RwLock<Option<(f64, f64)>>,
}

impl TrackerService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn AdsbSource>,
        store: AircraftStore,
        targets_repo: TargetsRepository,
        phases_repo: PhasesRepository,
        runways: Arc<RunwayDb>,
        airlines: Arc<AirlineDb>,
        events: EventSender,
        simulation: Arc<SimulationService>,
    ) -> Self {
        let engine = PhaseEngine::new(config.phases.clone(), config.station.airport_range_nm);
        let changes = Mutex::new(ChangeDetector::new(
            events.clone(),
            config.source.websocket_aircraft_updates,
        ));
        Self {
            config,
            source,
            store,
            targets_repo,
            phases_repo,
            runways,
            airlines,
            engine,
            changes,
            events,
            simulation,
            station_override: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &AircraftStore {
        &self.store
    }

    pub fn targets_repo(&self) -> &TargetsRepository {
        &self.targets_repo
    }

    pub fn phases_repo(&self) -> &PhasesRepository {
        &self.phases_repo
    }

    pub fn runways(&self) -> &RunwayDb {
        &self.runways
    }

    pub async fn set_station_override(&self, coordinates: Option<(f64, f64)>) {
        *self.station_override.write().await = coordinates;
    }

    pub async fn station(&self) -> (f64, f64) {
        self.station_override.read().await.unwrap_or((
            self.config.station.latitude,
            self.config.station.longitude,
        ))
    }

    /// Fetch loop: one tick per interval until cancelled. Cancellation
    /// finishes the in-flight tick (including its DB writes) first.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.source.fetch_interval_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            source = self.source.name(),
            interval_secs = self.config.source.fetch_interval_seconds,
            "tracker started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("tracker stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        let start = std::time::Instant::now();
        let targets = match self.source.fetch().await {
            Ok(targets) => targets,
            Err(e) => {
                // Transient by definition: prior state stays intact and the
                // next tick retries.
                warn!(source = self.source.name(), "fetch failed: {e}");
                metrics::counter!("tracker.fetch.errors_total").increment(1);
                return;
            }
        };
        metrics::histogram!("tracker.fetch.aircraft_count").record(targets.len() as f64);

        if let Err(e) = self.process_targets(targets, Utc::now()).await {
            error!("tick processing failed: {e:#}");
            metrics::counter!("tracker.tick.errors_total").increment(1);
        }
        metrics::histogram!("tracker.tick.duration_ms")
            .record(start.elapsed().as_micros() as f64 / 1000.0);
    }

    /// One full reconciliation pass over a batch of observations. Public so
    /// the simulation replayer and the integration tests can drive the
    /// pipeline with an explicit clock.
    pub async fn process_targets(&self, mut targets: Vec<Target>, now: DateTime<Utc>) -> Result<()> {
        // Simulated traffic joins the tick ahead of reconciliation
        targets.extend(self.simulation.advance(now));

        // Discard no-fix and out-of-range observations, then keep one
        // observation per hex (the latest) so a tick never writes duplicates.
        targets.retain(|t| {
            !t.has_no_fix()
                && (-90.0..=90.0).contains(&t.lat)
                && (-180.0..=180.0).contains(&t.lon)
                && !t.hex.is_empty()
        });
        let mut by_hex: HashMap<String, Target> = HashMap::with_capacity(targets.len());
        for target in targets {
            match by_hex.get(&target.hex) {
                Some(existing) if existing.timestamp >= target.timestamp => {}
                _ => {
                    by_hex.insert(target.hex.clone(), target);
                }
            }
        }

        let (station_lat, station_lon) = self.station().await;
        let seen: HashSet<String> = by_hex.keys().cloned().collect();

        // Previous phase per hex: in-memory state when we have it, the log
        // otherwise (covers restart hydration).
        let mut prev_phases: HashMap<String, PhaseChange> = HashMap::new();
        let mut need_db: Vec<String> = Vec::new();
        for hex in by_hex.keys() {
            match self.store.get_by_hex(hex).await.and_then(|a| a.phase.current) {
                Some(current) => {
                    prev_phases.insert(hex.clone(), current);
                }
                None => need_db.push(hex.clone()),
            }
        }
        if !need_db.is_empty() {
            match self.phases_repo.get_current_phases_batch(need_db).await {
                Ok(from_log) => prev_phases.extend(from_log),
                Err(e) => warn!("phase log lookup failed, treating hexes as new: {e:#}"),
            }
        }

        // Stage updated aircraft
        let mut staged: Vec<(Aircraft, Option<Aircraft>)> = Vec::with_capacity(by_hex.len());
        for (_, mut target) in by_hex {
            let prior = self.store.get_by_hex(&target.hex).await;
            // A hex with log history but no in-memory state is a restart
            // case: rebuild the derived timestamps from the log
            let hydrate = prior.is_none() && prev_phases.contains_key(&target.hex);
            self.stage(&mut target, prior.as_ref(), station_lat, station_lon, now, &mut staged);
            if hydrate && let Some((aircraft, _)) = staged.last_mut() {
                aircraft.date_of_last_takeoff = self
                    .phases_repo
                    .get_latest_takeoff_time(&aircraft.hex)
                    .await
                    .unwrap_or_default();
                aircraft.date_of_last_landing = self
                    .phases_repo
                    .get_latest_landing_time(&aircraft.hex)
                    .await
                    .unwrap_or_default();
            }
        }

        // Persist the tick's observations first; their row ids anchor any
        // phase rows written below. A failed write skips the whole batch,
        // in-memory state included, so feed and store stay consistent and
        // the next tick retries.
        let tick_targets: Vec<Target> = staged
            .iter()
            .filter_map(|(a, _)| a.adsb.clone())
            .collect();
        let adsb_ids = match self.targets_repo.insert_batch(tick_targets).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("observation persistence failed, skipping tick: {e:#}");
                metrics::counter!("tracker.persistence.errors_total").increment(1);
                return Ok(());
            }
        };

        // Immediate ground↔air edges, written before the general phase pass
        let mut handled: HashSet<String> = HashSet::new();
        let mut transitions: HashMap<String, PhaseChange> = HashMap::new();
        let mut immediate_rows: Vec<PhaseChangeInsert> = Vec::new();
        for (aircraft, prior) in staged.iter() {
            let Some(prior) = prior.as_ref() else { continue };
            let last_phase = prev_phases.get(&aircraft.hex);
            let Some(transition) = detect_transition(
                prior,
                aircraft.on_ground,
                last_phase,
                now,
                &self.config.phases,
            ) else {
                continue;
            };
            if !check_transition_invariant(&aircraft.hex, prior.on_ground, transition) {
                continue;
            }
            // Consecutive log entries must differ in phase; a repeated edge
            // (e.g. T/O recorded while a bounced ground frame was suppressed)
            // stays a single row.
            if last_phase.map(|p| p.phase) == Some(transition.phase) {
                continue;
            }
            let change = PhaseChange {
                phase: transition.phase,
                timestamp: now,
                event_type: Some(transition.event),
                adsb_id: adsb_ids.get(&aircraft.hex).copied(),
            };
            immediate_rows.push(PhaseChangeInsert::new(
                &aircraft.hex,
                &aircraft.flight,
                change.phase,
                change.timestamp,
                change.event_type,
                change.adsb_id,
            ));
            transitions.insert(aircraft.hex.clone(), change);
        }
        if !immediate_rows.is_empty() {
            let count = immediate_rows.len();
            match self.phases_repo.insert_batch(immediate_rows).await {
                Ok(()) => {
                    // Rows are durable; now apply the edges in memory so the
                    // store flip is visible together with the log entry
                    for (aircraft, _) in staged.iter_mut() {
                        if let Some(change) = transitions.remove(&aircraft.hex) {
                            self.push_phase_event(
                                aircraft,
                                prev_phases.get(&aircraft.hex).map(|p| p.phase),
                                &change,
                            );
                            aircraft.record_phase(change.clone());
                            prev_phases.insert(aircraft.hex.clone(), change);
                            handled.insert(aircraft.hex.clone());
                        }
                    }
                    debug!("recorded {count} immediate ground transitions");
                }
                Err(e) => {
                    // Batch not applied; the general pass will re-derive
                    // against the unchanged previous phase next tick
                    error!("phase persistence failed for immediate transitions: {e:#}");
                    metrics::counter!("tracker.persistence.errors_total").increment(1);
                }
            }
        }

        // Upsert staged aircraft, then age everyone we did not hear from
        let staged_aircraft: Vec<Aircraft> = staged.iter().map(|(a, _)| a.clone()).collect();
        self.store.upsert_batch(staged_aircraft).await;
        self.age_absent_aircraft(&seen, station_lat, station_lon, now)
            .await;

        // General phase pass over this tick's aircraft, skipping hexes the
        // transition detector already resolved
        let mut phase_rows: Vec<PhaseChangeInsert> = Vec::new();
        let mut phase_updates: Vec<(Aircraft, Option<Phase>, PhaseChange)> = Vec::new();
        for (aircraft, _) in staged.iter() {
            if handled.contains(&aircraft.hex) {
                continue;
            }
            let Some(mut current) = self.store.get_by_hex(&aircraft.hex).await else {
                continue;
            };
            let prev = prev_phases.get(&aircraft.hex);
            let resolved =
                self.engine
                    .classify(&current, prev, &self.runways, station_lat, station_lon, now);
            if !PhaseEngine::should_emit(resolved, prev) {
                continue;
            }

            let change = PhaseChange {
                phase: resolved,
                timestamp: now,
                event_type: Some(PhaseEvent::PhaseChange),
                adsb_id: adsb_ids.get(&current.hex).copied(),
            };
            phase_rows.push(PhaseChangeInsert::new(
                &current.hex,
                &current.flight,
                change.phase,
                change.timestamp,
                change.event_type,
                change.adsb_id,
            ));
            let from = prev.map(|p| p.phase);
            current.record_phase(change.clone());
            phase_updates.push((current, from, change));
        }
        if !phase_rows.is_empty() {
            match self.phases_repo.insert_batch(phase_rows).await {
                Ok(()) => {
                    for (aircraft, from, change) in &phase_updates {
                        self.push_phase_event(aircraft, *from, change);
                    }
                    self.store
                        .upsert_batch(phase_updates.into_iter().map(|(a, _, _)| a).collect())
                        .await;
                }
                Err(e) => {
                    // Keep memory and log consistent: the classification is
                    // retried next tick against the unchanged previous phase.
                    error!("phase persistence failed, discarding phase pass: {e:#}");
                    metrics::counter!("tracker.persistence.errors_total").increment(1);
                }
            }
        }

        // Diff and broadcast
        let snapshot = self.store.snapshot().await;
        metrics::gauge!("tracker.aircraft_total").set(snapshot.len() as f64);
        metrics::gauge!("tracker.aircraft_active").set(self.store.active_count().await as f64);
        self.changes.lock().await.diff(&snapshot);

        Ok(())
    }

    /// Build the updated Aircraft for one observation: sensor correction,
    /// ground inference, identity, distance, history.
    fn stage(
        &self,
        target: &mut Target,
        prior: Option<&Aircraft>,
        station_lat: f64,
        station_lon: f64,
        now: DateTime<Utc>,
        staged: &mut Vec<(Aircraft, Option<Aircraft>)>,
    ) {
        // Sensor validation against the previous observation
        if let Some(previous) = prior.and_then(|a| a.adsb.as_ref()) {
            let corrected = validate_sensors(
                &target.hex,
                target.tas,
                target.gs,
                target.alt_baro,
                previous.tas,
                previous.gs,
                previous.alt_baro,
                &self.config.phases,
            );
            target.tas = corrected.tas;
            target.gs = corrected.gs;
            target.alt_baro = corrected.altitude;
        }

        // Explicit source flag overrides the inference
        let on_ground = match target.on_ground {
            Some(flag) => flag,
            None => !is_airborne(target.tas, target.gs, target.alt_baro, &self.config.phases),
        };

        let mut aircraft = match prior {
            Some(prior) => prior.clone(),
            None => {
                let fresh = Aircraft::from_target(target.clone());
                self.events.push(WsMessage::StatusUpdate(StatusUpdateEvent {
                    hex: fresh.hex.clone(),
                    callsign: fresh.flight.clone(),
                    new_status: AircraftStatus::Active,
                    on_ground,
                    seconds_since_seen: 0,
                    timestamp: now,
                }));
                fresh
            }
        };

        if aircraft.status == AircraftStatus::SignalLost {
            debug!(hex = aircraft.hex, "aircraft reacquired");
        }
        aircraft.status = AircraftStatus::Active;
        aircraft.last_seen = now;
        aircraft.on_ground = on_ground;
        aircraft.distance_nm =
            haversine_distance_nm(target.lat, target.lon, station_lat, station_lon);

        let identity = display_identity(&target.flight, &target.hex);
        if !identity.is_empty() {
            aircraft.flight = identity;
        }
        if aircraft.airline.is_none() {
            aircraft.airline = self
                .airlines
                .airline_for_callsign(&target.flight)
                .map(|s| s.to_string());
        }

        aircraft.push_position(
            crate::aircraft::Position {
                lat: target.lat,
                lon: target.lon,
                altitude: target.alt_baro,
                timestamp: target.timestamp,
            },
            self.config.storage.max_positions_in_api,
        );
        aircraft.simulated = self.simulation.is_simulated(&target.hex);
        aircraft.adsb = Some(target.clone());

        staged.push((aircraft, prior.cloned()));
    }

    /// Mark aircraft we stopped hearing from, applying the signal-lost
    /// landing heuristic where it fits.
    async fn age_absent_aircraft(
        &self,
        seen: &HashSet<String>,
        station_lat: f64,
        station_lon: f64,
        now: DateTime<Utc>,
    ) {
        let config = &self.config;
        let snapshot = self.store.snapshot().await;
        let mut lost_rows: Vec<PhaseChangeInsert> = Vec::new();
        let mut updates: Vec<Aircraft> = Vec::new();

        for (hex, aircraft) in snapshot {
            if seen.contains(&hex) || aircraft.status != AircraftStatus::Active {
                continue;
            }
            let silent_for = aircraft.seconds_since_seen(now);
            if silent_for <= config.source.signal_lost_timeout_seconds {
                continue;
            }

            let mut aircraft = aircraft;
            if let Some(change) = self.signal_lost_landing(&aircraft, station_lat, station_lon, now)
            {
                info!(
                    hex = aircraft.hex,
                    flight = aircraft.flight,
                    "concluding landing for aircraft lost on approach"
                );
                lost_rows.push(PhaseChangeInsert::new(
                    &aircraft.hex,
                    &aircraft.flight,
                    change.phase,
                    change.timestamp,
                    change.event_type,
                    change.adsb_id,
                ));
                self.push_phase_event(&aircraft, aircraft.current_phase(), &change);
                aircraft.record_phase(change);
                aircraft.on_ground = true;
            }

            aircraft.status = AircraftStatus::SignalLost;
            self.events.push(WsMessage::StatusUpdate(StatusUpdateEvent {
                hex: aircraft.hex.clone(),
                callsign: aircraft.flight.clone(),
                new_status: AircraftStatus::SignalLost,
                on_ground: aircraft.on_ground,
                seconds_since_seen: silent_for,
                timestamp: now,
            }));
            metrics::counter!("tracker.signal_lost_total").increment(1);
            updates.push(aircraft);
        }

        if !lost_rows.is_empty()
            && let Err(e) = self.phases_repo.insert_batch(lost_rows).await
        {
            error!("phase persistence failed for signal-lost landings: {e:#}");
            metrics::counter!("tracker.persistence.errors_total").increment(1);
        }
        if !updates.is_empty() {
            self.store.upsert_batch(updates).await;
        }
    }

    /// An aircraft that vanished on final, low and close to the airport, has
    /// in all likelihood landed below coverage. Requires the last phase to
    /// be APP, or ARR below 2,000 ft.
    fn signal_lost_landing(
        &self,
        aircraft: &Aircraft,
        station_lat: f64,
        station_lon: f64,
        now: DateTime<Utc>,
    ) -> Option<PhaseChange> {
        let config = &self.config;
        if !config.phases.signal_lost_landing_enabled || aircraft.on_ground {
            return None;
        }
        let target = aircraft.adsb.as_ref()?;
        let phase_fits = match aircraft.current_phase() {
            Some(Phase::Approach) => true,
            Some(Phase::Arrival) => target.alt_baro < 2000.0,
            _ => false,
        };
        if !phase_fits {
            return None;
        }
        let distance = haversine_distance_nm(target.lat, target.lon, station_lat, station_lon);
        if distance > config.station.airport_range_nm
            || target.alt_baro >= config.phases.signal_lost_landing_max_alt_ft
        {
            return None;
        }
        metrics::counter!("tracker.signal_lost_landings_total").increment(1);
        Some(PhaseChange {
            phase: Phase::Touchdown,
            timestamp: now,
            event_type: Some(PhaseEvent::SignalLostLanding),
            adsb_id: None,
        })
    }

    fn push_phase_event(&self, aircraft: &Aircraft, from: Option<Phase>, change: &PhaseChange) {
        let altitude = aircraft.adsb.as_ref().map(|t| t.alt_baro).unwrap_or(0.0);
        self.events.push(WsMessage::PhaseChange(PhaseChangeEvent {
            hex: aircraft.hex.clone(),
            callsign: aircraft.flight.clone(),
            from,
            to: change.phase,
            event_type: change.event_type,
            altitude,
            on_ground: aircraft.on_ground,
            timestamp: change.timestamp,
        }));
        metrics::counter!("tracker.phase_changes_total", "phase" => change.phase.as_str())
            .increment(1);
    }
}
