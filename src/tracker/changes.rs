//! Snapshot diffing and the bounded event queue feeding the broadcaster.
//!
//! Losing an incremental update is preferable to stalling the fetch loop:
//! when the queue is full the batch is dropped with a warning and clients
//! reconcile on their next full snapshot request.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::aircraft::Aircraft;
use crate::events::{AircraftRemoved, WsMessage};

/// Capacity of the tick → broadcaster queue
pub const EVENT_QUEUE_CAPACITY: usize = 100;

/// Cloneable handle pushing events onto the bounded queue, drop-on-full
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<WsMessage>,
}

impl EventSender {
    pub fn channel() -> (EventSender, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        (EventSender { tx }, rx)
    }

    pub fn push(&self, message: WsMessage) {
        let kind = message.kind();
        match self.tx.try_send(message) {
            Ok(()) => {
                metrics::counter!("events.queued_total", "kind" => kind).increment(1);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(kind, "event queue full, dropping event");
                metrics::counter!("events.dropped_total", "kind" => kind).increment(1);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Broadcast worker is gone; shutdown is in progress
            }
        }
    }
}

/// Diffs consecutive tick snapshots into added/updated/removed events
pub struct ChangeDetector {
    previous: HashMap<String, Aircraft>,
    events: EventSender,
    enabled: bool,
}

impl ChangeDetector {
    pub fn new(events: EventSender, enabled: bool) -> Self {
        Self {
            previous: HashMap::new(),
            events,
            enabled,
        }
    }

    /// Emit events for everything that changed since the previous snapshot,
    /// then retain the current snapshot for the next tick.
    pub fn diff(&mut self, current: &HashMap<String, Aircraft>) {
        if !self.enabled {
            self.previous = current.clone();
            return;
        }

        for (hex, aircraft) in current {
            match self.previous.get(hex) {
                None => {
                    self.events
                        .push(WsMessage::AircraftAdded(Box::new(aircraft.clone())));
                }
                Some(before) if observably_different(before, aircraft) => {
                    self.events
                        .push(WsMessage::AircraftUpdate(Box::new(aircraft.clone())));
                }
                Some(_) => {}
            }
        }

        // Aircraft are retained through signal loss; a hex disappears from
        // the snapshot only when the store actually dropped it (simulation
        // teardown), which is the one case clients must forget it.
        for hex in self.previous.keys() {
            if !current.contains_key(hex) {
                self.events
                    .push(WsMessage::AircraftRemoved(AircraftRemoved {
                        hex: hex.clone(),
                    }));
            }
        }

        self.previous = current.clone();
    }
}

/// Field-wise comparison of what clients can see. Position history length
/// changes ride along with `last_seen`, so they are not compared directly.
fn observably_different(a: &Aircraft, b: &Aircraft) -> bool {
    if a.last_seen != b.last_seen
        || a.status != b.status
        || a.on_ground != b.on_ground
        || a.flight != b.flight
        || a.phase.current != b.phase.current
    {
        return true;
    }
    match (&a.adsb, &b.adsb) {
        (Some(x), Some(y)) => {
            x.lat != y.lat
                || x.lon != y.lon
                || x.alt_baro != y.alt_baro
                || x.gs != y.gs
                || x.track != y.track
                || x.squawk != y.squawk
        }
        (None, None) => false,
        _ => true,
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
            flight: "ACA101".to_string(),
            lat: 43.68,
            lon: -79.65,
            alt_baro: 2000.0,
            alt_geom: 2000.0,
            gs: 150.0,
            tas: 150.0,
            true_heading: 90.0,
            mag_heading: 90.0,
            track: 90.0,
            baro_rate: 0.0,
            squawk: "1200".to_string(),
            category: "A3".to_string(),
            on_ground: None,
            source: SourceKind::Local,
            timestamp: Utc::now(),
        })
    }

    fn snapshot(aircraft: &[Aircraft]) -> HashMap<String, Aircraft> {
        aircraft
            .iter()
            .map(|a| (a.hex.clone(), a.clone()))
            .collect()
    }

    #[tokio::test]
    async fn first_sighting_emits_added() {
        let (events, mut rx) = EventSender::channel();
        let mut detector = ChangeDetector::new(events, true);
        detector.diff(&snapshot(&[aircraft("c0ffee")]));

        let message = rx.recv().await.unwrap();
        assert_eq!(message.kind(), "aircraft_added");
    }

    #[tokio::test]
    async fn unchanged_aircraft_emits_nothing() {
        let (events, mut rx) = EventSender::channel();
        let mut detector = ChangeDetector::new(events, true);
        let snap = snapshot(&[aircraft("c0ffee")]);
        detector.diff(&snap);
        let _ = rx.recv().await.unwrap();

        detector.diff(&snap);
        assert!(rx.try_recv().is_err(), "no event for identical snapshot");
    }

    #[tokio::test]
    async fn position_change_emits_update() {
        let (events, mut rx) = EventSender::channel();
        let mut detector = ChangeDetector::new(events, true);
        let a = aircraft("c0ffee");
        detector.diff(&snapshot(std::slice::from_ref(&a)));
        let _ = rx.recv().await.unwrap();

        let mut moved = a.clone();
        moved.adsb.as_mut().unwrap().lat += 0.01;
        detector.diff(&snapshot(&[moved]));
        let message = rx.recv().await.unwrap();
        assert_eq!(message.kind(), "aircraft_update");
    }

    #[tokio::test]
    async fn dropped_hex_emits_removed() {
        let (events, mut rx) = EventSender::channel();
        let mut detector = ChangeDetector::new(events, true);
        detector.diff(&snapshot(&[aircraft("c0ffee")]));
        let _ = rx.recv().await.unwrap();

        detector.diff(&snapshot(&[]));
        let message = rx.recv().await.unwrap();
        assert_eq!(message.kind(), "aircraft_removed");
    }

    #[tokio::test]
    async fn disabled_detector_stays_silent() {
        let (events, mut rx) = EventSender::channel();
        let mut detector = ChangeDetector::new(events, false);
        detector.diff(&snapshot(&[aircraft("c0ffee")]));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn queue_overflow_drops_instead_of_blocking() {
        let (events, mut rx) = EventSender::channel();
        // Fill the queue past capacity without draining
        for i in 0..(EVENT_QUEUE_CAPACITY + 20) {
            events.push(WsMessage::AircraftRemoved(AircraftRemoved {
                hex: format!("{i:06x}"),
            }));
        }
        // Exactly the capacity made it through; the rest were dropped
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, EVENT_QUEUE_CAPACITY);
    }
}
