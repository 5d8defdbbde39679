//! Outbound event envelope pushed to WebSocket subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aircraft::{Aircraft, AircraftStatus, Phase, PhaseEvent};

/// Everything that flows from the tick pipeline to connected clients.
/// Serialized as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WsMessage {
    AircraftAdded(Box<Aircraft>),
    AircraftUpdate(Box<Aircraft>),
    AircraftRemoved(AircraftRemoved),
    PhaseChange(PhaseChangeEvent),
    StatusUpdate(StatusUpdateEvent),
}

#[derive(Debug, Clone, Serialize)]
pub struct AircraftRemoved {
    pub hex: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseChangeEvent {
    pub hex: String,
    pub callsign: String,
    pub from: Option<Phase>,
    pub to: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<PhaseEvent>,
    pub altitude: f64,
    pub on_ground: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdateEvent {
    pub hex: String,
    pub callsign: String,
    pub new_status: AircraftStatus,
    pub on_ground: bool,
    /// Seconds since the aircraft was last observed
    pub seconds_since_seen: i64,
    pub timestamp: DateTime<Utc>,
}

impl WsMessage {
    /// Short name for logging and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            WsMessage::AircraftAdded(_) => "aircraft_added",
            WsMessage::AircraftUpdate(_) => "aircraft_update",
            WsMessage::AircraftRemoved(_) => "aircraft_removed",
            WsMessage::PhaseChange(_) => "phase_change",
            WsMessage::StatusUpdate(_) => "status_update",
        }
    }
}
