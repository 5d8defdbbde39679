//! Simulated aircraft control endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{Value, json};

use super::api_error;
use crate::aircraft::SimulationControls;
use crate::simulation::CreateSimulatedAircraft;
use crate::web::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "aircraft": state.simulation.list() }))
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateSimulatedAircraft>,
) -> (StatusCode, Json<Value>) {
    let created = state.simulation.create(request, Utc::now());
    (StatusCode::CREATED, Json(json!(created)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(hex): Path<String>,
    Json(controls): Json<SimulationControls>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if state.simulation.update_controls(&hex, controls) {
        Ok(Json(json!({ "hex": hex, "controls": controls })))
    } else {
        Err(api_error(StatusCode::NOT_FOUND, "unknown simulated aircraft"))
    }
}

/// Removing a simulated aircraft drops it from the store as well, which
/// surfaces as an `aircraft_removed` event on the next tick's diff.
pub async fn remove(
    State(state): State<AppState>,
    Path(hex): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    if state.simulation.remove(&hex) {
        state.tracker.store().remove(&hex).await;
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(StatusCode::NOT_FOUND, "unknown simulated aircraft"))
    }
}
