//! Read-only aircraft views over the reconciliation store.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::error;

use super::api_error;
use crate::web::AppState;

pub async fn get_all(State(state): State<AppState>) -> Json<Value> {
    let mut aircraft = state.tracker.store().get_all().await;
    aircraft.sort_by(|a, b| {
        a.distance_nm
            .partial_cmp(&b.distance_nm)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Json(json!({ "count": aircraft.len(), "aircraft": aircraft }))
}

pub async fn get_by_hex(
    State(state): State<AppState>,
    Path(hex): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let hex = hex.to_lowercase();
    match state.tracker.store().get_by_hex(&hex).await {
        Some(aircraft) => Ok(Json(json!(aircraft))),
        None => Err(api_error(StatusCode::NOT_FOUND, "unknown aircraft")),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

pub async fn get_phases(
    State(state): State<AppState>,
    Path(hex): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let hex = hex.to_lowercase();
    let limit = query.limit.unwrap_or(50).min(500);

    match state
        .tracker
        .phases_repo()
        .get_phase_history(&hex, limit)
        .await
    {
        Ok(phases) => Ok(Json(json!({ "hex": hex, "phases": phases }))),
        Err(e) => {
            error!("phase history query failed for {hex}: {e:#}");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "phase history unavailable",
            ))
        }
    }
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(hex): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let hex = hex.to_lowercase();
    let cap = state.config.storage.max_positions_in_api;
    let limit = query.limit.unwrap_or(cap).min(cap);

    match state
        .tracker
        .targets_repo()
        .get_position_history(&hex, limit)
        .await
    {
        Ok(positions) => Ok(Json(json!({ "hex": hex, "positions": positions }))),
        Err(e) => {
            error!("history query failed for {hex}: {e:#}");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "history unavailable",
            ))
        }
    }
}
