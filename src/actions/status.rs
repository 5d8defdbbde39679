//! Station, weather and context endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use super::api_error;
use crate::web::AppState;

/// Station metadata plus the runway dataset (with precomputed extended
/// centerlines) for map rendering.
pub async fn get_station(State(state): State<AppState>) -> Json<Value> {
    let (lat, lon) = state.tracker.station().await;
    let runways: Vec<_> = state.tracker.runways().all().collect();
    Json(json!({
        "airport_code": state.config.station.airport_code,
        "latitude": lat,
        "longitude": lon,
        "elevation_feet": state.config.station.elevation_feet,
        "airport_range_nm": state.config.station.airport_range_nm,
        "runways": runways,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StationOverride {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Override (or clear, with both fields absent) the station coordinates
/// used for distance, bearing and the signal-lost landing heuristic.
pub async fn put_station_override(
    State(state): State<AppState>,
    Json(body): Json<StationOverride>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match (body.latitude, body.longitude) {
        (Some(lat), Some(lon)) => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                return Err(api_error(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "coordinates out of range",
                ));
            }
            state.tracker.set_station_override(Some((lat, lon))).await;
        }
        (None, None) => state.tracker.set_station_override(None).await,
        _ => {
            return Err(api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "latitude and longitude must be set together",
            ));
        }
    }
    let (lat, lon) = state.tracker.station().await;
    Ok(Json(json!({ "latitude": lat, "longitude": lon })))
}

pub async fn get_weather(State(state): State<AppState>) -> Json<Value> {
    match state.weather.current().await {
        Some(report) => Json(json!(report)),
        None => Json(json!({ "available": false })),
    }
}

pub async fn get_context(State(state): State<AppState>) -> String {
    state.renderer.render(Utc::now()).await
}
