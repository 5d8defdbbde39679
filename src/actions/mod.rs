//! HTTP handlers, grouped by resource.

pub mod aircraft;
pub mod simulation;
pub mod status;
pub mod ws;

use axum::Json;
use axum::http::StatusCode;
use serde_json::json;

/// Uniform error body for the API
pub(crate) fn api_error(status: StatusCode, message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(json!({ "error": message })))
}
