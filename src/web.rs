//! HTTP/WebSocket surface. Thin by design: read-only views over the store,
//! the simulation control endpoints, and the live event socket.

use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, put},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::actions;
use crate::config::Config;
use crate::context::ContextRenderer;
use crate::simulation::SimulationService;
use crate::socket::WsBroadcaster;
use crate::tracker::TrackerService;
use crate::weather::WeatherService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tracker: Arc<TrackerService>,
    pub renderer: Arc<ContextRenderer>,
    pub weather: Arc<WeatherService>,
    pub simulation: Arc<SimulationService>,
    pub broadcaster: Arc<WsBroadcaster>,
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/api/aircraft", get(actions::aircraft::get_all))
        .route("/api/aircraft/{hex}", get(actions::aircraft::get_by_hex))
        .route(
            "/api/aircraft/{hex}/history",
            get(actions::aircraft::get_history),
        )
        .route(
            "/api/aircraft/{hex}/phases",
            get(actions::aircraft::get_phases),
        )
        .route(
            "/api/station",
            get(actions::status::get_station).put(actions::status::put_station_override),
        )
        .route("/api/weather", get(actions::status::get_weather))
        .route("/api/context", get(actions::status::get_context))
        .route(
            "/api/simulation",
            get(actions::simulation::list).post(actions::simulation::create),
        )
        .route(
            "/api/simulation/{hex}",
            put(actions::simulation::update).delete(actions::simulation::remove),
        )
        .route("/ws", get(actions::ws::ws_handler));

    if !state.config.server.static_dir.is_empty() {
        router = router.fallback_service(ServeDir::new(&state.config.server.static_dir));
    }
    if state.config.server.cors_permissive {
        router = router.layer(CorsLayer::permissive());
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Bind and serve until the cancellation token fires
pub async fn serve(state: AppState, cancel: CancellationToken) -> Result<()> {
    let addr = state.config.server.bind_addr.clone();
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("server error")
}
