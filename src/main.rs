use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use co_atc::airlines::AirlineDb;
use co_atc::config::Config;
use co_atc::context::ContextRenderer;
use co_atc::db::Database;
use co_atc::phases_repo::PhasesRepository;
use co_atc::runways::RunwayDb;
use co_atc::simulation::SimulationService;
use co_atc::socket::{WsBroadcaster, run_broadcast_worker};
use co_atc::sources::build_source;
use co_atc::targets_repo::TargetsRepository;
use co_atc::tracker::{AircraftStore, EventSender, TrackerService};
use co_atc::weather::{HttpWeatherProvider, WeatherProvider, WeatherService};
use co_atc::web::{AppState, serve};

#[derive(Debug, Parser)]
#[command(name = "co-atc", about = "Local air-traffic awareness service")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "co-atc.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Arc::new(Config::load(&cli.config)?);
    info!(
        airport = config.station.airport_code,
        source = ?config.source.source_type,
        "starting co-atc"
    );

    // Startup data; runway data is required, airlines degrade to empty
    let runways = Arc::new(
        RunwayDb::load(
            std::path::Path::new(&config.station.runways_db_path),
            &config.station.airport_code,
            config.station.runway_extension_length_nm,
        )
        .context("runway database is required")?,
    );
    let airlines = Arc::new(
        AirlineDb::load(std::path::Path::new(&config.station.airlines_db_path)).unwrap_or_else(
            |e| {
                warn!("airline database unavailable, continuing without: {e:#}");
                AirlineDb::default()
            },
        ),
    );

    let database = Arc::new(Database::open(std::path::Path::new(&config.storage.base_path))?);
    info!("storing to {}", database.current_path().display());
    let targets_repo = TargetsRepository::new(Arc::clone(&database));
    let phases_repo = PhasesRepository::new(Arc::clone(&database));

    let source = build_source(&config)?;
    let store = AircraftStore::new();
    let simulation = Arc::new(SimulationService::new());
    let (events, events_rx) = EventSender::channel();

    let tracker = Arc::new(TrackerService::new(
        Arc::clone(&config),
        source,
        store.clone(),
        targets_repo,
        phases_repo,
        Arc::clone(&runways),
        airlines,
        events,
        Arc::clone(&simulation),
    ));

    let weather_provider: Option<Arc<dyn WeatherProvider>> = if config.weather.url.is_empty() {
        None
    } else {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.source.request_timeout_seconds))
            .build()?;
        Some(Arc::new(HttpWeatherProvider::new(
            client,
            config.weather.url.clone(),
        )))
    };
    let weather = Arc::new(WeatherService::new(
        weather_provider,
        Duration::from_secs(config.weather.refresh_interval_seconds),
    ));

    // Renderer comes last so its collaborators already exist; later services
    // attach through its late-bind slots
    let renderer = Arc::new(ContextRenderer::new(
        config.station.clone(),
        store,
        Arc::clone(&weather),
    ));

    let broadcaster = Arc::new(WsBroadcaster::new());
    let cancel = CancellationToken::new();

    let tracker_task = tokio::spawn(Arc::clone(&tracker).run(cancel.clone()));
    let broadcast_task = tokio::spawn(run_broadcast_worker(
        events_rx,
        Arc::clone(&broadcaster),
        cancel.clone(),
    ));
    let weather_task = tokio::spawn(Arc::clone(&weather).run(cancel.clone()));

    let state = AppState {
        config: Arc::clone(&config),
        tracker,
        renderer,
        weather,
        simulation,
        broadcaster,
    };

    let server = tokio::spawn(serve(state, cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    cancel.cancel();

    let _ = tracker_task.await;
    let _ = broadcast_task.await;
    let _ = weather_task.await;
    match server.await {
        Ok(result) => result?,
        Err(e) => warn!("server task aborted: {e}"),
    }

    info!("co-atc stopped");
    Ok(())
}
