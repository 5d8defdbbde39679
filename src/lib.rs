pub mod actions;
pub mod adsb;
pub mod aircraft;
pub mod airlines;
pub mod config;
pub mod context;
pub mod db;
pub mod events;
pub mod geometry;
pub mod phases_repo;
pub mod runways;
pub mod schema;
pub mod sensors;
pub mod simulation;
pub mod socket;
pub mod sources;
pub mod targets_repo;
pub mod tracker;
pub mod weather;
pub mod web;

pub use adsb::Target;
pub use aircraft::{Aircraft, Phase, PhaseChange, PhaseEvent};
pub use config::Config;
