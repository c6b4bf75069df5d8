#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the risk map.
//!
//! Serves risk scores for H3 grid cells around a point, per-cell factor
//! breakdowns, police station lookups, and an address search proxy. Grid
//! and feature data live in `PostGIS`. The risk model is calibrated against
//! the whole grid on startup.

pub mod config;
pub mod error;
mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use risk_map_database::{PgStore, db, run_migrations};
use risk_map_geocoder::{NominatimClient, NominatimService};
use risk_map_risk::{ModelConfig, RiskEngine};
use risk_map_spatial::SpatialStore;

use crate::config::{RegionBounds, ServerConfig};

/// Shared application state.
pub struct AppState {
    /// Scoring engine with its feature store.
    pub engine: RiskEngine,
    /// Grid and station lookups.
    pub spatial: Arc<dyn SpatialStore>,
    /// Address search proxy.
    pub geocoder: NominatimClient,
    /// Area risk-zone searches are limited to.
    pub region: RegionBounds,
}

/// Registers every route. Shared by [`run_server`] and the handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::root))
        .route("/docs", web::get().to(handlers::docs))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(handlers::health))
                .route("/risk-zones", web::get().to(handlers::risk_zones))
                .route(
                    "/risk-factors/{cell_id}",
                    web::get().to(handlers::risk_factors),
                )
                .route("/risk-at-point", web::get().to(handlers::risk_at_point))
                .route("/police-stations", web::get().to(handlers::police_stations))
                .route("/geocode", web::get().to(handlers::geocode)),
        );
}

fn cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        return Cors::permissive();
    }
    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
}

/// Starts the risk map API server.
///
/// Connects to the `PostGIS` database, runs migrations, loads the risk
/// model, calibrates it, and starts the Actix-Web HTTP server. This is a
/// regular async function; the caller provides the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// A failed calibration is logged and retried on the first scoring request.
///
/// # Errors
///
/// Returns an `std::io::Error` if the database is unreachable, migrations
/// fail, the risk model or geocoder cannot be loaded, or the HTTP server
/// fails to bind.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::from_env();

    log::info!("Connecting to database...");
    let db_conn = db::connect_from_env()
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to connect to database: {e}")))?;

    log::info!("Running migrations...");
    run_migrations(db_conn.as_ref())
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to run migrations: {e}")))?;

    let store = PgStore::new(Arc::from(db_conn));

    let model = ModelConfig::from_env().map_err(std::io::Error::other)?;
    log::info!("Using risk model {}", model.version);
    let engine = RiskEngine::new(model, Arc::new(store.clone()));

    if let Err(e) = engine.warm_up().await {
        log::warn!("Risk model calibration failed, will retry on first request: {e}");
    }

    let geocoder =
        NominatimClient::new(NominatimService::from_env()).map_err(std::io::Error::other)?;

    let state = web::Data::new(AppState {
        engine,
        spatial: Arc::new(store),
        geocoder,
        region: config.region,
    });

    let ServerConfig {
        bind_addr,
        port,
        cors_origins,
        ..
    } = config;

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        App::new()
            .wrap(cors(&cors_origins))
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
