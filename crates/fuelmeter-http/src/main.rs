//! Fuel meter WebSocket server.
//!
//! Clients stream geolocation samples over a WebSocket; when a trip finishes
//! they receive its distance and fuel cost, and the trip's endpoints are
//! persisted.
//!
//! # HTTP API Routes
//!
//! ## Tracking
//! `GET /ws`
//!
//! Upgrades to a WebSocket carrying one tracking session.
//!
//! ## List Sessions
//! `GET /`
//!
//! Returns a debug representation of all live sessions.
//!
//! ## Get Session Details
//! `GET /sessions/{id}`
//!
//! Returns the session registered under a trace id.
//!
//! ## Trips
//! `GET /trips/{id}`, `PUT /trips/{id}`, `DELETE /trips/{id}`
//!
//! Reads, replaces the start and end coordinates of, or deletes a stored trip.
//!
//! # Error Responses
//!
//! - `404 Not Found`: Returned when the session or trip does not exist
//! - `500 Internal Server Error`: Returned when the trip store fails
//!
//! # Configuration
//!
//! Read from the environment, see [`fuelmeter_core::Config::from_lookup`].
//! Logging is controlled with `FUELMETER_LOG` (default `info`).

mod routes;
mod ws;

use std::net::SocketAddr;

use anyhow::Context as _;
use fuelmeter_core::Config;
use fuelmeter_tokio::{
    MemoryPointStore, MemoryTripStore, PointBackend, PostgresTripStore, Server, TripBackend,
    spawn_trace_expiry,
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("FUELMETER_LOG")
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env()?;

    let (points, trips) = if let Some(pg) = &config.postgres {
        let store = PostgresTripStore::connect(pg)?;
        store.ensure_schema().await?;
        info!("storing traces and trips in PostgreSQL at {}:{}", pg.host, pg.port);
        (PointBackend::Postgres(store.points()), TripBackend::Postgres(store))
    } else {
        warn!("POSTGRES_HOST not set, traces and trips are kept in memory only");
        (
            PointBackend::Memory(MemoryPointStore::default()),
            TripBackend::Memory(MemoryTripStore::default()),
        )
    };

    spawn_trace_expiry(points.clone(), config.trace_ttl);

    let bind_address = config.bind_address;
    let server = Server::new(config, points, trips.clone());
    server.spawn_status_log();
    let app = routes::router(AppState::new(server, trips.clone()));

    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!("WebSocket server listening on {bind_address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    if let TripBackend::Postgres(store) = &trips {
        store.close();
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("cannot listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
