// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Runhub API Server
//!
//! Serves run synchronization, race-room rendezvous, and live ranking
//! feeds for runhub clients.

use runhub::{
    config::Config,
    db::RunDb,
    services::{ChangeHub, EventCatalog, RankingService, RoomCoordinator},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Runhub API");

    // Initialize the authoritative run store
    let db = RunDb::new();

    // Load event courses, if configured
    if let Some(path) = &config.courses_path {
        tracing::info!(path, "Loading event courses");
        let catalog = EventCatalog::load_from_file(path).expect("Failed to load event courses");
        tracing::info!(count = catalog.events().len(), "Event courses loaded");
        catalog.seed(&db).await.expect("Failed to seed event courses");
    }

    // Change hub shared by room broadcasts and ranking feeds
    let hub = ChangeHub::new();

    let rooms = RoomCoordinator::new(config.room_capacity, config.room_countdown_ms, hub.clone());
    let ranking = RankingService::new(db.clone(), hub.clone());

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        rooms,
        ranking,
        hub,
    });

    // Build router
    let app = runhub::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("runhub=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
