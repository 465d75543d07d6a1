//! Call Router
//!
//! Webhook-driven call routing service for the Switchyard PBX.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Connect to the shared store (Redis)
//! 3. Build the control-plane config reader (with TTL cache)
//! 4. Wire the execution-plane components into `AppState`
//! 5. Bind and serve the webhook + health router
//! 6. Wait for shutdown signal; drain gracefully

#![warn(clippy::pedantic)]

use std::sync::Arc;

use call_router::config::Config;
use call_router::observability::HealthState;
use call_router::routes::{build_routes, AppState};
use call_router::store::RedisStore;
use call_router::upstream::{CachedConfigReader, HttpConfigReader};
use common::secret::ExposeSecret;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_router=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Call Router");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        control_plane_url = %config.control_plane_url,
        idempotency_ttl_seconds = config.idempotency_ttl_seconds,
        lock_ttl_ms = config.lock_ttl_ms,
        lock_acquire_timeout_ms = config.lock_acquire_timeout_ms,
        "Configuration loaded successfully"
    );

    // Connect to the shared store
    info!("Connecting to Redis...");
    let store = RedisStore::connect(config.redis_url.expose_secret())
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect to Redis");
            e
        })?;
    let store = Arc::new(store);
    info!("Redis connection established");

    // Control-plane reader with bounded-staleness cache
    let reader = HttpConfigReader::new(
        config.control_plane_url.clone(),
        config.control_plane_token.clone(),
    )
    .map_err(|e| {
        error!(error = %e, "Failed to build control-plane reader");
        e
    })?;
    let reader = Arc::new(CachedConfigReader::new(
        reader,
        Duration::from_secs(config.snapshot_cache_ttl_seconds),
    ));

    let health_state = Arc::new(HealthState::new());
    let bind_address = config.bind_address.clone();

    let state = Arc::new(AppState::new(config, store, reader));
    let app = build_routes(state, Arc::clone(&health_state));

    // Bind before marking ready to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %bind_address, "Failed to bind server");
            format!("Failed to bind server to {bind_address}: {e}")
        })?;
    info!(addr = %bind_address, "Server bound successfully");

    health_state.set_ready();
    info!("Call Router running - press Ctrl+C to shutdown");

    let shutdown_health = Arc::clone(&health_state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Stop advertising readiness so webhook traffic drains
            // before in-flight requests finish.
            shutdown_health.set_not_ready();
            info!("Shutdown signal received, draining...");
        })
        .await?;

    info!("Call Router shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable
/// because without signal handlers the service cannot shut down
/// gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
