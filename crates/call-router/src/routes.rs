//! HTTP routes for the call router.
//!
//! Defines the Axum router and application state.

use crate::call_state::CallStateStore;
use crate::config::Config;
use crate::handlers;
use crate::idempotency::IdempotencyGuard;
use crate::lock::CallLockManager;
use crate::observability::{health_router, HealthState};
use crate::publisher::EventPublisher;
use crate::routing::RoutingEngine;
use crate::upstream::RoutingConfigReader;
use axum::{routing::post, Router};
use common::store::SharedStore;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request deadline; past it the platform's own timeout has elapsed
/// anyway, and it will retry.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Routing config reader (control plane).
    pub reader: Arc<dyn RoutingConfigReader>,

    /// Routing decision engine.
    pub engine: RoutingEngine,

    /// Webhook delivery dedup.
    pub idempotency: IdempotencyGuard,

    /// Per-call mutual exclusion.
    pub locks: CallLockManager,

    /// Call state access.
    pub call_states: CallStateStore,

    /// Lifecycle event fan-out.
    pub publisher: EventPublisher,
}

impl AppState {
    /// Wire the execution-plane components over a shared store and a
    /// config reader.
    #[must_use]
    pub fn new(
        config: Config,
        store: Arc<dyn SharedStore>,
        reader: Arc<dyn RoutingConfigReader>,
    ) -> Self {
        let idempotency = IdempotencyGuard::new(
            Arc::clone(&store),
            Duration::from_secs(config.idempotency_ttl_seconds),
        );
        let locks = CallLockManager::new(
            Arc::clone(&store),
            Duration::from_millis(config.lock_ttl_ms),
            Duration::from_millis(config.lock_acquire_timeout_ms),
            config.instance_id.clone(),
        );
        let call_states = CallStateStore::new(
            Arc::clone(&store),
            Duration::from_secs(config.call_state_ttl_seconds),
            Duration::from_secs(config.call_state_grace_seconds),
        );
        let publisher = EventPublisher::new(
            store,
            config.call_events_channel.clone(),
            Duration::from_millis(config.publish_timeout_ms),
        );
        let engine = RoutingEngine::new(config.default_ring_timeout_seconds);

        Self {
            config,
            reader,
            engine,
            idempotency,
            locks,
            call_states,
            publisher,
        }
    }
}

/// Build the application routes.
///
/// - `POST /webhooks/telephony` - platform webhook
/// - `GET /health`, `GET /ready` - probes
/// - `TraceLayer` for request logging, bounded request timeout
pub fn build_routes(state: Arc<AppState>, health_state: Arc<HealthState>) -> Router {
    let webhook_routes = Router::new()
        .route("/webhooks/telephony", post(handlers::handle_webhook))
        .with_state(state);

    webhook_routes
        .merge(health_router(health_state))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(WEBHOOK_TIMEOUT))
}
