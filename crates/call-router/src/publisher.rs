//! Lifecycle event publisher.
//!
//! Emits normalized call lifecycle events for downstream consumers
//! (presence UI, durable log writer). Best-effort and fire-and-forget:
//! the send happens off the webhook path under a short bounded
//! timeout, and a failure is logged, never retried synchronously, and
//! never fails the webhook response. Publishing happens explicitly at
//! state-machine transition points, not through persistence hooks.

use chrono::{DateTime, Utc};
use common::store::SharedStore;
use common::types::{CallId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Normalized lifecycle event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventType {
    CallStarted,
    CallAnswered,
    CallEnded,
}

/// Record published to downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub call_id: CallId,
    pub tenant_id: TenantId,
    pub event_type: LifecycleEventType,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

/// Publishes lifecycle events to the shared store's broadcast
/// channel.
#[derive(Clone)]
pub struct EventPublisher {
    store: Arc<dyn SharedStore>,
    channel: String,
    send_timeout: Duration,
}

impl EventPublisher {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>, channel: String, send_timeout: Duration) -> Self {
        Self {
            store,
            channel,
            send_timeout,
        }
    }

    /// Publish an event. Returns immediately; the bounded send runs
    /// in a background task.
    pub fn publish(&self, event: LifecycleEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!(
                    target: "router.publisher",
                    error = %e,
                    call_id = %event.call_id,
                    "Failed to serialize lifecycle event; dropping"
                );
                return;
            }
        };

        let store = Arc::clone(&self.store);
        let channel = self.channel.clone();
        let send_timeout = self.send_timeout;
        let call_id = event.call_id.clone();

        tokio::spawn(async move {
            match tokio::time::timeout(send_timeout, store.publish(&channel, &json)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        target: "router.publisher",
                        error = %e,
                        call_id = %call_id,
                        "Failed to publish lifecycle event"
                    );
                    metrics::counter!("router_publish_failures_total").increment(1);
                }
                Err(_) => {
                    warn!(
                        target: "router.publisher",
                        call_id = %call_id,
                        timeout_ms = send_timeout.as_millis() as u64,
                        "Lifecycle event publish timed out"
                    );
                    metrics::counter!("router_publish_failures_total").increment(1);
                }
            }
        });
    }
}
