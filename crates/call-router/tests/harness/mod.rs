//! Shared harness for integration tests: a real router over the
//! in-memory store and fixture config reader.

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use call_router::config::Config;
use call_router::observability::HealthState;
use call_router::routes::{build_routes, AppState};
use call_router::routing::snapshot::{
    DidRouting, FallbackAction, RingGroupConfig, RingGroupMember, RingStrategy, RoutingTarget,
};
use common::types::{Did, ExtensionId, RingGroupId, TenantId};
use http_body_util::BodyExt;
use router_test_utils::{FixtureConfigReader, MemoryStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::util::ServiceExt;

/// The wired application plus handles to its doubles.
pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub reader: Arc<FixtureConfigReader>,
}

/// Configuration suitable for tests (fast lock timeouts).
pub fn test_config() -> Config {
    let vars = HashMap::from([
        (
            "REDIS_URL".to_string(),
            "redis://localhost:6379".to_string(),
        ),
        (
            "CONTROL_PLANE_URL".to_string(),
            "http://control-plane.test".to_string(),
        ),
        ("CONTROL_PLANE_TOKEN".to_string(), "test-token".to_string()),
        ("LOCK_ACQUIRE_TIMEOUT_MS".to_string(), "250".to_string()),
        ("ROUTER_INSTANCE_ID".to_string(), "router-test".to_string()),
    ]);
    Config::from_vars(&vars).expect("test config should load")
}

/// Build the app over the given fixture reader.
pub fn build_app(reader: FixtureConfigReader) -> TestApp {
    let store = MemoryStore::new();
    let reader = Arc::new(reader);
    let state = Arc::new(AppState::new(
        test_config(),
        Arc::new(store.clone()),
        Arc::clone(&reader) as Arc<dyn call_router::upstream::RoutingConfigReader>,
    ));
    let router = build_routes(state, Arc::new(HealthState::new()));

    TestApp {
        router,
        store,
        reader,
    }
}

/// POST a JSON payload to the webhook endpoint; returns status,
/// content type, and body.
pub async fn post_webhook(router: &Router, payload: &Value) -> (StatusCode, String, String) {
    post_webhook_raw(router, payload.to_string()).await
}

/// POST a raw body to the webhook endpoint.
pub async fn post_webhook_raw(router: &Router, body: String) -> (StatusCode, String, String) {
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/telephony")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("request should build");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("request should execute");

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap_or("").to_string())
        .unwrap_or_default();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();

    (status, content_type, String::from_utf8_lossy(&body).into_owned())
}

/// Wait until the fire-and-forget publisher tasks have drained.
pub async fn drain_publishes(store: &MemoryStore, expected: usize) {
    for _ in 0..100 {
        if store.published().len() >= expected {
            return;
        }
        tokio::task::yield_now().await;
    }
}

/// Canonical scenario: DID `+15551230000` mapped to a sequential ring
/// group `[101 (priority 1), 102 (priority 2)]`, timeout 20s,
/// fallback voicemail.
pub fn sequential_scenario() -> (FixtureConfigReader, TenantId) {
    let tenant_id = TenantId::new();
    let group_id = RingGroupId::new();

    let reader = FixtureConfigReader::new()
        .with_did_routing(DidRouting {
            did: Did::from("+15551230000"),
            tenant_id,
            target: RoutingTarget::RingGroup { group_id },
        })
        .with_ring_group(
            tenant_id,
            RingGroupConfig {
                group_id,
                name: "support".to_string(),
                strategy: RingStrategy::Sequential,
                members: vec![
                    RingGroupMember {
                        extension: ExtensionId::from("101"),
                        priority: 1,
                    },
                    RingGroupMember {
                        extension: ExtensionId::from("102"),
                        priority: 2,
                    },
                ],
                ring_timeout_seconds: Some(20),
                fallback: FallbackAction::Voicemail {
                    mailbox: "vm-support".to_string(),
                },
            },
        );

    (reader, tenant_id)
}

/// Initiating event payload for the scenario DID.
pub fn initiated_payload(call_id: &str, delivery_id: &str) -> Value {
    serde_json::json!({
        "event_type": "call.initiated",
        "call_id": call_id,
        "delivery_id": delivery_id,
        "from": "+15559876543",
        "to": "+15551230000",
    })
}

/// Status event payload.
pub fn status_payload(call_id: &str, delivery_id: &str, status: &str) -> Value {
    serde_json::json!({
        "event_type": "call.status",
        "call_id": call_id,
        "delivery_id": delivery_id,
        "status": status,
    })
}

/// Closing record payload.
pub fn closed_payload(call_id: &str, delivery_id: &str) -> Value {
    serde_json::json!({
        "event_type": "call.closed",
        "call_id": call_id,
        "delivery_id": delivery_id,
        "duration_seconds": 42,
    })
}
