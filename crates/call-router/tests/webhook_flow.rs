//! End-to-end webhook flow tests over the in-memory store and fixture
//! config reader.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod harness;

use axum::http::StatusCode;
use call_router::routing::snapshot::{
    BusinessHoursConfig, DateException, DayHours, DidRouting, FallbackAction, RoutingTarget,
    TimeRange, Weekday,
};
use chrono::{NaiveTime, Utc};
use common::types::{Did, ExtensionId, ScheduleId, TenantId};
use harness::{
    build_app, closed_payload, drain_publishes, initiated_payload, post_webhook,
    post_webhook_raw, sequential_scenario, status_payload,
};
use router_test_utils::FixtureConfigReader;
use std::time::Duration;

#[tokio::test]
async fn test_initiated_rings_first_sequential_member() {
    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    let (status, content_type, body) =
        post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/xml");
    assert!(body.contains("<Dial timeout=\"20\"><Client>101</Client></Dial>"));
    assert!(!body.contains("102"));
}

#[tokio::test]
async fn test_sequential_progression_and_exhaustion() {
    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    // Initiated: rings 101
    let (_, _, body) = post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;
    assert!(body.contains("<Client>101</Client>"));

    // First no-answer: cursor progresses to 102 (same call id)
    let (status, content_type, body) =
        post_webhook(&app.router, &status_payload("CA-1", "dlv-2", "no-answer")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/xml");
    assert!(body.contains("<Client>102</Client>"));
    assert!(!body.contains("<Client>101</Client>"));

    // Second no-answer: members exhausted, group fallback applies
    let (status, _, body) =
        post_webhook(&app.router, &status_payload("CA-1", "dlv-3", "no-answer")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<Redirect method=\"POST\">/voicemail/vm-support</Redirect>"));

    // The call ended; downstream consumers hear about it
    drain_publishes(&app.store, 2).await;
    let published = app.store.published();
    assert!(published
        .iter()
        .any(|(_, payload)| payload.contains("\"event_type\":\"call_ended\"")));
}

#[tokio::test]
async fn test_duplicate_initiated_three_times_is_idempotent() {
    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    let payload = initiated_payload("CA-1", "dlv-1");
    let (s1, _, body1) = post_webhook(&app.router, &payload).await;
    let (s2, _, body2) = post_webhook(&app.router, &payload).await;
    let (s3, _, body3) = post_webhook(&app.router, &payload).await;

    assert_eq!(s1, StatusCode::OK);
    assert_eq!(s2, StatusCode::OK);
    assert_eq!(s3, StatusCode::OK);

    // Byte-identical responses, exactly one routing decision
    assert_eq!(body1, body2);
    assert_eq!(body2, body3);
    assert_eq!(app.reader.did_calls(), 1);
}

#[tokio::test]
async fn test_duplicate_initiated_without_delivery_id_is_idempotent() {
    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    // No delivery id: the fingerprint falls back to the payload hash
    let payload = serde_json::json!({
        "event_type": "call.initiated",
        "call_id": "CA-1",
        "from": "+15559876543",
        "to": "+15551230000",
    });

    let (_, _, body1) = post_webhook(&app.router, &payload).await;
    let (_, _, body2) = post_webhook(&app.router, &payload).await;

    assert_eq!(body1, body2);
    assert_eq!(app.reader.did_calls(), 1);
}

#[tokio::test]
async fn test_closed_exception_date_overrides_open_weekly_schedule() {
    let tenant_id = TenantId::new();
    let schedule_id = ScheduleId::new();

    // Weekly schedule: open all day, every day
    let all_day = vec![TimeRange {
        start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        end: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
    }];
    let weekly = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ]
    .into_iter()
    .map(|weekday| DayHours {
        weekday,
        ranges: all_day.clone(),
    })
    .collect();

    let reader = FixtureConfigReader::new()
        .with_did_routing(DidRouting {
            did: Did::from("+15551230000"),
            tenant_id,
            target: RoutingTarget::BusinessHours {
                schedule_id,
                open: Box::new(RoutingTarget::Extension {
                    extension: ExtensionId::from("101"),
                    timeout_seconds: None,
                    no_answer: FallbackAction::Hangup,
                }),
                closed: Box::new(RoutingTarget::Terminal {
                    fallback: FallbackAction::Voicemail {
                        mailbox: "vm-after-hours".to_string(),
                    },
                }),
            },
        })
        .with_business_hours(
            tenant_id,
            BusinessHoursConfig {
                schedule_id,
                utc_offset_minutes: 0,
                weekly,
                // Exception with no time ranges closes today entirely
                exceptions: vec![DateException {
                    date: Utc::now().date_naive(),
                    ranges: vec![],
                }],
            },
        );
    let app = build_app(reader);

    let (status, _, body) = post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(
        body.contains("/voicemail/vm-after-hours"),
        "closed-hours target should apply despite the open weekly schedule: {body}"
    );
}

#[tokio::test]
async fn test_unknown_did_answers_busy() {
    let app = build_app(FixtureConfigReader::new());

    let (status, content_type, body) =
        post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/xml");
    assert!(body.contains("<Reject reason=\"busy\"/>"));
}

#[tokio::test]
async fn test_malformed_payload_answers_safe_fallback() {
    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    let (status, content_type, body) =
        post_webhook_raw(&app.router, "{not json".to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/xml");
    assert!(body.contains("<Reject reason=\"busy\"/>"));
}

#[tokio::test]
async fn test_full_lifecycle_publishes_events() {
    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;
    post_webhook(&app.router, &status_payload("CA-1", "dlv-2", "ringing")).await;
    post_webhook(&app.router, &status_payload("CA-1", "dlv-3", "answered")).await;
    let (status, _, body) = post_webhook(&app.router, &closed_payload("CA-1", "dlv-4")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty(), "subsequent events answer with an ack");

    drain_publishes(&app.store, 3).await;
    let events: Vec<String> = app
        .store
        .published()
        .iter()
        .map(|(_, payload)| {
            serde_json::from_str::<serde_json::Value>(payload).unwrap()["event_type"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect();

    assert_eq!(events, vec!["call_started", "call_answered", "call_ended"]);
}

#[tokio::test]
async fn test_closing_record_carries_platform_fields_downstream() {
    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;
    post_webhook(&app.router, &closed_payload("CA-1", "dlv-2")).await;

    drain_publishes(&app.store, 2).await;
    let published = app.store.published();
    let ended = published
        .iter()
        .find(|(_, p)| p.contains("call_ended"))
        .expect("call_ended should publish");
    assert!(ended.1.contains("\"duration_seconds\":42"));
}

#[tokio::test]
async fn test_duplicate_status_event_transitions_once() {
    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;
    let (_, _, first) =
        post_webhook(&app.router, &status_payload("CA-1", "dlv-2", "answered")).await;
    let (_, _, second) =
        post_webhook(&app.router, &status_payload("CA-1", "dlv-2", "answered")).await;

    assert_eq!(first, second);

    // Exactly one call_answered despite the duplicate delivery
    drain_publishes(&app.store, 2).await;
    let answered = app
        .store
        .published()
        .iter()
        .filter(|(_, p)| p.contains("call_answered"))
        .count();
    assert_eq!(answered, 1);
}

#[tokio::test]
async fn test_out_of_order_status_after_close_is_absorbed() {
    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;
    post_webhook(&app.router, &closed_payload("CA-1", "dlv-2")).await;

    // A late ringing notification must not fail the webhook or revive
    // the call
    let (status, _, body) =
        post_webhook(&app.router, &status_payload("CA-1", "dlv-3", "ringing")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_transient_store_failure_asks_for_retry() {
    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    app.store.set_op_failures(true);
    let (status, _, _) = post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    // Recovery: the platform's retry succeeds once the store is back
    app.store.set_op_failures(false);
    let (status, _, body) = post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<Client>101</Client>"));
}

#[tokio::test]
async fn test_transient_upstream_failure_asks_for_retry() {
    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    app.reader.set_failures(true);
    let (status, _, _) = post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_contended_lock_asks_for_retry() {
    use common::store::SharedStore;

    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    // Another instance holds the call's lock for longer than our
    // bounded acquisition wait
    app.store
        .set_if_absent("lock:call:CA-1", "router-other:abc", Duration::from_secs(30))
        .await
        .unwrap();

    let (status, _, _) = post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    // Once the holder releases, the retry goes through
    app.store.evict("lock:call:CA-1");
    let (status, _, body) = post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<Client>101</Client>"));
}

#[tokio::test]
async fn test_lost_call_state_degrades_to_first_seen() {
    let (reader, _tenant) = sequential_scenario();
    let app = build_app(reader);

    post_webhook(&app.router, &initiated_payload("CA-1", "dlv-1")).await;

    // Simulate a store restart wiping the call's state mid-flight
    app.store.evict("call:CA-1:state");

    // A duplicate initiating delivery recomputes deterministically:
    // same document as the first time
    let (status, _, body) = post_webhook(&app.router, &initiated_payload("CA-1", "dlv-2")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<Client>101</Client>"));
}

#[tokio::test]
async fn test_publish_failure_never_fails_the_webhook() {
    let (reader, _tenant) = sequential_scenario();
    let store = router_test_utils::MemoryStore::new().with_publish_failures();
    let reader = std::sync::Arc::new(reader);
    let state = std::sync::Arc::new(call_router::routes::AppState::new(
        harness::test_config(),
        std::sync::Arc::new(store.clone()),
        reader as std::sync::Arc<dyn call_router::upstream::RoutingConfigReader>,
    ));
    let router = call_router::routes::build_routes(
        state,
        std::sync::Arc::new(call_router::observability::HealthState::new()),
    );

    let (status, _, body) = post_webhook(&router, &initiated_payload("CA-1", "dlv-1")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<Client>101</Client>"));
    assert!(store.published().is_empty());
}
