//! Telephony webhook handler.
//!
//! Implements the execution plane's control flow for
//! `POST /webhooks/telephony`:
//!
//! normalize -> idempotency check -> per-call lock -> state machine ->
//! routing decision (initiating event only) -> response document ->
//! lifecycle publish -> idempotency commit -> release.
//!
//! # Responses
//!
//! - Initiating event: `200` with a CXML routing document
//! - Subsequent events: `200` empty acknowledgement
//! - Transient failure (lock contention, store/upstream timeout):
//!   `503` so the platform retries
//! - Malformed payload / unknown DID: deterministic fallback document,
//!   warn-logged; the call terminates safely instead of failing
//!   silently

use crate::call_state::CallState;
use crate::cxml;
use crate::errors::{ErrorClass, RouterError};
use crate::event::{CallEvent, CallEventKind, CallStatus, WebhookPayload};
use crate::idempotency::{fingerprint, CachedResponse, IdempotencyStatus};
use crate::observability::metrics;
use crate::publisher::{LifecycleEvent, LifecycleEventType};
use crate::routing::engine::{next_ring_attempt, NextAttempt};
use crate::routing::{FallbackAction, RoutingOutcome};
use crate::routes::AppState;
use crate::state_machine::{self, CallPhase, Transition};
use crate::upstream;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// The webhook answer: a content type and body, replayed verbatim for
/// duplicate deliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookReply {
    content_type: String,
    body: String,
}

impl WebhookReply {
    /// Empty acknowledgement for non-initiating events.
    #[must_use]
    pub fn ack() -> Self {
        Self {
            content_type: "text/plain".to_string(),
            body: String::new(),
        }
    }

    /// A CXML routing document.
    #[must_use]
    pub fn cxml(body: String) -> Self {
        Self {
            content_type: cxml::CONTENT_TYPE.to_string(),
            body,
        }
    }

    #[must_use]
    pub fn from_cached(cached: CachedResponse) -> Self {
        Self {
            content_type: cached.content_type,
            body: cached.body,
        }
    }

    /// The cacheable form of this reply; acknowledgements cache as
    /// the applied-no-response sentinel.
    #[must_use]
    pub fn as_cached(&self) -> Option<CachedResponse> {
        if self.content_type == cxml::CONTENT_TYPE {
            Some(CachedResponse {
                content_type: self.content_type.clone(),
                body: self.body.clone(),
            })
        } else {
            None
        }
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}

impl IntoResponse for WebhookReply {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

/// Deterministic safe answer for input the router cannot route.
fn fallback_reply() -> WebhookReply {
    let outcome = RoutingOutcome::Fallback {
        action: FallbackAction::Busy,
    };
    match cxml::render(&outcome, 0) {
        Ok(body) => WebhookReply::cxml(body),
        // Unreachable: a fallback outcome always renders.
        Err(_) => WebhookReply::ack(),
    }
}

/// Handler for POST /webhooks/telephony.
#[instrument(
    skip_all,
    name = "router.webhook",
    fields(
        method = "POST",
        endpoint = "/webhooks/telephony",
    )
)]
pub async fn handle_webhook(State(app): State<Arc<AppState>>, body: Bytes) -> Response {
    let received_at = Utc::now();

    // Deserialize manually so a malformed body degrades to a safe
    // terminal routing instead of a framework 422.
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(
                target: "router.handlers.webhook",
                error = %e,
                "Unparseable webhook payload; answering safe fallback"
            );
            metrics::record_webhook_event("unparseable", "invalid");
            return fallback_reply().into_response();
        }
    };

    let event = match CallEvent::from_payload(payload, received_at) {
        Ok(event) => event,
        Err(e) => {
            warn!(
                target: "router.handlers.webhook",
                error = %e,
                "Webhook payload failed validation; answering safe fallback"
            );
            metrics::record_webhook_event("invalid", "invalid");
            return fallback_reply().into_response();
        }
    };

    let kind = event.kind.fingerprint_name();
    let call_id = event.call_id.clone();

    match process_event(&app, event).await {
        Ok(reply) => reply.into_response(),
        Err(err) => match err.class() {
            ErrorClass::Transient => {
                warn!(
                    target: "router.handlers.webhook",
                    call_id = %call_id,
                    error = %err,
                    "Transient failure; asking the platform to retry"
                );
                metrics::record_webhook_event(&kind, "transient_error");
                err.into_response()
            }
            ErrorClass::InvalidInput => {
                warn!(
                    target: "router.handlers.webhook",
                    call_id = %call_id,
                    error = %err,
                    "Invalid input; answering safe fallback"
                );
                metrics::record_webhook_event(&kind, "invalid");
                fallback_reply().into_response()
            }
            ErrorClass::IllegalTransition => {
                warn!(
                    target: "router.handlers.webhook",
                    call_id = %call_id,
                    error = %err,
                    "Illegal transition escaped the handler; acknowledging"
                );
                metrics::record_webhook_event(&kind, "rejected");
                WebhookReply::ack().into_response()
            }
            ErrorClass::Fatal => {
                error!(
                    target: "router.handlers.webhook",
                    call_id = %call_id,
                    error = %err,
                    "Fatal error processing webhook"
                );
                metrics::record_webhook_event(&kind, "fatal_error");
                err.into_response()
            }
        },
    }
}

/// Idempotency check, locked processing, idempotency commit.
async fn process_event(app: &AppState, event: CallEvent) -> Result<WebhookReply, RouterError> {
    let fp = fingerprint(&event);
    let kind = event.kind.fingerprint_name();

    match app.idempotency.check(&fp).await? {
        IdempotencyStatus::ReplayResponse(cached) => {
            metrics::record_webhook_event(&kind, "replayed");
            return Ok(WebhookReply::from_cached(cached));
        }
        IdempotencyStatus::AlreadyApplied => {
            metrics::record_webhook_event(&kind, "replayed");
            return Ok(WebhookReply::ack());
        }
        IdempotencyStatus::New => {}
    }

    let call_id = event.call_id.clone();
    let reply = app
        .locks
        .with_lock(&call_id, || async { handle_locked(app, &event).await })
        .await?;

    // Best-effort: the dedup cache is a convenience, never a source
    // of truth; a failed commit means a duplicate reprocesses through
    // the idempotent state machine.
    if let Err(e) = app.idempotency.commit(&fp, reply.as_cached().as_ref()).await {
        warn!(
            target: "router.handlers.webhook",
            error = %e,
            fingerprint = %fp,
            "Failed to commit idempotency record"
        );
    }

    metrics::record_webhook_event(&kind, "processed");
    Ok(reply)
}

/// Dispatch one event while holding the call's lock.
async fn handle_locked(app: &AppState, event: &CallEvent) -> Result<WebhookReply, RouterError> {
    let existing = app.call_states.load(&event.call_id).await?;

    match event.kind {
        CallEventKind::Initiated => handle_initiated(app, event, existing).await,
        CallEventKind::StatusChanged(status) => {
            handle_status(app, event, status, existing).await
        }
        CallEventKind::RecordClosed => handle_closed(app, event, existing).await,
    }
}

/// The initiating event: decide the routing once, persist it, answer
/// with its document.
async fn handle_initiated(
    app: &AppState,
    event: &CallEvent,
    existing: Option<CallState>,
) -> Result<WebhookReply, RouterError> {
    if let Some(state) = existing {
        if state.phase.is_terminal() {
            warn!(
                target: "router.handlers.webhook",
                call_id = %event.call_id,
                phase = %state.phase,
                "Initiating event on a closed call; answering safe fallback"
            );
            return Ok(fallback_reply());
        }
        // Duplicate initiating delivery past the idempotency window:
        // the outcome chosen at initiation is immutable, replay it.
        debug!(
            target: "router.handlers.webhook",
            call_id = %event.call_id,
            "Replaying routing outcome for duplicate initiating event"
        );
        let body = cxml::render(&state.outcome, state.ring_cursor)?;
        return Ok(WebhookReply::cxml(body));
    }

    let Some(did) = event.did.clone() else {
        return Err(RouterError::InvalidEvent(
            "initiating event without a DID".to_string(),
        ));
    };

    let snapshot = upstream::load_snapshot(app.reader.as_ref(), &did).await?;
    let outcome = app.engine.decide(&did, &snapshot, event.received_at);
    metrics::record_decision(match &outcome {
        RoutingOutcome::DirectExtension { .. } => "direct_extension",
        RoutingOutcome::RingGroup { .. } => "ring_group",
        RoutingOutcome::Fallback { .. } => "fallback",
    });

    let Some(routing) = snapshot.did_routing else {
        // Unknown DID: terminal routing, no call state to track.
        let body = cxml::render(&outcome, 0)?;
        return Ok(WebhookReply::cxml(body));
    };

    let state = CallState::new(
        event.call_id.clone(),
        routing.tenant_id,
        did,
        outcome,
        event.received_at,
    );
    app.call_states.save(&state).await?;

    info!(
        target: "router.handlers.webhook",
        call_id = %state.call_id,
        tenant_id = %state.tenant_id,
        did = %state.did,
        "Call initiated and routed"
    );

    app.publisher.publish(LifecycleEvent {
        call_id: state.call_id.clone(),
        tenant_id: state.tenant_id,
        event_type: LifecycleEventType::CallStarted,
        timestamp: event.received_at,
        payload: json!({
            "from": event.from,
            "did": state.did,
        }),
    });

    let body = cxml::render(&state.outcome, state.ring_cursor)?;
    Ok(WebhookReply::cxml(body))
}

/// A status notification: ring-group progression first, then the
/// transition table.
async fn handle_status(
    app: &AppState,
    event: &CallEvent,
    status: CallStatus,
    existing: Option<CallState>,
) -> Result<WebhookReply, RouterError> {
    // An unanswered attempt on a sequential or round-robin group
    // advances the cursor instead of terminating the call.
    if status == CallStatus::NoAnswer {
        if let Some(state) = &existing {
            if !state.phase.is_terminal() {
                if let NextAttempt::Advance(cursor) =
                    next_ring_attempt(&state.outcome, state.ring_cursor)
                {
                    let mut state = state.clone();
                    state.ring_cursor = cursor;
                    app.call_states.save(&state).await?;

                    info!(
                        target: "router.handlers.webhook",
                        call_id = %state.call_id,
                        ring_cursor = cursor,
                        "Ring group advancing to next member"
                    );

                    let body = cxml::render(&state.outcome, cursor)?;
                    return Ok(WebhookReply::cxml(body));
                }
            }
        }
    }

    match state_machine::apply(existing.as_ref().map(|s| s.phase), &event.kind) {
        Transition::Enter(next) => {
            let Some(mut state) = existing else {
                return rebuild_lost_state(app, event, next).await;
            };

            let was_terminal = state.phase.is_terminal();
            state.enter_phase(next, event.received_at);
            app.call_states.save(&state).await?;

            if next == CallPhase::Answered {
                app.publisher.publish(LifecycleEvent {
                    call_id: state.call_id.clone(),
                    tenant_id: state.tenant_id,
                    event_type: LifecycleEventType::CallAnswered,
                    timestamp: event.received_at,
                    payload: json!({"did": state.did}),
                });
            } else if next.is_terminal() && !was_terminal {
                app.publisher.publish(LifecycleEvent {
                    call_id: state.call_id.clone(),
                    tenant_id: state.tenant_id,
                    event_type: LifecycleEventType::CallEnded,
                    timestamp: event.received_at,
                    payload: json!({"phase": state.phase, "did": state.did}),
                });
            }

            // A fully exhausted ring answers with the outcome's
            // configured fallback document.
            if next == CallPhase::NoAnswer {
                let fallback = RoutingOutcome::Fallback {
                    action: state.outcome.fallback_action(),
                };
                let body = cxml::render(&fallback, 0)?;
                return Ok(WebhookReply::cxml(body));
            }

            Ok(WebhookReply::ack())
        }
        Transition::NoOp(phase) => {
            debug!(
                target: "router.handlers.webhook",
                call_id = %event.call_id,
                phase = %phase,
                "Duplicate or out-of-order status event; no-op"
            );
            Ok(WebhookReply::ack())
        }
        Transition::Rejected(reason) => {
            warn!(
                target: "router.handlers.webhook",
                call_id = %event.call_id,
                reason = reason,
                "State machine rejected status event; acknowledging"
            );
            metrics::record_webhook_event(&event.kind.fingerprint_name(), "rejected");
            Ok(WebhookReply::ack())
        }
    }
}

/// The closing record: any live phase completes; the entry drops
/// after the grace period.
async fn handle_closed(
    app: &AppState,
    event: &CallEvent,
    existing: Option<CallState>,
) -> Result<WebhookReply, RouterError> {
    match state_machine::apply(existing.as_ref().map(|s| s.phase), &event.kind) {
        Transition::Enter(next) => {
            let Some(mut state) = existing else {
                debug!(
                    target: "router.handlers.webhook",
                    call_id = %event.call_id,
                    "Closing record for a call with no state; acknowledging"
                );
                return Ok(WebhookReply::ack());
            };

            let was_terminal = state.phase.is_terminal();
            state.enter_phase(next, event.received_at);
            app.call_states.save(&state).await?;

            if !was_terminal {
                app.publisher.publish(LifecycleEvent {
                    call_id: state.call_id.clone(),
                    tenant_id: state.tenant_id,
                    event_type: LifecycleEventType::CallEnded,
                    timestamp: event.received_at,
                    // The record's extra fields (duration, hangup
                    // cause) ride along for the durable log writer.
                    payload: serde_json::Value::Object(event.extra.clone()),
                });
            }

            Ok(WebhookReply::ack())
        }
        Transition::NoOp(_) => Ok(WebhookReply::ack()),
        Transition::Rejected(reason) => {
            warn!(
                target: "router.handlers.webhook",
                call_id = %event.call_id,
                reason = reason,
                "State machine rejected closing record; acknowledging"
            );
            Ok(WebhookReply::ack())
        }
    }
}

/// Call state was lost (store restart) but the call is live: rebuild
/// it deterministically from the routing config.
///
/// A sequential ring cursor restarts from the first member here; an
/// accepted, documented limitation of the rebuildable store.
async fn rebuild_lost_state(
    app: &AppState,
    event: &CallEvent,
    phase: CallPhase,
) -> Result<WebhookReply, RouterError> {
    let Some(did) = event.did.clone() else {
        warn!(
            target: "router.handlers.webhook",
            call_id = %event.call_id,
            "Mid-call event for an unknown call without a DID; acknowledging"
        );
        return Ok(WebhookReply::ack());
    };

    let snapshot = upstream::load_snapshot(app.reader.as_ref(), &did).await?;
    let Some(routing) = snapshot.did_routing.clone() else {
        warn!(
            target: "router.handlers.webhook",
            call_id = %event.call_id,
            did = %did,
            "Mid-call event for an unknown DID; acknowledging"
        );
        return Ok(WebhookReply::ack());
    };

    let outcome = app.engine.decide(&did, &snapshot, event.received_at);
    let mut state = CallState::new(
        event.call_id.clone(),
        routing.tenant_id,
        did,
        outcome,
        event.received_at,
    );
    if phase != CallPhase::Initiated {
        state.enter_phase(phase, event.received_at);
    }
    app.call_states.save(&state).await?;

    info!(
        target: "router.handlers.webhook",
        call_id = %state.call_id,
        phase = %phase,
        "Rebuilt lost call state from routing config"
    );

    if phase.is_terminal() {
        app.publisher.publish(LifecycleEvent {
            call_id: state.call_id.clone(),
            tenant_id: state.tenant_id,
            event_type: LifecycleEventType::CallEnded,
            timestamp: event.received_at,
            payload: json!({"phase": state.phase, "did": state.did}),
        });
    }

    Ok(WebhookReply::ack())
}
