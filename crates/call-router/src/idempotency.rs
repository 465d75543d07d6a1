//! Idempotency guard for webhook deliveries.
//!
//! The telephony platform redelivers webhooks on any slow or failed
//! response, so every delivery is fingerprinted and checked against a
//! bounded-retention dedup cache before any work happens. A duplicate
//! with a cached response is answered byte-identically without
//! touching the lock, the state machine, or the decision engine.
//!
//! The cache is never a source of truth: a record expiring before a
//! late retry is safe because state transitions are independently
//! idempotent and routing decisions are deterministic.
//!
//! # Key Pattern
//!
//! `idem:{fingerprint}` - JSON [`IdempotencyRecord`]

use crate::errors::RouterError;
use crate::event::CallEvent;
use common::store::SharedStore;
use ring::digest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Stable identity of a logical webhook event, used to detect
/// duplicate deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the fingerprint for a normalized event.
///
/// The platform delivery id is used when present (stable across
/// redeliveries of the same logical event). Otherwise the fingerprint
/// is a SHA-256 over the routing-relevant identity fields. Both forms
/// are namespaced by event kind so distinct event kinds for the same
/// call can never collide.
#[must_use]
pub fn fingerprint(event: &CallEvent) -> Fingerprint {
    let kind = event.kind.fingerprint_name();

    if let Some(delivery_id) = &event.delivery_id {
        return Fingerprint(format!("{kind}:delivery:{delivery_id}"));
    }

    let identity = format!(
        "{kind}|{}|{}|{}",
        event.call_id,
        event.from.as_deref().unwrap_or(""),
        event.did.as_ref().map_or("", |d| d.as_str()),
    );
    let hash = digest::digest(&digest::SHA256, identity.as_bytes());
    Fingerprint(format!("{kind}:{}", hex::encode(hash.as_ref())))
}

/// Response document cached for duplicate deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Content type of the original response.
    pub content_type: String,
    /// Body of the original response, replayed verbatim.
    pub body: String,
}

/// Stored dedup record: the previously-produced response, or the
/// applied-with-no-response sentinel (`response: None`).
#[derive(Debug, Serialize, Deserialize)]
struct IdempotencyRecord {
    response: Option<CachedResponse>,
}

/// Result of an idempotency check.
#[derive(Debug, PartialEq, Eq)]
pub enum IdempotencyStatus {
    /// First time this fingerprint is seen; proceed to locking.
    New,
    /// Duplicate delivery; replay the stored response verbatim.
    ReplayResponse(CachedResponse),
    /// Duplicate delivery of an event that was applied without a
    /// replayable response; acknowledge without reprocessing.
    AlreadyApplied,
}

/// Deduplicates webhook deliveries against the shared store.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn SharedStore>,
    ttl: Duration,
}

impl IdempotencyGuard {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(fingerprint: &Fingerprint) -> String {
        format!("idem:{fingerprint}")
    }

    /// Check whether this fingerprint has been processed within the
    /// retention window.
    ///
    /// # Errors
    ///
    /// Returns a transient error when the store is unavailable.
    #[instrument(skip_all, fields(fingerprint = %fp))]
    pub async fn check(&self, fp: &Fingerprint) -> Result<IdempotencyStatus, RouterError> {
        let raw = self.store.get(&Self::key(fp)).await?;

        let Some(raw) = raw else {
            return Ok(IdempotencyStatus::New);
        };

        match serde_json::from_str::<IdempotencyRecord>(&raw) {
            Ok(IdempotencyRecord {
                response: Some(response),
            }) => {
                debug!(
                    target: "router.idempotency",
                    fingerprint = %fp,
                    "Duplicate delivery, replaying cached response"
                );
                Ok(IdempotencyStatus::ReplayResponse(response))
            }
            Ok(IdempotencyRecord { response: None }) => {
                debug!(
                    target: "router.idempotency",
                    fingerprint = %fp,
                    "Duplicate delivery, already applied"
                );
                Ok(IdempotencyStatus::AlreadyApplied)
            }
            Err(e) => {
                // A corrupt record is discarded; reprocessing is safe.
                warn!(
                    target: "router.idempotency",
                    error = %e,
                    fingerprint = %fp,
                    "Discarding unreadable idempotency record"
                );
                Ok(IdempotencyStatus::New)
            }
        }
    }

    /// Record the outcome of processing this fingerprint.
    ///
    /// `response` is `None` for events acknowledged without a
    /// replayable document.
    ///
    /// # Errors
    ///
    /// Returns a transient error when the store is unavailable.
    #[instrument(skip_all, fields(fingerprint = %fp))]
    pub async fn commit(
        &self,
        fp: &Fingerprint,
        response: Option<&CachedResponse>,
    ) -> Result<(), RouterError> {
        let record = IdempotencyRecord {
            response: response.cloned(),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| RouterError::Serialization(format!("idempotency record: {e}")))?;

        self.store
            .set_with_ttl(&Self::key(fp), &json, self.ttl)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::event::WebhookPayload;
    use chrono::Utc;

    fn event_from(json: &str) -> CallEvent {
        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        CallEvent::from_payload(payload, Utc::now()).unwrap()
    }

    #[test]
    fn test_fingerprint_uses_delivery_id_when_present() {
        let event = event_from(
            r#"{
                "event_type": "call.initiated",
                "call_id": "CA-100",
                "delivery_id": "dlv-42",
                "from": "+15559876543",
                "to": "+15551230000"
            }"#,
        );

        assert_eq!(fingerprint(&event).as_str(), "initiated:delivery:dlv-42");
    }

    #[test]
    fn test_fingerprint_is_stable_without_delivery_id() {
        let json = r#"{
            "event_type": "call.initiated",
            "call_id": "CA-100",
            "from": "+15559876543",
            "to": "+15551230000"
        }"#;

        let a = fingerprint(&event_from(json));
        let b = fingerprint(&event_from(json));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_is_namespaced_by_event_kind() {
        // The same call with no delivery id must produce distinct
        // fingerprints for distinct event kinds.
        let status = event_from(
            r#"{"event_type": "call.status", "call_id": "CA-100", "status": "ringing"}"#,
        );
        let closed = event_from(r#"{"event_type": "call.closed", "call_id": "CA-100"}"#);

        let fp_status = fingerprint(&status);
        let fp_closed = fingerprint(&closed);

        assert_ne!(fp_status, fp_closed);
        assert!(fp_status.as_str().starts_with("status-ringing:"));
        assert!(fp_closed.as_str().starts_with("record-closed:"));
    }

    #[test]
    fn test_distinct_statuses_produce_distinct_fingerprints() {
        let ringing = event_from(
            r#"{"event_type": "call.status", "call_id": "CA-100", "status": "ringing"}"#,
        );
        let answered = event_from(
            r#"{"event_type": "call.status", "call_id": "CA-100", "status": "answered"}"#,
        );

        assert_ne!(fingerprint(&ringing), fingerprint(&answered));
    }

    #[test]
    fn test_record_round_trip() {
        let record = IdempotencyRecord {
            response: Some(CachedResponse {
                content_type: "application/xml".to_string(),
                body: "<Response/>".to_string(),
            }),
        };

        let json = serde_json::to_string(&record).unwrap();
        let parsed: IdempotencyRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(
            parsed.response.unwrap().body,
            "<Response/>".to_string()
        );
    }

    #[test]
    fn test_sentinel_record_round_trip() {
        let record = IdempotencyRecord { response: None };

        let json = serde_json::to_string(&record).unwrap();
        let parsed: IdempotencyRecord = serde_json::from_str(&json).unwrap();

        assert!(parsed.response.is_none());
    }
}
