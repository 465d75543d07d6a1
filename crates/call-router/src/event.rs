//! Webhook event normalization.
//!
//! The webhook boundary validates raw platform payloads here and hands
//! the core a normalized [`CallEvent`]. No component downstream of
//! this module ever sees a transport payload.

use crate::errors::RouterError;
use chrono::{DateTime, Utc};
use common::types::{CallId, Did};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Raw webhook payload as delivered by the telephony platform.
///
/// Field names follow the platform's wire format; unrecognized fields
/// are retained in `extra` because some of them feed the published
/// lifecycle events.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    /// Platform event type, e.g. `call.initiated`.
    pub event_type: String,

    /// Platform call identifier.
    pub call_id: String,

    /// Platform delivery identifier, stable across redeliveries of
    /// the same logical event.
    #[serde(default)]
    pub delivery_id: Option<String>,

    /// Caller number.
    #[serde(default)]
    pub from: Option<String>,

    /// Called number (DID).
    #[serde(default)]
    pub to: Option<String>,

    /// Call status, present on `call.status` events.
    #[serde(default)]
    pub status: Option<String>,

    /// Everything else the platform sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Call status carried by a `call.status` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Ringing,
    Answered,
    NoAnswer,
    Busy,
    Failed,
}

impl CallStatus {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Answered => "answered",
            CallStatus::NoAnswer => "no-answer",
            CallStatus::Busy => "busy",
            CallStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "ringing" => Some(CallStatus::Ringing),
            "answered" | "in-progress" => Some(CallStatus::Answered),
            "no-answer" => Some(CallStatus::NoAnswer),
            "busy" => Some(CallStatus::Busy),
            "failed" => Some(CallStatus::Failed),
            _ => None,
        }
    }
}

/// Kind of a normalized call event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEventKind {
    /// The initiating event; the only one that produces a routing
    /// decision.
    Initiated,
    /// A mid-call status notification.
    StatusChanged(CallStatus),
    /// The closing record (hangup / CDR).
    RecordClosed,
}

impl CallEventKind {
    /// Stable name used to namespace idempotency fingerprints.
    #[must_use]
    pub fn fingerprint_name(&self) -> String {
        match self {
            CallEventKind::Initiated => "initiated".to_string(),
            CallEventKind::StatusChanged(s) => format!("status-{}", s.as_str()),
            CallEventKind::RecordClosed => "record-closed".to_string(),
        }
    }
}

/// A normalized, validated call lifecycle event.
///
/// Owned exclusively by the request that received it; never persisted
/// beyond processing.
#[derive(Debug)]
pub struct CallEvent {
    pub call_id: CallId,
    pub kind: CallEventKind,
    pub from: Option<String>,
    pub did: Option<Did>,
    pub delivery_id: Option<String>,
    pub received_at: DateTime<Utc>,
    pub extra: Map<String, Value>,
}

impl CallEvent {
    /// Normalize a raw webhook payload.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::InvalidEvent` when the payload cannot be
    /// mapped to a known event kind or is missing fields that kind
    /// requires.
    pub fn from_payload(
        payload: WebhookPayload,
        received_at: DateTime<Utc>,
    ) -> Result<Self, RouterError> {
        if payload.call_id.is_empty() {
            return Err(RouterError::InvalidEvent(
                "call_id must not be empty".to_string(),
            ));
        }

        let kind = match payload.event_type.as_str() {
            "call.initiated" => CallEventKind::Initiated,
            "call.status" => {
                let status = payload
                    .status
                    .as_deref()
                    .and_then(CallStatus::parse)
                    .ok_or_else(|| {
                        RouterError::InvalidEvent(format!(
                            "unrecognized call status {:?}",
                            payload.status
                        ))
                    })?;
                CallEventKind::StatusChanged(status)
            }
            "call.closed" => CallEventKind::RecordClosed,
            other => {
                return Err(RouterError::InvalidEvent(format!(
                    "unrecognized event type {other:?}"
                )));
            }
        };

        // The initiating event drives routing; it must carry both
        // numbers.
        if kind == CallEventKind::Initiated && (payload.from.is_none() || payload.to.is_none()) {
            return Err(RouterError::InvalidEvent(
                "initiating event requires from and to numbers".to_string(),
            ));
        }

        Ok(CallEvent {
            call_id: CallId(payload.call_id),
            kind,
            from: payload.from,
            did: payload.to.map(Did),
            delivery_id: payload.delivery_id,
            received_at,
            extra: payload.extra,
        })
    }
}
