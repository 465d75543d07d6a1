//! Call router error types.
//!
//! Every error carries a classification from the recovery taxonomy:
//! transient failures elicit a platform retry, invalid input degrades
//! to a deterministic fallback routing, illegal transitions are logged
//! and absorbed, and fatal errors surface loudly because they indicate
//! a logic gap, not an operational condition.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::error::StoreError;
use thiserror::Error;

/// Recovery classification for a [`RouterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Safe to retry; the webhook answer asks the platform to retry.
    Transient,
    /// The input cannot be processed; the call degrades to a fallback
    /// routing instead of failing silently.
    InvalidInput,
    /// The state machine rejected the event; absorbed after logging.
    IllegalTransition,
    /// A programming error between components; must not be swallowed.
    Fatal,
}

/// Call router error type.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The shared store (idempotency, locks, call state) failed or
    /// timed out.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The per-call lock could not be acquired within the bounded
    /// wait.
    #[error("Lock contended: {0}")]
    LockContended(String),

    /// The control-plane routing config reader failed or timed out.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The webhook payload could not be normalized into a call event.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The state machine rejected the transition.
    #[error("Illegal transition: {0}")]
    IllegalTransition(&'static str),

    /// A routing outcome reached the response builder that it cannot
    /// express. Indicates a logic gap between engine and builder.
    #[error("Unsupported routing outcome: {0}")]
    UnsupportedOutcome(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A document owned by this service failed to serialize.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RouterError {
    /// Returns the recovery classification for this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            RouterError::StoreUnavailable(_)
            | RouterError::LockContended(_)
            | RouterError::UpstreamUnavailable(_) => ErrorClass::Transient,
            RouterError::InvalidEvent(_) => ErrorClass::InvalidInput,
            RouterError::IllegalTransition(_) => ErrorClass::IllegalTransition,
            RouterError::UnsupportedOutcome(_)
            | RouterError::Configuration(_)
            | RouterError::Serialization(_) => ErrorClass::Fatal,
        }
    }

    /// HTTP status the webhook layer answers with when this error
    /// escapes the handler.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self.class() {
            ErrorClass::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorClass::InvalidInput => StatusCode::BAD_REQUEST,
            // Absorbed by the handler in the normal path; if one
            // escapes, the platform should not retry it.
            ErrorClass::IllegalTransition => StatusCode::CONFLICT,
            ErrorClass::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a platform-safe message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> &'static str {
        match self.class() {
            ErrorClass::Transient => "temporarily unavailable, retry",
            ErrorClass::InvalidInput => "unprocessable event",
            ErrorClass::IllegalTransition => "event not applicable",
            ErrorClass::Fatal => "internal error",
        }
    }
}

impl From<StoreError> for RouterError {
    fn from(err: StoreError) -> Self {
        RouterError::StoreUnavailable(err.to_string())
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        if self.class() == ErrorClass::Fatal {
            tracing::error!(
                target: "router.errors",
                error = %self,
                "Fatal router error reached the response layer"
            );
        }
        (self.status_code(), self.client_message()).into_response()
    }
}
