//! Common error types for Switchyard components.

use thiserror::Error;

/// Errors surfaced by a shared-store backend.
///
/// The execution plane treats every store failure as transient: the
/// webhook layer answers with a retry-eliciting status and the
/// platform's own retry is the recovery mechanism.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// The operation did not complete within its bounded timeout.
    #[error("Store operation timed out: {0}")]
    Timeout(String),
}

/// Result type alias using `StoreError`
pub type StoreResult<T> = std::result::Result<T, StoreError>;
