//! Shared-store abstraction for the execution plane.
//!
//! The idempotency cache, per-call locks, call state, and lifecycle
//! event channel all live in one shared fast store (Redis in
//! production, an in-memory double in tests). This trait is the seam:
//! every operation is network-bounded and may fail, so every method
//! returns a [`StoreError`] that callers classify as transient.
//!
//! # Atomicity requirements
//!
//! Implementations must provide real atomicity for the compare-and-*
//! operations; the lock manager's correctness depends on it:
//!
//! - [`SharedStore::set_if_absent`] is the lock-acquire primitive
//!   (`SET NX PX` semantics).
//! - [`SharedStore::compare_and_delete`] releases a lock only while
//!   the caller still holds it.
//! - [`SharedStore::compare_and_expire`] renews a held lock without
//!   resurrecting one that was lost.

use crate::error::StoreResult;
use async_trait::async_trait;
use std::time::Duration;

/// Key/value store shared by all router instances.
///
/// Values are opaque strings; callers own their serialization. Keys
/// follow the patterns documented by each component
/// (`idem:{fingerprint}`, `lock:call:{call_id}`, `call:{call_id}:state`).
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Read a value. `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a value with a time-to-live.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Write a value with a time-to-live only if the key is absent.
    ///
    /// Returns `true` when the write happened (the key was absent).
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete the key only if its current value equals `expected`.
    ///
    /// Returns `true` when the delete happened.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Reset the key's time-to-live only if its current value equals
    /// `expected`.
    ///
    /// Returns `true` when the TTL was reset; `false` means the key is
    /// gone or owned by someone else.
    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration)
        -> StoreResult<bool>;

    /// Delete a key unconditionally. Deleting an absent key is not an
    /// error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Publish a payload to a broadcast channel (fire-and-forget
    /// fan-out to downstream consumers).
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()>;
}
