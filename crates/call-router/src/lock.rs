//! Per-call distributed locking.
//!
//! Concurrent or retried events for the same call serialize on an
//! advisory lock in the shared store: at most one holder per call id
//! at any instant across all router instances. Acquisition waits a
//! bounded time and then fails fast with a transient error so the
//! webhook layer can ask the platform to retry; it never queues
//! indefinitely.
//!
//! The holder token is verified on release and renewal
//! (compare-and-delete / compare-and-expire), so a caller whose lock
//! expired and was re-acquired elsewhere can never release or extend
//! the new holder's lock. TTL expiry is the backstop for a crashed
//! holder.
//!
//! # Key Pattern
//!
//! `lock:call:{call_id}` - holder token

use crate::errors::RouterError;
use common::store::SharedStore;
use common::types::CallId;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Interval between acquisition attempts during the bounded wait.
const ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Token proving lock ownership for release and renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Provides mutual exclusion per call identifier.
#[derive(Clone)]
pub struct CallLockManager {
    store: Arc<dyn SharedStore>,
    ttl: Duration,
    acquire_timeout: Duration,
    instance_id: String,
}

impl CallLockManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn SharedStore>,
        ttl: Duration,
        acquire_timeout: Duration,
        instance_id: String,
    ) -> Self {
        Self {
            store,
            ttl,
            acquire_timeout,
            instance_id,
        }
    }

    fn key(call_id: &CallId) -> String {
        format!("lock:call:{call_id}")
    }

    fn new_token(&self) -> LockToken {
        // Instance id prefix attributes a held lock to its holder in
        // store inspection during incidents.
        LockToken(format!("{}:{}", self.instance_id, Uuid::new_v4()))
    }

    /// Acquire the lock for a call, waiting up to the bounded
    /// acquisition timeout.
    ///
    /// # Errors
    ///
    /// `RouterError::LockContended` when the wait expires;
    /// `RouterError::StoreUnavailable` on store failure.
    #[instrument(skip_all, fields(call_id = %call_id))]
    pub async fn acquire(&self, call_id: &CallId) -> Result<LockToken, RouterError> {
        let key = Self::key(call_id);
        let token = self.new_token();
        let deadline = tokio::time::Instant::now() + self.acquire_timeout;

        loop {
            if self
                .store
                .set_if_absent(&key, token.as_str(), self.ttl)
                .await?
            {
                debug!(target: "router.lock", call_id = %call_id, "Lock acquired");
                return Ok(token);
            }

            if tokio::time::Instant::now() + ACQUIRE_RETRY_INTERVAL >= deadline {
                warn!(
                    target: "router.lock",
                    call_id = %call_id,
                    timeout_ms = self.acquire_timeout.as_millis() as u64,
                    "Lock acquisition timed out"
                );
                metrics::counter!("router_lock_contention_total").increment(1);
                return Err(RouterError::LockContended(call_id.to_string()));
            }

            tokio::time::sleep(ACQUIRE_RETRY_INTERVAL).await;
        }
    }

    /// Release a held lock. The delete only happens if the token
    /// still matches; losing that race is logged, not an error.
    #[instrument(skip_all, fields(call_id = %call_id))]
    pub async fn release(&self, call_id: &CallId, token: &LockToken) {
        match self
            .store
            .compare_and_delete(&Self::key(call_id), token.as_str())
            .await
        {
            Ok(true) => {
                debug!(target: "router.lock", call_id = %call_id, "Lock released");
            }
            Ok(false) => {
                // Expired and possibly re-acquired by another holder;
                // nothing further to do.
                warn!(
                    target: "router.lock",
                    call_id = %call_id,
                    "Lock was no longer held at release"
                );
            }
            Err(e) => {
                warn!(
                    target: "router.lock",
                    call_id = %call_id,
                    error = %e,
                    "Failed to release lock; TTL expiry will reclaim it"
                );
            }
        }
    }

    /// Run `op` while holding the call's lock, releasing on every
    /// exit path.
    ///
    /// A background ticker renews the TTL at half-life while the
    /// operation runs, so a long operation keeps its lock, while a
    /// crashed process loses it after one TTL.
    ///
    /// # Errors
    ///
    /// Propagates acquisition errors and the operation's own error.
    pub async fn with_lock<T, F, Fut>(&self, call_id: &CallId, op: F) -> Result<T, RouterError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RouterError>>,
    {
        let token = self.acquire(call_id).await?;

        let cancel = CancellationToken::new();
        let renew_handle = tokio::spawn(renewal_loop(
            Arc::clone(&self.store),
            Self::key(call_id),
            token.clone(),
            self.ttl,
            cancel.clone(),
        ));

        let result = op().await;

        cancel.cancel();
        let _ = renew_handle.await;
        self.release(call_id, &token).await;

        result
    }
}

/// Renew the lock TTL at half-life until cancelled or the lock is
/// lost.
async fn renewal_loop(
    store: Arc<dyn SharedStore>,
    key: String,
    token: LockToken,
    ttl: Duration,
    cancel: CancellationToken,
) {
    let interval = ttl / 2;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so the first renewal
    // lands at half-life.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                return;
            }
            _ = ticker.tick() => {
                match store.compare_and_expire(&key, token.as_str(), ttl).await {
                    Ok(true) => {
                        debug!(target: "router.lock", key = %key, "Lock renewed");
                    }
                    Ok(false) => {
                        // Lost to expiry; the operation keeps running
                        // and relies on idempotent transitions.
                        warn!(
                            target: "router.lock",
                            key = %key,
                            "Lock lost during operation; stopping renewal"
                        );
                        return;
                    }
                    Err(e) => {
                        warn!(
                            target: "router.lock",
                            key = %key,
                            error = %e,
                            "Lock renewal failed; will retry"
                        );
                    }
                }
            }
        }
    }
}
