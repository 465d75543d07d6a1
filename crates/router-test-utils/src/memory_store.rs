//! In-memory shared-store double with TTL semantics.
//!
//! Implements the same atomicity contract as the Redis backend:
//! `set_if_absent`, `compare_and_delete`, and `compare_and_expire`
//! observe-and-mutate under one mutex guard. TTLs use tokio time, so
//! `tokio::time::advance` drives expiry in paused-time tests.
//!
//! Published payloads are captured for assertions, and failure
//! injection flips every operation (or just publishes) into backend
//! errors to exercise transient-error paths.

use async_trait::async_trait;
use common::error::{StoreError, StoreResult};
use common::store::SharedStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at > Instant::now()
    }
}

#[derive(Debug, Default)]
struct Inner {
    kv: HashMap<String, Entry>,
    published: Vec<(String, String)>,
    fail_ops: bool,
    fail_publish: bool,
}

impl Inner {
    /// Current live value of a key, dropping it if expired.
    fn get_live(&mut self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Some(entry) if entry.live() => Some(entry.value.clone()),
            Some(_) => {
                self.kv.remove(key);
                None
            }
            None => None,
        }
    }

    fn check_failure(&self, publish: bool) -> StoreResult<()> {
        if self.fail_ops || (publish && self.fail_publish) {
            return Err(StoreError::Backend("injected failure".to_string()));
        }
        Ok(())
    }
}

/// In-memory [`SharedStore`] for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[allow(clippy::missing_panics_doc, clippy::unwrap_used)] // mutex poisoning only, test-only code
impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a backend error.
    #[must_use]
    pub fn with_op_failures(self) -> Self {
        self.set_op_failures(true);
        self
    }

    /// Make publishes (only) fail with a backend error.
    #[must_use]
    pub fn with_publish_failures(self) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.fail_publish = true;
        }
        self
    }

    /// Toggle whole-store failure injection.
    pub fn set_op_failures(&self, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_ops = fail;
    }

    /// Payloads published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, String)> {
        let inner = self.inner.lock().unwrap();
        inner.published.clone()
    }

    /// Live value of a key (test inspection).
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.get_live(key)
    }

    /// Drop a key immediately, simulating eviction or store restart.
    pub fn evict(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.kv.remove(key);
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.kv.values().filter(|e| e.live()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[allow(clippy::unwrap_used)] // mutex poisoning only, test-only code
#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_failure(false)?;
        Ok(inner.get_live(key))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_failure(false)?;
        inner.kv.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_failure(false)?;
        if inner.get_live(key).is_some() {
            return Ok(false);
        }
        inner.kv.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_failure(false)?;
        if inner.get_live(key).as_deref() == Some(expected) {
            inner.kv.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_failure(false)?;
        if inner.get_live(key).as_deref() == Some(expected) {
            if let Some(entry) = inner.kv.get_mut(key) {
                entry.expires_at = Instant::now() + ttl;
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_failure(false)?;
        inner.kv.remove(key);
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_failure(true)?;
        inner
            .published
            .push((channel.to_string(), payload.to_string()));
        Ok(())
    }
}
