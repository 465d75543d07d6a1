//! Per-call state document.
//!
//! The authoritative in-core representation of a call's lifecycle,
//! keyed by call identifier in the shared store. Created on the
//! initiating event, mutated only while the call's lock is held, and
//! dropped after the terminal phase plus a grace period (via TTL).
//!
//! The store is fast and rebuildable: a lost entry degrades to
//! first-seen and the deterministic decision engine re-derives the
//! outcome. The only documented risk window is a mid-ring sequential
//! cursor restarting from the first member.
//!
//! # Key Pattern
//!
//! `call:{call_id}:state` - JSON [`CallState`]

use crate::errors::RouterError;
use crate::routing::RoutingOutcome;
use crate::state_machine::CallPhase;
use chrono::{DateTime, Utc};
use common::store::SharedStore;
use common::types::{CallId, Did, TenantId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

/// Timestamped phase entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStamp {
    pub phase: CallPhase,
    pub entered_at: DateTime<Utc>,
}

/// Semi-durable state of one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallState {
    pub call_id: CallId,
    pub tenant_id: TenantId,
    pub did: Did,
    pub phase: CallPhase,
    /// The routing chosen at initiation; immutable for the call.
    pub outcome: RoutingOutcome,
    /// Progress cursor for sequential/round-robin ring groups, scoped
    /// to this call only.
    pub ring_cursor: usize,
    /// Every phase entered, in order.
    pub phase_history: Vec<PhaseStamp>,
}

impl CallState {
    /// Create the state for a freshly initiated call.
    #[must_use]
    pub fn new(
        call_id: CallId,
        tenant_id: TenantId,
        did: Did,
        outcome: RoutingOutcome,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            call_id,
            tenant_id,
            did,
            phase: CallPhase::Initiated,
            outcome,
            ring_cursor: 0,
            phase_history: vec![PhaseStamp {
                phase: CallPhase::Initiated,
                entered_at: at,
            }],
        }
    }

    /// Enter a new phase, stamping the history.
    pub fn enter_phase(&mut self, phase: CallPhase, at: DateTime<Utc>) {
        self.phase = phase;
        self.phase_history.push(PhaseStamp {
            phase,
            entered_at: at,
        });
    }
}

/// Call-state access against the shared store.
#[derive(Clone)]
pub struct CallStateStore {
    store: Arc<dyn SharedStore>,
    /// TTL while the call is live.
    active_ttl: Duration,
    /// TTL after the call reaches a terminal phase.
    grace_ttl: Duration,
}

impl CallStateStore {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>, active_ttl: Duration, grace_ttl: Duration) -> Self {
        Self {
            store,
            active_ttl,
            grace_ttl,
        }
    }

    fn key(call_id: &CallId) -> String {
        format!("call:{call_id}:state")
    }

    /// Load a call's state. An unreadable document is discarded and
    /// treated as absent (first-seen), which is safe because outcome
    /// recomputation is deterministic.
    ///
    /// # Errors
    ///
    /// Returns a transient error when the store is unavailable.
    #[instrument(skip_all, fields(call_id = %call_id))]
    pub async fn load(&self, call_id: &CallId) -> Result<Option<CallState>, RouterError> {
        let Some(raw) = self.store.get(&Self::key(call_id)).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(
                    target: "router.state",
                    call_id = %call_id,
                    error = %e,
                    "Discarding unreadable call state; treating as first-seen"
                );
                Ok(None)
            }
        }
    }

    /// Persist a call's state. Terminal phases get the grace TTL so
    /// the entry drops on its own after the call ends.
    ///
    /// # Errors
    ///
    /// Returns a transient error when the store is unavailable.
    #[instrument(skip_all, fields(call_id = %state.call_id, phase = %state.phase))]
    pub async fn save(&self, state: &CallState) -> Result<(), RouterError> {
        let json = serde_json::to_string(state)
            .map_err(|e| RouterError::Serialization(format!("call state: {e}")))?;

        let ttl = if state.phase.is_terminal() {
            self.grace_ttl
        } else {
            self.active_ttl
        };

        self.store
            .set_with_ttl(&Self::key(&state.call_id), &json, ttl)
            .await?;
        Ok(())
    }
}
