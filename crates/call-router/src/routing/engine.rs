//! Routing decision engine.
//!
//! Given a normalized inbound-call event and an immutable routing
//! snapshot, computes a [`RoutingOutcome`]: ring one extension, ring
//! a set with a strategy, or a terminal fallback. Deterministic in
//! (did, snapshot, now) so a duplicate initiating event recomputes
//! identically instead of silently rerouting a live call.
//!
//! The outcome chosen for a call's initiating event is immutable for
//! that call: business-hours gates resolve at decision time, so a
//! replay after a schedule boundary can never flip the routing of a
//! live call.

use crate::routing::hours;
use crate::routing::snapshot::{
    FallbackAction, RingGroupConfig, RingStrategy, RoutingTarget, TenantRoutingSnapshot,
};
use chrono::{DateTime, Utc};
use common::types::{Did, ExtensionId, RingGroupId};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Maximum nesting depth of a routing target tree (business-hours
/// gates referencing further gates).
pub const MAX_TARGET_DEPTH: u8 = 4;

/// The routing chosen for a call's initiating event.
///
/// Stored in call state and immutable once chosen; retries replay it
/// rather than recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoutingOutcome {
    /// Ring a single extension.
    DirectExtension {
        extension: ExtensionId,
        timeout_seconds: u32,
        fallback: FallbackAction,
    },
    /// Ring a group of extensions under a strategy. `members` is
    /// already ordered for the strategy; the per-call cursor indexes
    /// into it.
    RingGroup {
        group_id: RingGroupId,
        strategy: RingStrategy,
        members: Vec<ExtensionId>,
        per_member_timeout_seconds: u32,
        fallback: FallbackAction,
    },
    /// Terminal routing; no extension rings.
    Fallback { action: FallbackAction },
}

impl RoutingOutcome {
    /// The fallback applied when the primary routing is exhausted.
    #[must_use]
    pub fn fallback_action(&self) -> FallbackAction {
        match self {
            RoutingOutcome::DirectExtension { fallback, .. }
            | RoutingOutcome::RingGroup { fallback, .. } => fallback.clone(),
            RoutingOutcome::Fallback { action } => action.clone(),
        }
    }
}

/// Next step for a ring attempt that came back unanswered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAttempt {
    /// Ring the member at the new cursor.
    Advance(usize),
    /// No members left; apply the outcome's fallback.
    Exhausted,
}

/// Computes routing outcomes from config snapshots.
#[derive(Debug, Clone)]
pub struct RoutingEngine {
    /// Ring timeout applied when a target has none configured.
    default_ring_timeout_seconds: u32,
}

impl RoutingEngine {
    #[must_use]
    pub fn new(default_ring_timeout_seconds: u32) -> Self {
        Self {
            default_ring_timeout_seconds,
        }
    }

    /// Decide the routing for an inbound call.
    ///
    /// Never fails: resolution problems (unknown DID, dangling group
    /// or schedule reference, over-deep target tree) degrade to a
    /// deterministic busy fallback with a distinct warning
    /// classification for each.
    #[must_use]
    pub fn decide(
        &self,
        did: &Did,
        snapshot: &TenantRoutingSnapshot,
        now: DateTime<Utc>,
    ) -> RoutingOutcome {
        let Some(routing) = &snapshot.did_routing else {
            warn!(
                target: "router.engine",
                classification = "unknown_did",
                did = %did,
                "No routing configured for DID"
            );
            return RoutingOutcome::Fallback {
                action: FallbackAction::Busy,
            };
        };

        self.resolve(&routing.target, snapshot, now, 0)
    }

    fn resolve(
        &self,
        target: &RoutingTarget,
        snapshot: &TenantRoutingSnapshot,
        now: DateTime<Utc>,
        depth: u8,
    ) -> RoutingOutcome {
        if depth > MAX_TARGET_DEPTH {
            warn!(
                target: "router.engine",
                classification = "target_depth_exceeded",
                depth = depth,
                "Routing target tree exceeds maximum depth"
            );
            return RoutingOutcome::Fallback {
                action: FallbackAction::Busy,
            };
        }

        match target {
            RoutingTarget::Extension {
                extension,
                timeout_seconds,
                no_answer,
            } => RoutingOutcome::DirectExtension {
                extension: extension.clone(),
                timeout_seconds: timeout_seconds.unwrap_or(self.default_ring_timeout_seconds),
                fallback: no_answer.clone(),
            },
            RoutingTarget::RingGroup { group_id } => {
                let Some(group) = snapshot.ring_groups.get(group_id) else {
                    warn!(
                        target: "router.engine",
                        classification = "dangling_ring_group",
                        group_id = %group_id,
                        "DID routing references a ring group missing from the snapshot"
                    );
                    return RoutingOutcome::Fallback {
                        action: FallbackAction::Busy,
                    };
                };
                self.expand_group(group)
            }
            RoutingTarget::BusinessHours {
                schedule_id,
                open,
                closed,
            } => {
                let Some(schedule) = snapshot.schedules.get(schedule_id) else {
                    warn!(
                        target: "router.engine",
                        classification = "dangling_schedule",
                        schedule_id = %schedule_id,
                        "DID routing references a schedule missing from the snapshot"
                    );
                    return RoutingOutcome::Fallback {
                        action: FallbackAction::Busy,
                    };
                };
                let side = if hours::is_open(schedule, now) {
                    open
                } else {
                    closed
                };
                self.resolve(side, snapshot, now, depth + 1)
            }
            RoutingTarget::Terminal { fallback } => RoutingOutcome::Fallback {
                action: fallback.clone(),
            },
        }
    }

    /// Expand a ring group into an ordered member list per its
    /// strategy.
    fn expand_group(&self, group: &RingGroupConfig) -> RoutingOutcome {
        if group.members.is_empty() {
            return RoutingOutcome::Fallback {
                action: group.fallback.clone(),
            };
        }

        let members: Vec<ExtensionId> = match group.strategy {
            // Simultaneous and round-robin keep the configured order;
            // round-robin rotation happens via the per-call cursor.
            RingStrategy::Simultaneous | RingStrategy::RoundRobin => {
                group.members.iter().map(|m| m.extension.clone()).collect()
            }
            // Sequential orders by priority ascending, ties broken by
            // extension id for determinism.
            RingStrategy::Sequential => {
                let mut ordered: Vec<_> = group.members.iter().collect();
                ordered.sort_by(|a, b| {
                    a.priority
                        .cmp(&b.priority)
                        .then_with(|| a.extension.cmp(&b.extension))
                });
                ordered.into_iter().map(|m| m.extension.clone()).collect()
            }
        };

        RoutingOutcome::RingGroup {
            group_id: group.group_id,
            strategy: group.strategy,
            members,
            per_member_timeout_seconds: group
                .ring_timeout_seconds
                .unwrap_or(self.default_ring_timeout_seconds),
            fallback: group.fallback.clone(),
        }
    }
}

/// Progress a ring-group outcome after an unanswered attempt.
///
/// Sequential and round-robin groups advance their cursor to the next
/// member and wrap only as far as one full pass; a simultaneous group
/// has a single attempt. Direct-extension and fallback outcomes have
/// nothing to advance.
#[must_use]
pub fn next_ring_attempt(outcome: &RoutingOutcome, cursor: usize) -> NextAttempt {
    match outcome {
        RoutingOutcome::RingGroup {
            strategy: RingStrategy::Sequential | RingStrategy::RoundRobin,
            members,
            ..
        } => {
            let next = cursor + 1;
            if next < members.len() {
                NextAttempt::Advance(next)
            } else {
                NextAttempt::Exhausted
            }
        }
        RoutingOutcome::RingGroup {
            strategy: RingStrategy::Simultaneous,
            ..
        }
        | RoutingOutcome::DirectExtension { .. }
        | RoutingOutcome::Fallback { .. } => NextAttempt::Exhausted,
    }
}
