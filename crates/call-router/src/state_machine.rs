//! Call lifecycle state machine.
//!
//! The transition table here is the single source of truth for what a
//! call may do next. Illegal transitions are rejected, not silently
//! applied; the webhook layer logs and answers with the last
//! known-good response instead of erroring.
//!
//! Idempotent by construction: re-applying the event that produced
//! the current phase is a no-op, never a rejection, because the
//! platform redelivers and reorders events. All `apply` calls happen
//! while the call's lock is held; that is the serialization point
//! that prevents two handlers from both making the "first"
//! transition.

use crate::event::{CallEventKind, CallStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    Initiated,
    Ringing,
    Answered,
    Completed,
    NoAnswer,
    Busy,
    Failed,
}

impl CallPhase {
    /// Whether the phase ends the call's routing lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallPhase::Completed | CallPhase::NoAnswer | CallPhase::Busy | CallPhase::Failed
        )
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallPhase::Initiated => "initiated",
            CallPhase::Ringing => "ringing",
            CallPhase::Answered => "answered",
            CallPhase::Completed => "completed",
            CallPhase::NoAnswer => "no_answer",
            CallPhase::Busy => "busy",
            CallPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Phase a status notification maps to.
fn phase_for(status: CallStatus) -> CallPhase {
    match status {
        CallStatus::Ringing => CallPhase::Ringing,
        CallStatus::Answered => CallPhase::Answered,
        CallStatus::NoAnswer => CallPhase::NoAnswer,
        CallStatus::Busy => CallPhase::Busy,
        CallStatus::Failed => CallPhase::Failed,
    }
}

/// Result of applying an event to a call's current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Enter a new phase.
    Enter(CallPhase),
    /// Duplicate or out-of-order event; the phase stands.
    NoOp(CallPhase),
    /// The transition is illegal.
    Rejected(&'static str),
}

/// Apply an event to the current phase.
///
/// `current` is `None` when no call state exists. A missing state is
/// treated as first-seen (the store is rebuildable), so any event may
/// establish a phase from nothing.
#[must_use]
pub fn apply(current: Option<CallPhase>, event: &CallEventKind) -> Transition {
    let Some(phase) = current else {
        // Lost or never-created state: accept the event at face value.
        return match event {
            CallEventKind::Initiated => Transition::Enter(CallPhase::Initiated),
            CallEventKind::StatusChanged(s) => Transition::Enter(phase_for(*s)),
            CallEventKind::RecordClosed => Transition::Enter(CallPhase::Completed),
        };
    };

    match event {
        CallEventKind::Initiated => {
            if phase == CallPhase::Initiated {
                Transition::NoOp(CallPhase::Initiated)
            } else if phase.is_terminal() {
                Transition::Rejected("initiating event on a closed call")
            } else {
                // Late duplicate of the initiating event; the chosen
                // outcome is replayed upstream.
                Transition::NoOp(phase)
            }
        }
        CallEventKind::StatusChanged(status) => {
            let next = phase_for(*status);
            if phase == next {
                return Transition::NoOp(phase);
            }
            match (phase, next) {
                (CallPhase::Initiated, CallPhase::Ringing | CallPhase::Answered) => {
                    Transition::Enter(next)
                }
                (CallPhase::Ringing, CallPhase::Answered) => Transition::Enter(next),
                (
                    CallPhase::Initiated | CallPhase::Ringing,
                    CallPhase::NoAnswer | CallPhase::Busy | CallPhase::Failed,
                ) => Transition::Enter(next),
                (CallPhase::Answered, CallPhase::Ringing) => {
                    Transition::Rejected("answered call cannot return to ringing")
                }
                (CallPhase::Answered, _) => {
                    Transition::Rejected("answered call closes via its record, not a status")
                }
                (CallPhase::Completed, _) => {
                    Transition::Rejected("status event on a completed call")
                }
                (CallPhase::NoAnswer | CallPhase::Busy | CallPhase::Failed, _) => {
                    Transition::Rejected("status event on a terminated call")
                }
                // Unreachable: phase == next returned above, and no
                // status maps to initiated or completed.
                _ => Transition::Rejected("unmapped status transition"),
            }
        }
        CallEventKind::RecordClosed => {
            if phase == CallPhase::Completed {
                Transition::NoOp(CallPhase::Completed)
            } else {
                // Any phase closes on the record, including the
                // terminal alternatives; the record is the final
                // bookkeeping.
                Transition::Enter(CallPhase::Completed)
            }
        }
    }
}
