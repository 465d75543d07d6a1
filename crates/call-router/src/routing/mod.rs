//! Routing decision engine and its read-only configuration inputs.
//!
//! Config entities are owned by the control plane; the engine treats
//! them as an immutable snapshot per decision and never writes them.

pub mod engine;
pub mod hours;
pub mod snapshot;

pub use engine::{NextAttempt, RoutingEngine, RoutingOutcome};
pub use snapshot::{
    BusinessHoursConfig, DateException, DayHours, DidRouting, FallbackAction, RingGroupConfig,
    RingGroupMember, RingStrategy, RoutingTarget, TenantRoutingSnapshot, TimeRange, Weekday,
};
