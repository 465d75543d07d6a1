//! Routing configuration entities.
//!
//! Read-only inputs resolved from the control plane: DID mapping,
//! ring-group definitions, and business-hours schedules. Strategy and
//! fallback fields are closed enums so the engine and the response
//! builder handle every variant exhaustively at compile time.

use chrono::{NaiveDate, NaiveTime};
use common::types::{Did, ExtensionId, RingGroupId, ScheduleId, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ringing strategy of a ring group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RingStrategy {
    /// All members ring at once; first answer wins.
    Simultaneous,
    /// Members ring one at a time, rotating from the per-call cursor.
    RoundRobin,
    /// Members ring one at a time in priority order.
    Sequential,
}

/// Terminal routing applied when no primary target is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FallbackAction {
    /// Redirect the caller to a voicemail box.
    Voicemail { mailbox: String },
    /// Reject the call as busy.
    Busy,
    /// Hang up.
    Hangup,
}

/// Routing target configured for a DID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoutingTarget {
    /// Ring a single extension.
    Extension {
        extension: ExtensionId,
        #[serde(default)]
        timeout_seconds: Option<u32>,
        no_answer: FallbackAction,
    },
    /// Ring a group of extensions.
    RingGroup { group_id: RingGroupId },
    /// Gate on a business-hours schedule.
    BusinessHours {
        schedule_id: ScheduleId,
        open: Box<RoutingTarget>,
        closed: Box<RoutingTarget>,
    },
    /// Apply a terminal action directly.
    Terminal { fallback: FallbackAction },
}

/// DID-to-target mapping, with the owning tenant made explicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidRouting {
    pub did: Did,
    pub tenant_id: TenantId,
    pub target: RoutingTarget,
}

/// One member of a ring group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingGroupMember {
    pub extension: ExtensionId,
    /// Lower rings earlier under the sequential strategy.
    #[serde(default)]
    pub priority: u32,
}

/// Ring group definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingGroupConfig {
    pub group_id: RingGroupId,
    pub name: String,
    pub strategy: RingStrategy,
    pub members: Vec<RingGroupMember>,
    /// Per-attempt ring timeout; the router default applies when
    /// absent.
    #[serde(default)]
    pub ring_timeout_seconds: Option<u32>,
    pub fallback: FallbackAction,
}

/// Day of week in a weekly schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// Map from chrono's weekday.
    #[must_use]
    pub fn from_chrono(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }
}

/// Open interval within a day, `[start, end)` in the tenant's local
/// time. A range with `end <= start` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    /// Whether `t` falls inside the range.
    #[must_use]
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t < self.end
        } else {
            // Wraps past midnight, e.g. 22:00-06:00
            t >= self.start || t < self.end
        }
    }
}

/// Open hours for one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub weekday: Weekday,
    pub ranges: Vec<TimeRange>,
}

/// Calendar-date exception overriding the weekly schedule.
///
/// Empty `ranges` closes the whole day; non-empty ranges replace the
/// weekly pattern for that date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateException {
    pub date: NaiveDate,
    #[serde(default)]
    pub ranges: Vec<TimeRange>,
}

/// Business-hours schedule definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHoursConfig {
    pub schedule_id: ScheduleId,
    /// Tenant-local UTC offset in minutes (control plane owns DST
    /// correctness).
    pub utc_offset_minutes: i32,
    pub weekly: Vec<DayHours>,
    #[serde(default)]
    pub exceptions: Vec<DateException>,
}

/// Immutable routing-config snapshot for one decision.
#[derive(Debug, Clone, Default)]
pub struct TenantRoutingSnapshot {
    /// The DID's mapping, or `None` for an unknown DID.
    pub did_routing: Option<DidRouting>,
    /// Ring groups referenced by the target tree.
    pub ring_groups: HashMap<RingGroupId, RingGroupConfig>,
    /// Schedules referenced by the target tree.
    pub schedules: HashMap<ScheduleId, BusinessHoursConfig>,
}
