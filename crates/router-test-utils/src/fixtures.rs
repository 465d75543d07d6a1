//! Routing-config fixtures.
//!
//! [`FixtureConfigReader`] implements the control-plane reader over
//! in-memory maps, with per-method call counters so tests can assert
//! how many decisions actually hit the "control plane" (e.g. exactly
//! one under N duplicate deliveries).

use async_trait::async_trait;
use call_router::errors::RouterError;
use call_router::routing::snapshot::{BusinessHoursConfig, DidRouting, RingGroupConfig};
use call_router::upstream::RoutingConfigReader;
use common::types::{Did, RingGroupId, ScheduleId, TenantId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory [`RoutingConfigReader`] with call counting.
///
/// Entities are tenant-scoped like the real API: a lookup with the
/// wrong tenant returns `None`.
#[derive(Default)]
pub struct FixtureConfigReader {
    dids: Mutex<HashMap<String, DidRouting>>,
    groups: Mutex<HashMap<(TenantId, RingGroupId), RingGroupConfig>>,
    schedules: Mutex<HashMap<(TenantId, ScheduleId), BusinessHoursConfig>>,
    did_calls: AtomicUsize,
    group_calls: AtomicUsize,
    schedule_calls: AtomicUsize,
    fail: std::sync::atomic::AtomicBool,
}

#[allow(clippy::missing_panics_doc)] // mutex poisoning only, test-only code
#[allow(clippy::unwrap_used)]
impl FixtureConfigReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DID mapping.
    #[must_use]
    pub fn with_did_routing(self, routing: DidRouting) -> Self {
        {
            let mut dids = self.dids.lock().unwrap();
            dids.insert(routing.did.as_str().to_string(), routing);
        }
        self
    }

    /// Register a ring group under its tenant.
    #[must_use]
    pub fn with_ring_group(self, tenant_id: TenantId, group: RingGroupConfig) -> Self {
        {
            let mut groups = self.groups.lock().unwrap();
            groups.insert((tenant_id, group.group_id), group);
        }
        self
    }

    /// Register a schedule under its tenant.
    #[must_use]
    pub fn with_business_hours(self, tenant_id: TenantId, schedule: BusinessHoursConfig) -> Self {
        {
            let mut schedules = self.schedules.lock().unwrap();
            schedules.insert((tenant_id, schedule.schedule_id), schedule);
        }
        self
    }

    /// Make every subsequent read fail as upstream-unavailable.
    pub fn set_failures(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of DID lookups served.
    #[must_use]
    pub fn did_calls(&self) -> usize {
        self.did_calls.load(Ordering::SeqCst)
    }

    /// Number of ring-group lookups served.
    #[must_use]
    pub fn group_calls(&self) -> usize {
        self.group_calls.load(Ordering::SeqCst)
    }

    /// Number of schedule lookups served.
    #[must_use]
    pub fn schedule_calls(&self) -> usize {
        self.schedule_calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), RouterError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RouterError::UpstreamUnavailable(
                "injected failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used)] // mutex poisoning only, test-only code
#[async_trait]
impl RoutingConfigReader for FixtureConfigReader {
    async fn did_routing(&self, did: &Did) -> Result<Option<DidRouting>, RouterError> {
        self.check_failure()?;
        self.did_calls.fetch_add(1, Ordering::SeqCst);
        let dids = self.dids.lock().unwrap();
        Ok(dids.get(did.as_str()).cloned())
    }

    async fn ring_group(
        &self,
        tenant_id: &TenantId,
        group_id: &RingGroupId,
    ) -> Result<Option<RingGroupConfig>, RouterError> {
        self.check_failure()?;
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        let groups = self.groups.lock().unwrap();
        Ok(groups.get(&(*tenant_id, *group_id)).cloned())
    }

    async fn business_hours(
        &self,
        tenant_id: &TenantId,
        schedule_id: &ScheduleId,
    ) -> Result<Option<BusinessHoursConfig>, RouterError> {
        self.check_failure()?;
        self.schedule_calls.fetch_add(1, Ordering::SeqCst);
        let schedules = self.schedules.lock().unwrap();
        Ok(schedules.get(&(*tenant_id, *schedule_id)).cloned())
    }
}
