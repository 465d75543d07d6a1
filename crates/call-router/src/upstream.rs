//! Routing config reader.
//!
//! Read-only access to the control plane's DID mappings, ring groups,
//! and business-hours schedules over HTTP with a bearer credential.
//! The tenant identifier is threaded explicitly through every call;
//! there is no implicit tenant scoping anywhere in the core.
//!
//! A small TTL cache bounds staleness: routing config changes are
//! tenant-initiated and rare, and a decision reads an immutable
//! snapshot assembled here.

use crate::errors::RouterError;
use crate::routing::snapshot::{
    BusinessHoursConfig, DidRouting, RingGroupConfig, RoutingTarget, TenantRoutingSnapshot,
};
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::types::{Did, RingGroupId, ScheduleId, TenantId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Bounded timeout for control-plane reads (on the webhook's critical
/// path).
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Read-only access to control-plane routing configuration.
#[async_trait]
pub trait RoutingConfigReader: Send + Sync {
    /// Resolve a DID to its routing target. `None` for unknown DIDs.
    async fn did_routing(&self, did: &Did) -> Result<Option<DidRouting>, RouterError>;

    /// Fetch a ring group definition.
    async fn ring_group(
        &self,
        tenant_id: &TenantId,
        group_id: &RingGroupId,
    ) -> Result<Option<RingGroupConfig>, RouterError>;

    /// Fetch a business-hours schedule.
    async fn business_hours(
        &self,
        tenant_id: &TenantId,
        schedule_id: &ScheduleId,
    ) -> Result<Option<BusinessHoursConfig>, RouterError>;
}

/// HTTP implementation against the control plane.
pub struct HttpConfigReader {
    client: reqwest::Client,
    base_url: String,
    bearer_token: SecretString,
}

impl HttpConfigReader {
    /// Build the reader.
    ///
    /// # Errors
    ///
    /// `RouterError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(base_url: String, bearer_token: SecretString) -> Result<Self, RouterError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| RouterError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            bearer_token,
        })
    }

    /// GET a JSON resource; 404 maps to `None`, any other non-success
    /// status to a transient upstream error.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
    ) -> Result<Option<T>, RouterError> {
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.bearer_token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "router.upstream", error = %e, url = %url, "Control-plane request failed");
                RouterError::UpstreamUnavailable(e.to_string())
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!(
                target: "router.upstream",
                status = %status,
                url = %url,
                "Control-plane request rejected"
            );
            return Err(RouterError::UpstreamUnavailable(format!(
                "control plane answered {status}"
            )));
        }

        let value = response.json::<T>().await.map_err(|e| {
            warn!(target: "router.upstream", error = %e, url = %url, "Failed to parse control-plane response");
            RouterError::UpstreamUnavailable(format!("unparseable response: {e}"))
        })?;
        Ok(Some(value))
    }
}

#[async_trait]
impl RoutingConfigReader for HttpConfigReader {
    #[instrument(skip_all, fields(did = %did))]
    async fn did_routing(&self, did: &Did) -> Result<Option<DidRouting>, RouterError> {
        let url = format!("{}/api/v1/routing/dids/{}", self.base_url, did.as_str());
        self.get_json(url).await
    }

    #[instrument(skip_all, fields(tenant_id = %tenant_id, group_id = %group_id))]
    async fn ring_group(
        &self,
        tenant_id: &TenantId,
        group_id: &RingGroupId,
    ) -> Result<Option<RingGroupConfig>, RouterError> {
        let url = format!(
            "{}/api/v1/routing/tenants/{tenant_id}/ring-groups/{group_id}",
            self.base_url
        );
        self.get_json(url).await
    }

    #[instrument(skip_all, fields(tenant_id = %tenant_id, schedule_id = %schedule_id))]
    async fn business_hours(
        &self,
        tenant_id: &TenantId,
        schedule_id: &ScheduleId,
    ) -> Result<Option<BusinessHoursConfig>, RouterError> {
        let url = format!(
            "{}/api/v1/routing/tenants/{tenant_id}/business-hours/{schedule_id}",
            self.base_url
        );
        self.get_json(url).await
    }
}

/// Cache entry with its expiry instant. Negative lookups are cached
/// too so an unknown DID cannot hammer the control plane.
struct CacheEntry<T> {
    expires_at: Instant,
    value: Option<T>,
}

/// TTL cache in front of a [`RoutingConfigReader`].
///
/// Staleness is bounded by the configured TTL; reads within the
/// window reuse the cached value, including cached absence.
pub struct CachedConfigReader<R> {
    inner: R,
    ttl: Duration,
    dids: Mutex<HashMap<String, CacheEntry<DidRouting>>>,
    groups: Mutex<HashMap<String, CacheEntry<RingGroupConfig>>>,
    schedules: Mutex<HashMap<String, CacheEntry<BusinessHoursConfig>>>,
}

impl<R: RoutingConfigReader> CachedConfigReader<R> {
    #[must_use]
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            dids: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
            schedules: Mutex::new(HashMap::new()),
        }
    }

    async fn cached<T, F, Fut>(
        cache: &Mutex<HashMap<String, CacheEntry<T>>>,
        ttl: Duration,
        key: String,
        fetch: F,
    ) -> Result<Option<T>, RouterError>
    where
        T: Clone,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Option<T>, RouterError>>,
    {
        {
            let cache = cache.lock().await;
            if let Some(entry) = cache.get(&key) {
                if entry.expires_at > Instant::now() {
                    debug!(target: "router.upstream", key = %key, "Routing config cache hit");
                    return Ok(entry.value.clone());
                }
            }
        }

        let value = fetch().await?;

        let mut cache = cache.lock().await;
        cache.insert(
            key,
            CacheEntry {
                expires_at: Instant::now() + ttl,
                value: value.clone(),
            },
        );
        Ok(value)
    }
}

#[async_trait]
impl<R: RoutingConfigReader> RoutingConfigReader for CachedConfigReader<R> {
    async fn did_routing(&self, did: &Did) -> Result<Option<DidRouting>, RouterError> {
        Self::cached(&self.dids, self.ttl, did.as_str().to_string(), || {
            self.inner.did_routing(did)
        })
        .await
    }

    async fn ring_group(
        &self,
        tenant_id: &TenantId,
        group_id: &RingGroupId,
    ) -> Result<Option<RingGroupConfig>, RouterError> {
        Self::cached(
            &self.groups,
            self.ttl,
            format!("{tenant_id}:{group_id}"),
            || self.inner.ring_group(tenant_id, group_id),
        )
        .await
    }

    async fn business_hours(
        &self,
        tenant_id: &TenantId,
        schedule_id: &ScheduleId,
    ) -> Result<Option<BusinessHoursConfig>, RouterError> {
        Self::cached(
            &self.schedules,
            self.ttl,
            format!("{tenant_id}:{schedule_id}"),
            || self.inner.business_hours(tenant_id, schedule_id),
        )
        .await
    }
}

/// Collect the ring-group and schedule references of a target tree.
fn collect_refs(
    target: &RoutingTarget,
    depth: u8,
    groups: &mut Vec<RingGroupId>,
    schedules: &mut Vec<ScheduleId>,
) {
    // Depth guard mirrors the engine's; anything deeper resolves to
    // busy there anyway.
    if depth > crate::routing::engine::MAX_TARGET_DEPTH {
        return;
    }
    match target {
        RoutingTarget::Extension { .. } | RoutingTarget::Terminal { .. } => {}
        RoutingTarget::RingGroup { group_id } => groups.push(*group_id),
        RoutingTarget::BusinessHours {
            schedule_id,
            open,
            closed,
        } => {
            schedules.push(*schedule_id);
            collect_refs(open, depth + 1, groups, schedules);
            collect_refs(closed, depth + 1, groups, schedules);
        }
    }
}

/// Assemble the immutable snapshot for one routing decision.
///
/// # Errors
///
/// Propagates transient reader errors; missing referenced entities
/// are left out of the snapshot and degrade to busy in the engine.
pub async fn load_snapshot(
    reader: &dyn RoutingConfigReader,
    did: &Did,
) -> Result<TenantRoutingSnapshot, RouterError> {
    let Some(routing) = reader.did_routing(did).await? else {
        return Ok(TenantRoutingSnapshot::default());
    };

    let mut group_ids = Vec::new();
    let mut schedule_ids = Vec::new();
    collect_refs(&routing.target, 0, &mut group_ids, &mut schedule_ids);

    let mut snapshot = TenantRoutingSnapshot {
        did_routing: Some(routing.clone()),
        ..TenantRoutingSnapshot::default()
    };

    for group_id in group_ids {
        if let Some(group) = reader.ring_group(&routing.tenant_id, &group_id).await? {
            snapshot.ring_groups.insert(group_id, group);
        }
    }
    for schedule_id in schedule_ids {
        if let Some(schedule) = reader
            .business_hours(&routing.tenant_id, &schedule_id)
            .await?
        {
            snapshot.schedules.insert(schedule_id, schedule);
        }
    }

    Ok(snapshot)
}
