//! Call router configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP bind address for the webhook and health endpoints.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default idempotency record retention in seconds.
///
/// Must cover the telephony platform's documented retry window; a
/// record expiring earlier is an accepted risk, not a correctness
/// violation, because state transitions are independently idempotent.
pub const DEFAULT_IDEMPOTENCY_TTL_SECONDS: u64 = 3600;

/// Default per-call lock TTL in milliseconds.
pub const DEFAULT_LOCK_TTL_MS: u64 = 5000;

/// Default bounded wait for lock acquisition in milliseconds.
pub const DEFAULT_LOCK_ACQUIRE_TIMEOUT_MS: u64 = 2000;

/// Default ring timeout in seconds when a target does not configure
/// its own.
pub const DEFAULT_RING_TIMEOUT_SECONDS: u32 = 20;

/// Default routing-snapshot cache TTL in seconds (bounded staleness;
/// routing config changes are tenant-initiated and rare).
pub const DEFAULT_SNAPSHOT_CACHE_TTL_SECONDS: u64 = 30;

/// Default channel for published lifecycle events.
pub const DEFAULT_CALL_EVENTS_CHANNEL: &str = "switchyard:call-events";

/// Default TTL for an active call's state in seconds.
pub const DEFAULT_CALL_STATE_TTL_SECONDS: u64 = 14_400;

/// Default grace period for terminal call state in seconds.
pub const DEFAULT_CALL_STATE_GRACE_SECONDS: u64 = 300;

/// Default bounded send for event publishing in milliseconds.
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 250;

/// Default router instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "router";

/// Call router configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// Shared store connection URL (idempotency, locks, call state).
    /// Protected by `SecretString` to prevent accidental logging.
    pub redis_url: SecretString,

    /// Control-plane base URL for the routing config reader.
    pub control_plane_url: String,

    /// Bearer credential for control-plane reads.
    /// Protected by `SecretString` to prevent accidental logging.
    pub control_plane_token: SecretString,

    /// HTTP bind address for webhook and health endpoints
    /// (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Unique identifier for this router instance (lock holder
    /// attribution).
    pub instance_id: String,

    /// Idempotency record retention in seconds.
    pub idempotency_ttl_seconds: u64,

    /// Per-call lock TTL in milliseconds.
    pub lock_ttl_ms: u64,

    /// Bounded wait for lock acquisition in milliseconds.
    pub lock_acquire_timeout_ms: u64,

    /// Ring timeout applied when a target has none configured.
    pub default_ring_timeout_seconds: u32,

    /// Routing-snapshot cache TTL in seconds.
    pub snapshot_cache_ttl_seconds: u64,

    /// Channel name for published lifecycle events.
    pub call_events_channel: String,

    /// TTL for an active call's state in seconds.
    pub call_state_ttl_seconds: u64,

    /// Grace period before terminal call state is dropped, in seconds.
    pub call_state_grace_seconds: u64,

    /// Bounded send for event publishing in milliseconds.
    pub publish_timeout_ms: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("control_plane_url", &self.control_plane_url)
            .field("control_plane_token", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("instance_id", &self.instance_id)
            .field("idempotency_ttl_seconds", &self.idempotency_ttl_seconds)
            .field("lock_ttl_ms", &self.lock_ttl_ms)
            .field("lock_acquire_timeout_ms", &self.lock_acquire_timeout_ms)
            .field(
                "default_ring_timeout_seconds",
                &self.default_ring_timeout_seconds,
            )
            .field(
                "snapshot_cache_ttl_seconds",
                &self.snapshot_cache_ttl_seconds,
            )
            .field("call_events_channel", &self.call_events_channel)
            .field("call_state_ttl_seconds", &self.call_state_ttl_seconds)
            .field("call_state_grace_seconds", &self.call_state_grace_seconds)
            .field("publish_timeout_ms", &self.publish_timeout_ms)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?
                .clone(),
        );

        let control_plane_url = vars
            .get("CONTROL_PLANE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("CONTROL_PLANE_URL".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let control_plane_token = SecretString::from(
            vars.get("CONTROL_PLANE_TOKEN")
                .ok_or_else(|| ConfigError::MissingEnvVar("CONTROL_PLANE_TOKEN".to_string()))?
                .clone(),
        );

        let bind_address = vars
            .get("ROUTER_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let idempotency_ttl_seconds = vars
            .get("IDEMPOTENCY_TTL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_IDEMPOTENCY_TTL_SECONDS);

        let lock_ttl_ms = vars
            .get("LOCK_TTL_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_LOCK_TTL_MS);

        let lock_acquire_timeout_ms = vars
            .get("LOCK_ACQUIRE_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_LOCK_ACQUIRE_TIMEOUT_MS);

        let default_ring_timeout_seconds = vars
            .get("DEFAULT_RING_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RING_TIMEOUT_SECONDS);

        let snapshot_cache_ttl_seconds = vars
            .get("SNAPSHOT_CACHE_TTL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SNAPSHOT_CACHE_TTL_SECONDS);

        let call_events_channel = vars
            .get("CALL_EVENTS_CHANNEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CALL_EVENTS_CHANNEL.to_string());

        let call_state_ttl_seconds = vars
            .get("CALL_STATE_TTL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CALL_STATE_TTL_SECONDS);

        let call_state_grace_seconds = vars
            .get("CALL_STATE_GRACE_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CALL_STATE_GRACE_SECONDS);

        let publish_timeout_ms = vars
            .get("PUBLISH_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PUBLISH_TIMEOUT_MS);

        if lock_ttl_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "LOCK_TTL_MS must be greater than zero".to_string(),
            ));
        }

        // Generate router instance ID
        let instance_id = vars.get("ROUTER_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            redis_url,
            control_plane_url,
            control_plane_token,
            bind_address,
            instance_id,
            idempotency_ttl_seconds,
            lock_ttl_ms,
            lock_acquire_timeout_ms,
            default_ring_timeout_seconds,
            snapshot_cache_ttl_seconds,
            call_events_channel,
            call_state_ttl_seconds,
            call_state_grace_seconds,
            publish_timeout_ms,
        })
    }
}
