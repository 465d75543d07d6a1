//! Health endpoints and metrics helpers.

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
