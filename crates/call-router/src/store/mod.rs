//! Shared-store backends.
//!
//! The trait lives in `common::store`; this module provides the Redis
//! production implementation. Tests use the in-memory double from
//! `router-test-utils`.

pub mod lua_scripts;
pub mod redis;

pub use redis::RedisStore;
