//! Call Router Service Library
//!
//! The execution plane of the Switchyard multi-tenant business PBX.
//! Reacts to webhook events from the telephony platform and answers
//! with CXML routing documents, correct under duplicate delivery,
//! out-of-order delivery, and concurrent events for the same call:
//!
//! - Webhook event normalization at the transport boundary
//! - Idempotency enforcement with a bounded-retention dedup cache
//! - Distributed per-call locking (the only serialization point)
//! - A call lifecycle state machine with idempotent transitions
//! - A deterministic routing decision engine (direct extension, ring
//!   group, business-hours gated)
//! - A pure CXML response builder
//! - Fire-and-forget lifecycle event publishing
//!
//! # Key Design Decisions
//!
//! - **One shared store, no coordinator**: idempotency records, locks,
//!   and call state live in Redis; router instances are otherwise
//!   stateless and fully parallel.
//! - **Outcome immutability**: the routing chosen at initiation is
//!   stored and replayed; retries can never reroute a live call.
//! - **Deterministic decisions**: the same DID, snapshot, and instant
//!   always produce the same outcome, so even a lost dedup record
//!   recomputes identically.
//! - **Explicit tenancy**: a tenant identifier threads through every
//!   config read and state key; there is no implicit scoping.
//!
//! # Modules
//!
//! - [`event`] - Webhook payload normalization
//! - [`idempotency`] - Delivery dedup
//! - [`lock`] - Per-call mutual exclusion
//! - [`state_machine`] - Lifecycle transition table
//! - [`routing`] - Decision engine, schedules, config snapshots
//! - [`cxml`] - Response document builder
//! - [`publisher`] - Downstream lifecycle events
//! - [`upstream`] - Control-plane routing config reader
//! - [`store`] - Redis shared-store backend

pub mod call_state;
pub mod config;
pub mod cxml;
pub mod errors;
pub mod event;
pub mod handlers;
pub mod idempotency;
pub mod lock;
pub mod observability;
pub mod publisher;
pub mod routes;
pub mod routing;
pub mod state_machine;
pub mod store;
pub mod upstream;
