//! HTTP handlers for the call router.

pub mod webhook;

pub use webhook::{handle_webhook, WebhookReply};
