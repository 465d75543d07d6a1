//! CXML response builder.
//!
//! Renders a routing outcome into the call-control document the
//! telephony platform executes. Pure functions, no I/O. All
//! caller-controlled and config-controlled text is escaped for XML.
//!
//! The engine only emits outcomes the builder supports; an
//! unexpressible outcome (a ring cursor past the member list) is a
//! programming error between engine and builder and surfaces as a
//! fatal [`RouterError::UnsupportedOutcome`].

use crate::errors::RouterError;
use crate::routing::{FallbackAction, RingStrategy, RoutingOutcome};
use common::types::ExtensionId;
use std::fmt::Write;

/// Content type of rendered documents.
pub const CONTENT_TYPE: &str = "application/xml";

const HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Escape text for XML content and attribute values.
fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the document for a routing outcome.
///
/// `ring_cursor` selects the member of a sequential or round-robin
/// ring group for this attempt; it is ignored by every other
/// variant.
///
/// # Errors
///
/// `RouterError::UnsupportedOutcome` when the cursor points past the
/// member list (a logic gap upstream, not a user-facing failure).
pub fn render(outcome: &RoutingOutcome, ring_cursor: usize) -> Result<String, RouterError> {
    match outcome {
        RoutingOutcome::DirectExtension {
            extension,
            timeout_seconds,
            ..
        } => Ok(render_dial(&[extension.clone()], *timeout_seconds)),
        RoutingOutcome::RingGroup {
            strategy,
            members,
            per_member_timeout_seconds,
            ..
        } => match strategy {
            RingStrategy::Simultaneous => {
                Ok(render_dial(members, *per_member_timeout_seconds))
            }
            RingStrategy::Sequential | RingStrategy::RoundRobin => {
                let member = members.get(ring_cursor).ok_or_else(|| {
                    RouterError::UnsupportedOutcome(format!(
                        "ring cursor {ring_cursor} past {} members",
                        members.len()
                    ))
                })?;
                Ok(render_dial(std::slice::from_ref(member), *per_member_timeout_seconds))
            }
        },
        RoutingOutcome::Fallback { action } => Ok(render_fallback(action)),
    }
}

/// One `<Dial>` with a `<Client>` noun per member; the platform rings
/// all nouns at once and the first answer wins.
fn render_dial(members: &[ExtensionId], timeout_seconds: u32) -> String {
    let mut doc = String::from(HEADER);
    doc.push_str("<Response>");
    let _ = write!(doc, "<Dial timeout=\"{timeout_seconds}\">");
    for member in members {
        let _ = write!(doc, "<Client>{}</Client>", xml_escape(member.as_str()));
    }
    doc.push_str("</Dial>");
    doc.push_str("</Response>");
    doc
}

/// Terminal document for a fallback action.
fn render_fallback(action: &FallbackAction) -> String {
    let mut doc = String::from(HEADER);
    doc.push_str("<Response>");
    match action {
        FallbackAction::Voicemail { mailbox } => {
            let _ = write!(
                doc,
                "<Redirect method=\"POST\">/voicemail/{}</Redirect>",
                xml_escape(mailbox)
            );
        }
        FallbackAction::Busy => {
            doc.push_str("<Reject reason=\"busy\"/>");
        }
        FallbackAction::Hangup => {
            doc.push_str("<Hangup/>");
        }
    }
    doc.push_str("</Response>");
    doc
}
