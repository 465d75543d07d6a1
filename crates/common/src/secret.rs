//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate with
//! Switchyard-specific guidance. Use these types for all sensitive values:
//! store connection URLs with embedded credentials, control-plane bearer
//! tokens, and webhook signing secrets.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` while holding one gets safe logging behavior for free.
//! Secrets are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct UpstreamCredentials {
//!     base_url: String,
//!     bearer_token: SecretString,  // Debug shows "[REDACTED]"
//! }
//!
//! let creds = UpstreamCredentials {
//!     base_url: "https://control-plane.example.com".to_string(),
//!     bearer_token: SecretString::from("sw-token-123"),
//! };
//!
//! // Safe: bearer_token is redacted
//! println!("{:?}", creds);
//!
//! // Access requires an explicit expose_secret() call
//! let token: &str = creds.bearer_token.expose_secret();
//! ```

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("sw-token-123");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("sw-token-123"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("redis://:pw@localhost:6379");
        assert_eq!(secret.expose_secret(), "redis://:pw@localhost:6379");
    }

    #[test]
    fn test_struct_with_secret_is_safe() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct Credentials {
            name: String,
            token: SecretString,
        }

        let creds = Credentials {
            name: "control-plane".to_string(),
            token: SecretString::from("super-secret"),
        };

        let debug_str = format!("{creds:?}");

        assert!(debug_str.contains("control-plane"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("super-secret"));
    }
}
