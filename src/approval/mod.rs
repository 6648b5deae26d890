// ABOUTME: Approval tokens: minting, keyed digests, and constant-time verification.
// ABOUTME: Plaintext tokens leave the process once; only digests are persisted.

mod digest;
mod token;

pub use digest::{TokenDigest, TokenDigester};
pub use token::{ApprovalToken, TOKEN_LENGTH, token_prefix};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("approval secret must not be empty")]
    EmptySecret,

    #[error("invalid approval key: {0}")]
    InvalidKey(String),
}

/// Whoever is approving, rejecting, or cancelling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Authenticated identity, if any.
    pub principal: Option<String>,
    /// Client network address.
    pub address: Option<String>,
}

impl Actor {
    pub fn principal(name: impl Into<String>) -> Self {
        Self {
            principal: Some(name.into()),
            address: None,
        }
    }

    /// Principal, else address, else `"unknown"`.
    pub fn identity(&self) -> String {
        [&self.principal, &self.address]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("unknown")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_prefers_principal_then_address() {
        let both = Actor {
            principal: Some("ops@example.com".into()),
            address: Some("10.0.0.1".into()),
        };
        assert_eq!(both.identity(), "ops@example.com");

        let address_only = Actor {
            principal: Some("  ".into()),
            address: Some("10.0.0.1".into()),
        };
        assert_eq!(address_only.identity(), "10.0.0.1");

        assert_eq!(Actor::default().identity(), "unknown");
    }
}
