// ABOUTME: Random approval token returned once to the caller that created a deployment.
// ABOUTME: Wrapped in a secret type so it never lands in logs or serialized output.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Length of every minted token.
pub const TOKEN_LENGTH: usize = 64;

/// Plaintext approval token. Deliberately neither `Clone` nor `Serialize`.
pub struct ApprovalToken(SecretString);

impl ApprovalToken {
    pub fn generate() -> Self {
        let raw: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();
        Self(SecretString::from(raw))
    }

    /// The plaintext, for handing to the approver.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn prefix(&self) -> &str {
        token_prefix(self.expose())
    }
}

impl fmt::Debug for ApprovalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApprovalToken({}…)", self.prefix())
    }
}

/// First eight characters of a presented token, safe for logs.
pub fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}
