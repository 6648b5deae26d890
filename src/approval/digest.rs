// ABOUTME: Keyed HMAC-SHA256 digests of approval tokens.
// ABOUTME: Lookups go by digest; the final comparison is constant time.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

use super::TokenError;
use super::token::{ApprovalToken, token_prefix};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded digest stored on a deployment record.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenDigest(String);

impl TokenDigest {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TokenDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenDigest({}…)", token_prefix(&self.0))
    }
}

/// Computes and checks token digests with the configured secret.
#[derive(Clone)]
pub struct TokenDigester {
    mac: HmacSha256,
}

impl fmt::Debug for TokenDigester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenDigester { .. }")
    }
}

impl TokenDigester {
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| TokenError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    pub fn digest(&self, token: &str) -> TokenDigest {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        TokenDigest(hex::encode(mac.finalize().into_bytes()))
    }

    /// Mint a fresh token together with its digest.
    pub fn mint(&self) -> (ApprovalToken, TokenDigest) {
        let token = ApprovalToken::generate();
        let digest = self.digest(token.expose());
        (token, digest)
    }

    /// Constant-time check of a presented token against a stored digest.
    pub fn verify(&self, presented: &str, stored: &TokenDigest) -> bool {
        let computed = self.digest(presented);
        computed.0.as_bytes().ct_eq(stored.0.as_bytes()).into()
    }
}
