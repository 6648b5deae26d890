// ABOUTME: Validated application key used to address configured apps.
// ABOUTME: Keys are lowercase identifiers safe for paths, logs, and lock names.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppKeyError {
    #[error("app key cannot be empty")]
    Empty,

    #[error("app key exceeds maximum length of 63 characters")]
    TooLong,

    #[error("app key cannot start with a hyphen or underscore")]
    BadStart,

    #[error("app key must be lowercase")]
    NotLowercase,

    #[error("invalid character in app key: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppKey(String);

impl AppKey {
    pub fn new(value: &str) -> Result<Self, AppKeyError> {
        if value.is_empty() {
            return Err(AppKeyError::Empty);
        }

        if value.len() > 63 {
            return Err(AppKeyError::TooLong);
        }

        if value.starts_with('-') || value.starts_with('_') {
            return Err(AppKeyError::BadStart);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(AppKeyError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' && c != '_' {
                return Err(AppKeyError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for AppKey {
    type Error = AppKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AppKey::new(&value)
    }
}

impl From<AppKey> for String {
    fn from(key: AppKey) -> Self {
        key.0
    }
}
