// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validated user identity.
//!
//! A [`UserId`] is the registry key for a worker and, when isolation is
//! enabled, the name of the OS principal the worker process runs as. It is
//! validated at construction so nothing malformed ever reaches the registry
//! or a spawn call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from identifier validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The supplied username contains characters outside `[A-Za-z0-9_-]`
    /// or is empty.
    #[error("invalid characters in username: {0:?}")]
    InvalidIdentifier(String),
}

/// An externally supplied username, validated against `^[A-Za-z0-9_-]+$`.
///
/// Construction via [`UserId::parse`] is the only validation point.
/// Deserialization goes through the same check, so a `UserId` arriving over
/// the wire carries the same guarantee as one built locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a username.
    pub fn parse(s: impl Into<String>) -> Result<Self, IdentityError> {
        let s = s.into();
        if is_valid_username(&s) {
            Ok(Self(s))
        } else {
            Err(IdentityError::InvalidIdentifier(s))
        }
    }

    /// Get the string value of this UserId.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_username(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdentityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for UserId {
    type Error = IdentityError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl PartialEq<str> for UserId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for UserId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::borrow::Borrow<str> for UserId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "user_tests.rs"]
mod tests;
