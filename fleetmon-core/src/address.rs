//! Checksum addresses
//!
//! The unique identifier of a network peer, which is also the address of
//! the staker behind it.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Checksum address of a peer / staking participant
///
/// Always non-empty and free of whitespace, so it can be used verbatim as a
/// primary key and as a time-series tag value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChecksumAddress(String);

impl ChecksumAddress {
    /// Validate and wrap an address string
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() || value.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidAddress(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ChecksumAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChecksumAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ChecksumAddress {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ChecksumAddress> for String {
    fn from(address: ChecksumAddress) -> Self {
        address.0
    }
}

impl AsRef<str> for ChecksumAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
