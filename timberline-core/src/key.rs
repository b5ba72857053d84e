//! Client-generated correlation keys.
//!
//! Field devices assign a key to every captured activity (`parent_key`) and
//! repeat it on dependent chemical rows (`child_key`) so the pair can be
//! re-associated after the authoritative store assigns real identifiers.
//! The append step does not return generated keys, so this is the only
//! durable link between a staged row and the row it becomes.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Opaque client-generated key correlating a staged row with the
/// authoritative row created from it.
///
/// Keys are compared verbatim; the engine never inspects their structure.
///
/// # Examples
///
/// ```
/// use timberline_core::CorrelationKey;
///
/// let key: CorrelationKey = "8f2e1f1c".parse()?;
/// assert_eq!(key.as_str(), "8f2e1f1c");
/// # Ok::<(), timberline_core::CorrelationKeyError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CorrelationKey(String);

/// Errors returned when parsing a [`CorrelationKey`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationKeyError {
    /// The key was empty or whitespace.
    #[error("correlation key must not be empty")]
    Empty,
}

impl CorrelationKey {
    /// Validates and constructs a key from raw text.
    pub fn new(value: impl Into<String>) -> Result<Self, CorrelationKeyError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(CorrelationKeyError::Empty);
        }
        Ok(Self(value))
    }

    /// The key's verbatim text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CorrelationKey {
    type Err = CorrelationKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
