//! Coded-value domains: the code→description mappings enforced on attribute
//! fields and surfaced as drop-down lists by mobile collection forms.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Value type of a coded-value domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DomainKind {
    /// Codes are free text.
    Text,
    /// Codes must parse as integers.
    Integer,
}

/// Errors returned when parsing a [`DomainKind`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainKindError {
    /// The value named no known kind.
    #[error("unknown domain kind {value:?}")]
    Unknown {
        /// The rejected value.
        value: String,
    },
}

impl DomainKind {
    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
        }
    }
}

impl FromStr for DomainKind {
    type Err = DomainKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "integer" => Ok(Self::Integer),
            other => Err(DomainKindError::Unknown {
                value: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One code→description pair.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodedValue {
    /// The stored code.
    pub code: String,
    /// Human-readable description shown in forms.
    pub description: String,
}

impl CodedValue {
    /// Convenience constructor.
    #[must_use]
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }
}

/// A validated coded-value domain ready to replace a stored one.
///
/// Replacement is wholesale: the stored domain's values become exactly this
/// domain's values, making the operation idempotent. An empty value set is
/// rejected here rather than at the store, because replacing a typed domain
/// with an empty table would lose its value type.
///
/// # Examples
///
/// ```
/// use timberline_core::{CodedDomain, CodedValue, DomainKind};
///
/// let domain = CodedDomain::new(
///     "act_status",
///     DomainKind::Text,
///     vec![CodedValue::new("P", "Planned"), CodedValue::new("C", "Complete")],
/// )?;
/// assert_eq!(domain.description_of("P"), Some("Planned"));
/// # Ok::<(), timberline_core::CodedDomainError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedDomain {
    name: String,
    kind: DomainKind,
    values: Vec<CodedValue>,
}

/// Errors returned by [`CodedDomain::new`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodedDomainError {
    /// No coded values were supplied.
    #[error("domain {name:?} has no coded values")]
    Empty {
        /// Name of the rejected domain.
        name: String,
    },
    /// An integer domain carried a code that does not parse as an integer.
    #[error("domain {name:?} is integer-coded but contains code {code:?}")]
    NonNumericCode {
        /// Name of the rejected domain.
        name: String,
        /// The offending code.
        code: String,
    },
    /// The same code appeared more than once.
    #[error("domain {name:?} contains duplicate code {code:?}")]
    DuplicateCode {
        /// Name of the rejected domain.
        name: String,
        /// The repeated code.
        code: String,
    },
}

impl CodedDomain {
    /// Validates and constructs a domain.
    pub fn new(
        name: impl Into<String>,
        kind: DomainKind,
        values: Vec<CodedValue>,
    ) -> Result<Self, CodedDomainError> {
        let name = name.into();
        if values.is_empty() {
            return Err(CodedDomainError::Empty { name });
        }
        if kind == DomainKind::Integer
            && let Some(bad) = values.iter().find(|v| v.code.parse::<i64>().is_err())
        {
            return Err(CodedDomainError::NonNumericCode {
                name,
                code: bad.code.clone(),
            });
        }
        let mut seen = std::collections::BTreeSet::new();
        if let Some(dup) = values.iter().find(|v| !seen.insert(v.code.as_str())) {
            return Err(CodedDomainError::DuplicateCode {
                name,
                code: dup.code.clone(),
            });
        }
        Ok(Self { name, kind, values })
    }

    /// Domain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value type of the codes.
    #[must_use]
    pub const fn kind(&self) -> DomainKind {
        self.kind
    }

    /// The coded values, in table order.
    #[must_use]
    pub fn values(&self) -> &[CodedValue] {
        &self.values
    }

    /// Look up the description for a code.
    #[must_use]
    pub fn description_of(&self, code: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.code == code)
            .map(|v| v.description.as_str())
    }
}
