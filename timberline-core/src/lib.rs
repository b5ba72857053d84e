//! Core domain types for the Timberline synchronization engine.
//!
//! These models describe field-collected survey rows, the authoritative
//! datasets they reconcile into, and the coded-value domains enforced on
//! their attribute fields. Constructors return `Result` to surface invalid
//! input early, before it reaches the store.

#![forbid(unsafe_code)]

mod activity;
mod chemical;
mod domain;
mod key;
mod parcel;

#[cfg(feature = "store-sqlite")]
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use activity::{
    ActivityDraft, ActivityRecord, Attributes, LinkTarget, LinkTargetError, MobileActivity,
    MobileActivityError,
};
pub use chemical::{ChemicalDraft, ChemicalRecord, MobileChemical};
pub use domain::{CodedDomain, CodedDomainError, CodedValue, DomainKind, DomainKindError};
pub use key::{CorrelationKey, CorrelationKeyError};
pub use parcel::{Property, Stand};

/// Platform-assigned integer identifier for a row in a dataset.
pub type ObjectId = i64;
