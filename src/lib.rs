//! Facade crate for the Timberline field-data synchronization engine.
//!
//! This crate re-exports the core domain types and exposes the SQLite-backed
//! geodatabase store behind a feature flag.

#![forbid(unsafe_code)]

pub use timberline_core::{
    ActivityDraft, ActivityRecord, Attributes, ChemicalDraft, ChemicalRecord, CodedDomain,
    CodedDomainError, CodedValue, CorrelationKey, CorrelationKeyError, DomainKind, LinkTarget,
    LinkTargetError, MobileActivity, MobileActivityError, MobileChemical, ObjectId, Property,
    Stand,
};

#[cfg(feature = "store-sqlite")]
pub use timberline_core::store::{
    DatasetKind, DomainRecord, EditOperation, Geodatabase, GeodatabaseError, RelationshipClass,
    RelationshipKeying,
};
