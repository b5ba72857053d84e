//! Chemical-application rows: non-spatial children of activities.

use uuid::Uuid;

use crate::{Attributes, CorrelationKey, ObjectId};

/// A field-collected chemical application awaiting reconciliation.
///
/// The `child_key` repeats the parent activity's correlation key; once both
/// rows reach the authoritative datasets, the engine resolves it back to the
/// activity's platform identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct MobileChemical {
    /// Identifier assigned by the staging dataset.
    pub object_id: ObjectId,
    /// Correlation key of the parent activity.
    pub child_key: CorrelationKey,
    /// Operational context the row was captured under.
    pub context_id: i64,
    /// Free-form application attributes.
    pub attributes: Attributes,
}

impl MobileChemical {
    /// Copy the shared fields into an insertable draft.
    #[must_use]
    pub fn to_draft(&self) -> ChemicalDraft {
        ChemicalDraft {
            child_key: Some(self.child_key.clone()),
            context_id: self.context_id,
            attributes: self.attributes.clone(),
        }
    }
}

/// A chemical row ready for insertion, before the store assigns ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ChemicalDraft {
    /// Correlation key of the parent activity, when synced from the field.
    pub child_key: Option<CorrelationKey>,
    /// Operational context for the inserted row.
    pub context_id: i64,
    /// Free-form application attributes.
    pub attributes: Attributes,
}

/// An authoritative chemical row with platform-assigned identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChemicalRecord {
    /// Platform-assigned object id.
    pub object_id: ObjectId,
    /// Platform-assigned stable identifier.
    pub global_id: Uuid,
    /// Correlation key of the parent activity, when synced from the field.
    pub child_key: Option<CorrelationKey>,
    /// Backfilled object id of the parent activity.
    pub activity_id: Option<ObjectId>,
    /// Backfilled global id of the parent activity.
    pub activity_global_id: Option<Uuid>,
    /// Operational context of the row.
    pub context_id: i64,
    /// Free-form application attributes.
    pub attributes: Attributes,
}

impl ChemicalRecord {
    /// Whether the parent-activity foreign key has been backfilled.
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.activity_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn draft_keeps_key_and_context() {
        let row = MobileChemical {
            object_id: 4,
            child_key: "C9".parse().expect("valid key"),
            context_id: 12,
            attributes: Attributes::from([("chemical".to_owned(), "2,4-D".to_owned())]),
        };

        let draft = row.to_draft();
        assert_eq!(draft.child_key.as_ref().map(CorrelationKey::as_str), Some("C9"));
        assert_eq!(draft.context_id, 12);
        assert_eq!(draft.attributes, row.attributes);
    }
}
