//! Management-activity rows in their three lifecycle shapes: field-collected
//! staging rows, insertable drafts, and authoritative records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use geo::Polygon;
use thiserror::Error;
use uuid::Uuid;

use crate::{CorrelationKey, ObjectId};

/// Free-form survey attributes carried across dataset copies.
///
/// Copying a row between datasets copies this map wholesale; platform-managed
/// columns (object ids, global ids, geometry) are never part of it.
pub type Attributes = BTreeMap<String, String>;

/// Which parent a mobile activity links to.
///
/// The two variants select disjoint reconciliation flows: property-linked
/// rows inherit their property's boundary, stand-linked rows inherit the
/// stand's geometry and trigger a per-row overlay computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LinkTarget {
    /// Linked directly to a property parcel.
    Property,
    /// Linked to a stand subdividing a property.
    Stand,
}

/// Errors returned when parsing a [`LinkTarget`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkTargetError {
    /// The flag value was not one of the recognised targets.
    #[error("unknown link target {value:?}; expected \"prop\" or \"stand\"")]
    Unknown {
        /// The rejected flag value.
        value: String,
    },
}

impl LinkTarget {
    /// Wire value used by the mobile datasets.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Property => "prop",
            Self::Stand => "stand",
        }
    }
}

impl FromStr for LinkTarget {
    type Err = LinkTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prop" => Ok(Self::Property),
            "stand" => Ok(Self::Stand),
            other => Err(LinkTargetError::Unknown {
                value: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field-collected activity awaiting reconciliation.
///
/// # Examples
///
/// ```
/// use timberline_core::{Attributes, CorrelationKey, LinkTarget, MobileActivity};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let key: CorrelationKey = "A1".parse()?;
/// let row = MobileActivity::new(10, key, LinkTarget::Stand, None, Some(5), Attributes::new())?;
/// assert_eq!(row.stand_id, Some(5));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MobileActivity {
    /// Identifier assigned by the staging dataset.
    pub object_id: ObjectId,
    /// Client-generated key repeated on dependent chemical rows.
    pub parent_key: CorrelationKey,
    /// Which parent the row links to.
    pub link: LinkTarget,
    /// Object id of the linked property, when property-linked.
    pub property_id: Option<ObjectId>,
    /// Object id of the linked stand, when stand-linked.
    pub stand_id: Option<ObjectId>,
    /// Free-form survey attributes.
    pub attributes: Attributes,
}

/// Errors returned by [`MobileActivity::new`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MobileActivityError {
    /// A property-linked row carried no property id.
    #[error("property-linked activity {object_id} has no property id")]
    MissingPropertyId {
        /// Staging object id of the offending row.
        object_id: ObjectId,
    },
    /// A stand-linked row carried no stand id.
    #[error("stand-linked activity {object_id} has no stand id")]
    MissingStandId {
        /// Staging object id of the offending row.
        object_id: ObjectId,
    },
}

impl MobileActivity {
    /// Validates and constructs a mobile activity row.
    pub fn new(
        object_id: ObjectId,
        parent_key: CorrelationKey,
        link: LinkTarget,
        property_id: Option<ObjectId>,
        stand_id: Option<ObjectId>,
        attributes: Attributes,
    ) -> Result<Self, MobileActivityError> {
        match link {
            LinkTarget::Property if property_id.is_none() => {
                return Err(MobileActivityError::MissingPropertyId { object_id });
            }
            LinkTarget::Stand if stand_id.is_none() => {
                return Err(MobileActivityError::MissingStandId { object_id });
            }
            _ => {}
        }
        Ok(Self {
            object_id,
            parent_key,
            link,
            property_id,
            stand_id,
            attributes,
        })
    }

    /// Copy the shared fields into an insertable draft.
    ///
    /// Mirrors a field-mapped append: keys, link flags, and the attribute
    /// map carry over; platform-managed columns and geometry stay unset.
    #[must_use]
    pub fn to_draft(&self) -> ActivityDraft {
        ActivityDraft {
            parent_key: self.parent_key.clone(),
            link: self.link,
            property_id: self.property_id,
            stand_id: self.stand_id,
            property_global_id: None,
            boundary: None,
            attributes: self.attributes.clone(),
        }
    }
}

/// An activity row ready for insertion, before the store assigns ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityDraft {
    /// Client-generated key carried over from the mobile row.
    pub parent_key: CorrelationKey,
    /// Which parent the row links to.
    pub link: LinkTarget,
    /// Object id of the linked property, when property-linked.
    pub property_id: Option<ObjectId>,
    /// Object id of the linked stand, when stand-linked.
    pub stand_id: Option<ObjectId>,
    /// Denormalized global id of the linked property.
    pub property_global_id: Option<Uuid>,
    /// Geometry copied from the linked parcel.
    pub boundary: Option<Polygon<f64>>,
    /// Free-form survey attributes.
    pub attributes: Attributes,
}

/// An authoritative activity row with platform-assigned identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    /// Platform-assigned object id.
    pub object_id: ObjectId,
    /// Platform-assigned stable identifier.
    pub global_id: Uuid,
    /// Correlation key of the originating mobile row, when synced from one.
    pub parent_key: Option<CorrelationKey>,
    /// Which parent the row links to, when known.
    pub link: Option<LinkTarget>,
    /// Object id of the linked property.
    pub property_id: Option<ObjectId>,
    /// Object id of the linked stand.
    pub stand_id: Option<ObjectId>,
    /// Denormalized global id of the linked property.
    pub property_global_id: Option<Uuid>,
    /// Row geometry.
    pub boundary: Option<Polygon<f64>>,
    /// Free-form survey attributes.
    pub attributes: Attributes,
}
