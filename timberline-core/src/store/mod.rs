//! The geodatabase store: feature datasets, coded-value domains, subtypes,
//! relationship classes, and explicit edit operations.
//!
//! Dataset names are supplied by configuration and validated as identifiers
//! before they are spliced into SQL. One connection per run; all calls are
//! blocking.

use std::fmt;
use std::str::FromStr;

use crate::{CodedValue, DomainKind};

mod catalog;
mod records;
mod sqlite;

pub use sqlite::{EditOperation, Geodatabase, GeodatabaseError};

/// Schema shapes the store can provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// Property parcels.
    Property,
    /// Stands subdividing properties.
    Stand,
    /// Authoritative activities.
    Activity,
    /// Intermediate activity staging.
    ActivityStaging,
    /// Field-collected activity copies.
    MobileActivity,
    /// Authoritative chemical applications.
    Chemical,
    /// Intermediate chemical staging.
    ChemicalStaging,
    /// Field-collected chemical copies.
    MobileChemical,
    /// Harvest units.
    Harvest,
    /// Optional products recorded against harvest units.
    HarvestProduct,
    /// Special-feature points.
    SpecialPoint,
    /// Special-feature lines.
    SpecialLine,
    /// Special-feature polygons.
    SpecialPolygon,
}

impl DatasetKind {
    /// Column definitions for the kind, without the surrounding
    /// `CREATE TABLE`.
    #[must_use]
    pub(crate) const fn columns_sql(self) -> &'static str {
        match self {
            Self::Property => {
                "object_id INTEGER PRIMARY KEY,
                 global_id TEXT NOT NULL UNIQUE,
                 name TEXT NOT NULL DEFAULT '',
                 boundary TEXT NOT NULL"
            }
            // Stands arrive from the source system without global ids; the
            // setup sequence adds the column.
            Self::Stand => {
                "object_id INTEGER PRIMARY KEY,
                 property_id INTEGER NOT NULL,
                 boundary TEXT NOT NULL"
            }
            Self::Activity => {
                "object_id INTEGER PRIMARY KEY AUTOINCREMENT,
                 global_id TEXT NOT NULL UNIQUE,
                 parent_key TEXT,
                 link TEXT,
                 property_id INTEGER,
                 stand_id INTEGER,
                 property_global_id TEXT,
                 boundary TEXT,
                 attributes TEXT NOT NULL DEFAULT '{}'"
            }
            Self::ActivityStaging => {
                "parent_key TEXT NOT NULL,
                 link TEXT NOT NULL,
                 property_id INTEGER,
                 stand_id INTEGER,
                 property_global_id TEXT,
                 boundary TEXT,
                 attributes TEXT NOT NULL DEFAULT '{}'"
            }
            Self::MobileActivity => {
                "object_id INTEGER PRIMARY KEY,
                 parent_key TEXT NOT NULL,
                 link TEXT NOT NULL,
                 property_id INTEGER,
                 stand_id INTEGER,
                 attributes TEXT NOT NULL DEFAULT '{}'"
            }
            Self::Chemical => {
                "object_id INTEGER PRIMARY KEY AUTOINCREMENT,
                 global_id TEXT NOT NULL UNIQUE,
                 child_key TEXT,
                 activity_id INTEGER,
                 activity_global_id TEXT,
                 context_id INTEGER NOT NULL DEFAULT 0,
                 attributes TEXT NOT NULL DEFAULT '{}'"
            }
            Self::ChemicalStaging => {
                "child_key TEXT,
                 context_id INTEGER NOT NULL DEFAULT 0,
                 attributes TEXT NOT NULL DEFAULT '{}'"
            }
            Self::MobileChemical => {
                "object_id INTEGER PRIMARY KEY,
                 child_key TEXT NOT NULL,
                 context_id INTEGER NOT NULL DEFAULT 0,
                 attributes TEXT NOT NULL DEFAULT '{}'"
            }
            Self::Harvest => {
                "object_id INTEGER PRIMARY KEY AUTOINCREMENT,
                 global_id TEXT,
                 boundary TEXT,
                 attributes TEXT NOT NULL DEFAULT '{}'"
            }
            Self::HarvestProduct => {
                "object_id INTEGER PRIMARY KEY AUTOINCREMENT,
                 global_id TEXT,
                 harvest_id INTEGER,
                 attributes TEXT NOT NULL DEFAULT '{}'"
            }
            Self::SpecialPoint | Self::SpecialLine | Self::SpecialPolygon => {
                "object_id INTEGER PRIMARY KEY AUTOINCREMENT,
                 global_id TEXT,
                 kind TEXT,
                 boundary TEXT,
                 attributes TEXT NOT NULL DEFAULT '{}'"
            }
        }
    }
}

/// How a relationship class matches origin rows to destination rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKeying {
    /// Keyed by the named attribute columns.
    Attribute,
    /// Keyed by platform global ids (the migrated form).
    GlobalId,
}

impl RelationshipKeying {
    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attribute => "attribute",
            Self::GlobalId => "global_id",
        }
    }
}

impl FromStr for RelationshipKeying {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attribute" => Ok(Self::Attribute),
            "global_id" => Ok(Self::GlobalId),
            other => Err(other.to_owned()),
        }
    }
}

impl fmt::Display for RelationshipKeying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A one-to-many relationship class between two datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipClass {
    /// Relationship class name.
    pub name: String,
    /// Origin dataset.
    pub origin: String,
    /// Destination dataset.
    pub destination: String,
    /// Key column on the origin dataset.
    pub origin_key: String,
    /// Matching column on the destination dataset.
    pub foreign_key: String,
    /// How rows are matched.
    pub keyed_by: RelationshipKeying,
}

/// A stored coded-value domain as read back from the store.
///
/// Unlike [`crate::CodedDomain`], a stored domain may be empty: setup
/// pre-creates typed shells before the first population.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRecord {
    /// Domain name.
    pub name: String,
    /// Value type of the codes.
    pub kind: DomainKind,
    /// The coded values, in table order.
    pub values: Vec<CodedValue>,
}
