//! Spatial parcels: properties and the stands subdividing them.

use geo::Polygon;
use uuid::Uuid;

use crate::ObjectId;

/// A managed property parcel, root of the activity hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Platform-assigned object id.
    pub object_id: ObjectId,
    /// Platform-assigned stable identifier.
    pub global_id: Uuid,
    /// Display name.
    pub name: String,
    /// Parcel boundary.
    pub boundary: Polygon<f64>,
}

/// A stand polygon subdividing a property.
#[derive(Debug, Clone, PartialEq)]
pub struct Stand {
    /// Platform-assigned object id.
    pub object_id: ObjectId,
    /// Object id of the containing property.
    pub property_id: ObjectId,
    /// Stand geometry.
    pub boundary: Polygon<f64>,
}
