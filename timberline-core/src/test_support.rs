//! Shared fixtures for store and engine tests.

use geo::{LineString, Polygon};
use uuid::Uuid;

use crate::{ObjectId, Property, Stand};

/// A small square polygon offset by `seed`, so distinct seeds yield
/// distinct geometries.
#[must_use]
pub fn sample_polygon(seed: ObjectId) -> Polygon<f64> {
    #[expect(clippy::cast_precision_loss, reason = "test seeds are tiny")]
    let offset = seed as f64;
    Polygon::new(
        LineString::from(vec![
            (offset, offset),
            (offset + 1.0, offset),
            (offset + 1.0, offset + 1.0),
            (offset, offset + 1.0),
            (offset, offset),
        ]),
        vec![],
    )
}

/// A property with a deterministic boundary and a fresh global id.
#[must_use]
pub fn sample_property(object_id: ObjectId, name: &str) -> Property {
    Property {
        object_id,
        global_id: Uuid::new_v4(),
        name: name.to_owned(),
        boundary: sample_polygon(object_id),
    }
}

/// A stand with a deterministic boundary distinct from its property's.
#[must_use]
pub fn sample_stand(object_id: ObjectId, property_id: ObjectId) -> Stand {
    Stand {
        object_id,
        property_id,
        boundary: sample_polygon(object_id + 100),
    }
}
