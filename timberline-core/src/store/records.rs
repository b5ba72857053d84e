//! Row operations over the geodatabase datasets.
//!
//! Geometry and attribute maps are stored as JSON text columns; global ids
//! are assigned by the store at append time, which is why callers re-query
//! by correlation key to learn them.

use geo::Polygon;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::{
    ActivityDraft, ActivityRecord, Attributes, ChemicalDraft, ChemicalRecord, CorrelationKey,
    LinkTarget, MobileActivity, MobileChemical, ObjectId, Property, Stand,
};

use super::sqlite::{EditOperation, Geodatabase, GeodatabaseError, quoted};

impl Geodatabase {
    /// Insert a field-collected activity into a mobile staging dataset.
    pub fn insert_mobile_activity(
        &self,
        dataset: &str,
        row: &MobileActivity,
    ) -> Result<(), GeodatabaseError> {
        let table = quoted(dataset)?;
        let attributes = encode_attributes(dataset, &row.attributes)?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {table} \
                     (object_id, parent_key, link, property_id, stand_id, attributes) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    row.object_id,
                    row.parent_key.as_str(),
                    row.link.as_str(),
                    row.property_id,
                    row.stand_id,
                    attributes,
                ],
            )
            .map_err(|source| GeodatabaseError::Insert {
                dataset: dataset.to_owned(),
                source,
            })?;
        Ok(())
    }

    /// Read every field-collected activity from a mobile staging dataset.
    pub fn mobile_activities(
        &self,
        dataset: &str,
    ) -> Result<Vec<MobileActivity>, GeodatabaseError> {
        let table = quoted(dataset)?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT object_id, parent_key, link, property_id, stand_id, attributes \
                 FROM {table} ORDER BY object_id"
            ))
            .map_err(|source| GeodatabaseError::Query {
                dataset: dataset.to_owned(),
                source,
            })?;
        let mut rows = stmt.query([]).map_err(|source| GeodatabaseError::Query {
            dataset: dataset.to_owned(),
            source,
        })?;

        let mut activities = Vec::new();
        while let Some(row) = rows.next()? {
            let object_id: ObjectId = row.get(0)?;
            let parent_key = decode_key(dataset, object_id, row.get::<_, String>(1)?)?;
            let link = decode_link(dataset, object_id, &row.get::<_, String>(2)?)?;
            let property_id: Option<ObjectId> = row.get(3)?;
            let stand_id: Option<ObjectId> = row.get(4)?;
            let attributes = decode_attributes(dataset, object_id, &row.get::<_, String>(5)?)?;
            let activity =
                MobileActivity::new(object_id, parent_key, link, property_id, stand_id, attributes)
                    .map_err(|source| GeodatabaseError::InvalidMobileRow {
                        dataset: dataset.to_owned(),
                        object_id,
                        source,
                    })?;
            activities.push(activity);
        }
        Ok(activities)
    }

    /// Insert a field-collected chemical into a mobile staging dataset.
    pub fn insert_mobile_chemical(
        &self,
        dataset: &str,
        row: &MobileChemical,
    ) -> Result<(), GeodatabaseError> {
        let table = quoted(dataset)?;
        let attributes = encode_attributes(dataset, &row.attributes)?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {table} (object_id, child_key, context_id, attributes) \
                     VALUES (?1, ?2, ?3, ?4)"
                ),
                params![row.object_id, row.child_key.as_str(), row.context_id, attributes],
            )
            .map_err(|source| GeodatabaseError::Insert {
                dataset: dataset.to_owned(),
                source,
            })?;
        Ok(())
    }

    /// Read every field-collected chemical from a mobile staging dataset.
    pub fn mobile_chemicals(
        &self,
        dataset: &str,
    ) -> Result<Vec<MobileChemical>, GeodatabaseError> {
        let table = quoted(dataset)?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT object_id, child_key, context_id, attributes FROM {table} \
                 ORDER BY object_id"
            ))
            .map_err(|source| GeodatabaseError::Query {
                dataset: dataset.to_owned(),
                source,
            })?;
        let mut rows = stmt.query([]).map_err(|source| GeodatabaseError::Query {
            dataset: dataset.to_owned(),
            source,
        })?;

        let mut chemicals = Vec::new();
        while let Some(row) = rows.next()? {
            let object_id: ObjectId = row.get(0)?;
            chemicals.push(MobileChemical {
                object_id,
                child_key: decode_key(dataset, object_id, row.get::<_, String>(1)?)?,
                context_id: row.get(2)?,
                attributes: decode_attributes(dataset, object_id, &row.get::<_, String>(3)?)?,
            });
        }
        Ok(chemicals)
    }

    /// Insert a property parcel.
    pub fn insert_property(
        &self,
        dataset: &str,
        property: &Property,
    ) -> Result<(), GeodatabaseError> {
        let table = quoted(dataset)?;
        let boundary = encode_boundary(dataset, &property.boundary)?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {table} (object_id, global_id, name, boundary) \
                     VALUES (?1, ?2, ?3, ?4)"
                ),
                params![
                    property.object_id,
                    property.global_id.to_string(),
                    property.name,
                    boundary,
                ],
            )
            .map_err(|source| GeodatabaseError::Insert {
                dataset: dataset.to_owned(),
                source,
            })?;
        Ok(())
    }

    /// Look up a property parcel by object id.
    pub fn property(
        &self,
        dataset: &str,
        object_id: ObjectId,
    ) -> Result<Option<Property>, GeodatabaseError> {
        let table = quoted(dataset)?;
        let found = self
            .conn
            .query_row(
                &format!(
                    "SELECT object_id, global_id, name, boundary FROM {table} \
                     WHERE object_id = ?1"
                ),
                [object_id],
                |row| {
                    Ok((
                        row.get::<_, ObjectId>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|source| GeodatabaseError::Query {
                dataset: dataset.to_owned(),
                source,
            })?;

        found
            .map(|(id, global_id, name, boundary)| {
                Ok(Property {
                    object_id: id,
                    global_id: decode_uuid(dataset, id, &global_id)?,
                    name,
                    boundary: decode_boundary(dataset, id, &boundary)?,
                })
            })
            .transpose()
    }

    /// Insert a stand polygon.
    pub fn insert_stand(&self, dataset: &str, stand: &Stand) -> Result<(), GeodatabaseError> {
        let table = quoted(dataset)?;
        let boundary = encode_boundary(dataset, &stand.boundary)?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {table} (object_id, property_id, boundary) VALUES (?1, ?2, ?3)"
                ),
                params![stand.object_id, stand.property_id, boundary],
            )
            .map_err(|source| GeodatabaseError::Insert {
                dataset: dataset.to_owned(),
                source,
            })?;
        Ok(())
    }

    /// Look up a stand by object id.
    pub fn stand(
        &self,
        dataset: &str,
        object_id: ObjectId,
    ) -> Result<Option<Stand>, GeodatabaseError> {
        let table = quoted(dataset)?;
        let found = self
            .conn
            .query_row(
                &format!(
                    "SELECT object_id, property_id, boundary FROM {table} WHERE object_id = ?1"
                ),
                [object_id],
                |row| {
                    Ok((
                        row.get::<_, ObjectId>(0)?,
                        row.get::<_, ObjectId>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|source| GeodatabaseError::Query {
                dataset: dataset.to_owned(),
                source,
            })?;

        found
            .map(|(id, property_id, boundary)| {
                Ok(Stand {
                    object_id: id,
                    property_id,
                    boundary: decode_boundary(dataset, id, &boundary)?,
                })
            })
            .transpose()
    }

    /// Copy one draft into an intermediate activity staging dataset.
    pub fn stage_activity(
        &self,
        dataset: &str,
        draft: &ActivityDraft,
    ) -> Result<(), GeodatabaseError> {
        let table = quoted(dataset)?;
        let attributes = encode_attributes(dataset, &draft.attributes)?;
        let boundary = draft
            .boundary
            .as_ref()
            .map(|polygon| encode_boundary(dataset, polygon))
            .transpose()?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {table} \
                     (parent_key, link, property_id, stand_id, property_global_id, boundary, \
                      attributes) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    draft.parent_key.as_str(),
                    draft.link.as_str(),
                    draft.property_id,
                    draft.stand_id,
                    draft.property_global_id.map(|id| id.to_string()),
                    boundary,
                    attributes,
                ],
            )
            .map_err(|source| GeodatabaseError::Insert {
                dataset: dataset.to_owned(),
                source,
            })?;
        Ok(())
    }

    /// Read the staged drafts in insertion order.
    pub fn staged_activities(
        &self,
        dataset: &str,
    ) -> Result<Vec<ActivityDraft>, GeodatabaseError> {
        let table = quoted(dataset)?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT rowid, parent_key, link, property_id, stand_id, property_global_id, \
                 boundary, attributes FROM {table} ORDER BY rowid"
            ))
            .map_err(|source| GeodatabaseError::Query {
                dataset: dataset.to_owned(),
                source,
            })?;
        let mut rows = stmt.query([]).map_err(|source| GeodatabaseError::Query {
            dataset: dataset.to_owned(),
            source,
        })?;

        let mut drafts = Vec::new();
        while let Some(row) = rows.next()? {
            let rowid: ObjectId = row.get(0)?;
            drafts.push(ActivityDraft {
                parent_key: decode_key(dataset, rowid, row.get::<_, String>(1)?)?,
                link: decode_link(dataset, rowid, &row.get::<_, String>(2)?)?,
                property_id: row.get(3)?,
                stand_id: row.get(4)?,
                property_global_id: row
                    .get::<_, Option<String>>(5)?
                    .map(|raw| decode_uuid(dataset, rowid, &raw))
                    .transpose()?,
                boundary: row
                    .get::<_, Option<String>>(6)?
                    .map(|raw| decode_boundary(dataset, rowid, &raw))
                    .transpose()?,
                attributes: decode_attributes(dataset, rowid, &row.get::<_, String>(7)?)?,
            });
        }
        Ok(drafts)
    }

    /// Backfill the denormalized property global id onto staged rows linked
    /// to the property. Returns the number of rows updated.
    pub fn set_staged_property_link(
        &self,
        dataset: &str,
        property_id: ObjectId,
        global_id: Uuid,
    ) -> Result<usize, GeodatabaseError> {
        let table = quoted(dataset)?;
        self.conn
            .execute(
                &format!("UPDATE {table} SET property_global_id = ?1 WHERE property_id = ?2"),
                params![global_id.to_string(), property_id],
            )
            .map_err(|source| GeodatabaseError::Update {
                dataset: dataset.to_owned(),
                source,
            })
    }

    /// Copy a property boundary onto every staged row linked to the
    /// property. Returns the number of rows updated.
    pub fn set_staged_boundary_for_property(
        &self,
        dataset: &str,
        property_id: ObjectId,
        boundary: &Polygon<f64>,
    ) -> Result<usize, GeodatabaseError> {
        let table = quoted(dataset)?;
        let encoded = encode_boundary(dataset, boundary)?;
        self.conn
            .execute(
                &format!("UPDATE {table} SET boundary = ?1 WHERE property_id = ?2"),
                params![encoded, property_id],
            )
            .map_err(|source| GeodatabaseError::Update {
                dataset: dataset.to_owned(),
                source,
            })
    }

    /// Copy a stand's geometry and object id onto the staged row matched by
    /// correlation key. Returns the number of rows updated.
    pub fn set_staged_stand(
        &self,
        dataset: &str,
        parent_key: &CorrelationKey,
        stand_id: ObjectId,
        boundary: &Polygon<f64>,
    ) -> Result<usize, GeodatabaseError> {
        let table = quoted(dataset)?;
        let encoded = encode_boundary(dataset, boundary)?;
        self.conn
            .execute(
                &format!("UPDATE {table} SET stand_id = ?1, boundary = ?2 WHERE parent_key = ?3"),
                params![stand_id, encoded, parent_key.as_str()],
            )
            .map_err(|source| GeodatabaseError::Update {
                dataset: dataset.to_owned(),
                source,
            })
    }

    /// Copy one chemical draft into an intermediate staging dataset.
    pub fn stage_chemical(
        &self,
        dataset: &str,
        draft: &ChemicalDraft,
    ) -> Result<(), GeodatabaseError> {
        let table = quoted(dataset)?;
        let attributes = encode_attributes(dataset, &draft.attributes)?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {table} (child_key, context_id, attributes) VALUES (?1, ?2, ?3)"
                ),
                params![
                    draft.child_key.as_ref().map(CorrelationKey::as_str),
                    draft.context_id,
                    attributes,
                ],
            )
            .map_err(|source| GeodatabaseError::Insert {
                dataset: dataset.to_owned(),
                source,
            })?;
        Ok(())
    }

    /// Read the staged chemical drafts in insertion order.
    pub fn staged_chemicals(
        &self,
        dataset: &str,
    ) -> Result<Vec<ChemicalDraft>, GeodatabaseError> {
        let table = quoted(dataset)?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT rowid, child_key, context_id, attributes FROM {table} ORDER BY rowid"
            ))
            .map_err(|source| GeodatabaseError::Query {
                dataset: dataset.to_owned(),
                source,
            })?;
        let mut rows = stmt.query([]).map_err(|source| GeodatabaseError::Query {
            dataset: dataset.to_owned(),
            source,
        })?;

        let mut drafts = Vec::new();
        while let Some(row) = rows.next()? {
            let rowid: ObjectId = row.get(0)?;
            drafts.push(ChemicalDraft {
                child_key: row
                    .get::<_, Option<String>>(1)?
                    .map(|raw| decode_key(dataset, rowid, raw))
                    .transpose()?,
                context_id: row.get(2)?,
                attributes: decode_attributes(dataset, rowid, &row.get::<_, String>(3)?)?,
            });
        }
        Ok(drafts)
    }

    /// Force the context id on every staged chemical row. Returns the number
    /// of rows updated.
    pub fn override_staged_context(
        &self,
        dataset: &str,
        context_id: i64,
    ) -> Result<usize, GeodatabaseError> {
        let table = quoted(dataset)?;
        self.conn
            .execute(
                &format!("UPDATE {table} SET context_id = ?1"),
                params![context_id],
            )
            .map_err(|source| GeodatabaseError::Update {
                dataset: dataset.to_owned(),
                source,
            })
    }

    /// Append activity drafts into an authoritative dataset, assigning
    /// object ids and fresh global ids. Returns the number of rows appended.
    pub fn append_activity_drafts(
        &self,
        dataset: &str,
        drafts: &[ActivityDraft],
    ) -> Result<usize, GeodatabaseError> {
        insert_activity_drafts(&self.conn, dataset, drafts)
    }

    /// Append chemical drafts into an authoritative dataset, assigning
    /// object ids and fresh global ids. Returns the number of rows appended.
    pub fn append_chemical_drafts(
        &self,
        dataset: &str,
        drafts: &[ChemicalDraft],
    ) -> Result<usize, GeodatabaseError> {
        insert_chemical_drafts(&self.conn, dataset, drafts)
    }

    /// Read every authoritative activity row.
    pub fn activities(&self, dataset: &str) -> Result<Vec<ActivityRecord>, GeodatabaseError> {
        let table = quoted(dataset)?;
        let sql = format!("{} ORDER BY object_id", activity_select(&table));
        self.query_activity_rows(dataset, &sql, params![])
    }

    /// Authoritative activity rows carrying the given correlation key.
    ///
    /// This is how platform-assigned identifiers are recovered after an
    /// append.
    pub fn activities_by_parent_key(
        &self,
        dataset: &str,
        parent_key: &CorrelationKey,
    ) -> Result<Vec<ActivityRecord>, GeodatabaseError> {
        let table = quoted(dataset)?;
        let sql = format!(
            "{} WHERE parent_key = ?1 ORDER BY object_id",
            activity_select(&table)
        );
        self.query_activity_rows(dataset, &sql, params![parent_key.as_str()])
    }

    fn query_activity_rows(
        &self,
        dataset: &str,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ActivityRecord>, GeodatabaseError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|source| GeodatabaseError::Query {
                dataset: dataset.to_owned(),
                source,
            })?;
        let mut rows = stmt
            .query(params)
            .map_err(|source| GeodatabaseError::Query {
                dataset: dataset.to_owned(),
                source,
            })?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(activity_record_from_row(dataset, row)?);
        }
        Ok(records)
    }

    /// Read every authoritative chemical row.
    pub fn chemicals(&self, dataset: &str) -> Result<Vec<ChemicalRecord>, GeodatabaseError> {
        let table = quoted(dataset)?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT object_id, global_id, child_key, activity_id, activity_global_id, \
                 context_id, attributes FROM {table} ORDER BY object_id"
            ))
            .map_err(|source| GeodatabaseError::Query {
                dataset: dataset.to_owned(),
                source,
            })?;
        let mut rows = stmt.query([]).map_err(|source| GeodatabaseError::Query {
            dataset: dataset.to_owned(),
            source,
        })?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let object_id: ObjectId = row.get(0)?;
            records.push(ChemicalRecord {
                object_id,
                global_id: decode_uuid(dataset, object_id, &row.get::<_, String>(1)?)?,
                child_key: row
                    .get::<_, Option<String>>(2)?
                    .map(|raw| decode_key(dataset, object_id, raw))
                    .transpose()?,
                activity_id: row.get(3)?,
                activity_global_id: row
                    .get::<_, Option<String>>(4)?
                    .map(|raw| decode_uuid(dataset, object_id, &raw))
                    .transpose()?,
                context_id: row.get(5)?,
                attributes: decode_attributes(dataset, object_id, &row.get::<_, String>(6)?)?,
            });
        }
        Ok(records)
    }
}

impl EditOperation<'_> {
    /// Append activity drafts within the open edit operation.
    pub fn append_activity_drafts(
        &self,
        dataset: &str,
        drafts: &[ActivityDraft],
    ) -> Result<usize, GeodatabaseError> {
        insert_activity_drafts(self.conn, dataset, drafts)
    }

    /// Append chemical drafts within the open edit operation.
    pub fn append_chemical_drafts(
        &self,
        dataset: &str,
        drafts: &[ChemicalDraft],
    ) -> Result<usize, GeodatabaseError> {
        insert_chemical_drafts(self.conn, dataset, drafts)
    }

    /// Backfill the parent-activity foreign keys on every chemical row
    /// matched by child key. Returns the number of rows updated.
    pub fn link_chemicals(
        &self,
        dataset: &str,
        child_key: &CorrelationKey,
        activity_id: ObjectId,
        activity_global_id: Uuid,
    ) -> Result<usize, GeodatabaseError> {
        let table = quoted(dataset)?;
        self.conn
            .execute(
                &format!(
                    "UPDATE {table} SET activity_id = ?1, activity_global_id = ?2 \
                     WHERE child_key = ?3"
                ),
                params![
                    activity_id,
                    activity_global_id.to_string(),
                    child_key.as_str()
                ],
            )
            .map_err(|source| GeodatabaseError::Update {
                dataset: dataset.to_owned(),
                source,
            })
    }
}

fn activity_select(table: &str) -> String {
    format!(
        "SELECT object_id, global_id, parent_key, link, property_id, stand_id, \
         property_global_id, boundary, attributes FROM {table}"
    )
}

fn activity_record_from_row(
    dataset: &str,
    row: &Row<'_>,
) -> Result<ActivityRecord, GeodatabaseError> {
    let object_id: ObjectId = row.get(0)?;
    Ok(ActivityRecord {
        object_id,
        global_id: decode_uuid(dataset, object_id, &row.get::<_, String>(1)?)?,
        parent_key: row
            .get::<_, Option<String>>(2)?
            .map(|raw| decode_key(dataset, object_id, raw))
            .transpose()?,
        link: row
            .get::<_, Option<String>>(3)?
            .map(|raw| decode_link(dataset, object_id, &raw))
            .transpose()?,
        property_id: row.get(4)?,
        stand_id: row.get(5)?,
        property_global_id: row
            .get::<_, Option<String>>(6)?
            .map(|raw| decode_uuid(dataset, object_id, &raw))
            .transpose()?,
        boundary: row
            .get::<_, Option<String>>(7)?
            .map(|raw| decode_boundary(dataset, object_id, &raw))
            .transpose()?,
        attributes: decode_attributes(dataset, object_id, &row.get::<_, String>(8)?)?,
    })
}

fn insert_activity_drafts(
    conn: &Connection,
    dataset: &str,
    drafts: &[ActivityDraft],
) -> Result<usize, GeodatabaseError> {
    if drafts.is_empty() {
        return Ok(0);
    }
    let table = quoted(dataset)?;
    let mut stmt = conn
        .prepare(&format!(
            "INSERT INTO {table} \
             (global_id, parent_key, link, property_id, stand_id, property_global_id, \
              boundary, attributes) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ))
        .map_err(|source| GeodatabaseError::Insert {
            dataset: dataset.to_owned(),
            source,
        })?;

    for draft in drafts {
        let attributes = encode_attributes(dataset, &draft.attributes)?;
        let boundary = draft
            .boundary
            .as_ref()
            .map(|polygon| encode_boundary(dataset, polygon))
            .transpose()?;
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            draft.parent_key.as_str(),
            draft.link.as_str(),
            draft.property_id,
            draft.stand_id,
            draft.property_global_id.map(|id| id.to_string()),
            boundary,
            attributes,
        ])
        .map_err(|source| GeodatabaseError::Insert {
            dataset: dataset.to_owned(),
            source,
        })?;
    }
    Ok(drafts.len())
}

fn insert_chemical_drafts(
    conn: &Connection,
    dataset: &str,
    drafts: &[ChemicalDraft],
) -> Result<usize, GeodatabaseError> {
    if drafts.is_empty() {
        return Ok(0);
    }
    let table = quoted(dataset)?;
    let mut stmt = conn
        .prepare(&format!(
            "INSERT INTO {table} (global_id, child_key, context_id, attributes) \
             VALUES (?1, ?2, ?3, ?4)"
        ))
        .map_err(|source| GeodatabaseError::Insert {
            dataset: dataset.to_owned(),
            source,
        })?;

    for draft in drafts {
        let attributes = encode_attributes(dataset, &draft.attributes)?;
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            draft.child_key.as_ref().map(CorrelationKey::as_str),
            draft.context_id,
            attributes,
        ])
        .map_err(|source| GeodatabaseError::Insert {
            dataset: dataset.to_owned(),
            source,
        })?;
    }
    Ok(drafts.len())
}

fn encode_boundary(dataset: &str, boundary: &Polygon<f64>) -> Result<String, GeodatabaseError> {
    serde_json::to_string(boundary).map_err(|source| GeodatabaseError::SerializeGeometry {
        dataset: dataset.to_owned(),
        source,
    })
}

fn decode_boundary(
    dataset: &str,
    object_id: ObjectId,
    raw: &str,
) -> Result<Polygon<f64>, GeodatabaseError> {
    serde_json::from_str(raw).map_err(|source| GeodatabaseError::InvalidGeometry {
        dataset: dataset.to_owned(),
        object_id,
        source,
    })
}

fn encode_attributes(dataset: &str, attributes: &Attributes) -> Result<String, GeodatabaseError> {
    serde_json::to_string(attributes).map_err(|source| GeodatabaseError::SerializeAttributes {
        dataset: dataset.to_owned(),
        source,
    })
}

fn decode_attributes(
    dataset: &str,
    object_id: ObjectId,
    raw: &str,
) -> Result<Attributes, GeodatabaseError> {
    serde_json::from_str(raw).map_err(|source| GeodatabaseError::InvalidAttributes {
        dataset: dataset.to_owned(),
        object_id,
        source,
    })
}

fn decode_uuid(dataset: &str, object_id: ObjectId, raw: &str) -> Result<Uuid, GeodatabaseError> {
    Uuid::parse_str(raw).map_err(|source| GeodatabaseError::InvalidGlobalId {
        dataset: dataset.to_owned(),
        object_id,
        source,
    })
}

fn decode_key(
    dataset: &str,
    object_id: ObjectId,
    raw: String,
) -> Result<CorrelationKey, GeodatabaseError> {
    CorrelationKey::new(raw).map_err(|source| GeodatabaseError::InvalidKey {
        dataset: dataset.to_owned(),
        object_id,
        source,
    })
}

fn decode_link(
    dataset: &str,
    object_id: ObjectId,
    raw: &str,
) -> Result<LinkTarget, GeodatabaseError> {
    raw.parse()
        .map_err(|source| GeodatabaseError::InvalidLink {
            dataset: dataset.to_owned(),
            object_id,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DatasetKind;
    use crate::test_support::{sample_polygon, sample_property, sample_stand};
    use rstest::{fixture, rstest};

    #[fixture]
    fn gdb() -> Geodatabase {
        let gdb = Geodatabase::open_in_memory().expect("open workspace");
        for (name, kind) in [
            ("mobile_acts", DatasetKind::MobileActivity),
            ("mobile_chems", DatasetKind::MobileChemical),
            ("act_staging", DatasetKind::ActivityStaging),
            ("chem_staging", DatasetKind::ChemicalStaging),
            ("activities", DatasetKind::Activity),
            ("chem_apps", DatasetKind::Chemical),
            ("properties", DatasetKind::Property),
            ("stands", DatasetKind::Stand),
        ] {
            gdb.create_dataset(name, kind).expect("create dataset");
        }
        gdb
    }

    fn key(raw: &str) -> CorrelationKey {
        raw.parse().expect("valid key")
    }

    #[rstest]
    fn mobile_activities_round_trip(gdb: Geodatabase) {
        let row = MobileActivity::new(
            10,
            key("A1"),
            LinkTarget::Stand,
            None,
            Some(5),
            Attributes::from([("status".to_owned(), "Planned".to_owned())]),
        )
        .expect("valid row");
        gdb.insert_mobile_activity("mobile_acts", &row).expect("insert");

        let rows = gdb.mobile_activities("mobile_acts").expect("read rows");
        assert_eq!(rows, vec![row]);
    }

    #[rstest]
    fn properties_round_trip_geometry(gdb: Geodatabase) {
        let property = sample_property(7, "North Block");
        gdb.insert_property("properties", &property).expect("insert");

        let found = gdb
            .property("properties", 7)
            .expect("query")
            .expect("property exists");
        assert_eq!(found, property);
        assert!(gdb.property("properties", 8).expect("query").is_none());
    }

    #[rstest]
    fn staged_rows_take_property_link_and_boundary(gdb: Geodatabase) {
        let property = sample_property(7, "North Block");
        let draft = ActivityDraft {
            parent_key: key("A1"),
            link: LinkTarget::Property,
            property_id: Some(7),
            stand_id: None,
            property_global_id: None,
            boundary: None,
            attributes: Attributes::new(),
        };
        gdb.stage_activity("act_staging", &draft).expect("stage");

        let linked = gdb
            .set_staged_property_link("act_staging", 7, property.global_id)
            .expect("link");
        let shaped = gdb
            .set_staged_boundary_for_property("act_staging", 7, &property.boundary)
            .expect("copy boundary");
        assert_eq!((linked, shaped), (1, 1));

        let staged = gdb.staged_activities("act_staging").expect("read staged");
        assert_eq!(staged.len(), 1);
        let row = staged.first().expect("staged row");
        assert_eq!(row.property_global_id, Some(property.global_id));
        assert_eq!(row.boundary.as_ref(), Some(&property.boundary));
    }

    #[rstest]
    fn append_assigns_distinct_global_ids(gdb: Geodatabase) {
        let drafts = vec![
            ActivityDraft {
                parent_key: key("A1"),
                link: LinkTarget::Property,
                property_id: Some(1),
                stand_id: None,
                property_global_id: None,
                boundary: None,
                attributes: Attributes::new(),
            },
            ActivityDraft {
                parent_key: key("A2"),
                link: LinkTarget::Property,
                property_id: Some(1),
                stand_id: None,
                property_global_id: None,
                boundary: None,
                attributes: Attributes::new(),
            },
        ];
        let appended = gdb
            .append_activity_drafts("activities", &drafts)
            .expect("append");
        assert_eq!(appended, 2);

        let records = gdb.activities("activities").expect("read records");
        assert_eq!(records.len(), 2);
        let first = records.first().expect("first record");
        let second = records.get(1).expect("second record");
        assert_ne!(first.global_id, second.global_id);
        assert_ne!(first.object_id, second.object_id);
    }

    #[rstest]
    fn recovers_records_by_parent_key(gdb: Geodatabase) {
        let stand = sample_stand(5, 7);
        let draft = ActivityDraft {
            parent_key: key("A1"),
            link: LinkTarget::Stand,
            property_id: None,
            stand_id: Some(5),
            property_global_id: None,
            boundary: Some(stand.boundary.clone()),
            attributes: Attributes::new(),
        };
        gdb.append_activity_drafts("activities", std::slice::from_ref(&draft))
            .expect("append");

        let matched = gdb
            .activities_by_parent_key("activities", &key("A1"))
            .expect("query");
        assert_eq!(matched.len(), 1);
        let record = matched.first().expect("record");
        assert_eq!(record.boundary.as_ref(), Some(&stand.boundary));
        assert!(
            gdb.activities_by_parent_key("activities", &key("B2"))
                .expect("query")
                .is_empty()
        );
    }

    #[rstest]
    fn context_override_touches_every_staged_chemical(gdb: Geodatabase) {
        for (key_text, context) in [("C1", 10), ("C2", 20)] {
            gdb.stage_chemical(
                "chem_staging",
                &ChemicalDraft {
                    child_key: Some(key(key_text)),
                    context_id: context,
                    attributes: Attributes::new(),
                },
            )
            .expect("stage chemical");
        }

        let updated = gdb
            .override_staged_context("chem_staging", 1440)
            .expect("override context");
        assert_eq!(updated, 2);
        let staged = gdb.staged_chemicals("chem_staging").expect("read staged");
        assert!(staged.iter().all(|draft| draft.context_id == 1440));
    }

    #[rstest]
    fn edit_links_chemicals_by_child_key(mut gdb: Geodatabase) {
        let chem = ChemicalDraft {
            child_key: Some(key("A1")),
            context_id: 0,
            attributes: Attributes::new(),
        };
        gdb.append_chemical_drafts("chem_apps", std::slice::from_ref(&chem))
            .expect("append chemical");

        let activity_global = Uuid::new_v4();
        let updated = gdb
            .edit(|op| op.link_chemicals("chem_apps", &key("A1"), 42, activity_global))
            .expect("link");
        assert_eq!(updated, 1);

        let records = gdb.chemicals("chem_apps").expect("read chemicals");
        let record = records.first().expect("chemical record");
        assert!(record.is_linked());
        assert_eq!(record.activity_id, Some(42));
        assert_eq!(record.activity_global_id, Some(activity_global));
    }

    #[rstest]
    fn stand_geometry_lands_on_keyed_staged_row(gdb: Geodatabase) {
        for key_text in ["A1", "B2"] {
            gdb.stage_activity(
                "act_staging",
                &ActivityDraft {
                    parent_key: key(key_text),
                    link: LinkTarget::Stand,
                    property_id: None,
                    stand_id: Some(5),
                    property_global_id: None,
                    boundary: None,
                    attributes: Attributes::new(),
                },
            )
            .expect("stage");
        }

        let polygon = sample_polygon(3);
        let updated = gdb
            .set_staged_stand("act_staging", &key("B2"), 5, &polygon)
            .expect("copy stand geometry");
        assert_eq!(updated, 1);

        let staged = gdb.staged_activities("act_staging").expect("read staged");
        let untouched = staged.first().expect("first row");
        let touched = staged.get(1).expect("second row");
        assert!(untouched.boundary.is_none());
        assert_eq!(touched.boundary.as_ref(), Some(&polygon));
    }
}
