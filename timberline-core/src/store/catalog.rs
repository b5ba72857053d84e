//! Catalog operations: coded-value domains, subtypes, and relationship
//! classes.

use rusqlite::{OptionalExtension, params};

use crate::{CodedDomain, CodedValue, DomainKind, ObjectId};

use super::sqlite::{Geodatabase, GeodatabaseError, validate_name};
use super::{DomainRecord, RelationshipClass, RelationshipKeying};

impl Geodatabase {
    /// Create an empty typed domain shell if it does not exist.
    ///
    /// Setup pre-creates shells so field assignments can reference a domain
    /// before its first population.
    pub fn create_domain(&self, name: &str, kind: DomainKind) -> Result<(), GeodatabaseError> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO gdb_domains (name, kind, codes) VALUES (?1, ?2, '[]')",
                params![name, kind.as_str()],
            )
            .map(|_| ())
            .map_err(GeodatabaseError::Database)
    }

    /// Replace a stored domain wholesale with the supplied one.
    pub fn replace_domain(&self, domain: &CodedDomain) -> Result<(), GeodatabaseError> {
        let codes = serde_json::to_string(domain.values()).map_err(|source| {
            GeodatabaseError::InvalidDomain {
                name: domain.name().to_owned(),
                source,
            }
        })?;
        self.conn
            .execute(
                "INSERT INTO gdb_domains (name, kind, codes) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (name) DO UPDATE SET kind = excluded.kind, codes = excluded.codes",
                params![domain.name(), domain.kind().as_str(), codes],
            )
            .map(|_| ())
            .map_err(GeodatabaseError::Database)
    }

    /// Read a stored domain back, shells included.
    pub fn domain(&self, name: &str) -> Result<Option<DomainRecord>, GeodatabaseError> {
        let found: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT kind, codes FROM gdb_domains WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        found
            .map(|(kind, codes)| {
                let kind: DomainKind =
                    kind.parse()
                        .map_err(|source| GeodatabaseError::InvalidDomainKind {
                            name: name.to_owned(),
                            source,
                        })?;
                let values: Vec<CodedValue> = serde_json::from_str(&codes).map_err(|source| {
                    GeodatabaseError::InvalidDomain {
                        name: name.to_owned(),
                        source,
                    }
                })?;
                Ok(DomainRecord {
                    name: name.to_owned(),
                    kind,
                    values,
                })
            })
            .transpose()
    }

    /// Bind a domain to an attribute field, optionally scoped to a subtype
    /// code. Re-assigning overwrites the previous binding.
    pub fn assign_domain(
        &self,
        dataset: &str,
        field: &str,
        domain: &str,
        subtype: Option<ObjectId>,
    ) -> Result<(), GeodatabaseError> {
        validate_name(dataset)?;
        validate_name(field)?;
        self.conn.execute(
            "DELETE FROM gdb_domain_bindings \
             WHERE dataset = ?1 AND field = ?2 AND subtype IS ?3",
            params![dataset, field, subtype],
        )?;
        self.conn.execute(
            "INSERT INTO gdb_domain_bindings (dataset, field, domain, subtype) \
             VALUES (?1, ?2, ?3, ?4)",
            params![dataset, field, domain, subtype],
        )?;
        Ok(())
    }

    /// The domain bound to a field, for the given subtype scope.
    pub fn domain_binding(
        &self,
        dataset: &str,
        field: &str,
        subtype: Option<ObjectId>,
    ) -> Result<Option<String>, GeodatabaseError> {
        let found = self
            .conn
            .query_row(
                "SELECT domain FROM gdb_domain_bindings \
                 WHERE dataset = ?1 AND field = ?2 AND subtype IS ?3",
                params![dataset, field, subtype],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found)
    }

    /// Declare which field drives a dataset's subtypes.
    pub fn set_subtype_field(&self, dataset: &str, field: &str) -> Result<(), GeodatabaseError> {
        validate_name(dataset)?;
        validate_name(field)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO gdb_subtype_fields (dataset, field) VALUES (?1, ?2)",
            params![dataset, field],
        )?;
        Ok(())
    }

    /// Register a subtype code on a dataset.
    pub fn add_subtype(
        &self,
        dataset: &str,
        code: ObjectId,
        description: &str,
    ) -> Result<(), GeodatabaseError> {
        validate_name(dataset)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO gdb_subtypes (dataset, code, description) \
             VALUES (?1, ?2, ?3)",
            params![dataset, code, description],
        )?;
        Ok(())
    }

    /// The registered subtypes of a dataset, ordered by code.
    pub fn subtypes(&self, dataset: &str) -> Result<Vec<(ObjectId, String)>, GeodatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT code, description FROM gdb_subtypes WHERE dataset = ?1 ORDER BY code",
        )?;
        let mut rows = stmt.query([dataset])?;
        let mut subtypes = Vec::new();
        while let Some(row) = rows.next()? {
            subtypes.push((row.get(0)?, row.get(1)?));
        }
        Ok(subtypes)
    }

    /// Register a relationship class.
    pub fn create_relationship(
        &self,
        relationship: &RelationshipClass,
    ) -> Result<(), GeodatabaseError> {
        self.conn.execute(
            "INSERT INTO gdb_relationships \
             (name, origin, destination, origin_key, foreign_key, keyed_by) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                relationship.name,
                relationship.origin,
                relationship.destination,
                relationship.origin_key,
                relationship.foreign_key,
                relationship.keyed_by.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Read a relationship class back.
    pub fn relationship(
        &self,
        name: &str,
    ) -> Result<Option<RelationshipClass>, GeodatabaseError> {
        let found: Option<(String, String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT origin, destination, origin_key, foreign_key, keyed_by \
                 FROM gdb_relationships WHERE name = ?1",
                [name],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;

        found
            .map(|(origin, destination, origin_key, foreign_key, keyed_by)| {
                let keyed_by: RelationshipKeying =
                    keyed_by
                        .parse()
                        .map_err(|value| GeodatabaseError::InvalidKeying {
                            name: name.to_owned(),
                            value,
                        })?;
                Ok(RelationshipClass {
                    name: name.to_owned(),
                    origin,
                    destination,
                    origin_key,
                    foreign_key,
                    keyed_by,
                })
            })
            .transpose()
    }

    /// Re-key a relationship class onto platform global ids.
    pub fn migrate_relationship(&self, name: &str) -> Result<(), GeodatabaseError> {
        let changed = self.conn.execute(
            "UPDATE gdb_relationships SET keyed_by = 'global_id' WHERE name = ?1",
            [name],
        )?;
        if changed == 0 {
            return Err(GeodatabaseError::UnknownRelationship {
                name: name.to_owned(),
            });
        }
        Ok(())
    }
}
