//! SQLite-backed geodatabase workspace.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::warn;
use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

use crate::{CorrelationKeyError, DomainKindError, LinkTargetError, MobileActivityError, ObjectId};

use super::DatasetKind;

/// Error raised while reading or mutating the geodatabase.
#[derive(Debug, Error)]
pub enum GeodatabaseError {
    /// Opening the workspace failed.
    #[error("failed to open geodatabase at {path:?}")]
    Open {
        /// Location of the workspace on disk.
        path: PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A configured dataset or column name is not a valid identifier.
    #[error("invalid dataset or column name {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },
    /// Creating a dataset failed.
    #[error("failed to create dataset {name:?}")]
    CreateDataset {
        /// Dataset being created.
        name: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Altering a dataset's schema failed.
    #[error("failed to alter dataset {name:?}")]
    AlterDataset {
        /// Dataset being altered.
        name: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Reading rows failed.
    #[error("failed to read rows from {dataset:?}")]
    Query {
        /// Dataset being read.
        dataset: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Inserting rows failed.
    #[error("failed to insert into {dataset:?}")]
    Insert {
        /// Destination dataset.
        dataset: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Updating rows failed.
    #[error("failed to update rows in {dataset:?}")]
    Update {
        /// Dataset being updated.
        dataset: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Clearing a dataset failed.
    #[error("failed to truncate dataset {name:?}")]
    Truncate {
        /// Dataset being cleared.
        name: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A stored geometry column did not parse.
    #[error("row {object_id} in {dataset:?} holds invalid geometry")]
    InvalidGeometry {
        /// Dataset holding the row.
        dataset: String,
        /// Offending row.
        object_id: ObjectId,
        /// JSON decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// A stored attribute map did not parse.
    #[error("row {object_id} in {dataset:?} holds invalid attributes")]
    InvalidAttributes {
        /// Dataset holding the row.
        dataset: String,
        /// Offending row.
        object_id: ObjectId,
        /// JSON decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// A stored global id did not parse.
    #[error("row {object_id} in {dataset:?} holds an invalid global id")]
    InvalidGlobalId {
        /// Dataset holding the row.
        dataset: String,
        /// Offending row.
        object_id: ObjectId,
        /// UUID decoding failure.
        #[source]
        source: uuid::Error,
    },
    /// A stored correlation key did not parse.
    #[error("row {object_id} in {dataset:?} holds an invalid correlation key")]
    InvalidKey {
        /// Dataset holding the row.
        dataset: String,
        /// Offending row.
        object_id: ObjectId,
        /// Key validation failure.
        #[source]
        source: CorrelationKeyError,
    },
    /// A stored link flag did not parse.
    #[error("row {object_id} in {dataset:?} holds an invalid link flag")]
    InvalidLink {
        /// Dataset holding the row.
        dataset: String,
        /// Offending row.
        object_id: ObjectId,
        /// Flag parse failure.
        #[source]
        source: LinkTargetError,
    },
    /// A mobile row failed model validation.
    #[error("row {object_id} in {dataset:?} is not a valid mobile activity")]
    InvalidMobileRow {
        /// Dataset holding the row.
        dataset: String,
        /// Offending row.
        object_id: ObjectId,
        /// Model validation failure.
        #[source]
        source: MobileActivityError,
    },
    /// Serializing a geometry for storage failed.
    #[error("failed to serialize geometry for {dataset:?}")]
    SerializeGeometry {
        /// Destination dataset.
        dataset: String,
        /// JSON encoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// Serializing an attribute map for storage failed.
    #[error("failed to serialize attributes for {dataset:?}")]
    SerializeAttributes {
        /// Destination dataset.
        dataset: String,
        /// JSON encoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// A stored domain payload did not parse.
    #[error("stored domain {name:?} is corrupt")]
    InvalidDomain {
        /// Domain name.
        name: String,
        /// JSON decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// A stored domain kind did not parse.
    #[error("stored domain {name:?} has an unknown kind")]
    InvalidDomainKind {
        /// Domain name.
        name: String,
        /// Kind parse failure.
        #[source]
        source: DomainKindError,
    },
    /// A stored relationship keying did not parse.
    #[error("relationship class {name:?} has unknown keying {value:?}")]
    InvalidKeying {
        /// Relationship class name.
        name: String,
        /// The rejected keying value.
        value: String,
    },
    /// A relationship class was not found.
    #[error("relationship class {name:?} does not exist")]
    UnknownRelationship {
        /// The missing relationship class.
        name: String,
    },
    /// Starting an edit operation failed.
    #[error("failed to begin edit operation")]
    BeginEdit {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Committing an edit operation failed.
    #[error("failed to commit edit operation")]
    CommitEdit {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Generic SQLite failure.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

/// A geodatabase workspace held open for the duration of a run.
pub struct Geodatabase {
    pub(crate) conn: Connection,
}

impl fmt::Debug for Geodatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Geodatabase").finish_non_exhaustive()
    }
}

impl Geodatabase {
    /// Open (or create) the workspace at the supplied path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GeodatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| GeodatabaseError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let gdb = Self { conn };
        gdb.initialise_catalog()?;
        Ok(gdb)
    }

    /// Open an in-memory workspace.
    pub fn open_in_memory() -> Result<Self, GeodatabaseError> {
        let conn = Connection::open_in_memory().map_err(|source| GeodatabaseError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        let gdb = Self { conn };
        gdb.initialise_catalog()?;
        Ok(gdb)
    }

    fn initialise_catalog(&self) -> Result<(), GeodatabaseError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS gdb_domains (
                 name TEXT PRIMARY KEY,
                 kind TEXT NOT NULL,
                 codes TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS gdb_domain_bindings (
                 dataset TEXT NOT NULL,
                 field TEXT NOT NULL,
                 domain TEXT NOT NULL,
                 subtype INTEGER
             );
             CREATE TABLE IF NOT EXISTS gdb_subtype_fields (
                 dataset TEXT PRIMARY KEY,
                 field TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS gdb_subtypes (
                 dataset TEXT NOT NULL,
                 code INTEGER NOT NULL,
                 description TEXT NOT NULL,
                 PRIMARY KEY (dataset, code)
             );
             CREATE TABLE IF NOT EXISTS gdb_relationships (
                 name TEXT PRIMARY KEY,
                 origin TEXT NOT NULL,
                 destination TEXT NOT NULL,
                 origin_key TEXT NOT NULL,
                 foreign_key TEXT NOT NULL,
                 keyed_by TEXT NOT NULL
             );",
        )?;
        Ok(())
    }

    /// Create a dataset with the schema of `kind`, if it does not exist.
    pub fn create_dataset(&self, name: &str, kind: DatasetKind) -> Result<(), GeodatabaseError> {
        let table = quoted(name)?;
        let sql = format!("CREATE TABLE IF NOT EXISTS {table} ({})", kind.columns_sql());
        self.conn
            .execute(&sql, [])
            .map_err(|source| GeodatabaseError::CreateDataset {
                name: name.to_owned(),
                source,
            })?;
        Ok(())
    }

    /// Whether a dataset exists in the workspace.
    pub fn dataset_exists(&self, name: &str) -> Result<bool, GeodatabaseError> {
        validate_name(name)?;
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Number of rows currently in a dataset.
    pub fn row_count(&self, name: &str) -> Result<usize, GeodatabaseError> {
        let table = quoted(name)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(|source| GeodatabaseError::Query {
                dataset: name.to_owned(),
                source,
            })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Remove every row from a dataset.
    pub fn truncate(&self, name: &str) -> Result<(), GeodatabaseError> {
        let table = quoted(name)?;
        self.conn
            .execute(&format!("DELETE FROM {table}"), [])
            .map_err(|source| GeodatabaseError::Truncate {
                name: name.to_owned(),
                source,
            })?;
        Ok(())
    }

    /// Whether a dataset carries the named column.
    pub fn has_column(&self, dataset: &str, column: &str) -> Result<bool, GeodatabaseError> {
        validate_name(dataset)?;
        validate_name(column)?;
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM pragma_table_info(?1) WHERE name = ?2",
                [dataset, column],
                |row| row.get(0),
            )
            .optional()
            .map_err(|source| GeodatabaseError::Query {
                dataset: dataset.to_owned(),
                source,
            })?;
        Ok(found.is_some())
    }

    /// Ensure the dataset carries a `global_id` column.
    ///
    /// Returns `true` when the column was added, `false` when it was already
    /// present.
    pub fn ensure_global_id_column(&self, dataset: &str) -> Result<bool, GeodatabaseError> {
        self.ensure_guid_column(dataset, "global_id")
    }

    /// Ensure the dataset carries the named GUID column.
    ///
    /// Returns `true` when the column was added, `false` when it was already
    /// present.
    pub fn ensure_guid_column(
        &self,
        dataset: &str,
        column: &str,
    ) -> Result<bool, GeodatabaseError> {
        if self.has_column(dataset, column)? {
            return Ok(false);
        }
        let table = quoted(dataset)?;
        let col = quoted(column)?;
        self.conn
            .execute(&format!("ALTER TABLE {table} ADD COLUMN {col} TEXT"), [])
            .map_err(|source| GeodatabaseError::AlterDataset {
                name: dataset.to_owned(),
                source,
            })?;
        Ok(true)
    }

    /// Run `f` inside one explicit edit operation.
    ///
    /// The closure's writes commit together on success. On failure the
    /// operation is rolled back best-effort: a rollback failure is logged
    /// and the closure's error is returned unchanged.
    pub fn edit<T, F>(&mut self, f: F) -> Result<T, GeodatabaseError>
    where
        F: FnOnce(&EditOperation<'_>) -> Result<T, GeodatabaseError>,
    {
        let tx = self
            .conn
            .transaction()
            .map_err(|source| GeodatabaseError::BeginEdit { source })?;
        let outcome = f(&EditOperation::new(&tx));
        match outcome {
            Ok(value) => {
                tx.commit()
                    .map_err(|source| GeodatabaseError::CommitEdit { source })?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback) = tx.rollback() {
                    warn!("failed to abort edit operation: {rollback}");
                }
                Err(error)
            }
        }
    }
}

/// Handle on an open edit operation.
///
/// Exposes the mutations that must land atomically; everything else goes
/// through [`Geodatabase`] directly.
pub struct EditOperation<'a> {
    pub(crate) conn: &'a Connection,
}

impl<'a> EditOperation<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

/// Validate a configured dataset or column name.
pub(crate) fn validate_name(name: &str) -> Result<(), GeodatabaseError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(GeodatabaseError::InvalidName {
            name: name.to_owned(),
        })
    }
}

/// Quote a validated identifier for splicing into SQL.
pub(crate) fn quoted(name: &str) -> Result<String, GeodatabaseError> {
    validate_name(name)?;
    Ok(format!("\"{name}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    fn opens_on_disk_and_reports_datasets(#[values(true, false)] create: bool) {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("workspace.gdb");
        let gdb = Geodatabase::open(&path).expect("open workspace");

        if create {
            gdb.create_dataset("activities", DatasetKind::Activity)
                .expect("create dataset");
        }
        assert_eq!(gdb.dataset_exists("activities").expect("exists"), create);
    }

    #[rstest]
    fn counts_and_truncates_rows() {
        let gdb = Geodatabase::open_in_memory().expect("open workspace");
        gdb.create_dataset("mobile_acts", DatasetKind::MobileActivity)
            .expect("create dataset");
        gdb.conn
            .execute(
                "INSERT INTO \"mobile_acts\" (object_id, parent_key, link) VALUES (1, 'A1', 'prop')",
                [],
            )
            .expect("seed row");

        assert_eq!(gdb.row_count("mobile_acts").expect("count"), 1);
        gdb.truncate("mobile_acts").expect("truncate");
        assert_eq!(gdb.row_count("mobile_acts").expect("count"), 0);
    }

    #[rstest]
    #[case("activities; DROP TABLE x")]
    #[case("")]
    #[case("1activities")]
    #[case("bad-name")]
    fn rejects_invalid_dataset_names(#[case] name: &str) {
        let gdb = Geodatabase::open_in_memory().expect("open workspace");
        let err = gdb.row_count(name).expect_err("invalid name should fail");
        assert!(matches!(err, GeodatabaseError::InvalidName { .. }));
    }

    #[rstest]
    fn ensure_guid_column_is_idempotent() {
        let gdb = Geodatabase::open_in_memory().expect("open workspace");
        gdb.create_dataset("stands", DatasetKind::Stand)
            .expect("create dataset");

        assert!(gdb.ensure_global_id_column("stands").expect("add column"));
        assert!(!gdb.ensure_global_id_column("stands").expect("second call"));
        assert!(gdb.has_column("stands", "global_id").expect("has column"));
    }

    #[rstest]
    fn edit_rolls_back_on_error() {
        let mut gdb = Geodatabase::open_in_memory().expect("open workspace");
        gdb.create_dataset("mobile_acts", DatasetKind::MobileActivity)
            .expect("create dataset");

        let failed: Result<(), GeodatabaseError> = gdb.edit(|op| {
            op.conn
                .execute(
                    "INSERT INTO \"mobile_acts\" (object_id, parent_key, link) \
                     VALUES (1, 'A1', 'prop')",
                    [],
                )
                .map_err(GeodatabaseError::Database)?;
            Err(GeodatabaseError::UnknownRelationship {
                name: "forced failure".into(),
            })
        });

        assert!(failed.is_err());
        assert_eq!(gdb.row_count("mobile_acts").expect("count"), 0);
    }
}
