//! Named procedures against the relational database.
//!
//! The original platform exposed these as stored procedures; here each is a
//! configured SQL statement taking at most one integer parameter. Results
//! are tabular and consumed positionally by column order.

use std::fmt;
use std::path::PathBuf;

use camino::Utf8Path;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use thiserror::Error;

/// A positional tabular result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TabularResult {
    /// Column names, in statement order.
    pub columns: Vec<String>,
    /// Row cells rendered as text, one vector per row.
    pub rows: Vec<Vec<String>>,
}

impl TabularResult {
    /// Whether the result holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Errors raised while executing a procedure.
#[derive(Debug, Error)]
pub enum ProcedureError {
    /// Opening the database failed.
    #[error("failed to open procedure database at {path:?}")]
    Connect {
        /// Location of the database.
        path: PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Preparing the statement failed.
    #[error("failed to prepare procedure statement")]
    Prepare {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// The statement expects a parameter none was supplied for.
    #[error("procedure statement expects a parameter but none was supplied")]
    MissingParameter,
    /// Running the statement failed.
    #[error("failed to execute procedure statement")]
    Execute {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Reading result rows failed.
    #[error("failed to read procedure results")]
    Rows {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
}

/// Executes named, parameterized statements and returns tabular results.
pub trait ProcedureRunner {
    /// Run a statement and collect its tabular result.
    fn fetch(
        &self,
        statement: &str,
        parameter: Option<i64>,
    ) -> Result<TabularResult, ProcedureError>;

    /// Run a statement for its side effect.
    fn execute(&self, statement: &str, parameter: Option<i64>) -> Result<(), ProcedureError>;
}

/// Procedure runner over one SQLite connection, held for the run.
pub struct SqlProcedures {
    conn: Connection,
}

impl fmt::Debug for SqlProcedures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlProcedures").finish_non_exhaustive()
    }
}

impl SqlProcedures {
    /// Open the configured database.
    pub fn connect(path: &Utf8Path) -> Result<Self, ProcedureError> {
        let conn =
            Connection::open(path.as_std_path()).map_err(|source| ProcedureError::Connect {
                path: path.as_std_path().to_path_buf(),
                source,
            })?;
        Ok(Self { conn })
    }
}

impl ProcedureRunner for SqlProcedures {
    fn fetch(
        &self,
        statement: &str,
        parameter: Option<i64>,
    ) -> Result<TabularResult, ProcedureError> {
        let mut stmt = self
            .conn
            .prepare(statement)
            .map_err(|source| ProcedureError::Prepare { source })?;
        let expects_parameter = stmt.parameter_count() > 0;
        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| (*name).to_owned())
            .collect();
        let column_count = columns.len();

        let mut rows = match (expects_parameter, parameter) {
            (true, Some(value)) => stmt.query([value]),
            (true, None) => return Err(ProcedureError::MissingParameter),
            (false, _) => stmt.query([]),
        }
        .map_err(|source| ProcedureError::Execute { source })?;

        let mut collected = Vec::new();
        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(source) => return Err(ProcedureError::Rows { source }),
            };
            let mut cells = Vec::with_capacity(column_count);
            for index in 0..column_count {
                let value = row
                    .get_ref(index)
                    .map_err(|source| ProcedureError::Rows { source })?;
                cells.push(cell_text(value));
            }
            collected.push(cells);
        }

        Ok(TabularResult {
            columns,
            rows: collected,
        })
    }

    fn execute(&self, statement: &str, parameter: Option<i64>) -> Result<(), ProcedureError> {
        let mut stmt = self
            .conn
            .prepare(statement)
            .map_err(|source| ProcedureError::Prepare { source })?;
        let expects_parameter = stmt.parameter_count() > 0;
        match (expects_parameter, parameter) {
            (true, Some(value)) => stmt.execute([value]),
            (true, None) => return Err(ProcedureError::MissingParameter),
            (false, _) => stmt.execute([]),
        }
        .map_err(|source| ProcedureError::Execute { source })?;
        Ok(())
    }
}

fn cell_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(value) => value.to_string(),
        ValueRef::Real(value) => value.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn seeded() -> (TempDir, SqlProcedures) {
        let dir = TempDir::new().expect("create temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("resource.db")).expect("utf-8 path");
        {
            let conn = Connection::open(path.as_std_path()).expect("create database");
            conn.execute_batch(
                "CREATE TABLE supervisors (
                     property_id INTEGER NOT NULL,
                     code TEXT NOT NULL,
                     description TEXT NOT NULL
                 );
                 INSERT INTO supervisors VALUES (423, 'S1', 'Ranger');
                 INSERT INTO supervisors VALUES (423, 'S2', 'Forester');
                 INSERT INTO supervisors VALUES (427, 'S3', 'Warden');
                 CREATE TABLE overlay_queue (activity_id INTEGER NOT NULL);",
            )
            .expect("seed database");
        }
        let procs = SqlProcedures::connect(&path).expect("connect");
        (dir, procs)
    }

    #[rstest]
    fn fetch_returns_positional_rows(seeded: (TempDir, SqlProcedures)) {
        let (_dir, procs) = seeded;
        let result = procs
            .fetch(
                "SELECT code, description FROM supervisors WHERE property_id = ?1 ORDER BY code",
                Some(423),
            )
            .expect("fetch rows");

        assert_eq!(result.columns, vec!["code".to_owned(), "description".to_owned()]);
        assert_eq!(result.len(), 2);
        assert_eq!(
            result.rows,
            vec![
                vec!["S1".to_owned(), "Ranger".to_owned()],
                vec!["S2".to_owned(), "Forester".to_owned()],
            ]
        );
    }

    #[rstest]
    fn fetch_with_no_matches_is_empty(seeded: (TempDir, SqlProcedures)) {
        let (_dir, procs) = seeded;
        let result = procs
            .fetch(
                "SELECT code, description FROM supervisors WHERE property_id = ?1",
                Some(999),
            )
            .expect("fetch rows");
        assert!(result.is_empty());
    }

    #[rstest]
    fn parameterised_statements_require_a_parameter(seeded: (TempDir, SqlProcedures)) {
        let (_dir, procs) = seeded;
        let err = procs
            .fetch("SELECT code FROM supervisors WHERE property_id = ?1", None)
            .expect_err("missing parameter should fail");
        assert!(matches!(err, ProcedureError::MissingParameter));
    }

    #[rstest]
    fn execute_runs_side_effects(seeded: (TempDir, SqlProcedures)) {
        let (_dir, procs) = seeded;
        procs
            .execute("INSERT INTO overlay_queue (activity_id) VALUES (?1)", Some(42))
            .expect("execute");

        let queued = procs
            .fetch("SELECT activity_id FROM overlay_queue", None)
            .expect("read queue");
        assert_eq!(queued.rows, vec![vec!["42".to_owned()]]);
    }

    #[rstest]
    fn execute_propagates_sql_failures(seeded: (TempDir, SqlProcedures)) {
        let (_dir, procs) = seeded;
        let err = procs
            .execute("INSERT INTO missing_table (x) VALUES (?1)", Some(1))
            .expect_err("missing table should fail");
        assert!(matches!(err, ProcedureError::Prepare { .. }));
    }
}
