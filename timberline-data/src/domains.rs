//! Coded-value domain synchronization.
//!
//! Universal domains come from hand-maintained CSV fixtures; property-scoped
//! domains come from relational procedures. Both replace the stored domain
//! wholesale. A procedure returning no rows leaves the stored domain
//! untouched: an empty table carries no value type, so replacing from it
//! would corrupt the domain's typing.

use camino::Utf8Path;
use thiserror::Error;

use timberline_core::store::{Geodatabase, GeodatabaseError};
use timberline_core::{CodedDomain, CodedDomainError, CodedValue, DomainKind, ObjectId};

use crate::config::Procedures;
use crate::procs::{ProcedureError, ProcedureRunner, TabularResult};
use crate::runlog::RunLog;
use crate::table::{self, TableError};

/// The universal domains, refreshed from `<name>.csv` fixtures.
pub const UNIVERSAL_DOMAINS: [&str; 7] = [
    "act_status",
    "plant_pattern",
    "plant_stock",
    "harv_status",
    "special_point",
    "special_line",
    "special_poly",
];

/// The property-scoped domain families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyDomain {
    /// Supervisors working the property.
    Supervisor,
    /// Contractors engaged on the property.
    Contractor,
    /// Compartments subdividing the property.
    Compartment,
    /// Planting species stocked for the property.
    Species,
    /// Chemicals inventoried for the property.
    Chemical,
}

impl PropertyDomain {
    /// Every family, in refresh order.
    pub const ALL: [Self; 5] = [
        Self::Supervisor,
        Self::Contractor,
        Self::Compartment,
        Self::Species,
        Self::Chemical,
    ];

    /// Short name used in domain and file names.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Contractor => "contractor",
            Self::Compartment => "compartment",
            Self::Species => "species",
            Self::Chemical => "chemical",
        }
    }

    /// Value type of the family's codes.
    #[must_use]
    pub const fn kind(self) -> DomainKind {
        match self {
            Self::Supervisor | Self::Species => DomainKind::Text,
            Self::Contractor | Self::Compartment | Self::Chemical => DomainKind::Integer,
        }
    }

    /// Attribute field the family binds to.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Contractor => "contractor_id",
            Self::Compartment => "compartment_id",
            Self::Species => "species",
            Self::Chemical => "chemical_id",
        }
    }

    /// Whether the family binds to the chemical dataset rather than the
    /// activity dataset.
    #[must_use]
    pub const fn binds_to_chemicals(self) -> bool {
        matches!(self, Self::Chemical)
    }

    /// The configured statement feeding the family.
    #[must_use]
    pub fn statement(self, procedures: &Procedures) -> &str {
        match self {
            Self::Supervisor => &procedures.supervisor,
            Self::Contractor => &procedures.contractor,
            Self::Compartment => &procedures.compartment,
            Self::Species => &procedures.species,
            Self::Chemical => &procedures.chemical,
        }
    }

    /// Domain name for one property, e.g. `423_supervisor`.
    #[must_use]
    pub fn domain_name(self, property_id: ObjectId) -> String {
        format!("{property_id}_{}", self.key())
    }
}

/// Outcome of a property-scoped refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyDomainRefresh {
    /// Domains replaced from procedure rows.
    pub refreshed: usize,
    /// Domains left unchanged because the procedure returned no rows.
    pub skipped: usize,
}

/// Errors raised during domain synchronization.
#[derive(Debug, Error)]
pub enum DomainSyncError {
    /// A fixture file failed to read or parse.
    #[error(transparent)]
    Table(#[from] TableError),
    /// A refreshed domain failed validation.
    #[error(transparent)]
    Domain(#[from] CodedDomainError),
    /// The store rejected an operation.
    #[error(transparent)]
    Store(#[from] GeodatabaseError),
    /// A feeding procedure failed.
    #[error("procedure for domain {domain:?} failed")]
    Procedure {
        /// Domain being refreshed.
        domain: String,
        /// Underlying procedure failure.
        #[source]
        source: ProcedureError,
    },
    /// A procedure result did not carry code and description columns.
    #[error("procedure result for domain {domain:?} does not have two columns")]
    ResultShape {
        /// Domain being refreshed.
        domain: String,
    },
}

/// Replace every universal domain from its CSV fixture. Returns the number
/// of domains replaced.
pub fn refresh_universal_domains(
    gdb: &Geodatabase,
    domains_dir: &Utf8Path,
    log: &RunLog,
) -> Result<usize, DomainSyncError> {
    for name in UNIVERSAL_DOMAINS {
        let path = domains_dir.join(format!("{name}.csv"));
        let values = table::read_coded_values(&path)?;
        let domain = CodedDomain::new(name, DomainKind::Text, values)?;
        gdb.replace_domain(&domain)?;
        log.message(&format!("...Overwrote domain: {name}"));
    }
    Ok(UNIVERSAL_DOMAINS.len())
}

/// Refresh every property-scoped domain family for the given properties.
///
/// Each non-empty procedure result is written to
/// `<working_dir>/<id>_<family>.csv` and replaces the matching domain;
/// empty results are skipped with a log message. The first failure aborts
/// the whole refresh.
pub fn refresh_property_domains(
    gdb: &Geodatabase,
    runner: &dyn ProcedureRunner,
    procedures: &Procedures,
    working_dir: &Utf8Path,
    property_ids: &[ObjectId],
    log: &RunLog,
) -> Result<PropertyDomainRefresh, DomainSyncError> {
    let mut outcome = PropertyDomainRefresh::default();
    for &property_id in property_ids {
        for family in PropertyDomain::ALL {
            let name = family.domain_name(property_id);
            let result = runner
                .fetch(family.statement(procedures), Some(property_id))
                .map_err(|source| DomainSyncError::Procedure {
                    domain: name.clone(),
                    source,
                })?;
            if result.is_empty() {
                log.message(&format!("...No rows for domain {name}; left unchanged"));
                outcome.skipped += 1;
                continue;
            }

            let out_path = working_dir.join(format!("{name}.csv"));
            table::write_table(&out_path, &result)?;
            let domain = CodedDomain::new(&name, family.kind(), coded_values(&name, &result)?)?;
            gdb.replace_domain(&domain)?;
            log.message(&format!(
                "...{} domain updated for property {property_id}",
                family.key()
            ));
            outcome.refreshed += 1;
        }
    }
    Ok(outcome)
}

fn coded_values(
    domain: &str,
    result: &TabularResult,
) -> Result<Vec<CodedValue>, DomainSyncError> {
    result
        .rows
        .iter()
        .map(|row| {
            let mut fields = row.iter();
            match (fields.next(), fields.next()) {
                (Some(code), Some(description)) => {
                    Ok(CodedValue::new(code.clone(), description.clone()))
                }
                _ => Err(DomainSyncError::ResultShape {
                    domain: domain.to_owned(),
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct CannedRunner {
        result: TabularResult,
    }

    impl ProcedureRunner for CannedRunner {
        fn fetch(
            &self,
            _statement: &str,
            _parameter: Option<i64>,
        ) -> Result<TabularResult, ProcedureError> {
            Ok(self.result.clone())
        }

        fn execute(&self, _statement: &str, _parameter: Option<i64>) -> Result<(), ProcedureError> {
            Ok(())
        }
    }

    #[fixture]
    fn scratch() -> (TempDir, Utf8PathBuf, RunLog) {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        let log = RunLog::create(&root.join("logs"), "domains").expect("create log");
        (dir, root, log)
    }

    fn procedures() -> Procedures {
        Procedures {
            supervisor: "unused".into(),
            contractor: "unused".into(),
            compartment: "unused".into(),
            species: "unused".into(),
            chemical: "unused".into(),
            stand_overlay: "unused".into(),
            itemsets: "unused".into(),
            chemical_defaults: "unused".into(),
        }
    }

    fn two_column_result() -> TabularResult {
        TabularResult {
            columns: vec!["code".into(), "description".into()],
            rows: vec![
                vec!["11".into(), "Crew A".into()],
                vec!["12".into(), "Crew B".into()],
            ],
        }
    }

    #[rstest]
    fn universal_refresh_replaces_every_fixture(scratch: (TempDir, Utf8PathBuf, RunLog)) {
        let (_dir, root, log) = scratch;
        let fixtures = root.join("domains");
        std::fs::create_dir_all(fixtures.as_std_path()).expect("create fixtures dir");
        for name in UNIVERSAL_DOMAINS {
            std::fs::write(
                fixtures.join(format!("{name}.csv")).as_std_path(),
                "code,description\nA,Alpha\n",
            )
            .expect("write fixture");
        }

        let gdb = Geodatabase::open_in_memory().expect("open workspace");
        let replaced =
            refresh_universal_domains(&gdb, &fixtures, &log).expect("refresh universal domains");
        assert_eq!(replaced, UNIVERSAL_DOMAINS.len());

        let stored = gdb.domain("act_status").expect("read").expect("stored");
        assert_eq!(stored.values, vec![CodedValue::new("A", "Alpha")]);
    }

    #[rstest]
    fn universal_refresh_is_idempotent(scratch: (TempDir, Utf8PathBuf, RunLog)) {
        let (_dir, root, log) = scratch;
        let fixtures = root.join("domains");
        std::fs::create_dir_all(fixtures.as_std_path()).expect("create fixtures dir");
        for name in UNIVERSAL_DOMAINS {
            std::fs::write(
                fixtures.join(format!("{name}.csv")).as_std_path(),
                "code,description\nP,Planned\nC,Complete\n",
            )
            .expect("write fixture");
        }

        let gdb = Geodatabase::open_in_memory().expect("open workspace");
        refresh_universal_domains(&gdb, &fixtures, &log).expect("first refresh");
        let first = gdb.domain("plant_stock").expect("read").expect("stored");
        refresh_universal_domains(&gdb, &fixtures, &log).expect("second refresh");
        let second = gdb.domain("plant_stock").expect("read").expect("stored");
        assert_eq!(first, second);
    }

    #[rstest]
    fn missing_fixture_aborts_universal_refresh(scratch: (TempDir, Utf8PathBuf, RunLog)) {
        let (_dir, root, log) = scratch;
        let fixtures = root.join("domains");
        std::fs::create_dir_all(fixtures.as_std_path()).expect("create fixtures dir");

        let gdb = Geodatabase::open_in_memory().expect("open workspace");
        let err = refresh_universal_domains(&gdb, &fixtures, &log)
            .expect_err("missing fixture should fail");
        assert!(matches!(err, DomainSyncError::Table(TableError::Read { .. })));
    }

    #[rstest]
    fn property_refresh_replaces_and_writes_csv(scratch: (TempDir, Utf8PathBuf, RunLog)) {
        let (_dir, root, log) = scratch;
        let working = root.join("working");
        let gdb = Geodatabase::open_in_memory().expect("open workspace");
        let runner = CannedRunner {
            result: two_column_result(),
        };

        let outcome = refresh_property_domains(
            &gdb,
            &runner,
            &procedures(),
            &working,
            &[423],
            &log,
        )
        .expect("refresh property domains");
        assert_eq!(outcome.refreshed, PropertyDomain::ALL.len());
        assert_eq!(outcome.skipped, 0);

        let stored = gdb.domain("423_contractor").expect("read").expect("stored");
        assert_eq!(stored.kind, DomainKind::Integer);
        assert_eq!(stored.values.len(), 2);
        assert!(working.join("423_supervisor.csv").as_std_path().exists());
    }

    #[rstest]
    fn empty_results_leave_domains_unchanged(scratch: (TempDir, Utf8PathBuf, RunLog)) {
        let (_dir, root, log) = scratch;
        let gdb = Geodatabase::open_in_memory().expect("open workspace");
        let seeded = CodedDomain::new(
            "423_supervisor",
            DomainKind::Text,
            vec![CodedValue::new("S1", "Ranger")],
        )
        .expect("valid domain");
        gdb.replace_domain(&seeded).expect("seed domain");

        let runner = CannedRunner {
            result: TabularResult {
                columns: vec!["code".into(), "description".into()],
                rows: Vec::new(),
            },
        };
        let outcome = refresh_property_domains(
            &gdb,
            &runner,
            &procedures(),
            &root.join("working"),
            &[423],
            &log,
        )
        .expect("refresh property domains");
        assert_eq!(outcome.refreshed, 0);
        assert_eq!(outcome.skipped, PropertyDomain::ALL.len());

        let stored = gdb.domain("423_supervisor").expect("read").expect("stored");
        assert_eq!(stored.values, vec![CodedValue::new("S1", "Ranger")]);
    }

    #[rstest]
    fn integer_families_reject_text_codes(scratch: (TempDir, Utf8PathBuf, RunLog)) {
        let (_dir, root, log) = scratch;
        let gdb = Geodatabase::open_in_memory().expect("open workspace");
        let runner = CannedRunner {
            result: TabularResult {
                columns: vec!["code".into(), "description".into()],
                rows: vec![vec!["not-a-number".into(), "Crew".into()]],
            },
        };

        let err = refresh_property_domains(
            &gdb,
            &runner,
            &procedures(),
            &root.join("working"),
            &[423],
            &log,
        )
        .expect_err("text code in integer family should fail");
        assert!(matches!(
            err,
            DomainSyncError::Domain(CodedDomainError::NonNumericCode { .. })
        ));
    }
}
