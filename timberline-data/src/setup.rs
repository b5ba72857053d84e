//! One-time environment setup.
//!
//! A linear sequence of schema changes preparing a workspace for the mobile
//! workflow: global-id columns, staging datasets, correlation-key columns,
//! universal and property-scoped domains, property subtypes, and
//! relationship classes. Each step fails fast; already-applied steps are
//! not undone on a later failure.

use thiserror::Error;

use timberline_core::store::{
    DatasetKind, Geodatabase, GeodatabaseError, RelationshipClass, RelationshipKeying,
};

use crate::config::{PropertyFlag, Settings};
use crate::domains::{self, DomainSyncError, PropertyDomain};
use crate::procs::ProcedureRunner;
use crate::runlog::RunLog;

/// The relationship class that stays keyed by correlation keys: mobile rows
/// never receive global ids.
pub const MOBILE_LINK_RELATIONSHIP: &str = "mobile_activity_chemicals";

/// Counts from one setup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupReport {
    /// Datasets that gained a global-id column.
    pub global_id_columns: usize,
    /// Universal domains created.
    pub universal_domains: usize,
    /// Property-scoped domains populated.
    pub property_domains: usize,
    /// Property-scoped domains created empty (no procedure rows yet).
    pub empty_domains: usize,
    /// Subtype codes registered.
    pub subtypes: usize,
    /// Relationship classes created.
    pub relationships: usize,
}

/// Errors that abort a setup run.
#[derive(Debug, Error)]
pub enum SetupError {
    /// A configured dataset is absent from the workspace.
    #[error("could not find dataset {name:?}")]
    DatasetMissing {
        /// The missing dataset.
        name: String,
    },
    /// The store rejected an operation.
    #[error(transparent)]
    Store(#[from] GeodatabaseError),
    /// Domain creation or population failed.
    #[error(transparent)]
    Domains(#[from] DomainSyncError),
    /// A property key in the settings did not parse.
    #[error(transparent)]
    Settings(#[from] crate::config::SettingsError),
}

/// Run the full setup sequence.
pub fn run_setup(
    gdb: &Geodatabase,
    runner: &dyn ProcedureRunner,
    settings: &Settings,
    log: &RunLog,
) -> Result<SetupReport, SetupError> {
    let mut report = SetupReport::default();
    let datasets = &settings.datasets;

    verify_datasets(gdb, settings, log)?;
    report.global_id_columns = ensure_global_ids(gdb, settings, log)?;
    provision_staging(gdb, settings, log)?;
    add_correlation_columns(gdb, settings, log)?;

    report.universal_domains =
        domains::refresh_universal_domains(gdb, &settings.directories.domains, log)?;
    assign_universal_domains(gdb, settings, log)?;

    let properties = settings.property_entries()?;
    report.subtypes = create_subtypes(gdb, settings, &properties, log)?;

    for property in &properties {
        for family in PropertyDomain::ALL {
            let name = family.domain_name(property.object_id);
            gdb.create_domain(&name, family.kind())?;
            let dataset = if family.binds_to_chemicals() {
                &datasets.chemicals
            } else {
                &datasets.activities
            };
            gdb.assign_domain(dataset, family.field(), &name, Some(property.object_id))?;
        }
        let refreshed = domains::refresh_property_domains(
            gdb,
            runner,
            &settings.procedures,
            &settings.directories.working,
            &[property.object_id],
            log,
        )?;
        report.property_domains += refreshed.refreshed;
        report.empty_domains += refreshed.skipped;
        log.message(&format!(
            "...Domains created for property {}",
            property.object_id
        ));
    }

    report.relationships = create_relationships(gdb, settings, log)?;
    migrate_relationships(gdb, log)?;

    if let Err(err) = timberline_fs::clear_dir(&settings.directories.working) {
        log.message(&format!("Failed to clean working directory: {err}"));
    } else {
        log.message("...Cleaned working directory");
    }

    Ok(report)
}

fn verify_datasets(
    gdb: &Geodatabase,
    settings: &Settings,
    log: &RunLog,
) -> Result<(), SetupError> {
    for name in authoritative_datasets(settings) {
        if !gdb.dataset_exists(name)? {
            return Err(SetupError::DatasetMissing {
                name: name.to_owned(),
            });
        }
        log.message(&format!("...Found dataset: {name}"));
    }
    Ok(())
}

fn ensure_global_ids(
    gdb: &Geodatabase,
    settings: &Settings,
    log: &RunLog,
) -> Result<usize, SetupError> {
    let mut added = 0usize;
    for name in authoritative_datasets(settings) {
        if gdb.ensure_global_id_column(name)? {
            added += 1;
        }
    }
    log.message("...Global ids present on all datasets");
    Ok(added)
}

fn provision_staging(
    gdb: &Geodatabase,
    settings: &Settings,
    log: &RunLog,
) -> Result<(), SetupError> {
    gdb.create_dataset(&settings.mobile_datasets.activities, DatasetKind::MobileActivity)?;
    gdb.create_dataset(&settings.mobile_datasets.chemicals, DatasetKind::MobileChemical)?;
    gdb.create_dataset(&settings.datasets.activity_staging, DatasetKind::ActivityStaging)?;
    gdb.create_dataset(&settings.datasets.chemical_staging, DatasetKind::ChemicalStaging)?;
    log.message("...Provisioned mobile and intermediate staging datasets");
    Ok(())
}

fn add_correlation_columns(
    gdb: &Geodatabase,
    settings: &Settings,
    log: &RunLog,
) -> Result<(), SetupError> {
    gdb.ensure_guid_column(&settings.datasets.activities, "parent_key")?;
    gdb.ensure_guid_column(&settings.datasets.chemicals, "child_key")?;
    log.message("...Correlation-key columns present on activity and chemical datasets");
    Ok(())
}

fn assign_universal_domains(
    gdb: &Geodatabase,
    settings: &Settings,
    log: &RunLog,
) -> Result<(), SetupError> {
    let datasets = &settings.datasets;
    let bindings: [(&str, &str, &str); 7] = [
        (&datasets.activities, "status", "act_status"),
        (&datasets.activities, "planting_pattern", "plant_pattern"),
        (&datasets.activities, "stock_type", "plant_stock"),
        (&datasets.harvest, "status", "harv_status"),
        (&datasets.special_points, "kind", "special_point"),
        (&datasets.special_lines, "kind", "special_line"),
        (&datasets.special_polygons, "kind", "special_poly"),
    ];
    for (dataset, field, domain) in bindings {
        gdb.assign_domain(dataset, field, domain, None)?;
    }
    log.message("...Assigned all universal domains to fields");
    Ok(())
}

fn create_subtypes(
    gdb: &Geodatabase,
    settings: &Settings,
    properties: &[PropertyFlag],
    log: &RunLog,
) -> Result<usize, SetupError> {
    let datasets = &settings.datasets;
    gdb.set_subtype_field(&datasets.activities, "property_id")?;
    gdb.set_subtype_field(&datasets.chemicals, "property_id")?;
    let mut registered = 0usize;
    for property in properties {
        gdb.add_subtype(&datasets.activities, property.object_id, &property.name)?;
        gdb.add_subtype(&datasets.chemicals, property.object_id, &property.name)?;
        registered += 2;
    }
    log.message("...Created property subtypes on activity and chemical datasets");
    Ok(registered)
}

fn create_relationships(
    gdb: &Geodatabase,
    settings: &Settings,
    log: &RunLog,
) -> Result<usize, SetupError> {
    let datasets = &settings.datasets;
    let mobile = &settings.mobile_datasets;
    let classes = [
        RelationshipClass {
            name: "property_activities".to_owned(),
            origin: datasets.properties.clone(),
            destination: datasets.activities.clone(),
            origin_key: "object_id".to_owned(),
            foreign_key: "property_id".to_owned(),
            keyed_by: RelationshipKeying::Attribute,
        },
        RelationshipClass {
            name: "activity_chemicals".to_owned(),
            origin: datasets.activities.clone(),
            destination: datasets.chemicals.clone(),
            origin_key: "object_id".to_owned(),
            foreign_key: "activity_id".to_owned(),
            keyed_by: RelationshipKeying::Attribute,
        },
        RelationshipClass {
            name: MOBILE_LINK_RELATIONSHIP.to_owned(),
            origin: mobile.activities.clone(),
            destination: mobile.chemicals.clone(),
            origin_key: "parent_key".to_owned(),
            foreign_key: "child_key".to_owned(),
            keyed_by: RelationshipKeying::Attribute,
        },
        RelationshipClass {
            name: "harvest_products".to_owned(),
            origin: datasets.harvest.clone(),
            destination: datasets.harvest_products.clone(),
            origin_key: "object_id".to_owned(),
            foreign_key: "harvest_id".to_owned(),
            keyed_by: RelationshipKeying::Attribute,
        },
    ];
    let created = classes.len();
    for class in classes {
        gdb.create_relationship(&class)?;
        log.message(&format!("...Relationship class created: {}", class.name));
    }
    Ok(created)
}

fn migrate_relationships(gdb: &Geodatabase, log: &RunLog) -> Result<(), SetupError> {
    for name in [
        "property_activities",
        "activity_chemicals",
        "harvest_products",
    ] {
        gdb.migrate_relationship(name)?;
    }
    log.message("...Converted relationship classes to global-id keying");
    Ok(())
}

fn authoritative_datasets(settings: &Settings) -> [&str; 11] {
    let datasets = &settings.datasets;
    [
        &datasets.activities,
        &datasets.chemicals,
        &datasets.properties,
        &datasets.stands,
        &datasets.activity_staging,
        &datasets.chemical_staging,
        &datasets.harvest,
        &datasets.harvest_products,
        &datasets.special_points,
        &datasets.special_lines,
        &datasets.special_polygons,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_document;
    use crate::procs::{ProcedureError, TabularResult};
    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;
    use timberline_core::DomainKind;

    struct CannedRunner;

    impl ProcedureRunner for CannedRunner {
        fn fetch(
            &self,
            statement: &str,
            _parameter: Option<i64>,
        ) -> Result<TabularResult, ProcedureError> {
            // Integer-coded families get numeric codes; the rest get text.
            let code = if statement.contains("contractors")
                || statement.contains("compartments")
                || statement.contains("chemicals")
            {
                "12"
            } else {
                "S1"
            };
            Ok(TabularResult {
                columns: vec!["code".into(), "description".into()],
                rows: vec![vec![code.into(), "Example".into()]],
            })
        }

        fn execute(&self, _statement: &str, _parameter: Option<i64>) -> Result<(), ProcedureError> {
            Ok(())
        }
    }

    fn settings_for(root: &Utf8PathBuf) -> Settings {
        let mut document = sample_document();
        let object = document.as_object_mut().expect("object");
        object.insert(
            "directories".to_owned(),
            serde_json::json!({
                "domains": root.join("domains").as_str(),
                "working": root.join("working").as_str(),
                "logs": root.join("logs").as_str(),
            }),
        );
        serde_json::from_value(document).expect("valid settings")
    }

    fn seeded_workspace(settings: &Settings) -> Geodatabase {
        let gdb = Geodatabase::open_in_memory().expect("open workspace");
        let datasets = &settings.datasets;
        for (name, kind) in [
            (datasets.activities.as_str(), DatasetKind::Activity),
            (datasets.chemicals.as_str(), DatasetKind::Chemical),
            (datasets.properties.as_str(), DatasetKind::Property),
            (datasets.stands.as_str(), DatasetKind::Stand),
            (datasets.activity_staging.as_str(), DatasetKind::ActivityStaging),
            (datasets.chemical_staging.as_str(), DatasetKind::ChemicalStaging),
            (datasets.harvest.as_str(), DatasetKind::Harvest),
            (datasets.harvest_products.as_str(), DatasetKind::HarvestProduct),
            (datasets.special_points.as_str(), DatasetKind::SpecialPoint),
            (datasets.special_lines.as_str(), DatasetKind::SpecialLine),
            (datasets.special_polygons.as_str(), DatasetKind::SpecialPolygon),
        ] {
            gdb.create_dataset(name, kind).expect("create dataset");
        }
        gdb
    }

    fn write_fixtures(settings: &Settings) {
        std::fs::create_dir_all(settings.directories.domains.as_std_path())
            .expect("create fixtures dir");
        for name in crate::domains::UNIVERSAL_DOMAINS {
            std::fs::write(
                settings
                    .directories
                    .domains
                    .join(format!("{name}.csv"))
                    .as_std_path(),
                "code,description\nA,Alpha\n",
            )
            .expect("write fixture");
        }
    }

    #[rstest]
    fn full_setup_provisions_the_workspace() {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        let settings = settings_for(&root);
        write_fixtures(&settings);
        let gdb = seeded_workspace(&settings);
        let log = RunLog::create(&settings.directories.logs, "setup").expect("create log");

        let report = run_setup(&gdb, &CannedRunner, &settings, &log).expect("run setup");

        assert_eq!(report.universal_domains, 7);
        // Five families for each of the three configured properties.
        assert_eq!(report.property_domains, 15);
        assert_eq!(report.subtypes, 6);
        assert_eq!(report.relationships, 4);

        // Stand dataset arrived without a global-id column; setup adds it.
        assert!(gdb.has_column("stands", "global_id").expect("has column"));
        assert!(gdb.dataset_exists("mobile_acts").expect("exists"));
        assert!(gdb.dataset_exists("chem_staging").expect("exists"));

        let binding = gdb
            .domain_binding("activities", "supervisor", Some(423))
            .expect("lookup binding");
        assert_eq!(binding, Some("423_supervisor".to_owned()));
        let chemical_binding = gdb
            .domain_binding("chem_apps", "chemical_id", Some(427))
            .expect("lookup binding");
        assert_eq!(chemical_binding, Some("427_chemical".to_owned()));

        let migrated = gdb
            .relationship("property_activities")
            .expect("read relationship")
            .expect("stored");
        assert_eq!(migrated.keyed_by, RelationshipKeying::GlobalId);
        let mobile = gdb
            .relationship(MOBILE_LINK_RELATIONSHIP)
            .expect("read relationship")
            .expect("stored");
        assert_eq!(mobile.keyed_by, RelationshipKeying::Attribute);
    }

    #[rstest]
    fn missing_dataset_aborts_before_any_change() {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        let settings = settings_for(&root);
        let gdb = Geodatabase::open_in_memory().expect("open workspace");
        let log = RunLog::create(&settings.directories.logs, "setup").expect("create log");

        let err = run_setup(&gdb, &CannedRunner, &settings, &log)
            .expect_err("empty workspace should fail verification");
        assert!(matches!(err, SetupError::DatasetMissing { .. }));
        assert!(!gdb.dataset_exists("mobile_acts").expect("exists"));
    }

    #[rstest]
    fn empty_procedure_results_leave_domains_as_shells() {
        struct EmptyRunner;
        impl ProcedureRunner for EmptyRunner {
            fn fetch(
                &self,
                _statement: &str,
                _parameter: Option<i64>,
            ) -> Result<TabularResult, ProcedureError> {
                Ok(TabularResult::default())
            }

            fn execute(
                &self,
                _statement: &str,
                _parameter: Option<i64>,
            ) -> Result<(), ProcedureError> {
                Ok(())
            }
        }

        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        let settings = settings_for(&root);
        write_fixtures(&settings);
        let gdb = seeded_workspace(&settings);
        let log = RunLog::create(&settings.directories.logs, "setup").expect("create log");

        let report = run_setup(&gdb, &EmptyRunner, &settings, &log).expect("run setup");
        assert_eq!(report.property_domains, 0);
        assert_eq!(report.empty_domains, 15);

        // The shell keeps its declared type for later population.
        let shell = gdb.domain("423_contractor").expect("read").expect("stored");
        assert_eq!(shell.kind, DomainKind::Integer);
        assert!(shell.values.is_empty());
    }
}
