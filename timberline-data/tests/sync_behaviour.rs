//! End-to-end behaviour of the mobile reconciliation engine against an
//! on-disk workspace and procedure database.

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use rusqlite::Connection;
use tempfile::TempDir;

use timberline_core::store::{DatasetKind, Geodatabase};
use timberline_core::test_support::{sample_property, sample_stand};
use timberline_core::{Attributes, LinkTarget, MobileActivity, MobileChemical};
use timberline_data::reconcile::ACTIVE_RECORD_CONTEXT;
use timberline_data::{RunLog, SqlProcedures, SyncDatasets, SyncError, run_sync};

const OVERLAY_STATEMENT: &str = "INSERT INTO overlay_queue (activity_id) VALUES (?1)";

struct Harness {
    _dir: TempDir,
    gdb: Geodatabase,
    procs: SqlProcedures,
    procs_path: Utf8PathBuf,
    datasets: SyncDatasets,
    log: RunLog,
}

#[fixture]
fn harness() -> Harness {
    let dir = TempDir::new().expect("create temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");

    let gdb = Geodatabase::open(root.join("workspace.gdb")).expect("open workspace");
    let datasets = SyncDatasets {
        activities: "activities".into(),
        chemicals: "chem_apps".into(),
        properties: "properties".into(),
        stands: "stands".into(),
        activity_staging: "act_staging".into(),
        chemical_staging: "chem_staging".into(),
        mobile_activities: "mobile_acts".into(),
        mobile_chemicals: "mobile_chems".into(),
    };
    for (name, kind) in [
        ("activities", DatasetKind::Activity),
        ("chem_apps", DatasetKind::Chemical),
        ("properties", DatasetKind::Property),
        ("stands", DatasetKind::Stand),
        ("act_staging", DatasetKind::ActivityStaging),
        ("chem_staging", DatasetKind::ChemicalStaging),
        ("mobile_acts", DatasetKind::MobileActivity),
        ("mobile_chems", DatasetKind::MobileChemical),
    ] {
        gdb.create_dataset(name, kind).expect("create dataset");
    }

    let procs_path = root.join("resource.db");
    {
        let conn = Connection::open(procs_path.as_std_path()).expect("create procedure db");
        conn.execute_batch("CREATE TABLE overlay_queue (activity_id INTEGER NOT NULL)")
            .expect("seed procedure db");
    }
    let procs = SqlProcedures::connect(&procs_path).expect("connect procedures");
    let log = RunLog::create(&root.join("logs"), "sync").expect("create run log");

    Harness {
        _dir: dir,
        gdb,
        procs,
        procs_path,
        datasets,
        log,
    }
}

fn mobile_activity(
    object_id: i64,
    key: &str,
    link: LinkTarget,
    property_id: Option<i64>,
    stand_id: Option<i64>,
) -> MobileActivity {
    MobileActivity::new(
        object_id,
        key.parse().expect("valid key"),
        link,
        property_id,
        stand_id,
        Attributes::from([("status".to_owned(), "Planned".to_owned())]),
    )
    .expect("valid mobile activity")
}

fn overlay_queue(path: &Utf8PathBuf) -> Vec<i64> {
    let conn = Connection::open(path.as_std_path()).expect("open procedure db");
    let mut stmt = conn
        .prepare("SELECT activity_id FROM overlay_queue ORDER BY activity_id")
        .expect("prepare");
    let ids = stmt
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<Result<Vec<i64>, _>>()
        .expect("collect");
    ids
}

#[rstest]
fn property_activities_inherit_the_parcel_boundary(mut harness: Harness) {
    let property = sample_property(7, "North Block");
    harness
        .gdb
        .insert_property("properties", &property)
        .expect("seed property");
    harness
        .gdb
        .insert_mobile_activity(
            "mobile_acts",
            &mobile_activity(1, "P1", LinkTarget::Property, Some(7), None),
        )
        .expect("seed mobile activity");

    let report = run_sync(
        &mut harness.gdb,
        &harness.procs,
        OVERLAY_STATEMENT,
        &harness.datasets,
        &harness.log,
    )
    .expect("run sync");

    assert_eq!(report.property_activities, 1);
    assert_eq!(report.stand_activities, 0);

    let records = harness.gdb.activities("activities").expect("read activities");
    assert_eq!(records.len(), 1);
    let record = records.first().expect("record");
    assert_eq!(record.boundary.as_ref(), Some(&property.boundary));
    assert_eq!(record.property_global_id, Some(property.global_id));
    assert_eq!(
        record.parent_key.as_ref().map(ToString::to_string),
        Some("P1".to_owned())
    );

    // Staging is consumed by the run.
    assert_eq!(harness.gdb.row_count("mobile_acts").expect("count"), 0);
    assert_eq!(harness.gdb.row_count("act_staging").expect("count"), 0);
}

#[rstest]
fn stand_activities_take_stand_geometry_and_run_the_overlay(mut harness: Harness) {
    // The worked example: mobile row 10, key A1, stand 5 with polygon P.
    let stand = sample_stand(5, 7);
    harness.gdb.insert_stand("stands", &stand).expect("seed stand");
    harness
        .gdb
        .insert_mobile_activity(
            "mobile_acts",
            &mobile_activity(10, "A1", LinkTarget::Stand, None, Some(5)),
        )
        .expect("seed mobile activity");

    let report = run_sync(
        &mut harness.gdb,
        &harness.procs,
        OVERLAY_STATEMENT,
        &harness.datasets,
        &harness.log,
    )
    .expect("run sync");

    assert_eq!(report.stand_activities, 1);
    assert_eq!(report.overlays, 1);

    let records = harness.gdb.activities("activities").expect("read activities");
    let record = records.first().expect("record");
    assert_eq!(record.boundary.as_ref(), Some(&stand.boundary));
    assert_eq!(record.stand_id, Some(5));
    assert_eq!(
        record.parent_key.as_ref().map(ToString::to_string),
        Some("A1".to_owned())
    );

    // The overlay ran once, with the recovered platform id.
    assert_eq!(overlay_queue(&harness.procs_path), vec![record.object_id]);
}

#[rstest]
fn chemicals_backfill_through_the_correlation_keys(mut harness: Harness) {
    let stand = sample_stand(5, 7);
    harness.gdb.insert_stand("stands", &stand).expect("seed stand");
    harness
        .gdb
        .insert_mobile_activity(
            "mobile_acts",
            &mobile_activity(10, "A1", LinkTarget::Stand, None, Some(5)),
        )
        .expect("seed mobile activity");
    for (object_id, child_key) in [(1, "A1"), (2, "ZZ")] {
        harness
            .gdb
            .insert_mobile_chemical(
                "mobile_chems",
                &MobileChemical {
                    object_id,
                    child_key: child_key.parse().expect("valid key"),
                    context_id: 8,
                    attributes: Attributes::new(),
                },
            )
            .expect("seed mobile chemical");
    }

    let report = run_sync(
        &mut harness.gdb,
        &harness.procs,
        OVERLAY_STATEMENT,
        &harness.datasets,
        &harness.log,
    )
    .expect("run sync");

    // Two mobile rows, each appended once plus one active-record copy.
    assert_eq!(report.chemicals, 4);
    assert_eq!(report.unmatched_chemicals, 1);

    let activity = harness
        .gdb
        .activities("activities")
        .expect("read activities")
        .into_iter()
        .next()
        .expect("activity record");

    let chemicals = harness.gdb.chemicals("chem_apps").expect("read chemicals");
    assert_eq!(chemicals.len(), 4);

    let matched: Vec<_> = chemicals
        .iter()
        .filter(|record| {
            record.child_key.as_ref().map(ToString::to_string) == Some("A1".to_owned())
        })
        .collect();
    assert_eq!(matched.len(), 2);
    // Both the original row and its forced active-record copy are linked.
    for record in &matched {
        assert_eq!(record.activity_id, Some(activity.object_id));
        assert_eq!(record.activity_global_id, Some(activity.global_id));
    }
    assert!(matched.iter().any(|r| r.context_id == ACTIVE_RECORD_CONTEXT));
    assert!(matched.iter().any(|r| r.context_id == 8));

    // The unmatched key stays unlinked, without failing the run.
    let unmatched: Vec<_> = chemicals
        .iter()
        .filter(|record| {
            record.child_key.as_ref().map(ToString::to_string) == Some("ZZ".to_owned())
        })
        .collect();
    assert_eq!(unmatched.len(), 2);
    assert!(unmatched.iter().all(|record| !record.is_linked()));

    // Once staging is cleared the run is idempotent.
    let rerun = run_sync(
        &mut harness.gdb,
        &harness.procs,
        OVERLAY_STATEMENT,
        &harness.datasets,
        &harness.log,
    )
    .expect("second run");
    assert_eq!(rerun.chemicals, 0);
    assert_eq!(
        harness.gdb.chemicals("chem_apps").expect("read chemicals").len(),
        4
    );
}

#[rstest]
fn empty_staging_is_a_logged_no_op_that_still_clears(mut harness: Harness) {
    let report = run_sync(
        &mut harness.gdb,
        &harness.procs,
        OVERLAY_STATEMENT,
        &harness.datasets,
        &harness.log,
    )
    .expect("run sync");

    assert_eq!(report, Default::default());
    for name in ["mobile_acts", "mobile_chems", "act_staging", "chem_staging"] {
        assert_eq!(harness.gdb.row_count(name).expect("count"), 0);
    }
    let logged = std::fs::read_to_string(harness.log.path().as_std_path()).expect("read log");
    assert!(logged.contains("No new records to add"));
    assert!(logged.contains("...Cleared mobile datasets"));
}

#[rstest]
fn missing_datasets_abort_the_run(mut harness: Harness) {
    let mut datasets = harness.datasets.clone();
    datasets.stands = "missing_stands".into();

    let err = run_sync(
        &mut harness.gdb,
        &harness.procs,
        OVERLAY_STATEMENT,
        &datasets,
        &harness.log,
    )
    .expect_err("missing dataset should abort");
    assert!(matches!(err, SyncError::DatasetMissing { name } if name == "missing_stands"));
}

#[rstest]
fn overlay_failures_abort_after_the_append(mut harness: Harness) {
    let stand = sample_stand(5, 7);
    harness.gdb.insert_stand("stands", &stand).expect("seed stand");
    harness
        .gdb
        .insert_mobile_activity(
            "mobile_acts",
            &mobile_activity(10, "A1", LinkTarget::Stand, None, Some(5)),
        )
        .expect("seed mobile activity");

    let err = run_sync(
        &mut harness.gdb,
        &harness.procs,
        "INSERT INTO no_such_table (activity_id) VALUES (?1)",
        &harness.datasets,
        &harness.log,
    )
    .expect_err("broken overlay should abort");
    assert!(matches!(err, SyncError::Overlay { .. }));

    // The stand append committed before the overlay step failed.
    assert_eq!(harness.gdb.activities("activities").expect("read").len(), 1);
    // Cleanup never ran, so staging still holds the mobile row.
    assert_eq!(harness.gdb.row_count("mobile_acts").expect("count"), 1);
}
