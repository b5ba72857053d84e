//! `timberline sync` reconciles mobile data into the authoritative
//! datasets.

use camino::Utf8PathBuf;
use clap::Args;

use timberline_core::store::Geodatabase;
use timberline_data::{RunLog, Settings, SqlProcedures, SyncDatasets, SyncReport, run_sync};

use super::log_failure;
use crate::CliError;

/// Arguments for `timberline sync`.
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Path of the settings document.
    #[arg(long, value_name = "path", default_value = "config.json")]
    pub config: Utf8PathBuf,
}

impl SyncArgs {
    /// Run the reconciliation job.
    pub fn run(self) -> Result<(), CliError> {
        let settings = Settings::load(&self.config)?;
        let log = RunLog::create(&settings.directories.logs, "sync")?;
        log.message("...All configurations loaded");

        let report = log_failure(&log, reconcile(&settings, &log))?;
        log.message(&format!(
            "Finished sync: {} property, {} stand, {} chemical record(s); \
             {} overlay(s), {} backfilled, {} unmatched",
            report.property_activities,
            report.stand_activities,
            report.chemicals,
            report.overlays,
            report.backfilled,
            report.unmatched_chemicals,
        ));
        Ok(())
    }
}

fn reconcile(settings: &Settings, log: &RunLog) -> Result<SyncReport, CliError> {
    let mut gdb = Geodatabase::open(&settings.workspace)?;
    let procs = SqlProcedures::connect(&settings.database.database)?;
    let datasets = SyncDatasets::from_settings(settings);
    Ok(run_sync(
        &mut gdb,
        &procs,
        &settings.procedures.stand_overlay,
        &datasets,
        log,
    )?)
}
