//! `timberline itemsets` exports form item sets and chemical defaults.

use camino::Utf8PathBuf;
use clap::Args;

use timberline_data::config::{self, Settings};
use timberline_data::itemsets::export_itemsets;
use timberline_data::{RunLog, SqlProcedures};

use super::log_failure;
use crate::{CliError, prompt};

/// Arguments for `timberline itemsets`.
#[derive(Debug, Args)]
pub struct ItemsetsArgs {
    /// Path of the settings document.
    #[arg(long, value_name = "path", default_value = "config.json")]
    pub config: Utf8PathBuf,

    /// Skip the interactive confirmation prompt.
    #[arg(long)]
    pub yes: bool,
}

impl ItemsetsArgs {
    /// Run the export job.
    pub fn run(self) -> Result<(), CliError> {
        if !self.yes
            && !prompt::confirm(
                "You have started the process to export form item sets.\nHave you flagged the \
                 properties needing updates in the settings and saved?",
            )?
        {
            println!("Exiting!");
            return Ok(());
        }

        let settings = Settings::load(&self.config)?;
        let log = RunLog::create(&settings.directories.logs, "itemsets")?;
        log.message("...All configurations loaded");

        let flagged = log_failure(&log, settings.flagged_properties().map_err(Into::into))?;
        if flagged.is_empty() {
            log.message("No properties to update! Exiting...");
            return Ok(());
        }
        let ids: Vec<_> = flagged.iter().map(|flag| flag.object_id).collect();
        log.message(&format!("...Properties to update: {ids:?}"));

        let exports = log_failure(&log, export(&settings, &ids, &log))?;
        log.message(&format!("...Exported files for {} propert(ies)", exports));

        match config::reset_property_flags(&self.config, &settings.ax_properties) {
            Ok(cleared) => log.message(&format!("...Reset {cleared} property flag(s)")),
            Err(err) => log.message(&format!("Failed to reset property flags: {err}")),
        }
        Ok(())
    }
}

fn export(settings: &Settings, ids: &[i64], log: &RunLog) -> Result<usize, CliError> {
    let procs = SqlProcedures::connect(&settings.database.database)?;
    let exports = export_itemsets(
        &procs,
        &settings.procedures,
        &settings.directories.working,
        ids,
        log,
    )?;
    Ok(exports.len())
}
