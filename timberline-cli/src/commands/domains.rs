//! `timberline domains` refreshes the coded-value domains under an
//! exclusive schema lock.

use camino::Utf8PathBuf;
use clap::Args;

use timberline_core::store::Geodatabase;
use timberline_data::config::{self, Settings};
use timberline_data::domains::{refresh_property_domains, refresh_universal_domains};
use timberline_data::services::{ServiceAction, apply_to_all};
use timberline_data::{PortalClient, RunLog, SqlProcedures};

use super::log_failure;
use crate::{CliError, prompt};

/// Arguments for `timberline domains`.
#[derive(Debug, Args)]
pub struct DomainsArgs {
    /// Path of the settings document.
    #[arg(long, value_name = "path", default_value = "config.json")]
    pub config: Utf8PathBuf,

    /// Skip the interactive confirmation prompt.
    #[arg(long)]
    pub yes: bool,
}

impl DomainsArgs {
    /// Run the domain refresh job.
    pub fn run(self) -> Result<(), CliError> {
        if !self.yes
            && !prompt::confirm(
                "You have started the process to update coded-value domains, which requires an \
                 exclusive schema lock.\nAll hosted services will be stopped and then \
                 restarted.\nIf needed, have you updated the universal domain CSVs and flagged \
                 the properties needing updates in the settings?",
            )?
        {
            println!("Exiting!");
            return Ok(());
        }

        let settings = Settings::load(&self.config)?;
        let log = RunLog::create(&settings.directories.logs, "domains")?;
        log.message("...All configurations loaded");

        let portal = log_failure(&log, PortalClient::connect(&settings.portal).map_err(Into::into))?;
        log.message("...Signed into the server");
        log_failure(
            &log,
            apply_to_all(&portal, &settings.portal.folders, ServiceAction::Stop).map_err(Into::into),
        )?;
        log.message("...Stopped all services");

        // Services are restarted only after a successful refresh; a failed
        // refresh leaves the lock for the operator to inspect.
        log_failure(&log, refresh(&settings, &self.config, &log))?;
        log_failure(
            &log,
            apply_to_all(&portal, &settings.portal.folders, ServiceAction::Start)
                .map_err(Into::into),
        )?;
        log.message("...Started all services");
        log.message("Finished domain refresh");
        Ok(())
    }
}

fn refresh(settings: &Settings, config_path: &Utf8PathBuf, log: &RunLog) -> Result<(), CliError> {
    let gdb = Geodatabase::open(&settings.workspace)?;
    refresh_universal_domains(&gdb, &settings.directories.domains, log)?;

    let flagged = settings.flagged_properties()?;
    if flagged.is_empty() {
        log.message("...No properties to update");
    } else {
        let ids: Vec<_> = flagged.iter().map(|flag| flag.object_id).collect();
        log.message(&format!("...Properties to update: {ids:?}"));
        let procs = SqlProcedures::connect(&settings.database.database)?;
        refresh_property_domains(
            &gdb,
            &procs,
            &settings.procedures,
            &settings.directories.working,
            &ids,
            log,
        )?;
    }

    if let Err(err) = timberline_fs::clear_dir(&settings.directories.working) {
        log.message(&format!("Failed to clean working directory: {err}"));
    } else {
        log.message("...Cleaned working directory");
    }

    match config::reset_property_flags(config_path, &settings.ax_properties) {
        Ok(cleared) => log.message(&format!("...Reset {cleared} property flag(s)")),
        Err(err) => log.message(&format!("Failed to reset property flags: {err}")),
    }
    Ok(())
}
