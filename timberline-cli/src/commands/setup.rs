//! `timberline setup` performs the one-time environment preparation.

use camino::Utf8PathBuf;
use clap::Args;

use timberline_core::store::Geodatabase;
use timberline_data::config::Settings;
use timberline_data::services::{ServiceAction, apply_to_all};
use timberline_data::setup::{SetupReport, run_setup};
use timberline_data::{PortalClient, RunLog, SqlProcedures};

use super::log_failure;
use crate::{CliError, prompt};

/// Arguments for `timberline setup`.
#[derive(Debug, Args)]
pub struct SetupArgs {
    /// Path of the settings document.
    #[arg(long, value_name = "path", default_value = "config.json")]
    pub config: Utf8PathBuf,

    /// Skip the interactive confirmation prompt.
    #[arg(long)]
    pub yes: bool,
}

impl SetupArgs {
    /// Run the setup sequence.
    pub fn run(self) -> Result<(), CliError> {
        if !self.yes
            && !prompt::confirm(
                "You have started the process to set up a new mobile workflow \
                 environment.\nHave you checked the settings document?",
            )?
        {
            println!("Exiting!");
            return Ok(());
        }

        let settings = Settings::load(&self.config)?;
        let log = RunLog::create(&settings.directories.logs, "setup")?;
        log.message("...All configurations loaded");

        let portal = log_failure(&log, PortalClient::connect(&settings.portal).map_err(Into::into))?;
        log.message("...Signed into the server");
        log_failure(
            &log,
            apply_to_all(&portal, &settings.portal.folders, ServiceAction::Stop).map_err(Into::into),
        )?;
        log.message("...Stopped all services");

        let report = log_failure(&log, prepare(&settings, &log))?;
        log.message(&format!(
            "Setup complete: {} universal domain(s), {} property domain(s) populated, \
             {} subtype(s), {} relationship class(es)",
            report.universal_domains,
            report.property_domains,
            report.subtypes,
            report.relationships,
        ));

        log_failure(
            &log,
            apply_to_all(&portal, &settings.portal.folders, ServiceAction::Start)
                .map_err(Into::into),
        )?;
        log.message("...Started all services");
        Ok(())
    }
}

fn prepare(settings: &Settings, log: &RunLog) -> Result<SetupReport, CliError> {
    let gdb = Geodatabase::open(&settings.workspace)?;
    let procs = SqlProcedures::connect(&settings.database.database)?;
    Ok(run_setup(&gdb, &procs, settings, log)?)
}
