//! `timberline services` starts or stops every hosted service.

use camino::Utf8PathBuf;
use clap::Args;
use log::info;

use timberline_data::config::Settings;
use timberline_data::services::{ServiceAction, apply_to_all};
use timberline_data::PortalClient;

use crate::{CliError, prompt};

/// Arguments for `timberline services`.
#[derive(Debug, Args)]
pub struct ServicesArgs {
    /// `start` or `stop`; prompted for when omitted.
    #[arg(value_name = "action")]
    pub action: Option<String>,

    /// Path of the settings document.
    #[arg(long, value_name = "path", default_value = "config.json")]
    pub config: Utf8PathBuf,

    /// Skip the interactive confirmation prompt.
    #[arg(long)]
    pub yes: bool,
}

impl ServicesArgs {
    /// Run the service sweep.
    pub fn run(self) -> Result<(), CliError> {
        if !self.yes
            && !prompt::confirm(
                "You have started the process to start or stop all hosted services.",
            )?
        {
            println!("Exiting!");
            return Ok(());
        }

        let raw = match self.action {
            Some(action) => action,
            None => prompt::read_line(
                "Please type \"START\" or \"STOP\" and press ENTER to drive all services...",
            )?,
        };
        let action: ServiceAction = raw.parse()?;

        let settings = Settings::load(&self.config)?;
        let portal = PortalClient::connect(&settings.portal)?;
        let driven = apply_to_all(&portal, &settings.portal.folders, action)?;
        info!("Applied {action} to {} service(s)", driven.len());
        Ok(())
    }
}
