//! Command-line interface for the Timberline workflows.
//!
//! One subcommand per operational job: `sync` reconciles mobile data,
//! `domains` refreshes coded-value domains, `itemsets` exports form item
//! sets, `services` drives the hosted services, and `setup` performs the
//! one-time environment preparation. The mutating jobs gate on a console
//! confirmation unless `--yes` is passed.

#![forbid(unsafe_code)]

mod commands;
mod prompt;

use std::io;

use clap::{Parser, Subcommand};
use thiserror::Error;

use timberline_core::store::GeodatabaseError;
use timberline_data::config::SettingsError;
use timberline_data::domains::DomainSyncError;
use timberline_data::itemsets::ItemsetError;
use timberline_data::procs::ProcedureError;
use timberline_data::reconcile::SyncError;
use timberline_data::runlog::RunLogError;
use timberline_data::services::{ServiceActionError, ServiceError};
use timberline_data::setup::SetupError;

use commands::{
    domains::DomainsArgs, itemsets::ItemsetsArgs, services::ServicesArgs, setup::SetupArgs,
    sync::SyncArgs,
};

/// Run the CLI with the current process arguments.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Sync(args) => args.run(),
        Command::Domains(args) => args.run(),
        Command::Itemsets(args) => args.run(),
        Command::Services(args) => args.run(),
        Command::Setup(args) => args.run(),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "timberline",
    about = "Field-data synchronization tooling for the forestry workspace",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile mobile activities and chemicals into the authoritative datasets.
    Sync(SyncArgs),
    /// Refresh universal and property-scoped coded-value domains.
    Domains(DomainsArgs),
    /// Export form item sets and chemical defaults for flagged properties.
    Itemsets(ItemsetsArgs),
    /// Start or stop every hosted service.
    Services(ServicesArgs),
    /// Perform one-time environment setup for the mobile workflow.
    Setup(SetupArgs),
}

/// Errors emitted by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// The settings document failed to load.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// The run log could not be created.
    #[error(transparent)]
    RunLog(#[from] RunLogError),
    /// The geodatabase rejected an operation.
    #[error(transparent)]
    Store(#[from] GeodatabaseError),
    /// The procedure database rejected an operation.
    #[error(transparent)]
    Procedures(#[from] ProcedureError),
    /// Mobile reconciliation failed.
    #[error(transparent)]
    Sync(#[from] SyncError),
    /// Domain synchronization failed.
    #[error(transparent)]
    Domains(#[from] DomainSyncError),
    /// Environment setup failed.
    #[error(transparent)]
    Setup(#[from] SetupError),
    /// Service control failed.
    #[error(transparent)]
    Services(#[from] ServiceError),
    /// The typed service action was not recognised.
    #[error(transparent)]
    ServiceAction(#[from] ServiceActionError),
    /// Item-set export failed.
    #[error(transparent)]
    Itemsets(#[from] ItemsetError),
    /// Reading console input failed.
    #[error("failed to read console input")]
    Prompt {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}
