//! Subcommand implementations.

pub mod domains;
pub mod itemsets;
pub mod services;
pub mod setup;
pub mod sync;

use timberline_data::RunLog;

use crate::CliError;

/// Append a failure to the run log before propagating it, so the log file
/// records why the run ended.
pub(crate) fn log_failure<T>(log: &RunLog, outcome: Result<T, CliError>) -> Result<T, CliError> {
    if let Err(err) = &outcome {
        log.message(&format!("{err}! Exiting..."));
    }
    outcome
}
