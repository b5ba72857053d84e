//! Console confirmation prompts gating the mutating jobs.

use std::io::{self, BufRead, Write};

use crate::CliError;

/// Show `message` and wait for input. Returns `false` when the operator
/// types `no` (any casing); anything else, ENTER included, proceeds.
pub fn confirm(message: &str) -> Result<bool, CliError> {
    let line = read_line(&format!(
        "{message}\nPress ENTER to continue, otherwise type \"no\" to exit..."
    ))?;
    Ok(!line.trim().eq_ignore_ascii_case("no"))
}

/// Show `message` and return one trimmed line of input.
pub fn read_line(message: &str) -> Result<String, CliError> {
    println!("{message}");
    io::stdout()
        .flush()
        .map_err(|source| CliError::Prompt { source })?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|source| CliError::Prompt { source })?;
    Ok(line.trim().to_owned())
}
