//! Per-run append-only text logs.
//!
//! Each workflow run creates one timestamped file in the configured log
//! directory and appends a line per step, mirroring every message to the
//! `log` facade. Append failures are downgraded to warnings so a full log
//! disk cannot fail an otherwise healthy run.

use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use log::{info, warn};
use thiserror::Error;

/// Errors raised while creating a run log.
#[derive(Debug, Error)]
pub enum RunLogError {
    /// Creating the log file or its directory failed.
    #[error("failed to create run log at {path}")]
    Create {
        /// Location of the log file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// One run's append-only log file.
#[derive(Debug)]
pub struct RunLog {
    path: Utf8PathBuf,
}

impl RunLog {
    /// Create a fresh `<job>_LOG_<stamp>.txt` file in `dir`.
    pub fn create(dir: &Utf8Path, job: &str) -> Result<Self, RunLogError> {
        let path = dir.join(format!("{job}_LOG_{}.txt", timestamp()));
        timberline_fs::ensure_dir(dir).map_err(|source| RunLogError::Create {
            path: path.clone(),
            source,
        })?;
        std::fs::File::create(path.as_std_path()).map_err(|source| RunLogError::Create {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path })
    }

    /// Append one line and mirror it to the `log` facade.
    pub fn message(&self, text: &str) {
        info!("{text}");
        if let Err(err) = append_line(&self.path, text) {
            warn!("failed to append to run log {}: {err}", self.path);
        }
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// Current local date and time in the `yyyymmdd_hhmmss` form used for log
/// and scratch file names.
#[must_use]
pub fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn append_line(path: &Utf8Path, text: &str) -> io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path.as_std_path())?;
    writeln!(file, "{text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    fn creates_and_appends_lines() {
        let dir = TempDir::new().expect("create temp dir");
        let logs = Utf8PathBuf::from_path_buf(dir.path().join("logs")).expect("utf-8 path");

        let log = RunLog::create(&logs, "sync").expect("create run log");
        log.message("...All configurations loaded");
        log.message("...Cleared mobile datasets");

        let contents = std::fs::read_to_string(log.path().as_std_path()).expect("read log");
        assert_eq!(
            contents,
            "...All configurations loaded\n...Cleared mobile datasets\n"
        );
        assert!(log.path().file_name().expect("file name").starts_with("sync_LOG_"));
    }

    #[rstest]
    fn timestamp_matches_expected_shape() {
        let stamp = timestamp();
        assert_eq!(stamp.len(), 15);
        assert_eq!(stamp.chars().filter(|c| *c == '_').count(), 1);
    }
}
