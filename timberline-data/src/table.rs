//! Comma-separated table fixtures.
//!
//! Domain fixtures are two-column `code`,`description` files maintained by
//! hand; procedure results are written back with every field quoted so
//! downstream form tooling never has to guess at embedded commas.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use timberline_core::CodedValue;

use crate::procs::TabularResult;

/// Header name of the code column.
pub const CODE_FIELD: &str = "code";
/// Header name of the description column.
pub const DESCRIPTION_FIELD: &str = "description";

/// Errors raised while reading or writing table files.
#[derive(Debug, Error)]
pub enum TableError {
    /// Reading the file failed.
    #[error("failed to read table {path}")]
    Read {
        /// Location of the table.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Writing the file failed.
    #[error("failed to write table {path}")]
    Write {
        /// Location of the table.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file contained no rows at all.
    #[error("table {path} is missing its header row")]
    MissingHeader {
        /// Location of the table.
        path: Utf8PathBuf,
    },
    /// The header row did not start with the expected columns.
    #[error("table {path} must start with \"{CODE_FIELD}\",\"{DESCRIPTION_FIELD}\" columns")]
    Header {
        /// Location of the table.
        path: Utf8PathBuf,
    },
    /// A data row did not carry both columns.
    #[error("table {path} row {row} does not have two columns")]
    RowShape {
        /// Location of the table.
        path: Utf8PathBuf,
        /// One-based row number, header included.
        row: usize,
    },
    /// A quoted field ran to the end of the file.
    #[error("table {path} has an unterminated quoted field")]
    UnterminatedQuote {
        /// Location of the table.
        path: Utf8PathBuf,
    },
}

/// Read a two-column `code`,`description` fixture.
pub fn read_coded_values(path: &Utf8Path) -> Result<Vec<CodedValue>, TableError> {
    let text = std::fs::read_to_string(path.as_std_path()).map_err(|source| TableError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse_records(&text).ok_or_else(|| TableError::UnterminatedQuote {
        path: path.to_path_buf(),
    })?;
    let mut records = records.into_iter();

    let header = records.next().ok_or_else(|| TableError::MissingHeader {
        path: path.to_path_buf(),
    })?;
    let mut header = header.into_iter();
    let header_ok = matches!(
        (header.next(), header.next()),
        (Some(code), Some(description))
            if code.trim().eq_ignore_ascii_case(CODE_FIELD)
                && description.trim().eq_ignore_ascii_case(DESCRIPTION_FIELD)
    );
    if !header_ok {
        return Err(TableError::Header {
            path: path.to_path_buf(),
        });
    }

    let mut values = Vec::new();
    for (index, record) in records.enumerate() {
        let mut fields = record.into_iter();
        match (fields.next(), fields.next()) {
            (Some(code), Some(description)) => values.push(CodedValue::new(code, description)),
            _ => {
                return Err(TableError::RowShape {
                    path: path.to_path_buf(),
                    row: index + 2,
                });
            }
        }
    }
    Ok(values)
}

/// Write a tabular procedure result with every field quoted.
pub fn write_table(path: &Utf8Path, table: &TabularResult) -> Result<(), TableError> {
    timberline_fs::ensure_parent_dir(path).map_err(|source| TableError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    let mut lines = Vec::with_capacity(table.rows.len() + 1);
    lines.push(quoted_line(&table.columns));
    for row in &table.rows {
        lines.push(quoted_line(row));
    }
    let mut text = lines.join("\n");
    text.push('\n');

    std::fs::write(path.as_std_path(), text).map_err(|source| TableError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn quoted_line(fields: &[String]) -> String {
    let quoted: Vec<String> = fields
        .iter()
        .map(|field| format!("\"{}\"", field.replace('"', "\"\"")))
        .collect();
    quoted.join(",")
}

/// Split CSV text into records, honouring quoted fields. Returns `None`
/// when a quoted field is never terminated.
fn parse_records(text: &str) -> Option<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut fields));
            }
            other => field.push(other),
        }
    }
    if in_quotes {
        return None;
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push(fields);
    }

    // Blank lines carry a single empty field; drop them.
    records.retain(|record| record.iter().any(|value| !value.is_empty()));
    Some(records)
}
