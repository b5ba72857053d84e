//! Form item-set export.
//!
//! Mobile survey forms consume cascading-select item sets and chemical
//! default rows as CSV files. For each flagged property the configured
//! procedures are executed and their results written into the working
//! directory, ready to be packaged into the form media.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use timberline_core::ObjectId;

use crate::config::Procedures;
use crate::procs::{ProcedureError, ProcedureRunner};
use crate::runlog::RunLog;
use crate::table::{self, TableError};

/// The files exported for one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemsetExport {
    /// Property the files belong to.
    pub property_id: ObjectId,
    /// Cascading-select item sets.
    pub itemsets: Utf8PathBuf,
    /// Chemical default rows.
    pub chemical_defaults: Utf8PathBuf,
}

/// Errors that abort an export run.
#[derive(Debug, Error)]
pub enum ItemsetError {
    /// A feeding procedure failed.
    #[error("item-set procedure failed for property {property_id}")]
    Procedure {
        /// Property being exported.
        property_id: ObjectId,
        /// Underlying procedure failure.
        #[source]
        source: ProcedureError,
    },
    /// Writing an output file failed.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Export item sets and chemical defaults for each property.
pub fn export_itemsets(
    runner: &dyn ProcedureRunner,
    procedures: &Procedures,
    working_dir: &Utf8Path,
    property_ids: &[ObjectId],
    log: &RunLog,
) -> Result<Vec<ItemsetExport>, ItemsetError> {
    let mut exports = Vec::with_capacity(property_ids.len());
    for &property_id in property_ids {
        let itemsets = runner
            .fetch(&procedures.itemsets, Some(property_id))
            .map_err(|source| ItemsetError::Procedure {
                property_id,
                source,
            })?;
        let itemsets_path = working_dir.join(format!("{property_id}itemsets.csv"));
        table::write_table(&itemsets_path, &itemsets)?;
        log.message(&format!("...Created updated item sets for property {property_id}"));

        let defaults = runner
            .fetch(&procedures.chemical_defaults, Some(property_id))
            .map_err(|source| ItemsetError::Procedure {
                property_id,
                source,
            })?;
        let defaults_path = working_dir.join(format!("{property_id}chemdefaults.csv"));
        table::write_table(&defaults_path, &defaults)?;
        log.message(&format!(
            "...Created updated chemical defaults for property {property_id}"
        ));

        exports.push(ItemsetExport {
            property_id,
            itemsets: itemsets_path,
            chemical_defaults: defaults_path,
        });
    }
    Ok(exports)
}
