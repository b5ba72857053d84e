//! The JSON settings document shared by every workflow.
//!
//! Section names follow the wire format produced by the administration
//! tooling (`sde_connection`, `portal_info`, ...); the parsed structs use
//! the engine's own vocabulary. Loading fails fast when the document does
//! not parse or a required section is absent.

use std::collections::BTreeMap;
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use timberline_core::ObjectId;

/// Top-level sections every settings document must carry.
pub const REQUIRED_SECTIONS: [&str; 9] = [
    "sde_connection",
    "portal_info",
    "cnxn_info",
    "sql_procs",
    "datasets",
    "mobile_datasets",
    "properties",
    "ax_properties",
    "directories",
];

/// Errors raised while loading or rewriting the settings document.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The path does not point at a settings document.
    #[error("no settings document at {path}")]
    Missing {
        /// Location checked.
        path: Utf8PathBuf,
    },
    /// Reading the document failed.
    #[error("failed to read settings at {path}")]
    Read {
        /// Location of the document.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The document is not valid JSON.
    #[error("settings at {path} are not valid JSON; check the syntax")]
    Invalid {
        /// Location of the document.
        path: Utf8PathBuf,
        /// JSON decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// The document's top level is not an object.
    #[error("settings at {path} must be a JSON object")]
    NotAnObject {
        /// Location of the document.
        path: Utf8PathBuf,
    },
    /// A required section is absent.
    #[error("settings are missing the {name:?} section")]
    MissingSection {
        /// Name of the absent section.
        name: &'static str,
    },
    /// A present section did not deserialize.
    #[error("settings are malformed")]
    Malformed {
        /// JSON decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// Writing the document back failed.
    #[error("failed to write settings at {path}")]
    Write {
        /// Location of the document.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A property flag key did not parse.
    #[error(transparent)]
    PropertyFlag(#[from] PropertyFlagError),
}

/// Parsed settings document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Path of the geodatabase workspace.
    #[serde(rename = "sde_connection")]
    pub workspace: Utf8PathBuf,
    /// GIS server connection details.
    #[serde(rename = "portal_info")]
    pub portal: PortalInfo,
    /// Relational database connection details.
    #[serde(rename = "cnxn_info")]
    pub database: DatabaseInfo,
    /// Named SQL statements standing in for stored procedures.
    #[serde(rename = "sql_procs")]
    pub procedures: Procedures,
    /// Authoritative dataset names.
    pub datasets: Datasets,
    /// Mobile staging dataset names.
    pub mobile_datasets: MobileDatasets,
    /// `"<id> - <name>"` keys mapped to refresh flags.
    pub properties: BTreeMap<String, bool>,
    /// Property-key prefixes whose flags survive resets; those properties
    /// are refreshed on every run.
    pub ax_properties: Vec<String>,
    /// Fixture, scratch, and log directories.
    pub directories: Directories,
}

/// GIS server connection details.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortalInfo {
    /// Server admin base URL.
    pub url: String,
    /// Sign-in user.
    pub username: String,
    /// Sign-in password.
    pub password: String,
    /// Service folders controlled alongside the root services.
    #[serde(default)]
    pub folders: Vec<String>,
}

/// Relational database connection details.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseInfo {
    /// Path of the database file.
    pub database: Utf8PathBuf,
}

/// Named SQL statements, each taking at most one integer parameter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Procedures {
    /// Supervisor codes for one property.
    pub supervisor: String,
    /// Contractor codes for one property.
    pub contractor: String,
    /// Compartment codes for one property.
    pub compartment: String,
    /// Planting-species codes for one property.
    pub species: String,
    /// Chemical codes for one property.
    pub chemical: String,
    /// Stand/activity overlay computation, run once per new activity id.
    pub stand_overlay: String,
    /// Cascading-select item sets for one property.
    pub itemsets: String,
    /// Chemical default rows for one property.
    pub chemical_defaults: String,
}

/// Authoritative dataset names in the workspace.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Datasets {
    /// Activity feature dataset.
    pub activities: String,
    /// Chemical application table.
    pub chemicals: String,
    /// Property parcels.
    pub properties: String,
    /// Stand polygons.
    pub stands: String,
    /// Intermediate activity staging dataset.
    pub activity_staging: String,
    /// Intermediate chemical staging dataset.
    pub chemical_staging: String,
    /// Harvest units.
    pub harvest: String,
    /// Optional products recorded against harvest units.
    pub harvest_products: String,
    /// Special-feature points.
    pub special_points: String,
    /// Special-feature lines.
    pub special_lines: String,
    /// Special-feature polygons.
    pub special_polygons: String,
}

/// Mobile staging dataset names.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MobileDatasets {
    /// Field-collected activity copies.
    pub activities: String,
    /// Field-collected chemical copies.
    pub chemicals: String,
}

/// Fixture, scratch, and log directories.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Directories {
    /// Universal domain CSV fixtures.
    pub domains: Utf8PathBuf,
    /// Scratch directory cleared between runs.
    pub working: Utf8PathBuf,
    /// Run log directory.
    pub logs: Utf8PathBuf,
}

/// One parsed `"<id> - <name>"` property key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyFlag {
    /// Property object id.
    pub object_id: ObjectId,
    /// Property display name.
    pub name: String,
}

/// Errors returned when parsing a property flag key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PropertyFlagError {
    /// The key did not match `"<id> - <name>"`.
    #[error("property key {key:?} does not match \"<id> - <name>\"")]
    Malformed {
        /// The rejected key.
        key: String,
    },
}

impl FromStr for PropertyFlag {
    type Err = PropertyFlagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((id, name)) = s.split_once(" - ") else {
            return Err(PropertyFlagError::Malformed { key: s.to_owned() });
        };
        let object_id = id
            .trim()
            .parse()
            .map_err(|_| PropertyFlagError::Malformed { key: s.to_owned() })?;
        Ok(Self {
            object_id,
            name: name.trim().to_owned(),
        })
    }
}

impl Settings {
    /// Load and validate the settings document.
    pub fn load(path: &Utf8Path) -> Result<Self, SettingsError> {
        let present =
            timberline_fs::file_is_file(path).map_err(|source| SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if !present {
            return Err(SettingsError::Missing {
                path: path.to_path_buf(),
            });
        }
        let text =
            std::fs::read_to_string(path.as_std_path()).map_err(|source| SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|source| SettingsError::Invalid {
                path: path.to_path_buf(),
                source,
            })?;
        let object = value.as_object().ok_or_else(|| SettingsError::NotAnObject {
            path: path.to_path_buf(),
        })?;
        for name in REQUIRED_SECTIONS {
            if !object.contains_key(name) {
                return Err(SettingsError::MissingSection { name });
            }
        }
        serde_json::from_value(value).map_err(|source| SettingsError::Malformed { source })
    }

    /// Every property entry, parsed, regardless of flag state.
    pub fn property_entries(&self) -> Result<Vec<PropertyFlag>, SettingsError> {
        self.properties
            .keys()
            .map(|key| key.parse().map_err(SettingsError::PropertyFlag))
            .collect()
    }

    /// Properties whose refresh flag is set.
    pub fn flagged_properties(&self) -> Result<Vec<PropertyFlag>, SettingsError> {
        self.properties
            .iter()
            .filter(|(_, flagged)| **flagged)
            .map(|(key, _)| key.parse().map_err(SettingsError::PropertyFlag))
            .collect()
    }
}

/// Reset every property flag in the on-disk document to `false`, leaving
/// keys that start with an exempt prefix untouched. Returns the number of
/// flags cleared.
///
/// Only the `properties` object is rewritten; unrelated sections round-trip
/// unchanged.
pub fn reset_property_flags(path: &Utf8Path, exempt: &[String]) -> Result<usize, SettingsError> {
    let text =
        std::fs::read_to_string(path.as_std_path()).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let mut value: serde_json::Value =
        serde_json::from_str(&text).map_err(|source| SettingsError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;

    let properties = value
        .get_mut("properties")
        .and_then(serde_json::Value::as_object_mut)
        .ok_or(SettingsError::MissingSection { name: "properties" })?;

    let mut cleared = 0usize;
    for (key, flag) in properties.iter_mut() {
        if exempt.iter().any(|prefix| key.starts_with(prefix.as_str())) {
            continue;
        }
        if *flag != serde_json::Value::Bool(false) {
            cleared += 1;
        }
        *flag = serde_json::Value::Bool(false);
    }

    let rewritten =
        serde_json::to_string_pretty(&value).map_err(|source| SettingsError::Malformed { source })?;
    std::fs::write(path.as_std_path(), rewritten).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(cleared)
}
