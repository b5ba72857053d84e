//! Mobile reconciliation: merge field-collected activities and chemical
//! applications into the authoritative datasets.
//!
//! Three independently guarded flows run in order (property-linked
//! activities, stand-linked activities, chemical applications), followed by
//! staging cleanup. Property rows inherit their parcel's boundary; stand
//! rows inherit the stand's geometry and trigger a per-row overlay
//! computation; chemical rows are re-linked to their parent activity through
//! the correlation-key pair once the platform has assigned real ids.

use std::collections::BTreeMap;

use log::warn;
use thiserror::Error;
use uuid::Uuid;

use timberline_core::store::{Geodatabase, GeodatabaseError};
use timberline_core::{CorrelationKey, LinkTarget, MobileActivity, MobileChemical, ObjectId};

use crate::config::Settings;
use crate::procs::{ProcedureError, ProcedureRunner};
use crate::runlog::RunLog;

/// Context id stamped on the duplicated chemical rows that represent the
/// active record.
pub const ACTIVE_RECORD_CONTEXT: i64 = 1440;

/// Dataset names a reconciliation run touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDatasets {
    /// Authoritative activity dataset.
    pub activities: String,
    /// Authoritative chemical dataset.
    pub chemicals: String,
    /// Property parcels.
    pub properties: String,
    /// Stand polygons.
    pub stands: String,
    /// Intermediate activity staging dataset.
    pub activity_staging: String,
    /// Intermediate chemical staging dataset.
    pub chemical_staging: String,
    /// Field-collected activity copies.
    pub mobile_activities: String,
    /// Field-collected chemical copies.
    pub mobile_chemicals: String,
}

impl SyncDatasets {
    /// Pull the dataset names out of the settings document.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            activities: settings.datasets.activities.clone(),
            chemicals: settings.datasets.chemicals.clone(),
            properties: settings.datasets.properties.clone(),
            stands: settings.datasets.stands.clone(),
            activity_staging: settings.datasets.activity_staging.clone(),
            chemical_staging: settings.datasets.chemical_staging.clone(),
            mobile_activities: settings.mobile_datasets.activities.clone(),
            mobile_chemicals: settings.mobile_datasets.chemicals.clone(),
        }
    }

    fn all(&self) -> [&str; 8] {
        [
            &self.activities,
            &self.chemicals,
            &self.properties,
            &self.stands,
            &self.activity_staging,
            &self.chemical_staging,
            &self.mobile_activities,
            &self.mobile_chemicals,
        ]
    }
}

/// Counts from one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    /// Property-linked activities appended.
    pub property_activities: usize,
    /// Stand-linked activities appended.
    pub stand_activities: usize,
    /// Overlay computations run for new stand activities.
    pub overlays: usize,
    /// Chemical rows appended, active-record copies included.
    pub chemicals: usize,
    /// Chemical rows whose parent foreign keys were backfilled.
    pub backfilled: usize,
    /// Mobile chemical rows whose key matched no activity.
    pub unmatched_chemicals: usize,
}

/// Errors that abort a reconciliation run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A configured dataset is absent from the workspace.
    #[error("could not find dataset {name:?}")]
    DatasetMissing {
        /// The missing dataset.
        name: String,
    },
    /// A mobile row references a property that does not exist.
    #[error("mobile activity {object_id} references missing property {property_id}")]
    PropertyMissing {
        /// Staging object id of the row.
        object_id: ObjectId,
        /// The dangling property reference.
        property_id: ObjectId,
    },
    /// A mobile row references a stand that does not exist.
    #[error("mobile activity {object_id} references missing stand {stand_id}")]
    StandMissing {
        /// Staging object id of the row.
        object_id: ObjectId,
        /// The dangling stand reference.
        stand_id: ObjectId,
    },
    /// The overlay computation failed for a new activity.
    #[error("stand overlay failed for activity {activity_id}")]
    Overlay {
        /// The activity the overlay ran for.
        activity_id: ObjectId,
        /// Underlying procedure failure.
        #[source]
        source: ProcedureError,
    },
    /// The store rejected an operation.
    #[error(transparent)]
    Store(#[from] GeodatabaseError),
}

/// Run one reconciliation pass.
///
/// An empty mobile staging set is a no-op that still clears staging. A
/// failure in any flow aborts the run; open edit operations roll back.
pub fn run_sync(
    gdb: &mut Geodatabase,
    runner: &dyn ProcedureRunner,
    overlay_statement: &str,
    datasets: &SyncDatasets,
    log: &RunLog,
) -> Result<SyncReport, SyncError> {
    for name in datasets.all() {
        if !gdb.dataset_exists(name)? {
            return Err(SyncError::DatasetMissing {
                name: name.to_owned(),
            });
        }
        log.message(&format!("...Found dataset: {name}"));
    }

    let mobile_activities = gdb.mobile_activities(&datasets.mobile_activities)?;
    let mobile_chemicals = gdb.mobile_chemicals(&datasets.mobile_chemicals)?;

    if mobile_activities.is_empty() && mobile_chemicals.is_empty() {
        log.message("No new records to add");
        clear_staging(gdb, datasets, log)?;
        return Ok(SyncReport::default());
    }
    log.message(&format!(
        "...{} new activity record(s) collected",
        mobile_activities.len()
    ));

    let property_rows: Vec<&MobileActivity> = mobile_activities
        .iter()
        .filter(|row| row.link == LinkTarget::Property)
        .collect();
    let stand_rows: Vec<&MobileActivity> = mobile_activities
        .iter()
        .filter(|row| row.link == LinkTarget::Stand)
        .collect();

    let mut report = SyncReport::default();
    report.property_activities = property_flow(gdb, datasets, &property_rows, log)?;
    (report.stand_activities, report.overlays) =
        stand_flow(gdb, runner, overlay_statement, datasets, &stand_rows, log)?;
    (report.chemicals, report.backfilled, report.unmatched_chemicals) =
        chemical_flow(gdb, datasets, &mobile_chemicals, log)?;

    clear_staging(gdb, datasets, log)?;
    Ok(report)
}

/// Stage property-linked rows in bulk, resolve their parcels, copy the
/// parcel boundary onto each row, and append the set.
fn property_flow(
    gdb: &Geodatabase,
    datasets: &SyncDatasets,
    rows: &[&MobileActivity],
    log: &RunLog,
) -> Result<usize, SyncError> {
    if rows.is_empty() {
        log.message("...No new property activities to add");
        return Ok(0);
    }
    log.message(&format!("...{} new property activitie(s) to add", rows.len()));

    let mut resolved = BTreeMap::new();
    for row in rows {
        // Validated at read time: property-linked rows carry a property id.
        let Some(property_id) = row.property_id else {
            continue;
        };
        if !resolved.contains_key(&property_id) {
            let property = gdb
                .property(&datasets.properties, property_id)?
                .ok_or(SyncError::PropertyMissing {
                    object_id: row.object_id,
                    property_id,
                })?;
            resolved.insert(property_id, property);
        }
    }

    for row in rows {
        gdb.stage_activity(&datasets.activity_staging, &row.to_draft())?;
    }
    log.message("...Appended property activities to the staging dataset");

    for property in resolved.values() {
        gdb.set_staged_property_link(
            &datasets.activity_staging,
            property.object_id,
            property.global_id,
        )?;
        gdb.set_staged_boundary_for_property(
            &datasets.activity_staging,
            property.object_id,
            &property.boundary,
        )?;
    }
    log.message("...Copied property global ids and boundary geometry to staged activities");

    let drafts = gdb.staged_activities(&datasets.activity_staging)?;
    let appended = gdb.append_activity_drafts(&datasets.activities, &drafts)?;
    log.message(&format!(
        "...Appended {appended} property activitie(s) to the target dataset"
    ));

    gdb.truncate(&datasets.activity_staging)?;
    log.message("...Cleared the activity staging dataset");
    Ok(appended)
}

/// Stage stand-linked rows one at a time, copying each stand's geometry
/// onto the staged row by correlation key, append the set inside one edit
/// operation, then recover the new ids and run the overlay per row.
fn stand_flow(
    gdb: &mut Geodatabase,
    runner: &dyn ProcedureRunner,
    overlay_statement: &str,
    datasets: &SyncDatasets,
    rows: &[&MobileActivity],
    log: &RunLog,
) -> Result<(usize, usize), SyncError> {
    if rows.is_empty() {
        log.message("...No new stand activities to add");
        return Ok((0, 0));
    }
    log.message(&format!("...{} new stand activitie(s) to add", rows.len()));

    for row in rows {
        gdb.stage_activity(&datasets.activity_staging, &row.to_draft())?;
        // Validated at read time: stand-linked rows carry a stand id.
        let Some(stand_id) = row.stand_id else {
            continue;
        };
        let stand = gdb
            .stand(&datasets.stands, stand_id)?
            .ok_or(SyncError::StandMissing {
                object_id: row.object_id,
                stand_id,
            })?;
        gdb.set_staged_stand(
            &datasets.activity_staging,
            &row.parent_key,
            stand.object_id,
            &stand.boundary,
        )?;
        log.message(&format!(
            "...Copied stand geometry for mobile activity {}",
            row.object_id
        ));
    }

    let drafts = gdb.staged_activities(&datasets.activity_staging)?;
    let appended = gdb.edit(|op| op.append_activity_drafts(&datasets.activities, &drafts))?;
    log.message(&format!(
        "...Appended {appended} stand activitie(s) to the target dataset"
    ));

    // The append does not return generated keys; recover them by key.
    let mut new_ids = Vec::new();
    for row in rows {
        for record in gdb.activities_by_parent_key(&datasets.activities, &row.parent_key)? {
            log.message(&format!("...Retrieved target activity id: {}", record.object_id));
            new_ids.push(record.object_id);
        }
    }

    let mut overlays = 0usize;
    for activity_id in new_ids {
        runner
            .execute(overlay_statement, Some(activity_id))
            .map_err(|source| SyncError::Overlay {
                activity_id,
                source,
            })?;
        log.message(&format!("...Stand overlay executed for activity {activity_id}"));
        overlays += 1;
    }
    Ok((appended, overlays))
}

/// Append chemical rows inside one edit operation, write the forced
/// active-record copies through the staging path, then backfill parent
/// foreign keys one lookup per row.
fn chemical_flow(
    gdb: &mut Geodatabase,
    datasets: &SyncDatasets,
    rows: &[MobileChemical],
    log: &RunLog,
) -> Result<(usize, usize, usize), SyncError> {
    if rows.is_empty() {
        log.message("...No new chemical applications to add");
        return Ok((0, 0, 0));
    }
    log.message(&format!("...{} new chemical application(s) to add", rows.len()));

    let drafts: Vec<_> = rows.iter().map(MobileChemical::to_draft).collect();
    let appended = gdb.edit(|op| op.append_chemical_drafts(&datasets.chemicals, &drafts))?;
    log.message(&format!("...Appended {appended} chemical record(s) to the target dataset"));

    for draft in &drafts {
        gdb.stage_chemical(&datasets.chemical_staging, draft)?;
    }
    gdb.override_staged_context(&datasets.chemical_staging, ACTIVE_RECORD_CONTEXT)?;
    let staged = gdb.staged_chemicals(&datasets.chemical_staging)?;
    let copies = gdb.append_chemical_drafts(&datasets.chemicals, &staged)?;
    log.message(&format!(
        "...Appended {copies} active-record cop(ies) to the target dataset"
    ));

    let mut links: Vec<(CorrelationKey, ObjectId, Uuid)> = Vec::new();
    let mut unmatched = 0usize;
    for chem in rows {
        let matches = gdb.activities_by_parent_key(&datasets.activities, &chem.child_key)?;
        match matches.last() {
            None => {
                warn!(
                    "no activity matches chemical correlation key {}; row left unlinked",
                    chem.child_key
                );
                log.message(&format!(
                    "...No activity match for chemical key {}; left unlinked",
                    chem.child_key
                ));
                unmatched += 1;
            }
            Some(record) => {
                if matches.len() > 1 {
                    warn!(
                        "correlation key {} matches {} activities; linking the newest",
                        chem.child_key,
                        matches.len()
                    );
                }
                links.push((chem.child_key.clone(), record.object_id, record.global_id));
            }
        }
    }

    let mut backfilled = 0usize;
    if !links.is_empty() {
        backfilled = gdb.edit(|op| {
            let mut updated = 0usize;
            for (child_key, activity_id, activity_global_id) in &links {
                updated += op.link_chemicals(
                    &datasets.chemicals,
                    child_key,
                    *activity_id,
                    *activity_global_id,
                )?;
            }
            Ok(updated)
        })?;
        log.message(&format!(
            "...Backfilled activity ids onto {backfilled} chemical record(s)"
        ));
    }

    Ok((appended + copies, backfilled, unmatched))
}

fn clear_staging(
    gdb: &Geodatabase,
    datasets: &SyncDatasets,
    log: &RunLog,
) -> Result<(), SyncError> {
    for name in [
        &datasets.mobile_activities,
        &datasets.mobile_chemicals,
        &datasets.activity_staging,
        &datasets.chemical_staging,
    ] {
        gdb.truncate(name)?;
    }
    log.message("...Cleared mobile datasets");
    Ok(())
}
