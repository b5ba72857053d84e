//! Operational engines for the Timberline workflows: configuration, run
//! logs, tabular fixtures, stored-procedure access, domain synchronization,
//! mobile reconciliation, service lifecycle control, and one-time
//! environment setup.
//!
//! Every engine is a sequence of blocking calls against one geodatabase
//! connection and one relational connection, opened per run. Failure at any
//! step aborts the remainder of the run.

#![forbid(unsafe_code)]

pub mod config;
pub mod domains;
pub mod itemsets;
pub mod procs;
pub mod reconcile;
pub mod runlog;
pub mod services;
pub mod setup;
pub mod table;

pub use config::{Settings, SettingsError};
pub use procs::{ProcedureError, ProcedureRunner, SqlProcedures, TabularResult};
pub use reconcile::{SyncDatasets, SyncError, SyncReport, run_sync};
pub use runlog::{RunLog, RunLogError};
pub use services::{PortalClient, ServiceAction, ServiceError, ServiceHost};
