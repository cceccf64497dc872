pub mod audit;
pub mod config;
pub mod context;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod exec;
pub mod git_cli;
pub mod git_parse;
pub mod inspector;
pub mod inventory;
pub mod inventory_store;
pub mod lockfile;
pub mod model;
pub mod pool;
pub mod reconcile;
pub mod repo_id;
pub mod sync_exec;
pub mod sync_plan;
pub mod vcs;

#[cfg(test)]
mod test_support;

pub use context::{CancelToken, RunContext, Severity, TaskContext};
pub use engine::{Approval, Fleet, ScanReport, StatusFilter, StatusReport};
pub use error::{ErrorClass, FleetError, VcsError};
pub use inventory::Inventory;
pub use model::{InventoryEntry, RepositoryStatus, SyncOutcome, SyncResult};
pub use vcs::VcsBackend;
