use anyhow::Context;
use clap::{Parser, ValueEnum};
use fleet_core::audit::{AuditLogger, AuditRepo, AuditStatus};
use fleet_core::config::{FleetConfig, default_config_path};
use fleet_core::context::{RunContext, Severity};
use fleet_core::discovery::DiscoveryOptions;
use fleet_core::engine::{Approval, Fleet, StatusFilter, StatusReport, epoch_now};
use fleet_core::error::FleetError;
use fleet_core::inventory::Inventory;
use fleet_core::inventory_store::InventoryStore;
use fleet_core::lockfile::RunLock;
use fleet_core::model::{RepoKind, RepositoryStatus, SyncOutcome, SyncResult};
use fleet_core::pool::Progress;
use fleet_core::reconcile::{ReconcileMode, ReconcileResult, RemotePlan};
use fleet_core::sync_exec::SyncRun;
use fleet_core::sync_plan::{SyncOptions, SyncPlan};
use serde::Serialize;
use std::cell::Cell;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod args;
mod config_cmd;
mod prune_cmd;
mod remotes_cmd;
mod scan_cmd;
mod shared;
mod status_cmd;
mod sync_cmd;
#[cfg(test)]
mod tests;

use args::*;

use config_cmd::handle_config;
use prune_cmd::handle_prune;
use remotes_cmd::handle_remotes;
use scan_cmd::handle_scan;
use shared::{
    Session, audit_status, confirm, epoch_to_label, print_json, render_progress, status_state,
    status_table,
};
use status_cmd::handle_status;
use sync_cmd::handle_sync;

/// Runs the parsed command and returns the process exit code.
pub fn run() -> anyhow::Result<u8> {
    app::run()
}
