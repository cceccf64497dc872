use crate::config::FleetConfig;
use crate::context::RunContext;
use crate::discovery::{self, DiscoveryOptions, ScanChanges};
use crate::error::{ErrorClass, FleetError, VcsError};
use crate::git_cli::GitCli;
use crate::inspector::inspect_as;
use crate::inventory::Inventory;
use crate::model::{InventoryEntry, RepoKind, RepositoryStatus, SyncResult};
use crate::pool::{Progress, WorkerPool};
use crate::reconcile::{self, ReconcileMode, ReconcileResult, RemotePlan};
use crate::sync_exec::{self, SyncRun};
use crate::sync_plan::{self, SyncOptions, SyncPlan};
use crate::vcs::VcsBackend;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

pub fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// How a mutating step gets the operator's go-ahead.
pub enum Approval<'a> {
    /// Non-interactive override.
    Assume,
    /// Called with one line per mutating repository; `false` declines.
    Prompt(&'a mut dyn FnMut(&[String]) -> bool),
}

impl Approval<'_> {
    fn approve(&mut self, lines: &[String]) -> bool {
        match self {
            Approval::Assume => true,
            Approval::Prompt(prompt) => prompt(lines),
        }
    }
}

/// Selects which inventory entries a status pass looks at.
#[derive(Debug, Clone, Default)]
pub struct StatusFilter {
    /// Substring of the repo id.
    pub repo_id: Option<String>,
    pub path_prefix: Option<PathBuf>,
    pub kind: Option<RepoKind>,
    pub dirty_only: bool,
    /// Failures and warnings only.
    pub problems_only: bool,
}

impl StatusFilter {
    fn selects_entry(&self, entry: &InventoryEntry) -> bool {
        self.repo_id
            .as_deref()
            .is_none_or(|needle| entry.repo_id.contains(needle))
            && self
                .path_prefix
                .as_deref()
                .is_none_or(|prefix| entry.path.starts_with(prefix))
            && self.kind.is_none_or(|kind| entry.kind == kind)
    }

    fn selects_status(&self, status: &RepositoryStatus) -> bool {
        (!self.dirty_only || status.is_dirty())
            && (!self.problems_only || status.is_failed() || status.has_warning())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    pub repos: Vec<RepositoryStatus>,
    pub warnings: usize,
    pub failures: usize,
}

impl StatusReport {
    fn new(repos: Vec<RepositoryStatus>) -> Self {
        let warnings = repos
            .iter()
            .filter(|status| is_warning(status))
            .count();
        let failures = repos
            .iter()
            .filter(|status| status.is_failed() && !is_warning(status))
            .count();
        Self {
            repos,
            warnings,
            failures,
        }
    }
}

/// A vanished inventory path is an operator warning; other inspection
/// errors are failures.
fn is_warning(status: &RepositoryStatus) -> bool {
    status.error_class == Some(ErrorClass::Missing) || (!status.is_failed() && status.has_warning())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub repos: Vec<RepositoryStatus>,
    pub changes: ScanChanges,
}

/// Entry point for every fleet operation. Holds the backend, the worker pool
/// shape and the per-invocation context; inventories are passed in so the
/// caller owns persistence.
pub struct Fleet {
    backend: Arc<dyn VcsBackend>,
    ctx: RunContext,
    pool: WorkerPool,
}

impl Fleet {
    pub fn new(backend: Arc<dyn VcsBackend>, ctx: RunContext) -> Self {
        Self {
            backend,
            ctx,
            pool: WorkerPool::default(),
        }
    }

    pub fn from_config(config: &FleetConfig, ctx: RunContext) -> Self {
        Self::new(Arc::new(GitCli::new()), ctx).with_pool(
            WorkerPool::new(config.concurrency()).with_timeout(config.timeout()),
        )
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn backend(&self) -> &dyn VcsBackend {
        self.backend.as_ref()
    }

    /// Walks the roots, inspects every candidate and reconciles the
    /// inventory against what was found.
    pub fn scan(
        &self,
        inventory: &mut Inventory,
        options: &DiscoveryOptions,
        progress: &mut dyn FnMut(Progress<'_, RepositoryStatus>),
    ) -> Result<ScanReport, FleetError> {
        let candidates = discovery::discover(options)?;
        let items: Vec<(PathBuf, Option<String>)> =
            candidates.into_iter().map(|path| (path, None)).collect();
        let repos = self.inspect_all(items, progress);
        let changes = discovery::reconcile_inventory(inventory, &repos, epoch_now());
        for status in &repos {
            self.record_status_severity(status);
        }
        for _ in &changes.missing {
            self.ctx.warn();
        }
        info!(
            found = repos.len(),
            added = changes.added.len(),
            moved = changes.moved.len(),
            missing = changes.missing.len(),
            "scan complete"
        );
        Ok(ScanReport { repos, changes })
    }

    /// Inspects every selected inventory entry and merges `last_seen` and
    /// `missing` back into the inventory.
    pub fn status(
        &self,
        inventory: &mut Inventory,
        filter: &StatusFilter,
        progress: &mut dyn FnMut(Progress<'_, RepositoryStatus>),
    ) -> StatusReport {
        let mut seen = HashSet::new();
        let items: Vec<(PathBuf, Option<String>)> = inventory
            .entries()
            .iter()
            .filter(|entry| filter.selects_entry(entry))
            .filter(|entry| seen.insert(entry.path.clone()))
            .map(|entry| (entry.path.clone(), Some(entry.repo_id.clone())))
            .collect();
        let repos = self.inspect_all(items, progress);

        let now = epoch_now();
        for status in &repos {
            if status.error_class == Some(ErrorClass::Missing) {
                inventory.mark_missing(&status.path);
            } else if !status.is_failed() {
                inventory.touch(&status.path, now);
            }
            self.record_status_severity(status);
        }

        let repos = repos
            .into_iter()
            .filter(|status| filter.selects_status(status))
            .collect();
        StatusReport::new(repos)
    }

    /// Pure planning over an already collected report.
    pub fn plan_sync(
        &self,
        inventory: &Inventory,
        report: &StatusReport,
        options: &SyncOptions,
    ) -> Result<SyncPlan, FleetError> {
        sync_plan::plan(&report.repos, inventory, options)
    }

    /// Runs the plan as given. Plans with mutating steps need approval;
    /// declining runs nothing.
    pub fn execute_sync(
        &self,
        plan: &SyncPlan,
        options: &SyncOptions,
        approval: &mut Approval<'_>,
        progress: &mut dyn FnMut(Progress<'_, SyncResult>),
    ) -> Result<SyncRun, FleetError> {
        if plan.requires_confirmation() {
            let lines: Vec<String> = plan
                .mutating()
                .map(|repo| format!("{} ({}): {}", repo.repo_id, repo.path.display(), repo.action()))
                .collect();
            if !approval.approve(&lines) {
                return Err(FleetError::ConfirmationDeclined);
            }
        }
        let pool = self.pool.clone().stop_on_failure(options.stop_on_failure);
        Ok(sync_exec::execute(
            plan,
            self.backend.as_ref(),
            &self.ctx,
            &pool,
            progress,
        ))
    }

    pub fn plan_remote_reconcile(
        &self,
        inventory: &Inventory,
        report: &StatusReport,
        mode: ReconcileMode,
    ) -> Vec<RemotePlan> {
        reconcile::plan(inventory, &report.repos, mode)
    }

    pub fn apply_remote_reconcile(
        &self,
        plans: &[RemotePlan],
        mode: ReconcileMode,
        approval: &mut Approval<'_>,
        inventory: &mut Inventory,
    ) -> Result<Vec<ReconcileResult>, FleetError> {
        if plans.is_empty() {
            return Ok(Vec::new());
        }
        let lines: Vec<String> = plans
            .iter()
            .map(|plan| format!("{} ({}): {}", plan.repo_id, plan.path.display(), plan.action))
            .collect();
        if !approval.approve(&lines) {
            return Err(FleetError::ConfirmationDeclined);
        }
        Ok(reconcile::apply(
            plans,
            mode,
            inventory,
            self.backend.as_ref(),
            &self.ctx,
            &self.pool,
        ))
    }

    /// Drops long-missing entries.
    pub fn prune(&self, inventory: &mut Inventory, threshold: Duration) -> Vec<InventoryEntry> {
        inventory.prune_stale(threshold, epoch_now())
    }

    fn inspect_all(
        &self,
        items: Vec<(PathBuf, Option<String>)>,
        progress: &mut dyn FnMut(Progress<'_, RepositoryStatus>),
    ) -> Vec<RepositoryStatus> {
        let backend = self.backend.as_ref();
        self.pool.run(
            items,
            &self.ctx,
            |(path, known_id), task| inspect_as(backend, &path, known_id.as_deref(), task),
            |(path, known_id)| cancelled_status(&path, known_id),
            progress,
        )
    }

    fn record_status_severity(&self, status: &RepositoryStatus) {
        if is_warning(status) {
            self.ctx.warn();
        } else if status.is_failed() {
            self.ctx.fail();
        }
    }
}

fn cancelled_status(path: &Path, known_id: Option<String>) -> RepositoryStatus {
    let repo_id = known_id.unwrap_or_else(|| crate::repo_id::local_repo_id(path));
    RepositoryStatus::empty(repo_id, path)
        .with_error(&VcsError::new(ErrorClass::Unknown, "inspection cancelled"))
}
