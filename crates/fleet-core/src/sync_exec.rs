use crate::context::{CancelToken, RunContext, TaskContext};
use crate::error::{ErrorClass, VcsError};
use crate::model::{SyncOutcome, SyncResult};
use crate::pool::{Progress, WorkerPool};
use crate::sync_plan::{RepoPlan, SyncPlan, SyncStep};
use crate::vcs::VcsBackend;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Budget for restoring a stash after a failed step; the task deadline may
/// already be spent.
const STASH_RESTORE_BUDGET: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub results: Vec<SyncResult>,
    pub summary: SyncSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub total: usize,
    pub ok: usize,
    pub failed: usize,
    pub aborted: usize,
    pub by_outcome: BTreeMap<String, usize>,
    /// In result order, i.e. sorted by `(repo_id, path)`.
    pub failures: Vec<SyncFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub repo_id: String,
    pub path: PathBuf,
    pub error_class: Option<ErrorClass>,
    pub error: Option<String>,
}

impl SyncSummary {
    pub fn from_results(results: &[SyncResult]) -> Self {
        let mut summary = SyncSummary {
            total: results.len(),
            ..SyncSummary::default()
        };
        for result in results {
            *summary
                .by_outcome
                .entry(result.outcome.as_str().to_string())
                .or_default() += 1;
            match result.outcome {
                SyncOutcome::Aborted => summary.aborted += 1,
                SyncOutcome::Failed => summary.failed += 1,
                _ => summary.ok += 1,
            }
            if result.outcome == SyncOutcome::Failed {
                summary.failures.push(SyncFailure {
                    repo_id: result.repo_id.clone(),
                    path: result.path.clone(),
                    error_class: result.error_class,
                    error: result.error.clone(),
                });
            }
        }
        summary
    }
}

/// Runs exactly the planned steps. Confirmation must already have been
/// obtained by the caller. Per-repository failures are recorded in the
/// results and in `ctx`'s severity; they never stop sibling repositories
/// unless the pool was built with stop-on-failure.
pub fn execute(
    plan: &SyncPlan,
    backend: &dyn VcsBackend,
    ctx: &RunContext,
    pool: &WorkerPool,
    progress: &mut dyn FnMut(Progress<'_, SyncResult>),
) -> SyncRun {
    info!(
        repos = plan.len(),
        mutating = plan.mutating().count(),
        "executing sync plan"
    );
    let results = pool.run(
        plan.repos.clone(),
        ctx,
        |repo, task| execute_repo(backend, repo, task),
        aborted,
        progress,
    );
    for result in &results {
        match result.outcome {
            SyncOutcome::Failed | SyncOutcome::Aborted => ctx.fail(),
            SyncOutcome::SkippedDirty
            | SyncOutcome::SkippedDiverged
            | SyncOutcome::SkippedDetached
            | SyncOutcome::SkippedNoUpstream
            | SyncOutcome::SkippedProtectedBranch => ctx.warn(),
            _ => {}
        }
    }
    let summary = SyncSummary::from_results(&results);
    SyncRun { results, summary }
}

fn aborted(repo: RepoPlan) -> SyncResult {
    let mut result = SyncResult::new(
        repo.repo_id.clone(),
        repo.path.clone(),
        repo.action(),
        SyncOutcome::Aborted,
    );
    result.error = Some("not started: run stopped early".to_string());
    result
}

fn execute_repo(backend: &dyn VcsBackend, repo: RepoPlan, task: &TaskContext) -> SyncResult {
    let mut stashed = false;
    for step in &repo.steps {
        let outcome = run_step(backend, &repo, step, &mut stashed, task);
        if let Err(err) = outcome {
            warn!(
                repo_id = %repo.repo_id,
                step = %step.describe(),
                error = %err,
                "sync step failed"
            );
            if stashed && *step != SyncStep::StashPop {
                restore_stash(backend, &repo, task);
            }
            return SyncResult::failed(
                repo.repo_id.clone(),
                repo.path.clone(),
                step.describe(),
                err.class,
                err.message,
            );
        }
    }
    repo.expected_result()
}

fn run_step(
    backend: &dyn VcsBackend,
    repo: &RepoPlan,
    step: &SyncStep,
    stashed: &mut bool,
    task: &TaskContext,
) -> Result<(), VcsError> {
    let path = repo.path.as_path();
    match step {
        SyncStep::Clone { url, mirror } => backend.clone_repo(url, path, *mirror, task),
        SyncStep::Fetch => backend.fetch_all(path, task),
        SyncStep::Stash => {
            *stashed = backend.stash_push(path, task)?;
            Ok(())
        }
        SyncStep::Rebase { upstream } => backend.rebase(path, upstream, task),
        SyncStep::StashPop => {
            if *stashed {
                backend.stash_pop(path, task)?;
                *stashed = false;
            }
            Ok(())
        }
        SyncStep::Push => backend.push(path, task),
    }
}

fn restore_stash(backend: &dyn VcsBackend, repo: &RepoPlan, task: &TaskContext) {
    let budget = if task.is_cancelled() {
        TaskContext::new(Some(STASH_RESTORE_BUDGET), CancelToken::new())
    } else {
        TaskContext::new(Some(STASH_RESTORE_BUDGET), task.cancel_token().clone())
    };
    if let Err(err) = backend.stash_pop(&repo.path, &budget) {
        warn!(
            repo_id = %repo.repo_id,
            error = %err,
            "stash could not be restored; changes remain in the stash"
        );
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::model::{Head, Worktree};
    use crate::vcs::{BranchTracking, RemoteConfig, RepoLayout, VcsResult};
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every call; fails the steps listed in `fail`.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) fail: Vec<(&'static str, ErrorClass)>,
        pub(crate) stash_has_changes: bool,
        /// Simulated per-call latency.
        pub(crate) delay: Option<Duration>,
        pub(crate) in_flight: AtomicUsize,
        pub(crate) peak: AtomicUsize,
    }

    impl FakeBackend {
        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        /// Highest number of calls observed running at once.
        pub(crate) fn peak_in_flight(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        fn call(&self, name: &str, path: &Path) -> VcsResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls
                .lock()
                .unwrap()
                .push(format!("{name} {}", path.display()));
            match self.fail.iter().find(|(step, _)| *step == name) {
                Some((_, class)) => Err(VcsError::new(*class, format!("{name} failed"))),
                None => Ok(()),
            }
        }
    }

    impl VcsBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn probe(&self, path: &Path, _task: &TaskContext) -> VcsResult<RepoLayout> {
            self.call("probe", path)?;
            Ok(RepoLayout { bare: false })
        }
        fn remotes(&self, path: &Path, _task: &TaskContext) -> VcsResult<RemoteConfig> {
            self.call("remotes", path)?;
            Ok(RemoteConfig::default())
        }
        fn head(&self, path: &Path, _task: &TaskContext) -> VcsResult<Head> {
            self.call("head", path)?;
            Ok(Head {
                branch: Some("main".into()),
                detached: false,
            })
        }
        fn worktree(&self, path: &Path, _task: &TaskContext) -> VcsResult<Worktree> {
            self.call("worktree", path)?;
            Ok(Worktree::default())
        }
        fn has_submodules(&self, path: &Path, _task: &TaskContext) -> VcsResult<bool> {
            self.call("submodules", path)?;
            Ok(false)
        }
        fn branch_tracking(&self, path: &Path, _task: &TaskContext) -> VcsResult<Vec<BranchTracking>> {
            self.call("tracking", path)?;
            Ok(Vec::new())
        }
        fn ahead_behind(
            &self,
            path: &Path,
            _branch: &str,
            _upstream_ref: &str,
            _task: &TaskContext,
        ) -> VcsResult<(u32, u32)> {
            self.call("counts", path)?;
            Ok((0, 0))
        }
        fn fetch_all(&self, path: &Path, _task: &TaskContext) -> VcsResult<()> {
            self.call("fetch", path)
        }
        fn stash_push(&self, path: &Path, _task: &TaskContext) -> VcsResult<bool> {
            self.call("stash", path)?;
            Ok(self.stash_has_changes)
        }
        fn stash_pop(&self, path: &Path, _task: &TaskContext) -> VcsResult<()> {
            self.call("stash-pop", path)
        }
        fn rebase(&self, path: &Path, _upstream: &str, _task: &TaskContext) -> VcsResult<()> {
            self.call("rebase", path)
        }
        fn push(&self, path: &Path, _task: &TaskContext) -> VcsResult<()> {
            self.call("push", path)
        }
        fn clone_repo(
            &self,
            _url: &str,
            path: &Path,
            _mirror: bool,
            _task: &TaskContext,
        ) -> VcsResult<()> {
            self.call("clone", path)
        }
        fn set_remote_url(
            &self,
            path: &Path,
            _remote: &str,
            _url: &str,
            _task: &TaskContext,
        ) -> VcsResult<()> {
            self.call("set-url", path)
        }
    }
}
