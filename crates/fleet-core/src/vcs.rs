use crate::context::TaskContext;
use crate::error::VcsError;
use crate::model::{Head, Remote, Worktree};
use crate::repo_id::normalize_remote_url;
use std::path::Path;

pub type VcsResult<T> = Result<T, VcsError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RepoLayout {
    pub bare: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RemoteConfig {
    pub remotes: Vec<Remote>,
    pub mirror: bool,
}

/// One row of the batched per-branch tracking query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BranchTracking {
    pub branch: String,
    pub upstream_ref: Option<String>,
    pub upstream: Option<String>,
    pub gone: bool,
}

/// Capability surface the orchestration layer drives. One implementation per
/// backing tool; callers never see which tool produced the data.
pub trait VcsBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fails with `corrupt` when the path is neither a work tree nor bare.
    fn probe(&self, path: &Path, task: &TaskContext) -> VcsResult<RepoLayout>;
    fn remotes(&self, path: &Path, task: &TaskContext) -> VcsResult<RemoteConfig>;
    fn head(&self, path: &Path, task: &TaskContext) -> VcsResult<Head>;
    fn worktree(&self, path: &Path, task: &TaskContext) -> VcsResult<Worktree>;
    fn has_submodules(&self, path: &Path, task: &TaskContext) -> VcsResult<bool>;
    fn branch_tracking(&self, path: &Path, task: &TaskContext) -> VcsResult<Vec<BranchTracking>>;
    /// `(ahead, behind)` of `branch` relative to `upstream_ref`.
    fn ahead_behind(
        &self,
        path: &Path,
        branch: &str,
        upstream_ref: &str,
        task: &TaskContext,
    ) -> VcsResult<(u32, u32)>;

    fn fetch_all(&self, path: &Path, task: &TaskContext) -> VcsResult<()>;
    /// Returns whether anything was stashed.
    fn stash_push(&self, path: &Path, task: &TaskContext) -> VcsResult<bool>;
    fn stash_pop(&self, path: &Path, task: &TaskContext) -> VcsResult<()>;
    /// Rebases the checked-out branch onto `upstream`; aborts on failure.
    fn rebase(&self, path: &Path, upstream: &str, task: &TaskContext) -> VcsResult<()>;
    fn push(&self, path: &Path, task: &TaskContext) -> VcsResult<()>;
    fn clone_repo(&self, url: &str, path: &Path, mirror: bool, task: &TaskContext)
    -> VcsResult<()>;
    fn set_remote_url(
        &self,
        path: &Path,
        remote: &str,
        url: &str,
        task: &TaskContext,
    ) -> VcsResult<()>;

    fn normalize_url(&self, url: &str) -> String {
        normalize_remote_url(url)
    }
}
