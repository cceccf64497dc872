use crate::context::TaskContext;
use crate::error::VcsError;
use crate::model::{RepoKind, RepositoryStatus, Submodules, Tracking, select_primary_remote};
use crate::repo_id::local_repo_id;
use crate::vcs::VcsBackend;
use std::path::Path;
use tracing::debug;

/// Inspects one repository. The returned snapshot is truncated at the first
/// failing step and carries the classified error; this never returns `Err`.
pub fn inspect(backend: &dyn VcsBackend, path: &Path, task: &TaskContext) -> RepositoryStatus {
    inspect_as(backend, path, None, task)
}

/// Like [`inspect`], but falls back to `known_id` instead of a synthetic
/// local id when the snapshot is truncated before remotes are read.
pub fn inspect_as(
    backend: &dyn VcsBackend,
    path: &Path,
    known_id: Option<&str>,
    task: &TaskContext,
) -> RepositoryStatus {
    let fallback_id = known_id
        .map(str::to_string)
        .unwrap_or_else(|| local_repo_id(path));
    let mut status = RepositoryStatus::empty(fallback_id, path);
    if !path.exists() {
        return status.with_error(&VcsError::missing(path));
    }
    if let Err(err) = fill(backend, path, task, &mut status) {
        debug!(path = %path.display(), error = %err, "inspection truncated");
        status = status.with_error(&err);
    }
    status
}

fn fill(
    backend: &dyn VcsBackend,
    path: &Path,
    task: &TaskContext,
    status: &mut RepositoryStatus,
) -> Result<(), VcsError> {
    let layout = backend.probe(path, task)?;
    status.bare = layout.bare;

    let config = backend.remotes(path, task)?;
    status.kind = if layout.bare || config.mirror {
        RepoKind::Mirror
    } else {
        RepoKind::Checkout
    };
    status.primary_remote = select_primary_remote(&config.remotes);
    status.remotes = config.remotes;
    let live_url = status.primary_remote_url().map(|url| backend.normalize_url(url));
    if let Some(url) = live_url.filter(|url| !url.is_empty()) {
        status.repo_id = url;
    }

    if !layout.bare {
        status.worktree = Some(backend.worktree(path, task)?);
        status.head = Some(backend.head(path, task)?);
    }

    status.submodules = Submodules {
        has_submodules: backend.has_submodules(path, task)?,
    };

    if !layout.bare {
        status.tracking = Some(tracking_for_head(backend, path, status, task)?);
    }
    Ok(())
}

fn tracking_for_head(
    backend: &dyn VcsBackend,
    path: &Path,
    status: &RepositoryStatus,
    task: &TaskContext,
) -> Result<Tracking, VcsError> {
    let Some(branch) = status.branch() else {
        return Ok(Tracking::none());
    };
    let rows = backend.branch_tracking(path, task)?;
    let Some(row) = rows.into_iter().find(|row| row.branch == branch) else {
        // Unborn branch: HEAD names a branch with no commits yet.
        return Ok(Tracking::none());
    };
    let (Some(upstream_ref), Some(upstream)) = (row.upstream_ref, row.upstream) else {
        return Ok(Tracking::none());
    };
    if row.gone {
        return Ok(Tracking::gone(upstream));
    }
    let (ahead, behind) = backend.ahead_behind(path, branch, &upstream_ref, task)?;
    Ok(Tracking::from_counts(upstream, ahead, behind))
}
