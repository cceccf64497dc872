use crate::context::{RunContext, TaskContext};
use crate::error::ErrorClass;
use crate::inventory::Inventory;
use crate::model::RepositoryStatus;
use crate::pool::{PoolResult, WorkerPool};
use crate::repo_id::normalize_remote_url;
use crate::vcs::VcsBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Which side wins when the recorded and live remote URLs disagree.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Adopt the live git remote into the inventory.
    Registry,
    /// Push the inventory's recorded URL out to the git remote.
    Git,
}

impl ReconcileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileMode::Registry => "registry",
            ReconcileMode::Git => "git",
        }
    }
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RemotePlan {
    pub repo_id: String,
    pub path: PathBuf,
    pub remote: String,
    pub action: String,
    pub current_value: String,
    pub target_value: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ReconcileResult {
    pub repo_id: String,
    pub path: PathBuf,
    pub action: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReconcileResult {
    fn ok(plan: &RemotePlan) -> Self {
        Self {
            repo_id: plan.repo_id.clone(),
            path: plan.path.clone(),
            action: plan.action.clone(),
            ok: true,
            error_class: None,
            error: None,
        }
    }

    fn failed(plan: &RemotePlan, class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_class: Some(class),
            error: Some(message.into()),
            ..Self::ok(plan)
        }
    }
}

impl PoolResult for ReconcileResult {
    fn sort_key(&self) -> (&str, &Path) {
        (&self.repo_id, &self.path)
    }

    fn is_failure(&self) -> bool {
        !self.ok
    }
}

/// Lists every repository whose recorded and live primary-remote URLs
/// differ after normalization. Mutates nothing.
pub fn plan(
    inventory: &Inventory,
    statuses: &[RepositoryStatus],
    mode: ReconcileMode,
) -> Vec<RemotePlan> {
    let mut plans: Vec<RemotePlan> = statuses
        .iter()
        .filter_map(|status| {
            let entry = inventory.find_by_path(&status.path)?;
            let remote = status.primary_remote.clone()?;
            let live = status.primary_remote_url()?.to_string();
            let recorded = entry.remote_url.clone();
            if recorded
                .as_deref()
                .is_some_and(|recorded| normalize_remote_url(recorded) == normalize_remote_url(&live))
            {
                return None;
            }
            let (current_value, target_value, action) = match (mode, recorded) {
                (ReconcileMode::Registry, recorded) => (
                    recorded.unwrap_or_default(),
                    live,
                    "update inventory remote_url".to_string(),
                ),
                (ReconcileMode::Git, Some(recorded)) => {
                    let action = format!("git remote set-url {remote} {recorded}");
                    (live, recorded, action)
                }
                // Nothing recorded to push out.
                (ReconcileMode::Git, None) => return None,
            };
            Some(RemotePlan {
                repo_id: entry.repo_id.clone(),
                path: status.path.clone(),
                remote,
                action,
                current_value,
                target_value,
            })
        })
        .collect();
    plans.sort_by(|a, b| (&a.repo_id, &a.path).cmp(&(&b.repo_id, &b.path)));
    plans
}

/// Applies a previewed plan. Registry mode only rewrites inventory entries;
/// git mode only runs `remote set-url`. Confirmation is the caller's job.
pub fn apply(
    plans: &[RemotePlan],
    mode: ReconcileMode,
    inventory: &mut Inventory,
    backend: &dyn VcsBackend,
    ctx: &RunContext,
    pool: &WorkerPool,
) -> Vec<ReconcileResult> {
    let results: Vec<ReconcileResult> = match mode {
        ReconcileMode::Registry => plans
            .iter()
            .map(|plan| adopt_live_url(plan, inventory))
            .collect(),
        ReconcileMode::Git => pool.run(
            plans.to_vec(),
            ctx,
            |plan, task| push_recorded_url(backend, &plan, task),
            |plan| ReconcileResult::failed(&plan, ErrorClass::Unknown, "not started: run stopped early"),
            &mut |_| {},
        ),
    };
    for result in &results {
        if !result.ok {
            ctx.fail();
        }
    }
    results
}

fn adopt_live_url(plan: &RemotePlan, inventory: &mut Inventory) -> ReconcileResult {
    let new_id = normalize_remote_url(&plan.target_value);
    let collides = !new_id.is_empty()
        && inventory
            .find_by_repo_id(&new_id)
            .iter()
            .any(|entry| entry.path == plan.path);
    let Some(entry) = inventory.find_by_path_mut(&plan.path) else {
        return ReconcileResult::failed(
            plan,
            ErrorClass::Missing,
            format!("no inventory entry at {}", plan.path.display()),
        );
    };
    entry.remote_url = Some(plan.target_value.clone());
    if !new_id.is_empty() && !collides && entry.repo_id != new_id {
        info!(from = %entry.repo_id, to = %new_id, "repo id follows adopted remote");
        entry.repo_id = new_id;
    }
    ReconcileResult::ok(plan)
}

fn push_recorded_url(backend: &dyn VcsBackend, plan: &RemotePlan, task: &TaskContext) -> ReconcileResult {
    match backend.set_remote_url(&plan.path, &plan.remote, &plan.target_value, task) {
        Ok(()) => ReconcileResult::ok(plan),
        Err(err) => {
            warn!(repo_id = %plan.repo_id, error = %err, "remote set-url failed");
            ReconcileResult::failed(plan, err.class, err.message)
        }
    }
}
