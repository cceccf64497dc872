use crate::config::FleetConfig;
use crate::error::{ErrorClass, FleetError};
use crate::inventory::Inventory;
use crate::model::{RepoKind, RepositoryStatus, SyncOutcome, SyncResult, TrackingState};
use glob::Pattern;
use serde::Serialize;
use std::path::PathBuf;

/// Operator choices for one sync invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Opt-in rebase of the checked-out branch onto its upstream.
    pub local_update: bool,
    /// Branch allow-list for local updates (glob patterns).
    pub update_branches: Vec<String>,
    pub protected_branches: Vec<String>,
    pub allow_protected: bool,
    pub autostash: bool,
    /// Permits rebasing a diverged branch.
    pub force: bool,
    pub push_when_ahead: bool,
    pub clone_missing: bool,
    pub stop_on_failure: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&FleetConfig::default())
    }
}

impl SyncOptions {
    pub fn from_config(config: &FleetConfig) -> Self {
        Self {
            local_update: config.local_update.enabled,
            update_branches: config.local_update.branches.clone(),
            protected_branches: config.protected_patterns(),
            allow_protected: false,
            autostash: config.local_update.autostash,
            force: false,
            push_when_ahead: config.local_update.push_when_ahead,
            clone_missing: false,
            stop_on_failure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SyncStep {
    Clone { url: String, mirror: bool },
    Fetch,
    Stash,
    Rebase { upstream: String },
    StashPop,
    Push,
}

impl SyncStep {
    /// Steps that may change refs or files beyond remote-tracking refs.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, SyncStep::Fetch)
    }

    pub fn describe(&self) -> String {
        match self {
            SyncStep::Clone { url, mirror: true } => format!("clone --mirror {url}"),
            SyncStep::Clone { url, mirror: false } => format!("clone {url}"),
            SyncStep::Fetch => "fetch --all --prune --prune-tags".to_string(),
            SyncStep::Stash => "stash push".to_string(),
            SyncStep::Rebase { upstream } => format!("rebase onto {upstream}"),
            SyncStep::StashPop => "stash pop".to_string(),
            SyncStep::Push => "push".to_string(),
        }
    }
}

/// What one repository will go through. `outcome` is the result when every
/// step succeeds; a repository with no steps resolves to it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoPlan {
    pub repo_id: String,
    pub path: PathBuf,
    pub steps: Vec<SyncStep>,
    pub outcome: SyncOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RepoPlan {
    fn new(status: &RepositoryStatus, steps: Vec<SyncStep>, outcome: SyncOutcome) -> Self {
        Self {
            repo_id: status.repo_id.clone(),
            path: status.path.clone(),
            steps,
            outcome,
            note: None,
            error_class: None,
            error: None,
        }
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn requires_confirmation(&self) -> bool {
        self.steps.iter().any(SyncStep::is_mutating)
    }

    pub fn action(&self) -> String {
        let steps = self
            .steps
            .iter()
            .map(SyncStep::describe)
            .collect::<Vec<_>>()
            .join(", then ");
        match (&self.note, steps.is_empty()) {
            (Some(note), true) => note.clone(),
            (Some(note), false) => format!("{steps} ({note})"),
            (None, true) => "none".to_string(),
            (None, false) => steps,
        }
    }

    /// The result this plan produces if every step succeeds.
    pub fn expected_result(&self) -> SyncResult {
        let mut result = SyncResult::new(
            self.repo_id.clone(),
            self.path.clone(),
            self.action(),
            self.outcome,
        );
        result.error_class = self.error_class;
        result.error = self.error.clone();
        result
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub repos: Vec<RepoPlan>,
}

impl SyncPlan {
    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// True iff any repository would be stashed, rebased, pushed or cloned.
    pub fn requires_confirmation(&self) -> bool {
        self.repos.iter().any(RepoPlan::requires_confirmation)
    }

    pub fn mutating(&self) -> impl Iterator<Item = &RepoPlan> {
        self.repos.iter().filter(|repo| repo.requires_confirmation())
    }

    /// Dry-run view: the results execution yields when nothing fails.
    pub fn preview(&self) -> Vec<SyncResult> {
        self.repos.iter().map(RepoPlan::expected_result).collect()
    }
}

/// Compiled branch patterns for one planning pass.
#[derive(Debug)]
struct BranchRules {
    allow: Vec<Pattern>,
    protected: Vec<Pattern>,
}

impl BranchRules {
    fn compile(options: &SyncOptions) -> Result<Self, FleetError> {
        Ok(Self {
            allow: compile_patterns(&options.update_branches)?,
            protected: compile_patterns(&options.protected_branches)?,
        })
    }

    fn allowed(&self, branch: &str) -> bool {
        self.allow.iter().any(|pattern| pattern.matches(branch))
    }

    fn protected(&self, branch: &str) -> bool {
        self.protected.iter().any(|pattern| pattern.matches(branch))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, FleetError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|err| FleetError::Pattern {
                pattern: pattern.clone(),
                message: err.to_string(),
            })
        })
        .collect()
}

/// Derives the plan from already collected snapshots. Runs no commands.
pub fn plan(
    statuses: &[RepositoryStatus],
    inventory: &Inventory,
    options: &SyncOptions,
) -> Result<SyncPlan, FleetError> {
    let rules = BranchRules::compile(options)?;
    let mut repos: Vec<RepoPlan> = statuses
        .iter()
        .map(|status| plan_repo(status, inventory, options, &rules))
        .collect();
    repos.sort_by(|a, b| (&a.repo_id, &a.path).cmp(&(&b.repo_id, &b.path)));
    Ok(SyncPlan { repos })
}

fn plan_repo(
    status: &RepositoryStatus,
    inventory: &Inventory,
    options: &SyncOptions,
    rules: &BranchRules,
) -> RepoPlan {
    if let Some(class) = status.error_class {
        if class == ErrorClass::Missing && options.clone_missing {
            let entry = inventory.find_by_path(&status.path);
            if let Some(url) = entry.and_then(|entry| entry.remote_url.clone()) {
                let mirror = entry.is_some_and(|entry| entry.kind == RepoKind::Mirror);
                return RepoPlan::new(
                    status,
                    vec![SyncStep::Clone { url, mirror }],
                    SyncOutcome::Cloned,
                );
            }
        }
        let mut failed = RepoPlan::new(status, Vec::new(), SyncOutcome::Failed)
            .with_note(format!("not synced: {class}"));
        failed.error_class = Some(class);
        failed.error = status.error.clone();
        return failed;
    }

    if status.bare {
        return RepoPlan::new(status, vec![SyncStep::Fetch], SyncOutcome::Fetched);
    }
    if status.is_detached() {
        return RepoPlan::new(status, Vec::new(), SyncOutcome::SkippedDetached)
            .with_note("detached HEAD");
    }

    let fetch_only = RepoPlan::new(status, vec![SyncStep::Fetch], SyncOutcome::Fetched);
    if !options.local_update {
        return fetch_only;
    }
    let Some(branch) = status.branch() else {
        return fetch_only;
    };
    if !rules.allowed(branch) {
        return fetch_only.with_note(format!("{branch} not selected for local update"));
    }
    local_update(status, branch, options, rules)
}

fn local_update(
    status: &RepositoryStatus,
    branch: &str,
    options: &SyncOptions,
    rules: &BranchRules,
) -> RepoPlan {
    let skip = |outcome: SyncOutcome, note: String| {
        RepoPlan::new(status, vec![SyncStep::Fetch], outcome).with_note(note)
    };

    let dirty = status.is_dirty();
    if dirty && !options.autostash {
        return skip(
            SyncOutcome::SkippedDirty,
            "working tree has local changes".to_string(),
        );
    }
    let Some(tracking) = status
        .tracking
        .as_ref()
        .filter(|tracking| !matches!(tracking.status, TrackingState::None | TrackingState::Gone))
    else {
        let note = match status.tracking_state() {
            Some(TrackingState::Gone) => "upstream was deleted",
            _ => "no upstream configured",
        };
        return skip(SyncOutcome::SkippedNoUpstream, note.to_string());
    };
    if rules.protected(branch) && !options.allow_protected {
        return skip(
            SyncOutcome::SkippedProtectedBranch,
            format!("{branch} is protected"),
        );
    }

    let upstream = tracking.upstream.clone();
    let (rebase, push, outcome) = match tracking.status {
        TrackingState::Diverged if !options.force => {
            return skip(
                SyncOutcome::SkippedDiverged,
                format!("{branch} has diverged from {upstream}"),
            );
        }
        TrackingState::Diverged | TrackingState::Behind => (true, false, SyncOutcome::Rebased),
        TrackingState::Ahead if options.push_when_ahead => (true, true, SyncOutcome::Pushed),
        _ => (false, false, SyncOutcome::Fetched),
    };
    if !rebase {
        return RepoPlan::new(status, vec![SyncStep::Fetch], outcome);
    }

    let mut steps = vec![SyncStep::Fetch];
    if dirty {
        steps.push(SyncStep::Stash);
    }
    steps.push(SyncStep::Rebase { upstream });
    if dirty {
        steps.push(SyncStep::StashPop);
    }
    if push {
        steps.push(SyncStep::Push);
    }
    RepoPlan::new(status, steps, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VcsError;
    use crate::model::{Head, InventoryEntry, Tracking, Worktree};

    fn checkout(id: &str, branch: &str, tracking: Tracking) -> RepositoryStatus {
        let mut status = RepositoryStatus::empty(id, PathBuf::from(format!("/src/{id}")));
        status.head = Some(Head {
            branch: Some(branch.to_string()),
            detached: false,
        });
        status.worktree = Some(Worktree::default());
        status.tracking = Some(tracking);
        status
    }

    fn dirty(mut status: RepositoryStatus) -> RepositoryStatus {
        status.worktree = Some(Worktree {
            dirty: true,
            unstaged: 1,
            ..Worktree::default()
        });
        status
    }

    fn local_update() -> SyncOptions {
        SyncOptions {
            local_update: true,
            ..SyncOptions::default()
        }
    }

    fn single(status: RepositoryStatus, options: &SyncOptions) -> RepoPlan {
        let plan = plan(&[status], &Inventory::new(), options).unwrap();
        plan.repos.into_iter().next().unwrap()
    }

    #[test]
    fn three_repo_example_without_local_update() {
        let clean = checkout("a", "main", Tracking::from_counts("origin/main", 0, 0));
        let dirty_repo = dirty(checkout("b", "feature", Tracking::from_counts("origin/feature", 0, 2)));
        let missing = RepositoryStatus::empty("c", "/src/c").with_error(&VcsError::missing(
            std::path::Path::new("/src/c"),
        ));
        let plan = plan(
            &[missing, dirty_repo, clean],
            &Inventory::new(),
            &SyncOptions::default(),
        )
        .unwrap();
        let preview = plan.preview();

        assert_eq!(preview.len(), 3);
        assert_eq!(preview[0].outcome, SyncOutcome::Fetched);
        assert!(preview[0].ok);
        assert_eq!(preview[1].outcome, SyncOutcome::Fetched);
        assert!(preview[1].ok);
        assert_eq!(preview[2].outcome, SyncOutcome::Failed);
        assert_eq!(preview[2].error_class, Some(ErrorClass::Missing));
        assert!(!preview[2].ok);
        assert!(!plan.requires_confirmation());
    }

    #[test]
    fn protected_release_branch_is_not_rebased() {
        let options = SyncOptions {
            protected_branches: vec!["release/*".into()],
            ..local_update()
        };
        let status = checkout("a", "release/2.0", Tracking::from_counts("origin/release/2.0", 0, 3));
        let repo = single(status.clone(), &options);
        assert_eq!(repo.outcome, SyncOutcome::SkippedProtectedBranch);
        assert_eq!(repo.steps, vec![SyncStep::Fetch]);

        let overridden = SyncOptions {
            allow_protected: true,
            ..options
        };
        assert_eq!(single(status, &overridden).outcome, SyncOutcome::Rebased);
    }

    #[test]
    fn default_protected_patterns_cover_primary_branches() {
        let behind = Tracking::from_counts("origin/main", 0, 1);
        for branch in ["main", "master", "develop", "release-1", "hotfix/urgent"] {
            let repo = single(checkout("a", branch, behind.clone()), &local_update());
            assert_eq!(repo.outcome, SyncOutcome::SkippedProtectedBranch, "{branch}");
        }
        let repo = single(checkout("a", "feature/x", behind), &local_update());
        assert_eq!(repo.outcome, SyncOutcome::Rebased);
    }

    #[test]
    fn fetch_only_plans_need_no_confirmation() {
        let statuses = vec![
            checkout("a", "feature", Tracking::from_counts("origin/feature", 0, 0)),
            checkout("b", "topic", Tracking::none()),
        ];
        let plan = plan(&statuses, &Inventory::new(), &local_update()).unwrap();
        assert!(!plan.requires_confirmation());
        assert_eq!(plan.repos[1].outcome, SyncOutcome::SkippedNoUpstream);
        assert_eq!(plan.repos[1].steps, vec![SyncStep::Fetch]);
    }

    #[test]
    fn rebase_push_stash_and_clone_require_confirmation() {
        let behind = checkout("a", "feature", Tracking::from_counts("origin/feature", 0, 1));
        assert!(single(behind.clone(), &local_update()).requires_confirmation());

        let options = SyncOptions {
            autostash: true,
            ..local_update()
        };
        let repo = single(dirty(behind), &options);
        assert_eq!(
            repo.steps,
            vec![
                SyncStep::Fetch,
                SyncStep::Stash,
                SyncStep::Rebase {
                    upstream: "origin/feature".into()
                },
                SyncStep::StashPop,
            ]
        );

        let ahead = checkout("b", "feature", Tracking::from_counts("origin/feature", 2, 0));
        let push = SyncOptions {
            push_when_ahead: true,
            ..local_update()
        };
        let repo = single(ahead, &push);
        assert_eq!(repo.outcome, SyncOutcome::Pushed);
        assert_eq!(repo.steps.last(), Some(&SyncStep::Push));
        assert!(repo.requires_confirmation());

        let mut inventory = Inventory::new();
        let mut entry = InventoryEntry::new("example.com/org/c", "/src/c", 1);
        entry.remote_url = Some("https://example.com/org/c.git".into());
        inventory.upsert(entry);
        let missing = RepositoryStatus::empty("example.com/org/c", "/src/c")
            .with_error(&VcsError::missing(std::path::Path::new("/src/c")));
        let clone = SyncOptions {
            clone_missing: true,
            ..SyncOptions::default()
        };
        let plan = plan(&[missing], &inventory, &clone).unwrap();
        assert_eq!(plan.repos[0].outcome, SyncOutcome::Cloned);
        assert!(plan.requires_confirmation());
    }

    #[test]
    fn diverged_needs_force_and_never_pushes() {
        let diverged = checkout("a", "feature", Tracking::from_counts("origin/feature", 1, 1));
        let options = SyncOptions {
            push_when_ahead: true,
            ..local_update()
        };
        assert_eq!(
            single(diverged.clone(), &options).outcome,
            SyncOutcome::SkippedDiverged
        );
        let forced = SyncOptions {
            force: true,
            ..options
        };
        let repo = single(diverged, &forced);
        assert_eq!(repo.outcome, SyncOutcome::Rebased);
        assert!(!repo.steps.contains(&SyncStep::Push));
    }

    #[test]
    fn dirty_without_autostash_skips_but_still_fetches() {
        let status = dirty(checkout("a", "feature", Tracking::from_counts("origin/feature", 0, 1)));
        let repo = single(status, &local_update());
        assert_eq!(repo.outcome, SyncOutcome::SkippedDirty);
        assert_eq!(repo.steps, vec![SyncStep::Fetch]);
        assert!(repo.expected_result().ok);
    }

    #[test]
    fn detached_and_bare_repositories() {
        let mut detached = checkout("a", "main", Tracking::none());
        detached.head = Some(Head {
            branch: None,
            detached: true,
        });
        let repo = single(detached, &local_update());
        assert_eq!(repo.outcome, SyncOutcome::SkippedDetached);
        assert!(repo.steps.is_empty());

        let mut bare = RepositoryStatus::empty("b", "/mirrors/b.git");
        bare.bare = true;
        bare.kind = RepoKind::Mirror;
        let repo = single(bare, &local_update());
        assert_eq!(repo.steps, vec![SyncStep::Fetch]);
        assert_eq!(repo.outcome, SyncOutcome::Fetched);
    }

    #[test]
    fn branches_outside_allow_list_are_fetch_only() {
        let options = SyncOptions {
            update_branches: vec!["feature/*".into()],
            ..local_update()
        };
        let status = checkout("a", "bugfix/1", Tracking::from_counts("origin/bugfix/1", 0, 4));
        let repo = single(status, &options);
        assert_eq!(repo.outcome, SyncOutcome::Fetched);
        assert_eq!(repo.steps, vec![SyncStep::Fetch]);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let options = SyncOptions {
            protected_branches: vec!["release/[".into()],
            ..local_update()
        };
        let err = plan(&[], &Inventory::new(), &options).unwrap_err();
        assert!(matches!(err, FleetError::Pattern { .. }));
    }
}
