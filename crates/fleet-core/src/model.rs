use crate::error::{ErrorClass, VcsError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoKind {
    #[default]
    Checkout,
    Mirror,
}

impl RepoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoKind::Checkout => "checkout",
            RepoKind::Mirror => "mirror",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Present,
    Missing,
    Moved,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Present => "present",
            EntryStatus::Missing => "missing",
            EntryStatus::Moved => "moved",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub repo_id: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: RepoKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub status: EntryStatus,
    pub last_seen: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl InventoryEntry {
    pub fn new(repo_id: impl Into<String>, path: impl Into<PathBuf>, last_seen: u64) -> Self {
        Self {
            repo_id: repo_id.into(),
            path: path.into(),
            remote_url: None,
            kind: RepoKind::Checkout,
            branch: None,
            status: EntryStatus::Present,
            last_seen,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Head {
    pub branch: Option<String>,
    pub detached: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Worktree {
    pub dirty: bool,
    pub staged: u32,
    pub unstaged: u32,
    pub untracked: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    Ahead,
    Behind,
    Diverged,
    Equal,
    Gone,
    None,
}

impl TrackingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingState::Ahead => "ahead",
            TrackingState::Behind => "behind",
            TrackingState::Diverged => "diverged",
            TrackingState::Equal => "equal",
            TrackingState::Gone => "gone",
            TrackingState::None => "none",
        }
    }
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Tracking {
    pub upstream: String,
    pub status: TrackingState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ahead: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behind: Option<u32>,
}

impl Tracking {
    pub fn none() -> Self {
        Self {
            upstream: String::new(),
            status: TrackingState::None,
            ahead: None,
            behind: None,
        }
    }

    pub fn gone(upstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            status: TrackingState::Gone,
            ahead: None,
            behind: None,
        }
    }

    /// Classifies a live upstream from its symmetric-difference counts.
    pub fn from_counts(upstream: impl Into<String>, ahead: u32, behind: u32) -> Self {
        let status = match (ahead, behind) {
            (0, 0) => TrackingState::Equal,
            (_, 0) => TrackingState::Ahead,
            (0, _) => TrackingState::Behind,
            _ => TrackingState::Diverged,
        };
        Self {
            upstream: upstream.into(),
            status,
            ahead: Some(ahead),
            behind: Some(behind),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Submodules {
    pub has_submodules: bool,
}

/// Live snapshot of one repository. Not persisted.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RepositoryStatus {
    pub repo_id: String,
    pub path: PathBuf,
    pub bare: bool,
    pub kind: RepoKind,
    pub remotes: Vec<Remote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_remote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<Head>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<Worktree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<Tracking>,
    pub submodules: Submodules,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
}

impl RepositoryStatus {
    pub fn empty(repo_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            repo_id: repo_id.into(),
            path: path.into(),
            bare: false,
            kind: RepoKind::Checkout,
            remotes: Vec::new(),
            primary_remote: None,
            head: None,
            worktree: None,
            tracking: None,
            submodules: Submodules::default(),
            error: None,
            error_class: None,
        }
    }

    pub fn with_error(mut self, err: &VcsError) -> Self {
        self.error = Some(err.message.clone());
        self.error_class = Some(err.class);
        self
    }

    pub fn is_failed(&self) -> bool {
        self.error_class.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.worktree.as_ref().is_some_and(|worktree| worktree.dirty)
    }

    pub fn branch(&self) -> Option<&str> {
        self.head.as_ref().and_then(|head| head.branch.as_deref())
    }

    pub fn is_detached(&self) -> bool {
        self.head.as_ref().is_some_and(|head| head.detached)
    }

    pub fn tracking_state(&self) -> Option<TrackingState> {
        self.tracking.as_ref().map(|tracking| tracking.status)
    }

    pub fn primary_remote_url(&self) -> Option<&str> {
        let name = self.primary_remote.as_deref()?;
        self.remotes
            .iter()
            .find(|remote| remote.name == name)
            .map(|remote| remote.url.as_str())
    }

    /// Dirty trees and deleted upstreams are operator warnings, not failures.
    pub fn has_warning(&self) -> bool {
        self.is_dirty() || self.tracking_state() == Some(TrackingState::Gone)
    }
}

/// `origin` when configured, else the first remote by name.
pub fn select_primary_remote(remotes: &[Remote]) -> Option<String> {
    if remotes.iter().any(|remote| remote.name == "origin") {
        return Some("origin".to_string());
    }
    remotes
        .iter()
        .map(|remote| remote.name.as_str())
        .min()
        .map(str::to_string)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Fetched,
    Rebased,
    Pushed,
    Cloned,
    SkippedNoUpstream,
    SkippedDiverged,
    SkippedDirty,
    SkippedProtectedBranch,
    SkippedDetached,
    Aborted,
    Failed,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Fetched => "fetched",
            SyncOutcome::Rebased => "rebased",
            SyncOutcome::Pushed => "pushed",
            SyncOutcome::Cloned => "cloned",
            SyncOutcome::SkippedNoUpstream => "skipped_no_upstream",
            SyncOutcome::SkippedDiverged => "skipped_diverged",
            SyncOutcome::SkippedDirty => "skipped_dirty",
            SyncOutcome::SkippedProtectedBranch => "skipped_protected_branch",
            SyncOutcome::SkippedDetached => "skipped_detached",
            SyncOutcome::Aborted => "aborted",
            SyncOutcome::Failed => "failed",
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, SyncOutcome::Failed | SyncOutcome::Aborted)
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub repo_id: String,
    pub path: PathBuf,
    pub action: String,
    pub outcome: SyncOutcome,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    pub fn new(
        repo_id: impl Into<String>,
        path: impl Into<PathBuf>,
        action: impl Into<String>,
        outcome: SyncOutcome,
    ) -> Self {
        Self {
            repo_id: repo_id.into(),
            path: path.into(),
            action: action.into(),
            outcome,
            ok: outcome.is_ok(),
            error_class: None,
            error: None,
        }
    }

    pub fn failed(
        repo_id: impl Into<String>,
        path: impl Into<PathBuf>,
        action: impl Into<String>,
        class: ErrorClass,
        message: impl Into<String>,
    ) -> Self {
        Self {
            repo_id: repo_id.into(),
            path: path.into(),
            action: action.into(),
            outcome: SyncOutcome::Failed,
            ok: false,
            error_class: Some(class),
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(name: &str) -> Remote {
        Remote {
            name: name.into(),
            url: format!("https://example.com/{name}.git"),
        }
    }

    #[test]
    fn primary_remote_prefers_origin() {
        let remotes = vec![remote("alpha"), remote("origin"), remote("zeta")];
        assert_eq!(select_primary_remote(&remotes).as_deref(), Some("origin"));
    }

    #[test]
    fn primary_remote_falls_back_to_first_alphabetically() {
        let remotes = vec![remote("upstream"), remote("fork"), remote("zeta")];
        assert_eq!(select_primary_remote(&remotes).as_deref(), Some("fork"));
        assert_eq!(select_primary_remote(&[]), None);
    }

    #[test]
    fn tracking_from_counts_classifies() {
        assert_eq!(Tracking::from_counts("origin/main", 0, 0).status, TrackingState::Equal);
        assert_eq!(Tracking::from_counts("origin/main", 2, 0).status, TrackingState::Ahead);
        assert_eq!(Tracking::from_counts("origin/main", 0, 3).status, TrackingState::Behind);
        assert_eq!(
            Tracking::from_counts("origin/main", 1, 1).status,
            TrackingState::Diverged
        );
    }

    #[test]
    fn gone_and_none_have_no_counts() {
        let gone = Tracking::gone("origin/feature");
        assert_eq!(gone.ahead, None);
        assert_eq!(gone.behind, None);
        let none = Tracking::none();
        assert!(none.upstream.is_empty());
        assert_eq!(none.ahead, None);
    }

    #[test]
    fn inventory_entry_serializes_kind_as_type() {
        let mut entry = InventoryEntry::new("github.com/org/repo", "/src/repo", 10);
        entry.kind = RepoKind::Mirror;
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "mirror");
        assert_eq!(json["status"], "present");
        assert!(json.get("labels").is_none());
    }

    #[test]
    fn outcome_ok_flags() {
        assert!(SyncOutcome::SkippedDirty.is_ok());
        assert!(!SyncOutcome::Failed.is_ok());
        assert!(!SyncOutcome::Aborted.is_ok());
        assert_eq!(SyncOutcome::SkippedProtectedBranch.as_str(), "skipped_protected_branch");
    }
}
