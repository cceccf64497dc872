use crate::error::FleetError;
use crate::inventory::Inventory;
use crate::model::{EntryStatus, InventoryEntry, RepositoryStatus};
use glob::Pattern;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub roots: Vec<PathBuf>,
    pub exclude: Vec<String>,
    pub follow_symlinks: bool,
}

/// Exclusion globs, matched against the full path and the directory name.
#[derive(Debug, Default)]
pub struct Excludes {
    patterns: Vec<Pattern>,
}

impl Excludes {
    pub fn new(patterns: &[String]) -> Result<Self, FleetError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|err| FleetError::Pattern {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|name| name.to_str());
        self.patterns.iter().any(|pattern| {
            pattern.matches_path(path) || name.is_some_and(|name| pattern.matches(name))
        })
    }
}

/// Whether `path` has the on-disk shape of a repository: a `.git` directory,
/// a `.git` file pointing elsewhere (`gitdir: ...`), or a bare layout.
pub fn looks_like_repo(path: &Path) -> bool {
    let dot_git = path.join(".git");
    if dot_git.is_dir() {
        return true;
    }
    if dot_git.is_file() {
        return fs::read_to_string(&dot_git)
            .map(|contents| contents.trim_start().starts_with("gitdir:"))
            .unwrap_or(false);
    }
    is_bare_layout(path)
}

fn is_bare_layout(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir() && path.join("refs").is_dir()
}

/// Walks the roots and returns candidate repository roots, sorted. Excluded
/// directories are never entered and descent stops at each repository, so
/// nested repositories are not reported.
pub fn discover(options: &DiscoveryOptions) -> Result<Vec<PathBuf>, FleetError> {
    let excludes = Excludes::new(&options.exclude)?;
    let mut found = BTreeSet::new();
    for root in &options.roots {
        let root = match fs::canonicalize(root) {
            Ok(root) => root,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "skipping unreadable root");
                continue;
            }
        };
        walk_root(&root, options.follow_symlinks, &excludes, &mut found);
    }
    info!(count = found.len(), "discovered repositories");
    Ok(found.into_iter().collect())
}

fn walk_root(root: &Path, follow_symlinks: bool, excludes: &Excludes, found: &mut BTreeSet<PathBuf>) {
    let mut walker = WalkDir::new(root)
        .follow_links(follow_symlinks)
        .into_iter()
        .filter_entry(|entry| keep_entry(entry, excludes));
    while let Some(next) = walker.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "walk error");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if looks_like_repo(entry.path()) {
            found.insert(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }
}

fn keep_entry(entry: &DirEntry, excludes: &Excludes) -> bool {
    if entry.file_type().is_dir() && entry.file_name() == ".git" {
        return false;
    }
    !excludes.is_excluded(entry.path())
}

/// What a scan changed in the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanChanges {
    pub added: Vec<PathBuf>,
    pub refreshed: Vec<PathBuf>,
    pub moved: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

/// Merges discovered snapshots into the inventory: vanished paths become
/// `missing`, known paths are refreshed, a known `repo_id` at a new path
/// moves its `missing` entry, anything else is appended. Nothing is
/// removed.
pub fn reconcile_inventory(
    inventory: &mut Inventory,
    discovered: &[RepositoryStatus],
    now: u64,
) -> ScanChanges {
    let mut changes = ScanChanges::default();

    let vanished: Vec<PathBuf> = inventory
        .entries()
        .iter()
        .filter(|entry| entry.status != EntryStatus::Missing && !looks_like_repo(&entry.path))
        .map(|entry| entry.path.clone())
        .collect();
    for path in vanished {
        if inventory.mark_missing(&path) {
            info!(path = %path.display(), "repository vanished");
            changes.missing.push(path);
        }
    }

    for status in discovered {
        if status.is_failed() {
            debug!(path = %status.path.display(), "not recording failed inspection");
            continue;
        }
        if inventory.find_by_path(&status.path).is_some() {
            inventory.touch(&status.path, now);
            refresh(inventory, status);
            changes.refreshed.push(status.path.clone());
        } else if inventory.mark_moved(&status.repo_id, &status.path, now) {
            info!(repo_id = %status.repo_id, path = %status.path.display(), "repository moved");
            refresh(inventory, status);
            changes.moved.push(status.path.clone());
        } else {
            let mut entry = InventoryEntry::new(status.repo_id.clone(), status.path.clone(), now);
            entry.remote_url = status.primary_remote_url().map(str::to_string);
            entry.kind = status.kind;
            entry.branch = status.branch().map(str::to_string);
            inventory.upsert(entry);
            changes.added.push(status.path.clone());
        }
    }
    changes
}

fn refresh(inventory: &mut Inventory, status: &RepositoryStatus) {
    if let Some(entry) = inventory.find_by_path_mut(&status.path) {
        entry.kind = status.kind;
        if let Some(branch) = status.branch() {
            entry.branch = Some(branch.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Head, RepoKind, Remote};
    use tempfile::TempDir;

    fn fake_repo(path: &Path) {
        fs::create_dir_all(path.join(".git")).unwrap();
    }

    fn discovered(id: &str, path: &Path) -> RepositoryStatus {
        let mut status = RepositoryStatus::empty(id, path);
        status.remotes = vec![Remote {
            name: "origin".into(),
            url: format!("https://{id}.git"),
        }];
        status.primary_remote = Some("origin".into());
        status.head = Some(Head {
            branch: Some("main".into()),
            detached: false,
        });
        status
    }

    #[test]
    fn finds_repos_and_stops_at_nested() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fake_repo(&root.join("a"));
        fake_repo(&root.join("a").join("vendor").join("nested"));
        fake_repo(&root.join("group").join("b"));
        fs::create_dir_all(root.join("group").join("c")).unwrap();
        fs::write(
            root.join("group").join("c").join(".git"),
            "gitdir: /elsewhere/.git/worktrees/c\n",
        )
        .unwrap();
        let bare = root.join("mirrors").join("d.git");
        fs::create_dir_all(bare.join("objects")).unwrap();
        fs::create_dir_all(bare.join("refs")).unwrap();
        fs::write(bare.join("HEAD"), "ref: refs/heads/main\n").unwrap();

        let found = discover(&DiscoveryOptions {
            roots: vec![root.to_path_buf()],
            ..DiscoveryOptions::default()
        })
        .unwrap();
        let root = fs::canonicalize(root).unwrap();
        assert_eq!(
            found,
            vec![
                root.join("a"),
                root.join("group").join("b"),
                root.join("group").join("c"),
                root.join("mirrors").join("d.git"),
            ]
        );
    }

    #[test]
    fn excluded_directories_are_pruned() {
        let tmp = TempDir::new().unwrap();
        fake_repo(&tmp.path().join("keep"));
        fake_repo(&tmp.path().join("node_modules").join("dep"));
        fake_repo(&tmp.path().join("archive").join("old"));
        let archive = fs::canonicalize(tmp.path()).unwrap().join("archive");

        let found = discover(&DiscoveryOptions {
            roots: vec![tmp.path().to_path_buf()],
            exclude: vec!["node_modules".into(), archive.display().to_string()],
            follow_symlinks: false,
        })
        .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("keep"));
    }

    #[test]
    fn invalid_exclude_is_rejected() {
        let err = discover(&DiscoveryOptions {
            exclude: vec!["[".into()],
            ..DiscoveryOptions::default()
        })
        .unwrap_err();
        assert!(matches!(err, FleetError::Pattern { .. }));
    }

    #[test]
    fn present_missing_moved_across_scans() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");
        fake_repo(&first);
        let mut inventory = Inventory::new();

        let changes = reconcile_inventory(&mut inventory, &[discovered("example.com/app", &first)], 10);
        assert_eq!(changes.added, vec![first.clone()]);
        assert_eq!(inventory.entries()[0].status, EntryStatus::Present);
        assert_eq!(
            inventory.entries()[0].remote_url.as_deref(),
            Some("https://example.com/app.git")
        );

        fs::remove_dir_all(&first).unwrap();
        let changes = reconcile_inventory(&mut inventory, &[], 20);
        assert_eq!(changes.missing, vec![first.clone()]);
        assert_eq!(inventory.entries()[0].status, EntryStatus::Missing);
        assert_eq!(inventory.entries()[0].last_seen, 10);

        fake_repo(&second);
        let changes = reconcile_inventory(&mut inventory, &[discovered("example.com/app", &second)], 30);
        assert_eq!(changes.moved, vec![second.clone()]);
        assert_eq!(inventory.len(), 1);
        let entry = &inventory.entries()[0];
        assert_eq!(entry.status, EntryStatus::Moved);
        assert_eq!(entry.path, second);
        assert_eq!(entry.last_seen, 30);
    }

    #[test]
    fn second_live_clone_is_kept_across_scans() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("gone");
        let b = tmp.path().join("b");
        let c = tmp.path().join("c");
        let mut inventory = Inventory::new();
        inventory.upsert(InventoryEntry::new("example.com/app", &gone, 1));
        inventory.mark_missing(&gone);
        fake_repo(&b);
        fake_repo(&c);
        let scan = [
            discovered("example.com/app", &b),
            discovered("example.com/app", &c),
        ];

        let changes = reconcile_inventory(&mut inventory, &scan, 10);
        assert_eq!(changes.moved, vec![b.clone()]);
        assert_eq!(changes.added, vec![c.clone()]);
        assert_eq!(inventory.len(), 2);

        let changes = reconcile_inventory(&mut inventory, &scan, 20);
        assert!(changes.moved.is_empty());
        assert!(changes.added.is_empty());
        assert_eq!(changes.refreshed, vec![b.clone(), c.clone()]);
        for path in [&b, &c] {
            let entry = inventory.find_by_path(path).unwrap();
            assert_eq!(entry.repo_id, "example.com/app");
            assert_eq!(entry.status, EntryStatus::Present);
            assert_eq!(entry.last_seen, 20);
        }
    }

    #[test]
    fn refresh_keeps_recorded_identity() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app");
        fake_repo(&path);
        let mut inventory = Inventory::new();
        let mut entry = InventoryEntry::new("example.com/old", &path, 1);
        entry.remote_url = Some("https://example.com/old.git".into());
        inventory.upsert(entry);

        let mut status = discovered("example.com/new", &path);
        status.kind = RepoKind::Checkout;
        let changes = reconcile_inventory(&mut inventory, &[status], 5);
        assert_eq!(changes.refreshed, vec![path.clone()]);
        let entry = &inventory.entries()[0];
        assert_eq!(entry.repo_id, "example.com/old");
        assert_eq!(entry.remote_url.as_deref(), Some("https://example.com/old.git"));
        assert_eq!(entry.branch.as_deref(), Some("main"));
        assert_eq!(entry.last_seen, 5);
    }
}
