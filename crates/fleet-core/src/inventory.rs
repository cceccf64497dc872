use crate::model::{EntryStatus, InventoryEntry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Authoritative, ordered list of tracked repositories. Operations never
/// reorder or duplicate entries; `(repo_id, path)` is the uniqueness key and
/// several entries may share a `repo_id`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    entries: Vec<InventoryEntry>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<InventoryEntry>) -> Self {
        let mut inventory = Self::new();
        for entry in entries {
            inventory.upsert(entry);
        }
        inventory
    }

    pub fn entries(&self) -> &[InventoryEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<InventoryEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the entry with the same `(repo_id, path)`, else appends.
    pub fn upsert(&mut self, entry: InventoryEntry) {
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.repo_id == entry.repo_id && existing.path == entry.path)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn find_by_repo_id(&self, repo_id: &str) -> Vec<&InventoryEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.repo_id == repo_id)
            .collect()
    }

    pub fn find_by_path(&self, path: &Path) -> Option<&InventoryEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }

    pub fn find_by_path_mut(&mut self, path: &Path) -> Option<&mut InventoryEntry> {
        self.entries.iter_mut().find(|entry| entry.path == path)
    }

    /// Returns whether an entry at `path` changed to `missing`.
    pub fn mark_missing(&mut self, path: &Path) -> bool {
        let mut changed = false;
        for entry in self.entries.iter_mut().filter(|entry| entry.path == path) {
            if entry.status != EntryStatus::Missing {
                entry.status = EntryStatus::Missing;
                changed = true;
            }
        }
        changed
    }

    /// Relocates the first `missing` entry of `repo_id` to `new_path`.
    /// Returns false when there is no such entry or the move would collide
    /// with an existing `(repo_id, new_path)` entry.
    pub fn mark_moved(&mut self, repo_id: &str, new_path: &Path, now: u64) -> bool {
        if self
            .entries
            .iter()
            .any(|entry| entry.repo_id == repo_id && entry.path == new_path)
        {
            return false;
        }
        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.repo_id == repo_id && entry.status == EntryStatus::Missing)
        else {
            return false;
        };
        entry.path = new_path.to_path_buf();
        entry.status = EntryStatus::Moved;
        entry.last_seen = now;
        true
    }

    /// Records that the repository at `path` was seen alive. A `missing` or
    /// `moved` entry becomes `present` again.
    pub fn touch(&mut self, path: &Path, now: u64) -> bool {
        let mut touched = false;
        for entry in self.entries.iter_mut().filter(|entry| entry.path == path) {
            entry.last_seen = now;
            entry.status = EntryStatus::Present;
            touched = true;
        }
        touched
    }

    /// Drops `missing` entries not seen within `threshold`; returns them.
    pub fn prune_stale(&mut self, threshold: Duration, now: u64) -> Vec<InventoryEntry> {
        let cutoff = now.saturating_sub(threshold.as_secs());
        let (stale, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.status == EntryStatus::Missing && entry.last_seen < cutoff);
        self.entries = keep;
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(id: &str, path: &str, seen: u64) -> InventoryEntry {
        InventoryEntry::new(id, PathBuf::from(path), seen)
    }

    #[test]
    fn upsert_replaces_on_id_and_path() {
        let mut inventory = Inventory::new();
        inventory.upsert(entry("example.com/a", "/src/a", 1));
        inventory.upsert(entry("example.com/b", "/src/b", 1));
        let mut updated = entry("example.com/a", "/src/a", 5);
        updated.branch = Some("main".into());
        inventory.upsert(updated);

        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.entries()[0].last_seen, 5);
        assert_eq!(inventory.entries()[1].repo_id, "example.com/b");
    }

    #[test]
    fn same_repo_id_at_two_paths_is_two_entries() {
        let mut inventory = Inventory::new();
        inventory.upsert(entry("example.com/a", "/src/a", 1));
        inventory.upsert(entry("example.com/a", "/mirrors/a.git", 1));
        assert_eq!(inventory.find_by_repo_id("example.com/a").len(), 2);
    }

    #[test]
    fn present_to_missing_to_moved() {
        let mut inventory = Inventory::new();
        inventory.upsert(entry("example.com/a", "/src/a", 1));
        assert!(inventory.mark_missing(Path::new("/src/a")));
        assert!(!inventory.mark_missing(Path::new("/src/a")));
        assert_eq!(inventory.entries()[0].status, EntryStatus::Missing);

        assert!(inventory.mark_moved("example.com/a", Path::new("/work/a"), 9));
        let moved = &inventory.entries()[0];
        assert_eq!(moved.status, EntryStatus::Moved);
        assert_eq!(moved.path, PathBuf::from("/work/a"));
        assert_eq!(moved.last_seen, 9);
        assert_eq!(inventory.len(), 1);
    }

    #[test]
    fn mark_moved_ignores_present_entries() {
        let mut inventory = Inventory::new();
        inventory.upsert(entry("example.com/a", "/src/a", 1));
        assert!(!inventory.mark_moved("example.com/a", Path::new("/work/a"), 2));
        assert_eq!(inventory.entries()[0].path, PathBuf::from("/src/a"));
    }

    #[test]
    fn mark_moved_leaves_moved_entries_in_place() {
        let mut inventory = Inventory::new();
        inventory.upsert(entry("example.com/a", "/src/a", 1));
        inventory.mark_missing(Path::new("/src/a"));
        assert!(inventory.mark_moved("example.com/a", Path::new("/work/a"), 2));
        assert!(!inventory.mark_moved("example.com/a", Path::new("/other/a"), 3));
        assert_eq!(inventory.entries()[0].path, PathBuf::from("/work/a"));
        assert_eq!(inventory.entries()[0].status, EntryStatus::Moved);
    }

    #[test]
    fn prune_drops_only_stale_missing() {
        let day = 86_400;
        let mut inventory = Inventory::new();
        let mut old_missing = entry("example.com/old", "/src/old", 0);
        old_missing.status = EntryStatus::Missing;
        let mut fresh_missing = entry("example.com/fresh", "/src/fresh", 9 * day);
        fresh_missing.status = EntryStatus::Missing;
        inventory.upsert(old_missing);
        inventory.upsert(entry("example.com/alive", "/src/alive", 0));
        inventory.upsert(fresh_missing);

        let pruned = inventory.prune_stale(Duration::from_secs(7 * day), 10 * day);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].repo_id, "example.com/old");
        let ids: Vec<_> = inventory.entries().iter().map(|e| e.repo_id.as_str()).collect();
        assert_eq!(ids, vec!["example.com/alive", "example.com/fresh"]);
    }

    #[test]
    fn touch_revives_missing_entry() {
        let mut inventory = Inventory::new();
        inventory.upsert(entry("example.com/a", "/src/a", 1));
        inventory.mark_missing(Path::new("/src/a"));
        assert!(inventory.touch(Path::new("/src/a"), 4));
        assert_eq!(inventory.entries()[0].status, EntryStatus::Present);
        assert_eq!(inventory.entries()[0].last_seen, 4);
    }

    #[test]
    fn touch_settles_moved_entry() {
        let mut inventory = Inventory::new();
        inventory.upsert(entry("example.com/a", "/src/a", 1));
        inventory.mark_missing(Path::new("/src/a"));
        inventory.mark_moved("example.com/a", Path::new("/work/a"), 2);
        assert!(inventory.touch(Path::new("/work/a"), 5));
        assert_eq!(inventory.entries()[0].status, EntryStatus::Present);
    }
}
