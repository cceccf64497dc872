use crate::model::{Remote, Worktree};
use crate::vcs::{BranchTracking, RemoteConfig};

pub(crate) const FIELD_SEP: char = '\u{1f}';

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct Probe {
    pub(crate) bare: bool,
    pub(crate) inside_work_tree: bool,
    /// Relative path up to the work tree root; empty at the root itself.
    pub(crate) cdup: String,
}

/// Output of `rev-parse --is-bare-repository --is-inside-work-tree
/// --show-cdup`. A bare repository prints no cdup line.
pub(crate) fn parse_probe(stdout: &str) -> Option<Probe> {
    let mut lines = stdout.lines().map(str::trim);
    let bare = parse_bool(lines.next()?)?;
    let inside_work_tree = parse_bool(lines.next()?)?;
    let cdup = lines.next().unwrap_or("").to_string();
    Some(Probe {
        bare,
        inside_work_tree,
        cdup,
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Output of `config --get-regexp ^remote\.`. Keys are `remote.<name>.<key>`;
/// remote names may themselves contain dots.
pub(crate) fn parse_remote_config(stdout: &str) -> RemoteConfig {
    let mut remotes: Vec<Remote> = Vec::new();
    let mut mirror = false;
    for line in stdout.lines() {
        let line = line.trim_end();
        let (key, value) = match line.split_once(char::is_whitespace) {
            Some((key, value)) => (key, value.trim()),
            None => (line, ""),
        };
        let Some(rest) = key.strip_prefix("remote.") else {
            continue;
        };
        let Some((name, field)) = rest.rsplit_once('.') else {
            continue;
        };
        match field.to_ascii_lowercase().as_str() {
            "url" => {
                if !remotes.iter().any(|remote| remote.name == name) {
                    remotes.push(Remote {
                        name: name.to_string(),
                        url: value.to_string(),
                    });
                }
            }
            "mirror" => {
                if value.eq_ignore_ascii_case("true") {
                    mirror = true;
                }
            }
            _ => {}
        }
    }
    remotes.sort_by(|a, b| a.name.cmp(&b.name));
    RemoteConfig { remotes, mirror }
}

/// Output of `status --porcelain=v1 --untracked-files=normal`.
pub(crate) fn parse_porcelain(stdout: &str) -> Worktree {
    let mut worktree = Worktree::default();
    for line in stdout.lines() {
        let mut chars = line.chars();
        let (Some(index), Some(tree)) = (chars.next(), chars.next()) else {
            continue;
        };
        if index == '?' && tree == '?' {
            worktree.untracked += 1;
            continue;
        }
        if index == '!' {
            continue;
        }
        if index != ' ' {
            worktree.staged += 1;
        }
        if tree != ' ' {
            worktree.unstaged += 1;
        }
    }
    worktree.dirty = worktree.staged + worktree.unstaged + worktree.untracked > 0;
    worktree
}

/// Output of the batched `for-each-ref` tracking query; fields are separated
/// by `FIELD_SEP`: short name, upstream ref, upstream short, track.
pub(crate) fn parse_branch_tracking(stdout: &str) -> Vec<BranchTracking> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.split(FIELD_SEP);
            let branch = fields.next()?.trim();
            if branch.is_empty() {
                return None;
            }
            let upstream_ref = non_empty(fields.next());
            let upstream = non_empty(fields.next());
            let track = fields.next().unwrap_or("").trim();
            Some(BranchTracking {
                branch: branch.to_string(),
                gone: upstream_ref.is_some() && is_gone(track),
                upstream_ref,
                upstream,
            })
        })
        .collect()
}

fn is_gone(track: &str) -> bool {
    let track = track.trim_start_matches('[').trim_end_matches(']');
    track == "gone"
}

fn non_empty(field: Option<&str>) -> Option<String> {
    field
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Output of `rev-list --left-right --count a...b`.
pub(crate) fn parse_left_right(stdout: &str) -> Option<(u32, u32)> {
    let mut parts = stdout.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_parses_layout_and_cdup() {
        let root = parse_probe("false\ntrue\n\n").unwrap();
        assert!(!root.bare);
        assert!(root.inside_work_tree);
        assert!(root.cdup.is_empty());
        let bare = parse_probe("true\nfalse\n").unwrap();
        assert!(bare.bare);
        let nested = parse_probe("false\ntrue\n../\n").unwrap();
        assert_eq!(nested.cdup, "../");
        assert_eq!(parse_probe("true\n"), None);
        assert_eq!(parse_probe("maybe\ntrue"), None);
    }

    #[test]
    fn remote_config_handles_dotted_names_and_mirror_flag() {
        let stdout = "remote.origin.url git@github.com:org/repo.git\n\
remote.origin.fetch +refs/heads/*:refs/remotes/origin/*\n\
remote.team.v2.url https://gitlab.com/team/repo.git\n\
remote.origin.mirror true\n";
        let config = parse_remote_config(stdout);
        assert!(config.mirror);
        assert_eq!(config.remotes.len(), 2);
        assert_eq!(config.remotes[0].name, "origin");
        assert_eq!(config.remotes[1].name, "team.v2");
        assert_eq!(config.remotes[1].url, "https://gitlab.com/team/repo.git");
    }

    #[test]
    fn porcelain_counts_each_bucket() {
        let stdout = "M  staged.rs\n M unstaged.rs\nMM both.rs\n?? new.txt\n?? other/\nR  old.rs -> new.rs\n";
        let worktree = parse_porcelain(stdout);
        assert!(worktree.dirty);
        assert_eq!(worktree.staged, 3);
        assert_eq!(worktree.unstaged, 2);
        assert_eq!(worktree.untracked, 2);
    }

    #[test]
    fn porcelain_clean_tree() {
        let worktree = parse_porcelain("");
        assert!(!worktree.dirty);
        assert_eq!(worktree, Worktree::default());
    }

    #[test]
    fn branch_tracking_reads_gone_marker() {
        let sep = FIELD_SEP;
        let stdout = format!(
            "main{sep}refs/remotes/origin/main{sep}origin/main{sep}behind 2\n\
feature{sep}refs/remotes/origin/feature{sep}origin/feature{sep}gone\n\
scratch{sep}{sep}{sep}\n"
        );
        let rows = parse_branch_tracking(&stdout);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].upstream.as_deref(), Some("origin/main"));
        assert!(!rows[0].gone);
        assert!(rows[1].gone);
        assert_eq!(rows[2].upstream_ref, None);
        assert!(!rows[2].gone);
    }

    #[test]
    fn left_right_counts() {
        assert_eq!(parse_left_right("3\t1\n"), Some((3, 1)));
        assert_eq!(parse_left_right("garbage"), None);
    }
}
