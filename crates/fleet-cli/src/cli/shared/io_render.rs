use super::*;
use fleet_core::model::TrackingState;

pub(in crate::cli) fn render_progress_bar(step: usize, total: usize, width: usize) -> String {
    if total == 0 || width == 0 {
        return "[]".to_string();
    }
    let filled = ((step as f32 / total as f32) * width as f32).round() as usize;
    let filled = filled.min(width);
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(empty))
}

/// Rewrites one stderr line per completed repository; ends the line on the
/// last one.
pub(in crate::cli) fn render_progress(
    label: &str,
    last_len: &Cell<usize>,
    done: usize,
    total: usize,
    repo_id: &str,
    state: &str,
) {
    let bar = render_progress_bar(done.min(total), total, 20);
    let line = format!("{label} {done}/{total} {bar} {state} repo={repo_id}");
    let prev_len = last_len.get();
    let mut err = io::stderr();
    if line.len() < prev_len {
        let _ = write!(err, "\r{line}{}", " ".repeat(prev_len - line.len()));
    } else {
        let _ = write!(err, "\r{line}");
    }
    let _ = err.flush();
    last_len.set(line.len());
    if done >= total {
        let _ = writeln!(err);
        last_len.set(0);
    }
}

pub(in crate::cli) fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}

pub(in crate::cli) fn tracking_label(status: &RepositoryStatus) -> String {
    let Some(tracking) = &status.tracking else {
        return "-".to_string();
    };
    match (tracking.status, tracking.ahead, tracking.behind) {
        (TrackingState::None, _, _) => "no upstream".to_string(),
        (TrackingState::Gone, _, _) => format!("gone ({})", tracking.upstream),
        (TrackingState::Equal, _, _) => format!("equal ({})", tracking.upstream),
        (state, Some(ahead), Some(behind)) => {
            format!("{state} +{ahead}/-{behind} ({})", tracking.upstream)
        }
        (state, _, _) => format!("{state} ({})", tracking.upstream),
    }
}

fn worktree_label(status: &RepositoryStatus) -> String {
    match &status.worktree {
        None => "-".to_string(),
        Some(worktree) if !worktree.dirty => "clean".to_string(),
        Some(worktree) => format!(
            "dirty s={} u={} ?={}",
            worktree.staged, worktree.unstaged, worktree.untracked
        ),
    }
}

/// Plain-text status table, one row per repository.
pub(in crate::cli) fn status_table(repos: &[RepositoryStatus]) -> Vec<String> {
    let id_width = repos
        .iter()
        .map(|status| status.repo_id.len())
        .max()
        .unwrap_or(0)
        .max("REPO".len());
    let mut lines = vec![format!(
        "{:<id_width$}  {:<8}  {:<16}  {:<28}  {:<22}  PATH",
        "REPO", "KIND", "BRANCH", "TRACKING", "WORKTREE"
    )];
    for status in repos {
        let branch = match &status.head {
            Some(head) if head.detached => "(detached)".to_string(),
            Some(head) => head.branch.clone().unwrap_or_else(|| "-".to_string()),
            None => "-".to_string(),
        };
        let mut line = format!(
            "{:<id_width$}  {:<8}  {:<16}  {:<28}  {:<22}  {}",
            status.repo_id,
            status.kind.as_str(),
            branch,
            tracking_label(status),
            worktree_label(status),
            status.path.display()
        );
        if let (Some(class), Some(error)) = (status.error_class, &status.error) {
            line.push_str(&format!("  [{class}] {error}"));
        }
        lines.push(line);
    }
    lines
}

pub(in crate::cli) fn epoch_to_label(epoch: u64) -> String {
    let Ok(ts) = time::OffsetDateTime::from_unix_timestamp(epoch as i64) else {
        return "unknown".to_string();
    };
    time::format_description::parse_borrowed::<2>("[year]-[month]-[day] [hour]:[minute]")
        .ok()
        .and_then(|format| ts.format(&format).ok())
        .unwrap_or_else(|| "unknown".to_string())
}

pub(in crate::cli) fn status_state(status: &RepositoryStatus) -> &'static str {
    match status.error_class {
        Some(class) => class.as_str(),
        None if status.has_warning() => "warning",
        None => "ok",
    }
}
