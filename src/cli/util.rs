// ABOUTME: Shared CLI formatting for repository status rows

use crate::models::{CommitActivity, RepositoryState};

const SPARK_LEVELS: [char; 8] = ['\u{2581}', '\u{2582}', '\u{2583}', '\u{2584}', '\u{2585}', '\u{2586}', '\u{2587}', '\u{2588}'];

/// Header matching [`status_row`]
pub fn status_header() -> String {
    format!("{:<24} {:<20} {:<10} {:<14} ACTIVITY (30d)", "NAME", "BRANCH", "SYNC", "CHANGES")
}

/// One table row for a repository
pub fn status_row(name: &str, state: &RepositoryState, activity: &CommitActivity) -> String {
    let branch = state
        .branch_name
        .clone()
        .unwrap_or_else(|| "(detached)".to_string());
    let sync = if state.has_remote {
        format!("\u{2191}{} \u{2193}{}", state.ahead_count, state.behind_count)
    } else {
        "-".to_string()
    };
    let changes = if state.is_dirty() {
        format!(
            "+{} ~{} ?{}",
            state.staged_count, state.unstaged_count, state.untracked_count
        )
    } else {
        "clean".to_string()
    };

    format!(
        "{:<24} {:<20} {:<10} {:<14} {} {}",
        truncate(name, 24),
        truncate(&branch, 20),
        sync,
        changes,
        sparkline(activity),
        activity.total()
    )
}

/// Oldest day on the left, today on the right
pub fn sparkline(activity: &CommitActivity) -> String {
    let peak = activity.days().iter().copied().max().unwrap_or(0);
    activity
        .days()
        .iter()
        .rev()
        .map(|&count| {
            if count == 0 || peak == 0 {
                ' '
            } else {
                let level = (count as usize * (SPARK_LEVELS.len() - 1)).div_ceil(peak as usize);
                SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
            }
        })
        .collect()
}

/// Truncate a string to fit in the given width (character-aware for UTF-8)
pub fn truncate(s: &str, max_len: usize) -> String {
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let char_count = s.chars().count();
    if char_count <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
