// ABOUTME: Parser for `git worktree list --porcelain`

use std::path::PathBuf;

use super::error::ParseError;
use crate::models::WorktreeRecord;

const CONTEXT: &str = "worktree list";

/// Parse the porcelain worktree listing. The first record is the main worktree.
///
/// Records are separated by blank lines. Each must start with a `worktree <path>`
/// line; attribute lines git may add in future releases are ignored.
/// `has_uncommitted_changes` is left `false` for the caller to fill in.
pub fn parse_worktree_list(output: &str) -> Result<Vec<WorktreeRecord>, ParseError> {
    let mut records = Vec::new();

    for group in output.split("\n\n").map(str::trim).filter(|g| !g.is_empty()) {
        let mut lines = group.lines().map(|l| l.trim_end_matches('\r'));
        let first = lines.next().unwrap_or_default();
        let Some(path) = first.strip_prefix("worktree ") else {
            return Err(ParseError::new(CONTEXT, "record does not start with a worktree path", group));
        };
        if path.trim().is_empty() {
            return Err(ParseError::new(CONTEXT, "empty worktree path", group));
        }

        let mut record = WorktreeRecord {
            path: PathBuf::from(path),
            branch_name: None,
            head_commit_sha: None,
            is_detached: false,
            is_main: records.is_empty(),
            has_uncommitted_changes: false,
            is_bare: false,
            is_prunable: false,
        };

        for line in lines {
            let (key, value) = line.split_once(' ').unwrap_or((line, ""));
            match key {
                "HEAD" => {
                    record.head_commit_sha = (!value.is_empty() && !value.bytes().all(|b| b == b'0'))
                        .then(|| value.to_string());
                }
                "branch" => {
                    let name = value.strip_prefix("refs/heads/").unwrap_or(value);
                    record.branch_name = Some(name.to_string());
                }
                "detached" => record.is_detached = true,
                "bare" => record.is_bare = true,
                "prunable" => record.is_prunable = true,
                "worktree" => {
                    return Err(ParseError::new(CONTEXT, "two worktree paths in one record", group));
                }
                _ => {}
            }
        }

        records.push(record);
    }

    Ok(records)
}
