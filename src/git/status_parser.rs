// ABOUTME: Parser for `git status` porcelain output (v1, v2, and split branch/change framings)
//
// The parser never fails: unknown status codes are counted as unstaged and unknown
// header lines are skipped, so a new git release cannot take the engine down.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

lazy_static! {
    /// `branch...upstream [ahead N, behind M]` with both tails optional
    static ref V1_BRANCH_HEADER: Regex =
        Regex::new(r"^(?P<branch>\S+?)(?:\.\.\.(?P<upstream>\S+))?(?: \[(?P<track>[^\]]*)\])?$")
            .expect("valid branch header regex");
}

/// Status codes that mean "this side changed" in either column
const CHANGE_CODES: [char; 6] = ['M', 'T', 'A', 'D', 'R', 'C'];

/// Structured result of one `git status` run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub branch_name: Option<String>,
    pub is_detached: bool,
    pub upstream: Option<String>,
    pub has_remote: bool,
    pub ahead: u32,
    pub behind: u32,
    pub head_sha: Option<String>,
    pub staged: u32,
    pub unstaged: u32,
    pub untracked: u32,
}

impl StatusSnapshot {
    pub const fn has_uncommitted_changes(&self) -> bool {
        self.staged > 0 || self.unstaged > 0 || self.untracked > 0
    }

    /// Parse a single output that carries its own branch header
    /// (`--porcelain=v1 --branch` or `--porcelain=v2 --branch`)
    pub fn parse(output: &str) -> Self {
        let mut acc = Accumulator::default();
        for line in output.lines() {
            acc.apply_line(line, true);
        }
        acc.finish()
    }

    /// Parse a branch summary and a change list produced by separate commands
    pub fn parse_split(branch_summary: &str, changes: &str) -> Self {
        let mut acc = Accumulator::default();

        if let Some(first) = branch_summary.lines().map(str::trim_end).find(|l| !l.is_empty()) {
            if first.starts_with("## ") || first.starts_with("# ") {
                for line in branch_summary.lines() {
                    acc.apply_header_only(line);
                }
            } else {
                acc.apply_v1_header(first.trim());
            }
        }

        for line in changes.lines() {
            acc.apply_line(line, false);
        }
        acc.finish()
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    snapshot: StatusSnapshot,
    upstream_gone: bool,
    saw_v2_header: bool,
    saw_v2_ab: bool,
    seen_paths: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Untracked,
    Tracked { staged: bool, unstaged: bool },
}

impl Accumulator {
    fn apply_line(&mut self, raw: &str, headers_allowed: bool) {
        let line = raw.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return;
        }

        if let Some(header) = line.strip_prefix("## ") {
            if headers_allowed {
                self.apply_v1_header(header);
            }
            return;
        }
        if let Some(header) = line.strip_prefix("# ") {
            if headers_allowed {
                self.apply_v2_header(header);
            }
            return;
        }

        if let Some((path, change)) = classify_entry(line) {
            self.count(path, change);
        }
    }

    fn apply_header_only(&mut self, raw: &str) {
        let line = raw.trim_end();
        if let Some(header) = line.strip_prefix("## ") {
            self.apply_v1_header(header);
        } else if let Some(header) = line.strip_prefix("# ") {
            self.apply_v2_header(header);
        }
    }

    fn apply_v1_header(&mut self, header: &str) {
        let header = header.trim();
        if header.starts_with("HEAD (no branch)") {
            self.snapshot.branch_name = None;
            self.snapshot.is_detached = true;
            return;
        }

        let header = header
            .strip_prefix("No commits yet on ")
            .or_else(|| header.strip_prefix("Initial commit on "))
            .unwrap_or(header);

        let Some(caps) = V1_BRANCH_HEADER.captures(header) else {
            debug!(header = %header, "Unrecognised branch header, ignoring");
            return;
        };

        self.snapshot.branch_name = caps.name("branch").map(|m| m.as_str().to_string());
        self.snapshot.is_detached = false;
        self.snapshot.upstream = caps.name("upstream").map(|m| m.as_str().to_string());

        if let Some(track) = caps.name("track") {
            for part in track.as_str().split(',').map(str::trim) {
                if part == "gone" {
                    self.upstream_gone = true;
                } else if let Some(n) = part.strip_prefix("ahead ") {
                    self.snapshot.ahead = n.trim().parse().unwrap_or(0);
                } else if let Some(n) = part.strip_prefix("behind ") {
                    self.snapshot.behind = n.trim().parse().unwrap_or(0);
                }
            }
        }
    }

    fn apply_v2_header(&mut self, header: &str) {
        let (key, value) = header.split_once(' ').unwrap_or((header, ""));
        let value = value.trim();
        match key {
            "branch.oid" => {
                self.saw_v2_header = true;
                self.snapshot.head_sha = (value != "(initial)" && !value.is_empty()).then(|| value.to_string());
            }
            "branch.head" => {
                self.saw_v2_header = true;
                if value == "(detached)" {
                    self.snapshot.branch_name = None;
                    self.snapshot.is_detached = true;
                } else {
                    self.snapshot.branch_name = Some(value.to_string());
                    self.snapshot.is_detached = false;
                }
            }
            "branch.upstream" => {
                self.saw_v2_header = true;
                self.snapshot.upstream = Some(value.to_string());
            }
            "branch.ab" => {
                self.saw_v2_header = true;
                self.saw_v2_ab = true;
                for part in value.split_whitespace() {
                    if let Some(n) = part.strip_prefix('+') {
                        self.snapshot.ahead = n.parse().unwrap_or(0);
                    } else if let Some(n) = part.strip_prefix('-') {
                        self.snapshot.behind = n.parse().unwrap_or(0);
                    }
                }
            }
            _ => {}
        }
    }

    fn count(&mut self, path: &str, change: Change) {
        if !self.seen_paths.insert(path.to_string()) {
            return;
        }
        match change {
            Change::Untracked => self.snapshot.untracked += 1,
            Change::Tracked { staged, unstaged } => {
                if staged {
                    self.snapshot.staged += 1;
                }
                if unstaged {
                    self.snapshot.unstaged += 1;
                }
            }
        }
    }

    fn finish(mut self) -> StatusSnapshot {
        // v2 omits branch.ab when the configured upstream no longer exists
        if self.saw_v2_header && self.snapshot.upstream.is_some() && !self.saw_v2_ab {
            self.upstream_gone = true;
        }
        self.snapshot.has_remote = self.snapshot.upstream.is_some() && !self.upstream_gone;
        if !self.snapshot.has_remote {
            self.snapshot.ahead = 0;
            self.snapshot.behind = 0;
        }
        self.snapshot
    }
}

/// Classify one change line; `None` for lines that carry no change (ignored files)
fn classify_entry(line: &str) -> Option<(&str, Change)> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Some((path, Change::Untracked));
    }
    if line.starts_with("!! ") || line.starts_with("! ") {
        return None;
    }
    if let Some(path) = line.strip_prefix("? ") {
        return Some((path, Change::Untracked));
    }

    // porcelain v2: "1 XY sub mH mI mW hH hI path"
    if let Some(rest) = line.strip_prefix("1 ") {
        return Some(v2_entry(line, rest, 7, false));
    }
    // "2 XY sub mH mI mW hH hI Xscore path<TAB>origPath"
    if let Some(rest) = line.strip_prefix("2 ") {
        return Some(v2_entry(line, rest, 8, true));
    }
    // "u XY sub m1 m2 m3 mW h1 h2 h3 path"
    if let Some(rest) = line.strip_prefix("u ") {
        let path = rest.splitn(10, ' ').nth(9).unwrap_or(line);
        return Some((path, Change::Tracked { staged: false, unstaged: true }));
    }

    // porcelain v1: "XY path" or "XY orig -> path"
    let bytes = line.as_bytes();
    if bytes.len() > 3 && bytes[0].is_ascii() && bytes[1].is_ascii() && bytes[2] == b' ' {
        let x = char::from(bytes[0]);
        let y = char::from(bytes[1]);
        let path = &line[3..];
        let path = path.rsplit_once(" -> ").map_or(path, |(_, to)| to);
        return Some((path, classify_codes(x, y)));
    }

    debug!(line = %line, "Unrecognised status line, counting as unstaged");
    Some((line, Change::Tracked { staged: false, unstaged: true }))
}

/// `fields_before_path` counts the space-separated fields after the entry marker
fn v2_entry<'a>(line: &'a str, rest: &'a str, fields_before_path: usize, renamed: bool) -> (&'a str, Change) {
    let mut fields = rest.splitn(fields_before_path + 1, ' ');
    let xy = fields.next().unwrap_or("");
    let path = fields.nth(fields_before_path - 1).unwrap_or(line);
    let path = if renamed {
        path.split('\t').next().unwrap_or(path)
    } else {
        path
    };

    let mut codes = xy.chars().map(|c| if c == '.' { ' ' } else { c });
    let x = codes.next().unwrap_or(' ');
    let y = codes.next().unwrap_or(' ');
    (path, classify_codes(x, y))
}

/// Map an XY pair to staged/unstaged; unmerged and unknown codes are unstaged
fn classify_codes(x: char, y: char) -> Change {
    let unmerged = x == 'U' || y == 'U' || (x == 'D' && y == 'D') || (x == 'A' && y == 'A');
    if unmerged {
        return Change::Tracked {
            staged: false,
            unstaged: true,
        };
    }

    let staged = CHANGE_CODES.contains(&x);
    let unstaged = CHANGE_CODES.contains(&y);
    if staged || unstaged {
        Change::Tracked { staged, unstaged }
    } else {
        Change::Tracked {
            staged: false,
            unstaged: true,
        }
    }
}
