// ABOUTME: Git integration: output parsers and the single-repository probe
//
// Everything here talks to git through the command-line client; no library binding.

pub mod activity;
pub mod error;
pub mod probe;
pub mod status_parser;
pub mod worktree_parser;

pub use error::{ParseError, ProbeError};
pub use probe::{ProbeReport, RepositoryProbe, RepositoryProber};
pub use status_parser::StatusSnapshot;
pub use worktree_parser::parse_worktree_list;
