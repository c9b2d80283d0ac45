// ABOUTME: Library crate for gitbar exposing the status engine for the binary and tests
//
// - process: bounded-time git execution
// - git: status, worktree, and activity probing
// - discovery: projects found in editor and agent manifests
// - scheduler: polling, refresh, and snapshot publication
// - config: layered TOML settings

#![allow(missing_docs)]

pub mod cli;
pub mod config;
pub mod discovery;
pub mod git;
pub mod models;
pub mod process;
pub mod scheduler;
