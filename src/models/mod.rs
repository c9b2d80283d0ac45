// ABOUTME: Core data models for tracked repositories, worktrees, and commit activity

pub mod repository;

pub use repository::{
    display_name_for, CommitActivity, DiscoveredProject, ProjectSource, RepositoryState, TrackedProject,
    WorktreeRecord, ACTIVITY_DAYS,
};
