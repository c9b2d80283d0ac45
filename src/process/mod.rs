// ABOUTME: External process execution for the status engine
//
// - runner: bounded-time command execution with captured output
// - tool: startup detection of the git client

pub mod runner;
pub mod tool;

pub use runner::{CommandRequest, CommandRunner, ExitPolicy, ProcessError, ProcessOutput, ProcessRunner};
pub use tool::{GitTool, ToolError};
