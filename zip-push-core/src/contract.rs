#![allow(unused)]

//! # contract: the seam between the pipeline and the external `git` binary
//!
//! The pipeline never spawns processes itself. Every git invocation goes
//! through a [`CommandRunner`], which lets the production implementation
//! ([`crate::git::GitCli`]) be swapped for a `mockall` mock in tests.
//!
//! ## Contract
//! - `run` never fails: a process that cannot be launched or that exceeds its
//!   deadline is reported through [`CommandOutput::kind`].
//! - The working directory and environment are supplied per call. Runners must
//!   not read or mutate process-wide environment to build them.

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use mockall::{automock, predicate::*};

/// How a command invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// The process ran and exited on its own; see [`CommandOutput::code`].
    Exited,
    /// The process exceeded its deadline and was killed.
    TimedOut,
    /// The process could not be started at all.
    LaunchFailed,
}

/// Captured result of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub kind: ExitKind,
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            kind: ExitKind::Exited,
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Synthetic result for a process that never started: exit code 1, no
    /// output, the launch error as stderr.
    pub fn launch_failed(err: impl fmt::Display) -> Self {
        Self {
            kind: ExitKind::LaunchFailed,
            code: 1,
            stdout: String::new(),
            stderr: err.to_string(),
        }
    }

    pub fn timed_out(after: Duration, stdout: impl Into<String>) -> Self {
        Self {
            kind: ExitKind::TimedOut,
            code: -1,
            stdout: stdout.into(),
            stderr: format!("command timed out after {}s and was killed", after.as_secs()),
        }
    }

    pub fn success(&self) -> bool {
        self.kind == ExitKind::Exited && self.code == 0
    }
}

/// Runs an external command and captures its result.
///
/// `args` excludes the program name; the runner decides which binary to use.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String], cwd: &Path, env: &[(String, String)]) -> CommandOutput;
}
