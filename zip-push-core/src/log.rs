//! Append-only operation log returned verbatim to the caller.

use std::fmt;

use crate::contract::CommandOutput;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationLog {
    lines: Vec<String>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!(target: "zip_push::log", "{line}");
        self.lines.push(line);
    }

    pub fn error(&mut self, message: impl fmt::Display) {
        let line = format!("ERROR: {message}");
        tracing::error!(target: "zip_push::log", "{line}");
        self.lines.push(line);
    }

    pub fn warning(&mut self, message: impl fmt::Display) {
        let line = format!("WARNING: {message}");
        tracing::warn!(target: "zip_push::log", "{line}");
        self.lines.push(line);
    }

    /// Appends the non-empty output streams of a command.
    pub fn record_output(&mut self, output: &CommandOutput) {
        let stdout = output.stdout.trim_end();
        if !stdout.is_empty() {
            self.push(stdout);
        }
        let stderr = output.stderr.trim_end();
        if !stderr.is_empty() {
            self.push(stderr);
        }
    }

    /// Lines in order, blank ones dropped.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(String::as_str)
            .filter(|l| !l.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.lines().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_error(&self) -> bool {
        self.lines().any(|l| l.contains("ERROR"))
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect()
    }
}

impl fmt::Display for OperationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for line in self.lines() {
            if !first {
                f.write_str("\n")?;
            }
            f.write_str(line)?;
            first = false;
        }
        Ok(())
    }
}
