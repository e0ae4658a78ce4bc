//! [`CommandRunner`] backed by the system `git` binary via [`tokio::process::Command`].
//!
//! Each call gets its own environment (credentials, trust entries) layered on
//! top of the inherited one, and is bounded by a deadline after which the child
//! is killed.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::contract::{CommandOutput, CommandRunner};

#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
    timeout: Duration,
}

impl GitCli {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        Self::new(config.git_binary.clone(), config.command_timeout())
    }
}

#[async_trait]
impl CommandRunner for GitCli {
    #[instrument(skip(self, args, env), fields(binary = %self.binary, cwd = %cwd.display()))]
    async fn run(&self, args: &[String], cwd: &Path, env: &[(String, String)]) -> CommandOutput {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).current_dir(cwd);
        for (k, v) in env {
            cmd.env(k, v);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Dropping the wait future on timeout must take the child down with it.
        cmd.kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "failed to spawn {}", self.binary);
                return CommandOutput::launch_failed(format!(
                    "failed to launch {}: {e}",
                    self.binary
                ));
            }
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let code = output.status.code().unwrap_or(-1);
                debug!(code, "command exited");
                CommandOutput::exited(
                    code,
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr),
                )
            }
            Ok(Err(e)) => {
                warn!(error = %e, "failed to collect command output");
                CommandOutput::launch_failed(e)
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "command timed out");
                CommandOutput::timed_out(self.timeout, "")
            }
        }
    }
}
