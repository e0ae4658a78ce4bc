use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Largest archive the pipeline accepts: 200 MiB.
pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 200 * 1024 * 1024;

/// How the project root is marked as a trusted (`safe.directory`) path for git.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustScope {
    /// Injected through the environment of this request's git calls only.
    #[default]
    Session,
    /// Added to the user's global git config and removed again at cleanup.
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory under which one session directory per request is created.
    pub work_root: PathBuf,
    pub max_archive_bytes: u64,
    pub command_timeout_secs: u64,
    pub branch: String,
    pub commit_message: String,
    /// Retry a rejected push once with `--force`. This overwrites remote history.
    pub force_push_fallback: bool,
    pub trust_scope: TrustScope,
    pub git_binary: String,
    /// Extra `key = value` git config injected into every git call of a request.
    pub git_config: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("zip-push"),
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
            command_timeout_secs: 300,
            branch: "main".to_string(),
            commit_message: "Upload project from ZIP archive".to_string(),
            force_push_fallback: false,
            trust_scope: TrustScope::default(),
            git_binary: "git".to_string(),
            git_config: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn trace_loaded(&self) {
        info!(
            work_root = %self.work_root.display(),
            max_archive_bytes = self.max_archive_bytes,
            command_timeout_secs = self.command_timeout_secs,
            branch = %self.branch,
            force_push_fallback = self.force_push_fallback,
            trust_scope = ?self.trust_scope,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}
