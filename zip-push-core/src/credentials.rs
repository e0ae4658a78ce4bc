//! Credential delivery to git subprocesses.
//!
//! An askpass helper script is installed inside the session directory. The
//! script holds no secret: it prints `$ZIP_PUSH_ASKPASS_TOKEN`, which is only
//! ever set on the environment handed to this request's git calls. The helper
//! is owner read/execute only and removed before the request returns.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Environment variable carrying the token into the askpass helper.
pub const TOKEN_ENV: &str = "ZIP_PUSH_ASKPASS_TOKEN";

const ASKPASS_SCRIPT: &str = "#!/bin/sh\nprintf '%s\\n' \"$ZIP_PUSH_ASKPASS_TOKEN\"\n";

#[derive(Debug)]
pub struct AskpassHelper {
    path: PathBuf,
    removed: bool,
}

impl AskpassHelper {
    pub async fn install(dir: &Path) -> std::io::Result<Self> {
        let path = dir.join(format!(".zip-push-askpass-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&path, ASKPASS_SCRIPT).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o500)).await?;
        }

        debug!(path = %path.display(), "Installed askpass helper");
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn remove(mut self) -> std::io::Result<()> {
        self.removed = true;
        tokio::fs::remove_file(&self.path).await
    }
}

impl Drop for AskpassHelper {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, path = %self.path.display(), "Failed to remove askpass helper on drop");
            }
        }
    }
}

/// Environment for the git subprocesses of one request.
///
/// Built fresh per request and passed explicitly to every call; nothing is
/// written to the process-wide environment.
#[derive(Clone)]
pub struct GitEnv {
    askpass: PathBuf,
    token: String,
    config: Vec<(String, String)>,
}

impl GitEnv {
    pub fn new(askpass: &Path, token: &str) -> Self {
        Self {
            askpass: askpass.to_path_buf(),
            token: token.to_string(),
            config: Vec::new(),
        }
    }

    /// Adds a command-line scoped git config entry (same precedence as `git -c`).
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.push((key.into(), value.into()));
        self
    }

    pub fn to_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            (
                "GIT_ASKPASS".to_string(),
                self.askpass.to_string_lossy().into_owned(),
            ),
            ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
            (TOKEN_ENV.to_string(), self.token.clone()),
        ];
        if !self.config.is_empty() {
            vars.push(("GIT_CONFIG_COUNT".to_string(), self.config.len().to_string()));
            for (i, (key, value)) in self.config.iter().enumerate() {
                vars.push((format!("GIT_CONFIG_KEY_{i}"), key.clone()));
                vars.push((format!("GIT_CONFIG_VALUE_{i}"), value.clone()));
            }
        }
        vars
    }
}

impl fmt::Debug for GitEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitEnv")
            .field("askpass", &self.askpass)
            .field("token", &"<redacted>")
            .field("config", &self.config)
            .finish()
    }
}
