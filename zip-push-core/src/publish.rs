//! Upload-and-publish pipeline: ZIP archive in, pushed git branch out.
//!
//! The run is strictly linear:
//!   - validate the request (archive present, `https://` URL, token)
//!   - persist the archive into a fresh [`UploadSession`] and enforce the size ceiling
//!   - extract it and resolve the project root (one wrapping directory is unwrapped)
//!   - install the askpass helper and build this request's git environment
//!   - run the fixed git sequence: init, branch, identity, trust, remote, add,
//!     commit, pull --rebase, push (optionally retried with `--force`)
//!   - clean up the helper, any global trust entry, and the session directory
//!
//! # Error Handling
//! Validation and extraction failures abort the run with a single `ERROR:` line.
//! Git failures never abort: their output is logged, the step is recorded in
//! [`PublishReport::failed_steps`] and the sequence moves on. The caller gets a
//! [`PublishStatus`] instead of having to scan the log.
//!
//! # Destructive writes
//! With [`PipelineConfig::force_push_fallback`] enabled a rejected push is
//! retried once with `--force`, which replaces the remote branch history.

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};
use url::Url;

use crate::archive;
use crate::config::{PipelineConfig, TrustScope};
use crate::contract::{CommandOutput, CommandRunner, ExitKind};
use crate::credentials::{AskpassHelper, GitEnv};
use crate::error::ValidationError;
use crate::log::OperationLog;
use crate::session::UploadSession;

/// An uploaded archive as received from the client.
#[derive(Clone)]
pub struct ArchiveUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

impl fmt::Debug for ArchiveUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveUpload")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct PublishRequest {
    pub repo_url: String,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub token: String,
    pub archive: Option<ArchiveUpload>,
}

impl fmt::Debug for PublishRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishRequest")
            .field("repo_url", &redact_url(&self.repo_url))
            .field("user_name", &self.user_name)
            .field("user_email", &self.user_email)
            .field("token", &"<redacted>")
            .field("archive", &self.archive)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    /// Input validation failed; no git command ran.
    Rejected,
    /// The archive could not be extracted; no git command ran.
    ExtractionFailed,
    /// Local setup (session directory, credential helper) failed; no git command ran.
    SetupFailed,
    Pushed,
    /// The normal push was rejected and the forced retry succeeded.
    ForcePushed,
    PushFailed,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::ExtractionFailed => "extraction-failed",
            Self::SetupFailed => "setup-failed",
            Self::Pushed => "pushed",
            Self::ForcePushed => "force-pushed",
            Self::PushFailed => "push-failed",
        }
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct PublishReport {
    pub status: PublishStatus,
    /// Git steps that exited unsuccessfully, in order.
    pub failed_steps: Vec<String>,
    pub log: OperationLog,
}

impl PublishReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, PublishStatus::Pushed | PublishStatus::ForcePushed)
    }
}

/// Checks the request in order: archive, URL scheme, token.
pub fn validate(request: &PublishRequest) -> Result<&ArchiveUpload, ValidationError> {
    let archive = request
        .archive
        .as_ref()
        .filter(|a| !a.file_name.trim().is_empty())
        .ok_or(ValidationError::MissingArchive)?;
    let secure = Url::parse(request.repo_url.trim())
        .map(|url| url.scheme() == "https" && url.has_host())
        .unwrap_or(false);
    if !secure {
        return Err(ValidationError::InsecureUrl);
    }
    if request.token.trim().is_empty() {
        return Err(ValidationError::MissingToken);
    }
    Ok(archive)
}

/// Runs the whole pipeline for one request. Never panics on user input and
/// never returns an error: every outcome is a [`PublishReport`].
#[instrument(skip_all, fields(repo_url = %redact_url(&request.repo_url)))]
pub async fn publish<R>(config: &PipelineConfig, runner: &R, request: PublishRequest) -> PublishReport
where
    R: CommandRunner + ?Sized,
{
    let mut log = OperationLog::new();

    let upload = match validate(&request) {
        Ok(upload) => upload,
        Err(e) => {
            warn!(error = %e, "Rejected publish request");
            log.error(e);
            return PublishReport {
                status: PublishStatus::Rejected,
                failed_steps: Vec::new(),
                log,
            };
        }
    };

    let mut session = match UploadSession::create(&config.work_root).await {
        Ok(session) => session,
        Err(e) => {
            log.error(e);
            return PublishReport {
                status: PublishStatus::SetupFailed,
                failed_steps: Vec::new(),
                log,
            };
        }
    };

    let mut failed_steps = Vec::new();
    let status = run_in_session(
        config,
        runner,
        &request,
        upload,
        &mut session,
        &mut log,
        &mut failed_steps,
    )
    .await;
    session.close(&mut log).await;

    info!(%status, failed_steps = failed_steps.len(), "Publish finished");
    PublishReport {
        status,
        failed_steps,
        log,
    }
}

async fn run_in_session<R>(
    config: &PipelineConfig,
    runner: &R,
    request: &PublishRequest,
    upload: &ArchiveUpload,
    session: &mut UploadSession,
    log: &mut OperationLog,
    failed_steps: &mut Vec<String>,
) -> PublishStatus
where
    R: CommandRunner + ?Sized,
{
    let archive_path = match session.persist_archive(&upload.file_name, &upload.bytes).await {
        Ok(path) => path,
        Err(e) => {
            log.error(e);
            return PublishStatus::SetupFailed;
        }
    };

    let size = session.archive_size();
    if size > config.max_archive_bytes {
        log.error(ValidationError::ArchiveTooLarge {
            size,
            limit: config.max_archive_bytes,
        });
        return PublishStatus::Rejected;
    }
    let archive_name = session.archive_name().unwrap_or_default().to_string();
    log.push(format!("Saved {archive_name} ({size} bytes)."));

    match archive::extract(archive_path.clone(), session.path().to_path_buf()).await {
        Ok(files) => {
            let noun = if files == 1 { "file" } else { "files" };
            log.push(format!("Extracted {files} {noun} from {archive_name}."));
        }
        Err(e) => {
            log.error(format!("Failed to extract ZIP: {e}"));
            return PublishStatus::ExtractionFailed;
        }
    }

    let root = match archive::project_root(session.path().to_path_buf(), archive_path.clone()).await {
        Ok(root) => root,
        Err(e) => {
            log.error(format!("Failed to inspect extracted files: {e}"));
            return PublishStatus::ExtractionFailed;
        }
    };
    if root == session.path() {
        log.push("Project root: archive root.");
    } else {
        let name = root.file_name().unwrap_or_default().to_string_lossy();
        log.push(format!("Project root: {name}/"));
    }

    let helper = match AskpassHelper::install(session.path()).await {
        Ok(helper) => helper,
        Err(e) => {
            log.error(format!("Failed to prepare credential helper: {e}"));
            return PublishStatus::SetupFailed;
        }
    };

    let mut env = GitEnv::new(helper.path(), &request.token);
    for (key, value) in &config.git_config {
        env = env.with_config(key.clone(), value.clone());
    }
    if config.trust_scope == TrustScope::Session {
        env = env.with_config("safe.directory", root.to_string_lossy());
    }

    let mut git = GitSteps {
        runner,
        root: &root,
        env: env.to_vars(),
        log: &mut *log,
        failed_steps: &mut *failed_steps,
    };
    let status = git
        .synchronise(config, request, &[archive_path.as_path(), helper.path()])
        .await;

    if config.trust_scope == TrustScope::Global {
        git.untrust_global().await;
    }

    if let Err(e) = helper.remove().await {
        warn!(error = %e, "Failed to remove askpass helper");
        log.warning(format!("Failed to remove credential helper: {e}"));
    }
    status
}

/// Runs git steps inside the project root with this request's environment.
struct GitSteps<'a, R: ?Sized> {
    runner: &'a R,
    root: &'a Path,
    env: Vec<(String, String)>,
    log: &'a mut OperationLog,
    failed_steps: &'a mut Vec<String>,
}

impl<'a, R> GitSteps<'a, R>
where
    R: CommandRunner + ?Sized,
{
    async fn run(&mut self, args: &[&str]) -> CommandOutput {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let shown: Vec<String> = args.iter().map(|a| redact_url(a)).collect();
        self.log.push(format!("$ git {}", shown.join(" ")));

        let output = self.runner.run(&args, self.root, &self.env).await;
        self.log.record_output(&output);
        if output.kind == ExitKind::TimedOut {
            warn!(args = %shown.join(" "), "git step timed out");
        }
        output
    }

    /// Like [`Self::run`], recording `step` as failed on an unsuccessful exit.
    async fn git(&mut self, step: &str, args: &[&str]) -> CommandOutput {
        let output = self.run(args).await;
        if !output.success() {
            self.failed_steps.push(step.to_string());
        }
        output
    }

    async fn synchronise(
        &mut self,
        config: &PipelineConfig,
        request: &PublishRequest,
        transient: &[&Path],
    ) -> PublishStatus {
        let root = self.root.to_string_lossy().into_owned();
        let branch = config.branch.as_str();

        // A failed probe only means "not a repository yet".
        let probe = self.run(&["rev-parse", "--show-toplevel"]).await;
        if probe.success() && same_dir(probe.stdout.trim(), self.root).await {
            self.log.push("Using existing git repository.");
        } else {
            self.git("init", &["init"]).await;
        }
        self.exclude_transient(transient).await;

        self.git("rename-branch", &["branch", "-M", branch]).await;

        if let Some(name) = non_empty(&request.user_name) {
            self.git("config-user-name", &["config", "user.name", name]).await;
        }
        if let Some(email) = non_empty(&request.user_email) {
            self.git("config-user-email", &["config", "user.email", email]).await;
        }

        match config.trust_scope {
            TrustScope::Session => {
                self.log.push("Marked project directory as safe for this session.");
            }
            TrustScope::Global => {
                self.git(
                    "trust-directory",
                    &["config", "--global", "--add", "safe.directory", root.as_str()],
                )
                .await;
            }
        }

        self.run(&["remote", "remove", "origin"]).await;
        let repo_url = request.repo_url.trim();
        self.git("add-remote", &["remote", "add", "origin", repo_url]).await;

        self.git("stage", &["add", "-A"]).await;

        let commit = self
            .run(&["commit", "-m", config.commit_message.as_str()])
            .await;
        if !commit.success() {
            if nothing_to_commit(&commit) {
                self.log.push("No changes to commit.");
            } else {
                self.failed_steps.push("commit".to_string());
            }
        }

        self.git("pull", &["pull", "--rebase", "origin", branch]).await;

        let push = self.git("push", &["push", "-u", "origin", branch]).await;
        if push.success() {
            self.log.push(format!("Pushed to origin/{branch}."));
            return PublishStatus::Pushed;
        }

        if !config.force_push_fallback {
            self.log.push("Push failed; forced push fallback is disabled.");
            return PublishStatus::PushFailed;
        }

        self.log.push("Push failed; retrying with --force.");
        let forced = self
            .git("force-push", &["push", "-u", "origin", branch, "--force"])
            .await;
        if forced.success() {
            self.log.push(format!("Force-pushed to origin/{branch}."));
            PublishStatus::ForcePushed
        } else {
            PublishStatus::PushFailed
        }
    }

    async fn untrust_global(&mut self) {
        let root = self.root.to_string_lossy().into_owned();
        self.git(
            "untrust-directory",
            &[
                "config",
                "--global",
                "--fixed-value",
                "--unset-all",
                "safe.directory",
                root.as_str(),
            ],
        )
        .await;
    }

    /// Keeps session artefacts that sit inside the project root out of the commit.
    async fn exclude_transient(&mut self, paths: &[&Path]) {
        let info_dir = self.root.join(".git").join("info");
        let entries: Vec<String> = paths
            .iter()
            .filter_map(|p| p.strip_prefix(self.root).ok())
            .map(|rel| format!("/{}\n", rel.to_string_lossy()))
            .collect();
        let has_git_dir = tokio::fs::metadata(self.root.join(".git"))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if entries.is_empty() || !has_git_dir {
            return;
        }

        let result = async {
            tokio::fs::create_dir_all(&info_dir).await?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(info_dir.join("exclude"))
                .await?;
            for entry in &entries {
                file.write_all(entry.as_bytes()).await?;
            }
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!(error = %e, "Failed to update .git/info/exclude");
            self.log
                .warning(format!("Failed to exclude upload artefacts from the commit: {e}"));
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn nothing_to_commit(output: &CommandOutput) -> bool {
    output.kind == ExitKind::Exited
        && (output.stdout.contains("nothing to commit") || output.stderr.contains("nothing to commit"))
}

async fn same_dir(reported: &str, root: &Path) -> bool {
    let reported = PathBuf::from(reported);
    match (
        tokio::fs::canonicalize(&reported).await,
        tokio::fs::canonicalize(root).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => reported == root,
    }
}

/// Hides any `user:password@` part of a URL before it is logged. Anything
/// that does not parse as a URL is returned unchanged.
pub fn redact_url(value: &str) -> String {
    match Url::parse(value) {
        Ok(mut url) if !url.username().is_empty() || url.password().is_some() => {
            if url.set_password(None).is_err() || url.set_username("***").is_err() {
                return value.to_string();
            }
            url.to_string()
        }
        _ => value.to_string(),
    }
}
