///
/// This module implements the CLI interface for zip-push: command parsing,
/// the `serve` entrypoint for the web form and a `publish` command that runs
/// the same pipeline on a local archive.
///
/// All pipeline logic (validation, extraction, git orchestration) lives in the
/// [`zip-push-core`] crate. This module is strictly CLI glue.
///
/// ## How To Use
/// - `zip-push serve --config config.yaml`
/// - `ZIP_PUSH_TOKEN=... zip-push publish --zip site.zip --repo https://github.com/me/site.git`
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`zip-push-core`]: ../../zip-push-core/
use crate::load_config::{load_config, CliConfig};
use crate::server::{create_router, AppState};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use zip_push_core::git::GitCli;
use zip_push_core::publish::{publish, ArchiveUpload, PublishRequest};

/// CLI for zip-push: publish ZIP archives to git remotes.
#[derive(Parser)]
#[clap(
    name = "zip-push",
    version,
    about = "Extract an uploaded ZIP archive and push it to a git repository"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the upload form over HTTP
    Serve {
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Listen address, overrides `server.listen`
        #[clap(long)]
        listen: Option<String>,
    },
    /// Publish a local ZIP archive without the web form
    Publish {
        /// Path to the ZIP archive
        #[clap(long)]
        zip: PathBuf,
        /// Remote repository URL (https only)
        #[clap(long)]
        repo: String,
        /// Committer name
        #[clap(long)]
        user: Option<String>,
        /// Committer email
        #[clap(long)]
        email: Option<String>,
        /// Personal access token used for the push
        #[clap(long, env = "ZIP_PUSH_TOKEN", hide_env_values = true, default_value = "")]
        token: String,
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Retry a rejected push with --force (overwrites remote history)
        #[clap(long)]
        force_push_fallback: bool,
    },
}

fn config_or_default(path: Option<PathBuf>) -> Result<CliConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(CliConfig::default()),
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Serve { config, listen } => {
            let config = config_or_default(config)?;
            serve(config, listen).await
        }
        Commands::Publish {
            zip,
            repo,
            user,
            email,
            token,
            config,
            force_push_fallback,
        } => {
            let mut config = config_or_default(config)?;
            config.pipeline.force_push_fallback |= force_push_fallback;

            let bytes = tokio::fs::read(&zip)
                .await
                .with_context(|| format!("failed to read archive {}", zip.display()))?;
            let file_name = zip
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let request = PublishRequest {
                repo_url: repo,
                user_name: user,
                user_email: email,
                token,
                archive: Some(ArchiveUpload {
                    file_name,
                    bytes: bytes.into(),
                }),
            };

            tracing::info!(command = "publish", archive = %zip.display(), "Starting publish");
            let runner = GitCli::from_config(&config.pipeline);
            let report = publish(&config.pipeline, &runner, request).await;
            for line in report.log.lines() {
                println!("{line}");
            }

            if report.is_success() {
                tracing::info!(command = "publish", status = %report.status, "Publish complete");
                Ok(())
            } else {
                tracing::error!(command = "publish", status = %report.status, failed_steps = ?report.failed_steps, "Publish failed");
                Err(anyhow::anyhow!("publish finished with status {}", report.status))
            }
        }
    }
}

async fn serve(config: CliConfig, listen: Option<String>) -> Result<()> {
    let listen = listen.unwrap_or_else(|| config.server.listen.clone());
    let listen_addr: std::net::SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address {listen:?}"))?;

    tokio::fs::create_dir_all(&config.pipeline.work_root)
        .await
        .with_context(|| {
            format!(
                "failed to create work root {}",
                config.pipeline.work_root.display()
            )
        })?;

    let state = AppState {
        runner: Arc::new(GitCli::from_config(&config.pipeline)),
        config: Arc::new(config.pipeline),
    };
    let app = create_router(state, config.server.body_limit_bytes);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;
    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("zip-push shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
