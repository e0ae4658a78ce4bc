use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::NamedTempFile;

fn archive_file() -> NamedTempFile {
    let file = NamedTempFile::new().expect("Creating temp archive failed");
    write(file.path(), b"not really a zip").expect("Writing temp archive failed");
    file
}

#[test]
fn help_lists_both_commands() {
    let mut cmd = Command::cargo_bin("zip-push").expect("Binary exists");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve").and(predicate::str::contains("publish")));
}

#[test]
fn publish_without_token_prints_the_error_line_and_fails() {
    let archive = archive_file();
    let mut cmd = Command::cargo_bin("zip-push").expect("Binary exists");

    cmd.arg("publish")
        .arg("--zip")
        .arg(archive.path())
        .arg("--repo")
        .arg("https://example.com/user/repo.git")
        .env_remove("ZIP_PUSH_TOKEN");

    cmd.assert()
        .failure()
        .stdout(predicate::str::contains(
            "ERROR: Personal Access Token is required.",
        ));
}

#[test]
fn publish_with_plain_http_url_is_rejected() {
    let archive = archive_file();
    let mut cmd = Command::cargo_bin("zip-push").expect("Binary exists");

    cmd.arg("publish")
        .arg("--zip")
        .arg(archive.path())
        .arg("--repo")
        .arg("http://example.com/user/repo.git")
        .env("ZIP_PUSH_TOKEN", "token");

    cmd.assert().failure().stdout(predicate::str::contains(
        "ERROR: Repository URL must start with https://",
    ));
}

#[test]
fn publish_with_missing_archive_file_fails() {
    let mut cmd = Command::cargo_bin("zip-push").expect("Binary exists");

    cmd.arg("publish")
        .arg("--zip")
        .arg("./does/not/exist.zip")
        .arg("--repo")
        .arg("https://example.com/user/repo.git")
        .env("ZIP_PUSH_TOKEN", "token");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("failed to read archive"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use zip_push::cli::{run, Cli, Commands};

    // The archive does not exist, so the command fails right after startup.
    let cli = Cli {
        command: Commands::Publish {
            zip: std::path::PathBuf::from("dummy.zip"),
            repo: "https://example.com/user/repo.git".to_string(),
            user: None,
            email: None,
            token: String::new(),
            config: None,
            force_push_fallback: false,
        },
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
