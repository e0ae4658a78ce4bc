//! Typed failures of the pipeline stages that abort a run.
//!
//! Git failures are not represented here: they never abort the pipeline and
//! travel as [`crate::contract::CommandOutput`] values instead.

use thiserror::Error;

/// Input rejected before any git work. The `Display` text is the log line
/// (without the `ERROR: ` prefix).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No ZIP file uploaded.")]
    MissingArchive,

    #[error("Repository URL must start with https://")]
    InsecureUrl,

    #[error("Personal Access Token is required.")]
    MissingToken,

    #[error("ZIP file is too large ({size} bytes, limit {limit} bytes).")]
    ArchiveTooLarge { size: u64, limit: u64 },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry name is absolute or climbs out of the extraction directory.
    #[error("entry {0:?} has an unsafe path")]
    UnsafePath(String),

    #[error("extraction task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to create session directory: {0}")]
    Create(#[source] std::io::Error),

    #[error("failed to save uploaded archive: {0}")]
    Persist(#[source] std::io::Error),

    #[error("failed to prepare credential helper: {0}")]
    Credentials(#[source] std::io::Error),
}
