//! ZIP extraction and project-root resolution.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use zip::ZipArchive;

use crate::error::ArchiveError;

/// Extracts every entry of `archive` into `dest`, returning the number of files written.
///
/// All entry names are checked before anything is written, so an archive with
/// a single unsafe entry leaves `dest` untouched.
#[instrument(fields(archive = %archive.display(), dest = %dest.display()))]
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(BufReader::new(file))?;

    let mut targets = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| ArchiveError::UnsafePath(entry.name().to_string()))?;
        let target = dest.join(relative);
        if target.as_path() == archive {
            return Err(ArchiveError::UnsafePath(entry.name().to_string()));
        }
        targets.push(target);
    }

    let mut written = 0;
    for (i, target) in targets.iter().enumerate() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            fs::create_dir_all(target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(target)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                // Keep files readable and writable by us whatever the archive says.
                fs::set_permissions(target, fs::Permissions::from_mode((mode & 0o777) | 0o600))?;
            }
        }
        written += 1;
    }

    debug!(entries = zip.len(), files = written, "Extracted archive");
    Ok(written)
}

/// Runs [`extract_zip`] on the blocking pool.
pub async fn extract(archive: PathBuf, dest: PathBuf) -> Result<usize, ArchiveError> {
    tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

/// Runs [`resolve_project_root`] on the blocking pool.
pub async fn project_root(session_dir: PathBuf, archive: PathBuf) -> io::Result<PathBuf> {
    tokio::task::spawn_blocking(move || resolve_project_root(&session_dir, &archive))
        .await
        .map_err(io::Error::other)?
}

/// Picks the directory to publish.
///
/// Ignoring the uploaded archive itself, a session holding exactly one entry
/// that is a directory is unwrapped to that directory. Only one level is
/// unwrapped; anything else publishes the session directory as-is.
pub fn resolve_project_root(session_dir: &Path, archive: &Path) -> io::Result<PathBuf> {
    let archive_name = archive.file_name();
    let mut entries = Vec::new();
    for entry in fs::read_dir(session_dir)? {
        let entry = entry?;
        if Some(entry.file_name().as_os_str()) == archive_name {
            continue;
        }
        entries.push(entry);
    }

    if let [only] = entries.as_slice() {
        if only.file_type()?.is_dir() {
            return Ok(only.path());
        }
    }
    Ok(session_dir.to_path_buf())
}
