//! Per-request session directory.
//!
//! Every request gets `<work_root>/<uuid>`; the uploaded archive and its
//! extracted contents live there. The directory is removed by [`UploadSession::close`]
//! on normal paths and by `Drop` on any other path, so it never outlives the request.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::error::SessionError;
use crate::log::OperationLog;

const FALLBACK_ARCHIVE_NAME: &str = "upload.zip";

#[derive(Debug)]
pub struct UploadSession {
    dir: PathBuf,
    archive_name: Option<String>,
    archive_size: u64,
    removed: bool,
}

impl UploadSession {
    /// Creates a fresh, uniquely named directory under `work_root` (owner-only on unix).
    #[instrument(fields(work_root = %work_root.display()))]
    pub async fn create(work_root: &Path) -> Result<Self, SessionError> {
        tokio::fs::create_dir_all(work_root)
            .await
            .map_err(SessionError::Create)?;

        let dir = work_root.join(uuid::Uuid::new_v4().to_string());
        let mut builder = tokio::fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(&dir).await.map_err(SessionError::Create)?;

        // Git reports canonical paths; keep ours comparable.
        let dir = tokio::fs::canonicalize(&dir)
            .await
            .map_err(SessionError::Create)?;
        info!(session_dir = %dir.display(), "Created upload session");

        Ok(Self {
            dir,
            archive_name: None,
            archive_size: 0,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn archive_name(&self) -> Option<&str> {
        self.archive_name.as_deref()
    }

    pub fn archive_path(&self) -> Option<PathBuf> {
        self.archive_name.as_ref().map(|name| self.dir.join(name))
    }

    pub fn archive_size(&self) -> u64 {
        self.archive_size
    }

    /// Writes the upload unmodified into the session directory and records
    /// its on-disk size.
    pub async fn persist_archive(
        &mut self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, SessionError> {
        let name = sanitize_file_name(file_name);
        let path = self.dir.join(&name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(SessionError::Persist)?;
        let size = tokio::fs::metadata(&path)
            .await
            .map_err(SessionError::Persist)?
            .len();

        debug!(path = %path.display(), size, "Persisted uploaded archive");
        self.archive_name = Some(name);
        self.archive_size = size;
        Ok(path)
    }

    /// Removes the session directory, reporting a failure as a warning line.
    pub async fn close(mut self, log: &mut OperationLog) {
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(session_dir = %self.dir.display(), "Removed upload session"),
            Err(e) => {
                warn!(error = %e, session_dir = %self.dir.display(), "Failed to remove upload session");
                log.warning(format!("Failed to clean up temporary directory: {e}"));
            }
        }
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, session_dir = %self.dir.display(), "Failed to remove upload session on drop");
            }
        }
    }
}

/// Keeps only the last path component of a client-supplied file name.
fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        FALLBACK_ARCHIVE_NAME.to_string()
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_reduced_to_their_base_name() {
        assert_eq!(sanitize_file_name("project.zip"), "project.zip");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\site.zip"), "site.zip");
        assert_eq!(sanitize_file_name(".."), "upload.zip");
        assert_eq!(sanitize_file_name("dir/"), "upload.zip");
    }

    #[tokio::test]
    async fn sessions_are_unique_and_removed_on_close() {
        let root = tempfile::tempdir().unwrap();
        let a = UploadSession::create(root.path()).await.unwrap();
        let b = UploadSession::create(root.path()).await.unwrap();
        assert_ne!(a.path(), b.path());

        let a_path = a.path().to_path_buf();
        let mut log = OperationLog::new();
        a.close(&mut log).await;
        assert!(!a_path.exists());
        assert!(log.is_empty());

        let b_path = b.path().to_path_buf();
        drop(b);
        assert!(!b_path.exists());
    }

    #[tokio::test]
    async fn persisted_archive_size_is_recorded() {
        let root = tempfile::tempdir().unwrap();
        let mut session = UploadSession::create(root.path()).await.unwrap();
        let path = session
            .persist_archive("nested/site.zip", b"0123456789")
            .await
            .unwrap();
        assert_eq!(path, session.path().join("site.zip"));
        assert_eq!(session.archive_name(), Some("site.zip"));
        assert_eq!(session.archive_size(), 10);
    }
}
