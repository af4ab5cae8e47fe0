//! Request-scoped working directories.
//!
//! Every conversion gets its own directory under the configured root. The
//! directory is removed when the workspace is closed or dropped, so a
//! failed request never leaves files behind for the next one.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

const FALLBACK_FILE_NAME: &str = "input.bin";

pub struct RequestWorkspace {
    dir: TempDir,
    request_id: Uuid,
}

impl RequestWorkspace {
    /// Create a fresh directory under `root`, named after `label` and a
    /// random request id.
    pub fn create(root: &Path, label: &str) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create work root {:?}", root))?;

        let request_id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}_{}_", label, request_id.simple()))
            .tempdir_in(root)
            .context("Failed to create request workspace")?;

        debug!("Created workspace {:?}", dir.path());
        Ok(Self { dir, request_id })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Path for a user-supplied file name inside the workspace.
    ///
    /// Only the final path component is kept, so names like `../x` can
    /// never escape the directory.
    pub fn file_path(&self, name: &str) -> PathBuf {
        let file_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(FALLBACK_FILE_NAME);
        self.dir.path().join(file_name)
    }

    /// Remove the directory now and report failures.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Cleaned up workspace {:?}", path),
            Err(e) => warn!("Failed to clean up workspace {:?}: {}", path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_workspace_created_under_root() {
        let root = TempDir::new().unwrap();
        let workspace = RequestWorkspace::create(root.path(), "user_1_2").unwrap();

        assert!(workspace.path().starts_with(root.path()));
        assert!(workspace.path().is_dir());
        let name = workspace.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("user_1_2_"));
    }

    #[test]
    fn test_missing_root_is_created() {
        let root = TempDir::new().unwrap();
        let nested = root.path().join("a").join("b");
        let workspace = RequestWorkspace::create(&nested, "req").unwrap();
        assert!(workspace.path().starts_with(&nested));
    }

    #[test]
    fn test_file_path_strips_directories() {
        let root = TempDir::new().unwrap();
        let workspace = RequestWorkspace::create(root.path(), "req").unwrap();

        assert_eq!(
            workspace.file_path("../../etc/passwd"),
            workspace.path().join("passwd")
        );
        assert_eq!(workspace.file_path("clip.mp4"), workspace.path().join("clip.mp4"));
        assert_eq!(workspace.file_path(".."), workspace.path().join(FALLBACK_FILE_NAME));
        assert_eq!(workspace.file_path(""), workspace.path().join(FALLBACK_FILE_NAME));
    }

    #[test]
    fn test_close_removes_directory() {
        let root = TempDir::new().unwrap();
        let workspace = RequestWorkspace::create(root.path(), "req").unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::write(workspace.file_path("video.mp4"), b"data").unwrap();

        workspace.close();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = TempDir::new().unwrap();
        let path = {
            let workspace = RequestWorkspace::create(root.path(), "req").unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let root = TempDir::new().unwrap();
        let a = RequestWorkspace::create(root.path(), "req").unwrap();
        let b = RequestWorkspace::create(root.path(), "req").unwrap();
        assert_ne!(a.request_id(), b.request_id());
        assert_ne!(a.path(), b.path());
    }
}
