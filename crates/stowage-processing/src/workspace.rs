//! Per-invocation scratch directory
//!
//! A `Workspace` owns a uniquely named temporary directory. It is removed
//! when the workspace is dropped, which covers early returns, errors and a
//! cancelled pipeline future alike. Creating and closing run on the blocking
//! pool; only the drop path removes the directory inline.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use stowage_core::FileDescriptor;
use tempfile::TempDir;

use crate::error::{ProcessingError, ProcessingResult};

const HASH_PREFIX_LEN: usize = 12;

#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a workspace for `descriptor` under `root`, or the system
    /// temporary directory.
    ///
    /// The directory name is `stowage-<hash>-<random>`: the hash ties it to the
    /// object for debugging, the random suffix keeps concurrent invocations on
    /// the same object apart.
    pub async fn create(
        descriptor: &FileDescriptor,
        root: Option<&Path>,
    ) -> ProcessingResult<Self> {
        let prefix = format!("stowage-{}-", Self::identity_hash(descriptor));
        let root = root.map(Path::to_path_buf);

        let dir = tokio::task::spawn_blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix(&prefix);

            match root {
                Some(root) => {
                    std::fs::create_dir_all(&root)?;
                    builder.tempdir_in(root)
                }
                None => builder.tempdir(),
            }
        })
        .await
        .map_err(|e| ProcessingError::Workspace(std::io::Error::other(e)))?
        .map_err(ProcessingError::Workspace)?;

        tracing::debug!(
            workspace = %dir.path().display(),
            file = %descriptor.identity(),
            "Workspace created"
        );

        Ok(Self { dir })
    }

    fn identity_hash(descriptor: &FileDescriptor) -> String {
        let digest = Sha256::digest(descriptor.identity().as_bytes());
        let mut hash = hex::encode(digest);
        hash.truncate(HASH_PREFIX_LEN);
        hash
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the workspace
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Where the source object is staged: `source.<ext>`, or `source`
    /// without an extension
    pub fn source_path(&self, descriptor: &FileDescriptor) -> PathBuf {
        match descriptor.extension() {
            Some(ext) => self.file(&format!("source.{}", ext)),
            None => self.file("source"),
        }
    }

    /// Remove the directory now, reporting failures instead of ignoring them
    pub async fn close(self) -> ProcessingResult<()> {
        let path = self.dir.path().to_path_buf();
        let dir = self.dir;
        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|e| ProcessingError::Io(std::io::Error::other(e)))??;
        tracing::debug!(workspace = %path.display(), "Workspace removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_name_and_cleanup_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let file = FileDescriptor::new("media", "photos/cat.JPG");

        let workspace = Workspace::create(&file, Some(root.path())).await.unwrap();
        let path = workspace.path().to_path_buf();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();

        assert!(name.starts_with(&format!("stowage-{}-", Workspace::identity_hash(&file))));
        assert_eq!(Workspace::identity_hash(&file).len(), 12);
        assert_eq!(workspace.source_path(&file), path.join("source.jpg"));
        assert!(path.is_dir());

        std::fs::write(workspace.file("frame.png"), b"x").unwrap();
        drop(workspace);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_concurrent_workspaces_do_not_collide() {
        let root = tempfile::tempdir().unwrap();
        let file = FileDescriptor::new("media", "same.png");

        let (a, b) = tokio::join!(
            Workspace::create(&file, Some(root.path())),
            Workspace::create(&file, Some(root.path()))
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_close_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let file = FileDescriptor::new("media", "noext");

        let nested = root.path().join("nested");
        let workspace = Workspace::create(&file, Some(&nested)).await.unwrap();
        let path = workspace.path().to_path_buf();
        assert_eq!(workspace.source_path(&file), path.join("source"));

        workspace.close().await.unwrap();
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path().join("nested")).unwrap().count(), 0);
    }
}
