//! Per-execution workspaces.
//!
//! A workspace is a transient directory holding one execution's input
//! files. It is world-inaccessible, never nested inside another workspace,
//! and removed on every exit path: `cleanup` deletes it explicitly and
//! logs failures, and the drop guard catches panics and cancellations.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// A transient on-disk directory unique to one execution.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh workspace under `root` with mode 0700.
    ///
    /// The name carries enough entropy that two concurrent executions can
    /// never collide.
    #[instrument]
    pub async fn create(root: &Path) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;

        let dir = tempfile::Builder::new()
            .prefix("runcell-")
            .tempdir_in(root)?;
        let path = dir.path().to_path_buf();

        // World-inaccessible regardless of the process umask.
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700)).await?;

        debug!(path = %path.display(), "created workspace");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// Get the workspace root on the host.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a submitted file into the workspace, creating intermediate
    /// directories, and return its absolute path.
    ///
    /// The name has already passed request validation; this is the second
    /// line of defense, rejecting any path that would land outside the
    /// workspace root.
    #[instrument(skip(self, content))]
    pub async fn write_file(
        &self,
        name: &str,
        content: &[u8],
        executable: bool,
    ) -> std::io::Result<PathBuf> {
        let path = contained_join(&self.path, name).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("path escapes workspace: {name:?}"),
            )
        })?;

        if let Some(parent) = path.parent()
            && parent != self.path
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        // O_CREAT|O_EXCL: names are unique within a request, so an
        // existing file means something else owns this path.
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(content).await?;
        drop(file);

        let mode = if executable { 0o700 } else { 0o600 };
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).await?;

        debug!(path = %path.display(), len = content.len(), "wrote file to workspace");
        Ok(path)
    }

    /// Delete the workspace, logging (not raising) failures.
    ///
    /// Deletion failures never fail a request that already produced a
    /// result; the drop guard keeps the directory from leaking if this is
    /// skipped.
    #[instrument(skip(self))]
    pub async fn cleanup(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.keep();
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                warn!(path = %path.display(), error = %e, "failed to delete workspace");
            } else {
                debug!(path = %path.display(), "deleted workspace");
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // TempDir's drop removes the tree best-effort on panic/cancel paths.
        if self.dir.is_some() {
            debug!(path = %self.path.display(), "workspace dropped without explicit cleanup");
        }
    }
}

/// Join `name` onto `root`, refusing absolute paths and any non-normal
/// component.
fn contained_join(root: &Path, name: &str) -> Option<PathBuf> {
    use std::path::Component;

    let relative = Path::new(name);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    if relative.components().next().is_none() {
        return None;
    }
    Some(root.join(relative))
}
