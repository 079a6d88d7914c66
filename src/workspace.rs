use crate::utils::{is_plain_file_name, lossy};

use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs as async_fs;
use tokio::task;
use tracing::{debug, trace, warn};

const NAME_PREFIX: &str = "tortoise-";
const CREATE_ATTEMPTS: usize = 8;

/// A uniquely named directory owned by exactly one submission.
///
/// The directory is removed when the workspace is dropped, so every exit
/// path of the owning submission cleans it up exactly once.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("failed to create workspace root: {}", root.display()))?;

        for _ in 0..CREATE_ATTEMPTS {
            let suffix: u64 = rand::random();
            let path = root.join(format!("{}{:016x}", NAME_PREFIX, suffix));

            match fs::create_dir(&path) {
                Ok(()) => {
                    let workspace = Self { path };
                    // the sandbox user is unprivileged and must be able to write artifacts
                    fs::set_permissions(&workspace.path, Permissions::from_mode(0o777))
                        .with_context(|| {
                            format!("failed to chmod workspace: {}", workspace.path.display())
                        })?;
                    debug!(path = ?workspace.path, "created workspace");
                    return Ok(workspace);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("failed to create workspace: {}", path.display())
                    })
                }
            }
        }

        anyhow::bail!(
            "failed to find a free workspace name under {}",
            root.display()
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&self, name: &str) -> Result<PathBuf> {
        if !is_plain_file_name(Path::new(name)) {
            anyhow::bail!("invalid workspace file name: {:?}", name);
        }
        Ok(self.path.join(name))
    }

    pub async fn write(&self, name: &str, content: impl AsRef<[u8]>) -> Result<()> {
        let path = self.file(name)?;
        trace!(?path, "write workspace file");
        async_fs::write(&path, content)
            .await
            .with_context(|| format!("failed to write file: {}", path.display()))
    }

    pub async fn populate<I, N, B>(&self, files: I) -> Result<()>
    where
        I: IntoIterator<Item = (N, B)>,
        N: AsRef<str>,
        B: AsRef<[u8]>,
    {
        for (name, content) in files {
            self.write(name.as_ref(), content).await?;
        }
        Ok(())
    }

    /// Reads a file as text. A missing or unreadable file is `None`.
    pub async fn read_lossy(&self, name: &str) -> Option<String> {
        let path = self.file(name).ok()?;
        match async_fs::read(&path).await {
            Ok(bytes) => Some(lossy(bytes)),
            Err(err) => {
                trace!(?path, %err, "workspace file unreadable");
                None
            }
        }
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let path = self.file(name)?;
        match async_fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove file: {}", path.display()))
            }
        }
    }

    /// Names of the directories directly below the workspace, sorted.
    ///
    /// Only sandboxed programs create directories here.
    pub async fn subdirs(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = match async_fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = ?self.path, %err, "failed to list workspace");
                return names;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_dir = entry.file_type().await.map_or(false, |t| t.is_dir());
            if is_dir {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        names
    }

    pub fn dispose(self) {
        drop(self)
    }

    /// Same as [`Workspace::dispose`] without blocking the async worker.
    pub async fn close(self) {
        if let Err(err) = task::spawn_blocking(move || drop(self)).await {
            warn!(%err, "workspace disposal task failed");
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = ?self.path, "disposed workspace"),
            Err(err) => warn!(path = ?self.path, %err, "failed to dispose workspace"),
        }
    }
}
