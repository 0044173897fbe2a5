//! Protected file writes
//!
//! Artifacts are staged as the current user with mode 0600, moved into place
//! with elevated privileges and then chmod'ed again, so the final file is
//! never group or world readable whatever the destination directory's umask.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::command::{run_checked, CommandRunner, CommandSpec};
use crate::error::{L2tpError, L2tpResult};
use super::artifacts::ConfigArtifact;

/// File operations that may need root
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrivilegedWriter: Send + Sync {
    /// Create `path` with `mode` and write `content` as the current user
    async fn write(&self, path: &Path, content: &str, mode: u32) -> L2tpResult<()>;

    /// Create a directory and its parents
    async fn create_dir_all(&self, path: &Path) -> L2tpResult<()>;

    /// Move `from` to `to`, replacing `to`
    async fn move_file(&self, from: &Path, to: &Path) -> L2tpResult<()>;

    /// Force the permission bits of `path`
    async fn set_mode(&self, path: &Path, mode: u32) -> L2tpResult<()>;

    /// Point `link` at `target`, replacing `link`
    async fn symlink(&self, target: &Path, link: &Path) -> L2tpResult<()>;

    /// Remove a file if it exists
    async fn remove(&self, path: &Path) -> L2tpResult<()>;
}

/// Create a file with `mode` from the start, so it is never briefly readable
async fn write_new_file(path: &Path, content: &str, mode: u32) -> L2tpResult<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .await?;

    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Writer that shells out to `mkdir`, `mv`, `chmod` and `ln` under sudo
pub struct ElevatedWriter {
    runner: Arc<dyn CommandRunner>,
    sudo: bool,
}

impl ElevatedWriter {
    pub fn new(runner: Arc<dyn CommandRunner>, sudo: bool) -> Self {
        Self { runner, sudo }
    }

    async fn run(&self, program: &str, args: Vec<String>) -> L2tpResult<()> {
        let cmd = CommandSpec::new(program).args(args).privileged(self.sudo);
        run_checked(self.runner.as_ref(), cmd).await?;
        Ok(())
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[async_trait]
impl PrivilegedWriter for ElevatedWriter {
    async fn write(&self, path: &Path, content: &str, mode: u32) -> L2tpResult<()> {
        write_new_file(path, content, mode).await
    }

    async fn create_dir_all(&self, path: &Path) -> L2tpResult<()> {
        self.run("mkdir", vec!["-p".to_string(), path_arg(path)]).await
    }

    async fn move_file(&self, from: &Path, to: &Path) -> L2tpResult<()> {
        self.run("mv", vec!["-f".to_string(), path_arg(from), path_arg(to)]).await
    }

    async fn set_mode(&self, path: &Path, mode: u32) -> L2tpResult<()> {
        self.run("chmod", vec![format!("{:o}", mode), path_arg(path)]).await
    }

    async fn symlink(&self, target: &Path, link: &Path) -> L2tpResult<()> {
        self.run("ln", vec!["-sf".to_string(), path_arg(target), path_arg(link)]).await
    }

    async fn remove(&self, path: &Path) -> L2tpResult<()> {
        self.run("rm", vec!["-f".to_string(), path_arg(path)]).await
    }
}

/// Writer for paths the current user owns (used by `render`)
#[derive(Debug, Default, Clone)]
pub struct LocalWriter;

impl LocalWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PrivilegedWriter for LocalWriter {
    async fn write(&self, path: &Path, content: &str, mode: u32) -> L2tpResult<()> {
        write_new_file(path, content, mode).await
    }

    async fn create_dir_all(&self, path: &Path) -> L2tpResult<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn move_file(&self, from: &Path, to: &Path) -> L2tpResult<()> {
        tokio::fs::rename(from, to).await?;
        Ok(())
    }

    async fn set_mode(&self, path: &Path, mode: u32) -> L2tpResult<()> {
        use std::os::unix::fs::PermissionsExt;

        let perms = std::fs::Permissions::from_mode(mode);
        tokio::fs::set_permissions(path, perms).await?;
        Ok(())
    }

    async fn symlink(&self, target: &Path, link: &Path) -> L2tpResult<()> {
        match tokio::fs::remove_file(link).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::symlink(target, link).await?;
        Ok(())
    }

    async fn remove(&self, path: &Path) -> L2tpResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes artifacts to their final, protected location
pub struct SecretFileWriter {
    writer: Arc<dyn PrivilegedWriter>,
    staging_dir: PathBuf,
}

impl SecretFileWriter {
    pub fn new(writer: Arc<dyn PrivilegedWriter>, staging_dir: PathBuf) -> Self {
        Self { writer, staging_dir }
    }

    /// Stage, move into place, then force the mode
    ///
    /// Any failure is fatal and reported against the artifact's final path.
    pub async fn write_protected(&self, artifact: &ConfigArtifact) -> L2tpResult<()> {
        let fail = |e: L2tpError| L2tpError::WriteFailed {
            path: artifact.path.clone(),
            reason: e.to_string(),
        };

        let parent = artifact.path.parent().ok_or_else(|| L2tpError::WriteFailed {
            path: artifact.path.clone(),
            reason: "path has no parent directory".to_string(),
        })?;

        let file_name = artifact
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());
        let staged = self
            .staging_dir
            .join(format!(".l2tpctl-{}-{}", uuid::Uuid::new_v4(), file_name));

        self.writer
            .write(&staged, &artifact.content, artifact.mode)
            .await
            .map_err(fail)?;

        if let Err(e) = self.place(&staged, parent, artifact).await {
            if let Err(cleanup) = self.writer.remove(&staged).await {
                warn!("Failed to remove staged file {:?}: {}", staged, cleanup);
            }
            return Err(fail(e));
        }

        debug!("Wrote {:?} ({:?}, mode {:o})", artifact.path, artifact.kind, artifact.mode);
        Ok(())
    }

    async fn place(&self, staged: &Path, parent: &Path, artifact: &ConfigArtifact) -> L2tpResult<()> {
        self.writer.create_dir_all(parent).await?;
        self.writer.move_file(staged, &artifact.path).await?;
        self.writer.set_mode(&artifact.path, artifact.mode).await
    }

    /// Write every artifact, stopping at the first failure
    pub async fn write_all(&self, artifacts: &[ConfigArtifact]) -> L2tpResult<()> {
        for artifact in artifacts {
            self.write_protected(artifact).await?;
        }
        info!("Wrote {} configuration files", artifacts.len());
        Ok(())
    }

    /// Best-effort symlink; failure comes back as a recoverable error
    pub async fn symlink_protected(&self, target: &Path, link: &Path) -> L2tpResult<()> {
        self.writer
            .symlink(target, link)
            .await
            .map_err(|e| L2tpError::ResolverLink {
                target: target.to_path_buf(),
                link: link.to_path_buf(),
                reason: e.to_string(),
            })?;

        info!("Linked {:?} -> {:?}", link, target);
        Ok(())
    }
}
