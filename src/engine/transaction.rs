//! Scoped replace-with-rollback for a package's primary artifact.
//!
//! Updates never modify an artifact in place: the existing directory or
//! file is moved to a `.backup` sibling, the replacement is attempted,
//! and the backup is then either deleted (`commit`) or moved back
//! (`restore`). A stale backup left by a previous failed attempt is
//! purged before the move so the naming scheme stays unambiguous —
//! which is also why concurrent operations on the same package name are
//! not supported.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::util::fsops;

#[derive(Debug)]
pub struct ArtifactBackup {
    original: PathBuf,
    backup: Option<PathBuf>,
}

impl ArtifactBackup {
    /// Move `artifact` aside to `<artifact><suffix>`. When the artifact
    /// does not exist (fresh install during an update), no backup is
    /// taken and both `commit` and `restore` are no-ops.
    pub fn take(artifact: &Path, suffix: &str) -> Result<Self> {
        if !artifact.exists() {
            return Ok(Self {
                original: artifact.to_path_buf(),
                backup: None,
            });
        }

        let mut backup_name = artifact.as_os_str().to_os_string();
        backup_name.push(suffix);
        let backup = PathBuf::from(backup_name);

        if backup.exists() {
            if backup.is_dir() {
                fsops::remove_dir_all_robust(&backup)?;
            } else {
                fsops::remove_file_if_exists(&backup)?;
            }
        }

        std::fs::rename(artifact, &backup)?;
        Ok(Self {
            original: artifact.to_path_buf(),
            backup: Some(backup),
        })
    }

    /// The replacement succeeded: delete the backup. Failures here are
    /// logged, not fatal — the new artifact is already in place and a
    /// leftover backup is purged by the next update attempt.
    pub fn commit(mut self) {
        if let Some(backup) = self.backup.take() {
            let result = if backup.is_dir() {
                fsops::remove_dir_all_robust(&backup)
            } else {
                fsops::remove_file_if_exists(&backup)
            };
            if let Err(e) = result {
                warn!("could not delete backup {}: {}", backup.display(), e);
            }
        }
    }

    /// The replacement failed: remove whatever was half-installed and
    /// move the backup to its original location.
    pub fn restore(mut self) -> Result<()> {
        if let Some(backup) = self.backup.take() {
            if self.original.exists() {
                if self.original.is_dir() {
                    fsops::remove_dir_all_robust(&self.original)?;
                } else {
                    fsops::remove_file_if_exists(&self.original)?;
                }
            }
            std::fs::rename(&backup, &self.original)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_discards_backup() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("Foo");
        std::fs::create_dir_all(&artifact).unwrap();
        std::fs::write(artifact.join("Foo.lua"), b"old").unwrap();

        let backup = ArtifactBackup::take(&artifact, ".backup").unwrap();
        assert!(!artifact.exists());
        std::fs::create_dir_all(&artifact).unwrap();
        std::fs::write(artifact.join("Foo.lua"), b"new").unwrap();
        backup.commit();

        assert!(!dir.path().join("Foo.backup").exists());
        assert_eq!(std::fs::read(artifact.join("Foo.lua")).unwrap(), b"new");
    }

    #[test]
    fn restore_brings_back_original() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("Foo.dll");
        std::fs::write(&artifact, b"old").unwrap();

        let backup = ArtifactBackup::take(&artifact, ".backup").unwrap();
        std::fs::write(&artifact, b"broken").unwrap();
        backup.restore().unwrap();

        assert_eq!(std::fs::read(&artifact).unwrap(), b"old");
        assert!(!dir.path().join("Foo.dll.backup").exists());
    }

    #[test]
    fn stale_backup_is_purged_before_move() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("Foo");
        std::fs::create_dir_all(&artifact).unwrap();
        std::fs::write(artifact.join("Foo.lua"), b"current").unwrap();
        let stale = dir.path().join("Foo.backup");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("Foo.lua"), b"stale").unwrap();

        let backup = ArtifactBackup::take(&artifact, ".backup").unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("Foo.backup/Foo.lua")).unwrap(),
            b"current"
        );
        backup.restore().unwrap();
        assert_eq!(std::fs::read(artifact.join("Foo.lua")).unwrap(), b"current");
    }

    #[test]
    fn missing_artifact_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("Absent");
        let backup = ArtifactBackup::take(&artifact, ".backup").unwrap();
        backup.restore().unwrap();
        assert!(!artifact.exists());
    }
}
