//! Filesystem helpers shared by the engines.
//!
//! Cleanup helpers return `Result` so callers can log what failed;
//! best-effort behavior is the caller's decision, not a silent default
//! inside these functions.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{LoadoutError, Result};

/// Relative path with forward slashes, the form used in ownership
/// ledgers and tracker records on every platform.
pub fn rel_display(path: &Path, base: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// All files under `root` as `/`-separated paths relative to `base`.
pub fn collect_files(root: &Path, base: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| LoadoutError::IoError(std::io::Error::other(e)))?;
        if entry.file_type().is_file() {
            files.push(rel_display(entry.path(), base));
        }
    }
    Ok(files)
}

/// Recursive directory copy. Fails when `dest` already exists, matching
/// the install engine's never-silently-overwrite rule.
pub fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        return Err(LoadoutError::InstallError(format!(
            "destination already exists: {}",
            dest.display()
        )));
    }
    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| LoadoutError::IoError(std::io::Error::other(e)))?;
        let rel = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| {
                LoadoutError::InstallError(format!(
                    "failed to copy {} to {}: {}",
                    entry.path().display(),
                    target.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

/// Copy the files of `source` into `dest`, creating parents and
/// overwriting individual files, without replacing `dest` wholesale.
/// Returns the copied files as `/`-separated paths relative to `base`.
pub fn merge_dir_into(source: &Path, dest: &Path, base: &Path) -> Result<Vec<String>> {
    let mut copied = Vec::new();
    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| LoadoutError::IoError(std::io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(entry.path(), &target)?;
        copied.push(rel_display(&target, base));
    }
    Ok(copied)
}

#[cfg(unix)]
fn clear_readonly(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    for entry in WalkDir::new(path).into_iter().flatten() {
        let _ = std::fs::set_permissions(entry.path(), std::fs::Permissions::from_mode(0o755));
    }
}

#[cfg(windows)]
fn clear_readonly(path: &Path) {
    for entry in WalkDir::new(path).into_iter().flatten() {
        if let Ok(metadata) = entry.metadata() {
            let mut perms = metadata.permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            let _ = std::fs::set_permissions(entry.path(), perms);
        }
    }
}

/// Remove a directory tree, riding out locked or read-only files.
///
/// Escalation ladder: plain removal, then clear read-only bits and
/// retry, then (Windows) fall back to the shell's `rmdir /S /Q`, which
/// copes with some open-handle situations `remove_dir_all` does not.
pub fn remove_dir_all_robust(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    match std::fs::remove_dir_all(path) {
        Ok(()) => return Ok(()),
        Err(e) => {
            warn!("removal of {} failed ({}), retrying with permissions reset", path.display(), e);
        }
    }

    clear_readonly(path);
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) => remove_dir_fallback(path, e),
    }
}

#[cfg(windows)]
fn remove_dir_fallback(path: &Path, err: std::io::Error) -> Result<()> {
    warn!("removal of {} failed again ({}), falling back to rmdir", path.display(), err);
    let status = std::process::Command::new("cmd")
        .args(["/c", "rmdir", "/S", "/Q"])
        .arg(path)
        .status()?;
    if status.success() && !path.exists() {
        return Ok(());
    }
    Err(LoadoutError::RemoveError(format!(
        "failed to remove {}",
        path.display()
    )))
}

#[cfg(not(windows))]
fn remove_dir_fallback(path: &Path, err: std::io::Error) -> Result<()> {
    Err(LoadoutError::RemoveError(format!(
        "failed to remove {}: {}",
        path.display(),
        err
    )))
}

pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| {
            LoadoutError::RemoveError(format!("failed to remove {}: {}", path.display(), e))
        })?;
    }
    Ok(())
}

/// Remove now-empty parent directories from `start` upward, stopping at
/// `stop_at` (exclusive). Best-effort by design: a non-empty directory
/// ends the walk without error.
pub fn prune_empty_dirs_upward(start: &Path, stop_at: &Path) {
    let mut current = start.to_path_buf();
    while current != stop_at && current.starts_with(stop_at) && current.exists() {
        if std::fs::remove_dir(&current).is_err() {
            break;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}

/// Move `source` to `dest`, replacing `dest` if present. Falls back to
/// copy+delete when a rename crosses filesystems.
pub fn move_path(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        if dest.is_dir() {
            remove_dir_all_robust(dest)?;
        } else {
            remove_file_if_exists(dest)?;
        }
    }
    if std::fs::rename(source, dest).is_ok() {
        return Ok(());
    }
    if source.is_dir() {
        copy_dir_recursive(source, dest)?;
        remove_dir_all_robust(source)?;
    } else {
        std::fs::copy(source, dest)?;
        remove_file_if_exists(source)?;
    }
    Ok(())
}

/// Non-hidden immediate subdirectories, sorted.
pub fn list_subdirs(path: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(path)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && !p
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with('.'))
                    .unwrap_or(true)
        })
        .collect();
    dirs.sort();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_refuses_existing_destination() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"x").unwrap();
        assert!(copy_dir_recursive(src.path(), dst.path()).is_err());

        let fresh = dst.path().join("fresh");
        copy_dir_recursive(src.path(), &fresh).unwrap();
        assert!(fresh.join("a.txt").is_file());
    }

    #[test]
    fn merge_overwrites_individual_files() {
        let src = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let dest = base.path().join("libs");
        std::fs::create_dir_all(src.path().join("deep")).unwrap();
        std::fs::write(src.path().join("deep/one.lua"), b"new").unwrap();
        std::fs::create_dir_all(dest.join("deep")).unwrap();
        std::fs::write(dest.join("deep/one.lua"), b"old").unwrap();
        std::fs::write(dest.join("keep.lua"), b"keep").unwrap();

        let copied = merge_dir_into(src.path(), &dest, base.path()).unwrap();
        assert_eq!(copied, vec!["libs/deep/one.lua"]);
        assert_eq!(std::fs::read(dest.join("deep/one.lua")).unwrap(), b"new");
        assert!(dest.join("keep.lua").exists());
    }

    #[test]
    fn prune_stops_at_shared_root() {
        let base = tempfile::tempdir().unwrap();
        let libs = base.path().join("libs");
        let deep = libs.join("a/b");
        std::fs::create_dir_all(&deep).unwrap();
        prune_empty_dirs_upward(&deep, &libs);
        assert!(!libs.join("a").exists());
        assert!(libs.exists());
    }

    #[test]
    fn move_path_replaces_directory() {
        let base = tempfile::tempdir().unwrap();
        let src = base.path().join("src");
        let dst = base.path().join("dst");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("f"), b"new").unwrap();
        std::fs::create_dir_all(&dst).unwrap();
        std::fs::write(dst.join("old"), b"old").unwrap();

        move_path(&src, &dst).unwrap();
        assert!(!src.exists());
        assert!(dst.join("f").exists());
        assert!(!dst.join("old").exists());
    }
}
