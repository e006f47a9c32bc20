//! Package removal with shared-file reference counting.
//!
//! A package's owned files are whatever its ledger lists — nothing else
//! is touched. Before deleting an owned shared file, every other
//! tracked package's ledger is consulted; the file survives as long as
//! anyone else claims it. Individual file failures are logged and
//! skipped so one locked file cannot wedge the whole removal.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{LoadoutError, Result};
use crate::tracker::{PackageKind, PackageTracker};
use crate::util::fsops;

use super::Manager;

/// Resolve a ledger entry to a file on disk. Entries are root-relative
/// ("docs/Foo/readme.txt"), but older ledgers stored category-relative
/// paths, so fall back to the category root.
fn resolve_owned_path(root: &Path, category_root: &Path, entry: &str) -> Option<PathBuf> {
    let direct = root.join(entry);
    if direct.exists() {
        return Some(direct);
    }
    let fallback = category_root.join(entry);
    if fallback.exists() {
        return Some(fallback);
    }
    None
}

/// Every path claimed by tracked packages other than `(skip_name, skip_kind)`.
fn claims_by_others(
    tracker: &PackageTracker,
    skip_name: &str,
    skip_kind: PackageKind,
    select: impl Fn(&crate::tracker::PackageRecord) -> &Vec<String>,
) -> HashSet<String> {
    let mut claimed = HashSet::new();
    for (kind, map) in [
        (PackageKind::Addon, tracker.addons()),
        (PackageKind::Plugin, tracker.plugins()),
    ] {
        for (name, record) in map {
            if kind == skip_kind && name == skip_name {
                continue;
            }
            claimed.extend(select(record).iter().cloned());
        }
    }
    claimed
}

impl Manager {
    /// Delete a package's primary artifact and the shared files it owns
    /// exclusively, then drop its tracker record.
    pub fn remove_package(&mut self, name: &str, kind: PackageKind) -> Result<String> {
        let root = self.root();
        let record = self
            .tracker()
            .get_package(name, kind)
            .cloned()
            .ok_or_else(|| LoadoutError::PackageNotFound(name.to_string()))?;

        match kind {
            PackageKind::Addon => {
                let target_dir = root.join("addons").join(name);
                if target_dir.exists() {
                    fsops::remove_dir_all_robust(&target_dir)?;
                }

                // Shared libs: addons only, reference-counted.
                let libs_root = root.join("addons/libs");
                let claimed = claims_by_others(self.tracker(), name, kind, |r| &r.lib_files);
                for lib_file in &record.lib_files {
                    if claimed.contains(lib_file) {
                        continue;
                    }
                    let Some(path) = resolve_owned_path(&root, &libs_root, lib_file) else {
                        continue;
                    };
                    match fsops::remove_file_if_exists(&path) {
                        Ok(()) => {
                            if let Some(parent) = path.parent() {
                                fsops::prune_empty_dirs_upward(parent, &libs_root);
                            }
                        }
                        Err(e) => warn!("skipping lib file {}: {}", path.display(), e),
                    }
                }
            }
            PackageKind::Plugin => {
                let target_dll = root.join("plugins").join(format!("{}.dll", name));
                fsops::remove_file_if_exists(&target_dll)?;
            }
        }

        if !record.doc_files.is_empty() {
            let docs_base = root.join("docs").join(name);
            let claimed = claims_by_others(self.tracker(), name, kind, |r| &r.doc_files);
            for doc_file in &record.doc_files {
                if claimed.contains(doc_file) {
                    continue;
                }
                if let Some(path) = resolve_owned_path(&root, &docs_base, doc_file) {
                    if let Err(e) = fsops::remove_file_if_exists(&path) {
                        warn!("skipping doc file {}: {}", path.display(), e);
                    }
                }
            }
            // The per-package docs mirror itself goes once its files are
            // handled; leftovers mean another package still claims them.
            if docs_base.exists() {
                if let Err(e) = remove_if_empty_tree(&docs_base) {
                    warn!("leaving docs folder {}: {}", docs_base.display(), e);
                }
            }
        }

        if !record.resource_files.is_empty() {
            let resources_base = root.join("resources");
            let claimed = claims_by_others(self.tracker(), name, kind, |r| &r.resource_files);
            for resource_file in &record.resource_files {
                if claimed.contains(resource_file) {
                    continue;
                }
                let Some(path) = resolve_owned_path(&root, &resources_base, resource_file) else {
                    continue;
                };
                match fsops::remove_file_if_exists(&path) {
                    Ok(()) => {
                        if let Some(parent) = path.parent() {
                            fsops::prune_empty_dirs_upward(parent, &resources_base);
                        }
                    }
                    Err(e) => warn!("skipping resource file {}: {}", path.display(), e),
                }
            }
        }

        self.tracker_mut().remove_package(name, kind);
        self.tracker_mut().save()?;

        info!("removed {} {}", kind, name);
        Ok(format!("Package \"{}\" removed successfully", name))
    }
}

/// Remove a directory only when nothing (owned by others) is left in it.
fn remove_if_empty_tree(path: &Path) -> Result<()> {
    let has_files = walkdir::WalkDir::new(path)
        .into_iter()
        .flatten()
        .any(|e| e.file_type().is_file());
    if !has_files {
        fsops::remove_dir_all_robust(path)?;
    }
    Ok(())
}
