//! Shared-file conflict detection, run before every unforced install.
//!
//! Ownership comes from the tracker's ledger, not from disk: a file in
//! the shared libs tree conflicts only when some *other* addon's
//! `lib_files` claims it, and only when that owner was installed from a
//! different source — re-installing from the same repository never
//! conflicts with itself.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::{LoadoutError, Result};
use crate::outcome::{ConflictReport, LibConflict};
use crate::tracker::PackageTracker;
use crate::util::fsops;

/// Inspect `source_tree` for files that would collide with another
/// package's claimed files under the managed `root`.
pub fn check_file_conflicts(
    tracker: &PackageTracker,
    root: &Path,
    source_tree: &Path,
    package_name: &str,
    source_url: Option<&str>,
) -> Result<ConflictReport> {
    let mut report = ConflictReport::default();

    // Release zips and clones often wrap the payload one level down.
    let subdirs = fsops::list_subdirs(source_tree);
    let effective = if subdirs.len() == 1 {
        subdirs.into_iter().next().unwrap()
    } else {
        source_tree.to_path_buf()
    };

    let libs_source = effective.join("addons/libs");
    let libs_target = root.join("addons/libs");
    if libs_source.is_dir() && libs_target.is_dir() {
        for entry in WalkDir::new(&libs_source).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| LoadoutError::IoError(std::io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = fsops::rel_display(entry.path(), &libs_source);
            if !libs_target.join(&rel).exists() {
                continue;
            }
            // Ledger entries are root-relative.
            let ledger_path = format!("addons/libs/{}", rel);
            let owner = tracker
                .addons()
                .iter()
                .find(|(name, record)| {
                    name.as_str() != package_name && record.lib_files.iter().any(|f| f == &ledger_path)
                })
                .map(|(name, record)| (name.clone(), record.source.clone()));

            if let Some((owner, owner_source)) = owner {
                if source_url != Some(owner_source.as_str()) {
                    report.libs.push(LibConflict {
                        file: rel,
                        owner,
                        owner_source: Some(owner_source),
                    });
                }
            }
        }
    }

    if crate::detect::has_docs_folder(&effective).is_some() && root.join("docs").join(package_name).exists() {
        report.docs = true;
    }

    if crate::detect::has_resources_folder(&effective).is_some()
        && root.join("resources").join(package_name).exists()
    {
        report.resources = true;
    }

    Ok(report)
}
