//! Shared-folder merge after a primary artifact is placed.
//!
//! Library files are merged file-by-file into `addons/libs` (several
//! addons may share them); docs and resources are mirrored under a
//! per-package folder. Every file copied here is recorded in the
//! package's ownership ledger — that bookkeeping is what makes later
//! conflict detection and reference-counted removal possible.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{LoadoutError, Result};
use crate::tracker::{PackageKind, PackageTracker};
use crate::util::fsops;

/// Title casing: first letter of every alphabetic run uppercased, the
/// rest lowercased.
fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_word_start = true;
    for c in name.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Case variants a multi-package source tree may use for a package's
/// docs/resources subfolder.
fn name_variants(package_name: &str) -> Vec<String> {
    let mut variants = vec![
        package_name.to_string(),
        package_name.to_lowercase(),
        package_name.to_uppercase(),
        title_case(package_name),
    ];
    variants.dedup();
    variants
}

fn find_variant_subfolder(location: &Path, package_name: &str) -> Option<PathBuf> {
    name_variants(package_name)
        .into_iter()
        .map(|v| location.join(v))
        .find(|p| p.is_dir())
}

/// Copy libs/docs/resources from `source_tree` into the managed `root`
/// and record ownership on the tracked record for `package_name`.
///
/// Returns human-readable warnings for sections that failed; the
/// install itself is not aborted over extras.
pub fn copy_extra_folders(
    tracker: &mut PackageTracker,
    root: &Path,
    source_tree: &Path,
    package_name: &str,
    kind: PackageKind,
) -> Vec<String> {
    let mut warnings = Vec::new();

    let subdirs = fsops::list_subdirs(source_tree);
    let effective = if subdirs.len() == 1 {
        subdirs.into_iter().next().unwrap()
    } else {
        source_tree.to_path_buf()
    };

    let is_multi_folder_repo =
        effective.join("addons").is_dir() || effective.join("plugins").is_dir();

    if is_multi_folder_repo {
        match copy_shared_libs(root, &effective) {
            Ok(lib_files) => {
                // Shared library ownership is an addon concept.
                if !lib_files.is_empty() && kind == PackageKind::Addon {
                    if let Some(record) = tracker.get_package_mut(package_name, kind) {
                        record.lib_files = lib_files;
                    }
                }
            }
            Err(e) => {
                warn!("copying shared libs failed: {}", e);
                warnings.push(format!("Error copying libs: {}", e));
            }
        }
    }

    match copy_docs(root, &effective, package_name) {
        Ok(doc_files) => {
            if !doc_files.is_empty() {
                if let Some(record) = tracker.get_package_mut(package_name, kind) {
                    record.doc_files = doc_files;
                }
            }
        }
        Err(e) => {
            warn!("copying docs failed: {}", e);
            warnings.push(format!("Error copying docs: {}", e));
        }
    }

    match copy_resources(root, &effective, package_name) {
        Ok(resource_files) => {
            if !resource_files.is_empty() {
                if let Some(record) = tracker.get_package_mut(package_name, kind) {
                    record.resource_files = resource_files;
                }
            }
        }
        Err(e) => {
            warn!("copying resources failed: {}", e);
            warnings.push(format!("Error copying resources: {}", e));
        }
    }

    warnings
}

fn copy_shared_libs(root: &Path, effective: &Path) -> Result<Vec<String>> {
    let libs_source = effective.join("addons/libs");
    if !libs_source.is_dir() {
        return Ok(Vec::new());
    }
    let libs_target = root.join("addons/libs");
    std::fs::create_dir_all(&libs_target)?;
    fsops::merge_dir_into(&libs_source, &libs_target, root)
}

fn copy_docs(root: &Path, effective: &Path, package_name: &str) -> Result<Vec<String>> {
    let Some(docs_location) = crate::detect::has_docs_folder(effective) else {
        return Ok(Vec::new());
    };

    let target_docs = root.join("docs").join(package_name);
    // In a tree hosting several packages the docs folder carries one
    // subfolder per package; match by name variant, else mirror the
    // whole folder.
    let source_to_copy =
        find_variant_subfolder(&docs_location, package_name).unwrap_or(docs_location);

    if target_docs.exists() {
        fsops::remove_dir_all_robust(&target_docs)?;
    }
    fsops::copy_dir_recursive(&source_to_copy, &target_docs)?;
    fsops::collect_files(&target_docs, root)
}

fn copy_resources(root: &Path, effective: &Path, package_name: &str) -> Result<Vec<String>> {
    let Some(res_location) = crate::detect::has_resources_folder(effective) else {
        return Ok(Vec::new());
    };

    let resources_root = root.join("resources");
    std::fs::create_dir_all(&resources_root)?;

    if let Some(variation) = find_variant_subfolder(&res_location, package_name) {
        let target = resources_root.join(package_name);
        if target.exists() {
            fsops::remove_dir_all_robust(&target)?;
        }
        fsops::copy_dir_recursive(&variation, &target)?;
        return fsops::collect_files(&target, root);
    }

    // No package-named subfolder: mirror each resource subfolder,
    // merging into any that already exist.
    let mut resource_files = Vec::new();
    for subdir in fsops::list_subdirs(&res_location) {
        let name = subdir.file_name().unwrap_or_default().to_string_lossy().into_owned();
        let target = resources_root.join(&name);
        if target.exists() {
            resource_files.extend(fsops::merge_dir_into(&subdir, &target, root)?);
        } else {
            fsops::copy_dir_recursive(&subdir, &target)?;
            resource_files.extend(fsops::collect_files(&target, root)?);
        }
    }
    Ok(resource_files)
}

/// Delete a package's docs and resources mirrors, used when a manual
/// install or update replaces them.
pub fn clear_extra_artifacts(root: &Path, package_name: &str) -> Result<()> {
    fsops::remove_dir_all_robust(&root.join("docs").join(package_name))?;
    fsops::remove_dir_all_robust(&root.join("resources").join(package_name))?;
    Ok(())
}

/// Copy a user-picked documentation folder to `docs/<package>`,
/// preferring an inner folder named after the package so the mirror
/// does not end up double-nested. Returns the recorded doc files.
pub fn copy_manual_docs(root: &Path, docs_source: &Path, package_name: &str) -> Result<Vec<String>> {
    copy_manual_folder(root, docs_source, &root.join("docs"), package_name)
}

/// Same as [`copy_manual_docs`] for a resources folder.
pub fn copy_manual_resources(
    root: &Path,
    resources_source: &Path,
    package_name: &str,
) -> Result<Vec<String>> {
    copy_manual_folder(root, resources_source, &root.join("resources"), package_name)
}

fn copy_manual_folder(
    root: &Path,
    source: &Path,
    category_root: &Path,
    package_name: &str,
) -> Result<Vec<String>> {
    if !source.is_dir() {
        return Err(LoadoutError::InstallError(format!(
            "{} is not a folder",
            source.display()
        )));
    }
    let package_lower = package_name.to_lowercase();

    let subdirs = fsops::list_subdirs(source);
    let mut source_to_copy: Option<PathBuf> = None;
    if subdirs.len() == 1
        && subdirs[0]
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase() == package_lower)
            .unwrap_or(false)
    {
        source_to_copy = Some(subdirs[0].clone());
    } else if source.join(package_name).is_dir() {
        source_to_copy = Some(source.join(package_name));
    } else {
        for dir in &subdirs {
            if dir
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase() == package_lower)
                .unwrap_or(false)
            {
                source_to_copy = Some(dir.clone());
                break;
            }
        }
    }

    std::fs::create_dir_all(category_root)?;
    let target = category_root.join(package_name);
    if target.exists() {
        fsops::remove_dir_all_robust(&target)?;
    }

    match source_to_copy {
        Some(inner) => fsops::copy_dir_recursive(&inner, &target)?,
        None => {
            let source_is_package_named = source
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase() == package_lower)
                .unwrap_or(false);
            if source_is_package_named {
                // The user picked a folder already named after the
                // package: copy its contents, not the folder itself.
                std::fs::create_dir_all(&target)?;
                for entry in std::fs::read_dir(source)? {
                    let entry = entry?;
                    let item = entry.path();
                    let dest = target.join(entry.file_name());
                    if item.is_dir() {
                        fsops::copy_dir_recursive(&item, &dest)?;
                    } else {
                        std::fs::copy(&item, &dest)?;
                    }
                }
            } else {
                fsops::copy_dir_recursive(source, &target)?;
            }
        }
    }

    fsops::collect_files(&target, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{InstallMethod, PackageRecord};

    fn tracked_root() -> (tempfile::TempDir, PackageTracker) {
        let root = tempfile::tempdir().unwrap();
        let mut tracker = PackageTracker::open(root.path());
        tracker.add_package(
            "MyAddon",
            PackageKind::Addon,
            PackageRecord::new("u", InstallMethod::Git, "addons/MyAddon"),
        );
        (root, tracker)
    }

    #[test]
    fn title_case_uppercases_word_starts() {
        assert_eq!(title_case("myaddon"), "Myaddon");
        assert_eq!(title_case("my_addon"), "My_Addon");
        assert_eq!(title_case("MYADDON"), "Myaddon");
    }

    #[test]
    fn libs_are_merged_and_recorded() {
        let (root, mut tracker) = tracked_root();
        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("addons/libs/inner")).unwrap();
        std::fs::write(source.path().join("addons/libs/inner/util.lua"), b"x").unwrap();
        std::fs::create_dir_all(source.path().join("plugins")).unwrap();

        let warnings =
            copy_extra_folders(&mut tracker, root.path(), source.path(), "MyAddon", PackageKind::Addon);
        assert!(warnings.is_empty());
        assert!(root.path().join("addons/libs/inner/util.lua").is_file());
        assert_eq!(
            tracker.get_package("MyAddon", PackageKind::Addon).unwrap().lib_files,
            vec!["addons/libs/inner/util.lua"]
        );
    }

    #[test]
    fn docs_variant_subfolder_is_preferred() {
        let (root, mut tracker) = tracked_root();
        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("docs/myaddon")).unwrap();
        std::fs::write(source.path().join("docs/myaddon/readme.txt"), b"hi").unwrap();
        std::fs::create_dir_all(source.path().join("docs/other")).unwrap();
        std::fs::create_dir_all(source.path().join("addons")).unwrap();

        copy_extra_folders(&mut tracker, root.path(), source.path(), "MyAddon", PackageKind::Addon);
        assert!(root.path().join("docs/MyAddon/readme.txt").is_file());
        assert_eq!(
            tracker.get_package("MyAddon", PackageKind::Addon).unwrap().doc_files,
            vec!["docs/MyAddon/readme.txt"]
        );
    }

    #[test]
    fn wholesale_docs_copy_without_variant() {
        let (root, mut tracker) = tracked_root();
        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("Docs")).unwrap();
        std::fs::write(source.path().join("Docs/guide.md"), b"g").unwrap();
        std::fs::create_dir_all(source.path().join("other")).unwrap();

        copy_extra_folders(&mut tracker, root.path(), source.path(), "MyAddon", PackageKind::Addon);
        assert!(root.path().join("docs/MyAddon/guide.md").is_file());
    }

    #[test]
    fn resources_merge_into_existing_subfolder() {
        let (root, mut tracker) = tracked_root();
        std::fs::create_dir_all(root.path().join("resources/maps")).unwrap();
        std::fs::write(root.path().join("resources/maps/old.dat"), b"o").unwrap();

        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("resources/maps")).unwrap();
        std::fs::write(source.path().join("resources/maps/new.dat"), b"n").unwrap();
        std::fs::create_dir_all(source.path().join("other")).unwrap();

        copy_extra_folders(&mut tracker, root.path(), source.path(), "MyAddon", PackageKind::Addon);
        assert!(root.path().join("resources/maps/old.dat").is_file());
        assert!(root.path().join("resources/maps/new.dat").is_file());
        assert_eq!(
            tracker.get_package("MyAddon", PackageKind::Addon).unwrap().resource_files,
            vec!["resources/maps/new.dat"]
        );
    }

    #[test]
    fn manual_docs_avoid_double_nesting() {
        let root = tempfile::tempdir().unwrap();
        let picked = tempfile::tempdir().unwrap();
        // User picked docs/MyAddon itself; contents go directly under
        // docs/MyAddon, not docs/MyAddon/MyAddon.
        let folder = picked.path().join("MyAddon");
        std::fs::create_dir_all(folder.join("sub")).unwrap();
        std::fs::write(folder.join("readme.txt"), b"r").unwrap();
        std::fs::write(folder.join("sub/deep.txt"), b"d").unwrap();

        let files = copy_manual_docs(root.path(), &folder, "MyAddon").unwrap();
        assert!(root.path().join("docs/MyAddon/readme.txt").is_file());
        assert!(files.contains(&"docs/MyAddon/readme.txt".to_string()));
        assert!(files.contains(&"docs/MyAddon/sub/deep.txt".to_string()));
        assert!(!root.path().join("docs/MyAddon/MyAddon").exists());
    }

    #[test]
    fn manual_docs_prefer_inner_package_folder() {
        let root = tempfile::tempdir().unwrap();
        let picked = tempfile::tempdir().unwrap();
        let outer = picked.path().join("bundle");
        std::fs::create_dir_all(outer.join("myaddon")).unwrap();
        std::fs::write(outer.join("myaddon/readme.txt"), b"r").unwrap();

        copy_manual_docs(root.path(), &outer, "MyAddon").unwrap();
        assert!(root.path().join("docs/MyAddon/readme.txt").is_file());
    }

    #[test]
    fn manual_docs_reject_non_folder() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("notdir.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(copy_manual_docs(root.path(), &file, "MyAddon").is_err());
    }
}
