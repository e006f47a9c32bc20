//! Structure detection for extracted source trees.
//!
//! Clones and release zips commonly wrap the real payload in one extra
//! top-level folder, ship a whole `addons/` tree, or dump loose `.lua`
//! files at the root. These heuristics locate the addon entrypoint (or
//! plugin binary) and the package's logical name without ever guessing:
//! when no rule wins decisively, detection reports the candidates and
//! the caller asks the user.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddonStructure {
    /// Lua files sit directly in the detected folder.
    Root,
    /// The addon lives in a `<name>/<name>.lua` subfolder.
    Nested,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddonDetection {
    Found {
        name: String,
        path: PathBuf,
        structure: AddonStructure,
    },
    /// Multiple entrypoint candidates and no heuristic won. Carries the
    /// lua file stems for the caller to present.
    Ambiguous {
        lua_files: Vec<String>,
        path: PathBuf,
    },
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginDetection {
    pub name: String,
    pub dll_path: PathBuf,
}

/// Non-hidden subdirectories, sorted by name for deterministic
/// first-match behavior.
fn subdirs(path: &Path) -> Vec<PathBuf> {
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

fn files_with_extension(path: &Path, ext: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|e| e.eq_ignore_ascii_case(ext))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

fn stem(path: &Path) -> String {
    path.file_stem().unwrap_or_default().to_string_lossy().into_owned()
}

fn dir_name(path: &Path) -> String {
    path.file_name().unwrap_or_default().to_string_lossy().into_owned()
}

/// Collapse the common "single wrapper folder" case: a root with exactly
/// one non-hidden subdirectory and nothing else of interest.
fn collapse_wrapper(root: &Path) -> PathBuf {
    let dirs = subdirs(root);
    if dirs.len() == 1 {
        dirs.into_iter().next().unwrap()
    } else {
        root.to_path_buf()
    }
}

/// Locate a single addon under `root`.
///
/// Precedence: an `addons/` tree beats loose lua files, loose lua files
/// at the very root suppress wrapper collapsing, and a
/// `<name>/<name>.lua` subfolder is the last resort. `target_name`
/// narrows an `addons/` tree to one specific addon (monorepo installs);
/// `repo_url` feeds the name-inference ladder.
pub fn detect_addon_structure(
    root: &Path,
    target_name: Option<&str>,
    repo_url: Option<&str>,
) -> AddonDetection {
    // Lua files directly at the root pin the effective root here; never
    // descend past them into a subdirectory.
    let has_root_lua = !files_with_extension(root, "lua").is_empty();
    let effective = if has_root_lua {
        root.to_path_buf()
    } else {
        collapse_wrapper(root)
    };

    // Pattern 1: an addons/ folder.
    let addons_folder = effective.join("addons");
    if addons_folder.is_dir() {
        if let Some(target) = target_name {
            let candidate = addons_folder.join(target);
            if candidate.is_dir() && candidate.join(format!("{}.lua", target)).is_file() {
                return AddonDetection::Found {
                    name: target.to_string(),
                    path: candidate,
                    structure: AddonStructure::Nested,
                };
            }
        } else {
            for dir in subdirs(&addons_folder) {
                let name = dir_name(&dir);
                if name == "libs" {
                    continue;
                }
                if dir.join(format!("{}.lua", name)).is_file() {
                    return AddonDetection::Found {
                        name,
                        path: dir,
                        structure: AddonStructure::Nested,
                    };
                }
            }
        }
    }

    // Pattern 2: lua files directly at the effective root.
    let lua_files = files_with_extension(&effective, "lua");
    if !lua_files.is_empty() {
        let stems: Vec<String> = lua_files.iter().map(|p| stem(p)).collect();
        return match infer_addon_name(&effective, &stems, repo_url) {
            Some(name) => AddonDetection::Found {
                name,
                path: effective,
                structure: AddonStructure::Root,
            },
            None => AddonDetection::Ambiguous {
                lua_files: stems,
                path: effective,
            },
        };
    }

    // Pattern 3: a <name>/<name>.lua subfolder.
    for dir in subdirs(&effective) {
        let name = dir_name(&dir);
        if dir.join(format!("{}.lua", name)).is_file() {
            return AddonDetection::Found {
                name,
                path: dir,
                structure: AddonStructure::Nested,
            };
        }
    }

    AddonDetection::NotFound
}

/// Every addon in a monorepo's `addons/*` tree, or the single detected
/// addon as a one-element list. Ambiguous single-addon trees yield an
/// empty list here; the single-addon path re-runs detection with the
/// repo URL and surfaces the ambiguity properly.
pub fn detect_all_addons(root: &Path) -> Vec<(String, PathBuf)> {
    let effective = collapse_wrapper(root);
    let mut found = Vec::new();

    let addons_folder = effective.join("addons");
    if addons_folder.is_dir() {
        for dir in subdirs(&addons_folder) {
            let name = dir_name(&dir);
            if name == "libs" {
                continue;
            }
            if dir.join(format!("{}.lua", name)).is_file() {
                found.push((name, dir));
            }
        }
    }

    if !found.is_empty() {
        return found;
    }

    match detect_addon_structure(root, None, None) {
        AddonDetection::Found { name, path, .. } => vec![(name, path)],
        _ => Vec::new(),
    }
}

/// Locate a plugin binary. Binary names are authoritative, so there is
/// no ambiguity path: first hit wins, with a recursive fallback capped
/// at two path segments.
pub fn detect_plugin_structure(root: &Path, target_name: Option<&str>) -> Option<PluginDetection> {
    let effective = collapse_wrapper(root);

    // Pattern 1: a plugins/ folder.
    let plugins_folder = effective.join("plugins");
    if plugins_folder.is_dir() {
        if let Some(target) = target_name {
            let candidate = plugins_folder.join(format!("{}.dll", target));
            if candidate.is_file() {
                return Some(PluginDetection {
                    name: target.to_string(),
                    dll_path: candidate,
                });
            }
        } else if let Some(dll) = files_with_extension(&plugins_folder, "dll").into_iter().next() {
            return Some(PluginDetection {
                name: stem(&dll),
                dll_path: dll,
            });
        }
    }

    // Pattern 2: .dll at the effective root.
    if let Some(dll) = files_with_extension(&effective, "dll").into_iter().next() {
        return Some(PluginDetection {
            name: stem(&dll),
            dll_path: dll,
        });
    }

    // Pattern 3: recursive search, at most two segments deep.
    for entry in WalkDir::new(&effective)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .flatten()
    {
        let path = entry.path();
        if path.is_file()
            && path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("dll"))
                .unwrap_or(false)
        {
            return Some(PluginDetection {
                name: stem(path),
                dll_path: path.to_path_buf(),
            });
        }
    }

    None
}

/// Trailing path segment of a repository URL, lowercased, without a
/// `.git` suffix.
fn repo_url_name(repo_url: &str) -> Option<String> {
    let segment = repo_url.trim_end_matches('/').rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    Some(segment.trim_end_matches(".git").to_lowercase())
}

/// Infer the addon name from its lua file stems, in priority order:
/// exact repo-URL match, single candidate, exact folder-name match,
/// longest substring match (≥ 3 characters) against the folder or repo
/// name. Returns `None` when nothing wins — the deliberate "ask the
/// user" escape hatch.
pub fn infer_addon_name(folder: &Path, lua_stems: &[String], repo_url: Option<&str>) -> Option<String> {
    let folder_name = folder
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let repo_name = repo_url.and_then(repo_url_name);

    if let Some(ref repo) = repo_name {
        for stem in lua_stems {
            if stem.to_lowercase() == *repo {
                return Some(stem.clone());
            }
        }
    }

    if lua_stems.len() == 1 {
        return Some(lua_stems[0].clone());
    }

    for stem in lua_stems {
        if stem.to_lowercase() == folder_name {
            return Some(stem.clone());
        }
    }

    let mut best: Option<&String> = None;
    let mut best_len = 0usize;
    for stem in lua_stems {
        let lower = stem.to_lowercase();

        if folder_name.contains(&lower) && lower.len() > best_len {
            best = Some(stem);
            best_len = lower.len();
        } else if lower.contains(&folder_name) && folder_name.len() > best_len {
            best = Some(stem);
            best_len = folder_name.len();
        }

        if let Some(ref repo) = repo_name {
            if repo.contains(&lower) && lower.len() > best_len {
                best = Some(stem);
                best_len = lower.len();
            } else if lower.contains(repo) && repo.len() > best_len {
                best = Some(stem);
                best_len = repo.len();
            }
        }
    }

    if best_len >= 3 {
        return best.cloned();
    }

    None
}

pub fn has_docs_folder(root: &Path) -> Option<PathBuf> {
    ["docs", "Docs"]
        .iter()
        .map(|d| root.join(d))
        .find(|p| p.is_dir())
}

pub fn has_resources_folder(root: &Path) -> Option<PathBuf> {
    ["resources", "Resources"]
        .iter()
        .map(|d| root.join(d))
        .find(|p| p.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn single_lua_at_root_is_never_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Distance.lua"));
        match detect_addon_structure(dir.path(), None, None) {
            AddonDetection::Found { name, structure, .. } => {
                assert_eq!(name, "Distance");
                assert_eq!(structure, AddonStructure::Root);
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn exact_folder_match_beats_substring() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Foo");
        touch(&folder.join("Foo.lua"));
        touch(&folder.join("Bar.lua"));
        match detect_addon_structure(&folder, None, None) {
            AddonDetection::Found { name, .. } => assert_eq!(name, "Foo"),
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn unrelated_names_are_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("unrelated");
        touch(&folder.join("x.lua"));
        touch(&folder.join("y.lua"));
        match detect_addon_structure(&folder, None, None) {
            AddonDetection::Ambiguous { lua_files, .. } => {
                assert_eq!(lua_files, vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn repo_url_match_wins() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("some-wrapper");
        touch(&folder.join("timers.lua"));
        touch(&folder.join("helpers.lua"));
        match detect_addon_structure(&folder, None, Some("https://github.com/u/timers")) {
            AddonDetection::Found { name, .. } => assert_eq!(name, "timers"),
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn wrapper_folder_is_collapsed_once() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("wrapper/MyAddon/MyAddon.lua"));
        match detect_addon_structure(dir.path(), None, None) {
            AddonDetection::Found { name, structure, .. } => {
                assert_eq!(name, "MyAddon");
                assert_eq!(structure, AddonStructure::Nested);
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn root_lua_suppresses_wrapper_collapse() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("main.lua"));
        touch(&dir.path().join("sub/other.lua"));
        match detect_addon_structure(dir.path(), None, None) {
            AddonDetection::Found { name, structure, .. } => {
                assert_eq!(name, "main");
                assert_eq!(structure, AddonStructure::Root);
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn addons_tree_with_target_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("addons/A/A.lua"));
        touch(&dir.path().join("addons/B/B.lua"));
        // A second top-level folder keeps the wrapper collapse from
        // descending into addons/ itself.
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        match detect_addon_structure(dir.path(), Some("B"), None) {
            AddonDetection::Found { name, .. } => assert_eq!(name, "B"),
            other => panic!("expected Found, got {:?}", other),
        }
        // Target without a matching entrypoint is not found.
        assert_eq!(
            detect_addon_structure(dir.path(), Some("C"), None),
            AddonDetection::NotFound
        );
    }

    #[test]
    fn detect_all_addons_skips_libs() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("addons/A/A.lua"));
        touch(&dir.path().join("addons/B/B.lua"));
        touch(&dir.path().join("addons/libs/util.lua"));
        touch(&dir.path().join("addons/broken/other.lua"));
        std::fs::create_dir_all(dir.path().join("plugins")).unwrap();
        let all = detect_all_addons(dir.path());
        let names: Vec<&str> = all.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn plugin_detection_prefers_plugins_folder() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("plugins/Sparkle.dll"));
        touch(&dir.path().join("Other.dll"));
        let det = detect_plugin_structure(dir.path(), None).unwrap();
        assert_eq!(det.name, "Sparkle");
    }

    #[test]
    fn plugin_recursive_search_is_depth_capped() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/b/c/Deep.dll"));
        assert!(detect_plugin_structure(dir.path(), None).is_none());

        // Note the single-subdir collapse shifts the search root down
        // one level, so two segments under the wrapper are reachable.
        let dir2 = tempfile::tempdir().unwrap();
        touch(&dir2.path().join("build/win64/Shallow.dll"));
        touch(&dir2.path().join("other.txt"));
        let det = detect_plugin_structure(dir2.path(), None).unwrap();
        assert_eq!(det.name, "Shallow");
    }

    #[test]
    fn substring_inference_needs_three_chars() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("xy");
        touch(&folder.join("xy.lua"));
        touch(&folder.join("zz.lua"));
        // Exact folder match still wins at any length.
        match detect_addon_structure(&folder, None, None) {
            AddonDetection::Found { name, .. } => assert_eq!(name, "xy"),
            other => panic!("expected Found, got {:?}", other),
        }

        let folder2 = dir.path().join("ab_tools");
        touch(&folder2.join("ab.lua"));
        touch(&folder2.join("cd.lua"));
        // Substring match "ab" is below the 3-char floor: ambiguous.
        match detect_addon_structure(&folder2, None, None) {
            AddonDetection::Ambiguous { .. } => {}
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn docs_and_resources_case_variants() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Docs")).unwrap();
        std::fs::create_dir_all(dir.path().join("resources")).unwrap();
        assert!(has_docs_folder(dir.path()).is_some());
        assert!(has_resources_folder(dir.path()).is_some());
        assert!(has_docs_folder(&dir.path().join("missing")).is_none());
    }
}
