//! First-launch disk scan: adopt packages already present under the
//! managed root into the tracker.
//!
//! A folder that is its own git checkout is adopted as a git install.
//! Everything else is classified against the official catalog:
//! listed → pre-installed, unlisted → manual (with a reason string the
//! caller can show). When the catalog fetch itself fails the scan fails
//! open to pre-installed — a transient network error must not
//! mass-misclassify a healthy installation as manual.

use tracing::{info, warn};

use crate::error::Result;
use crate::git::{self, LocalRepoMetadata};
use crate::github::Catalog;
use crate::outcome::ScanReport;
use crate::tracker::{InstallMethod, PackageKind, PackageRecord};
use crate::util::fsops;

use super::Manager;

/// How a disk-discovered package should be recorded.
#[derive(Debug, PartialEq)]
pub struct Classification {
    pub install_method: InstallMethod,
    pub source: String,
    pub branch: Option<String>,
    pub commit: Option<String>,
    /// Present only for manual classifications.
    pub reason: Option<String>,
}

/// Pure classification decision, separated from the filesystem walk so
/// it can be tested without a network or a git checkout.
pub fn classify_discovered(
    name: &str,
    kind: PackageKind,
    git_meta: Option<&LocalRepoMetadata>,
    catalog: Option<&Catalog>,
    official_repo: &str,
    official_branch: &str,
) -> Classification {
    if let Some(meta) = git_meta {
        return Classification {
            install_method: InstallMethod::Git,
            source: meta.source.clone().unwrap_or_else(|| "unknown".to_string()),
            branch: meta.branch.clone(),
            commit: meta.commit.clone(),
            reason: None,
        };
    }

    let official = Classification {
        install_method: InstallMethod::PreInstalled,
        source: official_repo.to_string(),
        branch: Some(official_branch.to_string()),
        commit: None,
        reason: None,
    };

    match catalog {
        Some(catalog) => {
            let listed = match kind {
                PackageKind::Addon => catalog.addons.iter().any(|a| a.eq_ignore_ascii_case(name)),
                PackageKind::Plugin => catalog.plugins.iter().any(|p| p.eq_ignore_ascii_case(name)),
            };
            if listed {
                official
            } else {
                Classification {
                    install_method: InstallMethod::Manual,
                    source: "unknown".to_string(),
                    branch: None,
                    commit: None,
                    reason: Some(format!(
                        "{} '{}' flagged as manual: not listed in official catalog",
                        kind.label(),
                        name
                    )),
                }
            }
        }
        // Catalog unavailable: fail open rather than flagging a healthy
        // install as manual.
        None => official,
    }
}

impl Manager {
    /// Scan `addons/` and `plugins/` and register everything found.
    pub fn scan_existing_packages(&mut self) -> Result<ScanReport> {
        let root = self.root();
        let official_repo = self.official_repo().to_string();
        let official_branch = self.official_branch().to_string();

        let mut report = ScanReport::default();
        let catalog = match self.github().fetch_catalog(&official_repo, Some(&official_branch)) {
            Ok(catalog) => {
                report.catalog_ok = true;
                Some(catalog)
            }
            Err(e) => {
                warn!("official catalog fetch failed: {}", e);
                report.catalog_error = Some(e.to_string());
                None
            }
        };

        for addon_dir in fsops::list_subdirs(&root.join("addons")) {
            let name = addon_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !addon_dir.join(format!("{}.lua", name)).is_file() {
                continue;
            }

            let git_meta = git::local_metadata(&addon_dir);
            let class = classify_discovered(
                &name,
                PackageKind::Addon,
                git_meta.as_ref(),
                catalog.as_ref(),
                &official_repo,
                &official_branch,
            );
            let mut record =
                PackageRecord::new(class.source.clone(), class.install_method, format!("addons/{}", name));
            record.branch = class.branch.clone();
            record.commit = class.commit.clone();
            if record.commit.is_none() && class.install_method == InstallMethod::PreInstalled {
                record.commit = git::last_commit_for_path(&root, &format!("addons/{}", name));
            }
            if let Some(reason) = class.reason {
                report.manual_flags.push(reason);
            }

            self.tracker_mut().add_package(&name, PackageKind::Addon, record);
            report.addons_found += 1;
        }

        let plugins_dir = root.join("plugins");
        let plugins_commit = git::last_commit_for_path(&root, "plugins");
        if plugins_dir.is_dir() {
            let mut dlls: Vec<_> = std::fs::read_dir(&plugins_dir)?
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .map(|e| e.eq_ignore_ascii_case("dll"))
                            .unwrap_or(false)
                })
                .collect();
            dlls.sort();

            for dll in dlls {
                let name = dll
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();

                // A sibling source checkout named after the plugin marks
                // it as git-managed.
                let repo_dir = plugins_dir.join(&name);
                let git_meta = if repo_dir.is_dir() {
                    git::local_metadata(&repo_dir)
                } else {
                    None
                };

                let class = classify_discovered(
                    &name,
                    PackageKind::Plugin,
                    git_meta.as_ref(),
                    catalog.as_ref(),
                    &official_repo,
                    &official_branch,
                );
                let mut record = PackageRecord::new(
                    class.source.clone(),
                    class.install_method,
                    format!("plugins/{}.dll", name),
                );
                record.branch = class.branch.clone();
                record.commit = class.commit.clone();
                if record.commit.is_none() && class.install_method == InstallMethod::PreInstalled {
                    record.commit = plugins_commit.clone();
                }
                if let Some(reason) = class.reason {
                    report.manual_flags.push(reason);
                }

                self.tracker_mut().add_package(&name, PackageKind::Plugin, record);
                report.plugins_found += 1;
            }
        }

        self.tracker_mut().save()?;
        info!(
            "scan adopted {} addon(s), {} plugin(s)",
            report.addons_found, report.plugins_found
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(addons: &[&str], plugins: &[&str]) -> Catalog {
        let mut c = Catalog::default();
        c.addons.extend(addons.iter().map(|s| s.to_string()));
        c.plugins.extend(plugins.iter().map(|s| s.to_string()));
        c
    }

    const OFFICIAL: &str = "https://github.com/example/bundle";

    #[test]
    fn git_checkout_wins_over_catalog() {
        let meta = LocalRepoMetadata {
            source: Some("https://github.com/u/thing".to_string()),
            branch: Some("main".to_string()),
            commit: Some("abc".to_string()),
        };
        let class = classify_discovered(
            "Thing",
            PackageKind::Addon,
            Some(&meta),
            Some(&catalog(&["Thing"], &[])),
            OFFICIAL,
            "main",
        );
        assert_eq!(class.install_method, InstallMethod::Git);
        assert_eq!(class.source, "https://github.com/u/thing");
    }

    #[test]
    fn catalog_member_is_pre_installed() {
        let class = classify_discovered(
            "distance",
            PackageKind::Addon,
            None,
            Some(&catalog(&["Distance"], &[])),
            OFFICIAL,
            "main",
        );
        assert_eq!(class.install_method, InstallMethod::PreInstalled);
        assert_eq!(class.source, OFFICIAL);
        assert!(class.reason.is_none());
    }

    #[test]
    fn unlisted_package_is_flagged_manual() {
        let class = classify_discovered(
            "Obscure",
            PackageKind::Plugin,
            None,
            Some(&catalog(&[], &["Sparkle"])),
            OFFICIAL,
            "main",
        );
        assert_eq!(class.install_method, InstallMethod::Manual);
        assert_eq!(class.source, "unknown");
        assert!(class.reason.unwrap().contains("Obscure"));
    }

    #[test]
    fn failed_catalog_fails_open() {
        let class =
            classify_discovered("Anything", PackageKind::Addon, None, None, OFFICIAL, "main");
        assert_eq!(class.install_method, InstallMethod::PreInstalled);
    }
}
