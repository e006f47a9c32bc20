//! Update engine: staleness checks, then backup-swap-verify-rollback.
//!
//! The freshness ladder short-circuits to `UpToDate` whenever the
//! recorded commit/tag matches upstream (or, for pre-installed
//! packages, when the local tree is byte-identical to the official
//! one). Only then is the artifact moved aside and the full install
//! pipeline re-run; any failure puts the old files and the old tracker
//! record back exactly as they were.

use tracing::{info, warn};

use crate::error::{LoadoutError, Result};
use crate::git;
use crate::outcome::{
    BatchReport, CancelToken, InstallOutcome, ManualPayload, ManualUpdateReason, UpdateTarget,
};
use crate::tracker::{InstallMethod, PackageKind, PackageRecord};
use crate::util::checksum;

use super::transaction::ArtifactBackup;
use super::{extras, InstallOptions, Manager};

impl Manager {
    pub fn update_package(
        &mut self,
        name: &str,
        kind: PackageKind,
        release_asset_url: Option<&str>,
        release_asset_name: Option<&str>,
        manual_payload: Option<&ManualPayload>,
    ) -> InstallOutcome {
        match self.update_package_inner(name, kind, release_asset_url, release_asset_name, manual_payload) {
            Ok(outcome) => outcome,
            Err(error) => InstallOutcome::failure(error),
        }
    }

    fn update_package_inner(
        &mut self,
        name: &str,
        kind: PackageKind,
        release_asset_url: Option<&str>,
        release_asset_name: Option<&str>,
        manual_payload: Option<&ManualPayload>,
    ) -> Result<InstallOutcome> {
        let old_record = self
            .tracker()
            .get_package(name, kind)
            .cloned()
            .ok_or_else(|| LoadoutError::PackageNotFound(name.to_string()))?;

        let install_method = old_record.install_method;
        let is_pre_installed =
            install_method == InstallMethod::PreInstalled || old_record.source == "pre-installed";
        let branch = old_record
            .branch
            .clone()
            .unwrap_or_else(|| self.official_branch().to_string());

        if let Some(payload) = manual_payload {
            return self.apply_manual_update(name, kind, payload, &old_record);
        }

        let unknown_source = old_record.source.is_empty() || old_record.source == "unknown";
        if install_method == InstallMethod::Manual
            || (install_method == InstallMethod::Release && unknown_source)
        {
            return Ok(InstallOutcome::RequiresManualUpdate {
                package: name.to_string(),
                kind,
                reason: if install_method == InstallMethod::Manual {
                    ManualUpdateReason::ManualInstall
                } else {
                    ManualUpdateReason::UnknownSource
                },
            });
        }

        // Pre-installed packages carry the official repo as their
        // nominal source for update purposes.
        let source_url = if is_pre_installed {
            self.official_repo().to_string()
        } else {
            old_record.source.clone()
        };
        if source_url.is_empty() {
            return Err(LoadoutError::UpdateError(
                "package source URL not found".to_string(),
            ));
        }

        let artifact_rel = match kind {
            PackageKind::Addon => format!("addons/{}", name),
            PackageKind::Plugin => format!("plugins/{}.dll", name),
        };

        // Freshness ladder; each rung short-circuits to UpToDate.
        if is_pre_installed {
            if !self.compare_with_remote_tree(name, kind, &source_url, &branch) {
                // Identical content: opportunistically refresh the
                // recorded commit so later git checks can short-circuit
                // cheaply.
                if source_url == self.official_repo() {
                    if let Ok(Some(sha)) =
                        self.github().remote_commit(&source_url, &branch, Some(&artifact_rel))
                    {
                        if let Some(record) = self.tracker_mut().get_package_mut(name, kind) {
                            record.commit = Some(sha);
                        }
                        self.tracker_mut().save()?;
                    }
                }
                return Ok(InstallOutcome::UpToDate {
                    message: format!("Package \"{}\" is already up to date", name),
                });
            }
        } else if install_method == InstallMethod::Git {
            if let Some(current_commit) = &old_record.commit {
                let sub_path = if source_url == self.official_repo() {
                    Some(artifact_rel.as_str())
                } else {
                    None
                };
                match self.github().remote_commit(&source_url, &branch, sub_path) {
                    Ok(Some(remote_commit)) if &remote_commit == current_commit => {
                        return Ok(InstallOutcome::UpToDate {
                            message: format!("Package \"{}\" is already up to date", name),
                        });
                    }
                    Ok(_) => {}
                    Err(e) if e.is_rate_limited() => return Err(e),
                    // Any other lookup failure falls through to the
                    // update attempt rather than wedging on a transient
                    // API error.
                    Err(e) => warn!("remote commit lookup for {} failed: {}", name, e),
                }
            }
        }

        if install_method == InstallMethod::Release && release_asset_url.is_none() {
            if let Some(current_tag) = &old_record.release_tag {
                let latest = self.github().latest_release_tag(&source_url);
                if latest != "unknown" && &latest == current_tag {
                    return Ok(InstallOutcome::UpToDate {
                        message: format!(
                            "Package \"{}\" is already up to date (release {})",
                            name, current_tag
                        ),
                    });
                }
            }
        }

        // Stale: replace under a backup so a failed attempt cannot lose
        // the working install.
        let artifact = self.root().join(&artifact_rel);
        let backup = ArtifactBackup::take(&artifact, ".backup")?;

        let update_method = if is_pre_installed || install_method == InstallMethod::Git {
            InstallMethod::Git
        } else {
            install_method
        };
        let outcome = if update_method == InstallMethod::Git {
            let opts = InstallOptions {
                target_name: Some(name.to_string()),
                branch: if source_url == self.official_repo() {
                    Some(self.official_branch().to_string())
                } else {
                    None
                },
                ..InstallOptions::default()
            };
            self.install_from_git(&source_url, kind, &opts)
        } else {
            let opts = InstallOptions {
                asset_url: release_asset_url.map(|s| s.to_string()),
                asset_name: release_asset_name
                    .map(|s| s.to_string())
                    .or_else(|| old_record.release_asset_name.clone()),
                ..InstallOptions::default()
            };
            self.install_from_release(&source_url, kind, &opts)
        };

        match outcome {
            InstallOutcome::Success { .. } => {
                backup.commit();
                // An update must never reclassify a bundled package as a
                // third-party git install.
                if is_pre_installed {
                    if let Some(record) = self.tracker_mut().get_package_mut(name, kind) {
                        record.install_method = InstallMethod::PreInstalled;
                    }
                    self.tracker_mut().save()?;
                }
                info!("updated {} {}", kind, name);
                Ok(InstallOutcome::Success {
                    message: format!("Package \"{}\" updated successfully", name),
                })
            }
            InstallOutcome::RequiresVariantSelection {
                variants,
                repo_url,
                is_release_asset,
                ..
            } => {
                // Checkpoint, not a failure: put the files back and let
                // the caller re-invoke update_package with a choice.
                self.rollback_update(name, kind, backup, &old_record);
                Ok(InstallOutcome::RequiresVariantSelection {
                    variants,
                    repo_url,
                    is_release_asset,
                    update_target: Some(UpdateTarget {
                        package: name.to_string(),
                        kind,
                    }),
                })
            }
            InstallOutcome::Failure { error } => {
                self.rollback_update(name, kind, backup, &old_record);
                Ok(InstallOutcome::failure(LoadoutError::UpdateError(format!(
                    "update failed: {}",
                    error
                ))))
            }
            InstallOutcome::RequiresConfirmation { .. } => {
                self.rollback_update(name, kind, backup, &old_record);
                Ok(InstallOutcome::failure(LoadoutError::UpdateError(
                    "update failed: file conflicts detected".to_string(),
                )))
            }
            InstallOutcome::RequiresEntrypointSelection { .. } => {
                self.rollback_update(name, kind, backup, &old_record);
                Ok(InstallOutcome::failure(LoadoutError::UpdateError(
                    "update failed: entrypoint selection required".to_string(),
                )))
            }
            InstallOutcome::UpToDate { .. } | InstallOutcome::RequiresManualUpdate { .. } => {
                self.rollback_update(name, kind, backup, &old_record);
                Ok(InstallOutcome::failure(LoadoutError::UpdateError(
                    "update failed: unexpected installer outcome".to_string(),
                )))
            }
        }
    }

    /// Restore the artifact backup and the pre-update tracker record.
    fn rollback_update(
        &mut self,
        name: &str,
        kind: PackageKind,
        backup: ArtifactBackup,
        old_record: &PackageRecord,
    ) {
        if let Err(e) = backup.restore() {
            warn!("backup restore for {} failed: {}", name, e);
        }
        self.tracker_mut().add_package(name, kind, old_record.clone());
        if let Err(e) = self.tracker_mut().save() {
            warn!("tracker restore for {} failed: {}", name, e);
        }
    }

    /// True when the installed artifact differs from the official tree,
    /// or when the comparison could not be completed — failing open to
    /// "needs update" so a transient error cannot leave a bundled
    /// package permanently stale.
    fn compare_with_remote_tree(
        &self,
        name: &str,
        kind: PackageKind,
        source_url: &str,
        branch: &str,
    ) -> bool {
        if source_url != self.official_repo() {
            return true;
        }
        match self.sparse_compare(name, kind, source_url, branch) {
            Ok(identical) => !identical,
            Err(e) => {
                warn!("comparison against {} failed ({}), assuming stale", source_url, e);
                true
            }
        }
    }

    fn sparse_compare(
        &self,
        name: &str,
        kind: PackageKind,
        source_url: &str,
        branch: &str,
    ) -> Result<bool> {
        let temp = tempfile::tempdir()?;
        let root = self.root();
        match kind {
            PackageKind::Addon => {
                git::sparse_checkout_pull(temp.path(), source_url, branch, &format!("addons/{}/*", name))?;
                let remote = temp.path().join("addons").join(name);
                let local = root.join("addons").join(name);
                if !remote.exists() || !local.exists() {
                    return Ok(false);
                }
                checksum::trees_identical(&local, &remote)
            }
            PackageKind::Plugin => {
                git::sparse_checkout_pull(
                    temp.path(),
                    source_url,
                    branch,
                    &format!("plugins/{}.dll", name),
                )?;
                let remote = temp.path().join("plugins").join(format!("{}.dll", name));
                let local = root.join("plugins").join(format!("{}.dll", name));
                if !remote.exists() || !local.exists() {
                    return Ok(false);
                }
                checksum::files_identical(&local, &remote)
            }
        }
    }

    /// Replace a manually installed package with caller-supplied files,
    /// under the same backup/rollback discipline as an auto update.
    fn apply_manual_update(
        &mut self,
        name: &str,
        kind: PackageKind,
        payload: &ManualPayload,
        old_record: &PackageRecord,
    ) -> Result<InstallOutcome> {
        let root = self.root();
        let Some(artifact_path) = &payload.artifact_path else {
            return Err(LoadoutError::UpdateError(match kind {
                PackageKind::Addon => "an addon folder is required for a manual update".to_string(),
                PackageKind::Plugin => "a plugin DLL is required for a manual update".to_string(),
            }));
        };

        let artifact = match kind {
            PackageKind::Addon => root.join("addons").join(name),
            PackageKind::Plugin => root.join("plugins").join(format!("{}.dll", name)),
        };
        let backup = ArtifactBackup::take(&artifact, ".manual.backup")?;
        if let Err(e) = extras::clear_extra_artifacts(&root, name) {
            warn!("clearing docs/resources for {}: {}", name, e);
        }

        let outcome = match kind {
            PackageKind::Addon => self.manual_install_addon(
                artifact_path,
                payload.docs_path.as_deref(),
                payload.resources_path.as_deref(),
                Some(name),
                None,
            ),
            PackageKind::Plugin => self.manual_install_plugin(
                artifact_path,
                payload.docs_path.as_deref(),
                payload.resources_path.as_deref(),
                Some(name),
            ),
        };

        match outcome {
            InstallOutcome::Success { .. } => {
                backup.commit();
                Ok(InstallOutcome::Success {
                    message: format!("Package \"{}\" updated manually", name),
                })
            }
            InstallOutcome::Failure { error } => {
                self.rollback_update(name, kind, backup, old_record);
                Ok(InstallOutcome::failure(LoadoutError::UpdateError(format!(
                    "manual update failed: {}",
                    error
                ))))
            }
            _ => {
                self.rollback_update(name, kind, backup, old_record);
                Ok(InstallOutcome::failure(LoadoutError::UpdateError(
                    "manual update failed: caller input required".to_string(),
                )))
            }
        }
    }

    /// Sequential batch update. Cancellation is cooperative, checked
    /// between items only; rate-limit predictability is also why this is
    /// not a parallel fan-out.
    pub fn batch_update(&mut self, names: &[String], kind: PackageKind, cancel: &CancelToken) -> BatchReport {
        let mut report = BatchReport::default();
        for name in names {
            if cancel.is_cancelled() {
                info!("batch update cancelled before {}", name);
                break;
            }
            match self.update_package(name, kind, None, None, None) {
                InstallOutcome::Success { .. } => report.updated.push(name.clone()),
                InstallOutcome::UpToDate { .. } => {
                    report.skipped.push((name.clone(), "already up to date".to_string()))
                }
                InstallOutcome::Failure { error } => report.failed.push((name.clone(), error.to_string())),
                InstallOutcome::RequiresManualUpdate { .. } => {
                    report.skipped.push((name.clone(), "manual update required".to_string()))
                }
                InstallOutcome::RequiresVariantSelection { .. } => {
                    report.skipped.push((name.clone(), "variant selection required".to_string()))
                }
                InstallOutcome::RequiresConfirmation { .. } => {
                    report.skipped.push((name.clone(), "conflict confirmation required".to_string()))
                }
                InstallOutcome::RequiresEntrypointSelection { .. } => {
                    report.skipped.push((name.clone(), "entrypoint selection required".to_string()))
                }
            }
        }
        report
    }
}
