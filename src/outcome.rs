//! Result types shared by every engine operation.
//!
//! Every install/update entry point returns an [`InstallOutcome`] instead
//! of an error: failures, conflicts and pending user decisions are all
//! variants the caller must branch on. Checkpoint variants
//! (`Requires*`) pause the pipeline; the caller re-invokes the same
//! operation with the selection filled in.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::LoadoutError;
use crate::tracker::PackageKind;

#[derive(Debug)]
pub enum InstallOutcome {
    Success {
        message: String,
    },
    /// No upstream change; nothing was touched on disk.
    UpToDate {
        message: String,
    },
    Failure {
        error: LoadoutError,
    },
    /// Shared-file conflicts were detected. Keyed by package name so a
    /// monorepo install can report every conflicting addon at once.
    /// Retry with `force = true` to proceed anyway.
    RequiresConfirmation {
        conflicts: BTreeMap<String, ConflictReport>,
    },
    /// More than one plugin variant (or release zip asset) exists and
    /// none was pre-selected.
    RequiresVariantSelection {
        variants: Vec<VariantChoice>,
        repo_url: String,
        is_release_asset: bool,
        /// Set when the selection was hit mid-update so the caller can
        /// re-invoke `update_package` rather than a fresh install.
        update_target: Option<UpdateTarget>,
    },
    /// Several `.lua` files were found and no heuristic could pick the
    /// entrypoint. Re-invoke with `selected_entrypoint`.
    RequiresEntrypointSelection {
        lua_files: Vec<String>,
        source_url: String,
        is_git: bool,
        is_release: bool,
    },
    /// The package cannot be auto-refreshed; the caller must supply a
    /// [`ManualPayload`] on a follow-up `update_package` call.
    RequiresManualUpdate {
        package: String,
        kind: PackageKind,
        reason: ManualUpdateReason,
    },
}

impl InstallOutcome {
    pub fn failure(error: LoadoutError) -> Self {
        InstallOutcome::Failure { error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InstallOutcome::Success { .. } | InstallOutcome::UpToDate { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManualUpdateReason {
    /// Installed by hand; no source to fetch from.
    ManualInstall,
    /// Release-installed but the recorded source URL is missing or
    /// "unknown".
    UnknownSource,
}

/// One shared-file category scan result. Only libs conflicts carry
/// file-level detail; docs and resources collisions are coarse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub libs: Vec<LibConflict>,
    pub docs: bool,
    pub resources: bool,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.libs.is_empty() && !self.docs && !self.resources
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibConflict {
    /// Path relative to the shared `addons/libs` tree.
    pub file: String,
    pub owner: String,
    pub owner_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantChoice {
    pub name: String,
    /// Direct download URL when the variant is a release asset.
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTarget {
    pub package: String,
    pub kind: PackageKind,
}

/// Fresh file paths for updating a package that cannot be auto-fetched.
#[derive(Debug, Clone, Default)]
pub struct ManualPayload {
    /// Addon folder (addons) or `.dll` file (plugins).
    pub artifact_path: Option<std::path::PathBuf>,
    pub docs_path: Option<std::path::PathBuf>,
    pub resources_path: Option<std::path::PathBuf>,
}

/// Aggregate result of a sequential batch update.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub updated: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Up to date, or needing caller input; `(name, reason)`.
    pub skipped: Vec<(String, String)>,
}

/// Result of the first-launch disk scan.
#[derive(Debug, Default, Serialize)]
pub struct ScanReport {
    pub addons_found: usize,
    pub plugins_found: usize,
    pub catalog_ok: bool,
    pub catalog_error: Option<String>,
    /// Human-readable reasons for packages flagged as manual installs.
    pub manual_flags: Vec<String>,
}

/// Cooperative cancellation for batch operations. Checked between
/// items only: an in-flight install or update always completes or
/// rolls back, it is never aborted halfway.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
