//! Installed-package ledger.
//!
//! A versioned JSON document (`loadout-packages.json` under the managed
//! root) maps package names to [`PackageRecord`]s, separately for addons
//! and plugins, plus a free-form settings map. The engine mutates
//! records in place through [`PackageTracker::get_package_mut`] and
//! flushes with an explicit [`PackageTracker::save`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LoadoutError, Result};

pub const TRACKER_FILE: &str = "loadout-packages.json";
const TRACKER_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Addon,
    Plugin,
}

impl PackageKind {
    pub fn label(&self) -> &'static str {
        match self {
            PackageKind::Addon => "addon",
            PackageKind::Plugin => "plugin",
        }
    }
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallMethod {
    PreInstalled,
    Git,
    Release,
    Manual,
}

/// One installed package. The `lib_files`/`doc_files`/`resource_files`
/// lists are the package's ownership ledger over the shared folders:
/// conflict detection and removal reason about these lists, never about
/// the filesystem at removal time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Origin URL, or the literal "unknown" for manual installs.
    pub source: String,
    pub install_method: InstallMethod,
    pub installed_date: String,
    /// Relative path of the primary artifact: a directory for addons, a
    /// single file for plugins. Forward slashes on every platform.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_asset_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lib_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub doc_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_files: Vec<String>,
}

impl PackageRecord {
    pub fn new(source: impl Into<String>, install_method: InstallMethod, path: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            install_method,
            installed_date: chrono::Utc::now().to_rfc3339(),
            path: path.into(),
            commit: None,
            branch: None,
            release_tag: None,
            release_asset_name: None,
            lib_files: Vec::new(),
            doc_files: Vec::new(),
            resource_files: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TrackerDoc {
    version: String,
    last_updated: String,
    #[serde(default)]
    addons: BTreeMap<String, PackageRecord>,
    #[serde(default)]
    plugins: BTreeMap<String, PackageRecord>,
    #[serde(default)]
    settings: BTreeMap<String, serde_json::Value>,
}

impl TrackerDoc {
    fn empty() -> Self {
        Self {
            version: TRACKER_VERSION.to_string(),
            last_updated: chrono::Utc::now().to_rfc3339(),
            addons: BTreeMap::new(),
            plugins: BTreeMap::new(),
            settings: BTreeMap::new(),
        }
    }
}

pub struct PackageTracker {
    file: PathBuf,
    doc: TrackerDoc,
}

impl PackageTracker {
    /// Open the ledger under `root`, creating an empty document when the
    /// file is missing. An unreadable or corrupt file also yields an
    /// empty document (it will be rewritten on the next save) rather
    /// than wedging every operation.
    pub fn open(root: &Path) -> Self {
        let file = root.join(TRACKER_FILE);
        let doc = match std::fs::read_to_string(&file) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("tracker file {} is corrupt ({}), starting empty", file.display(), e);
                    TrackerDoc::empty()
                }
            },
            Err(_) => TrackerDoc::empty(),
        };
        Self { file, doc }
    }

    pub fn save(&mut self) -> Result<()> {
        self.doc.last_updated = chrono::Utc::now().to_rfc3339();
        let content = serde_json::to_string_pretty(&self.doc)?;
        std::fs::write(&self.file, content).map_err(|e| {
            LoadoutError::TrackerError(format!("failed to write {}: {}", self.file.display(), e))
        })
    }

    fn map(&self, kind: PackageKind) -> &BTreeMap<String, PackageRecord> {
        match kind {
            PackageKind::Addon => &self.doc.addons,
            PackageKind::Plugin => &self.doc.plugins,
        }
    }

    fn map_mut(&mut self, kind: PackageKind) -> &mut BTreeMap<String, PackageRecord> {
        match kind {
            PackageKind::Addon => &mut self.doc.addons,
            PackageKind::Plugin => &mut self.doc.plugins,
        }
    }

    pub fn get_package(&self, name: &str, kind: PackageKind) -> Option<&PackageRecord> {
        self.map(kind).get(name)
    }

    pub fn get_package_mut(&mut self, name: &str, kind: PackageKind) -> Option<&mut PackageRecord> {
        self.map_mut(kind).get_mut(name)
    }

    /// Upsert. Does not persist; call [`save`](Self::save) when the
    /// operation's mutations are complete.
    pub fn add_package(&mut self, name: &str, kind: PackageKind, record: PackageRecord) {
        self.map_mut(kind).insert(name.to_string(), record);
    }

    /// Returns false when the package was not tracked.
    pub fn remove_package(&mut self, name: &str, kind: PackageKind) -> bool {
        self.map_mut(kind).remove(name).is_some()
    }

    pub fn package_exists(&self, name: &str, kind: PackageKind) -> bool {
        self.map(kind).contains_key(name)
    }

    pub fn addons(&self) -> &BTreeMap<String, PackageRecord> {
        &self.doc.addons
    }

    pub fn plugins(&self) -> &BTreeMap<String, PackageRecord> {
        &self.doc.plugins
    }

    pub fn package_counts(&self) -> (usize, usize) {
        (self.doc.addons.len(), self.doc.plugins.len())
    }

    /// True when a root is configured but nothing is tracked yet; the
    /// caller should offer a disk scan.
    pub fn is_first_launch(&self) -> bool {
        self.doc.addons.is_empty() && self.doc.plugins.is_empty()
    }

    pub fn get_setting(&self, key: &str) -> Option<&serde_json::Value> {
        self.doc.settings.get(key)
    }

    pub fn set_setting(&mut self, key: &str, value: serde_json::Value) -> Result<()> {
        self.doc.settings.insert(key.to_string(), value);
        self.save()
    }

    /// Write the whole document to `output` (settings included).
    pub fn export_to(&self, output: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.doc)?;
        std::fs::write(output, content).map_err(|e| {
            LoadoutError::TrackerError(format!("failed to write {}: {}", output.display(), e))
        })
    }

    /// Replace the document with one previously exported. The input must
    /// parse as a full tracker document; a bad file leaves the current
    /// state untouched.
    pub fn import_from(&mut self, input: &Path) -> Result<()> {
        let content = std::fs::read_to_string(input).map_err(|e| {
            LoadoutError::TrackerError(format!("failed to read {}: {}", input.display(), e))
        })?;
        let doc: TrackerDoc = serde_json::from_str(&content)
            .map_err(|e| LoadoutError::TrackerError(format!("invalid tracker document: {}", e)))?;
        self.doc = doc;
        self.save()
    }
}
