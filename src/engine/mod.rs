//! Install engine and the [`Manager`] entry point.
//!
//! Both fetch strategies (git clone, GitHub release) materialize a local
//! source tree and feed the same per-tree pipeline: detect the
//! package(s), check conflicts against tracked state, place the primary
//! artifact, record metadata, then merge shared folders and record their
//! ownership. Checkpoints (conflicts, plugin variants, ambiguous
//! entrypoints) pause the pipeline and are returned to the caller
//! instead of being resolved by guessing.

pub mod conflict;
pub mod extras;
pub mod remove;
pub mod scan;
pub mod transaction;
pub mod update;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::detect::{self, AddonDetection};
use crate::error::{LoadoutError, Result};
use crate::github::{AssetResolution, GithubClient};
use crate::outcome::{InstallOutcome, VariantChoice};
use crate::tracker::{InstallMethod, PackageKind, PackageRecord, PackageTracker};
use crate::util::{download, fsops};
use crate::{git, github};

/// Options shared by the install entry points. Checkpoint answers
/// (`plugin_variant`, `selected_entrypoint`, `asset_url`) are filled in
/// when the caller re-invokes after an [`InstallOutcome`] asked for a
/// decision.
#[derive(Debug, Default, Clone)]
pub struct InstallOptions {
    /// Specific package to extract from a multi-package tree.
    pub target_name: Option<String>,
    /// Branch to clone (git installs only).
    pub branch: Option<String>,
    /// Skip conflict checking.
    pub force: bool,
    pub plugin_variant: Option<String>,
    pub selected_entrypoint: Option<String>,
    /// Direct asset download URL (release installs only).
    pub asset_url: Option<String>,
    /// Preferred asset name (release installs only).
    pub asset_name: Option<String>,
}

/// Where a source tree came from, and what to record about it.
#[derive(Debug, Clone)]
struct SourceMeta {
    url: String,
    commit: Option<String>,
    branch: Option<String>,
    release_tag: Option<String>,
    release_asset_name: Option<String>,
}

impl SourceMeta {
    fn install_method(&self) -> InstallMethod {
        if self.commit.is_some() {
            InstallMethod::Git
        } else {
            InstallMethod::Release
        }
    }
}

/// A directory inside a plugin repository holding `.dll` builds, e.g.
/// per-architecture output folders.
#[derive(Debug, Clone)]
pub struct PluginVariant {
    pub name: String,
    pub path: PathBuf,
    pub dlls: Vec<PathBuf>,
}

/// Every directory below `tree` that directly contains `.dll` files.
pub fn find_plugin_variants(tree: &Path) -> Vec<PluginVariant> {
    let mut variants = Vec::new();
    for entry in walkdir::WalkDir::new(tree)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .flatten()
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let mut dlls: Vec<PathBuf> = std::fs::read_dir(entry.path())
            .into_iter()
            .flatten()
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .map(|e| e.eq_ignore_ascii_case("dll"))
                        .unwrap_or(false)
            })
            .collect();
        if dlls.is_empty() {
            continue;
        }
        dlls.sort();
        variants.push(PluginVariant {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().to_path_buf(),
            dlls,
        });
    }
    variants
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| LoadoutError::ArchiveError(format!("invalid zip archive: {}", e)))?;
    archive
        .extract(dest)
        .map_err(|e| LoadoutError::ArchiveError(format!("failed to extract archive: {}", e)))
}

pub struct Manager {
    config: GlobalConfig,
    tracker: PackageTracker,
    github: GithubClient,
    /// Branch of the managed installation itself, used for official-repo
    /// catalog and update queries.
    official_branch: String,
}

impl Manager {
    pub fn new(config: GlobalConfig) -> Result<Self> {
        let root = config.general.root.clone();
        std::fs::create_dir_all(root.join("addons"))?;
        std::fs::create_dir_all(root.join("plugins"))?;
        std::fs::create_dir_all(root.join("docs"))?;

        let tracker = PackageTracker::open(&root);
        let github = GithubClient::new(&config.network, &config.upstream)?;
        let official_branch =
            git::current_branch(&root).unwrap_or_else(|| config.upstream.default_branch.clone());

        Ok(Self {
            config,
            tracker,
            github,
            official_branch,
        })
    }

    pub fn root(&self) -> PathBuf {
        self.config.general.root.clone()
    }

    pub fn official_repo(&self) -> &str {
        &self.config.upstream.official_repo
    }

    pub fn official_branch(&self) -> &str {
        &self.official_branch
    }

    pub fn tracker(&self) -> &PackageTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut PackageTracker {
        &mut self.tracker
    }

    pub(crate) fn github(&self) -> &GithubClient {
        &self.github
    }

    fn addons_dir(&self) -> PathBuf {
        self.config.general.root.join("addons")
    }

    fn plugins_dir(&self) -> PathBuf {
        self.config.general.root.join("plugins")
    }

    /// Remote branch names for `repo_url`, with the detected base branch
    /// promoted to the front as the default suggestion.
    pub fn list_remote_branches(&self, repo_url: &str) -> Result<Vec<String>> {
        git::list_remote_branches(repo_url, Some(&self.official_branch))
    }

    // -----------------------------------------------------------------
    // Install from git
    // -----------------------------------------------------------------

    pub fn install_from_git(&mut self, url: &str, kind: PackageKind, opts: &InstallOptions) -> InstallOutcome {
        match self.install_from_git_inner(url, kind, opts) {
            Ok(outcome) => outcome,
            Err(error) => InstallOutcome::failure(error),
        }
    }

    fn install_from_git_inner(
        &mut self,
        url: &str,
        kind: PackageKind,
        opts: &InstallOptions,
    ) -> Result<InstallOutcome> {
        let temp = tempfile::tempdir()?;
        let repo_path = temp.path().join("repo");
        info!("cloning {}", url);
        git::clone(url, &repo_path, opts.branch.as_deref())?;

        let meta = SourceMeta {
            url: url.to_string(),
            commit: Some(git::head_commit(&repo_path)?),
            branch: Some(git::head_branch(&repo_path)?),
            release_tag: None,
            release_asset_name: None,
        };

        match kind {
            PackageKind::Addon => self.install_addons_from_tree(&repo_path, &meta, opts),
            PackageKind::Plugin => self.install_plugin_from_tree(&repo_path, &meta, opts),
        }
    }

    // -----------------------------------------------------------------
    // Install from a GitHub release
    // -----------------------------------------------------------------

    pub fn install_from_release(&mut self, url: &str, kind: PackageKind, opts: &InstallOptions) -> InstallOutcome {
        match self.install_from_release_inner(url, kind, opts) {
            Ok(outcome) => outcome,
            Err(error) => InstallOutcome::failure(error),
        }
    }

    fn install_from_release_inner(
        &mut self,
        url: &str,
        kind: PackageKind,
        opts: &InstallOptions,
    ) -> Result<InstallOutcome> {
        let (download_url, asset_name, release_tag) = match &opts.asset_url {
            Some(direct) => {
                let name = opts
                    .asset_name
                    .clone()
                    .or_else(|| github::infer_asset_name(direct));
                (direct.clone(), name, self.github.latest_release_tag(url))
            }
            None => match self.github.resolve_release_asset(url, opts.asset_name.as_deref())? {
                (AssetResolution::MultipleAssets(assets), _) => {
                    return Ok(InstallOutcome::RequiresVariantSelection {
                        variants: assets
                            .into_iter()
                            .map(|a| VariantChoice {
                                name: a.name,
                                url: Some(a.browser_download_url),
                            })
                            .collect(),
                        repo_url: url.to_string(),
                        is_release_asset: true,
                        update_target: None,
                    });
                }
                (AssetResolution::Download { url: dl, name }, tag) => (dl, name, tag),
            },
        };

        let temp = tempfile::tempdir()?;
        let zip_path = temp.path().join("release.zip");
        info!("downloading {}", download_url);
        download::download_file(&download_url, &zip_path, self.config.network.download_timeout)?;

        // A bare .dll asset is a plugin binary; no archive to extract.
        if let Some(name) = asset_name.as_deref() {
            if name.to_lowercase().ends_with(".dll") {
                if kind != PackageKind::Plugin {
                    return Err(LoadoutError::InstallError(
                        "cannot install an addon from a .dll asset; expected a .zip archive".to_string(),
                    ));
                }
                let dll_path = temp.path().join(name);
                std::fs::rename(&zip_path, &dll_path)?;
                let meta = SourceMeta {
                    url: url.to_string(),
                    commit: None,
                    branch: None,
                    release_tag: Some(release_tag),
                    release_asset_name: Some(name.to_string()),
                };
                return self.install_plugin_dll(&dll_path, None, &meta);
            }
        }

        let extract_path = temp.path().join("extracted");
        extract_zip(&zip_path, &extract_path)?;

        let meta = SourceMeta {
            url: url.to_string(),
            commit: None,
            branch: None,
            release_tag: Some(release_tag),
            release_asset_name: asset_name,
        };

        match kind {
            PackageKind::Addon => self.install_addons_from_tree(&extract_path, &meta, opts),
            PackageKind::Plugin => self.install_plugin_from_tree(&extract_path, &meta, opts),
        }
    }

    // -----------------------------------------------------------------
    // Shared per-tree pipeline: addons
    // -----------------------------------------------------------------

    fn install_addons_from_tree(
        &mut self,
        tree: &Path,
        meta: &SourceMeta,
        opts: &InstallOptions,
    ) -> Result<InstallOutcome> {
        let all = detect::detect_all_addons(tree);

        if all.len() > 1 && opts.target_name.is_none() {
            return self.install_monorepo(tree, meta, &all, opts.force);
        }
        self.install_single_addon_flow(tree, meta, opts)
    }

    fn install_monorepo(
        &mut self,
        tree: &Path,
        meta: &SourceMeta,
        addons: &[(String, PathBuf)],
        force: bool,
    ) -> Result<InstallOutcome> {
        let root = self.root();

        if !force {
            let mut conflicts = BTreeMap::new();
            for (name, _) in addons {
                let report =
                    conflict::check_file_conflicts(&self.tracker, &root, tree, name, Some(&meta.url))?;
                if !report.is_empty() {
                    conflicts.insert(name.clone(), report);
                }
            }
            if !conflicts.is_empty() {
                return Ok(InstallOutcome::RequiresConfirmation { conflicts });
            }
        }

        // One addon failing must not block the others.
        let mut installed = 0usize;
        let mut failed = Vec::new();
        let mut warnings = Vec::new();
        for (name, addon_path) in addons {
            match self.install_one_addon(name, addon_path, tree, meta) {
                Ok(addon_warnings) => {
                    installed += 1;
                    for w in addon_warnings {
                        warnings.push(format!("{}: {}", name, w));
                    }
                }
                Err(e) => failed.push(format!("{}: {}", name, e)),
            }
        }
        self.tracker.save()?;

        if installed > 0 {
            let mut message = format!("Installed {} addon(s) from monorepo", installed);
            if !failed.is_empty() {
                message.push_str(&format!(" ({} failed)", failed.len()));
                for failure in &failed {
                    message.push('\n');
                    message.push_str(failure);
                }
            }
            for warning in &warnings {
                message.push('\n');
                message.push_str(warning);
            }
            Ok(InstallOutcome::Success { message })
        } else {
            let mut message = "Failed to install addons:".to_string();
            for failure in &failed {
                message.push('\n');
                message.push_str(failure);
            }
            Ok(InstallOutcome::failure(LoadoutError::InstallError(message)))
        }
    }

    fn install_single_addon_flow(
        &mut self,
        tree: &Path,
        meta: &SourceMeta,
        opts: &InstallOptions,
    ) -> Result<InstallOutcome> {
        let root = self.root();
        let detection = detect::detect_addon_structure(tree, opts.target_name.as_deref(), Some(&meta.url));

        let (name, addon_path) = match detection {
            AddonDetection::Found { name, path, .. } => (name, path),
            AddonDetection::Ambiguous { lua_files, path } => match &opts.selected_entrypoint {
                // Never guess between candidates; ask the caller.
                None => {
                    return Ok(InstallOutcome::RequiresEntrypointSelection {
                        lua_files,
                        source_url: meta.url.clone(),
                        is_git: meta.commit.is_some(),
                        is_release: meta.release_tag.is_some(),
                    })
                }
                Some(selected) => (selected.clone(), path),
            },
            AddonDetection::NotFound => {
                return Err(LoadoutError::StructureNotFound(
                    "could not detect addon structure".to_string(),
                ))
            }
        };

        let target_dir = self.addons_dir().join(&name);
        if target_dir.exists() && !self.may_replace_existing(&name, PackageKind::Addon, &meta.url) {
            return Err(LoadoutError::AlreadyExists {
                kind: "addon".to_string(),
                name,
            });
        }

        if !opts.force {
            let report =
                conflict::check_file_conflicts(&self.tracker, &root, tree, &name, Some(&meta.url))?;
            if !report.is_empty() {
                let mut conflicts = BTreeMap::new();
                conflicts.insert(name, report);
                return Ok(InstallOutcome::RequiresConfirmation { conflicts });
            }
        }

        let warnings = self.install_one_addon(&name, &addon_path, tree, meta)?;
        self.tracker.save()?;

        let mut message = format!("Addon \"{}\" installed successfully", name);
        if !warnings.is_empty() {
            message.push_str(&format!(" (with warnings: {})", warnings.join("; ")));
        }
        Ok(InstallOutcome::Success { message })
    }

    /// Place one addon and record it. Conflict checking is the caller's
    /// responsibility; existence (and the official-repo replace rule) is
    /// handled here. Returns extras warnings.
    fn install_one_addon(
        &mut self,
        name: &str,
        addon_path: &Path,
        tree: &Path,
        meta: &SourceMeta,
    ) -> Result<Vec<String>> {
        let root = self.root();
        let target_dir = self.addons_dir().join(name);

        if target_dir.exists() {
            if self.may_replace_existing(name, PackageKind::Addon, &meta.url) {
                fsops::remove_dir_all_robust(&target_dir)?;
            } else {
                return Err(LoadoutError::AlreadyExists {
                    kind: "addon".to_string(),
                    name: name.to_string(),
                });
            }
        }

        fsops::copy_dir_recursive(addon_path, &target_dir)?;

        let record = self.build_record(name, PackageKind::Addon, meta, Some(tree));
        self.tracker.add_package(name, PackageKind::Addon, record);

        let warnings = extras::copy_extra_folders(&mut self.tracker, &root, tree, name, PackageKind::Addon);
        info!("installed addon {}", name);
        Ok(warnings)
    }

    /// An existing artifact may only be silently replaced when both the
    /// tracked package and the incoming install point at the official
    /// repository — that is how official-bundle re-installs avoid
    /// spurious "already exists" errors. Third-party files are never
    /// overwritten.
    fn may_replace_existing(&self, name: &str, kind: PackageKind, incoming_url: &str) -> bool {
        if incoming_url != self.official_repo() {
            return false;
        }
        self.tracker
            .get_package(name, kind)
            .map(|record| record.source == self.official_repo())
            .unwrap_or(false)
    }

    // -----------------------------------------------------------------
    // Shared per-tree pipeline: plugins
    // -----------------------------------------------------------------

    fn install_plugin_from_tree(
        &mut self,
        tree: &Path,
        meta: &SourceMeta,
        opts: &InstallOptions,
    ) -> Result<InstallOutcome> {
        // The official repo has a fixed plugins/ layout; variants are a
        // third-party concept.
        if meta.url == self.official_repo() {
            return self.install_plugin_standard(tree, meta, opts.target_name.as_deref());
        }

        let variants = find_plugin_variants(tree);
        let selected = if let Some(wanted) = &opts.plugin_variant {
            match variants.iter().find(|v| &v.name == wanted) {
                Some(variant) => Some(variant.clone()),
                None => {
                    return Err(LoadoutError::InstallError(format!(
                        "plugin variant \"{}\" not found in repository",
                        wanted
                    )))
                }
            }
        } else if variants.len() == 1 {
            Some(variants[0].clone())
        } else if variants.len() > 1 {
            return Ok(InstallOutcome::RequiresVariantSelection {
                variants: variants
                    .into_iter()
                    .map(|v| VariantChoice { name: v.name, url: None })
                    .collect(),
                repo_url: meta.url.clone(),
                is_release_asset: false,
                update_target: None,
            });
        } else {
            None
        };

        match selected {
            Some(variant) => self.install_plugin_dll(&variant.dlls[0], Some(tree), meta),
            None => self.install_plugin_standard(tree, meta, opts.target_name.as_deref()),
        }
    }

    fn install_plugin_standard(
        &mut self,
        tree: &Path,
        meta: &SourceMeta,
        target_name: Option<&str>,
    ) -> Result<InstallOutcome> {
        let detection = detect::detect_plugin_structure(tree, target_name).ok_or_else(|| {
            LoadoutError::StructureNotFound("could not detect plugin structure (.dll file)".to_string())
        })?;
        self.install_plugin_dll(&detection.dll_path, Some(tree), meta)
    }

    fn install_plugin_dll(
        &mut self,
        dll_path: &Path,
        tree: Option<&Path>,
        meta: &SourceMeta,
    ) -> Result<InstallOutcome> {
        let root = self.root();
        let name = dll_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| LoadoutError::StructureNotFound("plugin file has no name".to_string()))?;

        let target_dll = self.plugins_dir().join(format!("{}.dll", name));
        if target_dll.exists() {
            if self.may_replace_existing(&name, PackageKind::Plugin, &meta.url) {
                fsops::remove_file_if_exists(&target_dll)?;
            } else {
                return Err(LoadoutError::AlreadyExists {
                    kind: "plugin".to_string(),
                    name,
                });
            }
        }

        std::fs::copy(dll_path, &target_dll).map_err(|e| {
            LoadoutError::InstallError(format!(
                "failed to copy {} to {}: {}",
                dll_path.display(),
                target_dll.display(),
                e
            ))
        })?;

        let record = self.build_record(&name, PackageKind::Plugin, meta, tree);
        self.tracker.add_package(&name, PackageKind::Plugin, record);

        if let Some(tree) = tree {
            let warnings =
                extras::copy_extra_folders(&mut self.tracker, &root, tree, &name, PackageKind::Plugin);
            for warning in warnings {
                warn!("extras for plugin {}: {}", name, warning);
            }
        }
        self.tracker.save()?;

        info!("installed plugin {}", name);
        Ok(InstallOutcome::Success {
            message: format!("Plugin \"{}\" installed successfully", name),
        })
    }

    fn build_record(
        &self,
        name: &str,
        kind: PackageKind,
        meta: &SourceMeta,
        tree: Option<&Path>,
    ) -> PackageRecord {
        let artifact_path = match kind {
            PackageKind::Addon => format!("addons/{}", name),
            PackageKind::Plugin => format!("plugins/{}.dll", name),
        };
        let mut record = PackageRecord::new(meta.url.clone(), meta.install_method(), artifact_path.clone());
        record.release_asset_name = meta.release_asset_name.clone();
        record.release_tag = meta.release_tag.clone();

        if let Some(commit) = &meta.commit {
            // For the official monorepo, the folder-specific commit is
            // what staleness checks compare against later.
            let resolved = if meta.url == self.official_repo() {
                tree.and_then(|t| git::last_commit_for_path(t, &artifact_path))
                    .unwrap_or_else(|| commit.clone())
            } else {
                commit.clone()
            };
            record.commit = Some(resolved);
            record.branch = meta.branch.clone();
        }
        record
    }

    // -----------------------------------------------------------------
    // Manual installs
    // -----------------------------------------------------------------

    pub fn manual_install_addon(
        &mut self,
        addon_path: &Path,
        docs_path: Option<&Path>,
        resources_path: Option<&Path>,
        expected_name: Option<&str>,
        selected_entrypoint: Option<&str>,
    ) -> InstallOutcome {
        match self.manual_install_addon_inner(addon_path, docs_path, resources_path, expected_name, selected_entrypoint)
        {
            Ok(outcome) => outcome,
            Err(error) => InstallOutcome::failure(error),
        }
    }

    fn manual_install_addon_inner(
        &mut self,
        addon_path: &Path,
        docs_path: Option<&Path>,
        resources_path: Option<&Path>,
        expected_name: Option<&str>,
        selected_entrypoint: Option<&str>,
    ) -> Result<InstallOutcome> {
        let root = self.root();
        if !addon_path.exists() {
            return Err(LoadoutError::PackageNotFound(format!(
                "selected addon folder does not exist: {}",
                addon_path.display()
            )));
        }

        let detection = detect::detect_addon_structure(addon_path, None, None);
        let (name, source_dir) = match detection {
            AddonDetection::Found { name, path, .. } => (name, path),
            AddonDetection::Ambiguous { lua_files, path } => match selected_entrypoint {
                None => {
                    return Ok(InstallOutcome::RequiresEntrypointSelection {
                        lua_files,
                        source_url: addon_path.display().to_string(),
                        is_git: false,
                        is_release: false,
                    })
                }
                Some(selected) => (selected.to_string(), path),
            },
            AddonDetection::NotFound => {
                return Err(LoadoutError::StructureNotFound(
                    "could not detect an addon entry point in the selected folder".to_string(),
                ))
            }
        };

        if let Some(expected) = expected_name {
            if !name.eq_ignore_ascii_case(expected) {
                return Err(LoadoutError::InstallError(format!(
                    "selected addon \"{}\" does not match \"{}\"",
                    name, expected
                )));
            }
        }

        let target_dir = self.addons_dir().join(&name);
        if target_dir.exists() {
            return Err(LoadoutError::AlreadyExists {
                kind: "addon".to_string(),
                name,
            });
        }

        // Guard against copying a folder into itself; the source may
        // already live under the managed addons directory.
        if let (Ok(source_abs), Ok(addons_abs)) = (source_dir.canonicalize(), self.addons_dir().canonicalize()) {
            let target_abs = addons_abs.join(&name);
            if source_abs == target_abs {
                return Err(LoadoutError::InstallError(format!(
                    "addon \"{}\" is already installed in the correct location",
                    name
                )));
            }
            if source_abs.starts_with(&target_abs) || target_abs.starts_with(&source_abs) {
                return Err(LoadoutError::InstallError(
                    "cannot copy addon: source and destination are nested within each other".to_string(),
                ));
            }
        }

        fsops::copy_dir_recursive(&source_dir, &target_dir)?;

        let mut record = PackageRecord::new("unknown", InstallMethod::Manual, format!("addons/{}", name));
        if let Err(e) = extras::clear_extra_artifacts(&root, &name) {
            warn!("clearing stale docs/resources for {}: {}", name, e);
        }

        if let Some(docs) = docs_path {
            match extras::copy_manual_docs(&root, docs, &name) {
                Ok(doc_files) => record.doc_files = doc_files,
                Err(e) => {
                    self.undo_manual_artifact(&target_dir, &name, &root);
                    return Err(LoadoutError::InstallError(format!(
                        "failed to copy documentation: {}",
                        e
                    )));
                }
            }
        }

        if let Some(resources) = resources_path {
            match extras::copy_manual_resources(&root, resources, &name) {
                Ok(resource_files) => record.resource_files = resource_files,
                Err(e) => {
                    self.undo_manual_artifact(&target_dir, &name, &root);
                    return Err(LoadoutError::InstallError(format!(
                        "failed to copy resources: {}",
                        e
                    )));
                }
            }
        }

        self.tracker.add_package(&name, PackageKind::Addon, record);
        self.tracker.save()?;

        Ok(InstallOutcome::Success {
            message: format!("Addon \"{}\" installed manually", name),
        })
    }

    pub fn manual_install_plugin(
        &mut self,
        dll_path: &Path,
        docs_path: Option<&Path>,
        resources_path: Option<&Path>,
        expected_name: Option<&str>,
    ) -> InstallOutcome {
        match self.manual_install_plugin_inner(dll_path, docs_path, resources_path, expected_name) {
            Ok(outcome) => outcome,
            Err(error) => InstallOutcome::failure(error),
        }
    }

    fn manual_install_plugin_inner(
        &mut self,
        dll_path: &Path,
        docs_path: Option<&Path>,
        resources_path: Option<&Path>,
        expected_name: Option<&str>,
    ) -> Result<InstallOutcome> {
        let root = self.root();
        let valid = dll_path.is_file()
            && dll_path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("dll"))
                .unwrap_or(false);
        if !valid {
            return Err(LoadoutError::InstallError(
                "please select a valid .dll file".to_string(),
            ));
        }

        let name = dll_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(expected) = expected_name {
            if !name.eq_ignore_ascii_case(expected) {
                return Err(LoadoutError::InstallError(format!(
                    "selected plugin \"{}\" does not match \"{}\"",
                    name, expected
                )));
            }
        }

        let target_dll = self.plugins_dir().join(format!("{}.dll", name));
        if target_dll.exists() {
            return Err(LoadoutError::AlreadyExists {
                kind: "plugin".to_string(),
                name,
            });
        }

        std::fs::copy(dll_path, &target_dll)?;

        let mut record =
            PackageRecord::new("unknown", InstallMethod::Manual, format!("plugins/{}.dll", name));
        if let Err(e) = extras::clear_extra_artifacts(&root, &name) {
            warn!("clearing stale docs/resources for {}: {}", name, e);
        }

        if let Some(docs) = docs_path {
            match extras::copy_manual_docs(&root, docs, &name) {
                Ok(doc_files) => record.doc_files = doc_files,
                Err(e) => {
                    self.undo_manual_artifact(&target_dll, &name, &root);
                    return Err(LoadoutError::InstallError(format!(
                        "failed to copy documentation: {}",
                        e
                    )));
                }
            }
        }

        if let Some(resources) = resources_path {
            match extras::copy_manual_resources(&root, resources, &name) {
                Ok(resource_files) => record.resource_files = resource_files,
                Err(e) => {
                    self.undo_manual_artifact(&target_dll, &name, &root);
                    return Err(LoadoutError::InstallError(format!(
                        "failed to copy resources: {}",
                        e
                    )));
                }
            }
        }

        self.tracker.add_package(&name, PackageKind::Plugin, record);
        self.tracker.save()?;

        Ok(InstallOutcome::Success {
            message: format!("Plugin \"{}\" installed manually", name),
        })
    }

    /// Best-effort cleanup after a failed manual install: remove the
    /// half-placed artifact and any docs/resources already copied.
    fn undo_manual_artifact(&self, artifact: &Path, name: &str, root: &Path) {
        let result = if artifact.is_dir() {
            fsops::remove_dir_all_robust(artifact)
        } else {
            fsops::remove_file_if_exists(artifact)
        };
        if let Err(e) = result {
            warn!("cleanup of {} failed: {}", artifact.display(), e);
        }
        if let Err(e) = extras::clear_extra_artifacts(root, name) {
            warn!("cleanup of docs/resources for {} failed: {}", name, e);
        }
    }

    // -----------------------------------------------------------------
    // Package kind auto-detection
    // -----------------------------------------------------------------

    /// Clone shallowly and probe the tree: plugin beats addon, an
    /// ambiguous addon tree still counts as an addon.
    pub fn detect_package_type(&self, url: &str) -> Result<Option<PackageKind>> {
        let temp = tempfile::tempdir()?;
        let repo_path = temp.path().join("repo");
        git::clone_shallow(url, &repo_path)?;
        Ok(probe_tree_kind(&repo_path))
    }

    /// Same probe against the latest release's best asset.
    pub fn detect_package_type_from_release(&self, url: &str) -> Result<Option<PackageKind>> {
        let (resolution, _tag) = self.github.resolve_release_asset(url, None)?;
        let (download_url, asset_name) = match resolution {
            AssetResolution::Download { url, name } => (url, name),
            AssetResolution::MultipleAssets(assets) => {
                let first = &assets[0];
                (first.browser_download_url.clone(), Some(first.name.clone()))
            }
        };

        if let Some(name) = asset_name.as_deref() {
            if name.to_lowercase().ends_with(".dll") {
                return Ok(Some(PackageKind::Plugin));
            }
        }

        let temp = tempfile::tempdir()?;
        let zip_path = temp.path().join("release.zip");
        download::download_file(&download_url, &zip_path, self.config.network.download_timeout)?;
        let extract_path = temp.path().join("extracted");
        extract_zip(&zip_path, &extract_path)?;
        Ok(probe_tree_kind(&extract_path))
    }
}

fn probe_tree_kind(tree: &Path) -> Option<PackageKind> {
    if detect::detect_plugin_structure(tree, None).is_some() {
        return Some(PackageKind::Plugin);
    }
    match detect::detect_addon_structure(tree, None, None) {
        AddonDetection::Found { .. } | AddonDetection::Ambiguous { .. } => Some(PackageKind::Addon),
        AddonDetection::NotFound => None,
    }
}
