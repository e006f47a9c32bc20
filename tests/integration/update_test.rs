use std::path::Path;

use loadout::config::GlobalConfig;
use loadout::engine::Manager;
use loadout::outcome::{CancelToken, InstallOutcome, ManualPayload, ManualUpdateReason};
use loadout::tracker::{InstallMethod, PackageKind, PackageRecord};

fn manager_at(root: &Path) -> Manager {
    let mut config = GlobalConfig::default();
    config.general.root = root.to_path_buf();
    Manager::new(config).unwrap()
}

fn touch(path: &Path, content: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Track an addon as manually installed, with its artifact on disk.
fn seed_manual_addon(root: &Path, manager: &mut Manager, name: &str) {
    touch(&root.join(format!("addons/{}/{}.lua", name, name)), b"original");
    let record = PackageRecord::new("unknown", InstallMethod::Manual, format!("addons/{}", name));
    manager.tracker_mut().add_package(name, PackageKind::Addon, record);
    manager.tracker_mut().save().unwrap();
}

#[test]
fn manual_package_requires_manual_update() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_at(root.path());
    seed_manual_addon(root.path(), &mut manager, "Gauge");

    let outcome = manager.update_package("Gauge", PackageKind::Addon, None, None, None);
    match outcome {
        InstallOutcome::RequiresManualUpdate { package, kind, reason } => {
            assert_eq!(package, "Gauge");
            assert_eq!(kind, PackageKind::Addon);
            assert_eq!(reason, ManualUpdateReason::ManualInstall);
        }
        other => panic!("expected RequiresManualUpdate, got {:?}", other),
    }
}

#[test]
fn release_package_with_unknown_source_requires_manual_update() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_at(root.path());
    let record = PackageRecord::new("unknown", InstallMethod::Release, "plugins/Sparkle.dll");
    manager.tracker_mut().add_package("Sparkle", PackageKind::Plugin, record);

    let outcome = manager.update_package("Sparkle", PackageKind::Plugin, None, None, None);
    match outcome {
        InstallOutcome::RequiresManualUpdate { reason, .. } => {
            assert_eq!(reason, ManualUpdateReason::UnknownSource);
        }
        other => panic!("expected RequiresManualUpdate, got {:?}", other),
    }
}

#[test]
fn manual_update_applies_fresh_payload() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_at(root.path());
    seed_manual_addon(root.path(), &mut manager, "Gauge");

    let fresh = tempfile::tempdir().unwrap();
    let folder = fresh.path().join("Gauge");
    touch(&folder.join("Gauge.lua"), b"updated");

    let payload = ManualPayload {
        artifact_path: Some(folder),
        ..ManualPayload::default()
    };
    let outcome = manager.update_package("Gauge", PackageKind::Addon, None, None, Some(&payload));
    assert!(matches!(outcome, InstallOutcome::Success { .. }), "{:?}", outcome);
    assert_eq!(
        std::fs::read(root.path().join("addons/Gauge/Gauge.lua")).unwrap(),
        b"updated"
    );
    // No stale backup is left behind after a successful swap.
    assert!(!root.path().join("addons/Gauge.manual.backup").exists());
}

#[test]
fn failed_manual_update_rolls_back_files_and_record() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_at(root.path());
    seed_manual_addon(root.path(), &mut manager, "Gauge");
    let before = manager
        .tracker()
        .get_package("Gauge", PackageKind::Addon)
        .cloned()
        .unwrap();

    // The payload folder holds no entrypoint, so the re-install fails
    // after the original was moved aside.
    let fresh = tempfile::tempdir().unwrap();
    let folder = fresh.path().join("broken");
    std::fs::create_dir_all(folder.join("nothing")).unwrap();
    std::fs::create_dir_all(folder.join("else")).unwrap();

    let payload = ManualPayload {
        artifact_path: Some(folder),
        ..ManualPayload::default()
    };
    let outcome = manager.update_package("Gauge", PackageKind::Addon, None, None, Some(&payload));
    assert!(matches!(outcome, InstallOutcome::Failure { .. }), "{:?}", outcome);

    // Byte-identical pre-update state, on disk and in the tracker.
    assert_eq!(
        std::fs::read(root.path().join("addons/Gauge/Gauge.lua")).unwrap(),
        b"original"
    );
    let after = manager
        .tracker()
        .get_package("Gauge", PackageKind::Addon)
        .cloned()
        .unwrap();
    assert_eq!(before, after);
    assert!(!root.path().join("addons/Gauge.manual.backup").exists());
}

#[test]
fn update_of_untracked_package_fails() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_at(root.path());
    let outcome = manager.update_package("Ghost", PackageKind::Addon, None, None, None);
    assert!(matches!(outcome, InstallOutcome::Failure { .. }));
}

#[test]
fn batch_update_skips_manual_packages_and_honors_cancel() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_at(root.path());
    seed_manual_addon(root.path(), &mut manager, "One");
    seed_manual_addon(root.path(), &mut manager, "Two");

    let names = vec!["One".to_string(), "Two".to_string()];
    let cancel = CancelToken::new();
    let report = manager.batch_update(&names, PackageKind::Addon, &cancel);
    assert!(report.updated.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.skipped.len(), 2);
    assert!(report.skipped.iter().all(|(_, reason)| reason.contains("manual")));

    // A pre-cancelled token stops before the first item.
    cancel.cancel();
    let report = manager.batch_update(&names, PackageKind::Addon, &cancel);
    assert!(report.updated.is_empty() && report.skipped.is_empty() && report.failed.is_empty());
}

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git_in(dir: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .args([
            "-c",
            "user.email=test@example.com",
            "-c",
            "user.name=test",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn git_update_replaces_artifact_and_failed_update_rolls_back() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_at(root.path());

    let upstream = tempfile::tempdir().unwrap();
    touch(&upstream.path().join("Gauge.lua"), b"v1");
    git_in(upstream.path(), &["init"]);
    git_in(upstream.path(), &["add", "-A"]);
    git_in(upstream.path(), &["commit", "-m", "v1"]);

    let url = upstream.path().to_string_lossy().to_string();
    let outcome = manager.install_from_git(
        &url,
        PackageKind::Addon,
        &loadout::engine::InstallOptions::default(),
    );
    assert!(matches!(outcome, InstallOutcome::Success { .. }), "{:?}", outcome);

    // Upstream moves on; the local-path source is not a hosted API, so
    // the freshness check cannot short-circuit and the update re-runs
    // the pipeline.
    touch(&upstream.path().join("Gauge.lua"), b"v2");
    git_in(upstream.path(), &["add", "-A"]);
    git_in(upstream.path(), &["commit", "-m", "v2"]);

    let outcome = manager.update_package("Gauge", PackageKind::Addon, None, None, None);
    assert!(matches!(outcome, InstallOutcome::Success { .. }), "{:?}", outcome);
    assert_eq!(
        std::fs::read(root.path().join("addons/Gauge/Gauge.lua")).unwrap(),
        b"v2"
    );
    assert!(!root.path().join("addons/Gauge.backup").exists());

    // Kill the upstream: the next update's clone fails and everything
    // is restored.
    let before = manager
        .tracker()
        .get_package("Gauge", PackageKind::Addon)
        .cloned()
        .unwrap();
    drop(upstream);

    let outcome = manager.update_package("Gauge", PackageKind::Addon, None, None, None);
    assert!(matches!(outcome, InstallOutcome::Failure { .. }), "{:?}", outcome);
    assert_eq!(
        std::fs::read(root.path().join("addons/Gauge/Gauge.lua")).unwrap(),
        b"v2"
    );
    let after = manager
        .tracker()
        .get_package("Gauge", PackageKind::Addon)
        .cloned()
        .unwrap();
    assert_eq!(before, after);
    assert!(!root.path().join("addons/Gauge.backup").exists());
}
