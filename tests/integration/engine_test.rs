use std::path::Path;

use loadout::config::GlobalConfig;
use loadout::engine::{InstallOptions, Manager};
use loadout::outcome::InstallOutcome;
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

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git_in(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
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
        status.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&status.stderr)
    );
}

fn commit_all(dir: &Path, message: &str) {
    git_in(dir, &["add", "-A"]);
    git_in(dir, &["commit", "-m", message]);
}

#[test]
fn manual_addon_install_and_removal() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_at(root.path());

    let picked = tempfile::tempdir().unwrap();
    let addon = picked.path().join("Tracker");
    touch(&addon.join("Tracker.lua"), b"entry");

    let docs = picked.path().join("docs");
    touch(&docs.join("readme.txt"), b"doc");

    let outcome = manager.manual_install_addon(&addon, Some(&docs), None, None, None);
    assert!(matches!(outcome, InstallOutcome::Success { .. }));
    assert!(root.path().join("addons/Tracker/Tracker.lua").is_file());
    assert!(root.path().join("docs/Tracker/readme.txt").is_file());

    let record = manager.tracker().get_package("Tracker", PackageKind::Addon).unwrap();
    assert_eq!(record.install_method, InstallMethod::Manual);
    assert_eq!(record.source, "unknown");
    assert_eq!(record.doc_files, vec!["docs/Tracker/readme.txt"]);

    // Second manual install of the same addon is rejected.
    let outcome = manager.manual_install_addon(&addon, None, None, None, None);
    assert!(matches!(outcome, InstallOutcome::Failure { .. }));

    let message = manager.remove_package("Tracker", PackageKind::Addon).unwrap();
    assert!(message.contains("removed"));
    assert!(!root.path().join("addons/Tracker").exists());
    assert!(!root.path().join("docs/Tracker/readme.txt").exists());
    assert!(!manager.tracker().package_exists("Tracker", PackageKind::Addon));
}

#[test]
fn manual_plugin_requires_dll() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_at(root.path());

    let picked = tempfile::tempdir().unwrap();
    let not_a_dll = picked.path().join("Sparkle.txt");
    touch(&not_a_dll, b"x");
    let outcome = manager.manual_install_plugin(&not_a_dll, None, None, None);
    assert!(matches!(outcome, InstallOutcome::Failure { .. }));

    let dll = picked.path().join("Sparkle.dll");
    touch(&dll, b"bin");
    let outcome = manager.manual_install_plugin(&dll, None, None, None);
    assert!(matches!(outcome, InstallOutcome::Success { .. }));
    assert!(root.path().join("plugins/Sparkle.dll").is_file());

    // Expected-name validation is case-insensitive.
    let outcome = manager.remove_package("Sparkle", PackageKind::Plugin);
    assert!(outcome.is_ok());
    let outcome = manager.manual_install_plugin(&dll, None, None, Some("other"));
    assert!(matches!(outcome, InstallOutcome::Failure { .. }));
    let outcome = manager.manual_install_plugin(&dll, None, None, Some("sparkle"));
    assert!(matches!(outcome, InstallOutcome::Success { .. }));
}

#[test]
fn shared_files_are_reference_counted_on_removal() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_at(root.path());
    touch(&root.path().join("docs/shared.txt"), b"shared");

    for name in ["A", "B"] {
        let mut record =
            PackageRecord::new("https://example.com/pkg", InstallMethod::Git, format!("addons/{}", name));
        record.doc_files = vec!["docs/shared.txt".to_string()];
        manager.tracker_mut().add_package(name, PackageKind::Addon, record);
    }
    manager.tracker_mut().save().unwrap();

    // B still claims the file: it survives A's removal.
    manager.remove_package("A", PackageKind::Addon).unwrap();
    assert!(root.path().join("docs/shared.txt").is_file());

    manager.remove_package("B", PackageKind::Addon).unwrap();
    assert!(!root.path().join("docs/shared.txt").exists());
}

#[test]
fn lib_files_survive_while_another_addon_claims_them() {
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_at(root.path());
    touch(&root.path().join("addons/libs/deep/shared.lua"), b"lib");
    touch(&root.path().join("addons/libs/only-a.lua"), b"mine");

    let mut a = PackageRecord::new("https://example.com/a", InstallMethod::Git, "addons/A");
    a.lib_files = vec![
        "addons/libs/deep/shared.lua".to_string(),
        "addons/libs/only-a.lua".to_string(),
    ];
    manager.tracker_mut().add_package("A", PackageKind::Addon, a);

    let mut b = PackageRecord::new("https://example.com/b", InstallMethod::Git, "addons/B");
    b.lib_files = vec!["addons/libs/deep/shared.lua".to_string()];
    manager.tracker_mut().add_package("B", PackageKind::Addon, b);

    manager.remove_package("A", PackageKind::Addon).unwrap();
    assert!(root.path().join("addons/libs/deep/shared.lua").is_file());
    // Exclusively owned file is gone, and its tree stays intact where
    // shared files remain.
    assert!(!root.path().join("addons/libs/only-a.lua").exists());

    manager.remove_package("B", PackageKind::Addon).unwrap();
    assert!(!root.path().join("addons/libs/deep").exists());
    // The shared libs root itself is never pruned.
    assert!(root.path().join("addons/libs").is_dir());
}

#[test]
fn install_from_local_git_repository() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let mut manager = manager_at(root.path());

    let upstream = tempfile::tempdir().unwrap();
    touch(&upstream.path().join("Gauge.lua"), b"entry");
    git_in(upstream.path(), &["init"]);
    commit_all(upstream.path(), "initial");

    let url = upstream.path().to_string_lossy().to_string();
    let outcome = manager.install_from_git(&url, PackageKind::Addon, &InstallOptions::default());
    match outcome {
        InstallOutcome::Success { message } => assert!(message.contains("Gauge"), "{}", message),
        other => panic!("expected Success, got {:?}", other),
    }
    assert!(root.path().join("addons/Gauge/Gauge.lua").is_file());

    let record = manager.tracker().get_package("Gauge", PackageKind::Addon).unwrap();
    assert_eq!(record.install_method, InstallMethod::Git);
    assert!(record.commit.is_some());
    assert!(record.branch.is_some());

    // The tracker survives a reopen.
    drop(manager);
    let manager = manager_at(root.path());
    assert!(manager.tracker().package_exists("Gauge", PackageKind::Addon));
}
