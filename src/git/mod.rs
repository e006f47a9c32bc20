//! Thin wrapper over the `git` executable.
//!
//! Clones and fetches run untimed (the network dominates); short
//! metadata commands run under a kill-on-deadline timeout so a wedged
//! remote or filesystem cannot hang an interactive operation.

use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{LoadoutError, Result};

/// Timeout for local metadata commands (rev-parse, log, remote).
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for commands that touch the network but move little data.
const REMOTE_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct LocalRepoMetadata {
    pub source: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
}

fn run_git(args: &[&str], cwd: Option<&Path>, timeout: Option<Duration>) -> Result<Output> {
    debug!("git {}", args.join(" "));
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    match timeout {
        None => cmd
            .output()
            .map_err(|e| LoadoutError::GitError(format!("failed to run git: {}", e))),
        Some(limit) => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).stdin(Stdio::null());
            let mut child = cmd
                .spawn()
                .map_err(|e| LoadoutError::GitError(format!("failed to run git: {}", e)))?;
            let deadline = Instant::now() + limit;
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) => {
                        if Instant::now() >= deadline {
                            let _ = child.kill();
                            let _ = child.wait();
                            return Err(LoadoutError::GitError(format!(
                                "git {} timed out after {}s",
                                args.first().unwrap_or(&""),
                                limit.as_secs()
                            )));
                        }
                        std::thread::sleep(Duration::from_millis(50));
                    }
                    Err(e) => {
                        return Err(LoadoutError::GitError(format!("failed to wait for git: {}", e)))
                    }
                }
            }
            child
                .wait_with_output()
                .map_err(|e| LoadoutError::GitError(format!("failed to collect git output: {}", e)))
        }
    }
}

fn stdout_line(output: &Output) -> Option<String> {
    if !output.status.success() {
        return None;
    }
    let line = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

/// Full clone with submodules, optionally pinned to a branch.
pub fn clone(url: &str, dest: &Path, branch: Option<&str>) -> Result<()> {
    let dest_str = dest.to_string_lossy();
    let mut args = vec!["clone", "--recurse-submodules"];
    if let Some(b) = branch {
        args.extend(["--branch", b]);
    }
    args.push(url);
    args.push(dest_str.as_ref());

    let output = run_git(&args, None, None)?;
    if !output.status.success() {
        return Err(LoadoutError::GitError(format!(
            "clone of {} failed: {}",
            url,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Depth-1 clone used only for structure probing.
pub fn clone_shallow(url: &str, dest: &Path) -> Result<()> {
    let dest_str = dest.to_string_lossy();
    let output = run_git(
        &["clone", "--depth", "1", url, dest_str.as_ref()],
        None,
        Some(Duration::from_secs(60)),
    )?;
    if !output.status.success() {
        return Err(LoadoutError::GitError(format!(
            "shallow clone of {} failed: {}",
            url,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

pub fn head_commit(repo: &Path) -> Result<String> {
    let output = run_git(&["rev-parse", "HEAD"], Some(repo), Some(METADATA_TIMEOUT))?;
    stdout_line(&output)
        .ok_or_else(|| LoadoutError::GitError("could not read HEAD commit".to_string()))
}

pub fn head_branch(repo: &Path) -> Result<String> {
    let output = run_git(
        &["rev-parse", "--abbrev-ref", "HEAD"],
        Some(repo),
        Some(METADATA_TIMEOUT),
    )?;
    stdout_line(&output)
        .ok_or_else(|| LoadoutError::GitError("could not read HEAD branch".to_string()))
}

/// Current branch of `root`, or `None` for a detached HEAD or a
/// directory that is not a git checkout at all.
pub fn current_branch(root: &Path) -> Option<String> {
    let output = run_git(
        &["rev-parse", "--abbrev-ref", "HEAD"],
        Some(root),
        Some(METADATA_TIMEOUT),
    )
    .ok()?;
    stdout_line(&output).filter(|b| b != "HEAD")
}

/// Hash of the last commit touching `path` inside `repo`.
pub fn last_commit_for_path(repo: &Path, path: &str) -> Option<String> {
    let output = run_git(
        &["log", "-1", "--format=%H", "--", path],
        Some(repo),
        Some(Duration::from_secs(10)),
    )
    .ok()?;
    stdout_line(&output)
}

/// Origin URL / branch / commit of a local checkout, each best-effort.
/// Returns `None` when `repo` has no `.git` directory.
pub fn local_metadata(repo: &Path) -> Option<LocalRepoMetadata> {
    if !repo.join(".git").exists() {
        return None;
    }
    let mut meta = LocalRepoMetadata::default();
    if let Ok(output) = run_git(
        &["remote", "get-url", "origin"],
        Some(repo),
        Some(METADATA_TIMEOUT),
    ) {
        meta.source = stdout_line(&output);
    }
    meta.branch = current_branch(repo);
    if let Ok(output) = run_git(&["rev-parse", "HEAD"], Some(repo), Some(METADATA_TIMEOUT)) {
        meta.commit = stdout_line(&output);
    }
    if meta.source.is_none() && meta.branch.is_none() && meta.commit.is_none() {
        None
    } else {
        Some(meta)
    }
}

/// Parse `ls-remote --heads` output into deduplicated branch names.
fn parse_remote_heads(stdout: &str) -> Vec<String> {
    let mut branches = Vec::new();
    for line in stdout.lines() {
        let mut parts = line.split('\t');
        let (Some(_), Some(reference)) = (parts.next(), parts.next()) else {
            continue;
        };
        if let Some(name) = reference.strip_prefix("refs/heads/") {
            if !branches.iter().any(|b| b == name) {
                branches.push(name.to_string());
            }
        }
    }
    branches
}

/// Remote branch names, with `preferred` (the detected base branch)
/// moved to the front as the default suggestion when present.
pub fn list_remote_branches(url: &str, preferred: Option<&str>) -> Result<Vec<String>> {
    let output = run_git(&["ls-remote", "--heads", url], None, Some(REMOTE_QUERY_TIMEOUT))?;
    if !output.status.success() {
        return Err(LoadoutError::GitError(format!(
            "ls-remote for {} failed: {}",
            url,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let mut branches = parse_remote_heads(&String::from_utf8_lossy(&output.stdout));
    if let Some(pref) = preferred {
        if let Some(pos) = branches.iter().position(|b| b == pref) {
            let head = branches.remove(pos);
            branches.insert(0, head);
        }
    }
    Ok(branches)
}

/// Materialize just `pattern` from `url` at `workdir` via a shallow
/// sparse-checkout pull. Used for byte-comparison against the upstream
/// official tree without a full clone.
pub fn sparse_checkout_pull(workdir: &Path, url: &str, branch: &str, pattern: &str) -> Result<()> {
    let init = run_git(&["init"], Some(workdir), Some(Duration::from_secs(10)))?;
    if !init.status.success() {
        return Err(LoadoutError::GitError("git init failed".to_string()));
    }
    run_git(
        &["remote", "add", "origin", url],
        Some(workdir),
        Some(Duration::from_secs(10)),
    )?;
    run_git(
        &["config", "core.sparseCheckout", "true"],
        Some(workdir),
        Some(Duration::from_secs(10)),
    )?;

    let sparse_file = workdir.join(".git/info/sparse-checkout");
    if let Some(parent) = sparse_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&sparse_file, format!("{}\n", pattern))?;

    let pull = run_git(
        &["pull", "origin", branch, "--depth=1"],
        Some(workdir),
        Some(REMOTE_QUERY_TIMEOUT),
    )?;
    if !pull.status.success() {
        return Err(LoadoutError::GitError(format!(
            "sparse pull of {} failed: {}",
            pattern,
            String::from_utf8_lossy(&pull.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_heads_parsing_dedupes_and_strips_prefix() {
        let raw = "abc123\trefs/heads/main\n\
                   def456\trefs/heads/dev\n\
                   abc999\trefs/heads/main\n\
                   fff000\trefs/tags/v1.0\n";
        assert_eq!(parse_remote_heads(raw), vec!["main", "dev"]);
    }

    #[test]
    fn preferred_branch_moves_to_front() {
        let mut branches = vec!["dev".to_string(), "main".to_string()];
        // Same reordering list_remote_branches applies.
        if let Some(pos) = branches.iter().position(|b| b == "main") {
            let head = branches.remove(pos);
            branches.insert(0, head);
        }
        assert_eq!(branches, vec!["main", "dev"]);
    }
}
