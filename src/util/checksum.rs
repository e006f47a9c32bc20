//! Content hashing and tree comparison.
//!
//! Used by the update engine to decide whether a locally installed
//! package differs from the upstream tree. The digest never leaves the
//! process, so the algorithm only needs to be a reliable equality
//! check.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::Result;

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn sha256_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn relative_files(root: &Path) -> Result<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| std::io::Error::other(e))?;
        if entry.file_type().is_file() {
            files.insert(entry.path().strip_prefix(root).unwrap_or(entry.path()).to_path_buf());
        }
    }
    Ok(files)
}

/// Whether two files hold identical content, with a size fast-path
/// before hashing.
pub fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    if std::fs::metadata(a)?.len() != std::fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(sha256_file(a)? == sha256_file(b)?)
}

/// Whether two directory trees hold identical content: same relative
/// file set, and byte-identical files.
pub fn trees_identical(local: &Path, remote: &Path) -> Result<bool> {
    let local_files = relative_files(local)?;
    let remote_files = relative_files(remote)?;
    if local_files != remote_files {
        return Ok(false);
    }
    for rel in &local_files {
        if !files_identical(&local.join(rel), &remote.join(rel))? {
            return Ok(false);
        }
    }
    Ok(true)
}
