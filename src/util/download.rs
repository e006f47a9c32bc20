use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{LoadoutError, Result};

/// Download `url` to `dest` atomically.
///
/// Data is first written to a temporary file in the same directory as
/// `dest`, then renamed into place on success, so an interrupted
/// download never leaves a partial file behind.
pub fn download_file(url: &str, dest: &Path, timeout: u64) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("loadout/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(timeout))
        .timeout(Duration::from_secs(timeout))
        .build()
        .map_err(|e| LoadoutError::NetworkError(format!("failed to create client: {}", e)))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| LoadoutError::NetworkError(format!("failed to send request to {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(LoadoutError::NetworkError(format!(
            "failed to download from {}: status {}",
            url,
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let dest_dir = dest.parent().unwrap_or(Path::new("."));
    let tmp_file = tempfile::NamedTempFile::new_in(dest_dir)?;
    let mut file = tmp_file.as_file().try_clone()?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 8192];
    loop {
        let n = response
            .read(&mut buffer)
            .map_err(|e| LoadoutError::NetworkError(format!("download from {} interrupted: {}", url, e)))?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])?;
        downloaded += n as u64;
        pb.set_position(downloaded);
    }
    pb.finish_and_clear();

    tmp_file.persist(dest).map_err(|e| LoadoutError::IoError(e.error))?;
    Ok(())
}
