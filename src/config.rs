use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{LoadoutError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Root of the managed client installation. `addons/`, `plugins/`,
    /// `docs/` and `resources/` live directly under it.
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Repository the client bundle itself ships from. Pre-installed
    /// packages are updated against this repo, and its catalog decides
    /// how disk-discovered packages are classified.
    #[serde(default = "default_official_repo")]
    pub official_repo: String,
    /// Fallback branch when the installation root is not a git checkout.
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Bearer token for the hosting API. Optional; anonymous access
    /// works with lower rate limits.
    #[serde(default)]
    pub github_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Seconds before a hosted-API call is abandoned.
    #[serde(default = "default_api_timeout")]
    pub api_timeout: u64,
    #[serde(default = "default_download_timeout")]
    pub download_timeout: u64,
    /// Attempts for rate-limited API calls before giving up.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Base delay in seconds; doubled on each rate-limited attempt.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_official_repo() -> String {
    "https://github.com/loadout-gg/client-bundle".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_api_timeout() -> u64 {
    10
}
fn default_download_timeout() -> u64 {
    300
}
fn default_retry_count() -> u32 {
    5
}
fn default_retry_base_delay() -> u64 {
    2
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { root: default_root() }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            official_repo: default_official_repo(),
            default_branch: default_branch(),
            github_token: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_timeout: default_api_timeout(),
            download_timeout: default_download_timeout(),
            retry_count: default_retry_count(),
            retry_base_delay: default_retry_base_delay(),
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            upstream: UpstreamConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

fn xdg_config_path() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| {
            std::env::var("HOME")
                .map(|h| PathBuf::from(h).join(".config"))
                .ok()
        })
        .map(|p| p.join("loadout/loadout.toml"))
}

/// Recursively merge two TOML values. For tables, overlay keys win;
/// missing keys are inherited from base. All other types (scalars,
/// arrays) are replaced wholesale by the overlay value.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    use toml::Value;
    match (base, overlay) {
        (Value::Table(mut base_map), Value::Table(overlay_map)) => {
            for (k, v) in overlay_map {
                let merged = if let Some(base_v) = base_map.remove(&k) {
                    merge_toml(base_v, v)
                } else {
                    v
                };
                base_map.insert(k, merged);
            }
            Value::Table(base_map)
        }
        (_, overlay) => overlay,
    }
}

fn load_toml_file(path: &Path) -> Result<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        LoadoutError::ConfigError(format!("failed to read {}: {}", path.display(), e))
    })?;
    Ok(toml::from_str(&content)?)
}

impl GlobalConfig {
    /// Load configuration with layered merging.
    ///
    /// When an explicit `path` is supplied (via `--config`), that single
    /// file is loaded as-is with no layering. Otherwise configs are
    /// merged in ascending priority order:
    ///
    ///   1. `$XDG_CONFIG_HOME/loadout/loadout.toml` (per-user)
    ///   2. `./loadout.toml`                        (highest priority)
    ///
    /// Any layer that does not exist is silently skipped; with no file
    /// at any location, built-in defaults apply. A `GITHUB_TOKEN`
    /// environment variable fills the token when the files leave it
    /// unset.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(p) = path {
            if !p.exists() {
                return Err(LoadoutError::ConfigError(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            let val = load_toml_file(p)?;
            GlobalConfig::deserialize(val)?
        } else {
            let mut layers: Vec<PathBuf> = Vec::new();
            if let Some(xdg) = xdg_config_path() {
                layers.push(xdg);
            }
            layers.push(PathBuf::from("./loadout.toml"));

            let mut merged: Option<toml::Value> = None;
            for layer_path in &layers {
                if layer_path.exists() {
                    let val = load_toml_file(layer_path)?;
                    merged = Some(match merged {
                        Some(base) => merge_toml(base, val),
                        None => val,
                    });
                }
            }

            match merged {
                None => Self::default(),
                Some(val) => GlobalConfig::deserialize(val)?,
            }
        };

        if config.upstream.github_token.is_none() {
            config.upstream.github_token = std::env::var("GITHUB_TOKEN").ok();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overlay_wins_on_scalars() {
        let base: toml::Value = toml::from_str("[network]\napi_timeout = 10\nretry_count = 5").unwrap();
        let overlay: toml::Value = toml::from_str("[network]\napi_timeout = 30").unwrap();
        let merged = merge_toml(base, overlay);
        let config = GlobalConfig::deserialize(merged).unwrap();
        assert_eq!(config.network.api_timeout, 30);
        assert_eq!(config.network.retry_count, 5);
    }

    #[test]
    fn defaults_when_empty() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.network.api_timeout, 10);
        assert_eq!(config.network.retry_base_delay, 2);
        assert_eq!(config.upstream.default_branch, "main");
        assert!(config.upstream.github_token.is_none());
    }
}
