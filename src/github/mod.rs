//! Hosted-API client: release lookup, commit queries, repository
//! catalog. Rate limiting is always surfaced as
//! [`LoadoutError::RateLimited`] so callers can tell "wait or add a
//! token" apart from a plain network failure.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{NetworkConfig, UpstreamConfig};
use crate::error::{LoadoutError, Result};

const API_BASE: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
    #[serde(default)]
    pub zipball_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    #[serde(rename = "type")]
    entry_type: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

/// How a latest-release lookup resolved.
#[derive(Debug, PartialEq)]
pub enum AssetResolution {
    Download { url: String, name: Option<String> },
    /// More than one zip asset and no preferred name: the caller must
    /// pick one.
    MultipleAssets(Vec<ReleaseAsset>),
}

/// Official-repo content listing used to classify disk-discovered
/// packages.
#[derive(Debug, Default)]
pub struct Catalog {
    pub addons: BTreeSet<String>,
    pub plugins: BTreeSet<String>,
}

pub struct GithubClient {
    http: reqwest::blocking::Client,
    token: Option<String>,
    retry_count: u32,
    retry_base_delay: u64,
}

/// `(owner, repo)` from a repository URL.
pub fn parse_owner_repo(repo_url: &str) -> Option<(String, String)> {
    let rest = repo_url.split("://").nth(1).unwrap_or(repo_url);
    let mut parts = rest.trim_end_matches('/').split('/');
    let _host = parts.next()?;
    let owner = parts.next()?;
    let repo = parts.next()?;
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner.to_string(), repo.trim_end_matches(".git").to_string()))
}

fn is_github(repo_url: &str) -> bool {
    repo_url
        .split("://")
        .nth(1)
        .unwrap_or(repo_url)
        .split('/')
        .next()
        .map(|host| host.contains("github.com"))
        .unwrap_or(false)
}

/// Alphanumeric runs longer than two characters, non-numeric,
/// lowercased. Used to fuzzy-match a remembered asset name against the
/// next release's asset list.
pub fn tokenize_asset_name(name: &str) -> Vec<String> {
    let splitter = regex::Regex::new(r"[^a-z0-9]+").unwrap();
    splitter
        .split(&name.to_lowercase())
        .filter(|t| t.len() > 2 && !t.chars().all(|c| c.is_ascii_digit()))
        .map(|t| t.to_string())
        .collect()
}

/// Count of tokens appearing in `candidate_name`; higher is better.
pub fn score_asset_match(candidate_name: &str, tokens: &[String]) -> usize {
    let candidate = candidate_name.to_lowercase();
    tokens.iter().filter(|t| candidate.contains(t.as_str())).count()
}

/// Asset filename from a direct download URL.
pub fn infer_asset_name(download_url: &str) -> Option<String> {
    let path = download_url.split("://").nth(1)?.split('?').next()?;
    let name = path.rsplit('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

impl GithubClient {
    pub fn new(network: &NetworkConfig, upstream: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("loadout/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(network.api_timeout))
            .build()
            .map_err(|e| LoadoutError::NetworkError(format!("failed to create client: {}", e)))?;
        Ok(Self {
            http,
            token: upstream.github_token.clone(),
            retry_count: network.retry_count,
            retry_base_delay: network.retry_base_delay,
        })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let mut req = self.http.get(url);
        if let Some(ref token) = self.token {
            req = req.header(reqwest::header::AUTHORIZATION, format!("token {}", token));
        }
        req.send()
            .map_err(|e| LoadoutError::NetworkError(format!("request to {} failed: {}", url, e)))
    }

    /// 403 responses whose message mentions the rate limit become
    /// `RateLimited`; an unparseable 403 body is treated as rate
    /// limiting too rather than hiding it behind a generic error.
    fn check_rate_limit(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        if response.status().as_u16() == 403 {
            let limited = match response.json::<ApiMessage>() {
                Ok(body) => body.message.to_lowercase().contains("rate limit"),
                Err(_) => true,
            };
            if limited {
                return Err(LoadoutError::RateLimited);
            }
            return Err(LoadoutError::NetworkError("API returned 403".to_string()));
        }
        Ok(response)
    }

    pub fn latest_release(&self, repo_url: &str) -> Result<Release> {
        let (owner, repo) = parse_owner_repo(repo_url).ok_or_else(|| {
            LoadoutError::NetworkError(format!("cannot parse repository URL: {}", repo_url))
        })?;
        let url = format!("{}/repos/{}/{}/releases/latest", API_BASE, owner, repo);
        let response = Self::check_rate_limit(self.get(&url)?)?;
        if !response.status().is_success() {
            return Err(LoadoutError::NetworkError(format!(
                "no release found for {} (status {})",
                repo_url,
                response.status()
            )));
        }
        response
            .json::<Release>()
            .map_err(|e| LoadoutError::NetworkError(format!("invalid release payload: {}", e)))
    }

    /// Pick the asset to download from the latest release.
    ///
    /// Zip assets are preferred. A `preferred_name` is matched exactly
    /// (case-insensitive), then by token-overlap score, then by plain
    /// substring. Without a preferred name, a single zip is used
    /// silently and several zips become a selection checkpoint. With no
    /// zip at all, the first asset of any type is used, and the
    /// auto-generated source zipball is the last resort.
    pub fn resolve_release_asset(
        &self,
        repo_url: &str,
        preferred_name: Option<&str>,
    ) -> Result<(AssetResolution, String)> {
        let release = self.latest_release(repo_url)?;
        let tag = release.tag_name.clone();

        if !release.assets.is_empty() {
            let zip_assets: Vec<&ReleaseAsset> = release
                .assets
                .iter()
                .filter(|a| a.name.to_lowercase().ends_with(".zip"))
                .collect();

            if let Some(preferred) = preferred_name {
                if !zip_assets.is_empty() {
                    let normalized = preferred.to_lowercase();
                    if let Some(asset) = zip_assets.iter().find(|a| a.name.to_lowercase() == normalized) {
                        return Ok((download_of(asset), tag));
                    }

                    let tokens = tokenize_asset_name(preferred);
                    if !tokens.is_empty() {
                        let mut best: Option<&ReleaseAsset> = None;
                        let mut best_score = 0;
                        for asset in &zip_assets {
                            let score = score_asset_match(&asset.name, &tokens);
                            if score > best_score {
                                best = Some(asset);
                                best_score = score;
                            }
                        }
                        if let Some(asset) = best {
                            return Ok((download_of(asset), tag));
                        }
                    }

                    if let Some(asset) = zip_assets.iter().find(|a| a.name.to_lowercase().contains(&normalized)) {
                        return Ok((download_of(asset), tag));
                    }
                }
            }

            if zip_assets.len() > 1 {
                return Ok((
                    AssetResolution::MultipleAssets(zip_assets.into_iter().cloned().collect()),
                    tag,
                ));
            }
            if let Some(asset) = zip_assets.first() {
                return Ok((download_of(asset), tag));
            }
            let first = &release.assets[0];
            return Ok((download_of(first), tag));
        }

        if let Some(zipball) = release.zipball_url {
            return Ok((
                AssetResolution::Download {
                    url: zipball,
                    name: None,
                },
                tag,
            ));
        }

        Err(LoadoutError::NetworkError(format!(
            "release {} of {} has no downloadable asset",
            tag, repo_url
        )))
    }

    /// Latest release tag, or "unknown" when the repository has no
    /// releases or the lookup fails. Callers record this string, so the
    /// fallback must be stable rather than an error.
    pub fn latest_release_tag(&self, repo_url: &str) -> String {
        match self.latest_release(repo_url) {
            Ok(release) => release.tag_name,
            Err(e) => {
                debug!("release tag lookup for {} failed: {}", repo_url, e);
                "unknown".to_string()
            }
        }
    }

    /// Latest commit hash on `branch`, optionally restricted to `path`.
    /// Retries only on rate limiting, with exponential backoff; after
    /// the final attempt the rate limit is reported as such. Non-GitHub
    /// hosts resolve to `Ok(None)` (no API to ask).
    pub fn remote_commit(&self, repo_url: &str, branch: &str, path: Option<&str>) -> Result<Option<String>> {
        if !is_github(repo_url) {
            return Ok(None);
        }
        let Some((owner, repo)) = parse_owner_repo(repo_url) else {
            return Ok(None);
        };
        let url = match path {
            Some(p) => format!(
                "{}/repos/{}/{}/commits?path={}&sha={}&per_page=1",
                API_BASE, owner, repo, p, branch
            ),
            None => format!("{}/repos/{}/{}/commits/{}", API_BASE, owner, repo, branch),
        };

        for attempt in 0..self.retry_count {
            match Self::check_rate_limit(self.get(&url)?) {
                Err(LoadoutError::RateLimited) => {
                    if attempt + 1 >= self.retry_count {
                        return Err(LoadoutError::RateLimited);
                    }
                    let wait = self.retry_base_delay * 2u64.pow(attempt);
                    warn!("rate limited querying {}, retrying in {}s", repo_url, wait);
                    std::thread::sleep(Duration::from_secs(wait));
                }
                Err(e) => return Err(e),
                Ok(response) => {
                    if !response.status().is_success() {
                        return Ok(None);
                    }
                    let data: serde_json::Value = response.json().map_err(|e| {
                        LoadoutError::NetworkError(format!("invalid commit payload: {}", e))
                    })?;
                    let sha = match &data {
                        serde_json::Value::Array(items) => items
                            .first()
                            .and_then(|c| c.get("sha"))
                            .and_then(|s| s.as_str())
                            .map(|s| s.to_string()),
                        serde_json::Value::Object(obj) => {
                            obj.get("sha").and_then(|s| s.as_str()).map(|s| s.to_string())
                        }
                        _ => None,
                    };
                    return Ok(sha);
                }
            }
        }
        Err(LoadoutError::RateLimited)
    }

    /// Directory names under `addons/` and file stems under `plugins/`
    /// of the official repository, at `branch`.
    pub fn fetch_catalog(&self, official_repo: &str, branch: Option<&str>) -> Result<Catalog> {
        let (owner, repo) = parse_owner_repo(official_repo).ok_or_else(|| {
            LoadoutError::NetworkError(format!("cannot parse repository URL: {}", official_repo))
        })?;
        let suffix = branch.map(|b| format!("?ref={}", b)).unwrap_or_default();

        let mut catalog = Catalog::default();
        for (folder, is_addons) in [("addons", true), ("plugins", false)] {
            let url = format!(
                "{}/repos/{}/{}/contents/{}{}",
                API_BASE, owner, repo, folder, suffix
            );
            let response = Self::check_rate_limit(self.get(&url)?)?;
            if !response.status().is_success() {
                return Err(LoadoutError::NetworkError(format!(
                    "catalog listing of {} failed (status {})",
                    folder,
                    response.status()
                )));
            }
            let entries: Vec<ContentsEntry> = response.json().map_err(|e| {
                LoadoutError::NetworkError(format!("invalid contents payload: {}", e))
            })?;
            for entry in entries {
                if is_addons {
                    if entry.entry_type == "dir"
                        && !entry.name.starts_with('.')
                        && entry.name.to_lowercase() != "libs"
                    {
                        catalog.addons.insert(entry.name);
                    }
                } else if entry.entry_type == "file" && entry.name.to_lowercase().ends_with(".dll") {
                    catalog
                        .plugins
                        .insert(entry.name[..entry.name.len() - 4].to_string());
                }
            }
        }
        Ok(catalog)
    }
}

fn download_of(asset: &ReleaseAsset) -> AssetResolution {
    AssetResolution::Download {
        url: asset.browser_download_url.clone(),
        name: Some(asset.name.clone()),
    }
}
