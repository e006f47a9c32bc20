use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LoadoutError {
    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("structure not detected: {0}")]
    StructureNotFound(String),

    #[error("file conflict: {path} is owned by package {owner}")]
    FileConflict { path: PathBuf, owner: String },

    #[error("selection required: {0}")]
    AmbiguousSelection(String),

    #[error("API rate limit exceeded; wait or configure a token")]
    RateLimited,

    #[error("manual update required for {0}")]
    ManualInterventionRequired(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("git error: {0}")]
    GitError(String),

    #[error("install error: {0}")]
    InstallError(String),

    #[error("remove error: {0}")]
    RemoveError(String),

    #[error("update error: {0}")]
    UpdateError(String),

    #[error("archive error: {0}")]
    ArchiveError(String),

    #[error("tracker error: {0}")]
    TrackerError(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML deserialization error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl LoadoutError {
    /// Rate limiting is recoverable (wait, or add a token) and callers
    /// present it differently from a plain transport failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LoadoutError::RateLimited)
    }
}

pub type Result<T> = std::result::Result<T, LoadoutError>;
