use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid API key")]
    InvalidKey,

    #[error("No information available: {0}")]
    NoInfoAvailable(String),

    #[error("Replay unavailable: {0}")]
    ReplayUnavailable(String),

    #[error("Service unavailable after {attempts} attempts: {last}")]
    Unavailable { attempts: u32, last: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Cache conflict at {path}: {reason}")]
    CacheConflict { path: String, reason: String },

    #[error("Invalid span: {0}")]
    InvalidSpan(String),

    #[error("Invalid mods: {0}")]
    InvalidMods(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not loaded: {0}")]
    NotLoaded(String),

    #[error("Replay contains no frames")]
    EmptyReplayData,

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Conflicting detectors for {category}: {first} vs {second}")]
    ConflictingDetectors {
        category: &'static str,
        first: String,
        second: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Whether the fetch client may re-issue the request that produced this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::MalformedResponse(_))
    }

    /// Whether the remote service had nothing to return for the request
    pub fn is_no_data(&self) -> bool {
        matches!(self, Error::NoInfoAvailable(_) | Error::ReplayUnavailable(_))
    }
}
