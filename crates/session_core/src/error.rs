use std::path::PathBuf;

use shared::error::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid relay url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to connect to relay at {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("relay closed the link before sending a welcome")]
    MissingWelcome,
    #[error("relay rejected the session: {}", .0.message)]
    Relay(ApiError),
    #[error("relay link closed")]
    Disconnected,
    #[error("failed to encode session message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
