use std::path::PathBuf;

use thiserror::Error;

/// Fatal: the process cannot start a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("accounts file {} does not exist", .path.display())]
    AccountsMissing { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("accounts file {} is not a valid JSON array of accounts: {source}", .path.display())]
    AccountsMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("accounts file {} contains no account with a cookie", .path.display())]
    NoCredentials { path: PathBuf },

    #[error("config file {} is invalid: {source}", .path.display())]
    Settings {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("config file {}: {key} must be at least 1 second", .path.display())]
    ZeroTimeout { path: PathBuf, key: &'static str },

    #[error("invalid proxy {url}: {source}")]
    Proxy {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Ends a run early; never fatal to the process.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to work source failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("work source responded with an unsuccessful status")]
    Rejected,

    #[error("work source returned an unreadable body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read ledger {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger {} is malformed: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode ledger: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to write ledger {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
