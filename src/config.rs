use serde::Deserialize;
use std::{io::ErrorKind, path::Path, time::Duration};

use crate::{
    constants::{
        CLAIM_TIMEOUT_SECS, CLAIM_URL, CONFIG_FILE_PATH, FETCH_TIMEOUT_SECS, LEDGER_FILE_PATH,
        USERNAMES_URL,
    },
    error::ConfigError,
};

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct Config {
    pub usernames_url: String,
    pub claim_url: String,
    pub ledger_path: String,
    pub fetch_timeout_secs: u64,
    pub claim_timeout_secs: u64,
    pub accept_invalid_certs: bool,
    pub proxy: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            usernames_url: USERNAMES_URL.to_string(),
            claim_url: CLAIM_URL.to_string(),
            ledger_path: LEDGER_FILE_PATH.to_string(),
            fetch_timeout_secs: FETCH_TIMEOUT_SECS,
            claim_timeout_secs: CLAIM_TIMEOUT_SECS,
            accept_invalid_certs: true,
            proxy: None,
        }
    }
}

impl Config {
    /// Reads settings from `path`, falling back to defaults when the file does not exist.
    pub async fn read_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let cfg_str = match tokio::fs::read_to_string(path).await {
            Ok(cfg_str) => cfg_str,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No {} found, using default settings", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Self = toml::from_str(&cfg_str).map_err(|source| ConfigError::Settings {
            path: path.to_path_buf(),
            source,
        })?;

        let zero_timeout = [
            ("FETCH_TIMEOUT_SECS", config.fetch_timeout_secs),
            ("CLAIM_TIMEOUT_SECS", config.claim_timeout_secs),
        ]
        .into_iter()
        .find_map(|(key, secs)| (secs == 0).then_some(key));

        if let Some(key) = zero_timeout {
            return Err(ConfigError::ZeroTimeout {
                path: path.to_path_buf(),
                key,
            });
        }

        Ok(config)
    }

    pub async fn read_default() -> Result<Self, ConfigError> {
        Self::read_from_file(CONFIG_FILE_PATH).await
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_secs(self.claim_timeout_secs)
    }

    pub fn proxy(&self) -> Result<Option<reqwest::Proxy>, ConfigError> {
        self.proxy
            .as_deref()
            .map(|url| {
                reqwest::Proxy::all(url).map_err(|source| ConfigError::Proxy {
                    url: url.to_string(),
                    source,
                })
            })
            .transpose()
    }
}
