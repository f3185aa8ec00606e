use std::{fmt, io::ErrorKind, path::Path};

use serde::Deserialize;

use crate::error::ConfigError;

pub const ACCOUNTS_FILE_EXAMPLE: &str = r#"[
  {
    "name": "account 1",
    "cookie": "<full cookie string>"
  },
  {
    "name": "account 2",
    "cookie": "<another cookie string>"
  }
]"#;

#[derive(Deserialize, Debug)]
struct AccountEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    cookie: Option<String>,
}

/// Session cookie of one account. The token is never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    label: String,
    token: String,
}

impl Credential {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("label", &self.label)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Non-empty, ordered set of credentials handed out round-robin.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Option<Self> {
        (!credentials.is_empty()).then_some(Self { credentials })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| match source.kind() {
                ErrorKind::NotFound => ConfigError::AccountsMissing {
                    path: path.to_path_buf(),
                },
                _ => ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                },
            })?;

        let entries: Vec<AccountEntry> =
            serde_json::from_str(&contents).map_err(|source| ConfigError::AccountsMalformed {
                path: path.to_path_buf(),
                source,
            })?;

        let credentials = entries
            .into_iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let cookie = entry.cookie.filter(|c| !c.trim().is_empty())?;
                let label = entry
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| format!("account {}", i + 1));
                Some(Credential::new(label, cookie))
            })
            .collect();

        let pool = Self::new(credentials).ok_or_else(|| ConfigError::NoCredentials {
            path: path.to_path_buf(),
        })?;

        tracing::info!("Loaded {} accounts from {}", pool.len(), path.display());

        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Credential for the `slot`-th work item: `slot mod len`.
    pub fn assign(&self, slot: usize) -> &Credential {
        &self.credentials[slot % self.credentials.len()]
    }
}
