use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StorageError;

/// A claimable username as numbered by the work source. Identity is `number`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub number: u64,
    #[serde(
        rename = "username",
        alias = "identifier",
        default,
        deserialize_with = "null_as_default"
    )]
    pub identifier: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl WorkItem {
    pub fn new(number: u64, identifier: impl Into<String>) -> Self {
        Self {
            number,
            identifier: identifier.into(),
        }
    }
}

/// Highest number in `items`, 0 when empty.
pub fn max_seen(items: &[WorkItem]) -> u64 {
    items.iter().map(|item| item.number).max().unwrap_or(0)
}

/// Items of `remote` numbered strictly above everything in `previous`, ascending by number.
///
/// Duplicate numbers in `remote` are kept; each copy is attempted.
pub fn compute_delta(remote: &[WorkItem], previous: &[WorkItem]) -> Vec<WorkItem> {
    let max_seen = max_seen(previous);

    let mut delta: Vec<WorkItem> = remote
        .iter()
        .filter(|item| item.number > max_seen)
        .cloned()
        .collect();

    // Stable, so duplicates keep their fetch order.
    delta.sort_by_key(|item| item.number);

    delta
}

/// The JSON file holding the most recent delta.
#[derive(Clone, Debug)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Vec<WorkItem>, StorageError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| StorageError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the ledger with exactly `items`. The file is written beside the
    /// target first and renamed over it, so readers never see a partial write.
    pub async fn persist(&self, items: &[WorkItem]) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(items).map_err(StorageError::Encode)?;
        let tmp_path = self.tmp_path();

        let write_err = |source| StorageError::Write {
            path: self.path.clone(),
            source,
        };

        tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(write_err)?;

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut file_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(pairs: &[(u64, &str)]) -> Vec<WorkItem> {
        pairs.iter().map(|(n, id)| WorkItem::new(*n, *id)).collect()
    }

    #[test]
    fn delta_keeps_only_items_above_previous_max() {
        let previous = items(&[(1, "a"), (2, "b")]);
        let remote = items(&[(1, "a"), (2, "b"), (3, "c"), (4, "d")]);

        assert_eq!(
            compute_delta(&remote, &previous),
            items(&[(3, "c"), (4, "d")])
        );
    }

    #[test]
    fn delta_against_empty_previous_is_sorted_remote() {
        let remote = items(&[(7, "g"), (2, "b"), (5, "e")]);

        assert_eq!(
            compute_delta(&remote, &[]),
            items(&[(2, "b"), (5, "e"), (7, "g")])
        );
    }

    #[test]
    fn delta_uses_max_not_membership() {
        // 3 was never seen, but it is below the previous maximum.
        let previous = items(&[(2, "b"), (4, "d")]);
        let remote = items(&[(3, "c"), (5, "e"), (4, "renamed")]);

        assert_eq!(compute_delta(&remote, &previous), items(&[(5, "e")]));
    }

    #[test]
    fn delta_of_persisted_delta_is_empty_for_unchanged_remote() {
        let remote = items(&[(3, "c"), (1, "a"), (2, "b")]);
        let first = compute_delta(&remote, &items(&[(1, "a")]));

        assert_eq!(first, items(&[(2, "b"), (3, "c")]));
        assert!(compute_delta(&remote, &first).is_empty());
    }

    #[test]
    fn delta_keeps_duplicate_numbers() {
        let remote = items(&[(6, "x"), (5, "e"), (6, "y")]);

        assert_eq!(
            compute_delta(&remote, &items(&[(4, "d")])),
            items(&[(5, "e"), (6, "x"), (6, "y")])
        );
    }

    #[test]
    fn items_without_number_never_count_as_new() {
        let remote: Vec<WorkItem> =
            serde_json::from_str(r#"[{"username": "nobody"}, {"number": 1, "username": "a"}]"#)
                .unwrap();

        assert_eq!(compute_delta(&remote, &[]), items(&[(1, "a")]));
    }

    #[test]
    fn null_fields_fall_back_to_defaults() {
        let parsed: Vec<WorkItem> = serde_json::from_str(
            r#"[{"number": 2, "username": null}, {"number": null, "username": "c"}]"#,
        )
        .unwrap();

        assert_eq!(parsed, items(&[(2, ""), (0, "c")]));
    }

    #[tokio::test]
    async fn missing_ledger_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("client_username.json"));

        assert!(ledger.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("client_username.json"));
        let delta = items(&[(3, "c"), (4, "d")]);

        ledger.persist(&delta).await.unwrap();

        assert_eq!(ledger.load().await.unwrap(), delta);
        assert!(!ledger.tmp_path().exists());
    }

    #[tokio::test]
    async fn persist_overwrites_instead_of_appending() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("client_username.json"));

        ledger.persist(&items(&[(1, "a"), (2, "b")])).await.unwrap();
        ledger.persist(&items(&[(3, "c")])).await.unwrap();

        assert_eq!(ledger.load().await.unwrap(), items(&[(3, "c")]));
    }

    #[tokio::test]
    async fn ledger_is_written_with_username_keys() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("client_username.json"));

        ledger.persist(&items(&[(9, "zed")])).await.unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(ledger.path()).unwrap()).unwrap();

        assert_eq!(raw, serde_json::json!([{ "number": 9, "username": "zed" }]));
    }

    #[tokio::test]
    async fn identifier_key_is_accepted_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("client_username.json"));
        std::fs::write(ledger.path(), r#"[{"number": 2, "identifier": "b"}]"#).unwrap();

        assert_eq!(ledger.load().await.unwrap(), items(&[(2, "b")]));
    }

    #[tokio::test]
    async fn malformed_ledger_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("client_username.json"));
        std::fs::write(ledger.path(), r#"{"number": 1}"#).unwrap();

        assert!(matches!(
            ledger.load().await,
            Err(StorageError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn persist_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("absent").join("client_username.json"));

        assert!(matches!(
            ledger.persist(&items(&[(1, "a")])).await,
            Err(StorageError::Write { .. })
        ));
    }
}
