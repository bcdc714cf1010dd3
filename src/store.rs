//! Flat-file persistence. Each collection is one pretty-printed JSON file in
//! the data directory and is always read and written whole.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, warn};

/// The record collections owned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Accounts,
    Pending,
    Providers,
    Counters,
}

impl Collection {
    pub fn file_name(self) -> &'static str {
        match self {
            Collection::Accounts => "accounts.json",
            Collection::Pending => "pending.json",
            Collection::Providers => "providerRegistrations.json",
            Collection::Counters => "counters.json",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt collection {path}: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode {collection:?}: {source}")]
    Encode {
        collection: Collection,
        source: serde_json::Error,
    },
}

/// JSON-file store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Open (and create if needed) the data directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Write {
                path: dir.clone(),
                source,
            })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }

    /// Read a whole collection. A missing file is initialized to the default
    /// value, which is persisted before being returned.
    pub async fn read<T>(&self, collection: Collection) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        let path = self.path(collection);
        match fs::read(&path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), "collection read");
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode { path, source })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let value = T::default();
                self.write(collection, &value).await?;
                debug!(path = %path.display(), "collection initialized");
                Ok(value)
            }
            Err(source) => Err(StoreError::Read { path, source }),
        }
    }

    /// Overwrite a whole collection.
    pub async fn write<T: Serialize>(
        &self,
        collection: Collection,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = encode(collection, value)?;
        self.write_bytes(collection, &bytes).await
    }

    /// Write several collections as one unit. Files are written in insertion
    /// order; if any write fails, the files already written are put back to
    /// their previous contents before the error is returned.
    pub async fn apply_batch(&self, batch: Batch) -> Result<(), StoreError> {
        let mut committed: Vec<(Collection, Option<Vec<u8>>)> = Vec::new();

        for (collection, bytes) in batch.writes {
            let path = self.path(collection);
            let previous = match fs::read(&path).await {
                Ok(previous) => Some(previous),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(source) => {
                    self.rollback(committed).await;
                    return Err(StoreError::Read { path, source });
                }
            };

            if let Err(e) = self.write_bytes(collection, &bytes).await {
                self.rollback(committed).await;
                return Err(e);
            }
            committed.push((collection, previous));
        }

        Ok(())
    }

    async fn rollback(&self, committed: Vec<(Collection, Option<Vec<u8>>)>) {
        for (collection, previous) in committed.into_iter().rev() {
            let restored = match previous {
                Some(bytes) => self.write_bytes(collection, &bytes).await,
                None => fs::remove_file(self.path(collection))
                    .await
                    .map_err(|source| StoreError::Write {
                        path: self.path(collection),
                        source,
                    }),
            };
            match restored {
                Ok(()) => warn!(?collection, "batch rolled back"),
                Err(e) => error!(?collection, reason = %e, "batch rollback failed"),
            }
        }
    }

    /// Write to a sibling temp file, then rename it over the target.
    async fn write_bytes(&self, collection: Collection, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path(collection);
        let temp = self.dir.join(format!("{}.tmp", collection.file_name()));

        fs::write(&temp, bytes)
            .await
            .map_err(|source| StoreError::Write {
                path: temp.clone(),
                source,
            })?;
        fs::rename(&temp, &path)
            .await
            .map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), bytes = bytes.len(), "collection written");
        Ok(())
    }
}

fn encode<T: Serialize>(collection: Collection, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode { collection, source })
}

/// Collections staged for [`JsonStore::apply_batch`].
#[derive(Debug, Default)]
pub struct Batch {
    writes: Vec<(Collection, Vec<u8>)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a full-collection overwrite.
    pub fn insert<T: Serialize>(
        &mut self,
        collection: Collection,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = encode(collection, value)?;
        self.writes.push((collection, bytes));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use crate::model::{Account, Accounts, Counters};
    use tempfile::TempDir;

    async fn store() -> (TempDir, JsonStore) {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn reading_missing_collection_persists_default() {
        let (_dir, store) = store().await;
        assert!(!store.path(Collection::Accounts).exists());

        let accounts: Accounts = store.read(Collection::Accounts).await.unwrap();
        assert!(accounts.is_empty());
        assert!(store.path(Collection::Accounts).exists());
    }

    #[test]
    fn collection_files_follow_the_data_layout() {
        assert_eq!(Collection::Accounts.file_name(), "accounts.json");
        assert_eq!(Collection::Pending.file_name(), "pending.json");
        assert_eq!(
            Collection::Providers.file_name(),
            "providerRegistrations.json"
        );
        assert_eq!(Collection::Counters.file_name(), "counters.json");
    }

    #[tokio::test]
    async fn write_overwrites_whole_collection() {
        let (_dir, store) = store().await;
        let mut counters = Counters::new();
        counters.insert("a".into(), 1);
        counters.insert("b".into(), 2);
        store.write(Collection::Counters, &counters).await.unwrap();

        let mut replacement = Counters::new();
        replacement.insert("c".into(), 3);
        store
            .write(Collection::Counters, &replacement)
            .await
            .unwrap();

        let read: Counters = store.read(Collection::Counters).await.unwrap();
        assert_eq!(read, replacement);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_a_reset() {
        let (_dir, store) = store().await;
        std::fs::write(store.path(Collection::Accounts), b"{ not json").unwrap();

        let result: Result<Accounts, _> = store.read(Collection::Accounts).await;
        assert!(matches!(result, Err(StoreError::Decode { .. })));
        // file left alone
        assert_eq!(
            std::fs::read(store.path(Collection::Accounts)).unwrap(),
            b"{ not json"
        );
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let (dir, store) = store().await;
        store
            .write(Collection::Pending, &Counters::new())
            .await
            .unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["pending.json".to_string()]);
    }

    #[tokio::test]
    async fn batch_writes_every_collection() {
        let (_dir, store) = store().await;
        let mut accounts = Accounts::new();
        accounts.insert(
            "u".into(),
            Account {
                balance: Amount::new(9),
                first_topup_used: false,
            },
        );
        let mut counters = Counters::new();
        counters.insert("n".into(), 4);

        let mut batch = Batch::new();
        batch.insert(Collection::Counters, &counters).unwrap();
        batch.insert(Collection::Accounts, &accounts).unwrap();
        assert!(!batch.is_empty());
        store.apply_batch(batch).await.unwrap();

        let read_accounts: Accounts = store.read(Collection::Accounts).await.unwrap();
        let read_counters: Counters = store.read(Collection::Counters).await.unwrap();
        assert_eq!(read_accounts, accounts);
        assert_eq!(read_counters, counters);
    }

    #[tokio::test]
    async fn failed_batch_restores_earlier_writes() {
        let (_dir, store) = store().await;
        let mut before = Counters::new();
        before.insert("n".into(), 1);
        store.write(Collection::Counters, &before).await.unwrap();

        // a directory where the accounts file should be makes the second write fail
        std::fs::create_dir(store.path(Collection::Accounts)).unwrap();

        let mut after = Counters::new();
        after.insert("n".into(), 2);
        let mut batch = Batch::new();
        batch.insert(Collection::Counters, &after).unwrap();
        batch.insert(Collection::Accounts, &Accounts::new()).unwrap();

        assert!(store.apply_batch(batch).await.is_err());

        let read: Counters = store.read(Collection::Counters).await.unwrap();
        assert_eq!(read, before);
    }
}
