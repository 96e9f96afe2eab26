//! File-per-record reference engine.
//!
//! Every record is a file named after its zero-padded hex key, so the
//! lexicographic directory order is also the key order and ranges can be
//! served from a sorted listing. Slow, but it exercises the whole contract
//! against real I/O.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::{Key, Result, Store, StoreError};

/// An engine storing one file per record under a root directory.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Opens the store rooted at `root`, creating the directory if needed.
    /// Records from a previous run under the same root stay readable.
    pub async fn new(root: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(root).await?;
        Ok(Self { root: root.into() })
    }

    fn path_for(&self, key: Key) -> PathBuf {
        self.root.join(format!("{key:016x}.val"))
    }

    /// All keys `>= start`, sorted ascending.
    async fn keys_from(&self, start: Key) -> Result<Vec<Key>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(hex) = name.strip_suffix(".val") else {
                continue;
            };
            let Ok(key) = Key::from_str_radix(hex, 16) else {
                continue;
            };
            if key >= start {
                keys.push(key);
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }
}

#[async_trait::async_trait]
impl Store for FsStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn upsert(&self, key: Key, value: Bytes) -> Result<()> {
        tokio::fs::write(self.path_for(key), &value).await?;
        Ok(())
    }

    async fn update(&self, key: Key, value: Bytes) -> Result<()> {
        match tokio::fs::metadata(self.path_for(key)).await {
            Ok(_) => self.upsert(key, value).await,
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key)),
            Err(err) => Err(err.into()),
        }
    }

    async fn remove(&self, key: Key) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key)),
            Err(err) => Err(err.into()),
        }
    }

    async fn read(&self, key: Key) -> Result<Bytes> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(contents) => Ok(contents.into()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key)),
            Err(err) => Err(err.into()),
        }
    }

    async fn batch_upsert(&self, pairs: Vec<(Key, Bytes)>) -> Result<()> {
        for (key, value) in pairs {
            self.upsert(key, value).await?;
        }
        Ok(())
    }

    async fn batch_read(&self, keys: &[Key]) -> Result<Vec<Option<Bytes>>> {
        let mut values = Vec::with_capacity(keys.len());
        for &key in keys {
            match self.read(key).await {
                Ok(value) => values.push(Some(value)),
                Err(StoreError::NotFound(_)) => values.push(None),
                Err(err) => return Err(err),
            }
        }
        Ok(values)
    }

    async fn range_select(&self, start: Key, len: usize) -> Result<Vec<Bytes>> {
        let mut values = Vec::with_capacity(len);
        for key in self.keys_from(start).await?.into_iter().take(len) {
            // Keys can vanish between the listing and the read.
            match self.read(key).await {
                Ok(value) => values.push(value),
                Err(StoreError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(values)
    }

    async fn scan(&self, start: Key, len: usize) -> Result<u64> {
        let mut total = 0u64;
        for key in self.keys_from(start).await?.into_iter().take(len) {
            match tokio::fs::metadata(self.path_for(key)).await {
                Ok(metadata) => total += metadata.len(),
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(total)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn size_on_disk(&self) -> Result<u64> {
        let mut total = 0u64;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            total += entry.metadata().await?.len();
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_read_roundtrips() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = FsStore::new(tempdir.path()).await.unwrap();
        store.upsert(1, Bytes::from_static(b"oh hai!")).await.unwrap();
        assert_eq!(store.read(1).await.unwrap(), Bytes::from_static(b"oh hai!"));
    }

    #[tokio::test]
    async fn records_survive_a_reopen() {
        let tempdir = tempfile::tempdir().unwrap();
        {
            let store = FsStore::new(tempdir.path()).await.unwrap();
            store.upsert(42, Bytes::from_static(b"persisted")).await.unwrap();
            store.flush().await.unwrap();
        }
        let store = FsStore::new(tempdir.path()).await.unwrap();
        assert_eq!(
            store.read(42).await.unwrap(),
            Bytes::from_static(b"persisted")
        );
        assert!(store.size_on_disk().await.unwrap() > 0);
    }

    #[tokio::test]
    async fn update_and_remove_report_missing_keys() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = FsStore::new(tempdir.path()).await.unwrap();
        assert!(
            store
                .update(7, Bytes::from_static(b"x"))
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(store.remove(7).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn ranges_come_back_in_key_order() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = FsStore::new(tempdir.path()).await.unwrap();
        for key in [5u64, 1, 9, 3, 7] {
            store
                .upsert(key, Bytes::from(key.to_string().into_bytes()))
                .await
                .unwrap();
        }
        let values = store.range_select(3, 3).await.unwrap();
        assert_eq!(
            values,
            vec![
                Bytes::from_static(b"3"),
                Bytes::from_static(b"5"),
                Bytes::from_static(b"7"),
            ]
        );
        assert_eq!(store.scan(3, 3).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn batch_read_marks_missing_keys() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = FsStore::new(tempdir.path()).await.unwrap();
        store.upsert(1, Bytes::from_static(b"a")).await.unwrap();
        let values = store.batch_read(&[1, 2]).await.unwrap();
        assert_eq!(values, vec![Some(Bytes::from_static(b"a")), None]);
    }
}
