//! In-memory reference engine.
//!
//! Records live in an ordered map behind a mutex, so range selects and scans
//! are real operations rather than stubs. The store is [`Clone`] so tests can
//! hold a handle for direct inspection while the harness owns a boxed copy.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::{Key, Result, Store, StoreError};

type Map = BTreeMap<Key, Bytes>;

/// An engine keeping all records in an ordered in-memory map.
#[derive(Clone, Debug, Default)]
pub struct MemStore {
    map: Arc<Mutex<Map>>,
}

impl MemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of stored records.
    pub fn len(&self) -> usize {
        self.map.lock().unwrap().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.map.lock().unwrap().is_empty()
    }

    /// Whether the store contains `key`.
    pub fn contains(&self, key: Key) -> bool {
        self.map.lock().unwrap().contains_key(&key)
    }
}

#[async_trait::async_trait]
impl Store for MemStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, key: Key, value: Bytes) -> Result<()> {
        self.map.lock().unwrap().insert(key, value);
        Ok(())
    }

    async fn update(&self, key: Key, value: Bytes) -> Result<()> {
        match self.map.lock().unwrap().get_mut(&key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(StoreError::NotFound(key)),
        }
    }

    async fn remove(&self, key: Key) -> Result<()> {
        self.map
            .lock()
            .unwrap()
            .remove(&key)
            .map(drop)
            .ok_or(StoreError::NotFound(key))
    }

    async fn read(&self, key: Key) -> Result<Bytes> {
        self.map
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(StoreError::NotFound(key))
    }

    async fn batch_upsert(&self, pairs: Vec<(Key, Bytes)>) -> Result<()> {
        let mut map = self.map.lock().unwrap();
        for (key, value) in pairs {
            map.insert(key, value);
        }
        Ok(())
    }

    async fn batch_read(&self, keys: &[Key]) -> Result<Vec<Option<Bytes>>> {
        let map = self.map.lock().unwrap();
        Ok(keys.iter().map(|key| map.get(key).cloned()).collect())
    }

    async fn range_select(&self, start: Key, len: usize) -> Result<Vec<Bytes>> {
        let map = self.map.lock().unwrap();
        Ok(map.range(start..).take(len).map(|(_, value)| value.clone()).collect())
    }

    async fn scan(&self, start: Key, len: usize) -> Result<u64> {
        let map = self.map.lock().unwrap();
        Ok(map
            .range(start..)
            .take(len)
            .map(|(_, value)| value.len() as u64)
            .sum())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn size_on_disk(&self) -> Result<u64> {
        Ok(0)
    }
}
