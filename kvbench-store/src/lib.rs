//! The uniform key-value operation contract the benchmark harness drives,
//! together with two self-contained reference engines.
//!
//! Every engine implements [`Store`]; the harness only ever talks to the
//! trait. The [`MemStore`] engine keeps records in an ordered in-memory map,
//! the [`FsStore`] engine keeps one file per record, so the full contract
//! (including ordered ranges and scans) can be exercised without any
//! external service.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod error;
mod local_fs;
mod mem;

pub use crate::error::StoreError;
pub use crate::local_fs::FsStore;
pub use crate::mem::MemStore;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

/// The key type addressed by the harness.
pub type Key = u64;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The uniform operation contract every benchmarked engine implements.
#[async_trait::async_trait]
pub trait Store: fmt::Debug + Send + Sync {
    /// A short engine name for logs and reports.
    fn name(&self) -> &'static str;

    /// Inserts `key`, overwriting any previous value.
    async fn upsert(&self, key: Key, value: Bytes) -> Result<()>;

    /// Overwrites `key`, failing with [`StoreError::NotFound`] if it does not
    /// exist.
    async fn update(&self, key: Key, value: Bytes) -> Result<()>;

    /// Deletes `key`, failing with [`StoreError::NotFound`] if it does not
    /// exist.
    async fn remove(&self, key: Key) -> Result<()>;

    /// Reads the value stored at `key`.
    async fn read(&self, key: Key) -> Result<Bytes>;

    /// Inserts a batch of records, overwriting previous values.
    async fn batch_upsert(&self, pairs: Vec<(Key, Bytes)>) -> Result<()>;

    /// Reads a batch of records; missing keys yield `None`.
    async fn batch_read(&self, keys: &[Key]) -> Result<Vec<Option<Bytes>>>;

    /// Loads a batch of records during the preload phase. Engines may
    /// override this with a cheaper import path.
    async fn bulk_load(&self, pairs: Vec<(Key, Bytes)>) -> Result<()> {
        self.batch_upsert(pairs).await
    }

    /// Returns up to `len` values in key order, starting at the first key
    /// `>= start`.
    async fn range_select(&self, start: Key, len: usize) -> Result<Vec<Bytes>>;

    /// Traverses up to `len` records in key order starting at the first key
    /// `>= start`, returning the number of value bytes touched.
    async fn scan(&self, start: Key, len: usize) -> Result<u64>;

    /// Flushes any buffered state.
    async fn flush(&self) -> Result<()>;

    /// The number of bytes the engine currently occupies on disk.
    async fn size_on_disk(&self) -> Result<u64>;
}

/// Configuration to open a [`Store`].
#[derive(Debug)]
pub enum StoreConfig<'a> {
    /// The in-memory reference engine.
    Memory,
    /// The file-per-record reference engine.
    FileSystem {
        /// The directory records are stored under; created if missing.
        path: &'a Path,
    },
}

/// Opens the engine described by `config`.
pub async fn open(config: StoreConfig<'_>) -> Result<Arc<dyn Store>> {
    Ok(match config {
        StoreConfig::Memory => Arc::new(MemStore::new()),
        StoreConfig::FileSystem { path } => Arc::new(FsStore::new(path).await?),
    })
}
