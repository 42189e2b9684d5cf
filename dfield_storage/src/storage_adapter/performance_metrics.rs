//! A storage adapter which counts storage requests.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{
    Bytes, ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    StoreKeys, StorePrefix, WritableStorageTraits,
};

/// A snapshot of the requests counted by a [`PerformanceMetricsStorageAdapter`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageMetrics {
    /// The number of get requests, including those of unset keys.
    pub reads: u64,
    /// The number of bytes returned by get requests.
    pub bytes_read: u64,
    /// The number of set requests.
    pub writes: u64,
    /// The number of bytes passed to set requests.
    pub bytes_written: u64,
    /// The number of erase requests, including those of unset keys.
    pub keys_erased: u64,
    /// The number of prefix erase requests.
    pub prefixes_erased: u64,
}

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    bytes_read: AtomicU64,
    writes: AtomicU64,
    bytes_written: AtomicU64,
    keys_erased: AtomicU64,
    prefixes_erased: AtomicU64,
}

/// A storage adapter which counts the requests passed through to its storage.
///
/// Tests use it to check the storage traffic of an operation.
/// For example, saving a displacement field writes each non-empty block once, plus the dataset attributes.
///
/// ### Example
/// ```rust
/// # use std::sync::Arc;
/// # use dfield_storage::{store::MemoryStore, StoreKey, WritableStorageTraits};
/// # use dfield_storage::storage_adapter::performance_metrics::PerformanceMetricsStorageAdapter;
/// let store = PerformanceMetricsStorageAdapter::new(Arc::new(MemoryStore::new()));
/// store.set(&StoreKey::new("dfield/0/0")?, vec![0; 8].into())?;
/// assert_eq!(store.writes(), 1);
/// assert_eq!(store.metrics().bytes_written, 8);
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct PerformanceMetricsStorageAdapter<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    counters: Counters,
}

impl<TStorage: ?Sized> PerformanceMetricsStorageAdapter<TStorage> {
    /// Wrap `storage`, with every count at zero.
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self {
            storage,
            counters: Counters::default(),
        }
    }

    /// Reset every count to zero.
    pub fn reset(&self) {
        for counter in [
            &self.counters.reads,
            &self.counters.bytes_read,
            &self.counters.writes,
            &self.counters.bytes_written,
            &self.counters.keys_erased,
            &self.counters.prefixes_erased,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Returns a snapshot of the counts.
    #[must_use]
    pub fn metrics(&self) -> StorageMetrics {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StorageMetrics {
            reads: load(&self.counters.reads),
            bytes_read: load(&self.counters.bytes_read),
            writes: load(&self.counters.writes),
            bytes_written: load(&self.counters.bytes_written),
            keys_erased: load(&self.counters.keys_erased),
            prefixes_erased: load(&self.counters.prefixes_erased),
        }
    }

    /// Returns the number of set requests.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.counters.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of erase requests.
    #[must_use]
    pub fn keys_erased(&self) -> u64 {
        self.counters.keys_erased.load(Ordering::Relaxed)
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits> ReadableStorageTraits
    for PerformanceMetricsStorageAdapter<TStorage>
{
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let value = self.storage.get(key)?;
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        if let Some(bytes) = &value {
            self.counters
                .bytes_read
                .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        }
        Ok(value)
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        self.storage.size_key(key)
    }
}

impl<TStorage: ?Sized + ListableStorageTraits> ListableStorageTraits
    for PerformanceMetricsStorageAdapter<TStorage>
{
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        self.storage.list_prefix(prefix)
    }
}

impl<TStorage: ?Sized + WritableStorageTraits> WritableStorageTraits
    for PerformanceMetricsStorageAdapter<TStorage>
{
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_written
            .fetch_add(value.len() as u64, Ordering::Relaxed);
        self.storage.set(key, value)
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.counters.keys_erased.fetch_add(1, Ordering::Relaxed);
        self.storage.erase(key)
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        self.counters.prefixes_erased.fetch_add(1, Ordering::Relaxed);
        self.storage.erase_prefix(prefix)
    }
}
