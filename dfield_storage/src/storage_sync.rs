use auto_impl::auto_impl;

use super::{Bytes, MaybeBytes, StorageError, StoreKey, StoreKeys, StorePrefix};

/// Readable storage traits.
///
/// Values are whole `attributes.json` documents or whole encoded blocks, so there is no partial read.
#[auto_impl(Arc)]
pub trait ReadableStorageTraits: Send + Sync {
    /// Retrieve the value at `key`, or [`None`] if `key` is not set.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the value exists but cannot be read.
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError>;

    /// Return the size in bytes of the value at `key`, or [`None`] if `key` is not set.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the size cannot be determined.
    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError>;

    /// Returns true if `key` is set.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the size cannot be determined.
    fn contains_key(&self, key: &StoreKey) -> Result<bool, StorageError> {
        Ok(self.size_key(key)?.is_some())
    }
}

/// Listable storage traits.
#[auto_impl(Arc)]
pub trait ListableStorageTraits: Send + Sync {
    /// Retrieve the keys below `prefix` in lexicographical order.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the keys cannot be listed.
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError>;

    /// Retrieve every key in lexicographical order.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the keys cannot be listed.
    fn list(&self) -> Result<StoreKeys, StorageError> {
        self.list_prefix(&StorePrefix::root())
    }
}

/// Writable storage traits.
///
/// Implementations must support concurrent writers to distinct keys, as the blocks of a dataset are written in parallel.
#[auto_impl(Arc)]
pub trait WritableStorageTraits: Send + Sync {
    /// Set the value at `key`, replacing any existing value.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the value cannot be stored.
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError>;

    /// Erase the value at `key`. Succeeds if `key` is not set.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the value exists but cannot be erased.
    fn erase(&self, key: &StoreKey) -> Result<(), StorageError>;

    /// Erase every value below `prefix`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if a value cannot be erased.
    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError>;
}

/// A supertrait of [`ReadableStorageTraits`] and [`WritableStorageTraits`], for use as a trait object.
pub trait ReadableWritableStorageTraits: ReadableStorageTraits + WritableStorageTraits {}

impl<T> ReadableWritableStorageTraits for T where T: ReadableStorageTraits + WritableStorageTraits
{}
