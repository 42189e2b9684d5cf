//! The storage API for the [`dfield`](https://docs.rs/dfield/latest/dfield/index.html) crate.
//!
//! A store is a flat key/value system holding the `attributes.json` documents and encoded blocks of a hierarchy of N5 datasets.
//! For example: a filesystem directory or an in-memory map.
//!
//! This crate includes an in-memory store implementation.
//! A filesystem store is provided by the `dfield_filesystem` crate.
//!
//! ## Licence
//! `dfield_storage` is licensed under either of
//! - the Apache License, Version 2.0 or <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license or <http://opensource.org/licenses/MIT>, at your option.

pub mod storage_adapter;
mod storage_sync;
pub mod store;
mod store_key;


use std::sync::Arc;

use thiserror::Error;

pub use store_key::{StoreKey, StoreKeyError, StoreKeys, StorePrefix, StorePrefixError};

pub use self::storage_sync::{
    ListableStorageTraits, ReadableStorageTraits, ReadableWritableStorageTraits,
    WritableStorageTraits,
};

/// [`Arc`] wrapped readable storage.
pub type ReadableStorage = Arc<dyn ReadableStorageTraits>;

/// [`Arc`] wrapped readable and writable storage, such as the storage of an N5 container opened for writing.
pub type ReadableWritableStorage = Arc<dyn ReadableWritableStorageTraits>;

/// The value type of stores: an `attributes.json` document or an encoded block.
pub type Bytes = bytes::Bytes;

/// A value which is [`None`] if its key is not set.
///
/// A block which is not set reads as a block holding only zero.
pub type MaybeBytes = Option<Bytes>;

/// A storage error.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A write to a read only store.
    #[error("a write operation was attempted on a read only store")]
    ReadOnly,
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] Arc<std::io::Error>),
    /// An invalid store prefix.
    #[error("invalid store prefix {0}")]
    StorePrefixError(#[from] StorePrefixError),
    /// An invalid store key.
    #[error("invalid store key {0}")]
    InvalidStoreKey(#[from] StoreKeyError),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(Arc::new(err))
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}
