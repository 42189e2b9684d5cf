//! The dataset layer: N5 datasets of typed blocks over a key/value store.
//!
//! A dataset is addressed by a `/`-separated path (leading and trailing `/` are ignored).
//! [`ReadableBlockStoreTraits`] and [`WritableBlockStoreTraits`] define the operations the displacement field codec needs from a block store.
//! [`N5BlockStore`] implements them over any [`dfield_storage`] store with the N5 layout:
//! - `<dataset>/attributes.json` holds the [`DatasetAttributes`] and any user attributes, and
//! - `<dataset>/<g0>/<g1>/...` holds the encoded [`DataBlock`] at grid position `(g0, g1, ...)`.

mod attributes;
mod compression;
mod data_block;
mod n5_store;

pub use attributes::DatasetAttributes;
pub use compression::{Compression, CompressionMetadata};
pub use data_block::{BlockData, DataBlock};
pub use n5_store::N5BlockStore;

use dfield_storage::{StorageError, StoreKeyError, StorePrefixError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::data_type::DataType;

/// A block store error.
#[derive(Debug, Error)]
pub enum BlockStoreError {
    /// An error from the underlying key/value store.
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// An IO error during block compression or decompression.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An invalid dataset path.
    #[error("invalid dataset path {0}")]
    InvalidPath(String),
    /// `attributes.json` is not valid JSON.
    #[error("invalid attributes.json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The dataset attributes are malformed.
    #[error("invalid dataset attributes: {0}")]
    InvalidAttributes(String),
    /// The dataset data type is not supported.
    #[error("unsupported data type {0}")]
    UnsupportedDataType(String),
    /// The dataset compression is not supported.
    #[error("unsupported compression {0}")]
    UnsupportedCompression(String),
    /// An encoded block is malformed.
    #[error("invalid block: {0}")]
    InvalidBlock(String),
    /// A grid position does not match the dataset dimensionality.
    #[error("grid position {grid_position:?} is incompatible with a {num_dimensions}-d dataset")]
    IncompatibleGridPosition {
        /// The grid position.
        grid_position: Vec<u64>,
        /// The number of dimensions of the dataset.
        num_dimensions: usize,
    },
    /// The data type of a block does not match the dataset.
    #[error("block data type {block} does not match dataset data type {dataset}")]
    DataTypeMismatch {
        /// The block data type.
        block: DataType,
        /// The dataset data type.
        dataset: DataType,
    },
}

impl From<StoreKeyError> for BlockStoreError {
    fn from(err: StoreKeyError) -> Self {
        Self::InvalidPath(err.to_string())
    }
}

impl From<StorePrefixError> for BlockStoreError {
    fn from(err: StorePrefixError) -> Self {
        Self::InvalidPath(err.to_string())
    }
}

/// Readable block store traits.
pub trait ReadableBlockStoreTraits: Send + Sync {
    /// Retrieve the `attributes.json` object of the dataset or group at `path`.
    ///
    /// Returns [`None`] if there are no attributes at `path`.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the attributes cannot be read or are not a JSON object.
    fn attributes(&self, path: &str) -> Result<Option<Map<String, Value>>, BlockStoreError>;

    /// Retrieve the block of a dataset at `grid_position`.
    ///
    /// Returns [`None`] if the block does not exist.
    /// A missing block holds only the fill value (zero).
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the block cannot be read or decoded.
    fn read_block(
        &self,
        path: &str,
        dataset_attributes: &DatasetAttributes,
        grid_position: &[u64],
    ) -> Result<Option<DataBlock>, BlockStoreError>;

    /// Retrieve the [`DatasetAttributes`] of the dataset at `path`.
    ///
    /// Returns [`None`] if there is no dataset at `path`.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the attributes are malformed or the data type is unsupported.
    fn dataset_attributes(&self, path: &str) -> Result<Option<DatasetAttributes>, BlockStoreError> {
        Ok(match self.attributes(path)? {
            Some(attributes) => DatasetAttributes::from_attributes(&attributes)?,
            None => None,
        })
    }

    /// Returns true if a dataset exists at `path`.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the attributes at `path` cannot be read.
    fn dataset_exists(&self, path: &str) -> Result<bool, BlockStoreError> {
        Ok(self
            .attributes(path)?
            .is_some_and(|attributes| attributes.contains_key("dimensions")))
    }

    /// Retrieve the attribute `key` of the dataset or group at `path`.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the attributes cannot be read.
    fn get_attribute(&self, path: &str, key: &str) -> Result<Option<Value>, BlockStoreError> {
        Ok(self
            .attributes(path)?
            .and_then(|mut attributes| attributes.remove(key)))
    }
}

/// Writable block store traits.
pub trait WritableBlockStoreTraits: ReadableBlockStoreTraits {
    /// Replace the `attributes.json` object of the dataset or group at `path`.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the attributes cannot be written.
    fn write_attributes(
        &self,
        path: &str,
        attributes: &Map<String, Value>,
    ) -> Result<(), BlockStoreError>;

    /// Write the block of a dataset at `grid_position`.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the block is incompatible with the dataset or cannot be written.
    fn write_block(
        &self,
        path: &str,
        dataset_attributes: &DatasetAttributes,
        grid_position: &[u64],
        block: &DataBlock,
    ) -> Result<(), BlockStoreError>;

    /// Delete the block of a dataset at `grid_position`.
    ///
    /// Succeeds if the block does not exist.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the block cannot be deleted.
    fn delete_block(&self, path: &str, grid_position: &[u64]) -> Result<(), BlockStoreError>;

    /// Delete the dataset or group at `path` and everything below it.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the underlying store fails.
    fn remove(&self, path: &str) -> Result<(), BlockStoreError>;

    /// Create (or redefine) the dataset at `path`.
    ///
    /// Existing user attributes are kept.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the attributes cannot be read or written.
    fn create_dataset(
        &self,
        path: &str,
        dataset_attributes: &DatasetAttributes,
    ) -> Result<(), BlockStoreError> {
        let mut attributes = self.attributes(path)?.unwrap_or_default();
        dataset_attributes.write_into(&mut attributes);
        self.write_attributes(path, &attributes)
    }

    /// Merge `attributes` into the attributes at `path`. A [`Value::Null`] removes the key.
    ///
    /// The read-modify-write is not atomic with respect to other writers of the same attributes.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the attributes cannot be read or written.
    fn set_attributes(
        &self,
        path: &str,
        attributes: Map<String, Value>,
    ) -> Result<(), BlockStoreError> {
        let mut merged = self.attributes(path)?.unwrap_or_default();
        for (key, value) in attributes {
            if value.is_null() {
                merged.remove(&key);
            } else {
                merged.insert(key, value);
            }
        }
        self.write_attributes(path, &merged)
    }

    /// Set the attribute `key` at `path`. A [`Value::Null`] removes the key.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the attributes cannot be read or written.
    fn set_attribute(&self, path: &str, key: &str, value: Value) -> Result<(), BlockStoreError> {
        let mut attributes = Map::new();
        attributes.insert(key.to_string(), value);
        self.set_attributes(path, attributes)
    }

    /// Write the block of a dataset at `grid_position` unless it holds only the fill value (zero).
    ///
    /// A block holding only the fill value deletes any previously stored block at `grid_position`, as a missing block reads as the fill value.
    /// Returns true if the block was written.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the block cannot be written or deleted.
    fn write_non_empty_block(
        &self,
        path: &str,
        dataset_attributes: &DatasetAttributes,
        grid_position: &[u64],
        block: &DataBlock,
    ) -> Result<bool, BlockStoreError> {
        if block.is_fill_value() {
            self.delete_block(path, grid_position)?;
            Ok(false)
        } else {
            self.write_block(path, dataset_attributes, grid_position, block)?;
            Ok(true)
        }
    }
}

/// Retrieve and deserialize the attribute `key` of the dataset or group at `path`.
///
/// # Errors
/// Returns a [`BlockStoreError`] if the attributes cannot be read or the attribute cannot be deserialized as `T`.
pub fn get_attribute_as<T: DeserializeOwned, TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
    path: &str,
    key: &str,
) -> Result<Option<T>, BlockStoreError> {
    store
        .get_attribute(path, key)?
        .map(serde_json::from_value)
        .transpose()
        .map_err(BlockStoreError::from)
}
