//! The N5 block store.

use std::sync::Arc;

use dfield_storage::{
    Bytes, ReadableStorageTraits, StoreKey, StorePrefix, WritableStorageTraits,
};
use itertools::Itertools;
use serde_json::{Map, Value};

use super::{
    BlockStoreError, DataBlock, DatasetAttributes, ReadableBlockStoreTraits,
    WritableBlockStoreTraits,
};

const ATTRIBUTES_JSON: &str = "attributes.json";

/// An N5 block store over a key/value store.
///
/// ### Example
/// ```rust
/// # use std::sync::Arc;
/// # use dfield::store::{N5BlockStore, ReadableBlockStoreTraits};
/// # use dfield_storage::store::MemoryStore;
/// let store = N5BlockStore::new(Arc::new(MemoryStore::new()));
/// assert!(!store.dataset_exists("dfield")?);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct N5BlockStore<TStorage: ?Sized> {
    storage: Arc<TStorage>,
}

impl<TStorage: ?Sized> Clone for N5BlockStore<TStorage> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
        }
    }
}

impl<TStorage: ?Sized> N5BlockStore<TStorage> {
    /// Create a new N5 block store over `storage`.
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self { storage }
    }

    /// Returns the underlying storage.
    #[must_use]
    pub fn storage(&self) -> Arc<TStorage> {
        self.storage.clone()
    }

    /// Returns the store prefix of the dataset or group at `path`.
    fn prefix(path: &str) -> Result<StorePrefix, BlockStoreError> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            Ok(StorePrefix::root())
        } else {
            Ok(StorePrefix::new(format!("{path}/"))?)
        }
    }

    fn attributes_key(path: &str) -> Result<StoreKey, BlockStoreError> {
        Ok(Self::prefix(path)?.key(ATTRIBUTES_JSON)?)
    }

    /// Returns the store key of the block at `grid_position` of the dataset at `path`.
    ///
    /// # Errors
    /// Returns [`BlockStoreError::InvalidPath`] if `path` is not a valid dataset path.
    pub fn block_key(path: &str, grid_position: &[u64]) -> Result<StoreKey, BlockStoreError> {
        Ok(Self::prefix(path)?.key(&grid_position.iter().join("/"))?)
    }
}

fn validate_grid_position(
    dataset_attributes: &DatasetAttributes,
    grid_position: &[u64],
) -> Result<(), BlockStoreError> {
    if grid_position.len() == dataset_attributes.num_dimensions() {
        Ok(())
    } else {
        Err(BlockStoreError::IncompatibleGridPosition {
            grid_position: grid_position.to_vec(),
            num_dimensions: dataset_attributes.num_dimensions(),
        })
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits> ReadableBlockStoreTraits for N5BlockStore<TStorage> {
    fn attributes(&self, path: &str) -> Result<Option<Map<String, Value>>, BlockStoreError> {
        let Some(bytes) = self.storage.get(&Self::attributes_key(path)?)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes)? {
            Value::Object(attributes) => Ok(Some(attributes)),
            other => Err(BlockStoreError::InvalidAttributes(format!(
                "{ATTRIBUTES_JSON} of {path} is not an object: {other}"
            ))),
        }
    }

    fn read_block(
        &self,
        path: &str,
        dataset_attributes: &DatasetAttributes,
        grid_position: &[u64],
    ) -> Result<Option<DataBlock>, BlockStoreError> {
        validate_grid_position(dataset_attributes, grid_position)?;
        let Some(encoded) = self.storage.get(&Self::block_key(path, grid_position)?)? else {
            return Ok(None);
        };
        let block = DataBlock::decode(
            &encoded,
            dataset_attributes.data_type(),
            dataset_attributes.compression(),
        )?;
        if block.size().len() == dataset_attributes.num_dimensions() {
            Ok(Some(block))
        } else {
            Err(BlockStoreError::InvalidBlock(format!(
                "block {grid_position:?} of {path} has size {:?}",
                block.size()
            )))
        }
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits + WritableStorageTraits> WritableBlockStoreTraits
    for N5BlockStore<TStorage>
{
    fn write_attributes(
        &self,
        path: &str,
        attributes: &Map<String, Value>,
    ) -> Result<(), BlockStoreError> {
        let bytes = serde_json::to_vec_pretty(attributes)?;
        self.storage
            .set(&Self::attributes_key(path)?, Bytes::from(bytes))?;
        Ok(())
    }

    fn write_block(
        &self,
        path: &str,
        dataset_attributes: &DatasetAttributes,
        grid_position: &[u64],
        block: &DataBlock,
    ) -> Result<(), BlockStoreError> {
        validate_grid_position(dataset_attributes, grid_position)?;
        if block.data().data_type() != dataset_attributes.data_type() {
            return Err(BlockStoreError::DataTypeMismatch {
                block: block.data().data_type(),
                dataset: dataset_attributes.data_type(),
            });
        }
        let encoded = block.encode(dataset_attributes.compression())?;
        self.storage
            .set(&Self::block_key(path, grid_position)?, Bytes::from(encoded))?;
        Ok(())
    }

    fn delete_block(&self, path: &str, grid_position: &[u64]) -> Result<(), BlockStoreError> {
        self.storage.erase(&Self::block_key(path, grid_position)?)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), BlockStoreError> {
        self.storage.erase_prefix(&Self::prefix(path)?)?;
        Ok(())
    }
}
