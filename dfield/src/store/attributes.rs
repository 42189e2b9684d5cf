//! N5 dataset attributes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{compression::CompressionMetadata, BlockStoreError, Compression};
use crate::data_type::DataType;

const DIMENSIONS: &str = "dimensions";

/// The `attributes.json` object of an N5 dataset.
///
/// For example:
/// ```json
/// {
///     "dimensions": [2, 64, 64],
///     "blockSize": [2, 32, 32],
///     "dataType": "int16",
///     "compression": { "type": "gzip", "level": -1, "useZlib": false },
///     "quantization_multiplier": 0.07
/// }
/// ```
/// Datasets written by old N5 versions name only a `compressionType`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct DatasetAttributesMetadata {
    dimensions: Vec<u64>,
    block_size: Vec<u64>,
    data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compression: Option<CompressionMetadata>,
    #[serde(default, skip_serializing)]
    compression_type: Option<String>,
    #[serde(flatten)]
    additional: Map<String, Value>,
}

/// The shape, block shape, data type, and compression of a dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetAttributes {
    dimensions: Vec<u64>,
    block_size: Vec<u64>,
    data_type: DataType,
    compression: Compression,
}

impl DatasetAttributes {
    /// Create new dataset attributes.
    ///
    /// # Errors
    /// Returns [`BlockStoreError::InvalidAttributes`] if the dimensionality of `dimensions` and `block_size` differ or a block size is zero.
    pub fn new(
        dimensions: Vec<u64>,
        block_size: Vec<u64>,
        data_type: DataType,
        compression: Compression,
    ) -> Result<Self, BlockStoreError> {
        if dimensions.len() != block_size.len() {
            return Err(BlockStoreError::InvalidAttributes(format!(
                "dimensions {dimensions:?} and block size {block_size:?} have different dimensionality"
            )));
        }
        if block_size.contains(&0) {
            return Err(BlockStoreError::InvalidAttributes(format!(
                "block size {block_size:?} has a zero extent"
            )));
        }
        Ok(Self {
            dimensions,
            block_size,
            data_type,
            compression,
        })
    }

    /// Returns the shape of the dataset.
    #[must_use]
    pub fn dimensions(&self) -> &[u64] {
        &self.dimensions
    }

    /// Returns the block shape of the dataset.
    #[must_use]
    pub fn block_size(&self) -> &[u64] {
        &self.block_size
    }

    /// Returns the number of dimensions of the dataset.
    #[must_use]
    pub fn num_dimensions(&self) -> usize {
        self.dimensions.len()
    }

    /// Returns the element data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the block compression.
    #[must_use]
    pub fn compression(&self) -> &Compression {
        &self.compression
    }

    /// Write the dataset keys into an `attributes.json` object, keeping any other attributes.
    pub fn write_into(&self, attributes: &mut Map<String, Value>) {
        let mut additional = std::mem::take(attributes);
        additional.remove("compressionType");
        let metadata = DatasetAttributesMetadata {
            dimensions: self.dimensions.clone(),
            block_size: self.block_size.clone(),
            data_type: self.data_type.name().to_string(),
            compression: Some(self.compression.to_metadata()),
            compression_type: None,
            additional,
        };
        if let Ok(Value::Object(map)) = serde_json::to_value(metadata) {
            *attributes = map;
        }
    }

    /// Read the dataset keys of an `attributes.json` object.
    ///
    /// Returns [`None`] if the object has no `dimensions` (it is a group, not a dataset).
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the dataset keys are malformed or the data type or compression is unsupported.
    pub fn from_attributes(attributes: &Map<String, Value>) -> Result<Option<Self>, BlockStoreError> {
        if !attributes.contains_key(DIMENSIONS) {
            return Ok(None);
        }
        let metadata: DatasetAttributesMetadata =
            serde_json::from_value(Value::Object(attributes.clone()))
                .map_err(|err| BlockStoreError::InvalidAttributes(err.to_string()))?;
        let data_type = DataType::from_name(&metadata.data_type)
            .ok_or(BlockStoreError::UnsupportedDataType(metadata.data_type))?;
        let compression = match (metadata.compression, metadata.compression_type) {
            (Some(compression), _) => Compression::from_metadata(&compression)?,
            (None, Some(compression_type)) => {
                Compression::from_metadata(&CompressionMetadata::new(compression_type, Map::new()))?
            }
            (None, None) => Compression::Raw,
        };
        Self::new(metadata.dimensions, metadata.block_size, data_type, compression).map(Some)
    }
}
