use thiserror::Error;

use crate::{
    axis::AxisConventionError,
    chunk_grid::ChunkGridCreateError,
    quantization::QuantizationError,
    scheduler::WriteSummary,
    store::BlockStoreError,
    transform::{AffineTransformError, IncompatibleDimensionalityError},
};

/// A displacement field error.
#[derive(Debug, Error)]
pub enum DisplacementFieldError {
    /// The vector axis of a field is neither its first nor its last axis.
    #[error(transparent)]
    AxisConvention(#[from] AxisConventionError),
    /// The dataset could not be created. No blocks were written.
    #[error("failed to create dataset {dataset}: {source}")]
    DatasetCreation {
        /// The dataset path.
        dataset: String,
        /// The underlying error.
        #[source]
        source: BlockStoreError,
    },
    /// Some blocks failed to write. The remaining blocks and the dataset metadata were written.
    #[error("{} of {} blocks of dataset {dataset} failed to write", .summary.failures().len(), .summary.blocks_total())]
    PartialWrite {
        /// The dataset path.
        dataset: String,
        /// The summary of the write, including every block failure.
        summary: WriteSummary,
    },
    /// The data type is not supported for the requested operation.
    #[error("unsupported data type {data_type}, expected {expected}")]
    UnsupportedDataType {
        /// The data type name.
        data_type: String,
        /// The supported data types.
        expected: &'static str,
    },
    /// The dataset does not exist.
    #[error("dataset {0} does not exist")]
    DatasetNotFound(String),
    /// A block read from the store does not match the dataset.
    #[error("block {grid_position:?} of dataset {dataset} is invalid: {reason}")]
    InvalidBlock {
        /// The dataset path.
        dataset: String,
        /// The grid position of the block.
        grid_position: Vec<u64>,
        /// The reason the block is invalid.
        reason: String,
    },
    /// Incompatible dimensionality of a transform, field, or metadata.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
    /// Invalid quantization parameters or an out-of-range quantized displacement.
    #[error(transparent)]
    InvalidQuantization(#[from] QuantizationError),
    /// An invalid block grid.
    #[error(transparent)]
    ChunkGrid(#[from] ChunkGridCreateError),
    /// An invalid affine transform.
    #[error(transparent)]
    Affine(#[from] AffineTransformError),
    /// A field array does not match its shape.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    /// A field does not match the shape of the dataset it is written to.
    #[error("field shape {got:?} does not match the dataset shape {expected:?}")]
    IncompatibleShape {
        /// The shape of the field.
        got: Vec<u64>,
        /// The shape of the dataset.
        expected: Vec<u64>,
    },
    /// A block store error.
    #[error(transparent)]
    Store(BlockStoreError),
}

impl From<BlockStoreError> for DisplacementFieldError {
    fn from(err: BlockStoreError) -> Self {
        match err {
            BlockStoreError::UnsupportedDataType(data_type) => Self::UnsupportedDataType {
                data_type,
                expected: "an integer or floating point data type",
            },
            err => Self::Store(err),
        }
    }
}
