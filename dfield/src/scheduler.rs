//! Parallel evaluation and storage of every block of a displacement field dataset.
//!
//! [`write_all_blocks`] creates the dataset, then fills and writes each block in an independent task.
//! Tasks share no mutable state: each owns its block buffer and its own copy of the transform.
//! The number of in-flight tasks is bounded by the concurrent target of the [`WriteOptions`].
//!
//! A failed block does not cancel its siblings.
//! Every failure is logged and returned in the [`WriteSummary`].

use std::sync::Arc;

use ndarray::Slice;
use rayon::prelude::*;
use rayon::ThreadPool;
use rayon_iter_concurrent_limit::iter_concurrent_limit;
use thiserror::Error;

use crate::{
    array::FieldArray,
    chunk_grid::{BlockSubset, ChunkGridPlan},
    config::global_config,
    element::Element,
    error::DisplacementFieldError,
    evaluator::{block_pixel_to_physical, evaluate_block, SampleConverter},
    quantization::{OverflowPolicy, QuantizationError},
    store::{
        BlockStoreError, Compression, DataBlock, DatasetAttributes, WritableBlockStoreTraits,
    },
    transform::{
        AffineTransform, AffineTransformError, IncompatibleDimensionalityError, RealTransform,
    },
};

/// Options for writing a displacement field.
///
/// The default values are:
/// - `concurrent_target`: the global [concurrent target](crate::config::Config#concurrent-target)
/// - `store_empty_blocks`: the global [store empty blocks](crate::config::Config#store-empty-blocks) setting
/// - `overflow_policy`: [`OverflowPolicy::Saturate`]
/// - `thread_pool`: [`None`] (the current rayon pool)
#[derive(Clone, Debug)]
pub struct WriteOptions {
    concurrent_target: usize,
    store_empty_blocks: bool,
    overflow_policy: OverflowPolicy,
    thread_pool: Option<Arc<ThreadPool>>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        let config = global_config();
        Self {
            concurrent_target: config.concurrent_target(),
            store_empty_blocks: config.store_empty_blocks(),
            overflow_policy: OverflowPolicy::default(),
            thread_pool: None,
        }
    }
}

impl WriteOptions {
    /// Return the concurrent target.
    #[must_use]
    pub fn concurrent_target(&self) -> usize {
        self.concurrent_target
    }

    /// Set the concurrent target. Zero is treated as one.
    pub fn set_concurrent_target(&mut self, concurrent_target: usize) -> &mut Self {
        self.concurrent_target = concurrent_target.max(1);
        self
    }

    /// Set the concurrent target. Zero is treated as one.
    #[must_use]
    pub fn with_concurrent_target(mut self, concurrent_target: usize) -> Self {
        self.set_concurrent_target(concurrent_target);
        self
    }

    /// Return the store empty blocks setting.
    #[must_use]
    pub fn store_empty_blocks(&self) -> bool {
        self.store_empty_blocks
    }

    /// Set whether or not to store blocks holding only zero.
    pub fn set_store_empty_blocks(&mut self, store_empty_blocks: bool) -> &mut Self {
        self.store_empty_blocks = store_empty_blocks;
        self
    }

    /// Set whether or not to store blocks holding only zero.
    #[must_use]
    pub fn with_store_empty_blocks(mut self, store_empty_blocks: bool) -> Self {
        self.store_empty_blocks = store_empty_blocks;
        self
    }

    /// Return the quantization overflow policy.
    #[must_use]
    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    /// Set the quantization overflow policy.
    pub fn set_overflow_policy(&mut self, overflow_policy: OverflowPolicy) -> &mut Self {
        self.overflow_policy = overflow_policy;
        self
    }

    /// Set the quantization overflow policy.
    #[must_use]
    pub fn with_overflow_policy(mut self, overflow_policy: OverflowPolicy) -> Self {
        self.overflow_policy = overflow_policy;
        self
    }

    /// Return the thread pool blocks are processed in, if set.
    #[must_use]
    pub fn thread_pool(&self) -> Option<&Arc<ThreadPool>> {
        self.thread_pool.as_ref()
    }

    /// Process blocks in `thread_pool` rather than the current rayon pool.
    ///
    /// The pool is only borrowed for the duration of a write, its lifecycle belongs to the caller.
    #[must_use]
    pub fn with_thread_pool(mut self, thread_pool: Arc<ThreadPool>) -> Self {
        self.thread_pool = Some(thread_pool);
        self
    }
}

/// The error of a single block task.
#[derive(Debug, Error)]
pub enum BlockTaskError {
    /// A displacement did not fit the quantized data type.
    #[error(transparent)]
    Quantization(#[from] QuantizationError),
    /// The block could not be written.
    #[error(transparent)]
    Store(#[from] BlockStoreError),
    /// The block position could not be mapped to physical coordinates.
    #[error(transparent)]
    Transform(#[from] AffineTransformError),
    /// The block is not inside the source field.
    #[error("block at {0:?} is outside of the source field")]
    OutOfBounds(Vec<u64>),
}

/// A block that failed to write.
#[derive(Debug)]
pub struct BlockWriteFailure {
    grid_position: Vec<u64>,
    error: BlockTaskError,
}

impl BlockWriteFailure {
    /// Returns the grid position of the block.
    #[must_use]
    pub fn grid_position(&self) -> &[u64] {
        &self.grid_position
    }

    /// Returns the error.
    #[must_use]
    pub fn error(&self) -> &BlockTaskError {
        &self.error
    }
}

/// The outcome of writing every block of a dataset.
#[derive(Debug, Default)]
pub struct WriteSummary {
    blocks_total: u64,
    blocks_written: u64,
    blocks_skipped: u64,
    saturated_samples: u64,
    failures: Vec<BlockWriteFailure>,
}

impl WriteSummary {
    /// Returns the number of blocks of the dataset.
    #[must_use]
    pub fn blocks_total(&self) -> u64 {
        self.blocks_total
    }

    /// Returns the number of blocks written to the store.
    #[must_use]
    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Returns the number of blocks not stored because they hold only zero.
    #[must_use]
    pub fn blocks_skipped(&self) -> u64 {
        self.blocks_skipped
    }

    /// Returns the number of quantized samples clamped to the range of the data type.
    #[must_use]
    pub fn saturated_samples(&self) -> u64 {
        self.saturated_samples
    }

    /// Returns the blocks that failed to write, in grid order.
    #[must_use]
    pub fn failures(&self) -> &[BlockWriteFailure] {
        &self.failures
    }

    /// Returns true if every block was written or skipped.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the summary of the two datasets written by a forward and inverse save.
    #[must_use]
    pub(crate) fn merge(mut self, other: Self) -> Self {
        self.blocks_total += other.blocks_total;
        self.blocks_written += other.blocks_written;
        self.blocks_skipped += other.blocks_skipped;
        self.saturated_samples += other.saturated_samples;
        self.failures.extend(other.failures);
        self
    }
}

/// A source of block samples.
pub trait BlockSource: Sync {
    /// Returns the number of spatial dimensions of the field.
    fn num_spatial_dimensions(&self) -> usize;

    /// Returns the dataset shape `[n, spatial...]` the source covers, or [`None`] if it can be evaluated at any pixel.
    fn shape(&self) -> Option<Vec<u64>> {
        None
    }

    /// Fill `buffer` with the samples of `block` in axis 0 fastest order, vector axis first.
    ///
    /// Returns the number of samples clamped by `converter`.
    ///
    /// # Errors
    /// Returns a [`BlockTaskError`] if a quantized sample overflows and overflow is an error, or the block cannot be evaluated.
    fn fill_block<T: Element>(
        &self,
        block: &BlockSubset,
        buffer: &mut [T],
        converter: &SampleConverter,
    ) -> Result<u64, BlockTaskError>;
}

/// Blocks evaluated from a transform.
#[derive(Debug)]
pub struct TransformBlockSource<'a> {
    transform: &'a dyn RealTransform,
    pixel_to_physical: AffineTransform,
}

impl<'a> TransformBlockSource<'a> {
    /// Evaluate the displacement of `transform` at the physical position (`pixel_to_physical`) of each pixel.
    #[must_use]
    pub fn new(transform: &'a dyn RealTransform, pixel_to_physical: AffineTransform) -> Self {
        Self {
            transform,
            pixel_to_physical,
        }
    }
}

impl BlockSource for TransformBlockSource<'_> {
    fn num_spatial_dimensions(&self) -> usize {
        self.pixel_to_physical.num_dimensions()
    }

    fn fill_block<T: Element>(
        &self,
        block: &BlockSubset,
        buffer: &mut [T],
        converter: &SampleConverter,
    ) -> Result<u64, BlockTaskError> {
        let block_to_physical =
            block_pixel_to_physical(&self.pixel_to_physical, block.spatial_start())?;
        let mut transform = self.transform.copy();
        Ok(evaluate_block(
            transform.as_mut(),
            &block_to_physical,
            block.spatial_shape(),
            buffer,
            converter,
        )?)
    }
}

/// Blocks copied from a vector-first displacement field.
#[derive(Debug)]
pub struct FieldBlockSource<'a, S> {
    field: &'a FieldArray<S>,
}

impl<'a, S: Element> FieldBlockSource<'a, S> {
    /// Copy blocks from `field` with shape `[n, spatial...]`.
    #[must_use]
    pub fn new(field: &'a FieldArray<S>) -> Self {
        Self { field }
    }
}

impl<S: Element> BlockSource for FieldBlockSource<'_, S> {
    fn num_spatial_dimensions(&self) -> usize {
        self.field.ndim().saturating_sub(1)
    }

    fn shape(&self) -> Option<Vec<u64>> {
        Some(self.field.shape().iter().map(|&extent| extent as u64).collect())
    }

    fn fill_block<T: Element>(
        &self,
        block: &BlockSubset,
        buffer: &mut [T],
        converter: &SampleConverter,
    ) -> Result<u64, BlockTaskError> {
        let in_bounds = block.shape().len() == self.field.ndim()
            && block
                .start()
                .iter()
                .zip(block.shape())
                .zip(self.field.shape())
                .all(|((start, shape), &extent)| start + shape <= extent as u64);
        if !in_bounds {
            return Err(BlockTaskError::OutOfBounds(block.grid_position().to_vec()));
        }
        let view = self.field.slice_each_axis(|axis| {
            let start = block.start()[axis.axis.index()] as usize;
            Slice::from(start..start + block.shape()[axis.axis.index()] as usize)
        });
        let mut saturated = 0;
        // reversed axes iterate axis 0 fastest
        for (element, displacement) in buffer.iter_mut().zip(view.t().iter()) {
            let (value, clamped) = converter.convert::<T>(displacement.as_f64())?;
            *element = value;
            saturated += u64::from(clamped);
        }
        Ok(saturated)
    }
}

enum BlockOutcome {
    Written { saturated: u64 },
    Skipped { saturated: u64 },
}

/// Create the dataset at `path` and write every block of `grid` filled by `source`.
///
/// Elements are stored as `T`, converted from displacements by `converter`.
/// Blocks are processed concurrently, in the thread pool of `options` if set.
///
/// Returns a [`WriteSummary`] which lists any blocks that failed to write.
///
/// # Errors
/// Returns a [`DisplacementFieldError`] before creating the dataset if `source` does not match `grid`:
/// [`IncompatibleDimensionality`](DisplacementFieldError::IncompatibleDimensionality) for a different number of spatial dimensions,
/// [`IncompatibleShape`](DisplacementFieldError::IncompatibleShape) for a different shape.
///
/// Returns [`DisplacementFieldError::DatasetCreation`] if the dataset cannot be created, in which case no blocks are written.
pub fn write_all_blocks<T, TStore, TSource>(
    store: &TStore,
    path: &str,
    grid: &ChunkGridPlan,
    compression: &Compression,
    source: &TSource,
    converter: &SampleConverter,
    options: &WriteOptions,
) -> Result<WriteSummary, DisplacementFieldError>
where
    T: Element,
    TStore: ?Sized + WritableBlockStoreTraits,
    TSource: BlockSource,
{
    check_source(grid, source)?;
    let dataset_attributes = DatasetAttributes::new(
        grid.output_shape().to_vec(),
        grid.block_shape(),
        T::DATA_TYPE,
        *compression,
    )
    .and_then(|dataset_attributes| {
        store.create_dataset(path, &dataset_attributes)?;
        Ok(dataset_attributes)
    })
    .map_err(|source| DisplacementFieldError::DatasetCreation {
        dataset: path.to_string(),
        source,
    })?;

    let num_blocks = usize::try_from(grid.num_blocks()).unwrap_or(usize::MAX);
    let store_empty_blocks = options.store_empty_blocks();
    let write_block = |flat_index: usize| -> Option<Result<BlockOutcome, BlockWriteFailure>> {
        let block = grid.block(flat_index as u64)?;
        let fail = |error: BlockTaskError| BlockWriteFailure {
            grid_position: block.grid_position().to_vec(),
            error,
        };
        let mut buffer = vec![T::default(); block.num_elements_usize()];
        let saturated = match source.fill_block(&block, &mut buffer, converter) {
            Ok(saturated) => saturated,
            Err(err) => return Some(Err(fail(err))),
        };
        let write = || -> Result<bool, BlockStoreError> {
            let data_block = DataBlock::new(block.shape().to_vec(), T::into_block_data(buffer))?;
            if store_empty_blocks {
                store.write_block(path, &dataset_attributes, block.grid_position(), &data_block)?;
                Ok(true)
            } else {
                store.write_non_empty_block(
                    path,
                    &dataset_attributes,
                    block.grid_position(),
                    &data_block,
                )
            }
        };
        Some(match write() {
            Ok(true) => Ok(BlockOutcome::Written { saturated }),
            Ok(false) => Ok(BlockOutcome::Skipped { saturated }),
            Err(err) => Err(fail(err.into())),
        })
    };

    let concurrent_target = options.concurrent_target();
    let write_blocks = || {
        iter_concurrent_limit!(concurrent_target, (0..num_blocks), filter_map, write_block)
            .collect::<Vec<_>>()
    };
    let outcomes = match options.thread_pool() {
        Some(thread_pool) => thread_pool.install(write_blocks),
        None => write_blocks(),
    };

    let mut summary = WriteSummary {
        blocks_total: grid.num_blocks(),
        ..WriteSummary::default()
    };
    for outcome in outcomes {
        match outcome {
            Ok(BlockOutcome::Written { saturated }) => {
                summary.blocks_written += 1;
                summary.saturated_samples += saturated;
            }
            Ok(BlockOutcome::Skipped { saturated }) => {
                summary.blocks_skipped += 1;
                summary.saturated_samples += saturated;
            }
            Err(failure) => {
                log::error!(
                    "Failed to write block {:?} of dataset {path}: {}",
                    failure.grid_position,
                    failure.error
                );
                summary.failures.push(failure);
            }
        }
    }
    summary
        .failures
        .sort_by(|a, b| a.grid_position.iter().rev().cmp(b.grid_position.iter().rev()));

    if summary.blocks_skipped > 0 {
        log::debug!(
            "Skipped {} of {} blocks of dataset {path} holding only zero.",
            summary.blocks_skipped,
            summary.blocks_total
        );
    }
    if summary.saturated_samples > 0 {
        log::warn!(
            "{} quantized samples of dataset {path} were clamped to the range of {}.",
            summary.saturated_samples,
            T::DATA_TYPE
        );
    }
    Ok(summary)
}

fn check_source<TSource: BlockSource>(
    grid: &ChunkGridPlan,
    source: &TSource,
) -> Result<(), DisplacementFieldError> {
    let num_dimensions = grid.num_spatial_dimensions();
    if source.num_spatial_dimensions() != num_dimensions {
        return Err(
            IncompatibleDimensionalityError::new(source.num_spatial_dimensions(), num_dimensions)
                .into(),
        );
    }
    match source.shape() {
        Some(shape) if shape.as_slice() != grid.output_shape() => {
            Err(DisplacementFieldError::IncompatibleShape {
                got: shape,
                expected: grid.output_shape().to_vec(),
            })
        }
        _ => Ok(()),
    }
}

/// Write the displacement field of `transform` sampled at `pixel_to_physical` positions over `grid`.
///
/// # Errors
/// See [`write_all_blocks`]. Returns [`DisplacementFieldError::IncompatibleDimensionality`] if the dimensionality of the transform, `pixel_to_physical` and `grid` differ.
pub(crate) fn write_transform_blocks<T, TStore>(
    store: &TStore,
    path: &str,
    grid: &ChunkGridPlan,
    compression: &Compression,
    transform: &dyn RealTransform,
    pixel_to_physical: AffineTransform,
    converter: &SampleConverter,
    options: &WriteOptions,
) -> Result<WriteSummary, DisplacementFieldError>
where
    T: Element,
    TStore: ?Sized + WritableBlockStoreTraits,
{
    let num_dimensions = grid.num_spatial_dimensions();
    for got in [
        pixel_to_physical.num_dimensions(),
        transform.num_source_dimensions(),
        transform.num_target_dimensions(),
    ] {
        if got != num_dimensions {
            return Err(IncompatibleDimensionalityError::new(got, num_dimensions).into());
        }
    }
    let source = TransformBlockSource::new(transform, pixel_to_physical);
    write_all_blocks::<T, _, _>(store, path, grid, compression, &source, converter, options)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use dfield_storage::store::MemoryStore;
    use serde_json::{Map, Value};

    use super::*;
    use crate::{
        array::field_from_vec,
        data_type::DataType,
        quantization::QuantizationPlan,
        store::{BlockData, N5BlockStore, ReadableBlockStoreTraits},
    };

    /// A block store which fails to write the blocks at the listed grid positions, and optionally any attributes.
    struct FailingBlockStore {
        inner: N5BlockStore<MemoryStore>,
        failing: Vec<Vec<u64>>,
        fail_attributes: bool,
        block_writes: AtomicUsize,
    }

    impl FailingBlockStore {
        fn new(failing: Vec<Vec<u64>>, fail_attributes: bool) -> Self {
            Self {
                inner: memory_store(),
                failing,
                fail_attributes,
                block_writes: AtomicUsize::new(0),
            }
        }
    }

    impl ReadableBlockStoreTraits for FailingBlockStore {
        fn attributes(&self, path: &str) -> Result<Option<Map<String, Value>>, BlockStoreError> {
            self.inner.attributes(path)
        }

        fn read_block(
            &self,
            path: &str,
            dataset_attributes: &DatasetAttributes,
            grid_position: &[u64],
        ) -> Result<Option<DataBlock>, BlockStoreError> {
            self.inner.read_block(path, dataset_attributes, grid_position)
        }
    }

    impl WritableBlockStoreTraits for FailingBlockStore {
        fn write_attributes(
            &self,
            path: &str,
            attributes: &Map<String, Value>,
        ) -> Result<(), BlockStoreError> {
            if self.fail_attributes {
                return Err(dfield_storage::StorageError::ReadOnly.into());
            }
            self.inner.write_attributes(path, attributes)
        }

        fn write_block(
            &self,
            path: &str,
            dataset_attributes: &DatasetAttributes,
            grid_position: &[u64],
            block: &DataBlock,
        ) -> Result<(), BlockStoreError> {
            self.block_writes.fetch_add(1, Ordering::Relaxed);
            if self.failing.iter().any(|failing| failing == grid_position) {
                return Err(dfield_storage::StorageError::Other("disk full".to_string()).into());
            }
            self.inner
                .write_block(path, dataset_attributes, grid_position, block)
        }

        fn delete_block(&self, path: &str, grid_position: &[u64]) -> Result<(), BlockStoreError> {
            self.inner.delete_block(path, grid_position)
        }

        fn remove(&self, path: &str) -> Result<(), BlockStoreError> {
            self.inner.remove(path)
        }
    }

    fn memory_store() -> N5BlockStore<MemoryStore> {
        N5BlockStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn write_options() {
        let options = WriteOptions::default()
            .with_concurrent_target(0)
            .with_store_empty_blocks(true)
            .with_overflow_policy(OverflowPolicy::Error);
        assert_eq!(options.concurrent_target(), 1);
        assert!(options.store_empty_blocks());
        assert_eq!(options.overflow_policy(), OverflowPolicy::Error);
        assert!(options.thread_pool().is_none());
    }

    #[test]
    fn write_transform() {
        let store = memory_store();
        let grid = ChunkGridPlan::new(&[5, 3], &[2, 2]).unwrap();
        let transform = AffineTransform::translation(&[1.0, -2.0]);
        let summary = write_transform_blocks::<f64, _>(
            &store,
            "field",
            &grid,
            &Compression::Raw,
            &transform,
            AffineTransform::identity(2),
            &SampleConverter::Raw,
            &WriteOptions::default(),
        )
        .unwrap();
        assert!(summary.is_complete());
        assert_eq!(summary.blocks_total(), 6);
        assert_eq!(summary.blocks_written(), 6);

        let attributes = store.dataset_attributes("field").unwrap().unwrap();
        assert_eq!(attributes.dimensions(), &[2, 5, 3]);
        assert_eq!(attributes.block_size(), &[2, 2, 2]);
        assert_eq!(attributes.data_type(), DataType::Float64);
        let block = store
            .read_block("field", &attributes, &[0, 2, 1])
            .unwrap()
            .unwrap();
        assert_eq!(block.size(), &[2, 1, 1]);
        assert_eq!(block.data(), &BlockData::Float64(vec![1.0, -2.0]));
    }

    #[test]
    fn write_skips_empty_blocks() {
        let store = memory_store();
        let grid = ChunkGridPlan::new(&[4, 4], &[2, 2]).unwrap();
        let transform = AffineTransform::identity(2);
        let summary = write_transform_blocks::<f32, _>(
            &store,
            "field",
            &grid,
            &Compression::gzip(5),
            &transform,
            AffineTransform::identity(2),
            &SampleConverter::Raw,
            &WriteOptions::default().with_store_empty_blocks(false),
        )
        .unwrap();
        assert_eq!(summary.blocks_written(), 0);
        assert_eq!(summary.blocks_skipped(), 4);

        let summary = write_transform_blocks::<f32, _>(
            &store,
            "field",
            &grid,
            &Compression::gzip(5),
            &transform,
            AffineTransform::identity(2),
            &SampleConverter::Raw,
            &WriteOptions::default().with_store_empty_blocks(true),
        )
        .unwrap();
        assert_eq!(summary.blocks_written(), 4);
        assert_eq!(summary.blocks_skipped(), 0);
    }

    #[test]
    fn write_in_thread_pool() {
        let store = memory_store();
        let grid = ChunkGridPlan::new(&[8], &[3]).unwrap();
        let thread_pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(2)
                .build()
                .unwrap(),
        );
        let transform = AffineTransform::translation(&[0.5]);
        let summary = write_transform_blocks::<f64, _>(
            &store,
            "field",
            &grid,
            &Compression::Raw,
            &transform,
            AffineTransform::identity(1),
            &SampleConverter::Raw,
            &WriteOptions::default()
                .with_concurrent_target(2)
                .with_thread_pool(thread_pool),
        )
        .unwrap();
        assert_eq!(summary.blocks_written(), 3);
    }

    #[test]
    fn write_dimensionality_mismatch() {
        let store = memory_store();
        let grid = ChunkGridPlan::new(&[4, 4], &[2, 2]).unwrap();
        let transform = AffineTransform::identity(3);
        assert!(matches!(
            write_transform_blocks::<f64, _>(
                &store,
                "field",
                &grid,
                &Compression::Raw,
                &transform,
                AffineTransform::identity(2),
                &SampleConverter::Raw,
                &WriteOptions::default(),
            ),
            Err(DisplacementFieldError::IncompatibleDimensionality(_))
        ));
        assert!(!store.dataset_exists("field").unwrap());
    }

    #[test]
    fn write_block_failures() {
        testing_logger::setup();
        let store = FailingBlockStore::new(vec![vec![0, 1, 0], vec![0, 0, 1]], false);
        let grid = ChunkGridPlan::new(&[4, 4], &[2, 2]).unwrap();
        let transform = AffineTransform::translation(&[1.0, 1.0]);
        let summary = write_transform_blocks::<f64, _>(
            &store,
            "field",
            &grid,
            &Compression::Raw,
            &transform,
            AffineTransform::identity(2),
            &SampleConverter::Raw,
            &WriteOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.blocks_written(), 2);
        assert_eq!(store.block_writes.load(Ordering::Relaxed), 4);
        assert_eq!(summary.failures().len(), 2);
        assert_eq!(summary.failures()[0].grid_position(), &[0, 1, 0]);
        assert_eq!(summary.failures()[1].grid_position(), &[0, 0, 1]);
        assert!(matches!(
            summary.failures()[0].error(),
            BlockTaskError::Store(_)
        ));
        testing_logger::validate(|captured_logs| {
            let errors: Vec<_> = captured_logs
                .iter()
                .filter(|log| log.level == log::Level::Error)
                .collect();
            assert_eq!(errors.len(), 2);
            assert_eq!(
                errors[0].body,
                "Failed to write block [0, 1, 0] of dataset field: disk full"
            );
        });
    }

    #[test]
    fn write_quantized_overflow() {
        testing_logger::setup();
        let store = memory_store();
        let grid = ChunkGridPlan::new(&[4], &[2]).unwrap();
        let plan = QuantizationPlan::from_multiplier(1.0, DataType::Int8).unwrap();
        let source = field_from_vec(&[1, 4], vec![1.0, 2.0, 500.0, -500.0]).unwrap();
        let source = FieldBlockSource::new(&source);

        let summary = write_all_blocks::<i8, _, _>(
            &store,
            "saturate",
            &grid,
            &Compression::Raw,
            &source,
            &SampleConverter::Quantized(plan.quantizer(OverflowPolicy::Saturate)),
            &WriteOptions::default(),
        )
        .unwrap();
        assert!(summary.is_complete());
        assert_eq!(summary.saturated_samples(), 2);
        let attributes = store.dataset_attributes("saturate").unwrap().unwrap();
        let block = store
            .read_block("saturate", &attributes, &[0, 1])
            .unwrap()
            .unwrap();
        assert_eq!(block.data(), &BlockData::Int8(vec![127, -128]));
        testing_logger::validate(|captured_logs| {
            assert!(captured_logs.iter().any(|log| log.level == log::Level::Warn
                && log.body
                    == "2 quantized samples of dataset saturate were clamped to the range of int8."));
        });

        let summary = write_all_blocks::<i8, _, _>(
            &store,
            "error",
            &grid,
            &Compression::Raw,
            &source,
            &SampleConverter::Quantized(plan.quantizer(OverflowPolicy::Error)),
            &WriteOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.blocks_written(), 1);
        assert_eq!(summary.failures().len(), 1);
        assert_eq!(summary.failures()[0].grid_position(), &[0, 1]);
        assert!(matches!(
            summary.failures()[0].error(),
            BlockTaskError::Quantization(QuantizationError::Overflow { .. })
        ));
    }

    #[test]
    fn write_dataset_creation_failure() {
        let store = FailingBlockStore::new(vec![], true);
        let grid = ChunkGridPlan::new(&[4, 4], &[2, 2]).unwrap();
        let transform = AffineTransform::translation(&[1.0, 1.0]);
        let result = write_transform_blocks::<f64, _>(
            &store,
            "field",
            &grid,
            &Compression::Raw,
            &transform,
            AffineTransform::identity(2),
            &SampleConverter::Raw,
            &WriteOptions::default(),
        );
        assert!(matches!(
            result,
            Err(DisplacementFieldError::DatasetCreation { ref dataset, .. }) if dataset == "field"
        ));
        assert_eq!(store.block_writes.load(Ordering::Relaxed), 0);
        assert!(!store.dataset_exists("field").unwrap());
    }

    #[test]
    fn write_field_shape_mismatch() {
        let store = memory_store();
        let grid = ChunkGridPlan::new(&[8], &[4]).unwrap();
        let field = field_from_vec(&[1, 4], vec![1.0f64, 2.0, 3.0, 4.0]).unwrap();
        let result = write_all_blocks::<f64, _, _>(
            &store,
            "field",
            &grid,
            &Compression::Raw,
            &FieldBlockSource::new(&field),
            &SampleConverter::Raw,
            &WriteOptions::default(),
        );
        let Err(DisplacementFieldError::IncompatibleShape { got, expected }) = result else {
            panic!("expected an incompatible shape error");
        };
        assert_eq!(got, vec![1, 4]);
        assert_eq!(expected, vec![1, 8]);

        let field = field_from_vec(&[2, 4, 2], vec![0.0f64; 16]).unwrap();
        assert!(matches!(
            write_all_blocks::<f64, _, _>(
                &store,
                "field",
                &grid,
                &Compression::Raw,
                &FieldBlockSource::new(&field),
                &SampleConverter::Raw,
                &WriteOptions::default(),
            ),
            Err(DisplacementFieldError::IncompatibleDimensionality(_))
        ));
        assert!(!store.dataset_exists("field").unwrap());

        // a block outside of the field is a block failure rather than a panic
        let field = field_from_vec(&[1, 4], vec![1.0f64, 2.0, 3.0, 4.0]).unwrap();
        let source = FieldBlockSource::new(&field);
        let block = grid.block(1).unwrap();
        let mut buffer = vec![0.0f64; block.num_elements_usize()];
        assert!(matches!(
            source.fill_block(&block, &mut buffer, &SampleConverter::Raw),
            Err(BlockTaskError::OutOfBounds(_))
        ));
    }
}
