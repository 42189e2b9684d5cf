//! The block grid of a displacement field dataset.
//!
//! The vector axis (axis 0) is never split: its block extent equals its extent.
//! Blocks are flat-indexed with axis 0 varying fastest, the N5 grid order.

use std::num::NonZeroU64;

use thiserror::Error;

/// A [`ChunkGridPlan`] creation error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("block shape {block_shape:?} is not compatible with output shape {output_shape:?}")]
pub struct ChunkGridCreateError {
    output_shape: Vec<u64>,
    block_shape: Vec<u64>,
}

/// A regular block grid over an output shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkGridPlan {
    output_shape: Vec<u64>,
    block_shape: Vec<NonZeroU64>,
    grid_shape: Vec<u64>,
}

/// The grid position and bounds of one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSubset {
    grid_position: Vec<u64>,
    start: Vec<u64>,
    shape: Vec<u64>,
}

impl BlockSubset {
    /// Returns the grid position of the block.
    #[must_use]
    pub fn grid_position(&self) -> &[u64] {
        &self.grid_position
    }

    /// Returns the minimum of the block in the output.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Returns the shape of the block, clipped to the output.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Returns the spatial part (excluding the vector axis) of the block minimum.
    #[must_use]
    pub fn spatial_start(&self) -> &[u64] {
        &self.start[1..]
    }

    /// Returns the spatial part (excluding the vector axis) of the block shape.
    #[must_use]
    pub fn spatial_shape(&self) -> &[u64] {
        &self.shape[1..]
    }

    /// Returns the number of elements in the block.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Returns the number of elements in the block as a [`usize`].
    #[must_use]
    pub fn num_elements_usize(&self) -> usize {
        usize::try_from(self.num_elements()).unwrap_or(usize::MAX)
    }
}

impl ChunkGridPlan {
    /// Plan the block grid of an n-dimensional field over `spatial_shape` with `spatial_block_shape` blocks.
    ///
    /// The vector axis of extent n is prepended to both shapes.
    ///
    /// # Errors
    /// Returns a [`ChunkGridCreateError`] if the shapes have different or zero dimensionality, or a block extent is zero.
    pub fn new(
        spatial_shape: &[u64],
        spatial_block_shape: &[u64],
    ) -> Result<Self, ChunkGridCreateError> {
        let num_spatial_dimensions = spatial_shape.len() as u64;
        let output_shape = std::iter::once(num_spatial_dimensions)
            .chain(spatial_shape.iter().copied())
            .collect::<Vec<_>>();
        let block_shape = std::iter::once(num_spatial_dimensions)
            .chain(spatial_block_shape.iter().copied())
            .collect::<Vec<_>>();
        if spatial_shape.is_empty() {
            return Err(ChunkGridCreateError {
                output_shape,
                block_shape,
            });
        }
        Self::from_shapes(output_shape, block_shape)
    }

    /// Create a block grid from a full output shape and block shape (including the vector axis).
    ///
    /// # Errors
    /// Returns a [`ChunkGridCreateError`] if the shapes have different dimensionality or a block extent is zero.
    pub fn from_shapes(
        output_shape: Vec<u64>,
        block_shape: Vec<u64>,
    ) -> Result<Self, ChunkGridCreateError> {
        let block_shape_nz = block_shape
            .iter()
            .map(|&extent| NonZeroU64::new(extent))
            .collect::<Option<Vec<_>>>();
        match block_shape_nz {
            Some(block_shape_nz) if block_shape_nz.len() == output_shape.len() => {
                let grid_shape = output_shape
                    .iter()
                    .zip(&block_shape_nz)
                    .map(|(extent, block_extent)| extent.div_ceil(block_extent.get()))
                    .collect();
                Ok(Self {
                    output_shape,
                    block_shape: block_shape_nz,
                    grid_shape,
                })
            }
            _ => Err(ChunkGridCreateError {
                output_shape,
                block_shape,
            }),
        }
    }

    /// Returns the output shape.
    #[must_use]
    pub fn output_shape(&self) -> &[u64] {
        &self.output_shape
    }

    /// Returns the block shape.
    #[must_use]
    pub fn block_shape(&self) -> Vec<u64> {
        self.block_shape.iter().map(|extent| extent.get()).collect()
    }

    /// Returns the number of blocks along each axis.
    #[must_use]
    pub fn grid_shape(&self) -> &[u64] {
        &self.grid_shape
    }

    /// Returns the number of spatial dimensions (excluding the vector axis).
    #[must_use]
    pub fn num_spatial_dimensions(&self) -> usize {
        self.output_shape.len().saturating_sub(1)
    }

    /// Returns the total number of blocks.
    #[must_use]
    pub fn num_blocks(&self) -> u64 {
        self.grid_shape.iter().product()
    }

    /// Returns the grid position of the block with flat index `flat_index`.
    ///
    /// Returns [`None`] if `flat_index` is out of bounds.
    #[must_use]
    pub fn grid_position(&self, flat_index: u64) -> Option<Vec<u64>> {
        if flat_index >= self.num_blocks() {
            return None;
        }
        let mut remainder = flat_index;
        Some(
            self.grid_shape
                .iter()
                .map(|&extent| {
                    let position = remainder % extent;
                    remainder /= extent;
                    position
                })
                .collect(),
        )
    }

    /// Returns the block at `grid_position`, clipped to the output shape.
    ///
    /// Returns [`None`] if `grid_position` is out of bounds.
    #[must_use]
    pub fn block_at(&self, grid_position: &[u64]) -> Option<BlockSubset> {
        if grid_position.len() != self.grid_shape.len()
            || grid_position
                .iter()
                .zip(&self.grid_shape)
                .any(|(position, extent)| position >= extent)
        {
            return None;
        }
        let (start, shape) = grid_position
            .iter()
            .zip(&self.block_shape)
            .zip(&self.output_shape)
            .map(|((position, block_extent), extent)| {
                let start = position * block_extent.get();
                (start, block_extent.get().min(extent - start))
            })
            .unzip();
        Some(BlockSubset {
            grid_position: grid_position.to_vec(),
            start,
            shape,
        })
    }

    /// Returns the block with flat index `flat_index`.
    ///
    /// The result depends only on `flat_index`, so blocks can be processed in any order.
    /// Returns [`None`] if `flat_index` is out of bounds.
    #[must_use]
    pub fn block(&self, flat_index: u64) -> Option<BlockSubset> {
        self.block_at(&self.grid_position(flat_index)?)
    }

    /// Returns an iterator over all blocks in flat index order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockSubset> + '_ {
        (0..self.num_blocks()).filter_map(|flat_index| self.block(flat_index))
    }
}
