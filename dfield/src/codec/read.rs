//! The read path of the displacement field codec.

use itertools::{Itertools, MinMaxResult};
use ndarray::{Array, ArrayView, Axis, IxDyn, ShapeBuilder, Slice};

use super::{
    level_datasets, open_affine, open_pixel_to_physical, open_quantization_multiplier,
    FORWARD_DATASET, INVERSE_DATASET,
};
use crate::{
    array::FieldArray,
    axis::to_vector_last,
    chunk_grid::ChunkGridPlan,
    element::Element,
    error::DisplacementFieldError,
    interpolation::{Extension, InterpolatedField, Interpolation, Sample},
    quantization::QuantizationPlan,
    store::{DatasetAttributes, ReadableBlockStoreTraits},
    transform::{
        DeformationFieldTransform, ExplicitInvertibleTransform, RealTransform, TransformSequence,
    },
};

/// Whether a dataset holds a forward or an inverse transform.
///
/// This decides the order in which the stored affine is composed with the displacement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// The displacement is applied first, then the affine.
    Forward,
    /// The affine is applied first, then the displacement.
    Inverse,
}

/// Options for opening a displacement field.
///
/// The default values are:
/// - `interpolation`: [`Interpolation::NLinear`]
/// - `extension`: [`Extension::Border`]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OpenOptions {
    interpolation: Interpolation,
    extension: Extension,
}

impl OpenOptions {
    /// Return the interpolation scheme.
    #[must_use]
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Set the interpolation scheme.
    #[must_use]
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Return the out-of-bounds extension.
    #[must_use]
    pub fn extension(&self) -> Extension {
        self.extension
    }

    /// Set the out-of-bounds extension.
    #[must_use]
    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extension = extension;
        self
    }
}

fn dataset_attributes<TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
    path: &str,
) -> Result<DatasetAttributes, DisplacementFieldError> {
    store
        .dataset_attributes(path)?
        .ok_or_else(|| DisplacementFieldError::DatasetNotFound(path.to_string()))
}

/// Read the dataset at `path` into a field array of the dataset shape.
fn read_dataset<S: Sample, TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
    path: &str,
    attributes: &DatasetAttributes,
    multiplier: f64,
) -> Result<FieldArray<S>, DisplacementFieldError> {
    let grid = ChunkGridPlan::from_shapes(
        attributes.dimensions().to_vec(),
        attributes.block_size().to_vec(),
    )?;
    let dimensions = to_usize(attributes.dimensions());
    let mut field = Array::from_elem(IxDyn(&dimensions).f(), S::zero());
    for block in grid.blocks() {
        let Some(data_block) = store.read_block(path, attributes, block.grid_position())? else {
            continue;
        };
        let invalid = |reason: String| DisplacementFieldError::InvalidBlock {
            dataset: path.to_string(),
            grid_position: block.grid_position().to_vec(),
            reason,
        };
        if data_block.size().len() != block.shape().len()
            || data_block
                .size()
                .iter()
                .zip(block.shape())
                .any(|(size, shape)| size < shape)
        {
            return Err(invalid(format!(
                "size {:?} is smaller than the block shape {:?}",
                data_block.size(),
                block.shape()
            )));
        }
        let block_samples = data_block.data().to_samples::<S>(multiplier);
        let block_size = to_usize(data_block.size());
        let block_view = ArrayView::from_shape(IxDyn(&block_size).f(), block_samples.as_slice())
            .map_err(|err| invalid(err.to_string()))?;
        // edge blocks may be stored at full size
        let block_shape = to_usize(block.shape());
        let start = to_usize(block.start());
        field
            .slice_each_axis_mut(|axis| {
                let start = start[axis.axis.index()];
                Slice::from(start..start + block_shape[axis.axis.index()])
            })
            .assign(&block_view.slice_each_axis(|axis| {
                Slice::from(0..block_shape[axis.axis.index()])
            }));
    }
    Ok(field.into_shared())
}

fn to_usize(values: &[u64]) -> Vec<usize> {
    values.iter().map(|&value| value as usize).collect()
}

/// Open the displacement field array of the dataset at `path`.
///
/// The field has shape `[spatial..., n]` (vector axis last).
/// Integer datasets are dequantized by their `quantization_multiplier` attribute (`1.0` if absent).
/// Missing blocks read as zero.
///
/// # Errors
/// Returns a [`DisplacementFieldError`] if
///  - the dataset does not exist ([`DatasetNotFound`](DisplacementFieldError::DatasetNotFound)),
///  - the dataset has no vector axis ([`AxisConvention`](DisplacementFieldError::AxisConvention)),
///  - the multiplier is not positive and finite, or
///  - a block cannot be read.
pub fn open_field<S: Sample, TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
    path: &str,
) -> Result<FieldArray<S>, DisplacementFieldError> {
    let attributes = dataset_attributes(store, path)?;
    let data_type = attributes.data_type();
    let multiplier = if data_type.is_integer() {
        let multiplier = open_quantization_multiplier(store, path)?;
        QuantizationPlan::from_multiplier(multiplier, data_type)?
            .dequantizer()
            .multiplier()
    } else {
        1.0
    };
    let field = read_dataset::<S, _>(store, path, &attributes, multiplier)?;
    Ok(to_vector_last(&field)?)
}

/// Open the per-axis displacement components of the dataset at `path` as continuous fields.
///
/// Each field is interpolated and extended with `options`.
/// If the dataset has a valid `spacing` attribute, the fields are calibrated to physical coordinates.
///
/// # Errors
/// See [`open_field`].
pub fn open_calibrated_field<S: Sample, TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
    path: &str,
    options: &OpenOptions,
) -> Result<Vec<InterpolatedField<S>>, DisplacementFieldError> {
    let field = open_field::<S, _>(store, path)?;
    let num_spatial_dimensions = field.ndim() - 1;
    let pixel_to_physical = open_pixel_to_physical(store, path)?.filter(|pixel_to_physical| {
        let valid = pixel_to_physical.num_dimensions() == num_spatial_dimensions;
        if !valid {
            log::warn!(
                "Ignoring {}-d spacing of {num_spatial_dimensions}-d displacement field {path}.",
                pixel_to_physical.num_dimensions()
            );
        }
        valid
    });
    (0..num_spatial_dimensions)
        .map(|component| -> Result<_, DisplacementFieldError> {
            let samples = field
                .clone()
                .index_axis_move(Axis(num_spatial_dimensions), component);
            let field = InterpolatedField::new(samples, options.interpolation(), options.extension());
            Ok(match &pixel_to_physical {
                Some(pixel_to_physical) => field.calibrated(pixel_to_physical)?,
                None => field,
            })
        })
        .collect()
}

/// Open the transform stored in the dataset at `path`.
///
/// The transform is the displacement field, composed with the `affine` attribute if present:
/// - [`Direction::Forward`]: the displacement then the affine, and
/// - [`Direction::Inverse`]: the affine then the displacement.
///
/// # Errors
/// See [`open_field`].
pub fn open<S: Sample, TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
    path: &str,
    direction: Direction,
    options: &OpenOptions,
) -> Result<Box<dyn RealTransform>, DisplacementFieldError> {
    let deformation = DeformationFieldTransform::new(open_calibrated_field::<S, _>(
        store, path, options,
    )?)?;
    let num_dimensions = deformation.num_source_dimensions();
    let affine = open_affine(store, path)?.filter(|affine| {
        let valid = affine.num_dimensions() == num_dimensions;
        if !valid {
            log::warn!(
                "Ignoring {}-d affine of {num_dimensions}-d displacement field {path}.",
                affine.num_dimensions()
            );
        }
        valid
    });
    Ok(match (affine, direction) {
        (None, _) => Box::new(deformation),
        (Some(affine), Direction::Forward) => Box::new(
            TransformSequence::new()
                .then(Box::new(deformation))
                .then(Box::new(affine)),
        ),
        (Some(affine), Direction::Inverse) => Box::new(
            TransformSequence::new()
                .then(Box::new(affine))
                .then(Box::new(deformation)),
        ),
    })
}

/// Open the forward transform at `forward_path` and the inverse transform at `inverse_path` as an invertible transform.
///
/// # Errors
/// Returns [`DisplacementFieldError::DatasetNotFound`] if either dataset does not exist.
/// See [`open`] for other errors.
pub fn open_invertible<S: Sample, TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
    forward_path: &str,
    inverse_path: &str,
    options: &OpenOptions,
) -> Result<ExplicitInvertibleTransform, DisplacementFieldError> {
    for path in [forward_path, inverse_path] {
        if !store.dataset_exists(path)? {
            return Err(DisplacementFieldError::DatasetNotFound(path.to_string()));
        }
    }
    Ok(ExplicitInvertibleTransform::new(
        open::<S, _>(store, forward_path, Direction::Forward, options)?,
        open::<S, _>(store, inverse_path, Direction::Inverse, options)?,
    )?)
}

/// Open the invertible transform of the default datasets (`dfield` and `invdfield`).
///
/// Uses [`f64`] samples with n-linear interpolation and border extension.
///
/// # Errors
/// See [`open_invertible`].
pub fn open_invertible_default<TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
) -> Result<ExplicitInvertibleTransform, DisplacementFieldError> {
    open_invertible::<f64, _>(
        store,
        FORWARD_DATASET,
        INVERSE_DATASET,
        &OpenOptions::default(),
    )
}

/// Open the invertible transform of multiscale `level` (datasets `/<level>/dfield` and `/<level>/invdfield`).
///
/// Uses [`f64`] samples with n-linear interpolation and border extension.
///
/// # Errors
/// See [`open_invertible`].
pub fn open_invertible_level<TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
    level: usize,
) -> Result<ExplicitInvertibleTransform, DisplacementFieldError> {
    let (forward, inverse) = level_datasets(level);
    open_invertible::<f64, _>(store, &forward, &inverse, &OpenOptions::default())
}

/// Returns the minimum and maximum absolute displacement component of `field`.
///
/// Useful to choose a quantized data type.
/// Returns [`None`] if the field is empty.
#[must_use]
pub fn abs_range<T: Element>(field: &FieldArray<T>) -> Option<(f64, f64)> {
    match field
        .iter()
        .map(|element| element.as_f64().abs())
        .minmax_by(f64::total_cmp)
    {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(value) => Some((value, value)),
        MinMaxResult::MinMax(min, max) => Some((min, max)),
    }
}
