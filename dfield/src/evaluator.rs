//! Evaluation of transforms into displacement samples.
//!
//! The displacement at a pixel `c` is `transform(p(c)) - p(c)`, where `p` is the pixel to physical transform.
//! Samples are laid out vector-first: the n components of each pixel are contiguous, pixels follow in axis 0 fastest order.

use crate::{
    array::{field_from_vec, FieldArray},
    element::Element,
    error::DisplacementFieldError,
    quantization::{QuantizationError, Quantizer},
    transform::{
        AffineTransform, AffineTransformError, IncompatibleDimensionalityError, RealTransform,
    },
};

/// Converts displacement components into stored elements.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SampleConverter {
    /// Store displacements as they are (floating point data types).
    Raw,
    /// Store quantized displacements (integer data types).
    Quantized(Quantizer),
}

impl SampleConverter {
    /// Convert `displacement` to `T`.
    ///
    /// Returns the converted value and whether it was clamped.
    ///
    /// # Errors
    /// Returns [`QuantizationError::Overflow`] if a quantized value does not fit `T` and overflow is an error.
    pub fn convert<T: Element>(&self, displacement: f64) -> Result<(T, bool), QuantizationError> {
        match self {
            Self::Raw => Ok((T::cast_from_f64(displacement), false)),
            Self::Quantized(quantizer) => quantizer.quantize(displacement),
        }
    }
}

/// Returns `pixel_to_physical` re-based so that the block-local pixel origin maps to the physical position of `block_start`.
///
/// # Errors
/// Returns an [`AffineTransformError`] if the dimensionality of `block_start` differs from `pixel_to_physical`.
pub fn block_pixel_to_physical(
    pixel_to_physical: &AffineTransform,
    block_start: &[u64],
) -> Result<AffineTransform, AffineTransformError> {
    let offset: Vec<f64> = block_start.iter().map(|&start| start as f64).collect();
    pixel_to_physical.concatenate(&AffineTransform::translation(&offset))
}

/// Evaluate the displacement of `transform` at every pixel of a block of `spatial_shape` into `buffer`.
///
/// `pixel_to_physical` maps block-local pixel coordinates to physical coordinates (see [`block_pixel_to_physical`]).
/// `buffer` must hold `n * product(spatial_shape)` elements.
/// The transform must be exclusive to this call, as it may hold mutable scratch state.
///
/// Returns the number of samples clamped by the converter.
///
/// # Errors
/// Returns a [`QuantizationError`] if a quantized value does not fit `T` and overflow is an error.
///
/// # Panics
/// Panics if `buffer` has the wrong length.
pub fn evaluate_block<T: Element>(
    transform: &mut dyn RealTransform,
    pixel_to_physical: &AffineTransform,
    spatial_shape: &[u64],
    buffer: &mut [T],
    converter: &SampleConverter,
) -> Result<u64, QuantizationError> {
    let num_dimensions = spatial_shape.len();
    if num_dimensions == 0 {
        return Ok(0);
    }
    let shape: Vec<usize> = spatial_shape.iter().map(|&extent| extent as usize).collect();
    assert_eq!(
        buffer.len(),
        num_dimensions * shape.iter().product::<usize>(),
        "block buffer length does not match the block shape"
    );

    let mut index = vec![0usize; num_dimensions];
    let mut pixel = vec![0.0; num_dimensions];
    let mut source = vec![0.0; num_dimensions];
    let mut target = vec![0.0; transform.num_target_dimensions().max(num_dimensions)];
    let mut saturated = 0;
    for vector in buffer.chunks_exact_mut(num_dimensions) {
        for (pixel, &index) in pixel.iter_mut().zip(&index) {
            *pixel = index as f64;
        }
        pixel_to_physical.apply_to(&pixel, &mut source);
        transform.apply(&source, &mut target);
        for ((element, target), source) in vector.iter_mut().zip(&target).zip(&source) {
            let (value, clamped) = converter.convert::<T>(target - source)?;
            *element = value;
            saturated += u64::from(clamped);
        }

        for (index, &extent) in index.iter_mut().zip(&shape) {
            *index += 1;
            if *index < extent {
                break;
            }
            *index = 0;
        }
    }
    Ok(saturated)
}

fn validate_transform(
    transform: &dyn RealTransform,
    num_dimensions: usize,
) -> Result<(), IncompatibleDimensionalityError> {
    if transform.num_source_dimensions() != num_dimensions {
        return Err(IncompatibleDimensionalityError::new(
            transform.num_source_dimensions(),
            num_dimensions,
        ));
    }
    if transform.num_target_dimensions() != num_dimensions {
        return Err(IncompatibleDimensionalityError::new(
            transform.num_target_dimensions(),
            num_dimensions,
        ));
    }
    Ok(())
}

fn evaluate_field<T: Element>(
    transform: &dyn RealTransform,
    spatial_shape: &[u64],
    pixel_to_physical: Option<&AffineTransform>,
    converter: &SampleConverter,
) -> Result<(FieldArray<T>, u64), DisplacementFieldError> {
    let num_dimensions = spatial_shape.len();
    validate_transform(transform, num_dimensions)?;
    let pixel_to_physical = match pixel_to_physical {
        Some(pixel_to_physical) if pixel_to_physical.num_dimensions() != num_dimensions => {
            return Err(IncompatibleDimensionalityError::new(
                pixel_to_physical.num_dimensions(),
                num_dimensions,
            )
            .into());
        }
        Some(pixel_to_physical) => pixel_to_physical.clone(),
        None => AffineTransform::identity(num_dimensions),
    };

    let shape: Vec<usize> = std::iter::once(num_dimensions)
        .chain(spatial_shape.iter().map(|&extent| extent as usize))
        .collect();
    let mut buffer = vec![T::default(); shape.iter().product()];
    let mut transform = transform.copy();
    let saturated = evaluate_block(
        transform.as_mut(),
        &pixel_to_physical,
        spatial_shape,
        &mut buffer,
        converter,
    )?;
    Ok((field_from_vec(&shape, buffer)?, saturated))
}

/// Evaluate the displacement field of `transform` over `spatial_shape` pixels.
///
/// Pixel coordinates are mapped to physical coordinates by `pixel_to_physical` (the identity if [`None`]).
/// Returns a vector-first field of shape `[n, spatial_shape...]`.
///
/// # Errors
/// Returns a [`DisplacementFieldError`] if the dimensionality of the transform or `pixel_to_physical` does not match `spatial_shape`.
pub fn transform_to_deformation(
    transform: &dyn RealTransform,
    spatial_shape: &[u64],
    pixel_to_physical: Option<&AffineTransform>,
) -> Result<FieldArray<f64>, DisplacementFieldError> {
    evaluate_field(
        transform,
        spatial_shape,
        pixel_to_physical,
        &SampleConverter::Raw,
    )
    .map(|(field, _)| field)
}

/// Evaluate the quantized displacement field of `transform` over `spatial_shape` pixels.
///
/// Returns a vector-first field of shape `[n, spatial_shape...]` and the number of clamped samples.
///
/// # Errors
/// Returns a [`DisplacementFieldError`] if the dimensionality of the transform or `pixel_to_physical` does not match `spatial_shape`,
/// or a quantized value overflows `T` and overflow is an error.
pub fn transform_to_deformation_quantized<T: Element>(
    transform: &dyn RealTransform,
    spatial_shape: &[u64],
    pixel_to_physical: Option<&AffineTransform>,
    quantizer: &Quantizer,
) -> Result<(FieldArray<T>, u64), DisplacementFieldError> {
    evaluate_field(
        transform,
        spatial_shape,
        pixel_to_physical,
        &SampleConverter::Quantized(*quantizer),
    )
}
