//! Interpolation and out-of-bounds extension of scalar sample grids.
//!
//! An [`InterpolatedField`] turns an n-dimensional grid of samples into a continuous scalar field,
//! optionally calibrated so that it is evaluated at physical rather than pixel coordinates.

use std::{fmt::Debug, str::FromStr};

use num::Float;
use thiserror::Error;

use crate::{
    array::FieldArray,
    transform::{AffineTransform, IncompatibleDimensionalityError},
};

/// A floating point sample type of a displacement field.
pub trait Sample: Float + Send + Sync + Debug + 'static {}

impl Sample for f32 {}

impl Sample for f64 {}

/// An interpolation scheme.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    /// The value of the nearest sample.
    NearestNeighbor,
    /// Linear interpolation along every axis of the 2ⁿ surrounding samples.
    #[default]
    NLinear,
}

/// The value of samples outside of the grid.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Extension {
    /// Zero.
    Zero,
    /// The grid mirrored at its edges, with the edge sample repeated.
    Mirror,
    /// The nearest edge sample.
    #[default]
    Border,
}

/// An unknown extension name.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown extension {0}, expected ext_zero, ext_mirror or ext_border")]
pub struct UnknownExtensionError(String);

impl Extension {
    /// Returns the name of the extension (e.g. `ext_border`).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Zero => "ext_zero",
            Self::Mirror => "ext_mirror",
            Self::Border => "ext_border",
        }
    }

    /// Map `index` onto a grid with `extent` samples along an axis.
    ///
    /// Returns [`None`] where the extended value is zero.
    #[must_use]
    pub fn extend_index(&self, index: i64, extent: usize) -> Option<usize> {
        let extent_i64 = i64::try_from(extent).ok().filter(|&extent| extent > 0)?;
        let index = match self {
            Self::Zero => (0..extent_i64).contains(&index).then_some(index)?,
            Self::Border => index.clamp(0, extent_i64 - 1),
            Self::Mirror => {
                let period = 2 * extent_i64;
                let index = index.rem_euclid(period);
                if index < extent_i64 {
                    index
                } else {
                    period - 1 - index
                }
            }
        };
        usize::try_from(index).ok()
    }
}

impl FromStr for Extension {
    type Err = UnknownExtensionError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "ext_zero" | "zero" => Ok(Self::Zero),
            "ext_mirror" | "mirror" => Ok(Self::Mirror),
            "ext_border" | "border" => Ok(Self::Border),
            _ => Err(UnknownExtensionError(name.to_string())),
        }
    }
}

/// Reusable buffers for [`InterpolatedField`] evaluation.
#[derive(Clone, Debug, Default)]
pub struct InterpolationScratch {
    pixel: Vec<f64>,
    floor: Vec<i64>,
    corner: Vec<i64>,
    index: Vec<usize>,
}

/// A continuous scalar field interpolated from a grid of samples.
#[derive(Clone, Debug)]
pub struct InterpolatedField<S> {
    samples: FieldArray<S>,
    interpolation: Interpolation,
    extension: Extension,
    physical_to_pixel: Option<AffineTransform>,
}

impl<S: Sample> InterpolatedField<S> {
    /// Create a continuous field over the pixel coordinates of `samples`.
    #[must_use]
    pub fn new(samples: FieldArray<S>, interpolation: Interpolation, extension: Extension) -> Self {
        Self {
            samples,
            interpolation,
            extension,
            physical_to_pixel: None,
        }
    }

    /// Calibrate the field so that it is evaluated at physical coordinates.
    ///
    /// # Errors
    /// Returns an [`IncompatibleDimensionalityError`] if the dimensionality of `pixel_to_physical` differs from the samples.
    pub fn calibrated(
        mut self,
        pixel_to_physical: &AffineTransform,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if pixel_to_physical.num_dimensions() != self.num_dimensions() {
            return Err(IncompatibleDimensionalityError::new(
                pixel_to_physical.num_dimensions(),
                self.num_dimensions(),
            ));
        }
        self.physical_to_pixel = Some(pixel_to_physical.inverse());
        Ok(self)
    }

    /// Returns the number of dimensions of the field.
    #[must_use]
    pub fn num_dimensions(&self) -> usize {
        self.samples.ndim()
    }

    /// Returns the samples of the field.
    #[must_use]
    pub fn samples(&self) -> &FieldArray<S> {
        &self.samples
    }

    /// Returns the interpolation scheme.
    #[must_use]
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Returns the extension policy.
    #[must_use]
    pub fn extension(&self) -> Extension {
        self.extension
    }

    /// Returns the physical to pixel transform, if the field is calibrated.
    #[must_use]
    pub fn physical_to_pixel(&self) -> Option<&AffineTransform> {
        self.physical_to_pixel.as_ref()
    }

    /// Evaluate the field at `position` (physical coordinates if calibrated, otherwise pixel coordinates).
    pub fn value_at(&self, position: &[f64], scratch: &mut InterpolationScratch) -> f64 {
        let mut pixel = std::mem::take(&mut scratch.pixel);
        pixel.resize(self.num_dimensions(), 0.0);
        match &self.physical_to_pixel {
            Some(physical_to_pixel) => physical_to_pixel.apply_to(position, &mut pixel),
            None => pixel.copy_from_slice(&position[..self.num_dimensions()]),
        }
        let value = self.value_at_pixel(&pixel, scratch);
        scratch.pixel = pixel;
        value
    }

    /// Evaluate the field at pixel coordinates `pixel`.
    pub fn value_at_pixel(&self, pixel: &[f64], scratch: &mut InterpolationScratch) -> f64 {
        let num_dimensions = self.num_dimensions();
        scratch.index.resize(num_dimensions, 0);
        match self.interpolation {
            Interpolation::NearestNeighbor => {
                scratch.floor.clear();
                scratch
                    .floor
                    .extend(pixel[..num_dimensions].iter().map(|x| (x + 0.5).floor() as i64));
                self.sample(&scratch.floor, &mut scratch.index)
            }
            Interpolation::NLinear => {
                scratch.floor.clear();
                scratch
                    .floor
                    .extend(pixel[..num_dimensions].iter().map(|x| x.floor() as i64));
                scratch.corner.resize(num_dimensions, 0);
                let mut value = 0.0;
                for mask in 0..(1usize << num_dimensions) {
                    let mut weight = 1.0;
                    for d in 0..num_dimensions {
                        let fraction = pixel[d] - pixel[d].floor();
                        if (mask >> d) & 1 == 1 {
                            weight *= fraction;
                            scratch.corner[d] = scratch.floor[d] + 1;
                        } else {
                            weight *= 1.0 - fraction;
                            scratch.corner[d] = scratch.floor[d];
                        }
                    }
                    if weight != 0.0 {
                        value += weight * self.sample(&scratch.corner, &mut scratch.index);
                    }
                }
                value
            }
        }
    }

    fn sample(&self, position: &[i64], index: &mut [usize]) -> f64 {
        for ((index, &position), &extent) in index
            .iter_mut()
            .zip(position)
            .zip(self.samples.shape())
        {
            match self.extension.extend_index(position, extent) {
                Some(extended) => *index = extended,
                None => return 0.0,
            }
        }
        self.samples
            .get(&*index)
            .and_then(|sample| sample.to_f64())
            .unwrap_or(f64::NAN)
    }
}
