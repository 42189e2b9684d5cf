//! Bounded-error quantization of displacements.
//!
//! A displacement component `d` is stored as the integer `round(d / m)` and restored as `q * m`.
//! The multiplier `m = 2 * sqrt(max_error² / n)` for `n` spatial dimensions keeps the rounding error of each component within `m / 2`,
//! so the L2 error of an n-vector is at most `max_error`.
//!
//! The multiplier is stored as dataset metadata and reused for dequantization, never recomputed.

use thiserror::Error;

use crate::{data_type::DataType, element::Element};

/// The behaviour when a quantized displacement does not fit the integer data type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Clamp to the range of the data type and count the clamped samples.
    ///
    /// `NaN` quantizes to zero.
    #[default]
    Saturate,
    /// Fail the block holding the out-of-range sample.
    Error,
}

/// A quantization error.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum QuantizationError {
    /// The maximum error is not positive and finite.
    #[error("maximum error {0} must be positive and finite")]
    InvalidMaxError(f64),
    /// The multiplier is not positive and finite.
    #[error("quantization multiplier {0} must be positive and finite")]
    InvalidMultiplier(f64),
    /// The number of spatial dimensions is zero.
    #[error("quantization requires at least one spatial dimension")]
    ZeroDimensions,
    /// The data type is not an integer data type.
    #[error("quantized displacements require an integer data type, got {0}")]
    NonIntegerDataType(DataType),
    /// A quantized displacement does not fit the data type.
    #[error("displacement {displacement} quantizes outside the range of {data_type}")]
    Overflow {
        /// The displacement.
        displacement: f64,
        /// The data type.
        data_type: DataType,
    },
}

/// The quantization parameters of a dataset: a multiplier and an integer data type.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct QuantizationPlan {
    multiplier: f64,
    data_type: DataType,
}

impl QuantizationPlan {
    /// Returns the multiplier bounding the L2 error of `num_spatial_dimensions`-vectors by `max_error`.
    #[must_use]
    pub fn multiplier_for(num_spatial_dimensions: usize, max_error: f64) -> f64 {
        2.0 * (max_error * max_error / num_spatial_dimensions as f64).sqrt()
    }

    /// Plan the quantization of `num_spatial_dimensions`-vectors to `data_type` with an L2 error of at most `max_error`.
    ///
    /// # Errors
    /// Returns a [`QuantizationError`] if `max_error` is not positive and finite, `num_spatial_dimensions` is zero, or `data_type` is not an integer data type.
    pub fn new(
        num_spatial_dimensions: usize,
        max_error: f64,
        data_type: DataType,
    ) -> Result<Self, QuantizationError> {
        if !(max_error.is_finite() && max_error > 0.0) {
            return Err(QuantizationError::InvalidMaxError(max_error));
        }
        if num_spatial_dimensions == 0 {
            return Err(QuantizationError::ZeroDimensions);
        }
        Self::from_multiplier(
            Self::multiplier_for(num_spatial_dimensions, max_error),
            data_type,
        )
    }

    /// Create the quantization parameters of a dataset from its stored `multiplier`.
    ///
    /// # Errors
    /// Returns a [`QuantizationError`] if `multiplier` is not positive and finite or `data_type` is not an integer data type.
    pub fn from_multiplier(multiplier: f64, data_type: DataType) -> Result<Self, QuantizationError> {
        if !data_type.is_integer() {
            return Err(QuantizationError::NonIntegerDataType(data_type));
        }
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(QuantizationError::InvalidMultiplier(multiplier));
        }
        Ok(Self {
            multiplier,
            data_type,
        })
    }

    /// Returns the multiplier.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the integer data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the quantizer of this plan.
    #[must_use]
    pub fn quantizer(&self, overflow_policy: OverflowPolicy) -> Quantizer {
        Quantizer {
            multiplier: self.multiplier,
            overflow_policy,
        }
    }

    /// Returns the dequantizer of this plan.
    #[must_use]
    pub fn dequantizer(&self) -> Dequantizer {
        Dequantizer {
            multiplier: self.multiplier,
        }
    }
}

/// Converts displacements to quantized integers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Quantizer {
    multiplier: f64,
    overflow_policy: OverflowPolicy,
}

impl Quantizer {
    /// Returns the multiplier.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the overflow policy.
    #[must_use]
    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    /// Quantize `displacement` to `T`.
    ///
    /// Returns the quantized value and whether it was clamped to the range of `T`.
    ///
    /// # Errors
    /// Returns [`QuantizationError::Overflow`] if the quantized value does not fit `T` and the overflow policy is [`OverflowPolicy::Error`].
    pub fn quantize<T: Element>(&self, displacement: f64) -> Result<(T, bool), QuantizationError> {
        let quantized = (displacement / self.multiplier).round();
        if let Some(value) = <T as num::NumCast>::from(quantized) {
            return Ok((value, false));
        }
        match self.overflow_policy {
            OverflowPolicy::Error => Err(QuantizationError::Overflow {
                displacement,
                data_type: T::DATA_TYPE,
            }),
            OverflowPolicy::Saturate => {
                let value = if quantized.is_nan() {
                    T::default()
                } else if quantized > 0.0 {
                    T::max_value()
                } else {
                    T::min_value()
                };
                Ok((value, true))
            }
        }
    }
}

/// Converts quantized integers to displacements.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Dequantizer {
    multiplier: f64,
}

impl Dequantizer {
    /// Returns the multiplier.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Dequantize `quantized`.
    #[must_use]
    pub fn dequantize<T: Element>(&self, quantized: T) -> f64 {
        quantized.as_f64() * self.multiplier
    }
}
