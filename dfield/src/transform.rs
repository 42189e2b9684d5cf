//! Real coordinate transforms.
//!
//! A [`RealTransform`] maps points of an n-dimensional source space to an m-dimensional target space.
//! Transforms may keep mutable scratch state, so [`RealTransform::apply`] takes `&mut self`.
//! Use [`RealTransform::copy`] to obtain an independent instance per thread or task.
//! Copies share any immutable data (e.g. displacement field samples), so copying is cheap.

mod affine;
mod deformation;
mod invertible;
mod sequence;

pub use affine::{AffineTransform, AffineTransformError};
pub use deformation::DeformationFieldTransform;
pub use invertible::ExplicitInvertibleTransform;
pub use sequence::TransformSequence;

use std::fmt::Debug;

use thiserror::Error;

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("incompatible dimensionality {got}, expected {expected}")]
pub struct IncompatibleDimensionalityError {
    got: usize,
    expected: usize,
}

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self { got, expected }
    }

    /// Returns the dimensionality found.
    #[must_use]
    pub const fn got(&self) -> usize {
        self.got
    }

    /// Returns the dimensionality expected.
    #[must_use]
    pub const fn expected(&self) -> usize {
        self.expected
    }
}

/// A transform of real coordinates.
pub trait RealTransform: Send + Sync + Debug {
    /// Returns the number of dimensions of the source space.
    fn num_source_dimensions(&self) -> usize;

    /// Returns the number of dimensions of the target space.
    fn num_target_dimensions(&self) -> usize;

    /// Transform `source` and write the result to `target`.
    ///
    /// `source` must have at least [`num_source_dimensions`](RealTransform::num_source_dimensions) elements and `target` at least [`num_target_dimensions`](RealTransform::num_target_dimensions).
    fn apply(&mut self, source: &[f64], target: &mut [f64]);

    /// Return an independent instance of the transform.
    fn copy(&self) -> Box<dyn RealTransform>;

    /// Transform `source` into a new vector.
    fn transform(&mut self, source: &[f64]) -> Vec<f64> {
        let mut target = vec![0.0; self.num_target_dimensions()];
        self.apply(source, &mut target);
        target
    }
}

/// A [`RealTransform`] with an inverse.
pub trait InvertibleRealTransform: RealTransform {
    /// Transform `target` by the inverse transform and write the result to `source`.
    fn apply_inverse(&mut self, target: &[f64], source: &mut [f64]);

    /// Return the inverse transform.
    fn inverse(&self) -> Box<dyn InvertibleRealTransform>;

    /// Return an independent instance of the transform.
    fn copy_invertible(&self) -> Box<dyn InvertibleRealTransform>;
}

impl<T: ?Sized + RealTransform> RealTransform for Box<T> {
    fn num_source_dimensions(&self) -> usize {
        (**self).num_source_dimensions()
    }

    fn num_target_dimensions(&self) -> usize {
        (**self).num_target_dimensions()
    }

    fn apply(&mut self, source: &[f64], target: &mut [f64]) {
        (**self).apply(source, target);
    }

    fn copy(&self) -> Box<dyn RealTransform> {
        (**self).copy()
    }
}

impl<T: ?Sized + InvertibleRealTransform> InvertibleRealTransform for Box<T> {
    fn apply_inverse(&mut self, target: &[f64], source: &mut [f64]) {
        (**self).apply_inverse(target, source);
    }

    fn inverse(&self) -> Box<dyn InvertibleRealTransform> {
        (**self).inverse()
    }

    fn copy_invertible(&self) -> Box<dyn InvertibleRealTransform> {
        (**self).copy_invertible()
    }
}

impl Clone for Box<dyn RealTransform> {
    fn clone(&self) -> Self {
        self.copy()
    }
}

impl Clone for Box<dyn InvertibleRealTransform> {
    fn clone(&self) -> Self {
        self.copy_invertible()
    }
}
