//! Affine transforms.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use super::{IncompatibleDimensionalityError, InvertibleRealTransform, RealTransform};

/// An [`AffineTransform`] error.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum AffineTransformError {
    /// The number of coefficients is not `n * (n + 1)` for any `n`.
    #[error("{0} coefficients do not form a row-packed affine matrix")]
    InvalidLength(usize),
    /// The linear part is not invertible.
    #[error("affine matrix {0:?} is not invertible")]
    Singular(Vec<f64>),
    /// The dimensionality of two affines or an affine and a vector differ.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
}

/// An invertible n-dimensional affine transform.
///
/// The transform is held as an `(n + 1) x (n + 1)` homogeneous matrix.
/// Serialised affines are the first `n` rows, row-packed: each row holds the linear coefficients followed by the translation.
/// The inverse is computed on creation.
#[derive(Clone, Debug, PartialEq)]
pub struct AffineTransform {
    num_dimensions: usize,
    matrix: DMatrix<f64>,
    inverse: DMatrix<f64>,
}

impl AffineTransform {
    /// Returns the number of dimensions of an affine with `len` row-packed coefficients.
    #[must_use]
    pub fn num_dimensions_for_len(len: usize) -> Option<usize> {
        (1..)
            .take_while(|n| n * (n + 1) <= len)
            .find(|n| n * (n + 1) == len)
    }

    /// Create the n-dimensional identity transform.
    #[must_use]
    pub fn identity(num_dimensions: usize) -> Self {
        let matrix = DMatrix::identity(num_dimensions + 1, num_dimensions + 1);
        Self {
            num_dimensions,
            inverse: matrix.clone(),
            matrix,
        }
    }

    /// Create an affine transform from a homogeneous matrix.
    ///
    /// The last row of `matrix` is replaced by `[0, ..., 0, 1]`.
    ///
    /// # Errors
    /// Returns an [`AffineTransformError`] if `matrix` is not square or the transform is not invertible.
    pub fn from_homogeneous(mut matrix: DMatrix<f64>) -> Result<Self, AffineTransformError> {
        if !matrix.is_square() || matrix.nrows() == 0 {
            return Err(AffineTransformError::InvalidLength(matrix.len()));
        }
        let num_dimensions = matrix.nrows() - 1;
        set_homogeneous_row(&mut matrix);
        let singular = || AffineTransformError::Singular(row_packed(&matrix));
        let mut inverse = matrix.clone().try_inverse().ok_or_else(singular)?;
        if !inverse.iter().all(|coefficient| coefficient.is_finite()) {
            return Err(singular());
        }
        set_homogeneous_row(&mut inverse);
        Ok(Self {
            num_dimensions,
            matrix,
            inverse,
        })
    }

    /// Create an affine transform from row-packed coefficients.
    ///
    /// # Errors
    /// Returns an [`AffineTransformError`] if the number of coefficients is invalid or the transform is not invertible.
    pub fn from_row_packed(coefficients: &[f64]) -> Result<Self, AffineTransformError> {
        let n = Self::num_dimensions_for_len(coefficients.len())
            .ok_or(AffineTransformError::InvalidLength(coefficients.len()))?;
        let mut matrix = DMatrix::identity(n + 1, n + 1);
        matrix
            .rows_mut(0, n)
            .copy_from(&DMatrix::from_row_slice(n, n + 1, coefficients));
        Self::from_homogeneous(matrix)
    }

    /// Create a diagonal scale transform.
    ///
    /// # Errors
    /// Returns [`AffineTransformError::Singular`] if a scale factor is zero or not finite.
    pub fn scale(scales: &[f64]) -> Result<Self, AffineTransformError> {
        let diagonal = DVector::from_iterator(
            scales.len() + 1,
            scales.iter().copied().chain(std::iter::once(1.0)),
        );
        Self::from_homogeneous(DMatrix::from_diagonal(&diagonal))
    }

    /// Create a translation.
    #[must_use]
    pub fn translation(translation: &[f64]) -> Self {
        let n = translation.len();
        let mut affine = Self::identity(n);
        for (d, offset) in translation.iter().enumerate() {
            affine.matrix[(d, n)] = *offset;
            affine.inverse[(d, n)] = -*offset;
        }
        affine
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn num_dimensions(&self) -> usize {
        self.num_dimensions
    }

    /// Returns the homogeneous matrix.
    #[must_use]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Returns the row-packed coefficients.
    #[must_use]
    pub fn row_packed(&self) -> Vec<f64> {
        row_packed(&self.matrix)
    }

    /// Returns the coefficient at `row` and `column`. Column `n` is the translation.
    ///
    /// # Panics
    /// Panics if `row` or `column` is out of bounds.
    #[must_use]
    pub fn get(&self, row: usize, column: usize) -> f64 {
        assert!(row < self.num_dimensions && column <= self.num_dimensions);
        self.matrix[(row, column)]
    }

    /// Returns true if the transform is the identity.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.matrix == DMatrix::identity(self.num_dimensions + 1, self.num_dimensions + 1)
    }

    /// Return the inverse transform.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            num_dimensions: self.num_dimensions,
            matrix: self.inverse.clone(),
            inverse: self.matrix.clone(),
        }
    }

    /// Return `self` after `other`: the result applies `other` first, then `self`.
    ///
    /// # Errors
    /// Returns [`AffineTransformError::IncompatibleDimensionality`] if the dimensionality of `other` differs.
    pub fn concatenate(&self, other: &Self) -> Result<Self, AffineTransformError> {
        if other.num_dimensions != self.num_dimensions {
            return Err(IncompatibleDimensionalityError::new(
                other.num_dimensions,
                self.num_dimensions,
            )
            .into());
        }
        Ok(Self {
            num_dimensions: self.num_dimensions,
            matrix: &self.matrix * &other.matrix,
            inverse: &other.inverse * &self.inverse,
        })
    }

    /// Return `other` after `self`: the result applies `self` first, then `other`.
    ///
    /// # Errors
    /// Returns [`AffineTransformError::IncompatibleDimensionality`] if the dimensionality of `other` differs.
    pub fn pre_concatenate(&self, other: &Self) -> Result<Self, AffineTransformError> {
        other.concatenate(self)
    }

    /// Transform `source` and write the result to `target`.
    pub fn apply_to(&self, source: &[f64], target: &mut [f64]) {
        apply_homogeneous(&self.matrix, source, target);
    }

    /// Transform `target` by the inverse and write the result to `source`.
    pub fn apply_inverse_to(&self, target: &[f64], source: &mut [f64]) {
        apply_homogeneous(&self.inverse, target, source);
    }
}

fn set_homogeneous_row(matrix: &mut DMatrix<f64>) {
    let n = matrix.nrows() - 1;
    matrix.row_mut(n).fill(0.0);
    matrix[(n, n)] = 1.0;
}

fn row_packed(matrix: &DMatrix<f64>) -> Vec<f64> {
    let n = matrix.nrows().saturating_sub(1);
    matrix.rows(0, n).transpose().iter().copied().collect()
}

// Per point, so no temporary vectors.
fn apply_homogeneous(matrix: &DMatrix<f64>, source: &[f64], target: &mut [f64]) {
    let n = matrix.nrows() - 1;
    for (row, target) in target.iter_mut().take(n).enumerate() {
        *target = source
            .iter()
            .take(n)
            .enumerate()
            .fold(matrix[(row, n)], |sum, (column, x)| {
                sum + matrix[(row, column)] * x
            });
    }
}

impl RealTransform for AffineTransform {
    fn num_source_dimensions(&self) -> usize {
        self.num_dimensions
    }

    fn num_target_dimensions(&self) -> usize {
        self.num_dimensions
    }

    fn apply(&mut self, source: &[f64], target: &mut [f64]) {
        self.apply_to(source, target);
    }

    fn copy(&self) -> Box<dyn RealTransform> {
        Box::new(self.clone())
    }
}

impl InvertibleRealTransform for AffineTransform {
    fn apply_inverse(&mut self, target: &[f64], source: &mut [f64]) {
        self.apply_inverse_to(target, source);
    }

    fn inverse(&self) -> Box<dyn InvertibleRealTransform> {
        Box::new(Self::inverse(self))
    }

    fn copy_invertible(&self) -> Box<dyn InvertibleRealTransform> {
        Box::new(self.clone())
    }
}
