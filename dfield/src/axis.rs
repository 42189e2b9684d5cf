//! Normalisation of the vector axis of displacement fields.
//!
//! An (n+1)-dimensional displacement field stores the n components of each displacement vector along either its first or its last axis.
//! The writer stores fields vector-first, the reader interpolates them vector-last.
//! If both the first and last axes have extent n, the axis already in the requested position is used.

use thiserror::Error;

use crate::array::FieldArray;

/// The vector axis of a displacement field is neither the first nor the last axis.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("displacement fields must store vector components in the first or last dimension; found a {num_dimensions}-d volume with shape {shape:?}, expected size [{expected},...] or [...,{expected}]")]
pub struct AxisConventionError {
    num_dimensions: usize,
    expected: usize,
    shape: Vec<u64>,
}

impl AxisConventionError {
    fn new(shape: &[u64]) -> Self {
        Self {
            num_dimensions: shape.len(),
            expected: shape.len().saturating_sub(1),
            shape: shape.to_vec(),
        }
    }

    /// Returns the dimensionality of the rejected field.
    #[must_use]
    pub fn num_dimensions(&self) -> usize {
        self.num_dimensions
    }

    /// Returns the shape of the rejected field.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }
}

/// The position of the vector axis of a displacement field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VectorAxis {
    /// Axis 0.
    First,
    /// Axis n.
    Last,
}

impl VectorAxis {
    /// Locate the vector axis of a field of `shape`, preferring `preferred` if both the first and last axes qualify.
    ///
    /// # Errors
    /// Returns an [`AxisConventionError`] if neither the first nor the last axis has extent `shape.len() - 1`, or the field has fewer than two dimensions.
    pub fn locate(shape: &[u64], preferred: Self) -> Result<Self, AxisConventionError> {
        let num_dimensions = shape.len();
        if num_dimensions < 2 {
            return Err(AxisConventionError::new(shape));
        }
        let num_components = (num_dimensions - 1) as u64;
        let first = shape[0] == num_components;
        let last = shape[num_dimensions - 1] == num_components;
        match (first, last, preferred) {
            (true, true, preferred) => Ok(preferred),
            (true, false, _) => Ok(Self::First),
            (false, true, _) => Ok(Self::Last),
            (false, false, _) => Err(AxisConventionError::new(shape)),
        }
    }
}

/// Returns the axes permutation moving the vector axis of an `num_dimensions`-d field from `from` to `to`.
///
/// The relative order of the spatial axes is preserved.
#[must_use]
pub fn vector_axis_permutation(num_dimensions: usize, from: VectorAxis, to: VectorAxis) -> Vec<usize> {
    match (from, to) {
        (VectorAxis::First, VectorAxis::Last) => (1..num_dimensions).chain([0]).collect(),
        (VectorAxis::Last, VectorAxis::First) => std::iter::once(num_dimensions - 1)
            .chain(0..num_dimensions - 1)
            .collect(),
        _ => (0..num_dimensions).collect(),
    }
}

fn field_shape<T>(field: &FieldArray<T>) -> Vec<u64> {
    field.shape().iter().map(|&extent| extent as u64).collect()
}

fn to_vector_axis<T>(
    field: &FieldArray<T>,
    requested: VectorAxis,
) -> Result<FieldArray<T>, AxisConventionError> {
    let current = VectorAxis::locate(&field_shape(field), requested)?;
    let axes = vector_axis_permutation(field.ndim(), current, requested);
    Ok(field.clone().permuted_axes(axes))
}

/// Return a view of `field` with the vector components along the last axis.
///
/// The view shares the data of `field`.
///
/// # Errors
/// Returns an [`AxisConventionError`] if `field` has no vector axis.
pub fn to_vector_last<T>(field: &FieldArray<T>) -> Result<FieldArray<T>, AxisConventionError> {
    to_vector_axis(field, VectorAxis::Last)
}

/// Return a view of `field` with the vector components along the first axis.
///
/// The view shares the data of `field`.
///
/// # Errors
/// Returns an [`AxisConventionError`] if `field` has no vector axis.
pub fn to_vector_first<T>(field: &FieldArray<T>) -> Result<FieldArray<T>, AxisConventionError> {
    to_vector_axis(field, VectorAxis::First)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{field_from_fn, field_from_vec};

    fn vector_first_field() -> FieldArray<f64> {
        field_from_fn(&[2, 4, 3], |index| {
            (index[0] * 100 + index[1] * 10 + index[2]) as f64
        })
    }

    #[test]
    fn axis_locate() {
        assert_eq!(VectorAxis::locate(&[2, 4, 3], VectorAxis::Last), Ok(VectorAxis::First));
        assert_eq!(VectorAxis::locate(&[4, 3, 2], VectorAxis::First), Ok(VectorAxis::Last));
        assert_eq!(VectorAxis::locate(&[2, 5, 2], VectorAxis::First), Ok(VectorAxis::First));
        assert_eq!(VectorAxis::locate(&[2, 5, 2], VectorAxis::Last), Ok(VectorAxis::Last));
        assert!(VectorAxis::locate(&[3], VectorAxis::Last).is_err());
    }

    #[test]
    fn axis_permutation() {
        assert_eq!(
            vector_axis_permutation(4, VectorAxis::First, VectorAxis::Last),
            vec![1, 2, 3, 0]
        );
        assert_eq!(
            vector_axis_permutation(4, VectorAxis::Last, VectorAxis::First),
            vec![3, 0, 1, 2]
        );
        assert_eq!(
            vector_axis_permutation(3, VectorAxis::Last, VectorAxis::Last),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn axis_vector_last() {
        let field = vector_first_field();
        let last = to_vector_last(&field).unwrap();
        assert_eq!(last.as_ptr(), field.as_ptr());
        assert_eq!(last.shape(), &[4, 3, 2]);
        assert_eq!(last[[3, 2, 1]], field[[1, 3, 2]]);
    }

    #[test]
    fn axis_idempotence() {
        let field = vector_first_field();
        assert_eq!(to_vector_first(&to_vector_last(&field).unwrap()).unwrap(), field);
        let last = to_vector_last(&field).unwrap();
        assert_eq!(to_vector_last(&to_vector_first(&last).unwrap()).unwrap(), last);

        let unchanged = to_vector_first(&field).unwrap();
        assert_eq!(unchanged.as_ptr(), field.as_ptr());
        assert_eq!(unchanged.shape(), field.shape());
        assert_eq!(unchanged.strides(), field.strides());
    }

    #[test]
    fn axis_malformed() {
        let field = field_from_vec(&[5, 5, 5, 5], vec![0.0f32; 625]).unwrap();
        let err = to_vector_last(&field).unwrap_err();
        assert_eq!(err.num_dimensions(), 4);
        assert_eq!(err.shape(), &[5, 5, 5, 5]);
        let message = err.to_string();
        assert!(message.contains("4-d"));
        assert!(message.contains("[3,...]"));
        assert!(message.contains("[...,3]"));
    }
}
