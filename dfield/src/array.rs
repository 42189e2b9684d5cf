//! Displacement field arrays.
//!
//! A [`FieldArray`] is a shared [`ndarray`] array in column-major order, so axis 0 varies fastest in memory like N5 block data.
//! Permuting axes with [`ArrayBase::permuted_axes`](ndarray::ArrayBase::permuted_axes) and slicing with [`ArrayBase::index_axis`](ndarray::ArrayBase::index_axis) do not copy.

use ndarray::{ArcArray, Dimension, IxDyn, ShapeBuilder, ShapeError};

/// An n-dimensional array of field samples sharing its data between clones and views.
pub type FieldArray<T> = ArcArray<T, IxDyn>;

/// Create a field array of `shape` from `data` in axis 0 fastest order.
///
/// # Errors
/// Returns a [`ShapeError`] if the length of `data` is not the product of `shape`.
pub fn field_from_vec<T>(shape: &[usize], data: Vec<T>) -> Result<FieldArray<T>, ShapeError> {
    ArcArray::from_shape_vec(IxDyn(shape).f(), data)
}

/// Create a field array of `shape` with every element computed by `f` from its index.
pub fn field_from_fn<T>(shape: &[usize], mut f: impl FnMut(&[usize]) -> T) -> FieldArray<T> {
    ArcArray::from_shape_fn(IxDyn(shape).f(), |index| f(index.slice()))
}

/// Copy the elements of `field` into a vector in axis 0 fastest order.
#[must_use]
pub fn field_to_vec<T: Clone>(field: &FieldArray<T>) -> Vec<T> {
    field.t().iter().cloned().collect()
}

/// Call `f` with every index of `shape`, axis 0 varying fastest.
pub fn for_each_index(shape: &[usize], mut f: impl FnMut(&[usize])) {
    // row-major indices of the reversed shape, reversed
    let reversed: Vec<usize> = shape.iter().rev().copied().collect();
    let mut index = vec![0; shape.len()];
    for reversed_index in ndarray::indices(IxDyn(&reversed)) {
        for (axis, position) in reversed_index.slice().iter().rev().enumerate() {
            index[axis] = *position;
        }
        f(&index);
    }
}
