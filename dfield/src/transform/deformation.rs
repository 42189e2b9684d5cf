//! Displacement (deformation) field transforms.

use std::sync::Arc;

use super::{IncompatibleDimensionalityError, RealTransform};
use crate::interpolation::{InterpolatedField, InterpolationScratch, Sample};

/// A transform displacing each point by a continuous vector field: `target = source + d(source)`.
///
/// Component `i` of the displacement is the scalar field `fields[i]`.
/// The fields are shared between copies, each copy owns its interpolation scratch buffers.
#[derive(Debug)]
pub struct DeformationFieldTransform<S> {
    fields: Arc<Vec<InterpolatedField<S>>>,
    scratch: InterpolationScratch,
}

impl<S: Sample> DeformationFieldTransform<S> {
    /// Create a deformation field transform from one continuous field per displacement component.
    ///
    /// # Errors
    /// Returns an [`IncompatibleDimensionalityError`] if the number of fields differs from their dimensionality.
    pub fn new(fields: Vec<InterpolatedField<S>>) -> Result<Self, IncompatibleDimensionalityError> {
        if let Some(field) = fields
            .iter()
            .find(|field| field.num_dimensions() != fields.len())
        {
            return Err(IncompatibleDimensionalityError::new(
                field.num_dimensions(),
                fields.len(),
            ));
        }
        Ok(Self {
            fields: Arc::new(fields),
            scratch: InterpolationScratch::default(),
        })
    }

    /// Returns the displacement component fields.
    #[must_use]
    pub fn fields(&self) -> &[InterpolatedField<S>] {
        &self.fields
    }

    /// Evaluate the displacement at `position`.
    pub fn displacement(&mut self, position: &[f64], displacement: &mut [f64]) {
        for (field, displacement) in self.fields.iter().zip(displacement.iter_mut()) {
            *displacement = field.value_at(position, &mut self.scratch);
        }
    }
}

impl<S: Sample> Clone for DeformationFieldTransform<S> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            scratch: InterpolationScratch::default(),
        }
    }
}

impl<S: Sample> RealTransform for DeformationFieldTransform<S> {
    fn num_source_dimensions(&self) -> usize {
        self.fields.len()
    }

    fn num_target_dimensions(&self) -> usize {
        self.fields.len()
    }

    fn apply(&mut self, source: &[f64], target: &mut [f64]) {
        for (d, field) in self.fields.iter().enumerate() {
            target[d] = source[d] + field.value_at(source, &mut self.scratch);
        }
    }

    fn copy(&self) -> Box<dyn RealTransform> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        array::field_from_vec,
        interpolation::{Extension, Interpolation},
    };

    fn constant_field(value: f64) -> InterpolatedField<f64> {
        InterpolatedField::new(
            field_from_vec(&[3, 3], vec![value; 9]).unwrap(),
            Interpolation::NLinear,
            Extension::Border,
        )
    }

    #[test]
    fn deformation_apply() {
        let mut transform =
            DeformationFieldTransform::new(vec![constant_field(3.0), constant_field(-4.0)])
                .unwrap();
        assert_eq!(transform.num_source_dimensions(), 2);
        assert_eq!(transform.transform(&[1.0, 1.0]), vec![4.0, -3.0]);
        assert_eq!(transform.transform(&[10.0, -10.0]), vec![13.0, -14.0]);

        let mut displacement = [0.0; 2];
        transform.displacement(&[0.5, 0.5], &mut displacement);
        assert_eq!(displacement, [3.0, -4.0]);
    }

    #[test]
    fn deformation_copy_shares_fields() {
        let transform = DeformationFieldTransform::new(vec![constant_field(1.0), constant_field(2.0)])
            .unwrap();
        let copy = transform.clone();
        assert!(Arc::ptr_eq(&transform.fields, &copy.fields));
        let mut boxed = transform.copy();
        assert_eq!(boxed.transform(&[0.0, 0.0]), vec![1.0, 2.0]);
    }

    #[test]
    fn deformation_dimensionality() {
        assert!(DeformationFieldTransform::new(vec![constant_field(1.0)]).is_err());
    }
}
