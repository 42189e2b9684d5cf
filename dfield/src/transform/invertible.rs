//! Explicitly paired forward and inverse transforms.

use super::{IncompatibleDimensionalityError, InvertibleRealTransform, RealTransform};

/// An invertible transform built from a forward transform and its separately computed inverse.
///
/// [`InvertibleRealTransform::inverse`] swaps the pair without any recomputation.
#[derive(Debug)]
pub struct ExplicitInvertibleTransform {
    forward: Box<dyn RealTransform>,
    inverse: Box<dyn RealTransform>,
}

impl ExplicitInvertibleTransform {
    /// Pair `forward` with its `inverse`.
    ///
    /// # Errors
    /// Returns an [`IncompatibleDimensionalityError`] if the source (target) dimensionality of `forward` differs from the target (source) dimensionality of `inverse`.
    pub fn new(
        forward: Box<dyn RealTransform>,
        inverse: Box<dyn RealTransform>,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if forward.num_source_dimensions() != inverse.num_target_dimensions() {
            return Err(IncompatibleDimensionalityError::new(
                inverse.num_target_dimensions(),
                forward.num_source_dimensions(),
            ));
        }
        if forward.num_target_dimensions() != inverse.num_source_dimensions() {
            return Err(IncompatibleDimensionalityError::new(
                inverse.num_source_dimensions(),
                forward.num_target_dimensions(),
            ));
        }
        Ok(Self { forward, inverse })
    }

    /// Returns the forward transform.
    #[must_use]
    pub fn forward(&self) -> &dyn RealTransform {
        self.forward.as_ref()
    }

    /// Returns the inverse transform.
    #[must_use]
    pub fn inverse_transform(&self) -> &dyn RealTransform {
        self.inverse.as_ref()
    }

    /// Consume the pair and return the forward and inverse transforms.
    #[must_use]
    pub fn into_parts(self) -> (Box<dyn RealTransform>, Box<dyn RealTransform>) {
        (self.forward, self.inverse)
    }
}

impl Clone for ExplicitInvertibleTransform {
    fn clone(&self) -> Self {
        Self {
            forward: self.forward.copy(),
            inverse: self.inverse.copy(),
        }
    }
}

impl RealTransform for ExplicitInvertibleTransform {
    fn num_source_dimensions(&self) -> usize {
        self.forward.num_source_dimensions()
    }

    fn num_target_dimensions(&self) -> usize {
        self.forward.num_target_dimensions()
    }

    fn apply(&mut self, source: &[f64], target: &mut [f64]) {
        self.forward.apply(source, target);
    }

    fn copy(&self) -> Box<dyn RealTransform> {
        Box::new(self.clone())
    }
}

impl InvertibleRealTransform for ExplicitInvertibleTransform {
    fn apply_inverse(&mut self, target: &[f64], source: &mut [f64]) {
        self.inverse.apply(target, source);
    }

    fn inverse(&self) -> Box<dyn InvertibleRealTransform> {
        Box::new(Self {
            forward: self.inverse.copy(),
            inverse: self.forward.copy(),
        })
    }

    fn copy_invertible(&self) -> Box<dyn InvertibleRealTransform> {
        Box::new(self.clone())
    }
}
