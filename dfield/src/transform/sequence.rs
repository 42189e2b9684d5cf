//! Sequences of transforms.

use super::RealTransform;

/// A sequence of transforms applied in order.
///
/// An empty sequence is the identity.
#[derive(Debug, Default)]
pub struct TransformSequence {
    transforms: Vec<Box<dyn RealTransform>>,
    buffer: Vec<f64>,
    next: Vec<f64>,
}

impl TransformSequence {
    /// Create an empty transform sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `transform` to the end of the sequence.
    pub fn push(&mut self, transform: Box<dyn RealTransform>) -> &mut Self {
        self.transforms.push(transform);
        self
    }

    /// Append `transform` to the end of the sequence.
    #[must_use]
    pub fn then(mut self, transform: Box<dyn RealTransform>) -> Self {
        self.push(transform);
        self
    }

    /// Returns the transforms of the sequence.
    #[must_use]
    pub fn transforms(&self) -> &[Box<dyn RealTransform>] {
        &self.transforms
    }

    /// Returns the number of transforms in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Returns true if the sequence is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl RealTransform for TransformSequence {
    fn num_source_dimensions(&self) -> usize {
        self.transforms
            .first()
            .map_or(0, |transform| transform.num_source_dimensions())
    }

    fn num_target_dimensions(&self) -> usize {
        self.transforms
            .last()
            .map_or(0, |transform| transform.num_target_dimensions())
    }

    fn apply(&mut self, source: &[f64], target: &mut [f64]) {
        let Some((last, transforms)) = self.transforms.split_last_mut() else {
            let len = source.len().min(target.len());
            target[..len].copy_from_slice(&source[..len]);
            return;
        };
        let mut current = std::mem::take(&mut self.buffer);
        let mut next = std::mem::take(&mut self.next);
        current.clear();
        current.extend_from_slice(source);
        for transform in transforms {
            next.resize(transform.num_target_dimensions(), 0.0);
            transform.apply(&current, &mut next);
            std::mem::swap(&mut current, &mut next);
        }
        last.apply(&current, target);
        self.buffer = current;
        self.next = next;
    }

    fn copy(&self) -> Box<dyn RealTransform> {
        Box::new(Self {
            transforms: self.transforms.iter().map(|transform| transform.copy()).collect(),
            buffer: Vec::new(),
            next: Vec::new(),
        })
    }
}
