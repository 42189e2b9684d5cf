//! The displacement field codec.
//!
//! A transform is stored as an (N+1)-d dataset of displacements, vector axis first, plus attributes:
//! - `affine`: the row-packed affine applied after (forward) or before (inverse) the displacement,
//! - `spacing`: the physical size of a pixel along each axis, and
//! - `quantization_multiplier`: the quantization step of integer datasets.
//!
//! The write path is configured by a [`DisplacementFieldBuilder`].
//! The read path ([`open`], [`open_invertible`], ...) reconstructs a continuous transform with [`OpenOptions`].
//!
//! ## Example
//! ```rust
//! # use std::sync::Arc;
//! # use dfield::codec::{open, DisplacementFieldBuilder, Direction, OpenOptions};
//! # use dfield::data_type::DataType;
//! # use dfield::store::N5BlockStore;
//! # use dfield::storage::store::MemoryStore;
//! # use dfield::transform::{AffineTransform, RealTransform};
//! let store = N5BlockStore::new(Arc::new(MemoryStore::new()));
//! let translation = AffineTransform::translation(&[3.0, 4.0]);
//! DisplacementFieldBuilder::new(vec![5, 5])
//!     .spacing(vec![2.0, 2.0])
//!     .quantized(DataType::Int16, 0.05)
//!     .save(&store, "dfield", &translation, &[10, 10])?;
//!
//! let mut transform = open::<f64, _>(&store, "dfield", Direction::Forward, &OpenOptions::default())?;
//! let target = transform.transform(&[1.0, 1.0]);
//! assert!(((target[0] - 4.0).powi(2) + (target[1] - 5.0).powi(2)).sqrt() <= 0.05);
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

mod metadata;
mod read;
mod write;

pub use metadata::{open_affine, open_pixel_to_physical, open_quantization_multiplier};
pub use read::{
    abs_range, open, open_calibrated_field, open_field, open_invertible, open_invertible_default,
    open_invertible_level, Direction, OpenOptions,
};
pub use write::{DisplacementFieldBuilder, FieldEncoding};

/// The attribute holding the quantization multiplier of an integer dataset.
pub const MULTIPLIER_ATTRIBUTE: &str = "quantization_multiplier";

/// The attribute holding the row-packed affine of a dataset.
pub const AFFINE_ATTRIBUTE: &str = "affine";

/// The attribute holding the pixel spacing of a dataset.
pub const SPACING_ATTRIBUTE: &str = "spacing";

/// The default forward displacement field dataset.
pub const FORWARD_DATASET: &str = "dfield";

/// The default inverse displacement field dataset.
pub const INVERSE_DATASET: &str = "invdfield";

/// Returns the forward and inverse datasets of multiscale `level`.
#[must_use]
pub fn level_datasets(level: usize) -> (String, String) {
    (
        format!("/{level}/{FORWARD_DATASET}"),
        format!("/{level}/{INVERSE_DATASET}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_level_datasets() {
        assert_eq!(
            level_datasets(2),
            ("/2/dfield".to_string(), "/2/invdfield".to_string())
        );
    }
}
