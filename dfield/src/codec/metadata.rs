//! Displacement field dataset attributes.
//!
//! Absent or malformed `affine` and `spacing` attributes read as [`None`], an absent multiplier as `1.0`.

use serde_json::{Map, Value};

use super::{AFFINE_ATTRIBUTE, MULTIPLIER_ATTRIBUTE, SPACING_ATTRIBUTE};
use crate::{
    error::DisplacementFieldError,
    store::{get_attribute_as, BlockStoreError, ReadableBlockStoreTraits, WritableBlockStoreTraits},
    transform::AffineTransform,
};

/// Write (or remove, if [`None`]) the `affine`, `spacing` and `quantization_multiplier` attributes of `path`.
pub(crate) fn write_metadata<TStore: ?Sized + WritableBlockStoreTraits>(
    store: &TStore,
    path: &str,
    affine: Option<&AffineTransform>,
    spacing: Option<&[f64]>,
    multiplier: Option<f64>,
) -> Result<(), BlockStoreError> {
    let mut attributes = Map::new();
    attributes.insert(
        AFFINE_ATTRIBUTE.to_string(),
        affine.map_or(Value::Null, |affine| Value::from(affine.row_packed())),
    );
    attributes.insert(
        SPACING_ATTRIBUTE.to_string(),
        spacing.map_or(Value::Null, Value::from),
    );
    attributes.insert(
        MULTIPLIER_ATTRIBUTE.to_string(),
        multiplier.map_or(Value::Null, Value::from),
    );
    store.set_attributes(path, attributes)
}

/// Read an `f64` array attribute, treating a value of another type as absent.
fn get_f64_array<TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
    path: &str,
    key: &str,
) -> Result<Option<Vec<f64>>, DisplacementFieldError> {
    match get_attribute_as::<Vec<f64>, _>(store, path, key) {
        Ok(value) => Ok(value),
        Err(BlockStoreError::InvalidJson(err)) => {
            log::warn!("Ignoring malformed {key} attribute of {path}: {err}");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Returns the affine stored in the `affine` attribute of `path`.
///
/// Only 1D, 2D and 3D affines (2, 6 or 12 coefficients) are recognised.
/// Returns [`None`] if the attribute is absent, has another length, or is not invertible.
///
/// # Errors
/// Returns a [`DisplacementFieldError`] if the attributes of `path` cannot be read.
pub fn open_affine<TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
    path: &str,
) -> Result<Option<AffineTransform>, DisplacementFieldError> {
    let Some(coefficients) = get_f64_array(store, path, AFFINE_ATTRIBUTE)? else {
        return Ok(None);
    };
    if !matches!(coefficients.len(), 2 | 6 | 12) {
        log::debug!(
            "Ignoring affine of {path} with {} coefficients.",
            coefficients.len()
        );
        return Ok(None);
    }
    match AffineTransform::from_row_packed(&coefficients) {
        Ok(affine) => Ok(Some(affine)),
        Err(err) => {
            log::warn!("Ignoring affine of {path}: {err}");
            Ok(None)
        }
    }
}

/// Returns the pixel to physical transform of `path`, a scale by its `spacing` attribute.
///
/// Only 1D, 2D and 3D spacings are recognised.
/// Returns [`None`] if the attribute is absent, has another length, or has a zero spacing.
///
/// # Errors
/// Returns a [`DisplacementFieldError`] if the attributes of `path` cannot be read.
pub fn open_pixel_to_physical<TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
    path: &str,
) -> Result<Option<AffineTransform>, DisplacementFieldError> {
    let Some(spacing) = get_f64_array(store, path, SPACING_ATTRIBUTE)? else {
        return Ok(None);
    };
    if !(1..=3).contains(&spacing.len()) {
        log::debug!(
            "Ignoring spacing of {path} with {} dimensions.",
            spacing.len()
        );
        return Ok(None);
    }
    match AffineTransform::scale(&spacing) {
        Ok(scale) => Ok(Some(scale)),
        Err(err) => {
            log::warn!("Ignoring spacing of {path}: {err}");
            Ok(None)
        }
    }
}

/// Returns the `quantization_multiplier` attribute of `path`, or `1.0` if it is absent.
///
/// # Errors
/// Returns a [`DisplacementFieldError`] if the attributes of `path` cannot be read or the multiplier is not a number.
pub fn open_quantization_multiplier<TStore: ?Sized + ReadableBlockStoreTraits>(
    store: &TStore,
    path: &str,
) -> Result<f64, DisplacementFieldError> {
    Ok(get_attribute_as::<f64, _>(store, path, MULTIPLIER_ATTRIBUTE)?.unwrap_or(1.0))
}
