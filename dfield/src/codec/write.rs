//! The write path of the displacement field codec.

use super::{metadata::write_metadata, FORWARD_DATASET, INVERSE_DATASET};
use crate::{
    array::FieldArray,
    axis::to_vector_first,
    chunk_grid::ChunkGridPlan,
    data_type::DataType,
    element::Element,
    error::DisplacementFieldError,
    evaluator::SampleConverter,
    quantization::QuantizationPlan,
    scheduler::{
        write_all_blocks, write_transform_blocks, FieldBlockSource, WriteOptions, WriteSummary,
    },
    store::{Compression, WritableBlockStoreTraits},
    transform::{AffineTransform, IncompatibleDimensionalityError, RealTransform},
};

/// How displacements are stored.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FieldEncoding {
    /// Floating point displacements.
    Raw(DataType),
    /// Integer displacements quantized with an L2 error of at most `max_error` per vector.
    Quantized {
        /// The integer data type.
        data_type: DataType,
        /// The maximum L2 error of a displacement vector.
        max_error: f64,
    },
}

impl Default for FieldEncoding {
    fn default() -> Self {
        Self::Raw(DataType::Float64)
    }
}

impl FieldEncoding {
    /// Returns the stored data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Raw(data_type) | Self::Quantized { data_type, .. } => *data_type,
        }
    }

    fn plan(
        &self,
        num_spatial_dimensions: usize,
        options: &WriteOptions,
    ) -> Result<(SampleConverter, Option<f64>), DisplacementFieldError> {
        match *self {
            Self::Raw(data_type) if data_type.is_float() => Ok((SampleConverter::Raw, None)),
            Self::Raw(data_type) => Err(DisplacementFieldError::UnsupportedDataType {
                data_type: data_type.to_string(),
                expected: "a floating point data type for raw displacements",
            }),
            Self::Quantized {
                data_type,
                max_error,
            } => {
                let plan = QuantizationPlan::new(num_spatial_dimensions, max_error, data_type)?;
                Ok((
                    SampleConverter::Quantized(plan.quantizer(options.overflow_policy())),
                    Some(plan.multiplier()),
                ))
            }
        }
    }
}

/// A builder for writing displacement field datasets.
///
/// The default dataset has:
/// - raw [`DataType::Float64`] displacements,
/// - [`Compression::Raw`] blocks,
/// - no affine, and
/// - no spacing (pixel and physical coordinates coincide).
///
/// Every save creates the dataset (keeping unrelated user attributes), writes its blocks, then writes its attributes.
/// Attributes the builder does not set are removed from the dataset.
#[derive(Clone, Debug)]
pub struct DisplacementFieldBuilder {
    spatial_block_shape: Vec<u64>,
    compression: Compression,
    encoding: FieldEncoding,
    affine: Option<AffineTransform>,
    spacing: Option<Vec<f64>>,
    options: WriteOptions,
}

impl DisplacementFieldBuilder {
    /// Create a new builder writing blocks of `spatial_block_shape` pixels.
    ///
    /// The vector axis is never split across blocks.
    #[must_use]
    pub fn new(spatial_block_shape: Vec<u64>) -> Self {
        Self {
            spatial_block_shape,
            compression: Compression::Raw,
            encoding: FieldEncoding::default(),
            affine: None,
            spacing: None,
            options: WriteOptions::default(),
        }
    }

    /// Set the block compression.
    pub fn compression(&mut self, compression: Compression) -> &mut Self {
        self.compression = compression;
        self
    }

    /// Store raw floating point displacements of `data_type`.
    pub fn raw(&mut self, data_type: DataType) -> &mut Self {
        self.encoding = FieldEncoding::Raw(data_type);
        self
    }

    /// Store integer displacements of `data_type` quantized with an L2 error of at most `max_error` per vector.
    pub fn quantized(&mut self, data_type: DataType, max_error: f64) -> &mut Self {
        self.encoding = FieldEncoding::Quantized {
            data_type,
            max_error,
        };
        self
    }

    /// Set the affine composed with the displacement on read.
    pub fn affine(&mut self, affine: AffineTransform) -> &mut Self {
        self.affine = Some(affine);
        self
    }

    /// Set the physical size of a pixel along each spatial axis.
    pub fn spacing(&mut self, spacing: Vec<f64>) -> &mut Self {
        self.spacing = Some(spacing);
        self
    }

    /// Set the write options.
    pub fn write_options(&mut self, options: WriteOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// Returns the encoding.
    #[must_use]
    pub fn encoding(&self) -> FieldEncoding {
        self.encoding
    }

    fn pixel_to_physical(
        &self,
        num_spatial_dimensions: usize,
    ) -> Result<AffineTransform, DisplacementFieldError> {
        if let Some(affine) = &self.affine {
            if affine.num_dimensions() != num_spatial_dimensions {
                return Err(IncompatibleDimensionalityError::new(
                    affine.num_dimensions(),
                    num_spatial_dimensions,
                )
                .into());
            }
        }
        match &self.spacing {
            Some(spacing) if spacing.len() != num_spatial_dimensions => {
                Err(IncompatibleDimensionalityError::new(spacing.len(), num_spatial_dimensions).into())
            }
            Some(spacing) => Ok(AffineTransform::scale(spacing)?),
            None => Ok(AffineTransform::identity(num_spatial_dimensions)),
        }
    }

    fn finish<TStore: ?Sized + WritableBlockStoreTraits>(
        &self,
        store: &TStore,
        path: &str,
        summary: WriteSummary,
        multiplier: Option<f64>,
    ) -> Result<WriteSummary, DisplacementFieldError> {
        write_metadata(
            store,
            path,
            self.affine.as_ref(),
            self.spacing.as_deref(),
            multiplier,
        )?;
        if summary.is_complete() {
            log::debug!(
                "Saved displacement field {path}: {} blocks written, {} skipped.",
                summary.blocks_written(),
                summary.blocks_skipped()
            );
            Ok(summary)
        } else {
            Err(DisplacementFieldError::PartialWrite {
                dataset: path.to_string(),
                summary,
            })
        }
    }

    /// Save the displacement field of `transform` over `spatial_shape` pixels to the dataset at `path`.
    ///
    /// The displacement at pixel `c` is `transform(p(c)) - p(c)` where `p` scales by the spacing.
    /// Blocks are evaluated concurrently, each with its own copy of `transform`.
    ///
    /// # Errors
    /// Returns a [`DisplacementFieldError`] if
    ///  - the dimensionality of `transform`, `spatial_shape`, the block shape, the affine, or the spacing differ,
    ///  - the encoding is invalid (a raw integer or a quantized floating point data type, or a nonpositive maximum error),
    ///  - the dataset cannot be created ([`DatasetCreation`](DisplacementFieldError::DatasetCreation)),
    ///  - any block fails to write ([`PartialWrite`](DisplacementFieldError::PartialWrite), the attributes are still written), or
    ///  - the attributes cannot be written.
    pub fn save<TStore: ?Sized + WritableBlockStoreTraits>(
        &self,
        store: &TStore,
        path: &str,
        transform: &dyn RealTransform,
        spatial_shape: &[u64],
    ) -> Result<WriteSummary, DisplacementFieldError> {
        let num_spatial_dimensions = spatial_shape.len();
        let grid = ChunkGridPlan::new(spatial_shape, &self.spatial_block_shape)?;
        let pixel_to_physical = self.pixel_to_physical(num_spatial_dimensions)?;
        let (converter, multiplier) = self.encoding.plan(num_spatial_dimensions, &self.options)?;
        let summary = crate::dispatch_data_type!(self.encoding.data_type(), T => write_transform_blocks::<T, _>(
            store,
            path,
            &grid,
            &self.compression,
            transform,
            pixel_to_physical,
            &converter,
            &self.options,
        ))?;
        self.finish(store, path, summary, multiplier)
    }

    /// Save the forward and inverse displacement fields to the default datasets (`dfield` and `invdfield`).
    ///
    /// The forward dataset stores the affine of the builder, the inverse dataset stores its inverse.
    /// The inverse dataset has `inverse_spacing` (or no spacing).
    ///
    /// # Errors
    /// See [`save`](DisplacementFieldBuilder::save). The inverse dataset is not written if the forward dataset fails.
    pub fn save_forward_and_inverse<TStore: ?Sized + WritableBlockStoreTraits>(
        &self,
        store: &TStore,
        forward: &dyn RealTransform,
        inverse: &dyn RealTransform,
        spatial_shape: &[u64],
        inverse_spacing: Option<Vec<f64>>,
    ) -> Result<WriteSummary, DisplacementFieldError> {
        let forward_summary = self.save(store, FORWARD_DATASET, forward, spatial_shape)?;
        let inverse_summary =
            self.inverse_builder(inverse_spacing)
                .save(store, INVERSE_DATASET, inverse, spatial_shape)?;
        Ok(forward_summary.merge(inverse_summary))
    }

    /// Save a displacement field array to the dataset at `path`.
    ///
    /// `field` has shape `[n, spatial...]` or `[spatial..., n]` for `n` spatial dimensions.
    ///
    /// # Errors
    /// See [`save`](DisplacementFieldBuilder::save).
    /// Returns [`DisplacementFieldError::AxisConvention`] if `field` has no vector axis.
    pub fn save_field<S: Element, TStore: ?Sized + WritableBlockStoreTraits>(
        &self,
        store: &TStore,
        path: &str,
        field: &FieldArray<S>,
    ) -> Result<WriteSummary, DisplacementFieldError> {
        let field = to_vector_first(field)?;
        let spatial_shape: Vec<u64> = field.shape()[1..]
            .iter()
            .map(|&extent| extent as u64)
            .collect();
        let grid = ChunkGridPlan::new(&spatial_shape, &self.spatial_block_shape)?;
        self.pixel_to_physical(spatial_shape.len())?;
        let (converter, multiplier) = self.encoding.plan(spatial_shape.len(), &self.options)?;
        let source = FieldBlockSource::new(&field);
        let summary = crate::dispatch_data_type!(self.encoding.data_type(), T => write_all_blocks::<T, _, _>(
            store,
            path,
            &grid,
            &self.compression,
            &source,
            &converter,
            &self.options,
        ))?;
        self.finish(store, path, summary, multiplier)
    }

    /// Save forward and inverse displacement field arrays to the default datasets (`dfield` and `invdfield`).
    ///
    /// # Errors
    /// See [`save_forward_and_inverse`](DisplacementFieldBuilder::save_forward_and_inverse) and [`save_field`](DisplacementFieldBuilder::save_field).
    pub fn save_field_forward_and_inverse<S: Element, TStore: ?Sized + WritableBlockStoreTraits>(
        &self,
        store: &TStore,
        forward: &FieldArray<S>,
        inverse: &FieldArray<S>,
        inverse_spacing: Option<Vec<f64>>,
    ) -> Result<WriteSummary, DisplacementFieldError> {
        let forward_summary = self.save_field(store, FORWARD_DATASET, forward)?;
        let inverse_summary =
            self.inverse_builder(inverse_spacing)
                .save_field(store, INVERSE_DATASET, inverse)?;
        Ok(forward_summary.merge(inverse_summary))
    }

    fn inverse_builder(&self, inverse_spacing: Option<Vec<f64>>) -> Self {
        Self {
            affine: self.affine.as_ref().map(AffineTransform::inverse),
            spacing: inverse_spacing,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dfield_storage::store::MemoryStore;

    use super::*;
    use crate::{
        array::field_from_fn,
        codec::{AFFINE_ATTRIBUTE, MULTIPLIER_ATTRIBUTE, SPACING_ATTRIBUTE},
        quantization::QuantizationError,
        store::{BlockData, N5BlockStore, ReadableBlockStoreTraits},
    };

    fn memory_store() -> N5BlockStore<MemoryStore> {
        N5BlockStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn builder_encoding() {
        let mut builder = DisplacementFieldBuilder::new(vec![4, 4]);
        assert_eq!(builder.encoding(), FieldEncoding::Raw(DataType::Float64));
        builder.quantized(DataType::Int16, 0.1);
        assert_eq!(builder.encoding().data_type(), DataType::Int16);
        builder.raw(DataType::Float32);
        assert_eq!(builder.encoding(), FieldEncoding::Raw(DataType::Float32));
    }

    #[test]
    fn save_attributes() {
        let store = memory_store();
        let affine = AffineTransform::from_row_packed(&[2.0, 0.0, 1.0, 0.0, 2.0, -1.0]).unwrap();
        let transform = AffineTransform::translation(&[3.0, 4.0]);
        let summary = DisplacementFieldBuilder::new(vec![4, 4])
            .affine(affine.clone())
            .spacing(vec![2.0, 2.0])
            .quantized(DataType::Int16, 0.05)
            .save(&store, "dfield", &transform, &[10, 10])
            .unwrap();
        assert_eq!(summary.blocks_total(), 9);
        assert_eq!(summary.blocks_written(), 9);

        let attributes = store.attributes("dfield").unwrap().unwrap();
        assert_eq!(
            attributes[AFFINE_ATTRIBUTE],
            serde_json::json!([2.0, 0.0, 1.0, 0.0, 2.0, -1.0])
        );
        assert_eq!(attributes[SPACING_ATTRIBUTE], serde_json::json!([2.0, 2.0]));
        let multiplier = attributes[MULTIPLIER_ATTRIBUTE].as_f64().unwrap();
        assert_eq!(multiplier, QuantizationPlan::multiplier_for(2, 0.05));

        // a raw save removes the stale multiplier
        DisplacementFieldBuilder::new(vec![4, 4])
            .save(&store, "dfield", &transform, &[10, 10])
            .unwrap();
        let attributes = store.attributes("dfield").unwrap().unwrap();
        assert!(!attributes.contains_key(MULTIPLIER_ATTRIBUTE));
        assert!(!attributes.contains_key(AFFINE_ATTRIBUTE));
        assert_eq!(
            store.dataset_attributes("dfield").unwrap().unwrap().data_type(),
            DataType::Float64
        );
    }

    #[test]
    fn save_invalid_encoding() {
        let store = memory_store();
        let transform = AffineTransform::identity(2);
        assert!(matches!(
            DisplacementFieldBuilder::new(vec![4, 4])
                .raw(DataType::Int32)
                .save(&store, "dfield", &transform, &[8, 8]),
            Err(DisplacementFieldError::UnsupportedDataType { .. })
        ));
        assert!(matches!(
            DisplacementFieldBuilder::new(vec![4, 4])
                .quantized(DataType::Float32, 0.1)
                .save(&store, "dfield", &transform, &[8, 8]),
            Err(DisplacementFieldError::InvalidQuantization(
                QuantizationError::NonIntegerDataType(DataType::Float32)
            ))
        ));
        assert!(matches!(
            DisplacementFieldBuilder::new(vec![4, 4])
                .quantized(DataType::Int8, 0.0)
                .save(&store, "dfield", &transform, &[8, 8]),
            Err(DisplacementFieldError::InvalidQuantization(
                QuantizationError::InvalidMaxError(_)
            ))
        ));
        assert!(matches!(
            DisplacementFieldBuilder::new(vec![4, 4])
                .spacing(vec![1.0])
                .save(&store, "dfield", &transform, &[8, 8]),
            Err(DisplacementFieldError::IncompatibleDimensionality(_))
        ));
        assert!(matches!(
            DisplacementFieldBuilder::new(vec![4])
                .save(&store, "dfield", &transform, &[8, 8]),
            Err(DisplacementFieldError::ChunkGrid(_))
        ));
        assert!(!store.dataset_exists("dfield").unwrap());
    }

    #[test]
    fn save_affine_dimensionality() {
        let store = memory_store();
        let affine = AffineTransform::identity(3);
        let err = DisplacementFieldBuilder::new(vec![4, 4])
            .affine(affine.clone())
            .save(&store, "dfield", &AffineTransform::identity(2), &[8, 8])
            .unwrap_err();
        let DisplacementFieldError::IncompatibleDimensionality(err) = err else {
            panic!("expected an incompatible dimensionality error");
        };
        assert_eq!((err.got(), err.expected()), (3, 2));

        let field = field_from_fn(&[2, 4, 4], |_| 0.0f64);
        assert!(matches!(
            DisplacementFieldBuilder::new(vec![4, 4])
                .affine(affine)
                .save_field(&store, "dfield", &field),
            Err(DisplacementFieldError::IncompatibleDimensionality(_))
        ));
        assert!(!store.dataset_exists("dfield").unwrap());
    }

    #[test]
    fn save_field_vector_last() {
        let store = memory_store();
        // a 3x2 field with vector components along the last axis
        let field = field_from_fn(&[3, 2, 2], |index| {
            (index[0] * 10 + index[1] * 100 + index[2]) as f32
        });
        DisplacementFieldBuilder::new(vec![3, 2])
            .raw(DataType::Float32)
            .save_field(&store, "dfield", &field)
            .unwrap();
        let attributes = store.dataset_attributes("dfield").unwrap().unwrap();
        assert_eq!(attributes.dimensions(), &[2, 3, 2]);
        let block = store
            .read_block("dfield", &attributes, &[0, 0, 0])
            .unwrap()
            .unwrap();
        assert_eq!(
            block.data(),
            &BlockData::Float32(vec![
                0.0, 1.0, 10.0, 11.0, 20.0, 21.0, 100.0, 101.0, 110.0, 111.0, 120.0, 121.0
            ])
        );
    }

    #[test]
    fn save_forward_and_inverse_affines() {
        let store = memory_store();
        let affine = AffineTransform::from_row_packed(&[2.0, 0.0, 1.0, 0.0, 4.0, 0.0]).unwrap();
        let forward = AffineTransform::translation(&[1.0, 0.0]);
        let inverse = AffineTransform::translation(&[-1.0, 0.0]);
        let summary = DisplacementFieldBuilder::new(vec![2, 2])
            .affine(affine.clone())
            .spacing(vec![1.0, 1.0])
            .save_forward_and_inverse(&store, &forward, &inverse, &[4, 4], None)
            .unwrap();
        assert_eq!(summary.blocks_total(), 8);
        assert_eq!(
            crate::codec::open_affine(&store, FORWARD_DATASET).unwrap(),
            Some(affine.clone())
        );
        assert_eq!(
            crate::codec::open_affine(&store, INVERSE_DATASET).unwrap(),
            Some(affine.inverse())
        );
        assert!(crate::codec::open_pixel_to_physical(&store, INVERSE_DATASET)
            .unwrap()
            .is_none());
    }
}
