#![allow(missing_docs)]

use std::sync::Arc;

use dfield::codec::{
    abs_range, open, open_field, DisplacementFieldBuilder, Direction, OpenOptions,
    MULTIPLIER_ATTRIBUTE,
};
use dfield::data_type::DataType;
use dfield::quantization::{OverflowPolicy, QuantizationError, QuantizationPlan};
use dfield::scheduler::{BlockTaskError, WriteOptions};
use dfield::storage::storage_adapter::performance_metrics::PerformanceMetricsStorageAdapter;
use dfield::storage::store::MemoryStore;
use dfield::storage::{
    Bytes, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey, StorePrefix,
    WritableStorageTraits,
};
use dfield::store::{BlockData, N5BlockStore, ReadableBlockStoreTraits};
use dfield::transform::{AffineTransform, RealTransform};
use dfield::DisplacementFieldError;

fn memory_store() -> N5BlockStore<MemoryStore> {
    N5BlockStore::new(Arc::new(MemoryStore::new()))
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// A memory store which rejects writes to a single key.
#[derive(Debug)]
struct FailingStorage {
    inner: MemoryStore,
    failing_key: &'static str,
}

impl ReadableStorageTraits for FailingStorage {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        self.inner.get(key)
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        self.inner.size_key(key)
    }
}

impl WritableStorageTraits for FailingStorage {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        if key.as_str() == self.failing_key {
            Err(StorageError::Other("disk full".to_string()))
        } else {
            self.inner.set(key, value)
        }
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.inner.erase(key)
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        self.inner.erase_prefix(prefix)
    }
}

/// Displaces points with `x >= 8` by one along `y`.
#[derive(Clone, Debug)]
struct Step;

impl RealTransform for Step {
    fn num_source_dimensions(&self) -> usize {
        2
    }

    fn num_target_dimensions(&self) -> usize {
        2
    }

    fn apply(&mut self, source: &[f64], target: &mut [f64]) {
        target[0] = source[0];
        target[1] = if source[0] >= 8.0 { source[1] + 1.0 } else { source[1] };
    }

    fn copy(&self) -> Box<dyn RealTransform> {
        Box::new(self.clone())
    }
}

#[test]
fn quantized_translation() -> Result<(), Box<dyn std::error::Error>> {
    let store = memory_store();
    let translation = AffineTransform::translation(&[3.0, 4.0]);
    let summary = DisplacementFieldBuilder::new(vec![5, 5])
        .spacing(vec![2.0, 2.0])
        .quantized(DataType::Int16, 0.05)
        .save(&store, "dfield", &translation, &[10, 10])?;
    assert!(summary.is_complete());
    assert_eq!(summary.blocks_total(), 4);
    assert_eq!(summary.blocks_written(), 4);

    let multiplier = QuantizationPlan::multiplier_for(2, 0.05);
    assert!((multiplier - 0.070_710_678).abs() < 1e-8);
    assert_eq!(
        store.get_attribute("dfield", MULTIPLIER_ATTRIBUTE)?,
        Some(serde_json::json!(multiplier))
    );

    let attributes = store.dataset_attributes("dfield")?.unwrap();
    assert_eq!(attributes.dimensions(), &[2, 10, 10]);
    assert_eq!(attributes.data_type(), DataType::Int16);
    let block = store.read_block("dfield", &attributes, &[0, 1, 1])?.unwrap();
    assert_eq!(block.size(), &[2, 5, 5]);
    let BlockData::Int16(values) = block.data() else {
        panic!("expected an int16 block");
    };
    assert!(values.chunks(2).all(|vector| vector == [42, 57]));

    let mut opened = open::<f64, _>(&store, "dfield", Direction::Forward, &OpenOptions::default())?;
    for point in [[0.0, 0.0], [1.0, 7.0], [18.0, 18.0], [7.3, 12.9]] {
        let target = opened.transform(&point);
        let expected = [point[0] + 3.0, point[1] + 4.0];
        assert!(distance(&target, &expected) <= 0.05);
    }
    Ok(())
}

#[test]
fn quantized_error_bound() -> Result<(), Box<dyn std::error::Error>> {
    let store = memory_store();
    let transform = AffineTransform::from_row_packed(&[1.05, 0.1, -2.0, -0.2, 0.95, 1.5])?;
    for (data_type, max_error) in [(DataType::Int32, 0.001), (DataType::Int16, 0.1)] {
        DisplacementFieldBuilder::new(vec![7, 6])
            .quantized(data_type, max_error)
            .save(&store, "dfield", &transform, &[20, 15])?;
        let field = open_field::<f64, _>(&store, "dfield")?;
        assert_eq!(field.shape(), &[20, 15, 2]);
        let mut expected = transform.clone();
        for (x, y) in [(0usize, 0usize), (19, 14), (11, 3)] {
            let target = expected.transform(&[x as f64, y as f64]);
            let displacement = [field[[x, y, 0]], field[[x, y, 1]]];
            let error = distance(&displacement, &[target[0] - x as f64, target[1] - y as f64]);
            assert!(error <= max_error, "{data_type}: {error} > {max_error}");
        }
    }
    Ok(())
}

#[test]
fn quantized_overflow_saturate() -> Result<(), Box<dyn std::error::Error>> {
    testing_logger::setup();
    let store = memory_store();
    let summary = DisplacementFieldBuilder::new(vec![10, 10])
        .quantized(DataType::Int8, 0.05)
        .save(&store, "dfield", &AffineTransform::translation(&[100.0, 1.0]), &[10, 10])?;
    assert!(summary.is_complete());
    assert_eq!(summary.saturated_samples(), 100);

    let field = open_field::<f64, _>(&store, "dfield")?;
    let multiplier = QuantizationPlan::multiplier_for(2, 0.05);
    assert!((field[[3, 3, 0]] - 127.0 * multiplier).abs() < 1e-12);
    testing_logger::validate(|captured_logs| {
        assert!(captured_logs.iter().any(|log| log.level == log::Level::Warn
            && log.body
                == "100 quantized samples of dataset dfield were clamped to the range of int8."));
    });
    Ok(())
}

#[test]
fn quantized_overflow_error() {
    let store = memory_store();
    let err = DisplacementFieldBuilder::new(vec![5, 10])
        .quantized(DataType::Int8, 0.05)
        .write_options(WriteOptions::default().with_overflow_policy(OverflowPolicy::Error))
        .save(&store, "dfield", &AffineTransform::translation(&[100.0, 1.0]), &[10, 10])
        .unwrap_err();
    let DisplacementFieldError::PartialWrite { dataset, summary } = err else {
        panic!("expected a partial write");
    };
    assert_eq!(dataset, "dfield");
    assert_eq!(summary.blocks_total(), 2);
    assert_eq!(summary.blocks_written(), 0);
    assert_eq!(summary.failures().len(), 2);
    assert_eq!(summary.failures()[0].grid_position(), &[0, 0, 0]);
    assert!(matches!(
        summary.failures()[1].error(),
        BlockTaskError::Quantization(QuantizationError::Overflow {
            data_type: DataType::Int8,
            ..
        })
    ));
    // the metadata is written regardless
    assert!(store
        .get_attribute("dfield", MULTIPLIER_ATTRIBUTE)
        .unwrap()
        .is_some());
}

#[test]
fn quantized_invalid_parameters() {
    let store = memory_store();
    let translation = AffineTransform::translation(&[1.0, 1.0]);
    assert!(matches!(
        DisplacementFieldBuilder::new(vec![5, 5])
            .quantized(DataType::Int16, 0.0)
            .save(&store, "dfield", &translation, &[10, 10]),
        Err(DisplacementFieldError::InvalidQuantization(
            QuantizationError::InvalidMaxError(_)
        ))
    ));
    assert!(matches!(
        DisplacementFieldBuilder::new(vec![5, 5])
            .quantized(DataType::Float32, 0.1)
            .save(&store, "dfield", &translation, &[10, 10]),
        Err(DisplacementFieldError::InvalidQuantization(
            QuantizationError::NonIntegerDataType(DataType::Float32)
        ))
    ));
    assert!(matches!(
        DisplacementFieldBuilder::new(vec![5, 5]).save(
            &store,
            "dfield",
            &AffineTransform::translation(&[1.0, 1.0, 1.0]),
            &[10, 10]
        ),
        Err(DisplacementFieldError::IncompatibleDimensionality(_))
    ));
}

#[test]
fn quantized_partial_write() -> Result<(), Box<dyn std::error::Error>> {
    testing_logger::setup();
    let store = N5BlockStore::new(Arc::new(FailingStorage {
        inner: MemoryStore::new(),
        failing_key: "dfield/0/1/0",
    }));
    let err = DisplacementFieldBuilder::new(vec![5, 5])
        .spacing(vec![2.0, 2.0])
        .quantized(DataType::Int16, 0.05)
        .save(&store, "dfield", &AffineTransform::translation(&[3.0, 4.0]), &[10, 10])
        .unwrap_err();
    assert_eq!(err.to_string(), "1 of 4 blocks of dataset dfield failed to write");
    let DisplacementFieldError::PartialWrite { summary, .. } = err else {
        panic!("expected a partial write");
    };
    assert_eq!(summary.blocks_written(), 3);
    assert_eq!(summary.failures()[0].grid_position(), &[0, 1, 0]);
    assert!(matches!(summary.failures()[0].error(), BlockTaskError::Store(_)));
    testing_logger::validate(|captured_logs| {
        assert!(captured_logs.iter().any(|log| log.level == log::Level::Error
            && log.body == "Failed to write block [0, 1, 0] of dataset dfield: disk full"));
    });

    // the remaining blocks are readable, the failed block reads as zero
    let field = open_field::<f64, _>(&store, "dfield")?;
    let multiplier = QuantizationPlan::multiplier_for(2, 0.05);
    assert!((field[[0, 0, 0]] - 42.0 * multiplier).abs() < 1e-12);
    assert_eq!(field[[5, 0, 0]], 0.0);
    Ok(())
}

#[test]
fn quantized_empty_blocks() -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(
        MemoryStore::new(),
    )));
    let store = N5BlockStore::new(metrics.clone());
    let summary = DisplacementFieldBuilder::new(vec![4, 4])
        .quantized(DataType::Int8, 0.1)
        .save(&store, "dfield", &Step, &[10, 10])?;
    assert_eq!(summary.blocks_total(), 9);
    assert_eq!(summary.blocks_written(), 3);
    assert_eq!(summary.blocks_skipped(), 6);
    // dataset attributes, blocks, metadata attributes
    assert_eq!(metrics.writes(), 1 + 3 + 1);
    assert_eq!(metrics.keys_erased(), 6);

    metrics.reset();
    DisplacementFieldBuilder::new(vec![4, 4])
        .quantized(DataType::Int8, 0.1)
        .write_options(WriteOptions::default().with_store_empty_blocks(true))
        .save(&store, "dfield", &Step, &[10, 10])?;
    assert_eq!(metrics.writes(), 1 + 9 + 1);
    assert_eq!(metrics.keys_erased(), 0);

    let field = open_field::<f64, _>(&store, "dfield")?;
    assert_eq!(field[[2, 2, 1]], 0.0);
    let range = abs_range(&field).unwrap();
    assert_eq!(range.0, 0.0);
    assert!((range.1 - 1.0).abs() <= 0.1);
    Ok(())
}
