#![allow(missing_docs)]

use std::sync::Arc;

use dfield::codec::{
    level_datasets, open_invertible_default, open_invertible_level, DisplacementFieldBuilder,
};
use dfield::data_type::DataType;
use dfield::store::{Compression, N5BlockStore, ReadableBlockStoreTraits};
use dfield::transform::{AffineTransform, InvertibleRealTransform, RealTransform};
use dfield_filesystem::FilesystemStore;

fn assert_close(a: &[f64], b: &[f64], tolerance: f64) {
    assert_eq!(a.len(), b.len());
    for (a, b) in a.iter().zip(b) {
        assert!((a - b).abs() <= tolerance, "{a} != {b}");
    }
}

#[test]
fn filesystem_layout() -> Result<(), Box<dyn std::error::Error>> {
    let path = tempfile::TempDir::new()?;
    let store = N5BlockStore::new(Arc::new(FilesystemStore::new(path.path())?));
    let (forward, inverse) = level_datasets(1);
    let translation = AffineTransform::translation(&[1.0, -2.0, 0.5]);
    let mut builder = DisplacementFieldBuilder::new(vec![4, 4, 4]);
    builder
        .raw(DataType::Float32)
        .compression(Compression::gzip(5))
        .spacing(vec![0.5, 0.5, 2.0]);
    builder.save(&store, &forward, &translation, &[6, 5, 4])?;
    builder.save(&store, &inverse, &translation.inverse(), &[6, 5, 4])?;

    let attributes_path = path.path().join("1/dfield/attributes.json");
    assert!(attributes_path.is_file());
    let attributes: serde_json::Value = serde_json::from_slice(&std::fs::read(attributes_path)?)?;
    assert_eq!(attributes["dimensions"], serde_json::json!([3, 6, 5, 4]));
    assert_eq!(attributes["blockSize"], serde_json::json!([3, 4, 4, 4]));
    assert_eq!(attributes["dataType"], "float32");
    assert_eq!(attributes["compression"]["type"], "gzip");
    assert_eq!(attributes["spacing"], serde_json::json!([0.5, 0.5, 2.0]));
    assert!(attributes.get("affine").is_none());
    assert!(attributes.get("quantization_multiplier").is_none());
    for block in ["0/0/0/0", "0/1/0/0", "0/0/1/0", "0/1/1/0"] {
        assert!(path.path().join("1/dfield").join(block).is_file(), "{block}");
    }
    assert!(!path.path().join("1/dfield/0/2/0/0").exists());
    assert!(store.dataset_exists("1/invdfield")?);

    let mut invertible = open_invertible_level(&store, 1)?;
    let point = [1.25, 0.5, 3.0];
    let target = invertible.transform(&point);
    assert_close(&target, &[2.25, -1.5, 3.5], 1e-6);
    let mut source = vec![0.0; 3];
    invertible.apply_inverse(&target, &mut source);
    assert_close(&source, &point, 1e-6);
    Ok(())
}

#[test]
fn filesystem_forward_and_inverse() -> Result<(), Box<dyn std::error::Error>> {
    let path = tempfile::TempDir::new()?;
    let store = N5BlockStore::new(Arc::new(FilesystemStore::new(path.path())?));
    let affine = AffineTransform::from_row_packed(&[0.0, -1.0, 10.0, 1.0, 0.0, 0.0])?;
    let deformation = AffineTransform::translation(&[0.75, 0.25]);
    DisplacementFieldBuilder::new(vec![16, 16])
        .affine(affine.clone())
        .quantized(DataType::Int16, 0.01)
        .save_forward_and_inverse(
            &store,
            &deformation,
            &deformation.inverse(),
            &[20, 20],
            Some(vec![1.0, 1.0]),
        )?;
    assert!(path.path().join("dfield/attributes.json").is_file());
    assert!(path.path().join("invdfield/attributes.json").is_file());

    let inverse_affine: Vec<f64> =
        dfield::store::get_attribute_as(&store, "invdfield", "affine")?.unwrap();
    assert_close(&inverse_affine, &affine.inverse().row_packed(), 1e-12);

    let mut invertible = open_invertible_default(&store)?;
    for point in [[2.0, 3.0], [10.5, 4.25], [17.0, 17.0]] {
        let target = invertible.transform(&point);
        let mut expected = affine.clone();
        assert_close(
            &target,
            &expected.transform(&[point[0] + 0.75, point[1] + 0.25]),
            0.01,
        );
        let mut source = vec![0.0; 2];
        invertible.apply_inverse(&target, &mut source);
        assert_close(&source, &point, 0.02);
    }
    Ok(())
}
