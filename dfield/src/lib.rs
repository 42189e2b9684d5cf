//! `dfield` is a Rust library for storing dense coordinate transforms as chunked [N5](https://github.com/saalfeldlab/n5) displacement fields.
//!
//! A transform of n-dimensional physical space is sampled at every pixel of a grid and its displacement (target minus source) is stored as an (n+1)-d dataset, vector axis first.
//! Displacements can be stored as floating point values or quantized to integers with a bounded per-vector error, which often compresses far better.
//! On read, the displacement samples are interpolated into a continuous transform, composed with an optional affine, and optionally paired with a stored inverse.
//!
//! ## Writing
//! - [`DisplacementFieldBuilder::save`](codec::DisplacementFieldBuilder::save): evaluate a [`RealTransform`](transform::RealTransform) over a block grid in parallel with [`rayon`] and write each non-empty block.
//! - [`DisplacementFieldBuilder::save_field`](codec::DisplacementFieldBuilder::save_field): write an in-memory [`FieldArray`](array::FieldArray) with its vector axis first or last.
//! - Blocks that fail to write do not stop the others; they are reported in a [`WriteSummary`](scheduler::WriteSummary) through [`DisplacementFieldError::PartialWrite`].
//!
//! ## Reading
//! - [`open`](codec::open): a [`RealTransform`](transform::RealTransform) from a forward or inverse dataset.
//! - [`open_invertible`](codec::open_invertible): an [`InvertibleRealTransform`](transform::InvertibleRealTransform) from a pair of datasets.
//! - [`open_field`](codec::open_field) and [`open_calibrated_field`](codec::open_calibrated_field): the (dequantized) samples and their continuous per-axis fields.
//!
//! ## Storage
//! Datasets are read and written through the [`ReadableBlockStoreTraits`](store::ReadableBlockStoreTraits) and [`WritableBlockStoreTraits`](store::WritableBlockStoreTraits) block store traits.
//! [`N5BlockStore`](store::N5BlockStore) implements them with the N5 layout over any [`storage`] key/value store, such as a [`MemoryStore`](storage::store::MemoryStore) or a [`FilesystemStore`](filesystem::FilesystemStore).
//!
//! ## Crate Features
//! #### Default
//!  - `filesystem`: Re-export [`dfield_filesystem`] as [`dfield::filesystem`](crate::filesystem).
//!
//! ## Licence
//! `dfield` is licensed under either of
//!  - the Apache License, Version 2.0 or <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license or <http://opensource.org/licenses/MIT>, at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted for inclusion in the work by you, as defined in the Apache-2.0 license, shall be dual licensed as above, without any additional terms or conditions.
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod array;
pub mod axis;
pub mod chunk_grid;
pub mod codec;
pub mod config;
pub mod data_type;
pub mod element;
mod error;
pub mod evaluator;
pub mod interpolation;
pub mod quantization;
pub mod scheduler;
pub mod store;
pub mod transform;

#[cfg(feature = "filesystem")]
pub use dfield_filesystem as filesystem;
pub use dfield_storage as storage;

pub use error::DisplacementFieldError;
