//! Typed dataset elements.
//!
//! [`Element`] is implemented for every Rust type backing a [`DataType`].
//! Code generic over [`Element`] is monomorphised once per data type, so branching on the data type happens once per dataset rather than per sample.

use std::fmt::Debug;

use num::{Bounded, NumCast};

use crate::{data_type::DataType, store::BlockData};

/// A trait representing a dataset element type.
pub trait Element:
    Copy + Default + PartialEq + Debug + Send + Sync + NumCast + Bounded + 'static
{
    /// The data type of the element.
    const DATA_TYPE: DataType;

    /// Convert the element to [`f64`] (lossy for 64-bit integers).
    fn as_f64(self) -> f64;

    /// Convert from [`f64`] with `as` semantics (rounding for floats, saturating for integers).
    fn cast_from_f64(value: f64) -> Self;

    /// Append the big-endian encoding of `elements` to `bytes`.
    fn encode_be(elements: &[Self], bytes: &mut Vec<u8>);

    /// Decode big-endian `bytes` into elements.
    ///
    /// Trailing bytes that do not form a whole element are ignored.
    fn decode_be(bytes: &[u8]) -> Vec<Self>;

    /// Wrap `elements` in the matching [`BlockData`] variant.
    fn into_block_data(elements: Vec<Self>) -> BlockData;

    /// Unwrap [`BlockData`] of the matching variant, otherwise return it unchanged.
    ///
    /// # Errors
    /// Returns the input if its data type is not [`Self::DATA_TYPE`].
    fn from_block_data(data: BlockData) -> Result<Vec<Self>, BlockData>;

    /// Returns true if the element is the fill value (zero).
    fn is_fill_value(self) -> bool {
        self == Self::default()
    }
}

macro_rules! impl_element {
    ($type:ty, $variant:ident) => {
        impl Element for $type {
            const DATA_TYPE: DataType = DataType::$variant;

            #[allow(clippy::cast_lossless, clippy::unnecessary_cast)]
            fn as_f64(self) -> f64 {
                self as f64
            }

            #[allow(clippy::cast_sign_loss, clippy::unnecessary_cast)]
            fn cast_from_f64(value: f64) -> Self {
                value as $type
            }

            fn encode_be(elements: &[Self], bytes: &mut Vec<u8>) {
                bytes.reserve(elements.len() * size_of::<$type>());
                for element in elements {
                    bytes.extend_from_slice(&element.to_be_bytes());
                }
            }

            fn decode_be(bytes: &[u8]) -> Vec<Self> {
                bytes
                    .chunks_exact(size_of::<$type>())
                    .map(|chunk| {
                        let mut buffer = [0u8; size_of::<$type>()];
                        buffer.copy_from_slice(chunk);
                        <$type>::from_be_bytes(buffer)
                    })
                    .collect()
            }

            fn into_block_data(elements: Vec<Self>) -> BlockData {
                BlockData::$variant(elements)
            }

            fn from_block_data(data: BlockData) -> Result<Vec<Self>, BlockData> {
                match data {
                    BlockData::$variant(elements) => Ok(elements),
                    data => Err(data),
                }
            }
        }
    };
}

impl_element!(i8, Int8);
impl_element!(u8, UInt8);
impl_element!(i16, Int16);
impl_element!(u16, UInt16);
impl_element!(i32, Int32);
impl_element!(u32, UInt32);
impl_element!(i64, Int64);
impl_element!(u64, UInt64);
impl_element!(f32, Float32);
impl_element!(f64, Float64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_big_endian() {
        let mut bytes = Vec::new();
        i16::encode_be(&[1, -2], &mut bytes);
        assert_eq!(bytes, vec![0x00, 0x01, 0xff, 0xfe]);
        assert_eq!(i16::decode_be(&bytes), vec![1, -2]);

        let mut bytes = Vec::new();
        f32::encode_be(&[1.0], &mut bytes);
        assert_eq!(bytes, vec![0x3f, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn element_decode_ignores_trailing_bytes() {
        assert_eq!(u16::decode_be(&[0, 7, 1]), vec![7]);
    }

    #[test]
    fn element_block_data() {
        let data = i32::into_block_data(vec![1, 2, 3]);
        assert_eq!(data.data_type(), DataType::Int32);
        let data = f64::from_block_data(data).unwrap_err();
        assert_eq!(i32::from_block_data(data).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn element_cast_from_f64() {
        assert_eq!(f32::cast_from_f64(0.5), 0.5);
        assert_eq!(i8::cast_from_f64(300.0), 127);
        assert_eq!(u16::cast_from_f64(-3.0), 0);
    }

    #[test]
    fn element_fill_value() {
        assert!(0u8.is_fill_value());
        assert!((-0.0f64).is_fill_value());
        assert!(!1i64.is_fill_value());
    }
}
