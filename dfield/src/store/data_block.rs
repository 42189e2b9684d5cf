//! N5 data blocks.
//!
//! A block is encoded as a big-endian header followed by the (compressed) big-endian element data:
//! - `u16` mode (`0` default, `1` variable length),
//! - `u16` number of dimensions,
//! - `u32` block size per dimension,
//! - `u32` number of elements (mode `1` only).

use num::Float;

use super::{BlockStoreError, Compression};
use crate::{data_type::DataType, element::Element};

const MODE_DEFAULT: u16 = 0;
const MODE_VARLENGTH: u16 = 1;

/// The typed element data of a block.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum BlockData {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! block_data_apply {
    ($data:expr, $elements:ident => $body:expr) => {
        match $data {
            BlockData::Int8($elements) => $body,
            BlockData::UInt8($elements) => $body,
            BlockData::Int16($elements) => $body,
            BlockData::UInt16($elements) => $body,
            BlockData::Int32($elements) => $body,
            BlockData::UInt32($elements) => $body,
            BlockData::Int64($elements) => $body,
            BlockData::UInt64($elements) => $body,
            BlockData::Float32($elements) => $body,
            BlockData::Float64($elements) => $body,
        }
    };
}

impl BlockData {
    /// Returns the data type of the elements.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int8(_) => DataType::Int8,
            Self::UInt8(_) => DataType::UInt8,
            Self::Int16(_) => DataType::Int16,
            Self::UInt16(_) => DataType::UInt16,
            Self::Int32(_) => DataType::Int32,
            Self::UInt32(_) => DataType::UInt32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
        }
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        block_data_apply!(self, elements => elements.len())
    }

    /// Returns true if there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if every element is the fill value (zero).
    #[must_use]
    pub fn is_fill_value(&self) -> bool {
        block_data_apply!(self, elements => elements.iter().all(|element| element.is_fill_value()))
    }

    /// Convert the elements to floating point samples, multiplying each by `multiplier`.
    #[must_use]
    pub fn to_samples<S: Float>(&self, multiplier: f64) -> Vec<S> {
        block_data_apply!(self, elements => elements
            .iter()
            .map(|element| <S as num::NumCast>::from(element.as_f64() * multiplier).unwrap_or_else(S::nan))
            .collect())
    }

    fn encode_be(&self, bytes: &mut Vec<u8>) {
        block_data_apply!(self, elements => Element::encode_be(elements.as_slice(), bytes));
    }

    fn decode_be(data_type: DataType, bytes: &[u8]) -> Self {
        crate::dispatch_data_type!(data_type, T => T::into_block_data(T::decode_be(bytes)))
    }
}

/// A block of a dataset: its (clipped) size and element data.
#[derive(Clone, Debug, PartialEq)]
pub struct DataBlock {
    size: Vec<u64>,
    data: BlockData,
}

impl DataBlock {
    /// Create a new data block.
    ///
    /// # Errors
    /// Returns [`BlockStoreError::InvalidBlock`] if the number of elements does not match the product of `size`.
    pub fn new(size: Vec<u64>, data: BlockData) -> Result<Self, BlockStoreError> {
        let num_elements = num_elements(&size)?;
        if usize::try_from(num_elements).ok() == Some(data.len()) {
            Ok(Self { size, data })
        } else {
            Err(BlockStoreError::InvalidBlock(format!(
                "block of size {size:?} has {} elements, expected {num_elements}",
                data.len()
            )))
        }
    }

    /// Returns the size of the block.
    #[must_use]
    pub fn size(&self) -> &[u64] {
        &self.size
    }

    /// Returns the element data of the block.
    #[must_use]
    pub fn data(&self) -> &BlockData {
        &self.data
    }

    /// Consume the block and return its element data.
    #[must_use]
    pub fn into_data(self) -> BlockData {
        self.data
    }

    /// Returns true if every element is the fill value (zero).
    #[must_use]
    pub fn is_fill_value(&self) -> bool {
        self.data.is_fill_value()
    }

    /// Encode the block with `compression`.
    ///
    /// # Errors
    /// Returns a [`BlockStoreError`] if the block size cannot be represented in the header or compression fails.
    pub fn encode(&self, compression: &Compression) -> Result<Vec<u8>, BlockStoreError> {
        let num_dimensions = u16::try_from(self.size.len()).map_err(|_| {
            BlockStoreError::InvalidBlock(format!("too many dimensions ({})", self.size.len()))
        })?;
        let mut header = Vec::with_capacity(4 + 4 * self.size.len());
        header.extend_from_slice(&MODE_DEFAULT.to_be_bytes());
        header.extend_from_slice(&num_dimensions.to_be_bytes());
        for size in &self.size {
            let size = u32::try_from(*size).map_err(|_| {
                BlockStoreError::InvalidBlock(format!("block size {size} exceeds u32"))
            })?;
            header.extend_from_slice(&size.to_be_bytes());
        }

        let mut data = Vec::with_capacity(self.data.len() * self.data.data_type().size());
        self.data.encode_be(&mut data);
        header.extend(compression.encode(data)?);
        Ok(header)
    }

    /// Decode an encoded block holding elements of `data_type`.
    ///
    /// # Errors
    /// Returns [`BlockStoreError::InvalidBlock`] if the header or element data is malformed.
    pub fn decode(
        encoded: &[u8],
        data_type: DataType,
        compression: &Compression,
    ) -> Result<Self, BlockStoreError> {
        let mut reader = HeaderReader { bytes: encoded };
        let mode = reader.read_u16()?;
        if mode != MODE_DEFAULT && mode != MODE_VARLENGTH {
            return Err(BlockStoreError::InvalidBlock(format!(
                "unsupported block mode {mode}"
            )));
        }
        let num_dimensions = reader.read_u16()?;
        let size = (0..num_dimensions)
            .map(|_| reader.read_u32().map(u64::from))
            .collect::<Result<Vec<_>, _>>()?;
        let num_elements = if mode == MODE_VARLENGTH {
            u64::from(reader.read_u32()?)
        } else {
            num_elements(&size)?
        };

        let decoded = compression.decode(reader.bytes)?;
        let expected_len = usize::try_from(num_elements)
            .ok()
            .and_then(|num_elements| num_elements.checked_mul(data_type.size()));
        if expected_len != Some(decoded.len()) {
            return Err(BlockStoreError::InvalidBlock(format!(
                "decoded block has {} bytes, expected {num_elements} {data_type} elements",
                decoded.len()
            )));
        }
        Self::new(size, BlockData::decode_be(data_type, &decoded))
    }
}

fn num_elements(size: &[u64]) -> Result<u64, BlockStoreError> {
    size.iter()
        .try_fold(1u64, |product, &extent| product.checked_mul(extent))
        .ok_or_else(|| {
            BlockStoreError::InvalidBlock(format!(
                "number of elements of block size {size:?} overflows"
            ))
        })
}

struct HeaderReader<'a> {
    bytes: &'a [u8],
}

impl HeaderReader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], BlockStoreError> {
        if self.bytes.len() < N {
            return Err(BlockStoreError::InvalidBlock(
                "block header is truncated".to_string(),
            ));
        }
        let (head, tail) = self.bytes.split_at(N);
        let mut buffer = [0u8; N];
        buffer.copy_from_slice(head);
        self.bytes = tail;
        Ok(buffer)
    }

    fn read_u16(&mut self) -> Result<u16, BlockStoreError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    fn read_u32(&mut self) -> Result<u32, BlockStoreError> {
        Ok(u32::from_be_bytes(self.take()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_block_encoding() {
        let block = DataBlock::new(vec![2, 1, 2], BlockData::Int16(vec![1, 2, 3, -1])).unwrap();
        let encoded = block.encode(&Compression::Raw).unwrap();
        assert_eq!(
            encoded,
            vec![
                0, 0, // mode
                0, 3, // dimensions
                0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2, // size
                0, 1, 0, 2, 0, 3, 0xff, 0xff, // data
            ]
        );
        let decoded = DataBlock::decode(&encoded, DataType::Int16, &Compression::Raw).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn data_block_gzip() {
        let block = DataBlock::new(vec![3, 4], BlockData::Float64((0..12).map(f64::from).collect()))
            .unwrap();
        let compression = Compression::gzip(6);
        let encoded = block.encode(&compression).unwrap();
        let decoded = DataBlock::decode(&encoded, DataType::Float64, &compression).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn data_block_varlength_mode() {
        let mut encoded = vec![0, 1, 0, 1, 0, 0, 0, 2, 0, 0, 0, 2];
        encoded.extend_from_slice(&[7, 9]);
        let block = DataBlock::decode(&encoded, DataType::UInt8, &Compression::Raw).unwrap();
        assert_eq!(block.data(), &BlockData::UInt8(vec![7, 9]));
    }

    #[test]
    fn data_block_invalid() {
        assert!(DataBlock::new(vec![2, 2], BlockData::Int8(vec![0; 3])).is_err());
        assert!(DataBlock::decode(&[0, 0, 0], DataType::Int8, &Compression::Raw).is_err());
        assert!(DataBlock::decode(&[0, 2, 0, 0], DataType::Int8, &Compression::Raw).is_err());
        // header says 2 elements, 3 bytes follow
        assert!(DataBlock::decode(
            &[0, 0, 0, 1, 0, 0, 0, 2, 1, 2, 3],
            DataType::Int8,
            &Compression::Raw
        )
        .is_err());
    }

    #[test]
    fn data_block_size_overflow() {
        // mode 0, 3 dimensions of u32::MAX elements each
        let mut encoded = vec![0, 0, 0, 3];
        encoded.extend_from_slice(&[0xff; 12]);
        let result = DataBlock::decode(&encoded, DataType::Int8, &Compression::Raw);
        assert!(matches!(result, Err(BlockStoreError::InvalidBlock(message)) if message.contains("overflows")));
        let size = vec![u64::from(u32::MAX); 3];
        assert!(matches!(
            DataBlock::new(size, BlockData::Int8(vec![])),
            Err(BlockStoreError::InvalidBlock(_))
        ));
    }

    #[test]
    fn block_data_fill_value_and_samples() {
        assert!(BlockData::Float32(vec![0.0, -0.0]).is_fill_value());
        assert!(!BlockData::UInt64(vec![0, 1]).is_fill_value());
        let samples: Vec<f64> = BlockData::Int8(vec![-2, 0, 4]).to_samples(0.5);
        assert_eq!(samples, vec![-1.0, 0.0, 2.0]);
    }
}
