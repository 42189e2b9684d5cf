//! The closed set of N5 element data types.

use derive_more::Display;

/// The element data type of an N5 dataset.
///
/// Integer data types hold quantized displacements, floating point data types hold raw displacements.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum DataType {
    /// `int8`
    #[display("int8")]
    Int8,
    /// `uint8`
    #[display("uint8")]
    UInt8,
    /// `int16`
    #[display("int16")]
    Int16,
    /// `uint16`
    #[display("uint16")]
    UInt16,
    /// `int32`
    #[display("int32")]
    Int32,
    /// `uint32`
    #[display("uint32")]
    UInt32,
    /// `int64`
    #[display("int64")]
    Int64,
    /// `uint64`
    #[display("uint64")]
    UInt64,
    /// `float32`
    #[display("float32")]
    Float32,
    /// `float64`
    #[display("float64")]
    Float64,
}

impl DataType {
    /// Every supported data type.
    pub const ALL: [Self; 10] = [
        Self::Int8,
        Self::UInt8,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
        Self::Float32,
        Self::Float64,
    ];

    /// Returns the N5 name of the data type (e.g. `int16`).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Parse an N5 data type name. Returns [`None`] for unsupported names.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|data_type| data_type.name() == name)
    }

    /// Returns the size of an element in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Returns true if the data type is an integer (quantized) data type.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        !self.is_float()
    }

    /// Returns true if the data type is a floating point (raw) data type.
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

/// Dispatch a generic expression over a [`DataType`].
///
/// The type alias named by the second argument is bound to the element type matching the data type.
///
/// ```rust
/// # use dfield::{data_type::DataType, dispatch_data_type};
/// let size = dispatch_data_type!(DataType::Int16, T => std::mem::size_of::<T>());
/// assert_eq!(size, 2);
/// ```
#[macro_export]
macro_rules! dispatch_data_type {
    ($data_type:expr, $t:ident => $body:expr) => {
        match $data_type {
            $crate::data_type::DataType::Int8 => {
                type $t = i8;
                $body
            }
            $crate::data_type::DataType::UInt8 => {
                type $t = u8;
                $body
            }
            $crate::data_type::DataType::Int16 => {
                type $t = i16;
                $body
            }
            $crate::data_type::DataType::UInt16 => {
                type $t = u16;
                $body
            }
            $crate::data_type::DataType::Int32 => {
                type $t = i32;
                $body
            }
            $crate::data_type::DataType::UInt32 => {
                type $t = u32;
                $body
            }
            $crate::data_type::DataType::Int64 => {
                type $t = i64;
                $body
            }
            $crate::data_type::DataType::UInt64 => {
                type $t = u64;
                $body
            }
            $crate::data_type::DataType::Float32 => {
                type $t = f32;
                $body
            }
            $crate::data_type::DataType::Float64 => {
                type $t = f64;
                $body
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_names() {
        for data_type in DataType::ALL {
            assert_eq!(DataType::from_name(data_type.name()), Some(data_type));
            assert_eq!(data_type.to_string(), data_type.name());
        }
        assert_eq!(DataType::from_name("uint4"), None);
        assert_eq!(DataType::from_name("object"), None);
    }

    #[test]
    fn data_type_kinds() {
        assert!(DataType::Int16.is_integer());
        assert!(DataType::UInt64.is_integer());
        assert!(DataType::Float32.is_float());
        assert!(!DataType::Float64.is_integer());
        assert_eq!(DataType::UInt16.size(), 2);
        assert_eq!(DataType::Float64.size(), 8);
    }

    #[test]
    fn data_type_dispatch() {
        for data_type in DataType::ALL {
            let size = dispatch_data_type!(data_type, T => std::mem::size_of::<T>());
            assert_eq!(size, data_type.size());
        }
    }
}
