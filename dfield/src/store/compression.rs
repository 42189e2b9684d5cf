//! N5 block compression.

use std::io::{Cursor, Read};

use flate2::bufread::{GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::BlockStoreError;

/// The `compression` value of N5 dataset attributes: a `type` and its configuration.
///
/// For example:
/// ```json
/// {
///     "type": "gzip",
///     "level": 6,
///     "useZlib": false
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CompressionMetadata {
    #[serde(rename = "type")]
    compression_type: String,
    #[serde(flatten)]
    configuration: Map<String, Value>,
}

impl CompressionMetadata {
    /// Create compression metadata of `compression_type` with its `configuration`.
    #[must_use]
    pub fn new(compression_type: impl Into<String>, configuration: Map<String, Value>) -> Self {
        Self {
            compression_type: compression_type.into(),
            configuration,
        }
    }

    /// Returns the compression type.
    #[must_use]
    pub fn compression_type(&self) -> &str {
        &self.compression_type
    }

    /// Returns the configuration, which includes all fields excluding the `type`.
    #[must_use]
    pub fn configuration(&self) -> &Map<String, Value> {
        &self.configuration
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GzipConfiguration {
    #[serde(default = "default_gzip_level")]
    level: i32,
    #[serde(default)]
    use_zlib: bool,
}

const fn default_gzip_level() -> i32 {
    -1
}

/// The compression applied to the element data of every block of a dataset.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    /// No compression.
    #[default]
    Raw,
    /// `gzip` (or `zlib`) compression.
    Gzip {
        /// The compression level in `0..=9`, or `-1` for the default level.
        level: i32,
        /// Write a zlib rather than a gzip stream.
        use_zlib: bool,
    },
}

impl Compression {
    /// Create a gzip compression with a `level` in `0..=9`, or `-1` for the default level.
    #[must_use]
    pub fn gzip(level: i32) -> Self {
        Self::Gzip {
            level,
            use_zlib: false,
        }
    }

    /// Returns the compression as the `compression` value of N5 dataset attributes.
    #[must_use]
    pub fn to_metadata(&self) -> CompressionMetadata {
        match self {
            Self::Raw => CompressionMetadata::new("raw", Map::new()),
            Self::Gzip { level, use_zlib } => {
                let configuration = GzipConfiguration {
                    level: *level,
                    use_zlib: *use_zlib,
                };
                let configuration = match serde_json::to_value(configuration) {
                    Ok(Value::Object(configuration)) => configuration,
                    _ => Map::new(),
                };
                CompressionMetadata::new("gzip", configuration)
            }
        }
    }

    /// Create a compression from the `compression` value of N5 dataset attributes.
    ///
    /// # Errors
    /// Returns [`BlockStoreError::UnsupportedCompression`] if the compression type is not `raw` or `gzip`,
    /// or [`BlockStoreError::InvalidAttributes`] if its configuration is malformed.
    pub fn from_metadata(metadata: &CompressionMetadata) -> Result<Self, BlockStoreError> {
        match metadata.compression_type() {
            "raw" => Ok(Self::Raw),
            "gzip" => {
                let GzipConfiguration { level, use_zlib } =
                    serde_json::from_value(Value::Object(metadata.configuration.clone()))
                        .map_err(|err| {
                            BlockStoreError::InvalidAttributes(format!("compression: {err}"))
                        })?;
                Ok(Self::Gzip { level, use_zlib })
            }
            other => Err(BlockStoreError::UnsupportedCompression(other.to_string())),
        }
    }

    fn flate2_level(level: i32) -> flate2::Compression {
        u32::try_from(level).map_or_else(
            |_| flate2::Compression::default(),
            |level| flate2::Compression::new(level.min(9)),
        )
    }

    /// Compress `decoded`.
    ///
    /// # Errors
    /// Returns an IO error if compression fails.
    pub fn encode(&self, decoded: Vec<u8>) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Raw => Ok(decoded),
            Self::Gzip { level, use_zlib } => {
                let level = Self::flate2_level(*level);
                let mut out: Vec<u8> = Vec::new();
                if *use_zlib {
                    ZlibEncoder::new(Cursor::new(decoded), level).read_to_end(&mut out)?;
                } else {
                    GzEncoder::new(Cursor::new(decoded), level).read_to_end(&mut out)?;
                }
                Ok(out)
            }
        }
    }

    /// Decompress `encoded`.
    ///
    /// # Errors
    /// Returns an IO error if the compressed stream is invalid.
    pub fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Raw => Ok(encoded.to_vec()),
            Self::Gzip { use_zlib, .. } => {
                let mut out: Vec<u8> = Vec::new();
                if *use_zlib {
                    ZlibDecoder::new(Cursor::new(encoded)).read_to_end(&mut out)?;
                } else {
                    GzDecoder::new(Cursor::new(encoded)).read_to_end(&mut out)?;
                }
                Ok(out)
            }
        }
    }
}
