//! Page compression codecs.
//!
//! The codec set is a closed registry; page headers carry the chunk's codec
//! tag and the reader dispatches through [`decompress`]. Codec errors are
//! fatal for the affected page.

use serde::{Deserialize, Serialize};

use crate::{Result, StrataError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Compression {
    #[default]
    Uncompressed = 0,
    Snappy = 1,
    Zstd = 2,
}

impl Compression {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Compression::Uncompressed),
            1 => Some(Compression::Snappy),
            2 => Some(Compression::Zstd),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compression::Uncompressed => "UNCOMPRESSED",
            Compression::Snappy => "SNAPPY",
            Compression::Zstd => "ZSTD",
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub fn compress(codec: Compression, data: &[u8]) -> Result<Vec<u8>> {
    match codec {
        Compression::Uncompressed => Ok(data.to_vec()),
        Compression::Snappy => snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| StrataError::CompressionFailure(format!("snappy encode: {e}"))),
        Compression::Zstd => zstd::stream::encode_all(data, 0)
            .map_err(|e| StrataError::CompressionFailure(format!("zstd encode: {e}"))),
    }
}

/// `uncompressed_size` comes from the page header and bounds the output.
pub fn decompress(codec: Compression, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    let out = match codec {
        Compression::Uncompressed => data.to_vec(),
        Compression::Snappy => snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| StrataError::CompressionFailure(format!("snappy decode: {e}")))?,
        Compression::Zstd => zstd::stream::decode_all(data)
            .map_err(|e| StrataError::CompressionFailure(format!("zstd decode: {e}")))?,
    };
    if out.len() != uncompressed_size {
        return Err(StrataError::CompressionFailure(format!(
            "decompressed {} bytes, page header promised {}",
            out.len(),
            uncompressed_size
        )));
    }
    Ok(out)
}
