use crate::error::{Result, SaveError};
use crate::format::CompressionType;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Upper bound for a decompressed slot body.
pub const MAX_BODY_SIZE: u64 = 256 * 1024 * 1024;

const LZ4_LEVEL: u32 = 4;

/// Codec applied to the body section of a slot. Zstd carries its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionCodec {
    None,
    Zstd(i32),
    Lz4,
}

impl CompressionCodec {
    pub fn zstd_default() -> Self {
        CompressionCodec::Zstd(3)
    }

    pub fn zstd_fast() -> Self {
        CompressionCodec::Zstd(1)
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, CompressionCodec::None)
    }

    /// Compresses an encoded body. `None` hands the buffer back untouched.
    pub fn compress_body(&self, body: Vec<u8>) -> Result<Vec<u8>> {
        if body.len() as u64 > MAX_BODY_SIZE {
            return Err(SaveError::Compression(format!(
                "body of {} bytes exceeds the {} byte limit",
                body.len(),
                MAX_BODY_SIZE
            )));
        }

        match self {
            CompressionCodec::None => Ok(body),
            CompressionCodec::Zstd(level) => zstd::bulk::compress(&body, *level)
                .map_err(|e| SaveError::Compression(e.to_string())),
            CompressionCodec::Lz4 => {
                let mut encoder = lz4::EncoderBuilder::new()
                    .level(LZ4_LEVEL)
                    .build(Vec::with_capacity(body.len() / 2))
                    .map_err(|e| SaveError::Compression(e.to_string()))?;
                std::io::copy(&mut body.as_slice(), &mut encoder)
                    .map_err(|e| SaveError::Compression(e.to_string()))?;

                let (compressed, result) = encoder.finish();
                result.map_err(|e| SaveError::Compression(e.to_string()))?;
                Ok(compressed)
            }
        }
    }
}

impl From<CompressionCodec> for CompressionType {
    fn from(codec: CompressionCodec) -> Self {
        match codec {
            CompressionCodec::None => CompressionType::None,
            CompressionCodec::Zstd(_) => CompressionType::Zstd,
            CompressionCodec::Lz4 => CompressionType::Lz4,
        }
    }
}

impl CompressionType {
    /// Restores a stored body that the header says is `body_size` bytes
    /// long. Output is never allowed to grow past that size.
    pub fn decompress_body(&self, stored: &[u8], body_size: u64) -> Result<Vec<u8>> {
        if body_size > MAX_BODY_SIZE {
            return Err(SaveError::Decompression(format!(
                "declared body of {} bytes exceeds the {} byte limit",
                body_size, MAX_BODY_SIZE
            )));
        }

        let body = match self {
            CompressionType::None => stored.to_vec(),
            CompressionType::Zstd => zstd::bulk::decompress(stored, body_size as usize)
                .map_err(|e| SaveError::Decompression(e.to_string()))?,
            CompressionType::Lz4 => {
                let decoder =
                    lz4::Decoder::new(stored).map_err(|e| SaveError::Decompression(e.to_string()))?;
                let mut body = Vec::with_capacity(body_size as usize);
                // One extra byte so an oversized body is detected below.
                decoder
                    .take(body_size + 1)
                    .read_to_end(&mut body)
                    .map_err(|e| SaveError::Decompression(e.to_string()))?;
                body
            }
        };

        if body.len() as u64 != body_size {
            return Err(SaveError::Decompression(format!(
                "body is {} bytes, header declares {}",
                body.len(),
                body_size
            )));
        }
        Ok(body)
    }
}
