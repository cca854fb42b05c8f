//! Block compression for page payloads.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::metadata::Compressor;
use crate::error::{StorageError, StorageResult};

/// Compresses a page payload.
pub fn compress(compressor: Compressor, data: &[u8]) -> StorageResult<Vec<u8>> {
    match compressor {
        Compressor::Snappy => {
            let mut encoder = snap::raw::Encoder::new();
            encoder
                .compress_vec(data)
                .map_err(|e| compression_error(compressor, e))
        }
        Compressor::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
            encoder
                .write_all(data)
                .map_err(|e| compression_error(compressor, e))?;
            encoder.finish().map_err(|e| compression_error(compressor, e))
        }
    }
}

/// Decompresses a page payload.
pub fn decompress(compressor: Compressor, data: &[u8]) -> StorageResult<Vec<u8>> {
    match compressor {
        Compressor::Snappy => {
            let mut decoder = snap::raw::Decoder::new();
            decoder
                .decompress_vec(data)
                .map_err(|e| compression_error(compressor, e))
        }
        Compressor::Zlib => {
            let mut out = Vec::with_capacity(data.len() * 2);
            ZlibDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| compression_error(compressor, e))?;
            Ok(out)
        }
    }
}

fn compression_error(compressor: Compressor, err: impl std::fmt::Display) -> StorageError {
    StorageError::Compression {
        compressor: compressor.name(),
        reason: err.to_string(),
    }
}
