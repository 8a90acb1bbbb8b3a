//! Payload compression gateway.
//!
//! Stored payloads may be compressed to stretch the byte budget; each
//! [`CacheEntry`](crate::CacheEntry) records the codec used so hits can be
//! decoded before serving. The algorithms themselves come from `flate2`
//! and `brotli`; this module only adapts them to byte-in/byte-out calls.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 6;
const BROTLI_LG_WINDOW: u32 = 22;

/// Identifies how a stored payload was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    None,
    Gzip,
    Brotli,
}

/// Compress `data` with the given codec. `Codec::None` copies.
pub fn compress(codec: Codec, data: &[u8]) -> Result<Vec<u8>, CacheError> {
    match codec {
        Codec::None => Ok(data.to_vec()),
        Codec::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(
                Vec::with_capacity(data.len() / 4),
                flate2::Compression::default(),
            );
            encoder
                .write_all(data)
                .map_err(|err| CacheError::codec(format!("gzip compression failed: {err}")))?;
            encoder
                .finish()
                .map_err(|err| CacheError::codec(format!("gzip finish failed: {err}")))
        }
        Codec::Brotli => {
            let mut encoder = brotli::CompressorReader::new(
                data,
                BROTLI_BUFFER_SIZE,
                BROTLI_QUALITY,
                BROTLI_LG_WINDOW,
            );
            let mut output = Vec::with_capacity(data.len() / 4);
            encoder
                .read_to_end(&mut output)
                .map_err(|err| CacheError::codec(format!("brotli compression failed: {err}")))?;
            Ok(output)
        }
    }
}

/// Decompress `data` encoded with the given codec. `Codec::None` copies.
pub fn decompress(codec: Codec, data: &[u8]) -> Result<Vec<u8>, CacheError> {
    match codec {
        Codec::None => Ok(data.to_vec()),
        Codec::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(data);
            let mut output = Vec::with_capacity(data.len() * 4);
            decoder
                .read_to_end(&mut output)
                .map_err(|err| CacheError::codec(format!("gzip decompression failed: {err}")))?;
            Ok(output)
        }
        Codec::Brotli => {
            let mut decoder = brotli::Decompressor::new(data, BROTLI_BUFFER_SIZE);
            let mut output = Vec::with_capacity(data.len() * 4);
            decoder
                .read_to_end(&mut output)
                .map_err(|err| CacheError::codec(format!("brotli decompression failed: {err}")))?;
            Ok(output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let data = b"plain bytes";
        assert_eq!(compress(Codec::None, data).unwrap(), data);
        assert_eq!(decompress(Codec::None, data).unwrap(), data);
    }

    #[test]
    fn gzip_round_trip() {
        let data = "hello cache ".repeat(100).into_bytes();
        let compressed = compress(Codec::Gzip, &data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(Codec::Gzip, &compressed).unwrap(), data);
    }

    #[test]
    fn brotli_round_trip() {
        let data = "hello cache ".repeat(100).into_bytes();
        let compressed = compress(Codec::Brotli, &data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(Codec::Brotli, &compressed).unwrap(), data);
    }

    #[test]
    fn gzip_rejects_garbage() {
        assert!(decompress(Codec::Gzip, b"definitely not gzip").is_err());
    }

    #[test]
    fn empty_payload_round_trip() {
        let compressed = compress(Codec::Gzip, b"").unwrap();
        assert_eq!(decompress(Codec::Gzip, &compressed).unwrap(), b"");
    }
}
