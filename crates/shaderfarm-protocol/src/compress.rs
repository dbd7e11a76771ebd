//! Compressed payload encoding.
//!
//! Error payloads (and compiled shader blobs where backends opt in) are
//! length-prefixed then zlib-compressed: `zlib([u32 LE len][bytes])`.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::ProtocolError;

/// Compress a buffer with the conventional length prefix.
pub fn compress_payload(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&(data.len() as u32).to_le_bytes())?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`compress_payload`]. Validates the embedded length prefix.
pub fn decompress_payload(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;

    if raw.len() < 4 {
        return Err(ProtocolError::TruncatedFrame {
            got: raw.len(),
            want: 4,
        });
    }
    let len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    if raw.len() - 4 != len {
        return Err(ProtocolError::TruncatedFrame {
            got: raw.len() - 4,
            want: len,
        });
    }
    Ok(raw.split_off(4))
}

/// Encode an error message for the client.
///
/// If compression fails the payload is cleared rather than sent uncompressed;
/// the client still receives the job-state code in the frame.
pub fn error_payload(text: &str) -> Vec<u8> {
    compress_payload(text.as_bytes()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_round_trip() {
        let data = b"technique t0 { pass p0 {} }".repeat(20);
        let packed = compress_payload(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress_payload(&packed).unwrap(), data);
    }

    #[test]
    fn test_error_payload_carries_text() {
        let payload = error_payload("failed to parse request XML: tag mismatch");
        let text = decompress_payload(&payload).unwrap();
        assert_eq!(text, b"failed to parse request XML: tag mismatch");
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(decompress_payload(b"not zlib at all").is_err());
    }

    #[test]
    fn test_decompress_rejects_bad_length_prefix() {
        // Valid zlib stream whose embedded length disagrees with the content.
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&99u32.to_le_bytes()).unwrap();
        encoder.write_all(b"short").unwrap();
        let packed = encoder.finish().unwrap();
        assert!(decompress_payload(&packed).is_err());
    }
}
