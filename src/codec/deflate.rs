//! Deflate codec implementation.
//!
//! Raw DEFLATE streams (no zlib header) through `flate2`'s low-level
//! `Compress` and `Decompress` state machines.

use std::io;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use super::{DecodeStatus, Decoder, Encoder, reserve_output};
use crate::entry::CompressionMethod;

/// Deflate encoder.
pub struct DeflateEncoder {
    inner: Compress,
}

impl std::fmt::Debug for DeflateEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateEncoder")
            .field("total_in", &self.inner.total_in())
            .finish_non_exhaustive()
    }
}

impl DeflateEncoder {
    /// Creates a new Deflate encoder. Levels above 9 are clamped.
    pub fn new(level: u32) -> Self {
        Self {
            inner: Compress::new(Compression::new(level.min(9)), false),
        }
    }
}

impl Encoder for DeflateEncoder {
    fn encode(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        while !input.is_empty() {
            reserve_output(out, input.len() / 2);
            let before = self.inner.total_in();
            self.inner
                .compress_vec(input, out, FlushCompress::None)
                .map_err(io::Error::other)?;
            let consumed = (self.inner.total_in() - before) as usize;
            input = &input[consumed..];
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        loop {
            reserve_output(out, 0);
            let before = self.inner.total_out();
            let status = self
                .inner
                .compress_vec(&[], out, FlushCompress::Finish)
                .map_err(io::Error::other)?;
            if status == Status::StreamEnd {
                return Ok(());
            }
            if self.inner.total_out() == before && out.len() < out.capacity() {
                return Err(io::Error::other("deflate encoder made no progress"));
            }
        }
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Deflated
    }
}

/// Deflate decoder.
pub struct DeflateDecoder {
    inner: Decompress,
}

impl std::fmt::Debug for DeflateDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateDecoder")
            .field("total_out", &self.inner.total_out())
            .finish_non_exhaustive()
    }
}

impl DeflateDecoder {
    /// Creates a new Deflate decoder.
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(false),
        }
    }
}

impl Default for DeflateDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for DeflateDecoder {
    fn decode(&mut self, input: &[u8], out: &mut [u8]) -> io::Result<DecodeStatus> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();
        let status = self
            .inner
            .decompress(input, out, FlushDecompress::None)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(DecodeStatus {
            consumed: (self.inner.total_in() - before_in) as usize,
            produced: (self.inner.total_out() - before_out) as usize,
            finished: status == Status::StreamEnd,
        })
    }

    fn requires_end_marker(&self) -> bool {
        true
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Deflated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(level: u32, data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(level);
        let mut out = Vec::new();
        encoder.encode(data, &mut out).unwrap();
        encoder.finish(&mut out).unwrap();
        out
    }

    #[test]
    fn test_deflate_roundtrip() {
        let data = b"Hello, Deflate! Hello, Deflate! Hello, Deflate!".repeat(50);
        let packed = encode_all(6, &data);
        assert!(packed.len() < data.len());

        let mut decoder = DeflateDecoder::new();
        let mut out = vec![0u8; data.len() + 16];
        let status = decoder.decode(&packed, &mut out).unwrap();
        assert!(status.finished);
        assert_eq!(status.consumed, packed.len());
        assert_eq!(&out[..status.produced], &data[..]);
    }

    #[test]
    fn test_level_zero_stores_blocks() {
        let data = vec![0xAAu8; 4096];
        let packed = encode_all(0, &data);
        assert!(packed.len() >= data.len());
    }

    #[test]
    fn test_small_output_buffer() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let packed = encode_all(9, &data);
        let mut decoder = DeflateDecoder::new();
        let mut result = Vec::new();
        let mut input = &packed[..];
        let mut chunk = [0u8; 17];
        loop {
            let status = decoder.decode(input, &mut chunk).unwrap();
            result.extend_from_slice(&chunk[..status.produced]);
            input = &input[status.consumed..];
            if status.finished {
                break;
            }
        }
        assert_eq!(result, data);
    }

    #[test]
    fn test_garbage_is_invalid_data() {
        let mut decoder = DeflateDecoder::new();
        let mut out = [0u8; 64];
        let err = decoder.decode(&[0xFF; 32], &mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
