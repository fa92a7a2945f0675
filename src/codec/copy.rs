//! Copy codec (no compression).

use std::io;

use super::{DecodeStatus, Decoder, Encoder};
use crate::entry::CompressionMethod;

/// An encoder that passes data through unchanged.
#[derive(Debug, Default)]
pub struct CopyEncoder;

impl CopyEncoder {
    /// Creates a new copy encoder.
    pub fn new() -> Self {
        Self
    }
}

impl Encoder for CopyEncoder {
    fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        out.extend_from_slice(input);
        Ok(())
    }

    fn finish(&mut self, _out: &mut Vec<u8>) -> io::Result<()> {
        Ok(())
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Stored
    }
}

/// A decoder that passes data through unchanged.
///
/// Stored data has no end marker; the caller bounds it by the entry size.
#[derive(Debug, Default)]
pub struct CopyDecoder;

impl CopyDecoder {
    /// Creates a new copy decoder.
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for CopyDecoder {
    fn decode(&mut self, input: &[u8], out: &mut [u8]) -> io::Result<DecodeStatus> {
        let n = input.len().min(out.len());
        out[..n].copy_from_slice(&input[..n]);
        Ok(DecodeStatus {
            consumed: n,
            produced: n,
            finished: false,
        })
    }

    fn requires_end_marker(&self) -> bool {
        false
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Stored
    }
}
