//! Compression codecs for ZIP entries.
//!
//! Codecs are incremental state machines that take input slices per call,
//! so the sequential reader and writer can drive them without owning the
//! transport. [`compress`] and [`decompress`] wrap them for one-shot use.
//!
//! | Method | Module | Feature |
//! |---|---|---|
//! | Stored (0) | `copy` | always |
//! | Deflated (8) | [`deflate`] | always |
//! | BZip2 (12) | [`bzip2`] | `bzip2` |

#[cfg(feature = "bzip2")]
pub mod bzip2;
mod copy;
pub mod deflate;

use std::io;

use crate::entry::CompressionMethod;
use crate::{Error, Result};

pub use copy::{CopyDecoder, CopyEncoder};
pub use deflate::{DeflateDecoder, DeflateEncoder};

#[cfg(feature = "bzip2")]
pub use self::bzip2::{Bzip2Decoder, Bzip2Encoder};

/// Outcome of one [`Decoder::decode`] step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStatus {
    /// Input bytes consumed.
    pub consumed: usize,
    /// Output bytes produced.
    pub produced: usize,
    /// The end-of-stream marker was reached.
    pub finished: bool,
}

/// An incremental compressor.
pub trait Encoder: Send {
    /// Compresses `input`, appending any available output to `out`.
    fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) -> io::Result<()>;

    /// Flushes the remaining output and the end-of-stream marker.
    fn finish(&mut self, out: &mut Vec<u8>) -> io::Result<()>;

    /// The method this encoder produces.
    fn method(&self) -> CompressionMethod;
}

/// An incremental decompressor.
pub trait Decoder: Send {
    /// Decompresses from `input` into `out`.
    fn decode(&mut self, input: &[u8], out: &mut [u8]) -> io::Result<DecodeStatus>;

    /// Returns `true` if the compressed stream carries its own end marker,
    /// so running out of input before it is an error.
    fn requires_end_marker(&self) -> bool;

    /// The method this decoder reads.
    fn method(&self) -> CompressionMethod;
}

/// Builds an encoder for `method` at `level` (`0..=9`).
///
/// # Errors
///
/// Returns [`Error::UnsupportedMethod`] for methods this build cannot write.
pub fn build_encoder(method: CompressionMethod, level: u32) -> Result<Box<dyn Encoder>> {
    match method {
        CompressionMethod::Stored => Ok(Box::new(CopyEncoder::new())),
        CompressionMethod::Deflated => Ok(Box::new(DeflateEncoder::new(level))),
        #[cfg(feature = "bzip2")]
        CompressionMethod::BZip2 => Ok(Box::new(Bzip2Encoder::new(level))),
        other => Err(Error::UnsupportedMethod {
            method: other.as_u16(),
        }),
    }
}

/// Builds a decoder for `method`.
///
/// # Errors
///
/// Returns [`Error::UnsupportedMethod`] for methods this build cannot read.
pub fn build_decoder(method: CompressionMethod) -> Result<Box<dyn Decoder>> {
    match method {
        CompressionMethod::Stored => Ok(Box::new(CopyDecoder::new())),
        CompressionMethod::Deflated => Ok(Box::new(DeflateDecoder::new())),
        #[cfg(feature = "bzip2")]
        CompressionMethod::BZip2 => Ok(Box::new(Bzip2Decoder::new())),
        other => Err(Error::UnsupportedMethod {
            method: other.as_u16(),
        }),
    }
}

/// Compresses a whole buffer.
pub fn compress(method: CompressionMethod, level: u32, data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = build_encoder(method, level)?;
    let mut out = Vec::with_capacity(data.len() / 2 + 64);
    encoder.encode(data, &mut out)?;
    encoder.finish(&mut out)?;
    Ok(out)
}

/// Decompresses a whole buffer. `size_hint` preallocates the output.
///
/// # Errors
///
/// Returns [`Error::MalformedArchive`] if a stream that needs an end
/// marker is truncated.
pub fn decompress(method: CompressionMethod, data: &[u8], size_hint: usize) -> Result<Vec<u8>> {
    let mut decoder = build_decoder(method)?;
    let mut out = Vec::with_capacity(size_hint);
    let mut chunk = crate::pool::rent_buffer(crate::READ_BUFFER_SIZE);
    let mut input = data;
    loop {
        let status = decoder.decode(input, &mut chunk)?;
        out.extend_from_slice(&chunk[..status.produced]);
        input = &input[status.consumed..];
        if status.finished {
            break;
        }
        if status.consumed == 0 && status.produced == 0 {
            if decoder.requires_end_marker() {
                return Err(Error::MalformedArchive(format!(
                    "{} stream ended before its end marker",
                    decoder.method()
                )));
            }
            break;
        }
    }
    Ok(out)
}

/// Makes sure `out` has spare capacity for codecs that write into it.
pub(crate) fn reserve_output(out: &mut Vec<u8>, hint: usize) {
    const MIN_SPARE: usize = 4096;
    if out.capacity() - out.len() < MIN_SPARE {
        out.reserve(hint.max(MIN_SPARE));
    }
}
