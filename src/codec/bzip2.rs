//! BZip2 codec implementation.

use std::io;

use bzip2::{Action, Compress, Compression, Decompress, Status};

use super::{DecodeStatus, Decoder, Encoder, reserve_output};
use crate::entry::CompressionMethod;

/// Work factor passed to libbzip2; 30 is the library default.
const WORK_FACTOR: u32 = 30;

/// BZip2 encoder.
pub struct Bzip2Encoder {
    inner: Compress,
}

impl std::fmt::Debug for Bzip2Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bzip2Encoder").finish_non_exhaustive()
    }
}

impl Bzip2Encoder {
    /// Creates a new BZip2 encoder. The level selects the block size and is
    /// clamped to `1..=9`.
    pub fn new(level: u32) -> Self {
        Self {
            inner: Compress::new(Compression::new(level.clamp(1, 9)), WORK_FACTOR),
        }
    }
}

impl Encoder for Bzip2Encoder {
    fn encode(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        while !input.is_empty() {
            reserve_output(out, input.len() / 2);
            let before = self.inner.total_in();
            self.inner
                .compress_vec(input, out, Action::Run)
                .map_err(io::Error::other)?;
            let consumed = (self.inner.total_in() - before) as usize;
            input = &input[consumed..];
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        loop {
            reserve_output(out, 0);
            let status = self
                .inner
                .compress_vec(&[], out, Action::Finish)
                .map_err(io::Error::other)?;
            if status == Status::StreamEnd {
                return Ok(());
            }
        }
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::BZip2
    }
}

/// BZip2 decoder.
pub struct Bzip2Decoder {
    inner: Decompress,
}

impl std::fmt::Debug for Bzip2Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bzip2Decoder").finish_non_exhaustive()
    }
}

impl Bzip2Decoder {
    /// Creates a new BZip2 decoder.
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(false),
        }
    }
}

impl Default for Bzip2Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for Bzip2Decoder {
    fn decode(&mut self, input: &[u8], out: &mut [u8]) -> io::Result<DecodeStatus> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();
        let status = self
            .inner
            .decompress(input, out)
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
        CompressionMethod::BZip2
    }
}
