//! Forward-only reading of ZIP streams.
//!
//! [`ZipReader`] walks local headers from the start of a stream without
//! seeking, so it works on pipes and network sockets. Entries whose sizes
//! follow the data in a descriptor are decoded until the compressed stream
//! ends, then the descriptor is read and checked.
//!
//! For random access use [`ZipArchive`](crate::ZipArchive), which reads the
//! central directory instead.
//!
//! # Example
//!
//! ```rust
//! use std::io::{Cursor, Read, Write};
//! use zipwright::{WriteOptions, ZipEntry, ZipReader, ZipWriter};
//!
//! let mut writer = ZipWriter::new_streaming(Vec::new())
//!     .with_options(WriteOptions::new().stream_owner(false));
//! writer.put_next_entry(ZipEntry::new("a.txt")?)?;
//! writer.write_all(b"streamed")?;
//! let bytes = writer.close()?.unwrap_or_default();
//!
//! let mut reader = ZipReader::new(Cursor::new(bytes));
//! while let Some(entry) = reader.next_entry()? {
//!     let mut text = String::new();
//!     reader.read_to_string(&mut text)?;
//!     assert_eq!((entry.name(), text.as_str()), ("a.txt", "streamed"));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub(crate) mod decoder;
pub(crate) mod options;

pub use options::ReadOptions;

use std::io::{self, BufReader, Read};

use crate::crypto::Password;
use crate::entry::ZipEntry;
use crate::error::to_io_error;
use crate::format::header::{DataDescriptor, LocalFileHeader};
use crate::pool::rent_buffer;
use crate::{Error, READ_BUFFER_SIZE, Result};

use decoder::EntryDecoder;

const CLOSED: &str = "the underlying stream has been closed";

struct CurrentEntry {
    entry: ZipEntry,
    header_zip64: bool,
    decoder: Option<EntryDecoder>,
    complete: bool,
}

/// Reads entries from a ZIP stream in order.
pub struct ZipReader<R: Read> {
    src: Option<BufReader<R>>,
    options: ReadOptions,
    current: Option<CurrentEntry>,
    entries_read: usize,
    exhausted: bool,
    failed: bool,
}

impl<R: Read> ZipReader<R> {
    /// Creates a reader with default options. The reader owns `src`.
    pub fn new(src: R) -> Self {
        Self::with_options(src, ReadOptions::new())
    }

    /// Creates a reader with the given options.
    pub fn with_options(src: R, options: ReadOptions) -> Self {
        Self {
            src: Some(BufReader::with_capacity(READ_BUFFER_SIZE, src)),
            options,
            current: None,
            entries_read: 0,
            exhausted: false,
            failed: false,
        }
    }

    /// Sets the password for encrypted entries. Takes effect from the next
    /// entry whose data has not been touched yet.
    pub fn set_password(&mut self, password: Option<Password>) {
        self.options.password = password.filter(|p| !p.is_empty());
    }

    /// Sets whether the reader owns the underlying stream.
    pub fn set_stream_owner(&mut self, owner: bool) {
        self.options.stream_owner = owner;
    }

    /// Returns `true` if the reader owns the underlying stream.
    pub fn is_stream_owner(&self) -> bool {
        self.options.stream_owner
    }

    /// The entry whose data is being read, if any.
    pub fn current_entry(&self) -> Option<&ZipEntry> {
        self.current.as_ref().map(|c| &c.entry)
    }

    /// Number of entries returned by [`next_entry`](Self::next_entry).
    pub fn entries_read(&self) -> usize {
        self.entries_read
    }

    /// Returns `true` while the current entry still has data to read.
    pub fn available(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| !c.complete && !c.entry.is_directory() && c.entry.size() != 0)
    }

    fn fail(&mut self, error: Error) -> Error {
        self.current = None;
        self.failed = true;
        if self.options.stream_owner {
            log::debug!("closing owned stream after error: {error}");
            self.src = None;
        }
        error
    }

    /// Advances to the next entry, skipping whatever is left of the current
    /// one. Returns `None` once the central directory is reached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedArchive`] for a bad signature or truncated
    /// header, and any error raised while skipping the previous entry.
    pub fn next_entry(&mut self) -> Result<Option<ZipEntry>> {
        if self.failed && self.src.is_none() {
            return Err(Error::InvalidState(CLOSED));
        }
        if self.exhausted {
            return Ok(None);
        }
        self.close_entry()?;

        let header = {
            let Some(src) = self.src.as_mut() else {
                return Err(Error::InvalidState(CLOSED));
            };
            LocalFileHeader::read_from(src)
        };
        let header = match header {
            Ok(Some(header)) => header,
            Ok(None) => {
                log::debug!("end of entries after {} local headers", self.entries_read);
                self.exhausted = true;
                return Ok(None);
            }
            Err(e) => return Err(self.fail(e)),
        };

        let header_zip64 = header.has_zip64();
        let entry = match header.into_entry(&self.options.string_codec) {
            Ok(entry) => entry,
            Err(e) => return Err(self.fail(e)),
        };
        log::trace!(
            "entry '{}': method {}, size {}, descriptor {}",
            entry.name(),
            entry.compression_method(),
            entry.size(),
            entry.has_descriptor()
        );
        self.entries_read += 1;
        self.current = Some(CurrentEntry {
            entry: entry.clone(),
            header_zip64,
            decoder: None,
            complete: entry.is_directory() && !entry.has_descriptor() && entry.compressed_size() <= 0,
        });
        Ok(Some(entry))
    }

    /// Skips the rest of the current entry.
    ///
    /// Encrypted entries can be skipped without a password when their
    /// compressed size is known; otherwise the data is decoded and checked.
    pub fn close_entry(&mut self) -> Result<()> {
        let Some(current) = self.current.as_ref() else {
            return Ok(());
        };
        if current.complete {
            self.current = None;
            return Ok(());
        }

        let raw_skip = current.decoder.is_none()
            && current.entry.compressed_size() >= 0
            && ((current.entry.is_crypted() && self.options.password.is_none())
                || current.entry.unsupported_feature().is_some());
        let result = if raw_skip {
            self.skip_raw()
        } else {
            let mut scratch = rent_buffer(READ_BUFFER_SIZE);
            loop {
                match self.read_data(&mut scratch) {
                    Ok(0) => break Ok(()),
                    Ok(_) => {}
                    Err(e) => break Err(e),
                }
            }
        };
        self.current = None;
        result
    }

    fn skip_raw(&mut self) -> Result<()> {
        let Some(current) = self.current.as_ref() else {
            return Ok(());
        };
        let length = current.entry.compressed_size() as u64;
        let descriptor = current.entry.has_descriptor().then_some(current.header_zip64);
        log::debug!("skipping {length} encrypted bytes of '{}'", current.entry.name());

        let skipped = {
            let Some(src) = self.src.as_mut() else {
                return Err(Error::InvalidState(CLOSED));
            };
            io::copy(&mut src.by_ref().take(length), &mut io::sink()).and_then(|copied| {
                if copied < length {
                    Err(io::ErrorKind::UnexpectedEof.into())
                } else {
                    Ok(())
                }
            })
        };
        if let Err(e) = skipped.map_err(crate::format::truncated("entry data")) {
            return Err(self.fail(e));
        }
        if let Some(zip64) = descriptor {
            let read = match self.src.as_mut() {
                Some(src) => DataDescriptor::read_from(src, zip64).map(|_| ()),
                None => Err(Error::InvalidState(CLOSED)),
            };
            read.map_err(|e| self.fail(e))?;
        }
        Ok(())
    }

    fn read_data(&mut self, out: &mut [u8]) -> Result<usize> {
        let Some(src) = self.src.as_mut() else {
            return Err(Error::InvalidState(CLOSED));
        };
        let Some(current) = self.current.as_mut() else {
            return Ok(0);
        };
        if current.complete {
            return Ok(0);
        }

        if current.decoder.is_none() {
            let deferred = current.entry.has_descriptor()
                && (!current.entry.has_crc() || current.entry.size() < 0);
            match EntryDecoder::new(&current.entry, self.options.password.as_ref(), src, deferred) {
                Ok(decoder) => current.decoder = Some(decoder),
                // Nothing was consumed; the entry can still be skipped.
                Err(e @ Error::PasswordRequired { .. }) => return Err(e),
                Err(e @ Error::UnsupportedFeature { .. })
                    if current.entry.unsupported_feature().is_some() =>
                {
                    return Err(e);
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
        let Some(decoder) = current.decoder.as_mut() else {
            return Ok(0);
        };

        let n = match decoder.read(src, out) {
            Ok(n) => n,
            Err(e) => return Err(self.fail(e)),
        };
        if n > 0 || !decoder.is_done() {
            return Ok(n);
        }

        if current.entry.has_descriptor() {
            let checked = DataDescriptor::read_from(src, current.header_zip64).and_then(|descriptor| {
                if descriptor.compressed_size != decoder.compressed() {
                    return Err(Error::MalformedArchive(format!(
                        "data descriptor of '{}' records {} compressed bytes, read {}",
                        current.entry.name(),
                        descriptor.compressed_size,
                        decoder.compressed()
                    )));
                }
                decoder.verify(descriptor.crc, descriptor.size)
            });
            if let Err(e) = checked {
                return Err(self.fail(e));
            }
        }
        log::trace!("finished '{}' ({} bytes)", current.entry.name(), decoder.produced());
        current.complete = true;
        Ok(0)
    }

    /// Returns the underlying stream.
    ///
    /// `None` if an owned stream was released after a fatal error. Bytes
    /// already buffered by the reader are lost.
    pub fn into_inner(self) -> Option<R> {
        self.src.map(BufReader::into_inner)
    }
}

impl<R: Read> Read for ZipReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_data(buf).map_err(to_io_error)
    }
}

impl<R: Read> std::fmt::Debug for ZipReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipReader")
            .field("entries_read", &self.entries_read)
            .field("current", &self.current_entry().map(ZipEntry::name))
            .field("exhausted", &self.exhausted)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}
