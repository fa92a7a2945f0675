//! Archive writing API for ZIP archives.
//!
//! [`ZipWriter`] writes entries sequentially: a local header, the entry
//! data, optionally a data descriptor, and finally the central directory.
//!
//! On a seekable sink ([`ZipWriter::new`]) the CRC and sizes are patched
//! into the local header once the entry is closed. On a non-seekable sink
//! ([`ZipWriter::new_streaming`]) they follow the data in a descriptor.
//!
//! # Example
//!
//! ```rust
//! use std::io::{Cursor, Write};
//! use zipwright::{ZipEntry, ZipWriter};
//!
//! let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
//! writer.put_next_entry(ZipEntry::new("hello.txt")?)?;
//! writer.write_all(b"Hello, World!")?;
//! writer.finish()?;
//! let archive = writer.into_inner().unwrap().into_inner();
//! assert!(archive.starts_with(b"PK\x03\x04"));
//! # Ok::<(), zipwright::Error>(())
//! ```

mod encoder;
pub(crate) mod options;

pub use options::{DEFAULT_LEVEL, UseZip64, WriteOptions};

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::checksum::Crc32;
use crate::crypto::{EncryptionMethod, Password};
use crate::entry::{CompressionMethod, ZIP64_THRESHOLD, ZipEntry};
use crate::error::{map_io_error, to_io_error};
use crate::format::MAX_COMMENT_LENGTH;
use crate::format::eocd::write_end_records;
use crate::format::header::{
    CentralDirectoryHeader, DataDescriptor, LOCAL_CRC_OFFSET, LocalFileHeader, header_crc,
};
use crate::{Error, Result};

use encoder::EntryEncoder;

const CLOSED: &str = "the underlying stream has been closed";

/// State of the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    /// Accepting new entries.
    AcceptingEntries,
    /// Archive is finished.
    Finished,
    /// A fatal error occurred.
    Failed,
}

/// Rewrites `bytes` located `distance` bytes behind the current position,
/// then returns to it.
type Patcher<W> = fn(&mut W, u64, &[u8]) -> io::Result<()>;

fn patch_back<W: Write + Seek>(sink: &mut W, distance: u64, bytes: &[u8]) -> io::Result<()> {
    let distance = i64::try_from(distance).map_err(io::Error::other)?;
    sink.seek(SeekFrom::Current(-distance))?;
    sink.write_all(bytes)?;
    sink.seek(SeekFrom::Current(distance - bytes.len() as i64))?;
    Ok(())
}

/// A sink that tracks how many bytes went through it.
struct PositionWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> Write for PositionWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// The entry currently receiving data.
struct OpenEntry {
    entry: ZipEntry,
    header_zip64: bool,
    zip64_value_offset: Option<u64>,
    encoder: EntryEncoder,
}

/// A sequential ZIP archive writer.
///
/// Dropping a writer that was not finished writes the central directory,
/// but a failure at that point can only be logged. Call
/// [`finish`](Self::finish) or [`close`](Self::close) to see it.
pub struct ZipWriter<W: Write> {
    sink: Option<PositionWriter<W>>,
    patcher: Option<Patcher<W>>,
    options: WriteOptions,
    level: u32,
    saved_level: Option<u32>,
    entries: Vec<ZipEntry>,
    current: Option<OpenEntry>,
    state: WriterState,
}

impl<W: Write + Seek> ZipWriter<W> {
    /// Creates a writer over a seekable sink. Local headers are patched
    /// with the final CRC and sizes.
    pub fn new(sink: W) -> Self {
        Self::build(sink, Some(patch_back::<W>))
    }
}

impl<W: Write> ZipWriter<W> {
    /// Creates a writer over a sink that cannot seek. Entries whose size or
    /// CRC is unknown up front are followed by a data descriptor.
    pub fn new_streaming(sink: W) -> Self {
        Self::build(sink, None)
    }

    fn build(sink: W, patcher: Option<Patcher<W>>) -> Self {
        let options = WriteOptions::default();
        Self {
            sink: Some(PositionWriter {
                inner: sink,
                position: 0,
            }),
            patcher,
            level: options.level,
            options,
            saved_level: None,
            entries: Vec::new(),
            current: None,
            state: WriterState::AcceptingEntries,
        }
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.level = options.level;
        self.saved_level = None;
        self.options = options;
        self
    }

    /// The options in effect.
    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    /// Sets the compression level for subsequent entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCompressionLevel`] above 9.
    pub fn set_level(&mut self, level: u32) -> Result<()> {
        if level > 9 {
            return Err(Error::InvalidCompressionLevel { level });
        }
        self.level = level;
        self.saved_level = None;
        Ok(())
    }

    /// The compression level in effect. Reads `0` while a stored entry that
    /// was promoted to deflate is open.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Sets the archive comment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommentTooLong`] if the comment encodes to more than
    /// 65535 bytes.
    pub fn set_comment(&mut self, comment: &str) -> Result<()> {
        let length = self.options.string_codec.encode(comment, false).len();
        if length > MAX_COMMENT_LENGTH {
            return Err(Error::CommentTooLong { length });
        }
        self.options.comment = Some(comment.to_string());
        Ok(())
    }

    /// Sets the password for subsequent entries. `None` or an empty
    /// password disables encryption.
    pub fn set_password(&mut self, password: Option<Password>) {
        self.options.password = password.filter(|p| !p.is_empty());
    }

    /// Selects the encryption used when a password is set.
    pub fn set_encryption(&mut self, method: EncryptionMethod) {
        self.options.encryption = method;
    }

    /// Sets the Zip64 policy for subsequent entries.
    pub fn set_use_zip64(&mut self, mode: UseZip64) {
        self.options.use_zip64 = mode;
    }

    /// Sets whether the writer owns the underlying stream.
    pub fn set_stream_owner(&mut self, owner: bool) {
        self.options.stream_owner = owner;
    }

    /// Returns `true` if the writer owns the underlying stream.
    pub fn is_stream_owner(&self) -> bool {
        self.options.stream_owner
    }

    /// Returns `true` once [`finish`](Self::finish) has succeeded.
    pub fn is_finished(&self) -> bool {
        self.state == WriterState::Finished
    }

    /// Entries closed so far, with their final sizes and offsets.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// The entry currently open, as it will be written.
    pub fn current_entry(&self) -> Option<&ZipEntry> {
        self.current.as_ref().map(|c| &c.entry)
    }

    fn ensure_accepting(&self) -> Result<()> {
        match self.state {
            WriterState::AcceptingEntries if self.sink.is_some() => Ok(()),
            WriterState::AcceptingEntries | WriterState::Failed => Err(Error::InvalidState(CLOSED)),
            WriterState::Finished => Err(Error::InvalidState("the archive is already finished")),
        }
    }

    /// Records a fatal error. An owned stream is dropped, which closes it.
    fn fail(&mut self, error: Error) -> Error {
        self.current = None;
        self.state = WriterState::Failed;
        if self.options.stream_owner {
            log::debug!("closing owned stream after error: {error}");
            self.sink = None;
        }
        error
    }

    fn sink(&mut self) -> Result<&mut PositionWriter<W>> {
        self.sink.as_mut().ok_or(Error::InvalidState(CLOSED))
    }

    /// Starts a new entry, closing the previous one.
    ///
    /// The writer takes the entry over and settles its method, flags and
    /// encryption:
    ///
    /// - directories are stored, empty and never encrypted,
    /// - a stored entry whose size or CRC is unknown on a non-seekable sink
    ///   is written as deflate level 0; the previous level returns with the
    ///   next entry,
    /// - with a password set, files are encrypted with the configured
    ///   method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] after [`finish`](Self::finish).
    pub fn put_next_entry(&mut self, mut entry: ZipEntry) -> Result<()> {
        self.ensure_accepting()?;
        if self.current.is_some() {
            self.close_entry()?;
        }
        if let Some(level) = self.saved_level.take() {
            self.level = level;
        }

        entry.clear_stored_version();
        entry.set_descriptor(false);
        let codec = &self.options.string_codec;
        if !entry.is_unicode_text()
            && (codec.requires_unicode(entry.name())
                || entry.comment().is_some_and(|c| codec.requires_unicode(c)))
        {
            entry.set_unicode_text(true);
        }
        let patchable = self.patcher.is_some();

        if entry.is_directory() {
            entry.set_compression_method(CompressionMethod::Stored);
            entry.set_size(0);
            entry.set_crc(0);
            entry.set_crypted(false);
            entry.set_aes_key_size(0)?;
        } else {
            self.apply_encryption(&mut entry)?;
            if entry.compression_method() == CompressionMethod::Stored
                && !patchable
                && (entry.size() < 0 || !entry.has_crc())
            {
                log::debug!(
                    "'{}': stored entry of unknown size on a non-seekable sink, using deflate level 0",
                    entry.name()
                );
                entry.set_compression_method(CompressionMethod::Deflated);
                self.saved_level = Some(self.level);
                self.level = 0;
            }
        }

        let known = entry.compression_method() == CompressionMethod::Stored
            && entry.size() >= 0
            && entry.has_crc();
        if known {
            entry.set_compressed_size(entry.size() + entry.encryption_overhead() as i64);
        } else {
            entry.set_compressed_size(-1);
        }
        let classic = entry.is_crypted() && entry.aes_key_size() == 0;
        let descriptor = if patchable {
            classic && !entry.has_crc()
        } else {
            !known
        };
        entry.set_descriptor(descriptor);

        let header_zip64 = match self.options.use_zip64 {
            UseZip64::On => true,
            UseZip64::Off => false,
            UseZip64::Dynamic => entry.size() < 0 || entry.local_header_requires_zip64(),
        };

        let position = self.sink()?.position;
        entry.set_offset(position);
        let header = LocalFileHeader::from_entry(&entry, &self.options.string_codec, header_zip64)?;
        let mut encoder = EntryEncoder::new(&entry, self.level, self.options.password.as_ref())?;

        let sink = self.sink()?;
        let written = header.write_to(sink).and_then(|()| encoder.start(sink));
        if let Err(e) = written {
            return Err(self.fail(e.into()));
        }
        log::debug!(
            "entry '{}': {} at offset {position}{}",
            entry.name(),
            entry.compression_method(),
            if descriptor { ", with descriptor" } else { "" }
        );

        self.current = Some(OpenEntry {
            entry,
            header_zip64,
            zip64_value_offset: header.zip64_value_offset(),
            encoder,
        });
        Ok(())
    }

    fn apply_encryption(&self, entry: &mut ZipEntry) -> Result<()> {
        let method = match &self.options.password {
            Some(password) if !password.is_empty() => self.options.encryption,
            _ => EncryptionMethod::None,
        };
        match method {
            EncryptionMethod::None => {
                entry.set_crypted(false);
                entry.set_aes_key_size(0)?;
            }
            #[cfg(any(test, feature = "legacy-crypto"))]
            EncryptionMethod::ZipCrypto => {
                entry.set_crypted(true);
                entry.set_aes_key_size(0)?;
            }
            EncryptionMethod::Aes128 | EncryptionMethod::Aes256 => {
                if !cfg!(feature = "aes") {
                    return Err(Error::UnsupportedFeature {
                        feature: "WinZip AES encryption (enable the `aes` feature)",
                    });
                }
                entry.set_crypted(true);
                entry.set_aes_key_size(method.aes_key_size())?;
            }
        }
        Ok(())
    }

    fn write_data(&mut self, buf: &[u8]) -> Result<()> {
        if self.state != WriterState::AcceptingEntries {
            self.ensure_accepting()?;
        }
        let Some(current) = self.current.as_mut() else {
            return Err(Error::InvalidState("no entry is open"));
        };
        if buf.is_empty() {
            return Ok(());
        }
        if current.entry.is_directory() {
            return Err(Error::InvalidState("directory entries carry no data"));
        }
        let Some(sink) = self.sink.as_mut() else {
            return Err(Error::InvalidState(CLOSED));
        };
        let result = current.encoder.write(buf, sink);
        let overflow = !current.header_zip64
            && (current.encoder.size() >= ZIP64_THRESHOLD
                || current.encoder.written() >= ZIP64_THRESHOLD);
        let too_large = overflow.then(|| Error::EntryTooLarge {
            name: current.entry.name().to_string(),
            size: current.encoder.size(),
        });

        if let Err(e) = result {
            return Err(self.fail(map_io_error(e)));
        }
        if let Some(e) = too_large {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Finishes the open entry: flushes the compressor, writes the
    /// descriptor and patches the local header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if no entry is open, and
    /// [`Error::CrcMismatch`] or [`Error::InvalidArgument`] if the data
    /// disagrees with a CRC or size set on the entry beforehand.
    pub fn close_entry(&mut self) -> Result<()> {
        self.ensure_accepting()?;
        let Some(current) = self.current.take() else {
            return Err(Error::InvalidState("no entry is open"));
        };
        match self.complete_entry(current) {
            Ok(entry) => {
                self.entries.push(entry);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn complete_entry(&mut self, current: OpenEntry) -> Result<ZipEntry> {
        let OpenEntry {
            mut entry,
            header_zip64,
            zip64_value_offset,
            mut encoder,
        } = current;
        let patcher = self.patcher;
        let sink = self.sink()?;
        let totals = encoder.finish(sink).map_err(map_io_error)?;

        if entry.size() >= 0 && entry.size() as u64 != totals.size {
            return Err(Error::InvalidArgument(format!(
                "entry '{}' declared {} bytes but {} were written",
                entry.name(),
                entry.size(),
                totals.size
            )));
        }
        if let Some(expected) = entry.crc() {
            if expected != totals.crc {
                return Err(Error::crc_mismatch(entry.name(), expected, totals.crc));
            }
        }
        if entry.compressed_size() >= 0 && entry.compressed_size() as u64 != totals.compressed_size {
            return Err(Error::InvalidArgument(format!(
                "entry '{}' expected {} compressed bytes but produced {}",
                entry.name(),
                entry.compressed_size(),
                totals.compressed_size
            )));
        }
        entry.set_size(totals.size as i64);
        entry.set_compressed_size(totals.compressed_size as i64);
        entry.set_crc(totals.crc);

        if !header_zip64
            && (totals.size >= ZIP64_THRESHOLD || totals.compressed_size >= ZIP64_THRESHOLD)
        {
            return Err(Error::EntryTooLarge {
                name: entry.name().to_string(),
                size: totals.size,
            });
        }

        if entry.has_descriptor() {
            DataDescriptor {
                crc: header_crc(&entry),
                compressed_size: totals.compressed_size,
                size: totals.size,
            }
            .write_to(sink, header_zip64)?;
        }

        if let Some(patch) = patcher {
            let header_start = entry.offset();
            let position = sink.position;
            let mut fields = Vec::with_capacity(12);
            fields.extend_from_slice(&header_crc(&entry).to_le_bytes());
            if header_zip64 {
                patch(&mut sink.inner, position - (header_start + LOCAL_CRC_OFFSET), &fields)?;
                if let Some(offset) = zip64_value_offset {
                    let mut sizes = Vec::with_capacity(16);
                    sizes.extend_from_slice(&totals.size.to_le_bytes());
                    sizes.extend_from_slice(&totals.compressed_size.to_le_bytes());
                    patch(&mut sink.inner, position - (header_start + offset), &sizes)?;
                }
            } else {
                fields.extend_from_slice(&(totals.compressed_size as u32).to_le_bytes());
                fields.extend_from_slice(&(totals.size as u32).to_le_bytes());
                patch(&mut sink.inner, position - (header_start + LOCAL_CRC_OFFSET), &fields)?;
            }
        }

        log::debug!(
            "closed entry '{}': {} -> {} bytes, crc {:08x}",
            entry.name(),
            totals.size,
            totals.compressed_size,
            totals.crc
        );
        Ok(entry)
    }

    /// Writes a whole entry in one call.
    ///
    /// The size and, for stored entries, the CRC are filled in from `data`,
    /// so stored entries need no descriptor even on a non-seekable sink.
    pub fn write_entry(&mut self, mut entry: ZipEntry, data: &[u8]) -> Result<()> {
        if entry.size() < 0 {
            entry.set_size(data.len() as i64);
        }
        if entry.compression_method() == CompressionMethod::Stored && !entry.has_crc() {
            entry.set_crc(Crc32::compute(data));
        }
        self.put_next_entry(entry)?;
        self.write_data(data)?;
        self.close_entry()
    }

    /// Adds a directory entry. A trailing `/` is appended if missing.
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        self.put_next_entry(ZipEntry::new(name)?)?;
        self.close_entry()
    }

    /// Copies an entry verbatim: `header` then `raw_len` bytes from `raw`
    /// (data and descriptor). The entry is recorded at the new offset.
    pub(crate) fn append_raw<R: Read>(
        &mut self,
        mut entry: ZipEntry,
        header: &[u8],
        raw: &mut R,
        raw_len: u64,
    ) -> Result<()> {
        self.ensure_accepting()?;
        if self.current.is_some() {
            self.close_entry()?;
        }
        let sink = self.sink()?;
        entry.set_offset(sink.position);
        let result = sink.write_all(header).and_then(|()| {
            let copied = io::copy(&mut raw.take(raw_len), sink)?;
            if copied == raw_len {
                Ok(())
            } else {
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("entry data ended after {copied} of {raw_len} bytes"),
                ))
            }
        });
        if let Err(e) = result {
            return Err(self.fail(map_io_error(e)));
        }
        log::trace!("copied entry '{}' ({raw_len} bytes)", entry.name());
        self.entries.push(entry);
        Ok(())
    }

    /// Closes the open entry and writes the central directory and end
    /// records. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the writer failed earlier.
    pub fn finish(&mut self) -> Result<()> {
        match self.state {
            WriterState::Finished => return Ok(()),
            WriterState::Failed => return Err(Error::InvalidState(CLOSED)),
            WriterState::AcceptingEntries => {}
        }
        if self.current.is_some() {
            self.close_entry()?;
        }
        if let Some(level) = self.saved_level.take() {
            self.level = level;
        }
        match self.write_central_directory() {
            Ok(()) => {
                self.state = WriterState::Finished;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn write_central_directory(&mut self) -> Result<()> {
        let codec = &self.options.string_codec;
        let sink = self.sink.as_mut().ok_or(Error::InvalidState(CLOSED))?;
        let start = sink.position;
        for entry in &self.entries {
            CentralDirectoryHeader::from_entry(entry, codec)?.write_to(sink)?;
        }
        let size = sink.position - start;
        let comment = self
            .options
            .comment
            .as_deref()
            .map(|c| codec.encode(c, false))
            .unwrap_or_default();
        write_end_records(
            sink,
            self.entries.len() as u64,
            size,
            start,
            &comment,
            self.options.use_zip64 == UseZip64::On,
        )?;
        sink.flush()?;
        log::debug!(
            "central directory: {} entries, {size} bytes at offset {start}",
            self.entries.len()
        );
        Ok(())
    }

    /// Finishes the archive and releases the stream: an owned stream is
    /// dropped and `None` returned, otherwise the stream is handed back.
    pub fn close(mut self) -> Result<Option<W>> {
        self.finish()?;
        let sink = self.sink.take().map(|s| s.inner);
        if self.options.stream_owner {
            drop(sink);
            Ok(None)
        } else {
            Ok(sink)
        }
    }

    /// Returns the underlying stream without finishing the archive.
    ///
    /// `None` if an owned stream was closed after a fatal error.
    pub fn into_inner(mut self) -> Option<W> {
        self.sink.take().map(|s| s.inner)
    }
}

impl<W: Write> Write for ZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf).map_err(to_io_error)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for ZipWriter<W> {
    fn drop(&mut self) {
        if self.state == WriterState::AcceptingEntries && self.sink.is_some() {
            if let Err(e) = self.finish() {
                log::warn!("failed to finish archive on drop: {e}");
            }
        }
    }
}

impl<W: Write> std::fmt::Debug for ZipWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipWriter")
            .field("state", &self.state)
            .field("seekable", &self.patcher.is_some())
            .field("level", &self.level)
            .field("entries", &self.entries.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
