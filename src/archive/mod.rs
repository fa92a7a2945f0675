//! Random access to ZIP archives through the central directory.
//!
//! [`ZipArchive`] locates the end of central directory record, follows the
//! Zip64 locator when present and indexes every entry. Entry data is read
//! by seeking to the local header, which is checked against the central
//! record before any data is decoded.
//!
//! # Example
//!
//! ```rust
//! use std::io::{Cursor, Write};
//! use zipwright::{WriteOptions, ZipArchive, ZipEntry, ZipWriter};
//!
//! let mut writer = ZipWriter::new(Cursor::new(Vec::new()))
//!     .with_options(WriteOptions::new().stream_owner(false));
//! writer.write_entry(ZipEntry::new("notes.txt")?, b"remember the milk")?;
//! let bytes = writer.close()?.map(Cursor::into_inner).unwrap_or_default();
//!
//! let mut archive = ZipArchive::open(Cursor::new(bytes))?;
//! let index = archive.find_entry("NOTES.TXT", true).unwrap();
//! assert_eq!(archive.read_entry(index)?, b"remember the milk");
//! # Ok::<(), zipwright::Error>(())
//! ```

mod reader;
mod verify;

pub use reader::EntryReader;
pub use verify::TestResult;

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::crypto::Password;
use crate::encoding::StringCodec;
use crate::entry::{ZipEntry, flags};
use crate::format::eocd::read_directory_info;
use crate::format::header::{CentralDirectoryHeader, LocalFileHeader, header_crc};
use crate::format::{CENTRAL_HEADER_SIZE, DESCRIPTOR_SIGNATURE, ZIP64_PLACEHOLDER_U32, truncated};
use crate::{Error, READ_BUFFER_SIZE, Result};

use byteorder::{LittleEndian, ReadBytesExt};

/// Options for opening an archive.
#[derive(Clone, Default)]
pub struct ArchiveOptions {
    /// Password for encrypted entries.
    pub password: Option<Password>,
    /// Encoding used for names without the UTF-8 flag.
    pub string_codec: StringCodec,
}

impl std::fmt::Debug for ArchiveOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveOptions")
            .field("has_password", &self.password.is_some())
            .field("string_codec", &self.string_codec)
            .finish()
    }
}

impl ArchiveOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the password. An empty password counts as none.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    /// Sets the name and comment encoding.
    pub fn string_codec(mut self, codec: StringCodec) -> Self {
        self.string_codec = codec;
        self
    }
}

/// Lifecycle of a [`ZipArchive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    /// The central directory has been read.
    Indexed,
    /// An [`EntryReader`] is open.
    Reading,
    /// An [`ArchiveEditor`](crate::edit::ArchiveEditor) holds the archive.
    Updating,
    /// Changes were committed and the archive re-indexed.
    Committed,
    /// The archive was closed; only metadata remains available.
    Closed,
}

/// Where an entry's local record sits in the archive.
#[derive(Debug, Clone)]
pub(crate) struct LocalRecord {
    pub header: LocalFileHeader,
    /// Absolute position of the local header.
    pub header_offset: u64,
    /// Absolute position of the entry data.
    pub data_offset: u64,
}

/// A ZIP archive opened for random access.
pub struct ZipArchive<R> {
    reader: Option<R>,
    entries: Vec<ZipEntry>,
    comment: String,
    zip64: bool,
    base: u64,
    options: ArchiveOptions,
    state: ArchiveState,
    path: Option<PathBuf>,
}

impl ZipArchive<BufReader<File>> {
    /// Opens the archive at `path`.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_path_with_options(path, ArchiveOptions::default())
    }

    /// Opens the archive at `path` with options.
    pub fn open_path_with_options(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut archive = Self::open_with_options(BufReader::new(file), options)?;
        archive.path = Some(path.to_path_buf());
        Ok(archive)
    }

    /// The path the archive was opened from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Opens an archive from a seekable reader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedArchive`] if no end of central directory
    /// record is found or the directory is inconsistent.
    pub fn open(reader: R) -> Result<Self> {
        Self::open_with_options(reader, ArchiveOptions::default())
    }

    /// Opens an archive with options.
    pub fn open_with_options(mut reader: R, options: ArchiveOptions) -> Result<Self> {
        let info = read_directory_info(&mut reader)?;
        reader.seek(SeekFrom::Start(info.start()))?;

        let capacity = info.entries.min(info.size / CENTRAL_HEADER_SIZE) as usize;
        let mut entries = Vec::with_capacity(capacity);
        {
            let mut directory = BufReader::with_capacity(READ_BUFFER_SIZE, (&mut reader).take(info.size));
            for _ in 0..info.entries {
                let header = CentralDirectoryHeader::read_from(&mut directory)?;
                entries.push(header.into_entry(&options.string_codec)?);
            }
        }
        let comment = options.string_codec.decode(&info.comment, 0);
        log::debug!(
            "opened archive: {} entries, zip64 {}, base offset {}",
            entries.len(),
            info.zip64,
            info.base
        );

        Ok(Self {
            reader: Some(reader),
            entries,
            comment,
            zip64: info.zip64,
            base: info.base,
            options,
            state: ArchiveState::Indexed,
            path: None,
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in central directory order.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// The entry at `index`.
    pub fn entry(&self, index: usize) -> Option<&ZipEntry> {
        self.entries.get(index)
    }

    /// The archive comment, empty if there is none.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Returns `true` if the archive has Zip64 end records.
    pub fn is_zip64(&self) -> bool {
        self.zip64
    }

    /// Bytes found before the archive, such as a self-extractor stub.
    pub fn base_offset(&self) -> u64 {
        self.base
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ArchiveState {
        self.state
    }

    /// Options the archive was opened with.
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Sets the password used for encrypted entries.
    pub fn set_password(&mut self, password: impl Into<Password>) {
        let password = password.into();
        self.options.password = (!password.is_empty()).then_some(password);
    }

    /// Finds an entry by name. With duplicates the last one wins.
    pub fn find_entry(&self, name: &str, ignore_case: bool) -> Option<usize> {
        if ignore_case {
            let wanted = name.to_lowercase();
            self.entries
                .iter()
                .rposition(|e| e.name().to_lowercase() == wanted)
        } else {
            self.entries.iter().rposition(|e| e.name() == name)
        }
    }

    /// Looks up an entry by exact name.
    pub fn entry_by_name(&self, name: &str) -> Option<&ZipEntry> {
        self.find_entry(name, false).map(|i| &self.entries[i])
    }

    /// Closes the archive and releases the reader. Metadata stays readable.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            log::debug!("archive closed");
        }
        self.state = ArchiveState::Closed;
    }

    /// Returns the underlying reader, `None` after [`close`](Self::close).
    pub fn into_inner(self) -> Option<R> {
        self.reader
    }

    pub(crate) fn ensure_readable(&self) -> Result<()> {
        match self.state {
            ArchiveState::Indexed | ArchiveState::Committed if self.reader.is_some() => Ok(()),
            ArchiveState::Reading => Err(Error::InvalidState("an entry reader is still open")),
            ArchiveState::Updating => Err(Error::InvalidState("the archive is being updated")),
            _ => Err(Error::InvalidState("the archive is closed")),
        }
    }

    pub(crate) fn reader_mut(&mut self) -> Result<&mut R> {
        self.reader
            .as_mut()
            .ok_or(Error::InvalidState("the archive is closed"))
    }

    pub(crate) fn set_state(&mut self, state: ArchiveState) {
        self.state = state;
    }

    fn entry_at(&self, index: usize) -> Result<&ZipEntry> {
        self.entries.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "entry index {index} out of range for {} entries",
                self.entries.len()
            ))
        })
    }

    /// Seeks to the local header of entry `index`, reads it and checks it
    /// against the central record. Leaves the reader at the entry data.
    pub(crate) fn locate(&mut self, index: usize) -> Result<LocalRecord> {
        let entry = self.entry_at(index)?.clone();
        let header_offset = self.base.checked_add(entry.offset()).ok_or_else(|| {
            Error::MalformedArchive(format!("offset of '{}' overflows", entry.name()))
        })?;
        let codec = self.options.string_codec;
        let reader = self.reader_mut()?;
        reader.seek(SeekFrom::Start(header_offset))?;
        let header = LocalFileHeader::read_from(reader)?.ok_or_else(|| {
            Error::corrupt_header(header_offset, format!("no local header for '{}'", entry.name()))
        })?;

        let mismatch = |what: &str| {
            Error::corrupt_header(
                header_offset,
                format!("{what} of '{}' differs from the central directory", entry.name()),
            )
        };
        if header.method != entry.header_method() {
            return Err(mismatch("compression method"));
        }
        if (header.flags ^ entry.flags()) & flags::ENCRYPTED != 0 {
            return Err(mismatch("encryption flag"));
        }
        if codec.decode(&header.name, header.flags) != entry.name() {
            return Err(mismatch("name"));
        }
        if header.flags & flags::DESCRIPTOR == 0 {
            if header.crc != header_crc(&entry) {
                return Err(mismatch("CRC"));
            }
            if header.compressed_size != ZIP64_PLACEHOLDER_U32
                && i64::from(header.compressed_size) != entry.compressed_size()
            {
                return Err(mismatch("compressed size"));
            }
        }

        let data_offset = header_offset + header.len();
        log::trace!("entry '{}' data at offset {data_offset}", entry.name());
        Ok(LocalRecord {
            header,
            header_offset,
            data_offset,
        })
    }

    /// Length of the data descriptor following entry `index`, signature
    /// included. Leaves the reader after the descriptor.
    pub(crate) fn descriptor_len(&mut self, index: usize, record: &LocalRecord) -> Result<u64> {
        let entry = self.entry_at(index)?;
        if !entry.has_descriptor() {
            return Ok(0);
        }
        let data_end = record.data_offset + entry.compressed_size().max(0) as u64;
        let fields = if record.header.has_zip64() { 20 } else { 12 };
        let reader = self.reader_mut()?;
        reader.seek(SeekFrom::Start(data_end))?;
        let first = reader
            .read_u32::<LittleEndian>()
            .map_err(truncated("data descriptor"))?;
        Ok(if first == DESCRIPTOR_SIGNATURE { fields + 4 } else { fields })
    }
}

impl<R> std::fmt::Debug for ZipArchive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipArchive")
            .field("entries", &self.entries.len())
            .field("zip64", &self.zip64)
            .field("base", &self.base)
            .field("state", &self.state)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
