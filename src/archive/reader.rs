//! Reading entry data out of an indexed archive.

use std::io::{self, BufReader, Read, Seek, Take, Write};

use crate::error::{map_io_error, to_io_error};
use crate::read::decoder::EntryDecoder;
use crate::{READ_BUFFER_SIZE, Result};

use super::{ArchiveState, ZipArchive};

/// Streams the decoded data of one entry.
///
/// Created by [`ZipArchive::entry_reader`]. Integrity errors (CRC,
/// authentication code) are reported by the read that reaches the end of
/// the data. The archive returns to its previous state when the reader is
/// dropped.
pub struct EntryReader<'a, R: Read> {
    src: BufReader<Take<&'a mut R>>,
    decoder: EntryDecoder,
    state: &'a mut ArchiveState,
    previous: ArchiveState,
    size: u64,
}

impl<R: Read> EntryReader<'_, R> {
    /// Uncompressed size recorded in the central directory.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns `true` once all data was read and verified.
    pub fn is_finished(&self) -> bool {
        self.decoder.is_done()
    }
}

impl<R: Read> Read for EntryReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(&mut self.src, buf).map_err(to_io_error)
    }
}

impl<R: Read> Drop for EntryReader<'_, R> {
    fn drop(&mut self) {
        *self.state = self.previous;
    }
}

impl<R: Read> std::fmt::Debug for EntryReader<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader")
            .field("size", &self.size)
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Opens the data of entry `index` for reading.
    ///
    /// # Errors
    ///
    /// - [`Error::CorruptHeader`](crate::Error::CorruptHeader) if the local
    ///   header disagrees with the central directory,
    /// - [`Error::PasswordRequired`](crate::Error::PasswordRequired) or
    ///   [`Error::InvalidPassword`](crate::Error::InvalidPassword) for
    ///   encrypted entries,
    /// - [`Error::UnsupportedMethod`](crate::Error::UnsupportedMethod) for
    ///   methods this build cannot decode,
    /// - [`Error::UnsupportedFeature`](crate::Error::UnsupportedFeature) for
    ///   entries whose headers name an unsupported feature, such as AES-192.
    pub fn entry_reader(&mut self, index: usize) -> Result<EntryReader<'_, R>> {
        self.ensure_readable()?;
        self.locate(index)?;

        let previous = self.state;
        let Self {
            reader,
            entries,
            options,
            state,
            ..
        } = self;
        let entry = &entries[index];
        let Some(reader) = reader.as_mut() else {
            return Err(crate::Error::InvalidState("the archive is closed"));
        };
        let compressed = entry.compressed_size().max(0) as u64;
        let mut src = BufReader::with_capacity(READ_BUFFER_SIZE, reader.take(compressed));
        let decoder = EntryDecoder::new(entry, options.password.as_ref(), &mut src, false)?;
        log::debug!("reading entry '{}' ({compressed} bytes)", entry.name());

        *state = ArchiveState::Reading;
        Ok(EntryReader {
            src,
            decoder,
            state,
            previous,
            size: entry.size().max(0) as u64,
        })
    }

    /// Reads and verifies the whole entry.
    pub fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        let mut reader = self.entry_reader(index)?;
        let mut data = Vec::with_capacity(reader.size().min(1 << 24) as usize);
        reader.read_to_end(&mut data).map_err(map_io_error)?;
        Ok(data)
    }

    /// Decodes entry `index` into `out`, returning the number of bytes
    /// written.
    pub fn extract_entry<W: Write + ?Sized>(&mut self, index: usize, out: &mut W) -> Result<u64> {
        let mut reader = self.entry_reader(index)?;
        io::copy(&mut reader, out).map_err(map_io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ZipEntry;
    use crate::write::{WriteOptions, ZipWriter};
    use crate::Error;
    use std::io::Cursor;

    fn archive_with(data: &[u8]) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut writer =
            ZipWriter::new(Cursor::new(Vec::new())).with_options(WriteOptions::new().stream_owner(false));
        writer.write_entry(ZipEntry::new("data.bin").unwrap(), data).unwrap();
        let bytes = writer.close().unwrap().unwrap().into_inner();
        ZipArchive::open(Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn test_state_while_reading() {
        let mut archive = archive_with(b"some bytes");
        {
            let mut reader = archive.entry_reader(0).unwrap();
            let mut first = [0u8; 4];
            reader.read_exact(&mut first).unwrap();
            assert_eq!(&first, b"some");
        }
        assert_eq!(archive.state(), ArchiveState::Indexed);
    }

    #[test]
    fn test_extract_counts_bytes() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let mut archive = archive_with(&data);
        let mut out = Vec::new();
        assert_eq!(archive.extract_entry(0, &mut out).unwrap(), data.len() as u64);
        assert_eq!(out, data);
    }

    #[test]
    fn test_reader_finishes_with_verification() {
        let mut archive = archive_with(b"abc");
        let mut reader = archive.entry_reader(0).unwrap();
        assert_eq!(reader.size(), 3);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(reader.is_finished());
    }

    #[test]
    fn test_corrupted_data_is_detected() {
        let mut writer =
            ZipWriter::new(Cursor::new(Vec::new())).with_options(WriteOptions::new().stream_owner(false));
        let mut entry = ZipEntry::new("s").unwrap();
        entry.set_compression_method(crate::entry::CompressionMethod::Stored);
        writer.write_entry(entry, b"payload").unwrap();
        let mut bytes = writer.close().unwrap().unwrap().into_inner();
        bytes[31] ^= 0x20;
        let mut archive = ZipArchive::open(Cursor::new(bytes)).unwrap();
        assert!(matches!(archive.read_entry(0), Err(Error::CrcMismatch { .. })));
    }
}
