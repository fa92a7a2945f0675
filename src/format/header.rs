//! Local file header, central directory header and data descriptor.
//!
//! Both headers are projections of one [`ZipEntry`]: `from_entry` builds
//! the on-disk record and `into_entry` turns a parsed record back into an
//! entry. They differ only where the format allows:
//!
//! - with the descriptor flag the local header carries zero CRC and sizes,
//! - a local header with a Zip64 block carries `0xFFFFFFFF` in both size
//!   fields and both values in the block,
//! - the central header promotes each field on its own, in the order size,
//!   compressed size, local header offset.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{
    CENTRAL_HEADER_SIGNATURE, CENTRAL_HEADER_SIZE, DESCRIPTOR_SIGNATURE, EOCD_SIGNATURE,
    LOCAL_HEADER_SIGNATURE, LOCAL_HEADER_SIZE, MAX_COMMENT_LENGTH, VERSION_ZIP64,
    ZIP64_EOCD_SIGNATURE, ZIP64_PLACEHOLDER_U32, narrow_u32, truncated,
};
use crate::encoding::StringCodec;
use crate::entry::{DOS_DIRECTORY_ATTRIBUTE, ZIP64_THRESHOLD, ZipEntry};
use crate::extra::{AES_TAG, ExtraData, MAX_EXTRA_LENGTH, ZIP64_TAG};
use crate::{Error, Result};

/// Offset of the CRC field in a local header.
pub(crate) const LOCAL_CRC_OFFSET: u64 = 14;

/// Extra field for a header: the entry's own blocks minus Zip64 and AES,
/// then a fresh Zip64 block holding `zip64_values`, then the AES block.
///
/// Returns the bytes and the offset of the Zip64 values inside them.
fn build_extra(entry: &ZipEntry, zip64_values: &[u64]) -> Result<(Vec<u8>, Option<usize>)> {
    let mut extra = ExtraData::from_bytes(entry.extra());
    extra.delete(ZIP64_TAG);
    extra.delete(AES_TAG);

    let mut zip64_offset = None;
    if !zip64_values.is_empty() {
        zip64_offset = Some(extra.len() + 4);
        extra.start_new_entry();
        for &value in zip64_values {
            extra.add_le_long(value as i64);
        }
        extra.add_new_entry(ZIP64_TAG)?;
    }

    if entry.aes_key_size() > 0 {
        extra.start_new_entry();
        extra.add_le_short(entry.aes_vendor_version());
        extra.add_data_slice(b"AE");
        extra.add_data(entry.aes_strength());
        extra.add_le_short(entry.compression_method().as_u16());
        extra.add_new_entry(AES_TAG)?;
    }
    Ok((extra.into_bytes(), zip64_offset))
}

/// CRC as written in headers. AE-2 entries store zero and rely on the
/// authentication code.
pub(crate) fn header_crc(entry: &ZipEntry) -> u32 {
    if entry.aes_key_size() > 0 && entry.aes_vendor_version() == 2 {
        0
    } else {
        entry.crc().unwrap_or(0)
    }
}

fn encode_name(entry: &ZipEntry, codec: &StringCodec) -> Result<Vec<u8>> {
    let name = codec.encode(entry.name(), entry.is_unicode_text());
    if name.len() > 0xFFFF {
        return Err(Error::NameTooLong {
            length: name.len(),
            max: 0xFFFF,
        });
    }
    Ok(name)
}

/// Reads a 4-byte signature, returning `None` at a clean end of stream.
fn read_signature<R: Read>(r: &mut R) -> Result<Option<u32>> {
    let mut sig = [0u8; 4];
    let mut filled = 0;
    while filled < sig.len() {
        match r.read(&mut sig[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(Error::MalformedArchive("truncated signature".into())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(u32::from_le_bytes(sig)))
}

fn read_bytes<R: Read>(r: &mut R, len: usize, record: &'static str) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(truncated(record))?;
    Ok(buf)
}

/// A local file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose flags.
    pub flags: u16,
    /// Method number (99 for AES).
    pub method: u16,
    /// Packed MS-DOS time.
    pub dos_time: u32,
    /// CRC-32, zero when deferred.
    pub crc: u32,
    /// Compressed size field.
    pub compressed_size: u32,
    /// Uncompressed size field.
    pub size: u32,
    /// Encoded name.
    pub name: Vec<u8>,
    /// Extra field.
    pub extra: Vec<u8>,
    zip64_offset: Option<usize>,
}

impl LocalFileHeader {
    /// Builds the local header for `entry`. With `zip64` the header carries
    /// a Zip64 block for the sizes.
    pub fn from_entry(entry: &ZipEntry, codec: &StringCodec, zip64: bool) -> Result<Self> {
        let name = encode_name(entry, codec)?;
        let deferred = entry.has_descriptor();
        let (extra, zip64_offset, size, compressed_size) = if zip64 {
            let values = if deferred {
                [0, 0]
            } else {
                [entry.size().max(0) as u64, entry.compressed_size().max(0) as u64]
            };
            let (extra, offset) = build_extra(entry, &values)?;
            (extra, offset, ZIP64_PLACEHOLDER_U32, ZIP64_PLACEHOLDER_U32)
        } else {
            let (extra, _) = build_extra(entry, &[])?;
            if deferred {
                (extra, None, 0, 0)
            } else {
                (
                    extra,
                    None,
                    entry.size().max(0) as u32,
                    entry.compressed_size().max(0) as u32,
                )
            }
        };
        let mut version_needed = entry.version_needed();
        if zip64 {
            version_needed = version_needed.max(VERSION_ZIP64);
        }
        Ok(Self {
            version_needed,
            flags: entry.flags(),
            method: entry.header_method(),
            dos_time: entry.dos_time(),
            crc: if deferred { 0 } else { header_crc(entry) },
            compressed_size,
            size,
            name,
            extra,
            zip64_offset,
        })
    }

    /// Serialised length.
    pub fn len(&self) -> u64 {
        LOCAL_HEADER_SIZE + self.name.len() as u64 + self.extra.len() as u64
    }

    /// Always `false`; a header has at least its fixed part.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` if the header carries a Zip64 block.
    pub fn has_zip64(&self) -> bool {
        self.zip64_offset.is_some()
            || ExtraData::from_bytes(&self.extra).blocks().any(|(tag, _)| tag == ZIP64_TAG)
    }

    /// Offset from the header start to the Zip64 size values, if written.
    pub fn zip64_value_offset(&self) -> Option<u64> {
        self.zip64_offset
            .map(|offset| LOCAL_HEADER_SIZE + self.name.len() as u64 + offset as u64)
    }

    /// Writes the header.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(LOCAL_HEADER_SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.version_needed)?;
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u16::<LittleEndian>(self.method)?;
        w.write_u32::<LittleEndian>(self.dos_time)?;
        w.write_u32::<LittleEndian>(self.crc)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.size)?;
        w.write_u16::<LittleEndian>(self.name.len() as u16)?;
        w.write_u16::<LittleEndian>(self.extra.len() as u16)?;
        w.write_all(&self.name)?;
        w.write_all(&self.extra)
    }

    /// Reads the next local header.
    ///
    /// Returns `None` at the end of the stream or when the central
    /// directory starts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedArchive`] for any other signature or a
    /// truncated header.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Option<Self>> {
        let signature = match read_signature(r)? {
            None => return Ok(None),
            Some(CENTRAL_HEADER_SIGNATURE | EOCD_SIGNATURE | ZIP64_EOCD_SIGNATURE) => {
                return Ok(None);
            }
            Some(sig) => sig,
        };
        if signature != LOCAL_HEADER_SIGNATURE {
            return Err(Error::MalformedArchive(format!(
                "bad local header signature {signature:#010x}"
            )));
        }
        let map = truncated("local header");
        let version_needed = r.read_u16::<LittleEndian>().map_err(&map)?;
        let flags = r.read_u16::<LittleEndian>().map_err(&map)?;
        let method = r.read_u16::<LittleEndian>().map_err(&map)?;
        let dos_time = r.read_u32::<LittleEndian>().map_err(&map)?;
        let crc = r.read_u32::<LittleEndian>().map_err(&map)?;
        let compressed_size = r.read_u32::<LittleEndian>().map_err(&map)?;
        let size = r.read_u32::<LittleEndian>().map_err(&map)?;
        let name_len = r.read_u16::<LittleEndian>().map_err(&map)?;
        let extra_len = r.read_u16::<LittleEndian>().map_err(&map)?;
        let name = read_bytes(r, usize::from(name_len), "local header name")?;
        let extra = read_bytes(r, usize::from(extra_len), "local header extra field")?;
        log::trace!(
            "local header: method {method}, flags {flags:#06x}, csize {compressed_size}, size {size}"
        );
        Ok(Some(Self {
            version_needed,
            flags,
            method,
            dos_time,
            crc,
            compressed_size,
            size,
            name,
            extra,
            zip64_offset: None,
        }))
    }

    /// Converts the header into an entry.
    ///
    /// With the descriptor flag and zero fields the CRC and sizes are
    /// unknown (`None` and `-1`).
    pub fn into_entry(self, codec: &StringCodec) -> Result<ZipEntry> {
        let name = codec.decode(&self.name, self.flags);
        let mut entry = ZipEntry::from_header(name, 0, self.version_needed, self.method);
        entry.set_flags(self.flags);
        entry.set_dos_time(self.dos_time);
        entry.set_size(i64::from(self.size));
        entry.set_compressed_size(i64::from(self.compressed_size));
        entry.set_extra(&self.extra)?;
        entry.process_extra_data(true)?;

        let deferred = entry.has_descriptor();
        if deferred && self.crc == 0 && entry.size() == 0 && entry.compressed_size() == 0 {
            entry.set_size(-1);
            entry.set_compressed_size(-1);
        } else {
            entry.set_crc(self.crc);
        }
        Ok(entry)
    }
}

/// A central directory header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    /// Version made by, host system in the high byte.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose flags.
    pub flags: u16,
    /// Method number (99 for AES).
    pub method: u16,
    /// Packed MS-DOS time.
    pub dos_time: u32,
    /// CRC-32.
    pub crc: u32,
    /// Compressed size field.
    pub compressed_size: u32,
    /// Uncompressed size field.
    pub size: u32,
    /// Disk number where the entry starts.
    pub disk_start: u16,
    /// Internal attributes.
    pub internal_attributes: u16,
    /// External attributes.
    pub external_attributes: u32,
    /// Local header offset field.
    pub offset: u32,
    /// Encoded name.
    pub name: Vec<u8>,
    /// Extra field.
    pub extra: Vec<u8>,
    /// Encoded comment.
    pub comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    /// Builds the central header for a finished entry.
    pub fn from_entry(entry: &ZipEntry, codec: &StringCodec) -> Result<Self> {
        let name = encode_name(entry, codec)?;
        let comment = entry
            .comment()
            .map(|c| codec.encode(c, entry.is_unicode_text()))
            .unwrap_or_default();
        if comment.len() > MAX_COMMENT_LENGTH {
            return Err(Error::CommentTooLong {
                length: comment.len(),
            });
        }

        let size = entry.size().max(0) as u64;
        let compressed = entry.compressed_size().max(0) as u64;
        let offset = entry.offset();
        let mut zip64_values = Vec::with_capacity(3);
        for value in [size, compressed, offset] {
            if value >= ZIP64_THRESHOLD {
                zip64_values.push(value);
            }
        }
        let (extra, _) = build_extra(entry, &zip64_values)?;

        let mut version_needed = entry.version_needed();
        if !zip64_values.is_empty() {
            version_needed = version_needed.max(VERSION_ZIP64);
        }
        let external_attributes = match entry.external_attributes() {
            -1 if entry.is_directory() => DOS_DIRECTORY_ATTRIBUTE as u32,
            -1 => 0,
            attrs => attrs as u32,
        };

        Ok(Self {
            version_made_by: entry.version_made_by(),
            version_needed,
            flags: entry.flags(),
            method: entry.header_method(),
            dos_time: entry.dos_time(),
            crc: header_crc(entry),
            compressed_size: narrow_u32(compressed),
            size: narrow_u32(size),
            disk_start: 0,
            internal_attributes: 0,
            external_attributes,
            offset: narrow_u32(offset),
            name,
            extra,
            comment,
        })
    }

    /// Serialised length.
    pub fn len(&self) -> u64 {
        CENTRAL_HEADER_SIZE + (self.name.len() + self.extra.len() + self.comment.len()) as u64
    }

    /// Always `false`; a header has at least its fixed part.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Writes the header.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(CENTRAL_HEADER_SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.version_made_by)?;
        w.write_u16::<LittleEndian>(self.version_needed)?;
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u16::<LittleEndian>(self.method)?;
        w.write_u32::<LittleEndian>(self.dos_time)?;
        w.write_u32::<LittleEndian>(self.crc)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.size)?;
        w.write_u16::<LittleEndian>(self.name.len() as u16)?;
        w.write_u16::<LittleEndian>(self.extra.len() as u16)?;
        w.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        w.write_u16::<LittleEndian>(self.disk_start)?;
        w.write_u16::<LittleEndian>(self.internal_attributes)?;
        w.write_u32::<LittleEndian>(self.external_attributes)?;
        w.write_u32::<LittleEndian>(self.offset)?;
        w.write_all(&self.name)?;
        w.write_all(&self.extra)?;
        w.write_all(&self.comment)
    }

    /// Reads a central directory header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedArchive`] on a wrong signature or a
    /// truncated record.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let map = truncated("central directory header");
        let signature = r.read_u32::<LittleEndian>().map_err(&map)?;
        if signature != CENTRAL_HEADER_SIGNATURE {
            return Err(Error::MalformedArchive(format!(
                "bad central directory signature {signature:#010x}"
            )));
        }
        let version_made_by = r.read_u16::<LittleEndian>().map_err(&map)?;
        let version_needed = r.read_u16::<LittleEndian>().map_err(&map)?;
        let flags = r.read_u16::<LittleEndian>().map_err(&map)?;
        let method = r.read_u16::<LittleEndian>().map_err(&map)?;
        let dos_time = r.read_u32::<LittleEndian>().map_err(&map)?;
        let crc = r.read_u32::<LittleEndian>().map_err(&map)?;
        let compressed_size = r.read_u32::<LittleEndian>().map_err(&map)?;
        let size = r.read_u32::<LittleEndian>().map_err(&map)?;
        let name_len = r.read_u16::<LittleEndian>().map_err(&map)?;
        let extra_len = r.read_u16::<LittleEndian>().map_err(&map)?;
        let comment_len = r.read_u16::<LittleEndian>().map_err(&map)?;
        let disk_start = r.read_u16::<LittleEndian>().map_err(&map)?;
        let internal_attributes = r.read_u16::<LittleEndian>().map_err(&map)?;
        let external_attributes = r.read_u32::<LittleEndian>().map_err(&map)?;
        let offset = r.read_u32::<LittleEndian>().map_err(&map)?;
        let name = read_bytes(r, usize::from(name_len), "central directory name")?;
        let extra = read_bytes(r, usize::from(extra_len), "central directory extra field")?;
        let comment = read_bytes(r, usize::from(comment_len), "central directory comment")?;
        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            method,
            dos_time,
            crc,
            compressed_size,
            size,
            disk_start,
            internal_attributes,
            external_attributes,
            offset,
            name,
            extra,
            comment,
        })
    }

    /// Converts the header into an entry, resolving Zip64 placeholders.
    pub fn into_entry(self, codec: &StringCodec) -> Result<ZipEntry> {
        let name = codec.decode(&self.name, self.flags);
        let mut entry =
            ZipEntry::from_header(name, self.version_made_by, self.version_needed, self.method);
        entry.set_flags(self.flags);
        entry.set_dos_time(self.dos_time);
        entry.set_crc(self.crc);
        entry.set_size(i64::from(self.size));
        entry.set_compressed_size(i64::from(self.compressed_size));
        entry.set_offset(u64::from(self.offset));
        entry.set_external_attributes(self.external_attributes as i32);
        if !self.comment.is_empty() {
            entry.set_comment(Some(codec.decode(&self.comment, self.flags)))?;
        }
        if self.extra.len() > MAX_EXTRA_LENGTH {
            return Err(Error::ExtraDataTooLong {
                length: self.extra.len(),
            });
        }
        entry.set_extra(&self.extra)?;
        entry.process_extra_data(false)?;
        Ok(entry)
    }
}

/// The record following deferred entry data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    /// CRC-32 of the uncompressed data.
    pub crc: u32,
    /// Compressed size, encryption overhead included.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub size: u64,
}

impl DataDescriptor {
    /// Encoded length with signature.
    pub fn encoded_len(zip64: bool) -> u64 {
        if zip64 { 24 } else { 16 }
    }

    /// Writes the descriptor with its signature. `zip64` selects 8-byte
    /// sizes.
    pub fn write_to<W: Write>(&self, w: &mut W, zip64: bool) -> io::Result<()> {
        w.write_u32::<LittleEndian>(DESCRIPTOR_SIGNATURE)?;
        w.write_u32::<LittleEndian>(self.crc)?;
        if zip64 {
            w.write_u64::<LittleEndian>(self.compressed_size)?;
            w.write_u64::<LittleEndian>(self.size)
        } else {
            w.write_u32::<LittleEndian>(self.compressed_size as u32)?;
            w.write_u32::<LittleEndian>(self.size as u32)
        }
    }

    /// Reads a descriptor, with or without its signature.
    pub fn read_from<R: Read>(r: &mut R, zip64: bool) -> Result<Self> {
        let map = truncated("data descriptor");
        let first = r.read_u32::<LittleEndian>().map_err(&map)?;
        let crc = if first == DESCRIPTOR_SIGNATURE {
            r.read_u32::<LittleEndian>().map_err(&map)?
        } else {
            log::warn!("data descriptor without signature");
            first
        };
        let (compressed_size, size) = if zip64 {
            (
                r.read_u64::<LittleEndian>().map_err(&map)?,
                r.read_u64::<LittleEndian>().map_err(&map)?,
            )
        } else {
            (
                u64::from(r.read_u32::<LittleEndian>().map_err(&map)?),
                u64::from(r.read_u32::<LittleEndian>().map_err(&map)?),
            )
        };
        Ok(Self {
            crc,
            compressed_size,
            size,
        })
    }
}
