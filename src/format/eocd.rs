//! End of central directory records.
//!
//! The EOCD record sits at the very end of the archive, followed only by
//! the archive comment, so it is found by scanning backwards over at most
//! `22 + 65535` bytes. A Zip64 locator immediately before it points at the
//! Zip64 record carrying the 64-bit counts and offsets.
//!
//! Archives with data prepended (self-extractor stubs) are handled by
//! comparing where the central directory actually ends with where the
//! records say it starts; the difference is the base offset added to every
//! stored offset.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{
    EOCD_SIGNATURE, EOCD_SIZE, MAX_COMMENT_LENGTH, VERSION_ZIP64, ZIP64_EOCD_SIGNATURE,
    ZIP64_EOCD_SIZE, ZIP64_LOCATOR_SIGNATURE, ZIP64_LOCATOR_SIZE, ZIP64_PLACEHOLDER_U16,
    ZIP64_PLACEHOLDER_U32, truncated,
};
use crate::entry::VERSION_MADE_BY;
use crate::{Error, Result};

/// Where the central directory is and what the archive says about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryInfo {
    /// Number of entries.
    pub entries: u64,
    /// Size of the central directory in bytes.
    pub size: u64,
    /// Offset of the central directory as recorded.
    pub offset: u64,
    /// Raw archive comment.
    pub comment: Vec<u8>,
    /// The archive uses Zip64 end records.
    pub zip64: bool,
    /// Bytes prepended to the archive; add to every recorded offset.
    pub base: u64,
}

impl CentralDirectoryInfo {
    /// Absolute position of the first central directory header.
    pub fn start(&self) -> u64 {
        self.base + self.offset
    }
}

struct Zip64Record {
    entries: u64,
    size: u64,
    offset: u64,
}

fn read_zip64_record<R: Read + Seek>(r: &mut R, position: u64) -> Result<Option<Zip64Record>> {
    r.seek(SeekFrom::Start(position))?;
    let map = truncated("Zip64 end of central directory record");
    if r.read_u32::<LittleEndian>().map_err(&map)? != ZIP64_EOCD_SIGNATURE {
        return Ok(None);
    }
    let _record_size = r.read_u64::<LittleEndian>().map_err(&map)?;
    let _made_by = r.read_u16::<LittleEndian>().map_err(&map)?;
    let _needed = r.read_u16::<LittleEndian>().map_err(&map)?;
    let disk = r.read_u32::<LittleEndian>().map_err(&map)?;
    let cd_disk = r.read_u32::<LittleEndian>().map_err(&map)?;
    let _disk_entries = r.read_u64::<LittleEndian>().map_err(&map)?;
    let entries = r.read_u64::<LittleEndian>().map_err(&map)?;
    let size = r.read_u64::<LittleEndian>().map_err(&map)?;
    let offset = r.read_u64::<LittleEndian>().map_err(&map)?;
    if disk != 0 || cd_disk != 0 {
        return Err(Error::UnsupportedFeature {
            feature: "multi-disk archives",
        });
    }
    Ok(Some(Zip64Record {
        entries,
        size,
        offset,
    }))
}

/// Locates and parses the end records.
///
/// # Errors
///
/// Returns [`Error::MalformedArchive`] if no EOCD record is found within the
/// comment window or the records are inconsistent with the archive length.
pub fn read_directory_info<R: Read + Seek>(r: &mut R) -> Result<CentralDirectoryInfo> {
    let len = r.seek(SeekFrom::End(0))?;
    if len < EOCD_SIZE {
        return Err(Error::MalformedArchive(
            "archive is too small to contain an end of central directory record".into(),
        ));
    }
    let window = len.min(EOCD_SIZE + MAX_COMMENT_LENGTH as u64);
    let window_start = len - window;
    r.seek(SeekFrom::Start(window_start))?;
    let mut tail = vec![0u8; window as usize];
    r.read_exact(&mut tail).map_err(truncated("archive tail"))?;

    let eocd_size = EOCD_SIZE as usize;
    let found = (0..=tail.len() - eocd_size).rev().find(|&i| {
        LittleEndian::read_u32(&tail[i..]) == EOCD_SIGNATURE
            && i + eocd_size + usize::from(LittleEndian::read_u16(&tail[i + 20..])) <= tail.len()
    });
    let Some(i) = found else {
        return Err(Error::MalformedArchive(
            "end of central directory record not found".into(),
        ));
    };
    let eocd_position = window_start + i as u64;
    let record = &tail[i..];
    let disk = LittleEndian::read_u16(&record[4..]);
    let cd_disk = LittleEndian::read_u16(&record[6..]);
    let mut entries = u64::from(LittleEndian::read_u16(&record[10..]));
    let mut size = u64::from(LittleEndian::read_u32(&record[12..]));
    let mut offset = u64::from(LittleEndian::read_u32(&record[16..]));
    let comment_len = usize::from(LittleEndian::read_u16(&record[20..]));
    let comment = record[eocd_size..eocd_size + comment_len].to_vec();
    if i + eocd_size + comment_len < tail.len() {
        log::warn!(
            "{} bytes after the archive comment",
            tail.len() - i - eocd_size - comment_len
        );
    }

    let mut directory_end = eocd_position;
    let mut zip64 = false;
    if eocd_position >= ZIP64_LOCATOR_SIZE {
        let locator_position = eocd_position - ZIP64_LOCATOR_SIZE;
        r.seek(SeekFrom::Start(locator_position))?;
        let map = truncated("Zip64 locator");
        if r.read_u32::<LittleEndian>().map_err(&map)? == ZIP64_LOCATOR_SIGNATURE {
            let _disk = r.read_u32::<LittleEndian>().map_err(&map)?;
            let declared = r.read_u64::<LittleEndian>().map_err(&map)?;
            let mut record = None;
            let mut record_position = declared;
            if declared < locator_position {
                record = read_zip64_record(r, declared)?;
            }
            if record.is_none() && locator_position >= ZIP64_EOCD_SIZE {
                record_position = locator_position - ZIP64_EOCD_SIZE;
                record = read_zip64_record(r, record_position)?;
            }
            let Some(record) = record else {
                return Err(Error::MalformedArchive(
                    "Zip64 locator points at no Zip64 record".into(),
                ));
            };
            entries = record.entries;
            size = record.size;
            offset = record.offset;
            directory_end = record_position;
            zip64 = true;
        }
    }
    if !zip64 && (disk != 0 || cd_disk != 0) {
        return Err(Error::UnsupportedFeature {
            feature: "multi-disk archives",
        });
    }

    let start = directory_end.checked_sub(size).ok_or_else(|| {
        Error::MalformedArchive("central directory size exceeds archive".into())
    })?;
    let base = start.checked_sub(offset).ok_or_else(|| {
        Error::MalformedArchive("central directory offset beyond its position".into())
    })?;
    if base > 0 {
        log::debug!("archive has {base} bytes of prepended data");
    }
    log::debug!("central directory: {entries} entries, {size} bytes at {start}");

    Ok(CentralDirectoryInfo {
        entries,
        size,
        offset,
        comment,
        zip64,
        base,
    })
}

/// Writes the end records. The central directory occupies
/// `cd_offset..cd_offset + cd_size`, and the records follow it directly.
///
/// Zip64 records are written when `force_zip64` is set or any value
/// overflows its classic field.
pub fn write_end_records<W: Write>(
    w: &mut W,
    entries: u64,
    cd_size: u64,
    cd_offset: u64,
    comment: &[u8],
    force_zip64: bool,
) -> io::Result<()> {
    let needs_zip64 = force_zip64
        || entries >= u64::from(ZIP64_PLACEHOLDER_U16)
        || cd_size >= u64::from(ZIP64_PLACEHOLDER_U32)
        || cd_offset >= u64::from(ZIP64_PLACEHOLDER_U32);

    if needs_zip64 {
        let record_position = cd_offset + cd_size;
        w.write_u32::<LittleEndian>(ZIP64_EOCD_SIGNATURE)?;
        w.write_u64::<LittleEndian>(ZIP64_EOCD_SIZE - 12)?;
        w.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
        w.write_u16::<LittleEndian>(VERSION_ZIP64)?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u64::<LittleEndian>(entries)?;
        w.write_u64::<LittleEndian>(entries)?;
        w.write_u64::<LittleEndian>(cd_size)?;
        w.write_u64::<LittleEndian>(cd_offset)?;

        w.write_u32::<LittleEndian>(ZIP64_LOCATOR_SIGNATURE)?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u64::<LittleEndian>(record_position)?;
        w.write_u32::<LittleEndian>(1)?;
    }

    let short_entries = entries.min(u64::from(ZIP64_PLACEHOLDER_U16)) as u16;
    w.write_u32::<LittleEndian>(EOCD_SIGNATURE)?;
    w.write_u16::<LittleEndian>(0)?;
    w.write_u16::<LittleEndian>(0)?;
    w.write_u16::<LittleEndian>(short_entries)?;
    w.write_u16::<LittleEndian>(short_entries)?;
    w.write_u32::<LittleEndian>(cd_size.min(u64::from(ZIP64_PLACEHOLDER_U32)) as u32)?;
    w.write_u32::<LittleEndian>(cd_offset.min(u64::from(ZIP64_PLACEHOLDER_U32)) as u32)?;
    w.write_u16::<LittleEndian>(comment.len().min(MAX_COMMENT_LENGTH) as u16)?;
    w.write_all(&comment[..comment.len().min(MAX_COMMENT_LENGTH)])
}
