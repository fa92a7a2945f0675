//! Tagged extra-field codec.
//!
//! Every ZIP header carries an "extra field": a sequence of blocks, each a
//! little-endian `u16` tag, a `u16` value length and the value bytes. The
//! whole field, block headers included, is limited to 65535 bytes.
//!
//! [`ExtraData`] is both a cursor for reading one block at a time and a
//! builder for composing new blocks. Typed blocks implement [`TaggedData`].
//!
//! # Example
//!
//! ```rust
//! use zipwright::extra::ExtraData;
//!
//! let mut extra = ExtraData::new();
//! extra.add(0x7777, Some(&[1, 2, 3])).unwrap();
//! assert_eq!(extra.len(), 7);
//!
//! assert!(extra.find(0x7777));
//! assert_eq!(extra.read_byte(), Some(1));
//! assert_eq!(extra.unread_count(), 2);
//! ```

use std::io::Cursor;

use byteorder::{ByteOrder, LittleEndian};

use crate::timestamp::{DateTime, Timestamp};
use crate::{Error, Result};

/// Maximum total length of an extra field.
pub const MAX_EXTRA_LENGTH: usize = 0xFFFF;

/// Size of the tag + length header preceding every block value.
const BLOCK_HEADER_SIZE: usize = 4;

/// Tag of the Zip64 extended information block.
pub const ZIP64_TAG: u16 = 0x0001;
/// Tag of the NTFS timestamp block.
pub const NTFS_TAG: u16 = 0x000a;
/// Tag of the extended Unix timestamp block.
pub const UNIX_TIME_TAG: u16 = 0x5455;
/// Tag of the WinZip AES block.
pub const AES_TAG: u16 = 0x9901;

/// A typed extra-field block.
pub trait TaggedData {
    /// The block tag.
    fn tag(&self) -> u16;

    /// Parses the block value.
    fn set_data(&mut self, data: &[u8]) -> Result<()>;

    /// Serialises the block value (without the 4-byte block header).
    fn get_data(&self) -> Vec<u8>;
}

/// An extra-field block kept as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTaggedData {
    tag: u16,
    data: Vec<u8>,
}

impl RawTaggedData {
    /// Creates an empty block with the given tag.
    pub fn new(tag: u16) -> Self {
        Self {
            tag,
            data: Vec::new(),
        }
    }

    /// The raw value bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl TaggedData for RawTaggedData {
    fn tag(&self) -> u16 {
        self.tag
    }

    fn set_data(&mut self, data: &[u8]) -> Result<()> {
        self.data = data.to_vec();
        Ok(())
    }

    fn get_data(&self) -> Vec<u8> {
        self.data.clone()
    }
}

/// Flags of the extended Unix timestamp block.
pub mod unix_flags {
    /// The modification time is present.
    pub const MODIFICATION_TIME: u8 = 0x01;
    /// The access time is present.
    pub const ACCESS_TIME: u8 = 0x02;
    /// The creation time is present.
    pub const CREATE_TIME: u8 = 0x04;
}

/// Extended Unix timestamp block (0x5455).
///
/// Holds a flags byte followed by up to three signed 32-bit epoch seconds,
/// in flag order: modification, access, creation. Setting a time sets its
/// flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedUnixData {
    flags: u8,
    modification_time: DateTime,
    last_access_time: DateTime,
    create_time: DateTime,
}

impl Default for ExtendedUnixData {
    fn default() -> Self {
        Self {
            flags: 0,
            modification_time: DateTime::UNIX_EPOCH,
            last_access_time: DateTime::UNIX_EPOCH,
            create_time: DateTime::UNIX_EPOCH,
        }
    }
}

impl ExtendedUnixData {
    /// Returns `true` if `value` fits the signed 32-bit epoch range.
    pub fn is_valid_value(value: &DateTime) -> bool {
        let secs = value.as_unix_secs();
        secs >= i64::from(i32::MIN) && secs <= i64::from(i32::MAX)
    }

    fn checked(value: DateTime) -> Result<DateTime> {
        if Self::is_valid_value(&value) {
            Ok(value)
        } else {
            Err(Error::InvalidArgument(format!(
                "{value} is outside the range of Unix 32-bit timestamps"
            )))
        }
    }

    /// The flags byte.
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Overrides the flags byte.
    pub fn set_flags(&mut self, flags: u8) {
        self.flags = flags;
    }

    /// The modification time.
    pub fn modification_time(&self) -> DateTime {
        self.modification_time
    }

    /// Sets the modification time and its flag.
    pub fn set_modification_time(&mut self, value: DateTime) -> Result<()> {
        self.modification_time = Self::checked(value)?;
        self.flags |= unix_flags::MODIFICATION_TIME;
        Ok(())
    }

    /// The access time.
    pub fn last_access_time(&self) -> DateTime {
        self.last_access_time
    }

    /// Sets the access time and its flag.
    pub fn set_last_access_time(&mut self, value: DateTime) -> Result<()> {
        self.last_access_time = Self::checked(value)?;
        self.flags |= unix_flags::ACCESS_TIME;
        Ok(())
    }

    /// The creation time.
    pub fn create_time(&self) -> DateTime {
        self.create_time
    }

    /// Sets the creation time and its flag.
    pub fn set_create_time(&mut self, value: DateTime) -> Result<()> {
        self.create_time = Self::checked(value)?;
        self.flags |= unix_flags::CREATE_TIME;
        Ok(())
    }

    fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

impl TaggedData for ExtendedUnixData {
    fn tag(&self) -> u16 {
        UNIX_TIME_TAG
    }

    fn set_data(&mut self, data: &[u8]) -> Result<()> {
        let (&flags, mut rest) = data
            .split_first()
            .ok_or_else(|| Error::UnexpectedEndOfData("empty extended time block".into()))?;
        self.flags = flags;
        // Central directory copies only carry the modification time, so a
        // flagged value may legitimately be absent.
        let targets = [
            (unix_flags::MODIFICATION_TIME, &mut self.modification_time),
            (unix_flags::ACCESS_TIME, &mut self.last_access_time),
            (unix_flags::CREATE_TIME, &mut self.create_time),
        ];
        for (flag, slot) in targets {
            if flags & flag == 0 {
                continue;
            }
            if rest.len() < 4 {
                break;
            }
            *slot = DateTime::from_unix_secs(i64::from(LittleEndian::read_i32(rest)));
            rest = &rest[4..];
        }
        Ok(())
    }

    fn get_data(&self) -> Vec<u8> {
        let mut out = vec![self.flags];
        let values = [
            (unix_flags::MODIFICATION_TIME, self.modification_time),
            (unix_flags::ACCESS_TIME, self.last_access_time),
            (unix_flags::CREATE_TIME, self.create_time),
        ];
        for (flag, value) in values {
            if self.has(flag) {
                let secs = value.as_unix_secs().clamp(i64::from(i32::MIN), i64::from(i32::MAX));
                out.extend_from_slice(&(secs as i32).to_le_bytes());
            }
        }
        out
    }
}

/// NTFS timestamp block (0x000a).
///
/// A reserved `u32` followed by attribute records; attribute 1 (24 bytes)
/// holds modification, access and creation FILETIMEs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NtTaggedData {
    last_modification_time: Timestamp,
    last_access_time: Timestamp,
    create_time: Timestamp,
}

impl NtTaggedData {
    /// The modification time.
    pub fn last_modification_time(&self) -> Timestamp {
        self.last_modification_time
    }

    /// Sets the modification time.
    pub fn set_last_modification_time(&mut self, value: Timestamp) {
        self.last_modification_time = value;
    }

    /// The access time.
    pub fn last_access_time(&self) -> Timestamp {
        self.last_access_time
    }

    /// Sets the access time.
    pub fn set_last_access_time(&mut self, value: Timestamp) {
        self.last_access_time = value;
    }

    /// The creation time.
    pub fn create_time(&self) -> Timestamp {
        self.create_time
    }

    /// Sets the creation time.
    pub fn set_create_time(&mut self, value: Timestamp) {
        self.create_time = value;
    }
}

impl TaggedData for NtTaggedData {
    fn tag(&self) -> u16 {
        NTFS_TAG
    }

    fn set_data(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < 4 {
            return Err(Error::UnexpectedEndOfData("NTFS block too short".into()));
        }
        let mut pos = 4;
        while pos + BLOCK_HEADER_SIZE <= data.len() {
            let attribute = LittleEndian::read_u16(&data[pos..]);
            let size = usize::from(LittleEndian::read_u16(&data[pos + 2..]));
            pos += BLOCK_HEADER_SIZE;
            if attribute == 1 && size >= 24 && pos + 24 <= data.len() {
                let times = &data[pos..pos + 24];
                self.last_modification_time =
                    Timestamp::from_filetime(LittleEndian::read_u64(times));
                self.last_access_time = Timestamp::from_filetime(LittleEndian::read_u64(&times[8..]));
                self.create_time = Timestamp::from_filetime(LittleEndian::read_u64(&times[16..]));
                break;
            }
            pos += size;
        }
        Ok(())
    }

    fn get_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&24u16.to_le_bytes());
        for ts in [
            self.last_modification_time,
            self.last_access_time,
            self.create_time,
        ] {
            out.extend_from_slice(&ts.as_filetime().to_le_bytes());
        }
        out
    }
}

/// Cursor and builder over the raw bytes of an extra field.
#[derive(Debug, Clone, Default)]
pub struct ExtraData {
    data: Vec<u8>,
    index: usize,
    read_value_start: usize,
    read_value_length: usize,
    new_entry: Vec<u8>,
}

impl ExtraData {
    /// Creates an empty extra field.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps existing extra-field bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            read_value_start: data.len(),
            index: data.len(),
            ..Self::default()
        }
    }

    /// Total length in bytes, block headers included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if there are no blocks.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw bytes.
    pub fn get_entry_data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the codec, returning the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Removes every block.
    pub fn clear(&mut self) {
        self.data.clear();
        self.reset_cursor();
    }

    /// Iterates over `(tag, value)` pairs, stopping at the first truncated block.
    pub fn blocks(&self) -> impl Iterator<Item = (u16, &[u8])> + '_ {
        let mut pos = 0;
        std::iter::from_fn(move || {
            let header = self.data.get(pos..pos + BLOCK_HEADER_SIZE)?;
            let tag = LittleEndian::read_u16(header);
            let len = usize::from(LittleEndian::read_u16(&header[2..]));
            let start = pos + BLOCK_HEADER_SIZE;
            let value = self.data.get(start..start + len)?;
            pos = start + len;
            Some((tag, value))
        })
    }

    fn reset_cursor(&mut self) {
        self.read_value_start = self.data.len();
        self.read_value_length = 0;
        self.index = self.data.len();
    }

    /// Byte span `(start, end)` of the whole block with `tag`, header included.
    fn block_span(&self, tag: u16) -> Option<(usize, usize)> {
        let mut pos = 0;
        while pos + BLOCK_HEADER_SIZE <= self.data.len() {
            let block_tag = LittleEndian::read_u16(&self.data[pos..]);
            let len = usize::from(LittleEndian::read_u16(&self.data[pos + 2..]));
            let end = pos + BLOCK_HEADER_SIZE + len;
            if end > self.data.len() {
                return None;
            }
            if block_tag == tag {
                return Some((pos, end));
            }
            pos = end;
        }
        None
    }

    /// Positions the cursor at the value of the first block with `tag`.
    ///
    /// Returns `false`, leaving nothing to read, if no complete block with
    /// that tag exists.
    pub fn find(&mut self, tag: u16) -> bool {
        match self.block_span(tag) {
            Some((start, end)) => {
                self.read_value_start = start + BLOCK_HEADER_SIZE;
                self.read_value_length = end - self.read_value_start;
                self.index = self.read_value_start;
                true
            }
            None => {
                self.reset_cursor();
                false
            }
        }
    }

    /// Length of the value found by the last successful [`find`](Self::find).
    pub fn value_length(&self) -> usize {
        self.read_value_length
    }

    /// Absolute index of the cursor in the raw bytes.
    pub fn current_read_index(&self) -> usize {
        self.index
    }

    /// Bytes left in the current block value.
    pub fn unread_count(&self) -> usize {
        (self.read_value_start + self.read_value_length).saturating_sub(self.index)
    }

    fn value_end(&self) -> usize {
        self.read_value_start + self.read_value_length
    }

    fn read_check(&self, length: usize) -> Result<()> {
        if self.index + length > self.value_end() {
            return Err(Error::UnexpectedEndOfData("end of extra data block".into()));
        }
        Ok(())
    }

    /// Reads one byte, or `None` at the end of the current block.
    pub fn read_byte(&mut self) -> Option<u8> {
        if self.index < self.value_end() {
            let b = self.data[self.index];
            self.index += 1;
            Some(b)
        } else {
            None
        }
    }

    /// Reads a little-endian `u16`.
    pub fn read_short(&mut self) -> Result<u16> {
        self.read_check(2)?;
        let value = LittleEndian::read_u16(&self.data[self.index..]);
        self.index += 2;
        Ok(value)
    }

    /// Reads a little-endian `i32`.
    pub fn read_int(&mut self) -> Result<i32> {
        self.read_check(4)?;
        let value = LittleEndian::read_i32(&self.data[self.index..]);
        self.index += 4;
        Ok(value)
    }

    /// Reads a little-endian `i64`.
    pub fn read_long(&mut self) -> Result<i64> {
        self.read_check(8)?;
        let value = LittleEndian::read_i64(&self.data[self.index..]);
        self.index += 8;
        Ok(value)
    }

    /// Moves the cursor by `amount` bytes, forwards or backwards, within the
    /// current block. On error the cursor does not move.
    pub fn skip(&mut self, amount: i64) -> Result<()> {
        let target = i64::try_from(self.index)
            .ok()
            .and_then(|index| index.checked_add(amount))
            .ok_or_else(|| Error::UnexpectedEndOfData("skip offset overflows".into()))?;
        if target > self.value_end() as i64 {
            return Err(Error::UnexpectedEndOfData("end of extra data block".into()));
        }
        if target < self.read_value_start as i64 {
            return Err(Error::UnexpectedEndOfData(
                "cannot skip before the start of the block".into(),
            ));
        }
        self.index = target as usize;
        Ok(())
    }

    /// Returns a copy of the value of the block with `tag`.
    pub fn get_stream_for_tag(&mut self, tag: u16) -> Option<Cursor<Vec<u8>>> {
        if !self.find(tag) {
            return None;
        }
        let value = self.data[self.read_value_start..self.value_end()].to_vec();
        Some(Cursor::new(value))
    }

    /// Parses the block for `T`, if present.
    pub fn get_data<T: TaggedData + Default>(&mut self) -> Result<Option<T>> {
        let mut typed = T::default();
        if !self.find(typed.tag()) {
            return Ok(None);
        }
        typed.set_data(&self.data[self.read_value_start..self.value_end()])?;
        Ok(Some(typed))
    }

    /// Adds or replaces a typed block.
    pub fn add_tagged<T: TaggedData>(&mut self, block: &T) -> Result<()> {
        self.add(block.tag(), Some(&block.get_data()))
    }

    /// Adds a block, replacing any existing block with the same tag.
    ///
    /// `None` adds a zero-length marker block. The operation is
    /// all-or-nothing: if the result would exceed 65535 bytes the field is
    /// left untouched and [`Error::ExtraDataTooLong`] is returned.
    pub fn add(&mut self, tag: u16, value: Option<&[u8]>) -> Result<()> {
        let value = value.unwrap_or(&[]);
        let existing = self.block_span(tag);
        let replaced = existing.map_or(0, |(start, end)| end - start);
        let new_length = self.data.len() - replaced + BLOCK_HEADER_SIZE + value.len();
        if value.len() > MAX_EXTRA_LENGTH || new_length > MAX_EXTRA_LENGTH {
            return Err(Error::ExtraDataTooLong { length: new_length });
        }
        if let Some((start, end)) = existing {
            self.data.drain(start..end);
        }
        self.data.extend_from_slice(&tag.to_le_bytes());
        self.data.extend_from_slice(&(value.len() as u16).to_le_bytes());
        self.data.extend_from_slice(value);
        self.reset_cursor();
        Ok(())
    }

    /// Removes the block with `tag`. Returns `true` if one was removed.
    pub fn delete(&mut self, tag: u16) -> bool {
        match self.block_span(tag) {
            Some((start, end)) => {
                self.data.drain(start..end);
                self.reset_cursor();
                true
            }
            None => false,
        }
    }

    /// Starts composing a new block value.
    pub fn start_new_entry(&mut self) {
        self.new_entry.clear();
    }

    /// Appends a byte to the block being composed.
    pub fn add_data(&mut self, data: u8) {
        self.new_entry.push(data);
    }

    /// Appends bytes to the block being composed.
    pub fn add_data_slice(&mut self, data: &[u8]) {
        self.new_entry.extend_from_slice(data);
    }

    /// Appends a little-endian `u16` to the block being composed.
    pub fn add_le_short(&mut self, value: u16) {
        self.new_entry.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian `i32` to the block being composed.
    pub fn add_le_int(&mut self, value: i32) {
        self.new_entry.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian `i64` to the block being composed.
    pub fn add_le_long(&mut self, value: i64) {
        self.new_entry.extend_from_slice(&value.to_le_bytes());
    }

    /// Adds the composed block under `tag` and starts a fresh one.
    pub fn add_new_entry(&mut self, tag: u16) -> Result<()> {
        let value = std::mem::take(&mut self.new_entry);
        let result = self.add(tag, Some(&value));
        self.new_entry = value;
        self.new_entry.clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_stream_long(cursor: &mut Cursor<Vec<u8>>) -> i64 {
        let mut buf = [0u8; 8];
        cursor.read_exact(&mut buf).expect("stream long");
        i64::from_le_bytes(buf)
    }

    #[test]
    fn test_exceed_size() {
        let mut zed = ExtraData::new();
        zed.add(1, Some(&vec![0u8; 65506])).unwrap();
        assert_eq!(zed.len(), 65510);
        zed.add(2, Some(&[0u8; 21])).unwrap();
        assert_eq!(zed.len(), 65535);

        assert!(matches!(
            zed.add(3, None),
            Err(Error::ExtraDataTooLong { .. })
        ));
        assert_eq!(zed.len(), 65535);

        assert!(zed.delete(2));
        assert_eq!(zed.len(), 65510);
        assert!(zed.add(2, Some(&[0u8; 22])).is_err());
        assert_eq!(zed.len(), 65510);
    }

    #[test]
    fn test_deleting() {
        let mut zed = ExtraData::new();
        assert_eq!(zed.len(), 0);

        zed.add(1, Some(&[10, 11, 12, 13, 14, 15])).unwrap();
        assert_eq!(zed.len(), 10);
        assert_eq!(zed.get_entry_data().len(), 10);

        zed.add(2, Some(&[20, 21, 22, 23, 24])).unwrap();
        assert_eq!(zed.len(), 19);

        zed.add(3, Some(&[30, 31])).unwrap();
        assert_eq!(zed.len(), 25);

        assert!(zed.delete(2));
        assert_eq!(zed.len(), 16);
        assert_eq!(zed.get_entry_data().len(), 16);

        zed.add(2, Some(&[20, 21, 22, 23, 24])).unwrap();
        assert_eq!(zed.len(), 25);

        zed.add(3, None).unwrap();
        assert_eq!(zed.len(), 23);
        assert!(!zed.delete(9));
    }

    #[test]
    fn test_basic_operations() {
        let mut zed = ExtraData::from_bytes(&[1, 0, 0, 0]);
        assert_eq!(zed.len(), 4);

        let mut zed2 = ExtraData::new();
        zed2.add(1, Some(&[])).unwrap();
        assert_eq!(zed2.get_entry_data(), zed.get_entry_data());

        assert!(!zed.find(2));
        assert!(zed.find(1));
        assert_eq!(zed.value_length(), 0);
        assert_eq!(zed.read_byte(), None);
        assert_eq!(zed.get_stream_for_tag(1).unwrap().get_ref().len(), 0);

        let mut zed = ExtraData::from_bytes(&[1, 0, 3, 0, 1, 2, 3]);
        assert_eq!(zed.len(), 7);
        assert!(zed.find(1));
        assert_eq!(zed.value_length(), 3);
        for i in 1..=3 {
            assert_eq!(zed.read_byte(), Some(i));
        }
        assert_eq!(zed.read_byte(), None);
        let stream = zed.get_stream_for_tag(1).unwrap();
        assert_eq!(stream.into_inner(), vec![1, 2, 3]);

        let mut zed = ExtraData::from_bytes(&[1, 0, 3, 0, 1, 2, 3, 2, 0, 1, 0, 56]);
        assert_eq!(zed.len(), 12);
        assert!(zed.find(1));
        assert_eq!(zed.value_length(), 3);
        for i in 1..=3 {
            assert_eq!(zed.read_byte(), Some(i));
        }
        assert_eq!(zed.read_byte(), None);
        assert!(zed.find(2));
        assert_eq!(zed.value_length(), 1);
        assert_eq!(zed.read_byte(), Some(56));
        assert_eq!(zed.read_byte(), None);
        assert_eq!(zed.get_stream_for_tag(2).unwrap().into_inner(), vec![56]);
    }

    #[test]
    fn test_add_and_builder() {
        let mut zed = ExtraData::new();
        zed.add(7, Some(&[33, 44, 55])).unwrap();
        assert!(zed.find(7));
        assert_eq!(zed.value_length(), 3);
        assert_eq!(zed.read_byte(), Some(33));
        assert_eq!(zed.read_byte(), Some(44));
        assert_eq!(zed.read_byte(), Some(55));
        assert_eq!(zed.read_byte(), None);

        zed.add(7, None).unwrap();
        assert!(zed.find(7));
        assert_eq!(zed.value_length(), 0);

        zed.start_new_entry();
        zed.add_data(0xae);
        zed.add_new_entry(55).unwrap();
        assert!(zed.find(55));
        assert_eq!(zed.value_length(), 1);
        assert_eq!(zed.read_byte(), Some(0xae));
        assert_eq!(zed.read_byte(), None);
    }

    #[test]
    fn test_le_long_values() {
        let values = [
            0i64,
            -4,
            -1,
            i64::MAX,
            i64::MIN,
            0x123456789ABCDEF0,
            0xFEDCBA9876543210u64 as i64,
        ];
        let mut zed = ExtraData::new();
        zed.start_new_entry();
        for v in values {
            zed.add_le_long(v);
        }
        zed.add_new_entry(567).unwrap();

        let mut stream = zed.get_stream_for_tag(567).unwrap();
        for expected in values {
            let from_stream = read_stream_long(&mut stream);
            assert_eq!(from_stream, zed.read_long().unwrap());
            assert_eq!(from_stream, expected);
        }
    }

    #[test]
    fn test_unread_count() {
        let mut zed = ExtraData::from_bytes(&[1, 0, 0, 0]);
        assert!(zed.find(1));
        assert_eq!(zed.unread_count(), 0);

        let mut zed = ExtraData::from_bytes(&[1, 0, 7, 0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(zed.find(1));
        for i in 0..7 {
            assert_eq!(zed.unread_count(), 7 - i);
            zed.read_byte();
        }
        zed.read_byte();
        assert_eq!(zed.unread_count(), 0);
    }

    #[test]
    fn test_skipping() {
        let mut zed = ExtraData::from_bytes(&[1, 0, 7, 0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(zed.len(), 11);
        assert!(zed.find(1));
        assert_eq!(zed.unread_count(), 7);
        assert_eq!(zed.current_read_index(), 4);

        zed.read_byte();
        assert_eq!((zed.unread_count(), zed.current_read_index()), (6, 5));
        zed.skip(1).unwrap();
        assert_eq!((zed.unread_count(), zed.current_read_index()), (5, 6));
        zed.skip(-1).unwrap();
        assert_eq!((zed.unread_count(), zed.current_read_index()), (6, 5));
        zed.skip(6).unwrap();
        assert_eq!((zed.unread_count(), zed.current_read_index()), (0, 11));

        assert!(zed.skip(1).is_err());
        assert_eq!((zed.unread_count(), zed.current_read_index()), (0, 11));

        zed.skip(-7).unwrap();
        assert_eq!((zed.unread_count(), zed.current_read_index()), (7, 4));
        assert!(zed.skip(-1).is_err());
    }

    #[test]
    fn test_skip_extreme_offsets() {
        let mut zed = ExtraData::from_bytes(&[0x34, 0x12, 4, 0, 1, 2, 3, 4]);
        assert!(zed.find(0x1234));
        zed.read_byte();

        assert!(matches!(zed.skip(i64::MAX), Err(Error::UnexpectedEndOfData(_))));
        assert_eq!(zed.current_read_index(), 5);
        assert!(matches!(zed.skip(i64::MIN), Err(Error::UnexpectedEndOfData(_))));
        assert_eq!(zed.current_read_index(), 5);
        assert_eq!(zed.read_byte(), Some(2));
    }

    #[test]
    fn test_read_overrun_short() {
        let mut zed = ExtraData::from_bytes(&[1, 0, 0, 0]);
        assert!(zed.find(1));
        assert!(matches!(zed.read_short(), Err(Error::UnexpectedEndOfData(_))));

        let mut zed = ExtraData::from_bytes(&[1, 0, 1, 0, 1]);
        assert!(zed.find(1));
        assert!(zed.read_short().is_err());

        let mut zed = ExtraData::from_bytes(&[1, 0, 2, 0, 1, 2]);
        assert!(zed.find(1));
        zed.read_short().unwrap();
        assert!(zed.read_short().is_err());
    }

    #[test]
    fn test_read_overrun_int() {
        let mut zed = ExtraData::from_bytes(&[1, 0, 0, 0]);
        assert!(zed.find(1));
        assert!(zed.read_int().is_err());

        let mut zed = ExtraData::from_bytes(&[1, 0, 3, 0, 1, 2, 3]);
        assert!(zed.find(1));
        assert!(zed.read_int().is_err());

        let mut zed = ExtraData::from_bytes(&[1, 0, 7, 0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(zed.find(1));
        zed.read_int().unwrap();
        assert!(zed.read_int().is_err());
    }

    #[test]
    fn test_read_overrun_long() {
        let mut zed = ExtraData::from_bytes(&[1, 0, 0, 0]);
        assert!(zed.find(1));
        assert!(zed.read_long().is_err());

        let mut zed = ExtraData::from_bytes(&[1, 0, 7, 0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(zed.find(1));
        assert!(zed.read_long().is_err());

        let mut zed = ExtraData::from_bytes(&[
            1, 0, 15, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
        ]);
        assert!(zed.find(1));
        zed.read_long().unwrap();
        assert!(zed.read_long().is_err());
    }

    #[test]
    fn test_read_without_find_fails() {
        let mut zed = ExtraData::from_bytes(&[1, 0, 2, 0, 1, 2]);
        assert!(zed.read_short().is_err());
        assert_eq!(zed.read_byte(), None);
    }

    #[test]
    fn test_truncated_block_not_found() {
        let mut zed = ExtraData::from_bytes(&[1, 0, 9, 0, 1, 2]);
        assert!(!zed.find(1));
        assert_eq!(zed.blocks().count(), 0);
    }

    #[test]
    fn test_nt_tagged_data_roundtrip() {
        let mut tag = NtTaggedData::default();
        let mod_time = tag.last_modification_time();
        let raw = tag.get_data();
        tag.set_last_modification_time(Timestamp::from_filetime(mod_time.as_filetime() + 400_000_000));
        assert_ne!(tag.last_modification_time(), mod_time);
        tag.set_data(&raw).unwrap();
        assert_eq!(tag.tag(), 10);
        assert_eq!(tag.last_modification_time(), mod_time);

        tag.set_create_time(Timestamp::from_filetime(0));
        let far = DateTime::new(9999, 12, 31, 23, 59, 59).unwrap();
        tag.set_last_access_time(Timestamp::from_date_time(&far).unwrap());
        let raw = tag.get_data();
        assert_eq!(raw.len(), 32);
        let mut parsed = NtTaggedData::default();
        parsed.set_data(&raw).unwrap();
        assert_eq!(parsed, tag);
    }

    #[test]
    fn test_extended_unix_data_roundtrip() {
        let mut unix = ExtendedUnixData::default();
        let mod_time = unix.modification_time();
        unix.set_modification_time(mod_time).unwrap();
        let raw = unix.get_data();
        assert_eq!(raw.len(), 5);

        unix.set_modification_time(mod_time.add_seconds(100)).unwrap();
        assert_ne!(unix.modification_time(), mod_time);
        unix.set_data(&raw).unwrap();
        assert_eq!(unix.tag(), 0x5455);
        assert_eq!(unix.modification_time(), mod_time);
    }

    #[test]
    fn test_extended_unix_data_rejects_out_of_range() {
        let mut unix = ExtendedUnixData::default();
        let far = DateTime::new(2100, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            unix.set_modification_time(far),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(unix.flags(), 0);
    }

    #[test]
    fn test_typed_blocks_through_extra_data() {
        let mut unix = ExtendedUnixData::default();
        let when = DateTime::new(2020, 5, 17, 8, 0, 0).unwrap();
        unix.set_modification_time(when).unwrap();
        unix.set_last_access_time(when.add_seconds(60)).unwrap();

        let mut extra = ExtraData::new();
        extra.add_tagged(&unix).unwrap();
        let parsed: ExtendedUnixData = extra.get_data().unwrap().expect("block present");
        assert_eq!(parsed.modification_time(), when);
        assert_eq!(parsed.last_access_time(), when.add_seconds(60));
        assert!(extra.get_data::<NtTaggedData>().unwrap().is_none());
    }
}
