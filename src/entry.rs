//! The in-memory record of one archive member.
//!
//! A [`ZipEntry`] is produced by the writers from caller input and by the
//! readers from header bytes. The local file header and the central
//! directory header are two projections of the same entry (see
//! [`crate::format::header`]); they only differ where the format allows it,
//! namely sizes deferred to a data descriptor or moved into the Zip64 extra
//! block.

use crate::archive_path::strip_root;
use crate::extra::{AES_TAG, ExtraData, ExtendedUnixData, MAX_EXTRA_LENGTH, NtTaggedData, ZIP64_TAG};
use crate::timestamp::DateTime;
use crate::{Error, Result};

/// General purpose bit flags.
pub mod flags {
    /// Bit 0: the entry data is encrypted.
    pub const ENCRYPTED: u16 = 0x0001;
    /// Bit 3: CRC and sizes follow the data in a descriptor.
    pub const DESCRIPTOR: u16 = 0x0008;
    /// Bit 11: name and comment are UTF-8.
    pub const UNICODE_TEXT: u16 = 0x0800;
}

/// Host system identifiers stored in the high byte of "version made by".
pub mod host {
    /// MS-DOS and OS/2 (FAT file systems).
    pub const MSDOS: u8 = 0;
    /// Unix.
    pub const UNIX: u8 = 3;
    /// Windows NTFS.
    pub const NTFS: u8 = 10;
}

/// Value at or above which a size or offset moves to the Zip64 extra block.
pub const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// The "version made by" written for new entries.
pub const VERSION_MADE_BY: u16 = 51;

/// MS-DOS directory attribute.
pub(crate) const DOS_DIRECTORY_ATTRIBUTE: i32 = 0x10;

/// Length of the WinZip AES authentication code.
pub(crate) const AES_AUTH_CODE_LENGTH: u64 = 10;

/// Length of the WinZip AES password verifier.
pub(crate) const AES_VERIFIER_LENGTH: u64 = 2;

/// Length of the classic ZipCrypto header.
pub(crate) const ZIPCRYPTO_HEADER_LENGTH: u64 = 12;

/// ZIP compression methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// No compression.
    Stored,
    /// DEFLATE.
    Deflated,
    /// Enhanced DEFLATE (read only by other tools; not supported here).
    Deflate64,
    /// BZip2.
    BZip2,
    /// LZMA (not supported).
    Lzma,
    /// The WinZip AES placeholder method written in headers.
    WinZipAes,
    /// Any other method number.
    Other(u16),
}

impl CompressionMethod {
    /// Maps a header method number.
    pub fn from_u16(method: u16) -> Self {
        match method {
            0 => Self::Stored,
            8 => Self::Deflated,
            9 => Self::Deflate64,
            12 => Self::BZip2,
            14 => Self::Lzma,
            99 => Self::WinZipAes,
            other => Self::Other(other),
        }
    }

    /// The header method number.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
            Self::Deflate64 => 9,
            Self::BZip2 => 12,
            Self::Lzma => 14,
            Self::WinZipAes => 99,
            Self::Other(other) => other,
        }
    }

    /// Returns `true` if this build can compress and decompress the method.
    pub fn is_supported(self) -> bool {
        match self {
            Self::Stored | Self::Deflated => true,
            Self::BZip2 => cfg!(feature = "bzip2"),
            _ => false,
        }
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stored => write!(f, "Stored"),
            Self::Deflated => write!(f, "Deflated"),
            Self::Deflate64 => write!(f, "Deflate64"),
            Self::BZip2 => write!(f, "BZip2"),
            Self::Lzma => write!(f, "LZMA"),
            Self::WinZipAes => write!(f, "WinZipAES"),
            Self::Other(m) => write!(f, "Method({m})"),
        }
    }
}

/// One archive member.
///
/// Sizes are `-1` until known. For AES-encrypted entries
/// [`compression_method`](Self::compression_method) is the real method; the
/// headers carry method 99 and the real one inside the 0x9901 block.
///
/// # Examples
///
/// ```rust
/// use zipwright::{CompressionMethod, ZipEntry};
///
/// let mut entry = ZipEntry::new("docs/readme.txt")?;
/// entry.set_compression_method(CompressionMethod::Stored);
/// assert_eq!(entry.size(), -1);
/// assert!(!entry.is_directory());
/// assert_eq!(entry.version_needed(), 10);
/// # Ok::<(), zipwright::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    name: String,
    method: CompressionMethod,
    crc: Option<u32>,
    size: i64,
    compressed_size: i64,
    dos_time: u32,
    modified: Option<DateTime>,
    flags: u16,
    extra: Vec<u8>,
    external_attributes: i32,
    comment: Option<String>,
    aes_key_size: u16,
    aes_vendor_version: u16,
    offset: u64,
    version_made_by: u16,
    version_to_extract: u16,
    force_zip64: bool,
    unsupported: Option<&'static str>,
}

impl ZipEntry {
    /// Creates an entry with Deflated compression, unknown sizes and the
    /// current time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NameTooLong`] for names above 65535 bytes.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_name(&name)?;
        Ok(Self {
            name,
            method: CompressionMethod::Deflated,
            crc: None,
            size: -1,
            compressed_size: -1,
            dos_time: DateTime::now().to_dos(),
            modified: None,
            flags: 0,
            extra: Vec::new(),
            external_attributes: -1,
            comment: None,
            aes_key_size: 0,
            aes_vendor_version: 2,
            offset: 0,
            version_made_by: VERSION_MADE_BY,
            version_to_extract: 0,
            force_zip64: false,
            unsupported: None,
        })
    }

    /// Creates an entry from header fields. Used by the header parsers.
    pub(crate) fn from_header(
        name: String,
        version_made_by: u16,
        version_to_extract: u16,
        method: u16,
    ) -> Self {
        Self {
            name,
            method: CompressionMethod::from_u16(method),
            crc: None,
            size: -1,
            compressed_size: -1,
            dos_time: 0,
            modified: None,
            flags: 0,
            extra: Vec::new(),
            external_attributes: -1,
            comment: None,
            aes_key_size: 0,
            aes_vendor_version: 2,
            offset: 0,
            version_made_by,
            version_to_extract,
            force_zip64: false,
            unsupported: None,
        }
    }

    /// Cleans a host path into a member name: backslashes become `/`, and
    /// drive letters, UNC prefixes and leading slashes are removed.
    pub fn clean_name(name: &str) -> String {
        strip_root(&name.replace('\\', "/")).to_string()
    }

    /// The member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the entry.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        check_name(&name)?;
        self.name = name;
        Ok(())
    }

    /// Returns `true` if the name ends with `/` or the MS-DOS directory
    /// attribute is set.
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
            || (self.host_system() == host::MSDOS
                && self.external_attributes != -1
                && self.external_attributes & DOS_DIRECTORY_ATTRIBUTE != 0)
    }

    /// Returns `true` for anything that is not a directory.
    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    /// The compression method (the real one for AES entries).
    pub fn compression_method(&self) -> CompressionMethod {
        self.method
    }

    /// Sets the compression method.
    pub fn set_compression_method(&mut self, method: CompressionMethod) {
        self.method = method;
    }

    /// The method number written in headers.
    pub(crate) fn header_method(&self) -> u16 {
        if self.aes_key_size > 0 {
            CompressionMethod::WinZipAes.as_u16()
        } else {
            self.method.as_u16()
        }
    }

    /// CRC-32 of the uncompressed data, if known.
    pub fn crc(&self) -> Option<u32> {
        self.crc
    }

    /// Sets the CRC-32.
    pub fn set_crc(&mut self, crc: u32) {
        self.crc = Some(crc);
    }

    /// Forgets the CRC-32.
    pub fn clear_crc(&mut self) {
        self.crc = None;
    }

    /// Returns `true` if the CRC-32 is known.
    pub fn has_crc(&self) -> bool {
        self.crc.is_some()
    }

    /// Uncompressed size, `-1` if unknown.
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Sets the uncompressed size. Negative values mean unknown.
    pub fn set_size(&mut self, size: i64) {
        self.size = size.max(-1);
    }

    /// Compressed size including encryption overhead, `-1` if unknown.
    pub fn compressed_size(&self) -> i64 {
        self.compressed_size
    }

    /// Sets the compressed size. Negative values mean unknown.
    pub fn set_compressed_size(&mut self, size: i64) {
        self.compressed_size = size.max(-1);
    }

    /// The packed MS-DOS modification time.
    pub fn dos_time(&self) -> u32 {
        self.dos_time
    }

    /// Sets the packed MS-DOS modification time.
    pub fn set_dos_time(&mut self, dos_time: u32) {
        self.dos_time = dos_time;
        self.modified = None;
    }

    /// The modification time as stored in the DOS field.
    pub fn date_time(&self) -> DateTime {
        DateTime::from_dos(self.dos_time)
    }

    /// Sets the modification time. Values outside the DOS range clamp.
    pub fn set_date_time(&mut self, value: DateTime) {
        self.dos_time = value.to_dos();
        self.modified = None;
    }

    /// The most precise modification time available: NTFS, then extended
    /// Unix timestamp, then the DOS field.
    pub fn modified_time(&self) -> DateTime {
        self.modified.unwrap_or_else(|| self.date_time())
    }

    /// General purpose flags.
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Overrides the general purpose flags.
    pub fn set_flags(&mut self, flags: u16) {
        self.flags = flags;
    }

    fn set_flag(&mut self, flag: u16, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    /// Returns `true` if the entry is encrypted (classic or AES).
    pub fn is_crypted(&self) -> bool {
        self.flags & flags::ENCRYPTED != 0
    }

    /// Marks the entry as encrypted.
    pub fn set_crypted(&mut self, crypted: bool) {
        self.set_flag(flags::ENCRYPTED, crypted);
    }

    /// Returns `true` if name and comment are stored as UTF-8.
    pub fn is_unicode_text(&self) -> bool {
        self.flags & flags::UNICODE_TEXT != 0
    }

    /// Stores name and comment as UTF-8.
    pub fn set_unicode_text(&mut self, unicode: bool) {
        self.set_flag(flags::UNICODE_TEXT, unicode);
    }

    /// Returns `true` if CRC and sizes follow the data in a descriptor.
    pub fn has_descriptor(&self) -> bool {
        self.flags & flags::DESCRIPTOR != 0
    }

    pub(crate) fn set_descriptor(&mut self, descriptor: bool) {
        self.set_flag(flags::DESCRIPTOR, descriptor);
    }

    /// Raw extra-field bytes.
    pub fn extra(&self) -> &[u8] {
        &self.extra
    }

    /// Replaces the extra field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExtraDataTooLong`] above 65535 bytes.
    pub fn set_extra(&mut self, extra: &[u8]) -> Result<()> {
        if extra.len() > MAX_EXTRA_LENGTH {
            return Err(Error::ExtraDataTooLong { length: extra.len() });
        }
        self.extra = extra.to_vec();
        Ok(())
    }

    /// A cursor over the extra field.
    pub fn extra_data(&self) -> ExtraData {
        ExtraData::from_bytes(&self.extra)
    }

    /// External file attributes, `-1` if unset.
    pub fn external_attributes(&self) -> i32 {
        self.external_attributes
    }

    /// Sets the external file attributes.
    pub fn set_external_attributes(&mut self, attributes: i32) {
        self.external_attributes = attributes;
    }

    /// The entry comment.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Sets or clears the entry comment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommentTooLong`] above 65535 bytes.
    pub fn set_comment(&mut self, comment: Option<String>) -> Result<()> {
        if let Some(text) = &comment {
            if text.len() > 0xFFFF {
                return Err(Error::CommentTooLong { length: text.len() });
            }
        }
        self.comment = comment;
        Ok(())
    }

    /// AES key size in bits, `0` when AES is not used.
    pub fn aes_key_size(&self) -> u16 {
        self.aes_key_size
    }

    /// Selects AES encryption with the given key size.
    ///
    /// # Errors
    ///
    /// Only `0`, `128` and `256` are accepted.
    pub fn set_aes_key_size(&mut self, bits: u16) -> Result<()> {
        match bits {
            0 | 128 | 256 => {
                self.aes_key_size = bits;
                Ok(())
            }
            other => Err(Error::InvalidArgument(format!(
                "AES key size {other} is not supported, use 0, 128 or 256"
            ))),
        }
    }

    /// AE-1 or AE-2.
    pub fn aes_vendor_version(&self) -> u16 {
        self.aes_vendor_version
    }

    /// WinZip AES strength code: 1 for 128-bit, 3 for 256-bit.
    pub(crate) fn aes_strength(&self) -> u8 {
        match self.aes_key_size {
            128 => 1,
            256 => 3,
            _ => 0,
        }
    }

    /// Salt length for the AES key size.
    pub(crate) fn aes_salt_length(&self) -> u64 {
        u64::from(self.aes_key_size / 16)
    }

    /// Bytes added to the compressed data by encryption.
    pub fn encryption_overhead(&self) -> u64 {
        if !self.is_crypted() {
            0
        } else if self.aes_key_size > 0 {
            self.aes_salt_length() + AES_VERIFIER_LENGTH + AES_AUTH_CODE_LENGTH
        } else {
            ZIPCRYPTO_HEADER_LENGTH
        }
    }

    /// Offset of the local header, relative to the archive start.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// "Version made by": host system in the high byte.
    pub fn version_made_by(&self) -> u16 {
        self.version_made_by
    }

    /// The host system that created the entry.
    pub fn host_system(&self) -> u8 {
        (self.version_made_by >> 8) as u8
    }

    /// Sets the host system.
    pub fn set_host_system(&mut self, system: u8) {
        self.version_made_by = (self.version_made_by & 0xFF) | (u16::from(system) << 8);
    }

    /// Minimum version needed to extract.
    ///
    /// Entries read from an archive report the stored value; new entries
    /// compute it from their features.
    pub fn version_needed(&self) -> u16 {
        if self.version_to_extract != 0 {
            return self.version_to_extract & 0xFF;
        }
        self.required_version()
    }

    /// Drops the version read from a header so it is recomputed.
    pub(crate) fn clear_stored_version(&mut self) {
        self.version_to_extract = 0;
    }

    /// Version computed from the features the entry uses.
    pub(crate) fn required_version(&self) -> u16 {
        if self.aes_key_size > 0 {
            51
        } else if self.method == CompressionMethod::BZip2 {
            46
        } else if self.central_header_requires_zip64() {
            45
        } else if self.method == CompressionMethod::Deflated
            || self.is_directory()
            || self.is_crypted()
        {
            20
        } else {
            10
        }
    }

    /// Returns `true` if this build can extract the entry.
    pub fn can_decompress(&self) -> bool {
        self.unsupported.is_none()
            && matches!(self.version_needed(), 10 | 11 | 20 | 45 | 46 | 51)
            && self.method.is_supported()
    }

    /// The feature that keeps this entry from being extracted, if the
    /// headers named one this build does not handle (such as AES-192).
    pub fn unsupported_feature(&self) -> Option<&'static str> {
        self.unsupported
    }

    /// Forces Zip64 headers regardless of size.
    pub fn force_zip64(&mut self) {
        self.force_zip64 = true;
    }

    /// Returns `true` if Zip64 headers were forced.
    pub fn is_zip64_forced(&self) -> bool {
        self.force_zip64
    }

    /// Returns `true` if the local header needs a Zip64 extra block.
    ///
    /// Entries read from an archive only qualify when their stored version
    /// allows Zip64.
    pub fn local_header_requires_zip64(&self) -> bool {
        if self.force_zip64 {
            return true;
        }
        let large = self.size.max(0) as u64 >= ZIP64_THRESHOLD
            || self.compressed_size.max(0) as u64 >= ZIP64_THRESHOLD;
        large && (self.version_to_extract == 0 || self.version_to_extract >= 45)
    }

    /// Returns `true` if the central header needs a Zip64 extra block.
    pub fn central_header_requires_zip64(&self) -> bool {
        self.local_header_requires_zip64() || self.offset >= ZIP64_THRESHOLD
    }

    /// Interprets the extra field after a header was parsed.
    ///
    /// Zip64 values replace the `0xFFFFFFFF` placeholders in the order size,
    /// compressed size, offset. The 0x9901 block turns method 99 into the
    /// real method, and NTFS or extended Unix times refine the DOS time.
    pub(crate) fn process_extra_data(&mut self, local: bool) -> Result<()> {
        let mut extra = ExtraData::from_bytes(&self.extra);
        let size_placeholder = self.size == ZIP64_THRESHOLD as i64;
        let compressed_placeholder = self.compressed_size == ZIP64_THRESHOLD as i64;
        let offset_placeholder = !local && self.offset == ZIP64_THRESHOLD;

        if extra.find(ZIP64_TAG) {
            self.force_zip64 = true;
            let truncated =
                |_| Error::MalformedArchive(format!("truncated Zip64 extra field for '{}'", self.name));
            let mut size = self.size;
            let mut compressed = self.compressed_size;
            let mut offset = self.offset;
            if size_placeholder {
                size = extra.read_long().map_err(truncated)?;
            }
            if compressed_placeholder {
                compressed = extra.read_long().map_err(truncated)?;
            }
            if offset_placeholder {
                offset = extra.read_long().map_err(truncated)? as u64;
            }
            if size < 0 || compressed < 0 {
                return Err(Error::MalformedArchive(format!(
                    "negative Zip64 size for '{}'",
                    self.name
                )));
            }
            self.size = size;
            self.compressed_size = compressed;
            self.offset = offset;
        } else if size_placeholder || compressed_placeholder || offset_placeholder {
            return Err(Error::MalformedArchive(format!(
                "Zip64 placeholder without Zip64 extra field for '{}'",
                self.name
            )));
        }

        self.modified = extended_time(&mut extra);

        if self.method == CompressionMethod::WinZipAes {
            self.process_aes_extra(&mut extra)?;
        }
        Ok(())
    }

    fn process_aes_extra(&mut self, extra: &mut ExtraData) -> Result<()> {
        if !extra.find(AES_TAG) {
            return Err(Error::MalformedArchive(format!(
                "AES extra field missing for '{}'",
                self.name
            )));
        }
        if extra.value_length() < 7 {
            return Err(Error::MalformedArchive(format!(
                "AES extra field too short for '{}'",
                self.name
            )));
        }
        let vendor_version = extra.read_short()?;
        let vendor_id = extra.read_short()?;
        let strength = extra.read_byte().unwrap_or(0);
        let real_method = extra.read_short()?;
        // Unsupported parameters only disable this entry.
        let key_size = if vendor_id != u16::from_le_bytes(*b"AE") || !matches!(vendor_version, 1 | 2) {
            Err("unrecognised AES vendor parameters")
        } else {
            match strength {
                1 => Ok(128),
                3 => Ok(256),
                2 => Err("AES-192 encryption"),
                _ => Err("unknown AES strength"),
            }
        };
        match key_size {
            Ok(bits) => self.aes_key_size = bits,
            Err(feature) => {
                log::debug!("entry '{}' uses {feature}", self.name);
                self.unsupported = Some(feature);
                return Ok(());
            }
        }
        self.aes_vendor_version = vendor_version;
        self.method = CompressionMethod::from_u16(real_method);
        Ok(())
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.len() > 0xFFFF {
        return Err(Error::NameTooLong {
            length: name.len(),
            max: 0xFFFF,
        });
    }
    Ok(())
}

fn extended_time(extra: &mut ExtraData) -> Option<DateTime> {
    if let Ok(Some(ntfs)) = extra.get_data::<NtTaggedData>() {
        let filetime = ntfs.last_modification_time();
        if filetime.as_filetime() != 0 {
            return Some(filetime.to_date_time());
        }
    }
    if let Ok(Some(unix)) = extra.get_data::<ExtendedUnixData>() {
        if unix.flags() & crate::extra::unix_flags::MODIFICATION_TIME != 0 {
            return Some(unix.modification_time());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extra::RawTaggedData;
    use crate::extra::TaggedData;

    fn entry(name: &str) -> ZipEntry {
        ZipEntry::new(name).unwrap()
    }

    #[test]
    fn test_defaults() {
        let e = entry("Namu");
        assert_eq!(e.compression_method(), CompressionMethod::Deflated);
        assert_eq!(e.size(), -1);
        assert_eq!(e.compressed_size(), -1);
        assert_eq!(e.crc(), None);
        assert_eq!(e.external_attributes(), -1);
        assert_eq!(e.host_system(), host::MSDOS);
        assert_eq!(e.version_made_by(), VERSION_MADE_BY);
        assert!(e.comment().is_none());
    }

    #[test]
    fn test_clone_is_equal() {
        let mut source = entry("Namu");
        source.set_crc(3456);
        source.set_comment(Some("A comment".into())).unwrap();
        source.set_size(99_874_276);
        source.set_compressed_size(72_347);
        source.set_extra(&[0x00, 0x01, 0x00, 0x02, 0xEF, 0xFE]).unwrap();
        source.set_flags(4567);
        source.set_dos_time(23_434_536);
        let clone = source.clone();
        assert_eq!(clone, source);
        assert_eq!(clone.dos_time(), 23_434_536);
    }

    #[test]
    fn test_name_too_long() {
        assert!(ZipEntry::new("x".repeat(0xFFFF)).is_ok());
        assert!(matches!(
            ZipEntry::new("x".repeat(0x10000)),
            Err(Error::NameTooLong { .. })
        ));
    }

    #[test]
    fn test_date_and_time() {
        let mut e = entry("Pok");
        e.set_dos_time(u32::MAX);
        assert_eq!(e.date_time(), DateTime::new(2107, 12, 31, 23, 59, 59).unwrap());

        e.set_dos_time(1);
        assert_eq!(e.date_time(), DateTime::new(1980, 1, 1, 0, 0, 2).unwrap());

        e.set_date_time(DateTime::new(2108, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(e.date_time(), DateTime::new(2107, 12, 31, 23, 59, 58).unwrap());

        e.set_date_time(DateTime::new(1906, 12, 4, 0, 0, 0).unwrap());
        assert_eq!(e.date_time(), DateTime::DOS_MIN);
    }

    #[test]
    fn test_date_time_sets_dos_time() {
        let mut e = entry("Pok");
        e.set_dos_time(0);
        let target = DateTime::new(1987, 9, 12, 0, 0, 0).unwrap();
        e.set_date_time(target);
        assert_ne!(e.dos_time(), 0);
        assert_eq!(e.date_time(), target);
    }

    #[test]
    fn test_is_directory() {
        assert!(entry("dir/").is_directory());
        assert!(!entry("file").is_directory());
        let mut e = entry("dosdir");
        e.set_external_attributes(DOS_DIRECTORY_ATTRIBUTE);
        assert!(e.is_directory());
    }

    #[test]
    fn test_version_needed() {
        let mut e = entry("a");
        e.set_compression_method(CompressionMethod::Stored);
        assert_eq!(e.version_needed(), 10);
        e.set_compression_method(CompressionMethod::Deflated);
        assert_eq!(e.version_needed(), 20);
        e.set_compression_method(CompressionMethod::BZip2);
        assert_eq!(e.version_needed(), 46);
        e.set_compression_method(CompressionMethod::Stored);
        e.set_size(0xFFFF_FFFF);
        assert_eq!(e.version_needed(), 45);
        e.set_aes_key_size(256).unwrap();
        assert_eq!(e.version_needed(), 51);
    }

    #[test]
    fn test_can_decompress() {
        let e = ZipEntry::from_header("a".into(), 20, 10, 8);
        assert!(e.can_decompress());
        let e = ZipEntry::from_header("a".into(), 20, 45, 0);
        assert!(e.can_decompress());
        let e = ZipEntry::from_header("a".into(), 20, 99, 8);
        assert!(!e.can_decompress());
        let e = ZipEntry::from_header("a".into(), 20, 20, 14);
        assert!(!e.can_decompress());
    }

    #[test]
    fn test_aes_key_size_validation() {
        let mut e = entry("a");
        assert!(e.set_aes_key_size(128).is_ok());
        assert!(matches!(e.set_aes_key_size(192), Err(Error::InvalidArgument(_))));
        assert_eq!(e.aes_key_size(), 128);
    }

    #[test]
    fn test_encryption_overhead() {
        let mut e = entry("a");
        assert_eq!(e.encryption_overhead(), 0);
        e.set_crypted(true);
        assert_eq!(e.encryption_overhead(), 12);
        e.set_aes_key_size(128).unwrap();
        assert_eq!(e.encryption_overhead(), 8 + 2 + 10);
        e.set_aes_key_size(256).unwrap();
        assert_eq!(e.encryption_overhead(), 16 + 2 + 10);
    }

    #[test]
    fn test_zip64_boundary() {
        let mut e = entry("a");
        e.set_size(0xFFFF_FFFE);
        assert!(!e.local_header_requires_zip64());
        e.set_size(0xFFFF_FFFF);
        assert!(e.local_header_requires_zip64());

        let mut e = entry("b");
        e.set_offset(0xFFFF_FFFF);
        assert!(!e.local_header_requires_zip64());
        assert!(e.central_header_requires_zip64());
    }

    #[test]
    fn test_process_zip64_placeholders() {
        let mut e = ZipEntry::from_header("big".into(), 45, 45, 0);
        e.set_size(0xFFFF_FFFF);
        e.set_compressed_size(10);
        let mut extra = ExtraData::new();
        extra.start_new_entry();
        extra.add_le_long(0x1_0000_0000);
        extra.add_new_entry(ZIP64_TAG).unwrap();
        e.set_extra(extra.get_entry_data()).unwrap();
        e.process_extra_data(false).unwrap();
        assert_eq!(e.size(), 0x1_0000_0000);
        assert_eq!(e.compressed_size(), 10);
        assert!(e.is_zip64_forced());
    }

    #[test]
    fn test_placeholder_without_zip64_block() {
        let mut e = ZipEntry::from_header("big".into(), 45, 45, 0);
        e.set_compressed_size(0xFFFF_FFFF);
        assert!(matches!(
            e.process_extra_data(true),
            Err(Error::MalformedArchive(_))
        ));
    }

    #[test]
    fn test_process_aes_extra() {
        let mut e = ZipEntry::from_header("secret".into(), 51, 51, 99);
        let mut block = RawTaggedData::new(AES_TAG);
        block
            .set_data(&[0x02, 0x00, b'A', b'E', 0x03, 0x08, 0x00])
            .unwrap();
        let mut extra = ExtraData::new();
        extra.add_tagged(&block).unwrap();
        e.set_extra(extra.get_entry_data()).unwrap();
        e.process_extra_data(true).unwrap();
        assert_eq!(e.aes_key_size(), 256);
        assert_eq!(e.compression_method(), CompressionMethod::Deflated);
        assert_eq!(e.header_method(), 99);
    }

    #[test]
    fn test_aes_192_marks_entry_unsupported() {
        let mut e = ZipEntry::from_header("secret".into(), 51, 51, 99);
        let mut extra = ExtraData::new();
        extra
            .add(AES_TAG, Some(&[0x02, 0x00, b'A', b'E', 0x02, 0x08, 0x00]))
            .unwrap();
        e.set_extra(extra.get_entry_data()).unwrap();
        e.process_extra_data(true).unwrap();
        assert_eq!(e.unsupported_feature(), Some("AES-192 encryption"));
        assert!(!e.can_decompress());
        assert_eq!(e.aes_key_size(), 0);
    }

    #[test]
    fn test_unknown_aes_vendor_marks_entry() {
        let mut e = ZipEntry::from_header("secret".into(), 51, 51, 99);
        let mut extra = ExtraData::new();
        extra
            .add(AES_TAG, Some(&[0x07, 0x00, b'X', b'Y', 0x03, 0x08, 0x00]))
            .unwrap();
        e.set_extra(extra.get_entry_data()).unwrap();
        e.process_extra_data(false).unwrap();
        assert_eq!(e.unsupported_feature(), Some("unrecognised AES vendor parameters"));
        assert!(!e.can_decompress());
    }

    #[test]
    fn test_modified_time_prefers_unix_block() {
        let mut e = entry("t");
        e.set_date_time(DateTime::new(2000, 1, 1, 0, 0, 0).unwrap());
        let mut unix = ExtendedUnixData::default();
        let when = DateTime::new(2010, 6, 15, 12, 30, 45).unwrap();
        unix.set_modification_time(when).unwrap();
        let mut extra = ExtraData::new();
        extra.add_tagged(&unix).unwrap();
        e.set_extra(extra.get_entry_data()).unwrap();
        e.process_extra_data(true).unwrap();
        assert_eq!(e.modified_time(), when);
        assert_eq!(e.date_time(), DateTime::new(2000, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(ZipEntry::clean_name("c:\\dir\\file.txt"), "dir/file.txt");
        assert_eq!(ZipEntry::clean_name("/abs/file"), "abs/file");
        assert_eq!(ZipEntry::clean_name("rel/file"), "rel/file");
    }

    #[test]
    fn test_comment_limit() {
        let mut e = entry("c");
        assert!(e.set_comment(None).is_ok());
        assert!(matches!(
            e.set_comment(Some("x".repeat(0x10000))),
            Err(Error::CommentTooLong { .. })
        ));
    }
}
