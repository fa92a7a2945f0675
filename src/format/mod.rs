//! ZIP record signatures, fixed sizes and low-level parsing utilities.
//!
//! All multi-byte fields are little-endian. The record layouts live in
//! [`header`] (local header, central directory header, data descriptor) and
//! [`eocd`] (end of central directory, Zip64 record and locator).

pub mod eocd;
pub mod header;

use std::io;

use crate::Error;

/// Local file header signature, `PK\x03\x04`.
pub const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

/// Data descriptor signature, `PK\x07\x08`. Optional on read.
pub const DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

/// Central directory header signature, `PK\x01\x02`.
pub const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;

/// End of central directory signature, `PK\x05\x06`.
pub const EOCD_SIGNATURE: u32 = 0x0605_4b50;

/// Zip64 end of central directory record signature, `PK\x06\x06`.
pub const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4b50;

/// Zip64 end of central directory locator signature, `PK\x06\x07`.
pub const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;

/// Fixed part of a local file header.
pub const LOCAL_HEADER_SIZE: u64 = 30;

/// Fixed part of a central directory header.
pub const CENTRAL_HEADER_SIZE: u64 = 46;

/// Fixed part of the end of central directory record.
pub const EOCD_SIZE: u64 = 22;

/// Zip64 end of central directory record without extensible data.
pub const ZIP64_EOCD_SIZE: u64 = 56;

/// Zip64 end of central directory locator.
pub const ZIP64_LOCATOR_SIZE: u64 = 20;

/// Longest archive or entry comment.
pub const MAX_COMMENT_LENGTH: usize = 0xFFFF;

/// Placeholder for a 32-bit field whose value lives in the Zip64 block.
pub(crate) const ZIP64_PLACEHOLDER_U32: u32 = 0xFFFF_FFFF;

/// Placeholder for a 16-bit count whose value lives in the Zip64 record.
pub(crate) const ZIP64_PLACEHOLDER_U16: u16 = 0xFFFF;

/// Version needed to extract Zip64 records.
pub(crate) const VERSION_ZIP64: u16 = 45;

/// Maps an I/O error while parsing a record: running out of data means the
/// archive is malformed, anything else is passed through.
pub(crate) fn truncated(record: &'static str) -> impl Fn(io::Error) -> Error {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::MalformedArchive(format!("truncated {record}"))
        } else {
            Error::Io(e)
        }
    }
}

/// Narrows a 64-bit value for a 32-bit field, using the placeholder when it
/// does not fit.
pub(crate) fn narrow_u32(value: u64) -> u32 {
    u32::try_from(value)
        .ok()
        .filter(|&v| v != ZIP64_PLACEHOLDER_U32)
        .unwrap_or(ZIP64_PLACEHOLDER_U32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signatures_are_pk() {
        for sig in [
            LOCAL_HEADER_SIGNATURE,
            DESCRIPTOR_SIGNATURE,
            CENTRAL_HEADER_SIGNATURE,
            EOCD_SIGNATURE,
            ZIP64_EOCD_SIGNATURE,
            ZIP64_LOCATOR_SIGNATURE,
        ] {
            assert_eq!(&sig.to_le_bytes()[..2], b"PK");
        }
    }

    #[test]
    fn test_narrow_u32() {
        assert_eq!(narrow_u32(0xFFFF_FFFE), 0xFFFF_FFFE);
        assert_eq!(narrow_u32(0xFFFF_FFFF), ZIP64_PLACEHOLDER_U32);
        assert_eq!(narrow_u32(1 << 40), ZIP64_PLACEHOLDER_U32);
    }

    #[test]
    fn test_truncated_mapping() {
        let map = truncated("local header");
        let err = map(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, Error::MalformedArchive(ref m) if m == "truncated local header"));
        let err = map(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::Io(_)));
    }
}
