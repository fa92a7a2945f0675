//! Entry name and comment encoding.
//!
//! ZIP stores names either as UTF-8 (general purpose flag bit 11 set) or in
//! a legacy single-byte code page chosen by the archiver. [`StringCodec`]
//! decides which one applies to each header and converts in both directions.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::entry::flags;

/// Converts names and comments between `String` and header bytes.
///
/// The default legacy encoding is windows-1252; ASCII round-trips
/// identically under every supported code page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringCodec {
    legacy: &'static Encoding,
    force_legacy: bool,
}

impl Default for StringCodec {
    fn default() -> Self {
        Self {
            legacy: WINDOWS_1252,
            force_legacy: false,
        }
    }
}

impl StringCodec {
    /// Creates a codec with the default legacy encoding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a codec whose legacy encoding is given by a WHATWG label
    /// such as `"windows-1251"` or `"shift_jis"`.
    pub fn from_label(label: &str) -> Option<Self> {
        Encoding::for_label(label.as_bytes()).map(Self::from_encoding)
    }

    /// Creates a codec with the given legacy encoding.
    pub fn from_encoding(legacy: &'static Encoding) -> Self {
        Self {
            legacy,
            force_legacy: false,
        }
    }

    /// Never emit UTF-8 names, even for non-ASCII text.
    pub fn force_legacy(mut self, force: bool) -> Self {
        self.force_legacy = force;
        self
    }

    /// Returns `true` if UTF-8 output is disabled.
    pub fn is_legacy_forced(&self) -> bool {
        self.force_legacy
    }

    /// The legacy code page.
    pub fn legacy_encoding(&self) -> &'static Encoding {
        self.legacy
    }

    /// The encoding to write with, given whether the unicode flag is set.
    pub fn zip_encoding(&self, unicode: bool) -> &'static Encoding {
        if unicode { UTF_8 } else { self.legacy }
    }

    /// The encoding a header with `general_flags` was written in.
    pub fn zip_input_encoding(&self, general_flags: u16) -> &'static Encoding {
        self.zip_encoding(general_flags & flags::UNICODE_TEXT != 0)
    }

    /// Returns `true` if `text` needs the unicode flag to be stored exactly.
    pub fn requires_unicode(&self, text: &str) -> bool {
        !self.force_legacy && !text.is_ascii()
    }

    /// Decodes header bytes. Undecodable sequences become U+FFFD.
    pub fn decode(&self, bytes: &[u8], general_flags: u16) -> String {
        let (text, _had_errors) = self
            .zip_input_encoding(general_flags)
            .decode_without_bom_handling(bytes);
        text.into_owned()
    }

    /// Encodes text for a header. Unmappable characters become numeric
    /// character references in legacy code pages.
    pub fn encode(&self, text: &str, unicode: bool) -> Vec<u8> {
        if unicode || self.legacy == UTF_8 {
            return text.as_bytes().to_vec();
        }
        let (bytes, _, _had_errors) = self.legacy.encode(text);
        bytes.into_owned()
    }
}
