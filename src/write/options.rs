//! Write options and configuration for archive creation.

use crate::crypto::{EncryptionMethod, Password};
use crate::encoding::StringCodec;
use crate::format::MAX_COMMENT_LENGTH;

/// Default compression level, matching zlib's default.
pub const DEFAULT_LEVEL: u32 = 6;

/// When the writer emits Zip64 extensions for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UseZip64 {
    /// Never. Entries reaching 4 GiB fail with
    /// [`Error::EntryTooLarge`](crate::Error::EntryTooLarge).
    Off,
    /// Always write a Zip64 local header and Zip64 end records.
    On,
    /// When the size is known to need it, or is unknown up front.
    #[default]
    Dynamic,
}

/// Options for creating archives.
#[derive(Clone)]
pub struct WriteOptions {
    /// Compression level (0-9).
    pub level: u32,
    /// Password for encrypting entries.
    pub password: Option<Password>,
    /// Encryption applied when a password is set.
    pub encryption: EncryptionMethod,
    /// Zip64 policy.
    pub use_zip64: UseZip64,
    /// Archive comment.
    pub comment: Option<String>,
    /// Name and comment encoding.
    pub string_codec: StringCodec,
    /// Whether the writer owns the underlying stream.
    pub stream_owner: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            password: None,
            encryption: EncryptionMethod::default(),
            use_zip64: UseZip64::default(),
            comment: None,
            string_codec: StringCodec::default(),
            stream_owner: true,
        }
    }
}

impl std::fmt::Debug for WriteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteOptions")
            .field("level", &self.level)
            .field("has_password", &self.password.is_some())
            .field("encryption", &self.encryption)
            .field("use_zip64", &self.use_zip64)
            .field("comment", &self.comment)
            .field("stream_owner", &self.stream_owner)
            .finish()
    }
}

impl WriteOptions {
    /// Creates new write options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compression level (strict validation).
    ///
    /// Level 0 stores deflate blocks without compression; 9 is the slowest
    /// and smallest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCompressionLevel`](crate::Error::InvalidCompressionLevel)
    /// if `level` is greater than 9.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zipwright::write::WriteOptions;
    ///
    /// let opts = WriteOptions::new().level(9)?;
    /// assert_eq!(opts.level, 9);
    /// assert!(WriteOptions::new().level(15).is_err());
    /// # Ok::<(), zipwright::Error>(())
    /// ```
    pub fn level(mut self, level: u32) -> crate::Result<Self> {
        if level > 9 {
            return Err(crate::Error::InvalidCompressionLevel { level });
        }
        self.level = level;
        Ok(self)
    }

    /// Sets the compression level, clamping values above 9.
    pub fn level_clamped(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Sets the password. Entries are encrypted with
    /// [`encryption`](Self::encryption), AES-256 unless changed.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the encryption method used when a password is set.
    pub fn encryption(mut self, method: EncryptionMethod) -> Self {
        self.encryption = method;
        self
    }

    /// Sets the Zip64 policy.
    pub fn use_zip64(mut self, mode: UseZip64) -> Self {
        self.use_zip64 = mode;
        self
    }

    /// Sets the archive comment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommentTooLong`](crate::Error::CommentTooLong) if the
    /// comment encodes to more than 65535 bytes.
    pub fn comment(mut self, comment: impl Into<String>) -> crate::Result<Self> {
        let comment = comment.into();
        let length = self.string_codec.encode(&comment, false).len();
        if length > MAX_COMMENT_LENGTH {
            return Err(crate::Error::CommentTooLong { length });
        }
        self.comment = Some(comment);
        Ok(self)
    }

    /// Sets the name and comment encoding.
    pub fn string_codec(mut self, codec: StringCodec) -> Self {
        self.string_codec = codec;
        self
    }

    /// Sets whether the writer owns the underlying stream.
    ///
    /// An owning writer drops the stream when a fatal error occurs and
    /// [`ZipWriter::into_inner`](super::ZipWriter::into_inner) then returns
    /// `None`.
    pub fn stream_owner(mut self, owner: bool) -> Self {
        self.stream_owner = owner;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = WriteOptions::default();
        assert_eq!(opts.level, DEFAULT_LEVEL);
        assert!(opts.password.is_none());
        assert_eq!(opts.use_zip64, UseZip64::Dynamic);
        assert!(opts.stream_owner);
        assert_eq!(opts.encryption, EncryptionMethod::Aes256);
    }

    #[test]
    fn test_level_validation() {
        assert!(WriteOptions::new().level(0).is_ok());
        assert!(matches!(
            WriteOptions::new().level(10),
            Err(crate::Error::InvalidCompressionLevel { level: 10 })
        ));
        assert_eq!(WriteOptions::new().level_clamped(42).level, 9);
    }

    #[test]
    fn test_comment_limit() {
        assert!(WriteOptions::new().comment("a".repeat(0xFFFF)).is_ok());
        assert!(matches!(
            WriteOptions::new().comment("a".repeat(0x10000)),
            Err(crate::Error::CommentTooLong { length: 0x10000 })
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let opts = WriteOptions::new().password("hunter2");
        let debug = format!("{opts:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("has_password: true"));
    }
}
