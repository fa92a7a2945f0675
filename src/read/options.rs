//! Options for reading archives.

use crate::crypto::Password;
use crate::encoding::StringCodec;

/// Options shared by [`ZipReader`](super::ZipReader) and
/// [`ZipArchive`](crate::ZipArchive).
#[derive(Clone, Default)]
pub struct ReadOptions {
    /// Password for encrypted entries.
    pub password: Option<Password>,
    /// Encoding used for names without the UTF-8 flag.
    pub string_codec: StringCodec,
    /// Whether the reader owns the underlying stream.
    ///
    /// An owning reader releases the stream after a fatal error.
    pub stream_owner: bool,
}

impl std::fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOptions")
            .field("has_password", &self.password.is_some())
            .field("string_codec", &self.string_codec)
            .field("stream_owner", &self.stream_owner)
            .finish()
    }
}

impl ReadOptions {
    /// Creates options with no password and the default legacy encoding.
    pub fn new() -> Self {
        Self {
            stream_owner: true,
            ..Self::default()
        }
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

    /// Sets whether the reader owns the underlying stream.
    pub fn stream_owner(mut self, owner: bool) -> Self {
        self.stream_owner = owner;
        self
    }
}
