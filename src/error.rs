//! Error types for ZIP archive operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when working with ZIP archives, along with a convenient
//! [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. You can
//! handle errors using pattern matching or the `?` operator:
//!
//! ## Using the `?` Operator
//!
//! ```rust,no_run
//! use zipwright::{Result, ZipArchive};
//!
//! fn list(path: &str) -> Result<()> {
//!     let archive = ZipArchive::open_path(path)?;
//!     for entry in archive.entries() {
//!         println!("{}", entry.name());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Exhaustive Error Matching
//!
//! For fine-grained error handling, match on specific error variants:
//!
//! ```rust,no_run
//! use zipwright::{Error, ZipArchive};
//!
//! fn read_first(path: &str) -> zipwright::Result<Vec<u8>> {
//!     let mut archive = ZipArchive::open_path(path)?;
//!     match archive.read_entry(0) {
//!         Ok(data) => Ok(data),
//!         Err(e @ Error::PasswordRequired { .. }) => {
//!             eprintln!("This entry is encrypted. Please provide a password.");
//!             Err(e)
//!         }
//!         Err(Error::CrcMismatch { entry_name, expected, actual }) => {
//!             eprintln!("{entry_name} is damaged ({expected:#x} != {actual:#x})");
//!             Err(Error::CrcMismatch { entry_name, expected, actual })
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```

use std::io;

/// How a wrong password was detected.
///
/// Use [`Error::PasswordRequired`] instead when no password was provided at
/// all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PasswordDetectionMethod {
    /// The two-byte WinZip AES password verifier did not match.
    Verifier,

    /// The last byte of the classic 12-byte encryption header did not match
    /// the CRC (or DOS time) check byte.
    CheckByte,
}

impl std::fmt::Display for PasswordDetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verifier => write!(f, "AES password verifier"),
            Self::CheckByte => write!(f, "encryption header check byte"),
        }
    }
}

/// Helper struct for formatting CrcMismatch error messages.
struct CrcMismatchDisplay<'a> {
    entry_name: &'a str,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRC mismatch")?;
        if !self.entry_name.is_empty() {
            write!(f, " for entry '{}'", self.entry_name)?;
        }
        write!(f, ": expected {:#010x}, got {:#010x}", self.expected, self.actual)
    }
}

/// The main error type for ZIP archive operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | Transport failures |
/// | Format | [`MalformedArchive`][Self::MalformedArchive], [`CorruptHeader`][Self::CorruptHeader] | Invalid archive data |
/// | Compatibility | [`UnsupportedMethod`][Self::UnsupportedMethod], [`UnsupportedFeature`][Self::UnsupportedFeature] | Missing features |
/// | Encryption | [`InvalidPassword`][Self::InvalidPassword], [`PasswordRequired`][Self::PasswordRequired], [`CryptoError`][Self::CryptoError] | Keys and passwords |
/// | Integrity | [`CrcMismatch`][Self::CrcMismatch], [`AuthenticationFailed`][Self::AuthenticationFailed] | Data corruption or tampering |
/// | Names | [`InvalidName`][Self::InvalidName], [`NameTooLong`][Self::NameTooLong] | Unsafe or oversized entry names |
/// | Usage | [`InvalidState`][Self::InvalidState], [`InvalidArgument`][Self::InvalidArgument] and friends | API misuse |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive structure is invalid.
    ///
    /// Returned when no end-of-central-directory record can be found, a
    /// record signature is wrong, a Zip64 placeholder has no Zip64 extra
    /// block, or declared sizes disagree with the data.
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    /// A header is corrupt or truncated at a known offset.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset where corruption was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The entry uses a compression method not supported by this build.
    ///
    /// Common method numbers:
    /// - `0`: Stored
    /// - `8`: Deflated
    /// - `9`: Deflate64
    /// - `12`: BZip2 (requires the `bzip2` feature)
    /// - `14`: LZMA
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The ZIP method number.
        method: u16,
    },

    /// A feature required by the archive is not supported.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// The supplied password is wrong.
    #[error("Invalid password for entry '{entry_name}' (detected by {detection})")]
    InvalidPassword {
        /// Name of the entry being decrypted.
        entry_name: String,
        /// How the mismatch was detected.
        detection: PasswordDetectionMethod,
    },

    /// The entry is encrypted but no password was supplied.
    #[error("Password required for entry '{entry_name}'")]
    PasswordRequired {
        /// Name of the encrypted entry.
        entry_name: String,
    },

    /// CRC-32 of the decoded data does not match the stored value.
    ///
    /// Reported at the end of the entry data, never earlier.
    #[error("{}", CrcMismatchDisplay { entry_name, expected: *expected, actual: *actual })]
    CrcMismatch {
        /// Name of the entry.
        entry_name: String,
        /// The CRC recorded in the archive.
        expected: u32,
        /// The CRC of the data actually produced.
        actual: u32,
    },

    /// The WinZip AES authentication code did not match.
    ///
    /// The ciphertext was modified after encryption.
    #[error("Authentication code mismatch for entry '{entry_name}'")]
    AuthenticationFailed {
        /// Name of the entry.
        entry_name: String,
    },

    /// An entry name is unsafe or cannot be represented.
    #[error("Invalid entry name '{name}': {reason}")]
    InvalidName {
        /// The offending name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A name or path exceeds the permitted length.
    #[error("Name too long: {length} exceeds maximum of {max}")]
    NameTooLong {
        /// Length of the name.
        length: usize,
        /// Maximum permitted length.
        max: usize,
    },

    /// A read went past the end of a buffer or extra-field block.
    #[error("Unexpected end of data: {0}")]
    UnexpectedEndOfData(String),

    /// The extra field would exceed 65535 bytes.
    #[error("Extra data too long: {length} bytes exceeds maximum of 65535")]
    ExtraDataTooLong {
        /// The length the extra field would have had.
        length: usize,
    },

    /// The operation is not valid in the current state.
    ///
    /// For example writing after [`ZipWriter::finish`](crate::ZipWriter::finish).
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// An argument is out of range or otherwise invalid.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An archive or entry comment exceeds 65535 bytes.
    #[error("Comment too long: {length} bytes exceeds maximum of 65535")]
    CommentTooLong {
        /// Encoded length of the comment.
        length: usize,
    },

    /// The compression level is outside `0..=9`.
    #[error("Invalid compression level {level}: expected 0..=9")]
    InvalidCompressionLevel {
        /// The rejected level.
        level: u32,
    },

    /// An entry grew past 4 GiB without a Zip64 local header.
    #[error("Entry '{name}' too large ({size} bytes) for a header without Zip64")]
    EntryTooLarge {
        /// Name of the entry.
        name: String,
        /// The size that overflowed.
        size: u64,
    },

    /// No entry with the given name exists.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// The requested name.
        name: String,
    },

    /// An entry with the given name already exists.
    #[error("Entry already exists: {name}")]
    EntryExists {
        /// The conflicting name.
        name: String,
    },

    /// A cryptographic primitive failed or was misused.
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    /// The operation was cancelled by an observer.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` if this error indicates damaged archive data.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::MalformedArchive(_)
                | Error::CorruptHeader { .. }
                | Error::CrcMismatch { .. }
                | Error::UnexpectedEndOfData(_)
        )
    }

    /// Returns `true` if this is an encryption-related error.
    ///
    /// Encryption errors include wrong passwords, missing passwords and
    /// crypto failures.
    pub fn is_encryption_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidPassword { .. }
                | Error::PasswordRequired { .. }
                | Error::CryptoError(_)
                | Error::AuthenticationFailed { .. }
        )
    }

    /// Returns `true` if the decoded data failed an integrity check.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Error::CrcMismatch { .. } | Error::AuthenticationFailed { .. }
        )
    }

    /// Returns `true` if this error is related to unsupported features or methods.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedMethod { .. } | Error::UnsupportedFeature { .. }
        )
    }

    /// Returns `true` if this error indicates a security issue.
    ///
    /// Security errors should generally cause extraction to abort unless
    /// the archive source is fully trusted.
    ///
    /// # Example
    ///
    /// ```rust
    /// use zipwright::Error;
    ///
    /// fn should_abort(error: &Error) -> bool {
    ///     error.is_security_error()
    /// }
    /// ```
    pub fn is_security_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidName { .. } | Error::AuthenticationFailed { .. }
        )
    }

    /// Returns the entry name associated with this error, if any.
    ///
    /// # Example
    ///
    /// ```rust
    /// use zipwright::Error;
    ///
    /// fn log_error(error: &Error) {
    ///     if let Some(name) = error.entry_name() {
    ///         eprintln!("Error for '{}': {}", name, error);
    ///     }
    /// }
    /// ```
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            Error::InvalidPassword { entry_name, .. }
            | Error::PasswordRequired { entry_name }
            | Error::CrcMismatch { entry_name, .. }
            | Error::AuthenticationFailed { entry_name } => Some(entry_name.as_str()),
            Error::InvalidName { name, .. }
            | Error::EntryTooLarge { name, .. }
            | Error::EntryNotFound { name }
            | Error::EntryExists { name } => Some(name.as_str()),
            _ => None,
        }
    }

    /// Creates a CrcMismatch error.
    pub fn crc_mismatch(entry_name: impl Into<String>, expected: u32, actual: u32) -> Self {
        Error::CrcMismatch {
            entry_name: entry_name.into(),
            expected,
            actual,
        }
    }

    /// Creates a CorruptHeader error.
    pub fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates an InvalidName error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Recovers the crate error carried by an I/O error returned from one of
    /// this crate's `Read` or `Write` impls. Other I/O errors become
    /// [`Error::Io`].
    ///
    /// ```rust
    /// use zipwright::Error;
    ///
    /// let wrapped = std::io::Error::other(Error::Cancelled);
    /// assert!(matches!(Error::from_io(wrapped), Error::Cancelled));
    /// ```
    pub fn from_io(e: io::Error) -> Self {
        map_io_error(e)
    }
}

/// Converts an I/O error raised inside a `Read`/`Write` adapter back into a
/// crate error.
///
/// Crate errors travel through `io::Read` as `io::Error::other(Error)`; this
/// unwraps them so callers see the original variant.
pub(crate) fn map_io_error(e: io::Error) -> Error {
    if !e.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        return Error::Io(e);
    }
    let kind = e.kind();
    match e.into_inner().map(|inner| inner.downcast::<Error>()) {
        Some(Ok(err)) => *err,
        _ => Error::Io(io::Error::from(kind)),
    }
}

/// Wraps a crate error so it can travel through an `io::Read`/`io::Write`
/// boundary.
pub(crate) fn to_io_error(e: Error) -> io::Error {
    match e {
        Error::Io(e) => e,
        other => io::Error::other(other),
    }
}

/// A specialized Result type for ZIP operations.
///
/// This is defined as `std::result::Result<T, Error>` for convenience.
pub type Result<T> = std::result::Result<T, Error>;
