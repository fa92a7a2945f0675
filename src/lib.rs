//! # zipwright
//!
//! A pure-Rust library for reading and writing ZIP archives.
//!
//! The crate covers the entry data model, the tagged extra field, Zip64,
//! classic ZipCrypto and WinZip AES encryption, a random-access archive
//! index with staged editing, and sequential readers and writers that work
//! on seekable and non-seekable transports alike.
//!
//! ## Quick Start
//!
//! ### Reading an Archive
//!
//! ```rust,no_run
//! use zipwright::{Result, ZipArchive};
//!
//! fn main() -> Result<()> {
//!     let mut archive = ZipArchive::open_path("archive.zip")?;
//!
//!     for entry in archive.entries() {
//!         println!("{}: {} bytes", entry.name(), entry.size());
//!     }
//!
//!     if let Some(index) = archive.find_entry("readme.txt", true) {
//!         let text = archive.read_entry(index)?;
//!         println!("{}", String::from_utf8_lossy(&text));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Creating an Archive
//!
//! ```rust,no_run
//! use std::fs::File;
//! use std::io::Write;
//! use zipwright::{Result, ZipEntry, ZipWriter};
//!
//! fn main() -> Result<()> {
//!     let mut writer = ZipWriter::new(File::create("new.zip")?);
//!
//!     writer.write_entry(ZipEntry::new("hello.txt")?, b"Hello, World!")?;
//!
//!     writer.put_next_entry(ZipEntry::new("log.txt")?)?;
//!     writer.write_all(b"streamed ")?;
//!     writer.write_all(b"content")?;
//!     writer.close_entry()?;
//!
//!     writer.finish()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Encrypted Entries
//!
//! ```rust
//! # #[cfg(feature = "aes")]
//! # fn main() -> zipwright::Result<()> {
//! use std::io::Cursor;
//! use zipwright::{ArchiveOptions, WriteOptions, ZipArchive, ZipEntry, ZipWriter};
//!
//! let options = WriteOptions::new().password("secret").stream_owner(false);
//! let mut writer = ZipWriter::new(Cursor::new(Vec::new())).with_options(options);
//! writer.write_entry(ZipEntry::new("secret.txt")?, b"Secret data")?;
//! let bytes = writer.close()?.map(Cursor::into_inner).unwrap_or_default();
//!
//! let options = ArchiveOptions::new().password("secret");
//! let mut archive = ZipArchive::open_with_options(Cursor::new(bytes), options)?;
//! assert_eq!(archive.read_entry(0)?, b"Secret data");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "aes"))]
//! # fn main() {}
//! ```
//!
//! ### Streaming
//!
//! [`ZipReader`] reads entries front to back from any [`std::io::Read`],
//! using the local headers and data descriptors only. [`ZipWriter::new_streaming`]
//! writes to sinks that cannot seek.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `aes` | Yes | WinZip AES-128/256 encryption |
//! | `bzip2` | Yes | BZip2 entries (method 12) |
//! | `fastzip` | Yes | [`fastzip::FastZip`] directory facade |
//! | `legacy-crypto` | No | Creating ZipCrypto entries outside tests |
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`:
//!
//! ```rust,no_run
//! use zipwright::{Error, ZipArchive};
//!
//! fn open_archive(path: &str) -> zipwright::Result<()> {
//!     match ZipArchive::open_path(path) {
//!         Ok(archive) => {
//!             println!("Opened archive with {} entries", archive.len());
//!             Ok(())
//!         }
//!         Err(Error::Io(e)) => {
//!             eprintln!("I/O error: {}", e);
//!             Err(Error::Io(e))
//!         }
//!         Err(e) if e.is_corruption() => {
//!             eprintln!("Not a valid zip file: {}", e);
//!             Err(e)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! # fn main() {}
//! ```
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Default buffer size for read operations (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod archive;
pub mod archive_path;
pub mod checksum;
pub mod codec;
pub mod crypto;
pub mod edit;
pub mod encoding;
pub mod entry;
pub mod entry_factory;
pub mod error;
pub mod extra;
pub mod format;
pub mod pool;
pub mod progress;
pub mod read;
pub mod safety;
pub mod timestamp;
pub mod write;

#[cfg(feature = "fastzip")]
#[cfg_attr(docsrs, doc(cfg(feature = "fastzip")))]
pub mod fastzip;

pub use archive_path::ZipNameTransform;
pub use crypto::{EncryptionMethod, Password};
pub use encoding::StringCodec;
pub use entry::{CompressionMethod, ZipEntry};
pub use entry_factory::{TimeSetting, ZipEntryFactory};
pub use error::{Error, PasswordDetectionMethod, Result};
pub use extra::{ExtendedUnixData, ExtraData, NtTaggedData, RawTaggedData, TaggedData};
pub use pool::PoolStats;
pub use safety::WindowsNameTransform;
pub use timestamp::{DateTime, Timestamp};

// Random access
pub use archive::{ArchiveOptions, ArchiveState, EntryReader, TestResult, ZipArchive};

// Sequential access
pub use read::{ReadOptions, ZipReader};
pub use write::{UseZip64, WriteOptions, ZipWriter};

pub use edit::{ArchiveEditor, EditResult, Operation};
pub use progress::{ArchiveObserver, NoObserver};

#[cfg(feature = "fastzip")]
pub use fastzip::{FastZip, FastZipOptions, Overwrite};
