//! Observation of long-running archive operations.
//!
//! [`ArchiveObserver`] receives callbacks from
//! [`ZipArchive::test_archive_with`](crate::ZipArchive::test_archive_with)
//! and the `FastZip` facade. Every method has a default, so an observer only
//! implements what it cares about.
//!
//! # Example
//!
//! ```rust
//! use zipwright::progress::ArchiveObserver;
//! use zipwright::{Error, ZipEntry};
//!
//! #[derive(Default)]
//! struct Counter {
//!     done: usize,
//! }
//!
//! impl ArchiveObserver for Counter {
//!     fn on_entry_complete(&mut self, _entry: &ZipEntry) {
//!         self.done += 1;
//!     }
//!
//!     fn on_entry_failed(&mut self, entry: &ZipEntry, error: &Error) -> bool {
//!         eprintln!("skipping {}: {error}", entry.name());
//!         true
//!     }
//! }
//! ```

use std::path::Path;

use crate::Error;
use crate::entry::ZipEntry;

/// Callbacks for archive operations.
pub trait ArchiveObserver {
    /// Called before an entry is processed.
    fn on_entry_start(&mut self, entry: &ZipEntry) {
        let _ = entry;
    }

    /// Called after an entry was processed successfully.
    fn on_entry_complete(&mut self, entry: &ZipEntry) {
        let _ = entry;
    }

    /// Called when a directory is visited while creating an archive.
    ///
    /// `has_matching_files` is `false` for directories without files.
    fn on_directory(&mut self, path: &Path, has_matching_files: bool) {
        let _ = (path, has_matching_files);
    }

    /// Called when processing an entry failed.
    ///
    /// Returns `true` to skip the entry and continue, `false` to stop and
    /// return the error. The default stops.
    fn on_entry_failed(&mut self, entry: &ZipEntry, error: &Error) -> bool {
        let _ = (entry, error);
        false
    }

    /// Asked before an existing file is replaced during extraction with
    /// [`Overwrite::Prompt`](crate::fastzip::Overwrite::Prompt).
    ///
    /// The default keeps the existing file.
    fn confirm_overwrite(&mut self, path: &Path) -> bool {
        let _ = path;
        false
    }
}

/// An observer that ignores every callback and stops on the first failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObserver;

impl ArchiveObserver for NoObserver {}

/// Continues past failures without reporting them.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct KeepGoing;

impl ArchiveObserver for KeepGoing {
    fn on_entry_failed(&mut self, _entry: &ZipEntry, _error: &Error) -> bool {
        true
    }
}
