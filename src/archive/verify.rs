//! Archive integrity testing.

use std::io::{self, Read, Seek};

use crate::error::map_io_error;
use crate::progress::{ArchiveObserver, KeepGoing};
use crate::{Error, Result};

use super::ZipArchive;

/// Outcome of [`ZipArchive::test_archive`].
#[derive(Debug, Default)]
pub struct TestResult {
    /// Number of entries tested.
    pub entries_tested: usize,
    /// Number of entries that passed.
    pub entries_passed: usize,
    /// Number of entries that failed.
    pub entries_failed: usize,
    /// Failing entries with their errors.
    pub failures: Vec<(String, Error)>,
}

impl TestResult {
    /// Returns true if all entries passed.
    pub fn is_ok(&self) -> bool {
        self.entries_failed == 0
    }

    /// Returns true if any entries failed.
    pub fn is_err(&self) -> bool {
        self.entries_failed > 0
    }
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Decodes every entry and checks its CRC and, for AES entries, the
    /// authentication code. No data is kept.
    ///
    /// Failing entries are collected; the call itself only fails when the
    /// archive cannot be read at all.
    pub fn test_archive(&mut self) -> Result<TestResult> {
        self.test_archive_with(&mut KeepGoing)
    }

    /// Like [`test_archive`](Self::test_archive), reporting each entry to
    /// `observer`. When [`on_entry_failed`](ArchiveObserver::on_entry_failed)
    /// returns `false` the run stops with that entry's error.
    pub fn test_archive_with(&mut self, observer: &mut dyn ArchiveObserver) -> Result<TestResult> {
        self.ensure_readable()?;
        let mut result = TestResult::default();

        for index in 0..self.len() {
            let entry = self.entries[index].clone();
            result.entries_tested += 1;
            observer.on_entry_start(&entry);

            if entry.is_directory() {
                result.entries_passed += 1;
                observer.on_entry_complete(&entry);
                continue;
            }

            let outcome = self
                .entry_reader(index)
                .and_then(|mut reader| io::copy(&mut reader, &mut io::sink()).map_err(map_io_error));
            match outcome {
                Ok(_) => {
                    result.entries_passed += 1;
                    observer.on_entry_complete(&entry);
                }
                Err(e) => {
                    log::debug!("entry '{}' failed the test: {e}", entry.name());
                    result.entries_failed += 1;
                    if !observer.on_entry_failed(&entry, &e) {
                        return Err(e);
                    }
                    result.failures.push((entry.name().to_string(), e));
                }
            }
        }

        log::debug!(
            "tested {} entries: {} passed, {} failed",
            result.entries_tested,
            result.entries_passed,
            result.entries_failed
        );
        Ok(result)
    }
}
