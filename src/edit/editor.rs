//! Archive editor for modifying existing archives.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveState, ZipArchive};
use crate::entry::{CompressionMethod, ZipEntry};
use crate::format::header::LocalFileHeader;
use crate::timestamp::DateTime;
use crate::write::{WriteOptions, ZipWriter};
use crate::{Error, Result};

use super::operation::Operation;

/// Result of an edit operation.
#[must_use = "edit result should be checked to verify operation completed as expected"]
#[derive(Debug, Clone, Default)]
pub struct EditResult {
    /// Number of entries copied unchanged.
    pub entries_kept: usize,
    /// Number of entries that were renamed.
    pub entries_renamed: usize,
    /// Number of entries that were deleted.
    pub entries_deleted: usize,
    /// Number of entries that were updated.
    pub entries_updated: usize,
    /// Number of new entries added.
    pub entries_added: usize,
    /// Total uncompressed bytes in the new archive.
    pub total_bytes: u64,
    /// Compressed bytes in the new archive.
    pub packed_bytes: u64,
}

impl EditResult {
    /// Returns the total number of entries in the resulting archive.
    pub fn total_entries(&self) -> usize {
        self.entries_kept + self.entries_renamed + self.entries_updated + self.entries_added
    }

    /// Returns the compression ratio (packed / total).
    pub fn compression_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.packed_bytes as f64 / self.total_bytes as f64
        }
    }
}

/// Stages changes to a [`ZipArchive`].
///
/// Operations are queued and validated against the archive as it will look
/// after the queued changes. Nothing is written until
/// [`apply`](Self::apply) or [`commit`](Self::commit). Untouched and renamed
/// entries are copied without recompression.
///
/// Dropping the editor discards the queued operations.
///
/// # Example
///
/// ```rust
/// use std::io::Cursor;
/// use zipwright::{WriteOptions, ZipArchive, ZipEntry, ZipWriter};
///
/// let mut writer = ZipWriter::new(Cursor::new(Vec::new()))
///     .with_options(WriteOptions::new().stream_owner(false));
/// writer.write_entry(ZipEntry::new("old.txt")?, b"content")?;
/// writer.write_entry(ZipEntry::new("junk.txt")?, b"junk")?;
/// let bytes = writer.close()?.map(Cursor::into_inner).unwrap_or_default();
///
/// let mut archive = ZipArchive::open(Cursor::new(bytes))?;
/// let mut editor = archive.edit()?;
/// editor.rename("old.txt", "new.txt")?;
/// editor.delete("junk.txt")?;
/// editor.add("hello.txt", b"Hello!".to_vec())?;
/// let mut output = Cursor::new(Vec::new());
/// let result = editor.apply(&mut output)?;
/// assert_eq!(result.total_entries(), 2);
///
/// let edited = ZipArchive::open(Cursor::new(output.into_inner()))?;
/// assert!(edited.entry_by_name("new.txt").is_some());
/// # Ok::<(), zipwright::Error>(())
/// ```
pub struct ArchiveEditor<'a, R: Read + Seek> {
    archive: &'a mut ZipArchive<R>,
    operations: Vec<Operation>,
    options: WriteOptions,
    comment: Option<String>,
    previous: ArchiveState,
    finished: bool,
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Starts staging changes. The archive cannot be read while the editor
    /// exists.
    pub fn edit(&mut self) -> Result<ArchiveEditor<'_, R>> {
        self.ensure_readable()?;
        let previous = self.state();
        self.set_state(ArchiveState::Updating);
        let options = WriteOptions::new().string_codec(self.options().string_codec);
        Ok(ArchiveEditor {
            archive: self,
            operations: Vec::new(),
            options,
            comment: None,
            previous,
            finished: false,
        })
    }
}

impl<'a, R: Read + Seek> ArchiveEditor<'a, R> {
    /// Sets the options used for new and updated entries.
    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the queued operations.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Returns whether there are any pending operations.
    pub fn has_pending_operations(&self) -> bool {
        !self.operations.is_empty() || self.comment.is_some()
    }

    /// Clears all pending operations.
    pub fn clear_operations(&mut self) {
        self.operations.clear();
        self.comment = None;
    }

    /// Queues a new entry with default settings.
    pub fn add(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        self.add_entry(ZipEntry::new(name)?, data)
    }

    /// Queues a new entry. Its CRC and sizes are recomputed.
    pub fn add_entry(&mut self, mut entry: ZipEntry, data: impl Into<Vec<u8>>) -> Result<()> {
        self.ensure_absent(entry.name())?;
        entry.clear_crc();
        entry.set_size(-1);
        entry.set_compressed_size(-1);
        self.operations.push(Operation::Add {
            entry,
            data: data.into(),
        });
        Ok(())
    }

    /// Queues a directory entry.
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        let name = ZipEntry::new(name)?.name().to_string();
        self.ensure_absent(&name)?;
        self.operations.push(Operation::AddDirectory { name });
        Ok(())
    }

    /// Queues new data for an existing entry. A second update of the same
    /// entry replaces the first.
    pub fn update(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        self.ensure_original(name)?;
        let data = data.into();
        if let Some(Operation::Update { data: pending, .. }) = self.pending_update(name) {
            *pending = data;
            return Ok(());
        }
        self.operations.push(Operation::Update {
            name: name.to_string(),
            data,
        });
        Ok(())
    }

    /// Queues the removal of an entry. Every entry with that name goes.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.ensure_original(name)?;
        self.operations
            .retain(|op| !matches!(op, Operation::Update { name: n, .. } if n == name));
        self.operations.push(Operation::Delete {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Queues a rename. The entry data is copied without recompression.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if `from` does not exist,
    /// [`Error::EntryExists`] if `to` does, and
    /// [`Error::InvalidArgument`] if `from` has a pending update.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.ensure_original(from)?;
        let to = ZipEntry::new(to)?.name().to_string();
        self.ensure_absent(&to)?;
        if self.pending_update(from).is_some() {
            return Err(Error::InvalidArgument(format!(
                "'{from}' has a pending update and cannot be renamed"
            )));
        }
        self.operations.push(Operation::Rename {
            from: from.to_string(),
            to,
        });
        Ok(())
    }

    /// Sets the comment of the new archive.
    pub fn set_comment(&mut self, comment: &str) -> Result<()> {
        let length = self.options.string_codec.encode(comment, false).len();
        if length > crate::format::MAX_COMMENT_LENGTH {
            return Err(Error::CommentTooLong { length });
        }
        self.comment = Some(comment.to_string());
        Ok(())
    }

    /// Writes the edited archive to `output`. The original archive is left
    /// as it is.
    pub fn apply<W: Write + Seek>(mut self, output: W) -> Result<EditResult> {
        let (result, _) = self.write_to(output)?;
        Ok(result)
    }

    fn pending_update(&mut self, name: &str) -> Option<&mut Operation> {
        self.operations
            .iter_mut()
            .find(|op| matches!(op, Operation::Update { name: n, .. } if n == name))
    }

    /// Names the archive will contain once the queued operations apply.
    fn live_names(&self) -> HashSet<&str> {
        let mut names: HashSet<&str> = self.archive.entries().iter().map(ZipEntry::name).collect();
        for op in &self.operations {
            match op {
                Operation::Delete { name } => {
                    names.remove(name.as_str());
                }
                Operation::Rename { from, to } => {
                    names.remove(from.as_str());
                    names.insert(to);
                }
                other => {
                    if let Some(name) = other.target_name() {
                        names.insert(name);
                    }
                }
            }
        }
        names
    }

    fn ensure_absent(&self, name: &str) -> Result<()> {
        if self.live_names().contains(name) {
            return Err(Error::EntryExists {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// The name must belong to an entry of the archive that has not been
    /// deleted or renamed.
    fn ensure_original(&self, name: &str) -> Result<()> {
        let moved = self.operations.iter().any(|op| {
            matches!(op, Operation::Delete { .. } | Operation::Rename { .. })
                && op.source_name() == Some(name)
        });
        if moved || self.archive.entry_by_name(name).is_none() {
            return Err(Error::EntryNotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn write_to<W: Write + Seek>(&mut self, output: W) -> Result<(EditResult, W)> {
        let mut result = EditResult::default();
        let codec = self.options.string_codec;
        let mut writer = ZipWriter::new(output).with_options(self.options.clone().stream_owner(false));
        let comment = match (&self.comment, &self.options.comment) {
            (Some(comment), _) => Some(comment.clone()),
            (None, Some(_)) => None,
            (None, None) => Some(self.archive.comment().to_string()),
        };
        if let Some(comment) = comment.filter(|c| !c.is_empty()) {
            writer.set_comment(&comment)?;
        }

        let mut deleted = HashSet::new();
        let mut updates = HashMap::new();
        let mut renames = HashMap::new();
        for op in &self.operations {
            match op {
                Operation::Delete { name } => {
                    deleted.insert(name.as_str());
                }
                Operation::Update { name, data } => {
                    updates.insert(name.as_str(), data.as_slice());
                }
                Operation::Rename { from, to } => {
                    renames.insert(from.as_str(), to.as_str());
                }
                Operation::Add { .. } | Operation::AddDirectory { .. } => {}
            }
        }

        for index in 0..self.archive.len() {
            let original = self.archive.entries()[index].clone();
            let name = original.name();
            if deleted.contains(name) {
                log::trace!("dropping '{name}'");
                result.entries_deleted += 1;
                continue;
            }
            if let Some(data) = updates.get(name) {
                writer.write_entry(replacement_entry(&original)?, data)?;
                result.entries_updated += 1;
                result.total_bytes += data.len() as u64;
                continue;
            }
            let to = renames.get(name).copied();
            copy_entry(self.archive, &mut writer, index, to, &codec)?;
            if to.is_some() {
                result.entries_renamed += 1;
            } else {
                result.entries_kept += 1;
            }
            result.total_bytes += original.size().max(0) as u64;
        }

        for op in &self.operations {
            match op {
                Operation::Add { entry, data } => {
                    writer.write_entry(entry.clone(), data)?;
                    result.entries_added += 1;
                    result.total_bytes += data.len() as u64;
                }
                Operation::AddDirectory { name } => {
                    writer.add_directory(name)?;
                    result.entries_added += 1;
                }
                _ => {}
            }
        }

        writer.finish()?;
        result.packed_bytes = writer
            .entries()
            .iter()
            .map(|e| e.compressed_size().max(0) as u64)
            .sum();
        let output = writer
            .close()?
            .ok_or(Error::InvalidState("the output stream was released"))?;
        log::debug!(
            "edited archive: {} kept, {} renamed, {} updated, {} deleted, {} added",
            result.entries_kept,
            result.entries_renamed,
            result.entries_updated,
            result.entries_deleted,
            result.entries_added
        );
        Ok((result, output))
    }
}

impl ArchiveEditor<'_, BufReader<File>> {
    /// Writes the edited archive next to the original, replaces the original
    /// with it and re-indexes.
    ///
    /// The new archive goes to a uniquely named temporary file in the same
    /// directory, which is renamed over the original once complete. On
    /// failure the original is untouched and the temporary file removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the archive was not opened with
    /// [`ZipArchive::open_path`].
    pub fn commit(mut self) -> Result<EditResult> {
        let path = self
            .archive
            .path()
            .map(Path::to_path_buf)
            .ok_or(Error::InvalidState("the archive was not opened from a path"))?;
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = format!(
            "{}.",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );

        let mut temp = tempfile::Builder::new()
            .prefix(&prefix)
            .tempfile_in(&directory)?;
        let (result, output) = self.write_to(BufWriter::new(temp.as_file_mut()))?;
        output.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        temp.as_file().sync_all()?;

        let options = self.archive.options().clone();
        self.archive.close();
        let persisted = temp.persist(&path);
        let reopened = ZipArchive::open_path_with_options(&path, options);
        if let Err(e) = persisted {
            if let Ok(original) = reopened {
                *self.archive = original;
            }
            return Err(Error::Io(e.error));
        }
        *self.archive = reopened?;
        self.archive.set_state(ArchiveState::Committed);
        self.finished = true;
        log::debug!("committed {} entries to {}", self.archive.len(), path.display());
        Ok(result)
    }
}

impl<R: Read + Seek> Drop for ArchiveEditor<'_, R> {
    fn drop(&mut self) {
        if !self.finished {
            self.archive.set_state(self.previous);
        }
    }
}

impl<R: Read + Seek> std::fmt::Debug for ArchiveEditor<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveEditor")
            .field("operations", &self.operations)
            .field("comment", &self.comment)
            .finish_non_exhaustive()
    }
}

/// A fresh entry carrying over the metadata of `original`.
fn replacement_entry(original: &ZipEntry) -> Result<ZipEntry> {
    let mut entry = ZipEntry::new(original.name())?;
    let method = match original.compression_method() {
        CompressionMethod::Stored => CompressionMethod::Stored,
        #[cfg(feature = "bzip2")]
        CompressionMethod::BZip2 => CompressionMethod::BZip2,
        _ => CompressionMethod::Deflated,
    };
    entry.set_compression_method(method);
    entry.set_date_time(DateTime::now());
    entry.set_external_attributes(original.external_attributes());
    entry.set_host_system(original.host_system());
    entry.set_comment(original.comment().map(str::to_string))?;
    Ok(entry)
}

/// Copies entry `index` verbatim, rewriting only the local header when the
/// entry is renamed.
fn copy_entry<R: Read + Seek, W: Write>(
    archive: &mut ZipArchive<R>,
    writer: &mut ZipWriter<W>,
    index: usize,
    rename: Option<&str>,
    codec: &crate::encoding::StringCodec,
) -> Result<()> {
    let record = archive.locate(index)?;
    let descriptor = archive.descriptor_len(index, &record)?;
    let mut entry = archive.entries()[index].clone();
    let compressed = entry.compressed_size().max(0) as u64;

    let header = match rename {
        None => record.header.clone(),
        Some(to) => {
            entry.set_name(to)?;
            if codec.requires_unicode(to) {
                entry.set_unicode_text(true);
            }
            LocalFileHeader::from_entry(&entry, codec, record.header.has_zip64())?
        }
    };
    let mut bytes = Vec::with_capacity(header.len() as usize);
    header.write_to(&mut bytes)?;

    log::trace!(
        "copying '{}' from offset {} ({compressed} bytes)",
        entry.name(),
        record.header_offset
    );
    let reader = archive.reader_mut()?;
    reader.seek(SeekFrom::Start(record.data_offset))?;
    writer.append_raw(entry, &bytes, reader, compressed + descriptor)
}
