//! One-call creation and extraction of whole directory trees.
//!
//! [`FastZip`] walks a directory with `walkdir` and writes every file into a
//! new archive, or extracts every entry of an archive below a target
//! directory. Extraction resolves names through
//! [`WindowsNameTransform`](crate::safety::WindowsNameTransform), so entries
//! that would land outside the target fail with
//! [`Error::InvalidName`](crate::Error::InvalidName) unless parent traversal
//! is allowed.
//!
//! # Example
//!
//! ```rust,no_run
//! use zipwright::fastzip::{FastZip, FastZipOptions, Overwrite};
//!
//! let mut fast = FastZip::with_options(
//!     FastZipOptions::new()
//!         .password("secret")
//!         .create_empty_directories(true),
//! );
//! fast.create_zip_path("backup.zip", "documents", true)?;
//!
//! let mut fast = FastZip::with_options(
//!     FastZipOptions::new().password("secret").overwrite(Overwrite::Never),
//! );
//! fast.extract_zip_path("backup.zip", "restored")?;
//! # Ok::<(), zipwright::Error>(())
//! ```

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use filetime::FileTime;
use walkdir::WalkDir;

use crate::archive::{ArchiveOptions, ZipArchive};
use crate::crypto::{EncryptionMethod, Password};
use crate::encoding::StringCodec;
use crate::entry::ZipEntry;
use crate::entry_factory::{TimeSetting, ZipEntryFactory};
use crate::progress::{ArchiveObserver, NoObserver};
use crate::safety::WindowsNameTransform;
use crate::timestamp::DateTime;
use crate::write::{UseZip64, WriteOptions, ZipWriter};
use crate::{Error, Result};

/// What to do when an extracted file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overwrite {
    /// Ask [`ArchiveObserver::confirm_overwrite`].
    Prompt,
    /// Keep the existing file.
    Never,
    /// Replace the existing file.
    #[default]
    Always,
}

/// Options for [`FastZip`].
#[derive(Clone)]
pub struct FastZipOptions {
    /// Password for encrypting created entries and decrypting extracted ones.
    pub password: Option<Password>,
    /// Encryption applied to created files when a password is set.
    pub encryption: EncryptionMethod,
    /// Store directories without files when creating, and create directory
    /// entries when extracting.
    pub create_empty_directories: bool,
    /// Compression level (0-9).
    pub level: u32,
    /// Zip64 policy for created archives.
    pub use_zip64: UseZip64,
    /// Name and comment encoding.
    pub string_codec: StringCodec,
    /// Handling of existing files on extraction.
    pub overwrite: Overwrite,
    /// Set extracted file times from the entries.
    pub restore_date_time_on_extract: bool,
    /// Allow entries that resolve outside the target directory.
    pub allow_parent_traversal: bool,
    /// Whether the archive stream is closed when the operation ends.
    pub is_stream_owner: bool,
}

impl Default for FastZipOptions {
    fn default() -> Self {
        Self {
            password: None,
            encryption: EncryptionMethod::Aes256,
            create_empty_directories: false,
            level: crate::write::DEFAULT_LEVEL,
            use_zip64: UseZip64::Dynamic,
            string_codec: StringCodec::default(),
            overwrite: Overwrite::Always,
            restore_date_time_on_extract: false,
            allow_parent_traversal: false,
            is_stream_owner: true,
        }
    }
}

impl std::fmt::Debug for FastZipOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastZipOptions")
            .field("has_password", &self.password.is_some())
            .field("encryption", &self.encryption)
            .field("create_empty_directories", &self.create_empty_directories)
            .field("level", &self.level)
            .field("use_zip64", &self.use_zip64)
            .field("overwrite", &self.overwrite)
            .field("restore_date_time_on_extract", &self.restore_date_time_on_extract)
            .field("allow_parent_traversal", &self.allow_parent_traversal)
            .field("is_stream_owner", &self.is_stream_owner)
            .finish()
    }
}

impl FastZipOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the password. An empty password disables encryption.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    /// Sets the encryption method for created entries.
    pub fn encryption(mut self, method: EncryptionMethod) -> Self {
        self.encryption = method;
        self
    }

    /// Sets whether empty directories are stored and extracted.
    pub fn create_empty_directories(mut self, create: bool) -> Self {
        self.create_empty_directories = create;
        self
    }

    /// Sets the compression level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCompressionLevel`] above 9.
    pub fn level(mut self, level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidCompressionLevel { level });
        }
        self.level = level;
        Ok(self)
    }

    /// Sets the Zip64 policy.
    pub fn use_zip64(mut self, mode: UseZip64) -> Self {
        self.use_zip64 = mode;
        self
    }

    /// Sets the name encoding.
    pub fn string_codec(mut self, codec: StringCodec) -> Self {
        self.string_codec = codec;
        self
    }

    /// Sets the overwrite policy.
    pub fn overwrite(mut self, overwrite: Overwrite) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Sets whether file times are restored on extraction.
    pub fn restore_date_time_on_extract(mut self, restore: bool) -> Self {
        self.restore_date_time_on_extract = restore;
        self
    }

    /// Sets whether entries may resolve outside the target directory.
    pub fn allow_parent_traversal(mut self, allow: bool) -> Self {
        self.allow_parent_traversal = allow;
        self
    }

    /// Sets whether the archive stream is closed at the end.
    pub fn is_stream_owner(mut self, owner: bool) -> Self {
        self.is_stream_owner = owner;
        self
    }

    fn write_options(&self) -> Result<WriteOptions> {
        let mut options = WriteOptions::new()
            .level(self.level)?
            .encryption(self.encryption)
            .use_zip64(self.use_zip64)
            .string_codec(self.string_codec)
            .stream_owner(self.is_stream_owner);
        if let Some(password) = &self.password {
            if !self.encryption.is_encrypted() {
                return Err(Error::InvalidArgument(
                    "a password is set but the encryption method is None".into(),
                ));
            }
            options = options.password(password.clone());
        }
        Ok(options)
    }

    fn archive_options(&self) -> ArchiveOptions {
        let options = ArchiveOptions::new().string_codec(self.string_codec);
        match &self.password {
            Some(password) => options.password(password.clone()),
            None => options,
        }
    }
}

/// Creates and extracts archives from directory trees.
#[derive(Debug)]
pub struct FastZip<O: ArchiveObserver = NoObserver> {
    options: FastZipOptions,
    factory: ZipEntryFactory,
    observer: O,
}

impl Default for FastZip<NoObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl FastZip<NoObserver> {
    /// A facade with default options.
    pub fn new() -> Self {
        Self::with_options(FastZipOptions::default())
    }

    /// A facade with the given options.
    pub fn with_options(options: FastZipOptions) -> Self {
        Self {
            options,
            factory: ZipEntryFactory::new(),
            observer: NoObserver,
        }
    }
}

impl<O: ArchiveObserver> FastZip<O> {
    /// Replaces the observer.
    pub fn with_observer<P: ArchiveObserver>(self, observer: P) -> FastZip<P> {
        FastZip {
            options: self.options,
            factory: self.factory,
            observer,
        }
    }

    /// Returns the options.
    pub fn options(&self) -> &FastZipOptions {
        &self.options
    }

    /// Returns the options for modification.
    pub fn options_mut(&mut self) -> &mut FastZipOptions {
        &mut self.options
    }

    /// The factory used to build entries. Its time setting also picks the
    /// time restored on extraction.
    pub fn entry_factory(&self) -> &ZipEntryFactory {
        &self.factory
    }

    /// Replaces the entry factory.
    pub fn set_entry_factory(&mut self, factory: ZipEntryFactory) {
        self.factory = factory;
    }

    /// Returns the observer.
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Returns the observer for modification.
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Consumes the facade, returning the observer.
    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Creates the archive `zip` from the contents of `source`.
    pub fn create_zip_path(
        &mut self,
        zip: impl AsRef<Path>,
        source: impl AsRef<Path>,
        recurse: bool,
    ) -> Result<()> {
        let zip = zip.as_ref();
        let file = File::create(zip)?;
        let exclude = zip.canonicalize().ok();
        let mut options = self.options.write_options()?;
        options.stream_owner = false;
        let writer = ZipWriter::new(BufWriter::new(file)).with_options(options);
        let output = self.write_tree(writer, source.as_ref(), recurse, exclude.as_deref())?;
        if let Some(output) = output {
            let file = output.into_inner().map_err(|e| Error::Io(e.into_error()))?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Writes an archive of `source` to `output`.
    ///
    /// Returns the stream when the options do not own it.
    pub fn create_zip<W: Write + Seek>(
        &mut self,
        output: W,
        source: impl AsRef<Path>,
        recurse: bool,
    ) -> Result<Option<W>> {
        let writer = ZipWriter::new(output).with_options(self.options.write_options()?);
        self.write_tree(writer, source.as_ref(), recurse, None)
    }

    fn write_tree<W: Write + Seek>(
        &mut self,
        mut writer: ZipWriter<W>,
        source: &Path,
        recurse: bool,
        exclude: Option<&Path>,
    ) -> Result<Option<W>> {
        let walker = WalkDir::new(source)
            .min_depth(1)
            .max_depth(if recurse { usize::MAX } else { 1 })
            .follow_links(false)
            .sort_by_file_name();

        for item in walker {
            let item = item.map_err(|e| Error::Io(io::Error::from(e)))?;
            let path = item.path();
            let relative = path.strip_prefix(source).unwrap_or(path).to_string_lossy().into_owned();

            if item.file_type().is_dir() {
                if !recurse {
                    continue;
                }
                let has_files = has_files(path);
                self.observer.on_directory(path, has_files);
                if self.options.create_empty_directories && !has_files {
                    let entry = self.factory.make_directory_entry(path, Some(&relative), true)?;
                    log::trace!("adding empty directory '{}'", entry.name());
                    writer.put_next_entry(entry)?;
                }
                continue;
            }
            if exclude.is_some() && path.canonicalize().ok().as_deref() == exclude {
                continue;
            }

            let (entry, mut file) = match self.open_file(path, &relative) {
                Ok(opened) => opened,
                Err(e) => {
                    let subject = ZipEntry::new(relative.as_str())?;
                    if self.observer.on_entry_failed(&subject, &e) {
                        log::warn!("skipping '{}': {e}", path.display());
                        continue;
                    }
                    return Err(e);
                }
            };
            self.observer.on_entry_start(&entry);
            let completed = entry.clone();
            writer.put_next_entry(entry)?;
            io::copy(&mut file, &mut writer).map_err(crate::error::map_io_error)?;
            writer.close_entry()?;
            self.observer.on_entry_complete(&completed);
        }

        log::debug!(
            "created archive of {} with {} entries",
            source.display(),
            writer.entries().len()
        );
        writer.close()
    }

    fn open_file(&self, path: &Path, relative: &str) -> Result<(ZipEntry, BufReader<File>)> {
        let file = File::open(path)?;
        let mut entry = self.factory.make_file_entry(path, Some(relative), true)?;
        if self.options.string_codec.is_legacy_forced() {
            entry.set_unicode_text(false);
        }
        Ok((entry, BufReader::new(file)))
    }

    /// Extracts the archive `zip` below `target`.
    pub fn extract_zip_path(&mut self, zip: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<()> {
        let file = BufReader::new(File::open(zip)?);
        self.extract_zip(file, target).map(drop)
    }

    /// Extracts an archive read from `input` below `target`.
    ///
    /// Returns the stream when the options do not own it.
    pub fn extract_zip<R: Read + Seek>(&mut self, input: R, target: impl AsRef<Path>) -> Result<Option<R>> {
        let target = target.as_ref();
        let mut archive = ZipArchive::open_with_options(input, self.options.archive_options())?;
        let transform = WindowsNameTransform::with_base_directory(target)
            .allow_parent_traversal(self.options.allow_parent_traversal);

        for index in 0..archive.len() {
            let entry = archive.entries()[index].clone();
            if !entry.is_directory() && !entry.is_file() {
                continue;
            }
            if entry.is_directory() && !self.options.create_empty_directories {
                continue;
            }
            if !entry.can_decompress() {
                log::warn!("skipping '{}': it cannot be extracted by this build", entry.name());
                continue;
            }
            if let Err(e) = self.extract_one(&mut archive, index, &entry, &transform) {
                if !self.observer.on_entry_failed(&entry, &e) {
                    return Err(e);
                }
                log::warn!("skipping '{}': {e}", entry.name());
            }
        }

        log::debug!("extracted {} entries to {}", archive.len(), target.display());
        if self.options.is_stream_owner {
            archive.close();
            Ok(None)
        } else {
            Ok(archive.into_inner())
        }
    }

    fn extract_one<R: Read + Seek>(
        &mut self,
        archive: &mut ZipArchive<R>,
        index: usize,
        entry: &ZipEntry,
        transform: &WindowsNameTransform,
    ) -> Result<()> {
        if entry.is_directory() {
            let path = transform.transform_directory(entry.name())?;
            self.ensure_directory(&path)?;
            if self.options.restore_date_time_on_extract {
                self.restore_time(&path, entry)?;
            }
            return Ok(());
        }

        let path = transform.transform_file(entry.name())?;
        if let Some(parent) = path.parent() {
            self.ensure_directory(parent)?;
        }
        if path.exists() {
            let replace = match self.options.overwrite {
                Overwrite::Always => true,
                Overwrite::Never => false,
                Overwrite::Prompt => self.observer.confirm_overwrite(&path),
            };
            if !replace {
                log::debug!("keeping existing {}", path.display());
                return Ok(());
            }
        }

        self.observer.on_entry_start(entry);
        let written = write_file(archive, index, &path);
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&path) {
                log::warn!("failed to remove partial file {}: {cleanup}", path.display());
            }
            return Err(e);
        }
        if self.options.restore_date_time_on_extract {
            self.restore_time(&path, entry)?;
        }
        self.observer.on_entry_complete(entry);
        Ok(())
    }

    fn ensure_directory(&mut self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            self.observer.on_directory(path, true);
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    fn restore_time(&self, path: &Path, entry: &ZipEntry) -> Result<()> {
        let time = |value: DateTime| FileTime::from_system_time(value.as_system_time());
        match self.factory.time_setting() {
            TimeSetting::LastAccessTime => filetime::set_file_atime(path, time(entry.modified_time()))?,
            TimeSetting::Fixed => {
                filetime::set_file_mtime(path, time(self.factory.fixed_date_time()))?
            }
            TimeSetting::LastWriteTime | TimeSetting::CreateTime => {
                filetime::set_file_mtime(path, time(entry.modified_time()))?
            }
        }
        Ok(())
    }
}

fn write_file<R: Read + Seek>(archive: &mut ZipArchive<R>, index: usize, path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    archive.extract_entry(index, &mut out)?;
    out.flush()?;
    Ok(())
}

fn has_files(directory: &Path) -> bool {
    match fs::read_dir(directory) {
        Ok(items) => items
            .filter_map(|item| item.ok())
            .any(|item| item.file_type().is_ok_and(|t| !t.is_dir())),
        Err(_) => false,
    }
}
