//! Building entries from files and directories.
//!
//! [`ZipEntryFactory`] turns a path into a [`ZipEntry`] with a cleaned name,
//! a timestamp picked by [`TimeSetting`] and external attributes filtered
//! through a pair of masks.

use std::fs::Metadata;
use std::path::Path;

use crate::archive_path::ZipNameTransform;
use crate::entry::{DOS_DIRECTORY_ATTRIBUTE, ZipEntry};
use crate::timestamp::DateTime;
use crate::Result;

/// MS-DOS read-only attribute bit.
const DOS_READ_ONLY_ATTRIBUTE: i32 = 0x01;

/// Which file system time becomes the entry time. All times are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeSetting {
    /// Last modification time.
    #[default]
    LastWriteTime,
    /// Last access time.
    LastAccessTime,
    /// Creation time. Falls back to the fixed time where the platform does
    /// not record it.
    CreateTime,
    /// [`ZipEntryFactory::fixed_date_time`] for every entry.
    Fixed,
}

/// Creates entries for files and directories.
#[derive(Debug, Clone)]
pub struct ZipEntryFactory {
    name_transform: ZipNameTransform,
    setting: TimeSetting,
    fixed_date_time: DateTime,
    get_attributes: i32,
    set_attributes: i32,
    unicode_text: bool,
}

impl Default for ZipEntryFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipEntryFactory {
    /// A factory using modification times. The fixed time is now.
    pub fn new() -> Self {
        Self::with_time_setting(TimeSetting::LastWriteTime)
    }

    /// A factory using the given time source.
    pub fn with_time_setting(setting: TimeSetting) -> Self {
        Self {
            name_transform: ZipNameTransform::new(),
            setting,
            fixed_date_time: DateTime::now(),
            get_attributes: -1,
            set_attributes: 0,
            unicode_text: false,
        }
    }

    /// A factory stamping every entry with `fixed`.
    pub fn with_fixed_date_time(fixed: DateTime) -> Self {
        let mut factory = Self::with_time_setting(TimeSetting::Fixed);
        factory.fixed_date_time = fixed;
        factory
    }

    /// The transform applied to entry names.
    pub fn name_transform(&self) -> &ZipNameTransform {
        &self.name_transform
    }

    /// Replaces the name transform.
    pub fn set_name_transform(&mut self, transform: ZipNameTransform) {
        self.name_transform = transform;
    }

    /// Which time source is used.
    pub fn time_setting(&self) -> TimeSetting {
        self.setting
    }

    /// Sets the time source.
    pub fn set_time_setting(&mut self, setting: TimeSetting) {
        self.setting = setting;
    }

    /// Time used by [`TimeSetting::Fixed`] and for entries built without
    /// the file system.
    pub fn fixed_date_time(&self) -> DateTime {
        self.fixed_date_time
    }

    /// Sets the fixed time.
    pub fn set_fixed_date_time(&mut self, value: DateTime) {
        self.fixed_date_time = value;
    }

    /// Mask applied to the attributes read from the file system. `-1` keeps
    /// all of them.
    pub fn get_attributes(&self) -> i32 {
        self.get_attributes
    }

    /// Sets the mask applied to file system attributes.
    pub fn set_get_attributes(&mut self, mask: i32) {
        self.get_attributes = mask;
    }

    /// Bits always set on created entries.
    pub fn set_attributes(&self) -> i32 {
        self.set_attributes
    }

    /// Sets the bits always set on created entries.
    pub fn set_set_attributes(&mut self, bits: i32) {
        self.set_attributes = bits;
    }

    /// Whether created entries are flagged as UTF-8.
    pub fn is_unicode_text(&self) -> bool {
        self.unicode_text
    }

    /// Flags created entries as UTF-8.
    pub fn set_unicode_text(&mut self, unicode: bool) {
        self.unicode_text = unicode;
    }

    /// Creates a file entry for `path`, named `entry_name` or, if `None`,
    /// after the path itself.
    ///
    /// With `use_file_system` the size, time and attributes come from the
    /// file's metadata. Otherwise the size is unknown (`-1`) and the time is
    /// the fixed time.
    ///
    /// # Errors
    ///
    /// Fails if the name cannot be made valid or the metadata cannot be
    /// read.
    pub fn make_file_entry(
        &self,
        path: impl AsRef<Path>,
        entry_name: Option<&str>,
        use_file_system: bool,
    ) -> Result<ZipEntry> {
        let path = path.as_ref();
        let name = self.name_transform.transform_file(&display_name(path, entry_name))?;
        let mut entry = ZipEntry::new(name)?;
        let mut attributes = 0;
        let mut time = self.fixed_date_time;

        if use_file_system {
            let metadata = std::fs::metadata(path)?;
            entry.set_size(metadata.len() as i64);
            attributes = dos_attributes(&metadata);
            time = self.pick_time(&metadata);
        }

        self.finish(&mut entry, attributes, time);
        Ok(entry)
    }

    /// Creates a directory entry. The name always ends in `/`.
    ///
    /// # Errors
    ///
    /// Fails if the name cannot be made valid or the metadata cannot be
    /// read.
    pub fn make_directory_entry(
        &self,
        path: impl AsRef<Path>,
        entry_name: Option<&str>,
        use_file_system: bool,
    ) -> Result<ZipEntry> {
        let path = path.as_ref();
        let name = self
            .name_transform
            .transform_directory(&display_name(path, entry_name))?;
        let mut entry = ZipEntry::new(name)?;
        entry.set_size(0);
        let mut attributes = DOS_DIRECTORY_ATTRIBUTE;
        let mut time = self.fixed_date_time;

        if use_file_system {
            let metadata = std::fs::metadata(path)?;
            attributes |= dos_attributes(&metadata);
            time = self.pick_time(&metadata);
        }

        self.finish(&mut entry, attributes, time);
        Ok(entry)
    }

    fn finish(&self, entry: &mut ZipEntry, attributes: i32, time: DateTime) {
        entry.set_date_time(time);
        entry.set_external_attributes((attributes & self.get_attributes) | self.set_attributes);
        if self.unicode_text {
            entry.set_unicode_text(true);
        }
    }

    fn pick_time(&self, metadata: &Metadata) -> DateTime {
        let time = match self.setting {
            TimeSetting::LastWriteTime => metadata.modified(),
            TimeSetting::LastAccessTime => metadata.accessed(),
            TimeSetting::CreateTime => metadata.created(),
            TimeSetting::Fixed => return self.fixed_date_time,
        };
        match time {
            Ok(time) => DateTime::from_system_time(time),
            Err(e) => {
                log::debug!("{:?} unavailable, using the fixed time: {e}", self.setting);
                self.fixed_date_time
            }
        }
    }
}

fn display_name(path: &Path, entry_name: Option<&str>) -> String {
    match entry_name {
        Some(name) => name.to_string(),
        None => path.to_string_lossy().into_owned(),
    }
}

fn dos_attributes(metadata: &Metadata) -> i32 {
    let mut attributes = 0;
    if metadata.permissions().readonly() {
        attributes |= DOS_READ_ONLY_ATTRIBUTE;
    }
    if metadata.is_dir() {
        attributes |= DOS_DIRECTORY_ATTRIBUTE;
    }
    attributes
}
