//! Archive modification operations.

use crate::entry::ZipEntry;

/// A pending modification of an archive.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Add a new entry with data.
    Add {
        /// The entry to add; sizes and CRC are filled in when written.
        entry: ZipEntry,
        /// Uncompressed data.
        data: Vec<u8>,
    },
    /// Add a directory entry.
    AddDirectory {
        /// Directory name, ending in `/`.
        name: String,
    },
    /// Replace the data of an existing entry.
    Update {
        /// Name of the entry to replace.
        name: String,
        /// New uncompressed data.
        data: Vec<u8>,
    },
    /// Remove an entry.
    Delete {
        /// Name of the entry to remove.
        name: String,
    },
    /// Rename an entry without recompressing it.
    Rename {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
}

impl Operation {
    /// The name the operation produces in the new archive, if any.
    pub fn target_name(&self) -> Option<&str> {
        match self {
            Operation::Add { entry, .. } => Some(entry.name()),
            Operation::AddDirectory { name } | Operation::Update { name, .. } => Some(name),
            Operation::Rename { to, .. } => Some(to),
            Operation::Delete { .. } => None,
        }
    }

    /// The existing entry the operation applies to, if any.
    pub fn source_name(&self) -> Option<&str> {
        match self {
            Operation::Update { name, .. } | Operation::Delete { name } => Some(name),
            Operation::Rename { from, .. } => Some(from),
            Operation::Add { .. } | Operation::AddDirectory { .. } => None,
        }
    }

    /// Returns `true` if entry data is copied as is.
    pub fn is_header_only(&self) -> bool {
        matches!(self, Operation::Rename { .. } | Operation::Delete { .. })
    }

    /// Short name of the operation.
    pub fn operation_type(&self) -> &'static str {
        match self {
            Operation::Add { .. } => "add",
            Operation::AddDirectory { .. } => "add directory",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
            Operation::Rename { .. } => "rename",
        }
    }
}
