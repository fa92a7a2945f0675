//! Archive editing and modification.
//!
//! An [`ArchiveEditor`] stages changes to an indexed [`ZipArchive`]:
//! renames, deletions, data updates and additions. The edited archive is
//! written to a new stream with [`ArchiveEditor::apply`], or replaces the
//! archive file in place with [`ArchiveEditor::commit`].
//!
//! # Example
//!
//! ```rust,no_run
//! use zipwright::ZipArchive;
//!
//! let mut archive = ZipArchive::open_path("original.zip")?;
//! let mut editor = archive.edit()?;
//! editor.rename("old_name.txt", "new_name.txt")?;
//! editor.delete("unwanted.txt")?;
//! editor.add("new_file.txt", b"Hello, World!".to_vec())?;
//!
//! let result = editor.commit()?;
//! println!(
//!     "Kept {} entries, deleted {}, added {}",
//!     result.entries_kept, result.entries_deleted, result.entries_added
//! );
//! # Ok::<(), zipwright::Error>(())
//! ```
//!
//! # Implementation Notes
//!
//! Kept and renamed entries are copied byte for byte, so encrypted entries
//! survive an edit without the password. A rename only rewrites the local
//! header. Updated and added entries are compressed with the editor's
//! [`WriteOptions`](crate::WriteOptions).
//!
//! [`ZipArchive`]: crate::ZipArchive

mod editor;
mod operation;

pub use editor::{ArchiveEditor, EditResult};
pub use operation::Operation;
