//! Staged editing of existing archives.

mod common;

use std::io::Cursor;

use common::{create_archive, create_archive_with_options, expect_err, text_bytes};
use tempfile::TempDir;
use zipwright::{
    ArchiveState, CompressionMethod, Error, Operation, WriteOptions, ZipArchive, ZipEntry,
};

fn open(bytes: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> {
    ZipArchive::open(Cursor::new(bytes)).unwrap()
}

fn names(archive: &ZipArchive<Cursor<Vec<u8>>>) -> Vec<String> {
    archive.entries().iter().map(|e| e.name().to_string()).collect()
}

// =============================================================================
// In-memory output
// =============================================================================

#[test]
fn test_apply_preserves_untouched_entries() {
    let big = text_bytes(30_000);
    let mut archive = open(create_archive(&[("big.txt", &big), ("small.txt", b"small")]).unwrap());

    let mut out = Vec::new();
    let mut editor = archive.edit().unwrap();
    editor.add("extra.txt", b"extra".to_vec()).unwrap();
    let result = editor.apply(Cursor::new(&mut out)).unwrap();
    assert_eq!(result.entries_kept, 2);
    assert_eq!(result.entries_added, 1);
    assert_eq!(result.total_entries(), 3);
    assert_eq!(archive.state(), ArchiveState::Indexed);

    let original = archive.entries()[0].clone();
    let mut edited = open(out);
    assert_eq!(names(&edited), ["big.txt", "small.txt", "extra.txt"]);
    let copied = &edited.entries()[0];
    assert_eq!(copied.crc(), original.crc());
    assert_eq!(copied.compressed_size(), original.compressed_size());
    assert_eq!(copied.date_time(), original.date_time());
    assert_eq!(edited.read_entry(0).unwrap(), big);
    assert!(edited.test_archive().unwrap().is_ok());
}

#[test]
fn test_update_replaces_data_in_place() {
    let mut archive = open(create_archive(&[("a.txt", b"old a"), ("b.txt", b"old b")]).unwrap());
    let mut out = Vec::new();
    let mut editor = archive.edit().unwrap();
    editor.update("a.txt", b"first".to_vec()).unwrap();
    editor.update("a.txt", b"second".to_vec()).unwrap();
    assert_eq!(editor.operations().len(), 1);
    let result = editor.apply(Cursor::new(&mut out)).unwrap();
    assert_eq!(result.entries_updated, 1);

    let mut edited = open(out);
    assert_eq!(names(&edited), ["a.txt", "b.txt"]);
    assert_eq!(edited.read_entry(0).unwrap(), b"second");
    assert_eq!(edited.read_entry(1).unwrap(), b"old b");
}

#[test]
fn test_update_keeps_stored_method() {
    let mut writer = zipwright::ZipWriter::new(Cursor::new(Vec::new()))
        .with_options(WriteOptions::new().stream_owner(false));
    let mut entry = ZipEntry::new("raw.bin").unwrap();
    entry.set_compression_method(CompressionMethod::Stored);
    writer.write_entry(entry, b"raw").unwrap();
    let mut archive = open(writer.close().unwrap().unwrap().into_inner());

    let mut out = Vec::new();
    let mut editor = archive.edit().unwrap();
    editor.update("raw.bin", text_bytes(1_000)).unwrap();
    editor.apply(Cursor::new(&mut out)).unwrap();

    let mut edited = open(out);
    assert_eq!(edited.entries()[0].compression_method(), CompressionMethod::Stored);
    assert_eq!(edited.read_entry(0).unwrap(), text_bytes(1_000));
}

#[test]
fn test_delete_then_add_same_name() {
    let mut archive = open(create_archive(&[("a.txt", b"a"), ("b.txt", b"b")]).unwrap());
    let mut out = Vec::new();
    let mut editor = archive.edit().unwrap();
    editor.delete("a.txt").unwrap();
    editor.add("a.txt", b"reborn".to_vec()).unwrap();
    let result = editor.apply(Cursor::new(&mut out)).unwrap();
    assert_eq!(result.entries_deleted, 1);

    let mut edited = open(out);
    assert_eq!(names(&edited), ["b.txt", "a.txt"]);
    assert_eq!(edited.read_entry(1).unwrap(), b"reborn");
}

#[test]
fn test_rename_copies_without_recompression() {
    let data = text_bytes(8_000);
    let mut archive = open(create_archive(&[("old/name.txt", &data)]).unwrap());
    let before = archive.entries()[0].clone();

    let mut out = Vec::new();
    let mut editor = archive.edit().unwrap();
    editor.rename("old/name.txt", "new/name.txt").unwrap();
    match &editor.operations()[0] {
        Operation::Rename { to, .. } => assert_eq!(to, "new/name.txt"),
        other => panic!("unexpected {other:?}"),
    }
    let result = editor.apply(Cursor::new(&mut out)).unwrap();
    assert_eq!(result.entries_renamed, 1);

    let mut edited = open(out);
    let after = &edited.entries()[0];
    assert_eq!(after.name(), "new/name.txt");
    assert_eq!(after.crc(), before.crc());
    assert_eq!(after.compressed_size(), before.compressed_size());
    assert_eq!(edited.read_entry(0).unwrap(), data);
    assert!(edited.test_archive().unwrap().is_ok());
}

#[cfg(feature = "aes")]
#[test]
fn test_rename_encrypted_entry_without_password() {
    let bytes = create_archive_with_options(
        WriteOptions::new().password("hunter2"),
        &[("locked.txt", b"sealed contents")],
    )
    .unwrap();
    let mut archive = open(bytes);

    let mut out = Vec::new();
    let mut editor = archive.edit().unwrap();
    editor.rename("locked.txt", "still-locked.txt").unwrap();
    editor.add("open.txt", b"open".to_vec()).unwrap();
    editor.apply(Cursor::new(&mut out)).unwrap();

    let mut edited = open(out);
    assert!(edited.entries()[0].is_crypted());
    assert!(!edited.entries()[1].is_crypted());
    edited.set_password("hunter2");
    assert_eq!(edited.read_entry(0).unwrap(), b"sealed contents");
}

#[test]
fn test_comment_handling() {
    let bytes = create_archive_with_options(
        WriteOptions::new().comment("original").unwrap(),
        &[("a", b"a")],
    )
    .unwrap();
    let mut archive = open(bytes);

    let mut kept = Vec::new();
    archive.edit().unwrap().apply(Cursor::new(&mut kept)).unwrap();
    assert_eq!(open(kept).comment(), "original");

    let mut changed = Vec::new();
    let mut editor = archive.edit().unwrap();
    editor.set_comment("replaced").unwrap();
    editor.apply(Cursor::new(&mut changed)).unwrap();
    assert_eq!(open(changed).comment(), "replaced");

    let mut editor = archive.edit().unwrap();
    let err = expect_err(editor.set_comment(&"c".repeat(70_000)));
    assert!(matches!(err, Error::CommentTooLong { .. }));
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_operation_validation() {
    let mut archive = open(create_archive(&[("a.txt", b"a"), ("b.txt", b"b")]).unwrap());
    let mut editor = archive.edit().unwrap();

    assert!(matches!(editor.add("a.txt", Vec::new()), Err(Error::EntryExists { .. })));
    assert!(matches!(editor.delete("missing"), Err(Error::EntryNotFound { .. })));
    assert!(matches!(editor.update("missing", Vec::new()), Err(Error::EntryNotFound { .. })));
    assert!(matches!(editor.rename("a.txt", "b.txt"), Err(Error::EntryExists { .. })));

    editor.delete("a.txt").unwrap();
    assert!(matches!(editor.delete("a.txt"), Err(Error::EntryNotFound { .. })));
    assert!(matches!(editor.rename("a.txt", "c.txt"), Err(Error::EntryNotFound { .. })));

    editor.update("b.txt", b"new".to_vec()).unwrap();
    assert!(matches!(editor.rename("b.txt", "c.txt"), Err(Error::InvalidArgument(_))));

    assert!(editor.has_pending_operations());
    editor.clear_operations();
    assert!(!editor.has_pending_operations());
    editor.rename("a.txt", "c.txt").unwrap();
}

#[test]
fn test_dropping_editor_restores_state() {
    let mut archive = open(create_archive(&[("a.txt", b"a")]).unwrap());
    {
        let mut editor = archive.edit().unwrap();
        editor.delete("a.txt").unwrap();
    }
    assert_eq!(archive.state(), ArchiveState::Indexed);
    assert_eq!(archive.read_entry(0).unwrap(), b"a");
}

// =============================================================================
// Commit to disk
// =============================================================================

#[test]
fn test_commit_replaces_file_and_reindexes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.zip");
    std::fs::write(&path, create_archive(&[("keep.txt", b"keep"), ("drop.txt", b"drop")]).unwrap())
        .unwrap();

    let mut archive = ZipArchive::open_path(&path).unwrap();
    let mut editor = archive.edit().unwrap();
    editor.delete("drop.txt").unwrap();
    editor.rename("keep.txt", "kept.txt").unwrap();
    editor.add_directory("logs").unwrap();
    let result = editor.commit().unwrap();
    assert_eq!(result.entries_deleted, 1);
    assert_eq!(result.entries_renamed, 1);
    assert_eq!(result.entries_added, 1);

    assert_eq!(archive.state(), ArchiveState::Committed);
    assert_eq!(archive.len(), 2);
    assert_eq!(archive.entries()[1].name(), "logs/");
    let index = archive.find_entry("kept.txt", false).unwrap();
    assert_eq!(archive.read_entry(index).unwrap(), b"keep");

    let reopened = ZipArchive::open_path(&path).unwrap();
    assert_eq!(reopened.len(), 2);
    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1, "temporary file was not cleaned up");
}
