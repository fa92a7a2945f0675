//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};

use rand::{Rng, SeedableRng};
use zipwright::{
    CompressionMethod, WriteOptions, ZipArchive, ZipEntry, ZipReader, ZipWriter,
};

/// Creates an in-memory archive from `(name, data)` pairs, using the seekable
/// writer with the given options.
pub fn create_archive_with_options(
    options: WriteOptions,
    entries: &[(&str, &[u8])],
) -> zipwright::Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new())).with_options(options.stream_owner(false));
    for (name, data) in entries {
        writer.write_entry(ZipEntry::new(*name)?, data)?;
    }
    Ok(writer.close()?.map(Cursor::into_inner).unwrap_or_default())
}

/// Creates an in-memory archive with default options.
pub fn create_archive(entries: &[(&str, &[u8])]) -> zipwright::Result<Vec<u8>> {
    create_archive_with_options(WriteOptions::new(), entries)
}

/// Creates an archive through the non-seekable writer. Entry data is written
/// through `Write` so sizes are unknown when each header goes out.
pub fn create_streamed_archive(
    options: WriteOptions,
    method: CompressionMethod,
    entries: &[(&str, &[u8])],
) -> zipwright::Result<Vec<u8>> {
    let mut writer = ZipWriter::new_streaming(Vec::new()).with_options(options.stream_owner(false));
    for (name, data) in entries {
        let mut entry = ZipEntry::new(*name)?;
        entry.set_compression_method(method);
        writer.put_next_entry(entry)?;
        writer.write_all(data)?;
    }
    Ok(writer.close()?.unwrap_or_default())
}

/// Extracts the error from a Result, panicking if it's Ok.
pub fn expect_err<T, E>(result: Result<T, E>) -> E {
    match result {
        Ok(_) => panic!("Expected error but got Ok"),
        Err(e) => e,
    }
}

/// Deterministic pseudo-random bytes.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.r#gen::<u8>()).collect()
}

/// Compressible text of roughly `len` bytes.
pub fn text_bytes(len: usize) -> Vec<u8> {
    b"The quick brown fox jumps over the lazy dog. "
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

/// Verifies archive integrity and content through the random-access index.
///
/// # Panics
///
/// Panics if the archive cannot be opened, an entry fails its integrity
/// check, or the content differs from `expected_entries`.
pub fn verify_archive_contents(archive_bytes: &[u8], expected_entries: &[(&str, &[u8])]) {
    let mut archive =
        ZipArchive::open(Cursor::new(archive_bytes.to_vec())).expect("Failed to open archive for verification");

    let test_result = archive.test_archive().expect("Archive test failed");
    assert!(test_result.is_ok(), "Integrity check failed: {:?}", test_result.failures);

    let file_count = archive.entries().iter().filter(|e| !e.is_directory()).count();
    assert_eq!(file_count, expected_entries.len(), "Entry count mismatch");

    for (name, expected) in expected_entries {
        let index = archive
            .find_entry(name, false)
            .unwrap_or_else(|| panic!("Entry '{}' not found", name));
        let data = archive
            .read_entry(index)
            .unwrap_or_else(|e| panic!("Failed to read '{}': {}", name, e));
        assert_eq!(&data, expected, "Content mismatch for '{}'", name);
    }
}

/// Reads every entry front to back with the sequential reader.
pub fn read_streamed(bytes: &[u8], password: Option<&str>) -> zipwright::Result<Vec<(String, Vec<u8>)>> {
    let mut reader = ZipReader::new(Cursor::new(bytes));
    reader.set_password(password.map(zipwright::Password::new));
    let mut out = Vec::new();
    while let Some(entry) = reader.next_entry()? {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(zipwright::Error::from_io)?;
        out.push((entry.name().to_string(), data));
    }
    Ok(out)
}
