//! Encrypted entries: AES round trips, wrong and missing passwords, tampering.

#![cfg(feature = "aes")]

mod common;

use std::io::{Cursor, Read};

use common::{create_archive_with_options, expect_err, read_streamed, text_bytes};
use zipwright::{
    ArchiveOptions, CompressionMethod, EncryptionMethod, Error, Password, PasswordDetectionMethod,
    ReadOptions, WriteOptions, ZipArchive, ZipEntry, ZipReader, ZipWriter,
};

const PASSWORD: &str = "correct horse battery staple";

fn encrypted(method: EncryptionMethod, entries: &[(&str, &[u8])]) -> Vec<u8> {
    create_archive_with_options(
        WriteOptions::new().password(PASSWORD).encryption(method),
        entries,
    )
    .unwrap()
}

fn open_with(bytes: Vec<u8>, password: &str) -> ZipArchive<Cursor<Vec<u8>>> {
    ZipArchive::open_with_options(Cursor::new(bytes), ArchiveOptions::new().password(password))
        .unwrap()
}

// =============================================================================
// Round trips
// =============================================================================

#[test]
fn test_aes_roundtrip_both_key_sizes() {
    let data = text_bytes(25_000);
    for (method, bits) in [(EncryptionMethod::Aes128, 128), (EncryptionMethod::Aes256, 256)] {
        let bytes = encrypted(method, &[("secret.txt", &data), ("tiny.txt", b"x")]);
        let mut archive = open_with(bytes, PASSWORD);

        let entry = &archive.entries()[0];
        assert!(entry.is_crypted());
        assert_eq!(entry.aes_key_size(), bits);
        assert_eq!(entry.aes_vendor_version(), 2);
        assert_eq!(entry.compression_method(), CompressionMethod::Deflated);

        assert_eq!(archive.read_entry(0).unwrap(), data);
        assert_eq!(archive.read_entry(1).unwrap(), b"x");
        assert!(archive.test_archive().unwrap().is_ok());
    }
}

#[test]
fn test_aes_stored_roundtrip() {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()))
        .with_options(WriteOptions::new().password(PASSWORD).stream_owner(false));
    let mut entry = ZipEntry::new("raw.bin").unwrap();
    entry.set_compression_method(CompressionMethod::Stored);
    writer.write_entry(entry, b"stored but encrypted").unwrap();
    let bytes = writer.close().unwrap().unwrap().into_inner();

    assert!(!bytes.windows(6).any(|w| w == b"stored"), "plaintext leaked");
    let mut archive = open_with(bytes, PASSWORD);
    assert_eq!(archive.entries()[0].compression_method(), CompressionMethod::Stored);
    assert_eq!(archive.read_entry(0).unwrap(), b"stored but encrypted");
}

#[test]
fn test_aes_streaming_roundtrip() {
    let data = text_bytes(9_000);
    let mut writer = ZipWriter::new_streaming(Vec::new())
        .with_options(WriteOptions::new().password(PASSWORD).stream_owner(false));
    writer.put_next_entry(ZipEntry::new("piped.txt").unwrap()).unwrap();
    std::io::Write::write_all(&mut writer, &data).unwrap();
    let bytes = writer.close().unwrap().unwrap();

    let streamed = read_streamed(&bytes, Some(PASSWORD)).unwrap();
    assert_eq!(streamed[0].1, data);
    let mut archive = open_with(bytes, PASSWORD);
    assert_eq!(archive.read_entry(0).unwrap(), data);
}

#[test]
fn test_directories_never_encrypted() {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()))
        .with_options(WriteOptions::new().password(PASSWORD).stream_owner(false));
    writer.add_directory("folder").unwrap();
    writer.write_entry(ZipEntry::new("folder/file.txt").unwrap(), b"f").unwrap();
    let bytes = writer.close().unwrap().unwrap().into_inner();

    let archive = ZipArchive::open(Cursor::new(bytes)).unwrap();
    assert!(!archive.entries()[0].is_crypted());
    assert!(archive.entries()[1].is_crypted());
}

#[test]
fn test_empty_password_means_no_encryption() {
    let bytes = create_archive_with_options(WriteOptions::new().password(""), &[("open.txt", b"o")])
        .unwrap();
    let mut archive = ZipArchive::open(Cursor::new(bytes)).unwrap();
    assert!(!archive.entries()[0].is_crypted());
    assert_eq!(archive.read_entry(0).unwrap(), b"o");
}

#[test]
fn test_mixed_archive() {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()))
        .with_options(WriteOptions::new().stream_owner(false));
    writer.write_entry(ZipEntry::new("plain.txt").unwrap(), b"plain").unwrap();
    writer.set_password(Some(Password::new(PASSWORD)));
    writer.write_entry(ZipEntry::new("hidden.txt").unwrap(), b"hidden").unwrap();
    writer.set_password(None);
    writer.write_entry(ZipEntry::new("plain2.txt").unwrap(), b"plain2").unwrap();
    let bytes = writer.close().unwrap().unwrap().into_inner();

    let mut archive = ZipArchive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.read_entry(0).unwrap(), b"plain");
    assert!(matches!(archive.read_entry(1), Err(Error::PasswordRequired { .. })));
    assert_eq!(archive.read_entry(2).unwrap(), b"plain2");

    archive.set_password(PASSWORD);
    assert_eq!(archive.read_entry(1).unwrap(), b"hidden");
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_wrong_password_detected_by_verifier() {
    for method in [EncryptionMethod::Aes128, EncryptionMethod::Aes256] {
        let bytes = encrypted(method, &[("secret.txt", b"x")]);
        let mut archive = open_with(bytes, "not the password");
        match expect_err(archive.read_entry(0)) {
            Error::InvalidPassword {
                entry_name,
                detection,
            } => {
                assert_eq!(entry_name, "secret.txt");
                assert_eq!(detection, PasswordDetectionMethod::Verifier);
            }
            // The 2-byte verifier passes one time in 65536; the HMAC catches it.
            Error::AuthenticationFailed { entry_name } => assert_eq!(entry_name, "secret.txt"),
            other => panic!("{method:?}: expected InvalidPassword, got {other:?}"),
        }
    }
}

#[test]
fn test_missing_password() {
    let bytes = encrypted(EncryptionMethod::Aes128, &[("secret.txt", b"top secret")]);
    let mut archive = ZipArchive::open(Cursor::new(bytes)).unwrap();
    let err = expect_err(archive.read_entry(0));
    assert!(err.is_encryption_error());
    assert_eq!(err.entry_name(), Some("secret.txt"));

    let report = archive.test_archive().unwrap();
    assert!(report.is_err());
}

#[test]
fn test_tampered_ciphertext_fails_authentication() {
    let payload = text_bytes(200);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()))
        .with_options(WriteOptions::new().password(PASSWORD).stream_owner(false));
    let mut entry = ZipEntry::new("signed.txt").unwrap();
    entry.set_compression_method(CompressionMethod::Stored);
    writer.write_entry(entry, &payload).unwrap();
    let mut bytes = writer.close().unwrap().unwrap().into_inner();

    // The entry data ends with a 10-byte authentication code right before
    // the central directory.
    let central = bytes
        .windows(4)
        .position(|w| w == 0x02014b50u32.to_le_bytes())
        .unwrap();
    bytes[central - 10 - 20] ^= 0x80;

    let mut archive = open_with(bytes, PASSWORD);
    let err = expect_err(archive.read_entry(0));
    assert!(matches!(err, Error::AuthenticationFailed { .. }), "{err:?}");
    assert!(err.is_security_error());
    assert!(err.is_integrity_failure());
}

#[test]
fn test_unsupported_aes_strength_only_disables_that_entry() {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()))
        .with_options(WriteOptions::new().stream_owner(false));
    writer.set_password(Some(Password::new(PASSWORD)));
    writer.write_entry(ZipEntry::new("locked.txt").unwrap(), b"locked").unwrap();
    writer.set_password(None);
    writer.write_entry(ZipEntry::new("open.txt").unwrap(), b"open").unwrap();
    let mut bytes = writer.close().unwrap().unwrap().into_inner();

    // 0x9901 block: tag, length 7, AE-2, "AE", then the strength byte.
    let prefix = [0x01, 0x99, 0x07, 0x00, 0x02, 0x00, b'A', b'E'];
    let positions: Vec<usize> = bytes
        .windows(prefix.len())
        .enumerate()
        .filter(|(_, w)| *w == prefix)
        .map(|(i, _)| i + prefix.len())
        .collect();
    assert_eq!(positions.len(), 2, "local and central AES blocks");
    for position in positions {
        bytes[position] = 2;
    }

    let mut archive = open_with(bytes.clone(), PASSWORD);
    let locked = &archive.entries()[0];
    assert_eq!(locked.unsupported_feature(), Some("AES-192 encryption"));
    assert!(!locked.can_decompress());
    assert_eq!(archive.read_entry(1).unwrap(), b"open");
    let err = expect_err(archive.read_entry(0));
    assert!(matches!(err, Error::UnsupportedFeature { .. }), "{err:?}");

    let report = archive.test_archive().unwrap();
    assert_eq!(report.entries_passed, 1);
    assert_eq!(report.entries_failed, 1);

    let mut reader =
        ZipReader::with_options(Cursor::new(bytes), ReadOptions::new().password(PASSWORD));
    reader.next_entry().unwrap().unwrap();
    let err = Error::from_io(reader.read(&mut [0u8; 8]).unwrap_err());
    assert!(err.is_unsupported(), "{err:?}");
    let open = reader.next_entry().unwrap().unwrap();
    assert_eq!(open.name(), "open.txt");
    let mut text = String::new();
    reader.read_to_string(&mut text).unwrap();
    assert_eq!(text, "open");
}

// =============================================================================
// Sequential reader
// =============================================================================

#[test]
fn test_reader_password_required_is_recoverable() {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()))
        .with_options(WriteOptions::new().stream_owner(false));
    writer.set_password(Some(Password::new(PASSWORD)));
    writer.write_entry(ZipEntry::new("locked.txt").unwrap(), b"locked").unwrap();
    writer.set_password(None);
    writer.write_entry(ZipEntry::new("open.txt").unwrap(), b"open").unwrap();
    let bytes = writer.close().unwrap().unwrap().into_inner();

    let mut reader = ZipReader::new(Cursor::new(bytes));
    let locked = reader.next_entry().unwrap().unwrap();
    assert!(locked.is_crypted());
    let mut data = Vec::new();
    let err = Error::from_io(reader.read_to_end(&mut data).unwrap_err());
    assert!(matches!(err, Error::PasswordRequired { .. }), "{err:?}");

    let open = reader.next_entry().unwrap().unwrap();
    assert_eq!(open.name(), "open.txt");
    let mut text = String::new();
    reader.read_to_string(&mut text).unwrap();
    assert_eq!(text, "open");
}

#[test]
fn test_reader_wrong_password_is_fatal() {
    let bytes = encrypted(EncryptionMethod::Aes256, &[("a.txt", b"a"), ("b.txt", b"b")]);
    let mut reader =
        ZipReader::with_options(Cursor::new(bytes), ReadOptions::new().password("wrong"));
    reader.next_entry().unwrap().unwrap();
    let mut data = Vec::new();
    let err = Error::from_io(reader.read_to_end(&mut data).unwrap_err());
    assert!(matches!(err, Error::InvalidPassword { .. }), "{err:?}");
    assert!(reader.next_entry().is_err());
}

// =============================================================================
// Classic encryption
// =============================================================================

#[cfg(feature = "legacy-crypto")]
#[test]
fn test_zipcrypto_roundtrip_and_wrong_password() {
    let data = text_bytes(3_000);
    let bytes = encrypted(EncryptionMethod::ZipCrypto, &[("legacy.txt", &data)]);

    let mut archive = open_with(bytes.clone(), PASSWORD);
    assert_eq!(archive.entries()[0].aes_key_size(), 0);
    assert_eq!(archive.read_entry(0).unwrap(), data);
    assert_eq!(read_streamed(&bytes, Some(PASSWORD)).unwrap()[0].1, data);

    let mut archive = open_with(bytes, "nope");
    match archive.read_entry(0) {
        Err(Error::InvalidPassword { detection, .. }) => {
            assert_eq!(detection, PasswordDetectionMethod::CheckByte)
        }
        // The check byte passes one time in 256; the CRC catches the rest.
        Err(e) => assert!(e.is_corruption() || e.is_integrity_failure(), "{e:?}"),
        Ok(_) => panic!("wrong password accepted"),
    }
}
