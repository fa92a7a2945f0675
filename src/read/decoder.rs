//! Per-entry decoding pipeline: decryption, decompression, verification.
//!
//! [`EntryDecoder`] pulls archive bytes from a [`BufRead`] and consumes
//! exactly the bytes that belong to the entry. Whatever follows the data
//! (an authentication code, a data descriptor, the next header) is left in
//! the source for the caller.

use std::io::{self, BufRead, Read};

use crate::checksum::Crc32;
use crate::codec::{self, Decoder};
use crate::crypto::Password;
use crate::crypto::zipcrypto::{self, HEADER_LENGTH, ZipCryptoKeys};
use crate::entry::ZipEntry;
use crate::error::PasswordDetectionMethod;
use crate::format::truncated;
use crate::pool::{Pooled, rent_buffer};
use crate::{Error, Result};

#[cfg(feature = "aes")]
use crate::crypto::aes::{AUTH_CODE_LENGTH, TransformMode, VERIFIER_LENGTH, ZipAesTransform};

enum DecryptCipher {
    None,
    ZipCrypto(ZipCryptoKeys),
    #[cfg(feature = "aes")]
    Aes(Box<ZipAesTransform>),
}

impl DecryptCipher {
    /// Reads and checks the encryption header that precedes the data.
    fn read_header<R: Read>(entry: &ZipEntry, password: Option<&Password>, src: &mut R) -> Result<Self> {
        if !entry.is_crypted() {
            return Ok(Self::None);
        }
        let Some(password) = password else {
            return Err(Error::PasswordRequired {
                entry_name: entry.name().to_string(),
            });
        };

        if entry.aes_key_size() > 0 {
            #[cfg(feature = "aes")]
            {
                let bits = entry.aes_key_size();
                let mut salt = vec![0u8; entry.aes_salt_length() as usize];
                src.read_exact(&mut salt).map_err(truncated("AES salt"))?;
                let mut verifier = [0u8; VERIFIER_LENGTH];
                src.read_exact(&mut verifier)
                    .map_err(truncated("AES password verifier"))?;
                let transform = ZipAesTransform::new(password.as_bytes(), &salt, bits, TransformMode::Decrypt)?;
                if transform.password_verifier() != verifier {
                    return Err(Error::InvalidPassword {
                        entry_name: entry.name().to_string(),
                        detection: PasswordDetectionMethod::Verifier,
                    });
                }
                return Ok(Self::Aes(Box::new(transform)));
            }
            #[cfg(not(feature = "aes"))]
            return Err(Error::UnsupportedFeature {
                feature: "WinZip AES encryption (enable the `aes` feature)",
            });
        }

        let mut header = [0u8; HEADER_LENGTH];
        src.read_exact(&mut header)
            .map_err(truncated("encryption header"))?;
        let mut keys = ZipCryptoKeys::new(password.as_bytes());
        let check = zipcrypto::check_byte(
            entry.crc().unwrap_or(0),
            entry.dos_time(),
            entry.has_descriptor(),
        );
        if !keys.check_header(&mut header, check) {
            return Err(Error::InvalidPassword {
                entry_name: entry.name().to_string(),
                detection: PasswordDetectionMethod::CheckByte,
            });
        }
        Ok(Self::ZipCrypto(keys))
    }

    fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    fn decrypt(&mut self, data: &mut [u8]) {
        match self {
            Self::None => {}
            Self::ZipCrypto(keys) => keys.decrypt(data),
            #[cfg(feature = "aes")]
            Self::Aes(transform) => transform.apply_keystream(data),
        }
    }

    fn authenticate(&mut self, ciphertext: &[u8]) {
        #[cfg(feature = "aes")]
        if let Self::Aes(transform) = self {
            transform.update_mac(ciphertext);
        }
        #[cfg(not(feature = "aes"))]
        let _ = ciphertext;
    }
}

/// Decodes the data of one entry.
pub(crate) struct EntryDecoder {
    name: String,
    decoder: Box<dyn Decoder>,
    cipher: DecryptCipher,
    /// Archive bytes of entry data left, when the length is known.
    remaining: Option<u64>,
    /// Plaintext of the unconsumed prefix of the source buffer.
    plain: Pooled<'static, Vec<u8>>,
    crc: Crc32,
    produced: u64,
    compressed: u64,
    check_crc: bool,
    expected_crc: Option<u32>,
    expected_size: Option<u64>,
    deferred: bool,
    at_end: bool,
    done: bool,
}

impl std::fmt::Debug for EntryDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryDecoder")
            .field("name", &self.name)
            .field("remaining", &self.remaining)
            .field("produced", &self.produced)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl EntryDecoder {
    /// Reads the encryption header from `src` and prepares the pipeline.
    ///
    /// With `deferred` set the CRC and size are checked later through
    /// [`verify`](Self::verify), once a data descriptor has been read.
    pub(crate) fn new<R: Read>(
        entry: &ZipEntry,
        password: Option<&Password>,
        src: &mut R,
        deferred: bool,
    ) -> Result<Self> {
        if let Some(feature) = entry.unsupported_feature() {
            return Err(Error::UnsupportedFeature { feature });
        }
        let decoder = codec::build_decoder(entry.compression_method())?;

        let overhead = entry.encryption_overhead();
        let remaining = if entry.compressed_size() >= 0 {
            let compressed = entry.compressed_size() as u64;
            let data = compressed.checked_sub(overhead).ok_or_else(|| {
                Error::MalformedArchive(format!(
                    "entry '{}' is smaller than its encryption overhead",
                    entry.name()
                ))
            })?;
            Some(data)
        } else {
            None
        };
        if remaining.is_none() && !decoder.requires_end_marker() {
            return Err(Error::UnsupportedFeature {
                feature: "stored entry of unknown size",
            });
        }

        let cipher = DecryptCipher::read_header(entry, password, src)?;
        let prefix = match &cipher {
            DecryptCipher::None => 0,
            _ if entry.aes_key_size() > 0 => entry.aes_salt_length() + 2,
            _ => HEADER_LENGTH as u64,
        };

        Ok(Self {
            name: entry.name().to_string(),
            decoder,
            cipher,
            remaining,
            plain: rent_buffer(0),
            crc: Crc32::new(),
            produced: 0,
            compressed: prefix,
            check_crc: entry.aes_vendor_version() != 2 || entry.aes_key_size() == 0,
            expected_crc: entry.crc(),
            expected_size: u64::try_from(entry.size()).ok(),
            deferred,
            at_end: false,
            done: false,
        })
    }

    /// Returns `true` once the data and any authentication code were read
    /// and checked.
    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    /// Uncompressed bytes produced so far.
    pub(crate) fn produced(&self) -> u64 {
        self.produced
    }

    /// Archive bytes consumed so far, encryption framing included.
    pub(crate) fn compressed(&self) -> u64 {
        self.compressed
    }

    /// Decodes into `out`. Returns `0` once the entry is complete; the
    /// integrity checks run on that call.
    pub(crate) fn read<B: BufRead>(&mut self, src: &mut B, out: &mut [u8]) -> Result<usize> {
        if self.done || out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.at_end || (self.remaining == Some(0) && !self.decoder.requires_end_marker()) {
                self.end_of_data(src)?;
                return Ok(0);
            }

            let (status, input_len) = {
                let buf = src.fill_buf()?;
                let limit = match self.remaining {
                    Some(r) => buf.len().min(usize::try_from(r).unwrap_or(usize::MAX)),
                    None => buf.len(),
                };
                let input = &buf[..limit];
                let status = if self.cipher.is_none() {
                    self.decoder.decode(input, out)
                } else {
                    let start = self.plain.len();
                    if start < input.len() {
                        self.plain.extend_from_slice(&input[start..]);
                        self.cipher.decrypt(&mut self.plain[start..]);
                    }
                    self.decoder.decode(&self.plain[..input.len()], out)
                }
                .map_err(|e| self.corrupt(e))?;
                self.cipher.authenticate(&input[..status.consumed]);
                (status, input.len())
            };

            src.consume(status.consumed);
            if !self.cipher.is_none() {
                self.plain.drain(..status.consumed);
            }
            if let Some(r) = self.remaining.as_mut() {
                *r -= status.consumed as u64;
            }
            self.compressed += status.consumed as u64;
            self.crc.update(&out[..status.produced]);
            self.produced += status.produced as u64;

            if status.finished {
                self.at_end = true;
            }
            if status.produced > 0 {
                return Ok(status.produced);
            }
            if status.finished {
                continue;
            }
            if status.consumed == 0 && input_len == 0 {
                return Err(match self.remaining {
                    Some(0) => Error::MalformedArchive(format!(
                        "{} data of '{}' ended before its end marker",
                        self.decoder.method(),
                        self.name
                    )),
                    _ => Error::MalformedArchive(format!("truncated data for entry '{}'", self.name)),
                });
            }
        }
    }

    /// Checks the CRC and size against values from a data descriptor.
    pub(crate) fn verify(&mut self, crc: u32, size: u64) -> Result<()> {
        self.expected_crc = Some(crc);
        self.expected_size = Some(size);
        self.check_totals()
    }

    fn end_of_data<B: BufRead>(&mut self, src: &mut B) -> Result<()> {
        if let Some(extra) = self.remaining.filter(|&r| r > 0) {
            log::warn!(
                "skipping {extra} bytes after the end of the compressed data of '{}'",
                self.name
            );
            self.skip(src, extra)?;
        }
        self.remaining = Some(0);

        #[cfg(feature = "aes")]
        if let DecryptCipher::Aes(transform) = &self.cipher {
            let mut code = [0u8; AUTH_CODE_LENGTH];
            src.read_exact(&mut code)
                .map_err(truncated("AES authentication code"))?;
            self.compressed += AUTH_CODE_LENGTH as u64;
            if !transform.verify_auth_code(&code) {
                self.done = true;
                return Err(Error::AuthenticationFailed {
                    entry_name: self.name.clone(),
                });
            }
        }

        self.done = true;
        if self.deferred {
            return Ok(());
        }
        self.check_totals()
    }

    fn check_totals(&self) -> Result<()> {
        if let Some(size) = self.expected_size {
            if size != self.produced {
                return Err(Error::MalformedArchive(format!(
                    "entry '{}' decoded to {} bytes, expected {size}",
                    self.name, self.produced
                )));
            }
        }
        if let (true, Some(expected)) = (self.check_crc, self.expected_crc) {
            let actual = self.crc.finalize();
            if actual != expected {
                return Err(Error::crc_mismatch(&self.name, expected, actual));
            }
        }
        Ok(())
    }

    fn skip<B: BufRead>(&mut self, src: &mut B, mut count: u64) -> Result<()> {
        while count > 0 {
            let buf = src.fill_buf()?;
            if buf.is_empty() {
                return Err(Error::MalformedArchive(format!("truncated data for entry '{}'", self.name)));
            }
            let n = buf.len().min(usize::try_from(count).unwrap_or(usize::MAX));
            self.cipher.authenticate(&buf[..n]);
            src.consume(n);
            if !self.cipher.is_none() {
                let drained = n.min(self.plain.len());
                self.plain.drain(..drained);
            }
            self.compressed += n as u64;
            count -= n as u64;
        }
        Ok(())
    }

    fn corrupt(&self, e: io::Error) -> Error {
        if e.kind() == io::ErrorKind::InvalidData {
            Error::MalformedArchive(format!("corrupt {} data in '{}': {e}", self.decoder.method(), self.name))
        } else {
            Error::Io(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CompressionMethod;
    use std::io::{BufReader, Cursor};

    fn entry(method: CompressionMethod, data: &[u8], packed: &[u8]) -> ZipEntry {
        let mut entry = ZipEntry::new("e.bin").unwrap();
        entry.set_compression_method(method);
        entry.set_size(data.len() as i64);
        entry.set_compressed_size(packed.len() as i64);
        entry.set_crc(Crc32::compute(data));
        entry
    }

    fn drain(decoder: &mut EntryDecoder, src: &mut impl BufRead) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 100];
        loop {
            let n = decoder.read(src, &mut chunk)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    #[test]
    fn test_stored_leaves_trailing_bytes() {
        let data = b"stored payload";
        let e = entry(CompressionMethod::Stored, data, data);
        let mut bytes = data.to_vec();
        bytes.extend_from_slice(b"NEXT");
        let mut src = BufReader::with_capacity(5, Cursor::new(bytes));
        let mut decoder = EntryDecoder::new(&e, None, &mut src, false).unwrap();
        assert_eq!(drain(&mut decoder, &mut src).unwrap(), data);
        assert!(decoder.is_done());
        let mut rest = Vec::new();
        src.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"NEXT");
    }

    #[test]
    fn test_deflate_unknown_length_stops_at_end_marker() {
        let data = b"deflated payload ".repeat(40);
        let packed = codec::compress(CompressionMethod::Deflated, 6, &data).unwrap();
        let mut e = entry(CompressionMethod::Deflated, &data, &packed);
        e.set_compressed_size(-1);
        e.set_size(-1);
        e.clear_crc();
        let mut bytes = packed.clone();
        bytes.extend_from_slice(b"TAIL");
        let mut src = BufReader::with_capacity(7, Cursor::new(bytes));
        let mut decoder = EntryDecoder::new(&e, None, &mut src, true).unwrap();
        assert_eq!(drain(&mut decoder, &mut src).unwrap(), data);
        assert_eq!(decoder.compressed(), packed.len() as u64);
        decoder.verify(Crc32::compute(&data), data.len() as u64).unwrap();
        let mut rest = Vec::new();
        src.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"TAIL");
    }

    #[test]
    fn test_crc_mismatch_at_end() {
        let data = b"checked";
        let mut e = entry(CompressionMethod::Stored, data, data);
        e.set_crc(0xDEAD_BEEF);
        let mut src = Cursor::new(data.to_vec());
        let mut decoder = EntryDecoder::new(&e, None, &mut src, false).unwrap();
        let mut out = [0u8; 64];
        assert_eq!(decoder.read(&mut src, &mut out).unwrap(), data.len());
        assert!(matches!(
            decoder.read(&mut src, &mut out),
            Err(Error::CrcMismatch { expected: 0xDEAD_BEEF, .. })
        ));
    }

    #[test]
    fn test_truncated_stored_data() {
        let data = b"0123456789";
        let e = entry(CompressionMethod::Stored, data, data);
        let mut src = Cursor::new(data[..4].to_vec());
        let mut decoder = EntryDecoder::new(&e, None, &mut src, false).unwrap();
        assert!(matches!(
            drain(&mut decoder, &mut src),
            Err(Error::MalformedArchive(_))
        ));
    }

    #[test]
    fn test_stored_unknown_size_unsupported() {
        let mut e = ZipEntry::new("s").unwrap();
        e.set_compression_method(CompressionMethod::Stored);
        let mut src = Cursor::new(Vec::new());
        assert!(matches!(
            EntryDecoder::new(&e, None, &mut src, true),
            Err(Error::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn test_zipcrypto_roundtrip_and_wrong_password() {
        let data = b"secret text".repeat(20);
        let mut e = entry(CompressionMethod::Stored, &data, &data);
        e.set_crypted(true);
        e.set_compressed_size(data.len() as i64 + 12);

        let password = Password::new("right");
        let mut keys = ZipCryptoKeys::new(password.as_bytes());
        let check = zipcrypto::check_byte(Crc32::compute(&data), e.dos_time(), false);
        let mut bytes = keys.encryption_header(check).unwrap().to_vec();
        let mut body = data.clone();
        keys.encrypt(&mut body);
        bytes.extend_from_slice(&body);

        let mut src = BufReader::with_capacity(16, Cursor::new(bytes.clone()));
        let mut decoder = EntryDecoder::new(&e, Some(&password), &mut src, false).unwrap();
        assert_eq!(drain(&mut decoder, &mut src).unwrap(), data);

        let mut src = Cursor::new(bytes);
        let wrong = Password::new("wrong");
        match EntryDecoder::new(&e, Some(&wrong), &mut src, false) {
            Err(Error::InvalidPassword { detection, .. }) => {
                assert_eq!(detection, PasswordDetectionMethod::CheckByte)
            }
            // One wrong password in 256 passes the check byte.
            Ok(mut decoder) => assert!(drain(&mut decoder, &mut src).is_err()),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_password_required() {
        let data = b"x";
        let mut e = entry(CompressionMethod::Stored, data, data);
        e.set_crypted(true);
        e.set_compressed_size(13);
        let mut src = Cursor::new(vec![0u8; 13]);
        assert!(matches!(
            EntryDecoder::new(&e, None, &mut src, false),
            Err(Error::PasswordRequired { .. })
        ));
    }

    #[cfg(feature = "aes")]
    #[test]
    fn test_aes_tampering_detected() {
        use crate::crypto::aes::generate_salt;

        let data = b"authenticated".repeat(10);
        let mut e = entry(CompressionMethod::Stored, &data, &data);
        e.set_crypted(true);
        e.set_aes_key_size(128).unwrap();
        e.set_compressed_size((data.len() as u64 + e.encryption_overhead()) as i64);

        let salt = generate_salt(128).unwrap();
        let mut enc = ZipAesTransform::new(b"Ahoy", &salt, 128, TransformMode::Encrypt).unwrap();
        let mut body = data.clone();
        enc.encrypt(&mut body).unwrap();
        let mut bytes = salt.clone();
        bytes.extend_from_slice(&enc.password_verifier());
        bytes.extend_from_slice(&body);
        bytes.extend_from_slice(&enc.auth_code());

        let password = Password::new("Ahoy");
        let mut src = BufReader::with_capacity(9, Cursor::new(bytes.clone()));
        let mut decoder = EntryDecoder::new(&e, Some(&password), &mut src, false).unwrap();
        assert_eq!(drain(&mut decoder, &mut src).unwrap(), data);

        let last = bytes.len() - 11;
        bytes[last] ^= 0x01;
        let mut src = Cursor::new(bytes);
        let mut decoder = EntryDecoder::new(&e, Some(&password), &mut src, false).unwrap();
        assert!(matches!(
            drain(&mut decoder, &mut src),
            Err(Error::AuthenticationFailed { .. })
        ));
    }
}
