//! Classic PKWARE stream cipher ("ZipCrypto").
//!
//! The cipher is weak and only kept for compatibility: every archive can be
//! read, but new entries use it only in test builds or with the
//! `legacy-crypto` feature.
//!
//! Three 32-bit keys are initialised from the password and then advanced by
//! every plaintext byte. A 12-byte header of random bytes precedes the
//! encrypted payload; its last byte doubles as a one-byte password check.

use zeroize::Zeroize;

use crate::checksum::crc32_update_byte;
use crate::crypto::random_bytes;
use crate::Result;

/// Length of the encryption header.
pub const HEADER_LENGTH: usize = 12;

const INITIAL_KEYS: [u32; 3] = [0x1234_5678, 0x2345_6789, 0x3456_7890];

/// Running key state of the classic cipher.
///
/// Cleared on drop.
#[derive(Clone)]
pub struct ZipCryptoKeys {
    keys: [u32; 3],
}

impl std::fmt::Debug for ZipCryptoKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipCryptoKeys").finish_non_exhaustive()
    }
}

impl ZipCryptoKeys {
    /// Derives the initial key state from a password.
    pub fn new(password: &[u8]) -> Self {
        let mut keys = Self { keys: INITIAL_KEYS };
        for &byte in password {
            keys.update(byte);
        }
        keys
    }

    fn update(&mut self, plain: u8) {
        let [k0, k1, k2] = &mut self.keys;
        *k0 = crc32_update_byte(*k0, plain);
        *k1 = k1
            .wrapping_add(*k0 & 0xFF)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        *k2 = crc32_update_byte(*k2, (*k1 >> 24) as u8);
    }

    fn stream_byte(&self) -> u8 {
        let temp = (self.keys[2] | 2) & 0xFFFF;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    /// Encrypts one byte.
    pub fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let cipher = plain ^ self.stream_byte();
        self.update(plain);
        cipher
    }

    /// Decrypts one byte.
    pub fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let plain = cipher ^ self.stream_byte();
        self.update(plain);
        plain
    }

    /// Encrypts a buffer in place.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        for byte in data {
            *byte = self.encrypt_byte(*byte);
        }
    }

    /// Decrypts a buffer in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data {
            *byte = self.decrypt_byte(*byte);
        }
    }

    /// Builds and encrypts a header ending in `check_byte`.
    pub fn encryption_header(&mut self, check_byte: u8) -> Result<[u8; HEADER_LENGTH]> {
        let mut header = [0u8; HEADER_LENGTH];
        random_bytes(&mut header[..HEADER_LENGTH - 1])?;
        header[HEADER_LENGTH - 1] = check_byte;
        self.encrypt(&mut header);
        Ok(header)
    }

    /// Decrypts a header and compares its last byte to `check_byte`.
    pub fn check_header(&mut self, header: &mut [u8; HEADER_LENGTH], check_byte: u8) -> bool {
        self.decrypt(header);
        header[HEADER_LENGTH - 1] == check_byte
    }
}

impl Drop for ZipCryptoKeys {
    fn drop(&mut self) {
        self.keys.zeroize();
    }
}

/// The byte the header check compares against.
///
/// With a data descriptor the CRC is not known when the header is written,
/// so bits 8..16 of the DOS time are used instead.
pub(crate) fn check_byte(crc: u32, dos_time: u32, has_descriptor: bool) -> u8 {
    if has_descriptor {
        (dos_time >> 8) as u8
    } else {
        (crc >> 24) as u8
    }
}
