//! Entry encryption.
//!
//! Two schemes exist and an entry uses at most one of them:
//!
//! - [`zipcrypto`]: the classic PKWARE stream cipher, read everywhere but
//!   only written in test builds or with the `legacy-crypto` feature.
//! - [`aes`] (feature `aes`): WinZip AES-128/256 in CTR mode with an
//!   HMAC-SHA1 authentication code.

#[cfg(feature = "aes")]
pub mod aes;
mod password;
pub mod zipcrypto;

pub use password::Password;

use crate::{Error, Result};

/// Encryption applied to new entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionMethod {
    /// No encryption.
    None,
    /// Classic ZipCrypto. Weak; only available for compatibility testing.
    #[cfg(any(test, feature = "legacy-crypto"))]
    ZipCrypto,
    /// WinZip AES with a 128-bit key.
    Aes128,
    /// WinZip AES with a 256-bit key.
    #[default]
    Aes256,
}

impl EncryptionMethod {
    /// AES key size in bits, `0` for other methods.
    pub fn aes_key_size(self) -> u16 {
        match self {
            Self::Aes128 => 128,
            Self::Aes256 => 256,
            _ => 0,
        }
    }

    /// Returns `true` for anything but [`EncryptionMethod::None`].
    pub fn is_encrypted(self) -> bool {
        self != Self::None
    }
}

/// Fills `buf` with bytes from the operating system's CSPRNG.
pub(crate) fn random_bytes(buf: &mut [u8]) -> Result<()> {
    getrandom::getrandom(buf).map_err(|e| Error::CryptoError(format!("random source failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_key_sizes() {
        assert_eq!(EncryptionMethod::Aes128.aes_key_size(), 128);
        assert_eq!(EncryptionMethod::Aes256.aes_key_size(), 256);
        assert_eq!(EncryptionMethod::ZipCrypto.aes_key_size(), 0);
        assert_eq!(EncryptionMethod::None.aes_key_size(), 0);
        assert_eq!(EncryptionMethod::default(), EncryptionMethod::Aes256);
    }

    #[test]
    fn test_random_bytes_fill() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        random_bytes(&mut a).unwrap();
        random_bytes(&mut b).unwrap();
        assert_ne!(a, b);
    }
}
