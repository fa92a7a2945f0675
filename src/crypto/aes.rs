//! WinZip AES encryption (AE-1 / AE-2).
//!
//! - PBKDF2-HMAC-SHA1 with 1000 iterations derives the cipher key, the
//!   authentication key and a 2-byte password verifier from the password
//!   and a random per-entry salt.
//! - AES in CTR mode with a little-endian counter starting at 1 encrypts
//!   the compressed data.
//! - HMAC-SHA1 over the ciphertext, truncated to 10 bytes, is appended
//!   after the payload.
//!
//! On disk an entry is `salt ‖ verifier ‖ ciphertext ‖ auth code`.

use aes::{Aes128, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::Zeroizing;

use crate::{Error, Result};

type Aes128Ctr = ctr::Ctr128LE<Aes128>;
type Aes256Ctr = ctr::Ctr128LE<Aes256>;
type HmacSha1 = Hmac<Sha1>;

/// PBKDF2 iteration count fixed by the format.
pub const KEY_DERIVATION_ITERATIONS: u32 = 1000;

/// Length of the password verifier.
pub const VERIFIER_LENGTH: usize = 2;

/// Length of the truncated authentication code.
pub const AUTH_CODE_LENGTH: usize = 10;

/// Direction a transform was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    /// Plaintext in, ciphertext out.
    Encrypt,
    /// Ciphertext in, plaintext out.
    Decrypt,
}

/// Salt length for a key size in bits.
///
/// # Errors
///
/// Returns [`Error::CryptoError`] for key sizes other than 128 and 256.
pub fn salt_length(key_size_bits: u16) -> Result<usize> {
    match key_size_bits {
        128 => Ok(8),
        256 => Ok(16),
        _ => Err(Error::CryptoError("invalid block size".into())),
    }
}

/// Generates a random salt for a key size in bits.
pub fn generate_salt(key_size_bits: u16) -> Result<Vec<u8>> {
    let mut salt = vec![0u8; salt_length(key_size_bits)?];
    super::random_bytes(&mut salt)?;
    Ok(salt)
}

enum Keystream {
    Aes128(Aes128Ctr),
    Aes256(Aes256Ctr),
}

impl Keystream {
    fn apply(&mut self, data: &mut [u8]) {
        match self {
            Self::Aes128(c) => c.apply_keystream(data),
            Self::Aes256(c) => c.apply_keystream(data),
        }
    }
}

/// Per-entry AES-CTR + HMAC-SHA1 transform.
///
/// # Examples
///
/// ```rust
/// use zipwright::crypto::aes::{generate_salt, TransformMode, ZipAesTransform};
///
/// let salt = generate_salt(256)?;
/// let mut data = *b"payload";
///
/// let mut enc = ZipAesTransform::new(b"Ahoy", &salt, 256, TransformMode::Encrypt)?;
/// enc.encrypt(&mut data)?;
/// let code = enc.auth_code();
///
/// let mut dec = ZipAesTransform::new(b"Ahoy", &salt, 256, TransformMode::Decrypt)?;
/// assert_eq!(dec.password_verifier(), enc.password_verifier());
/// dec.decrypt(&mut data)?;
/// assert_eq!(&data, b"payload");
/// assert!(dec.verify_auth_code(&code));
/// # Ok::<(), zipwright::Error>(())
/// ```
pub struct ZipAesTransform {
    keystream: Keystream,
    mac: HmacSha1,
    verifier: [u8; VERIFIER_LENGTH],
    mode: TransformMode,
}

impl std::fmt::Debug for ZipAesTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipAesTransform")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl ZipAesTransform {
    /// Derives the keys and sets up the transform.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CryptoError`] if the key size is not 128 or 256
    /// bits, or the salt length does not match it.
    pub fn new(password: &[u8], salt: &[u8], key_size_bits: u16, mode: TransformMode) -> Result<Self> {
        let expected_salt = salt_length(key_size_bits)?;
        if salt.len() != expected_salt {
            return Err(Error::CryptoError("invalid salt length".into()));
        }
        let key_length = usize::from(key_size_bits / 8);
        let mut derived = Zeroizing::new(vec![0u8; key_length * 2 + VERIFIER_LENGTH]);
        pbkdf2::pbkdf2_hmac::<Sha1>(password, salt, KEY_DERIVATION_ITERATIONS, &mut derived);

        let (cipher_key, rest) = derived.split_at(key_length);
        let (auth_key, verifier) = rest.split_at(key_length);

        let mut iv = [0u8; 16];
        iv[0] = 1;
        let invalid = |_| Error::CryptoError("invalid block size".into());
        let keystream = match key_size_bits {
            128 => Keystream::Aes128(Aes128Ctr::new_from_slices(cipher_key, &iv).map_err(invalid)?),
            _ => Keystream::Aes256(Aes256Ctr::new_from_slices(cipher_key, &iv).map_err(invalid)?),
        };
        let mac = <HmacSha1 as Mac>::new_from_slice(auth_key)
            .map_err(|_| Error::CryptoError("invalid authentication key".into()))?;

        Ok(Self {
            keystream,
            mac,
            verifier: [verifier[0], verifier[1]],
            mode,
        })
    }

    /// The 2-byte password verifier stored after the salt.
    pub fn password_verifier(&self) -> [u8; VERIFIER_LENGTH] {
        self.verifier
    }

    /// The direction this transform was created for.
    pub fn mode(&self) -> TransformMode {
        self.mode
    }

    fn require(&self, mode: TransformMode) -> Result<()> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(Error::CryptoError(format!(
                "transform created for {:?} cannot be used for {:?}",
                self.mode, mode
            )))
        }
    }

    /// Encrypts `data` in place and authenticates the ciphertext.
    pub fn encrypt(&mut self, data: &mut [u8]) -> Result<()> {
        self.require(TransformMode::Encrypt)?;
        self.keystream.apply(data);
        self.mac.update(data);
        Ok(())
    }

    /// Authenticates `data` and decrypts it in place.
    pub fn decrypt(&mut self, data: &mut [u8]) -> Result<()> {
        self.require(TransformMode::Decrypt)?;
        self.mac.update(data);
        self.keystream.apply(data);
        Ok(())
    }

    /// Applies the keystream without touching the MAC.
    pub(crate) fn apply_keystream(&mut self, data: &mut [u8]) {
        self.keystream.apply(data);
    }

    /// Feeds ciphertext to the MAC.
    pub(crate) fn update_mac(&mut self, ciphertext: &[u8]) {
        self.mac.update(ciphertext);
    }

    /// The truncated authentication code over everything seen so far.
    pub fn auth_code(&self) -> [u8; AUTH_CODE_LENGTH] {
        let full = self.mac.clone().finalize().into_bytes();
        let mut code = [0u8; AUTH_CODE_LENGTH];
        code.copy_from_slice(&full[..AUTH_CODE_LENGTH]);
        code
    }

    /// Compares `code` with the computed authentication code in constant
    /// time.
    pub fn verify_auth_code(&self, code: &[u8]) -> bool {
        code.len() == AUTH_CODE_LENGTH && self.mac.clone().verify_truncated_left(code).is_ok()
    }
}
