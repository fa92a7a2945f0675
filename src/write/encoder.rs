//! Per-entry encoding pipeline: checksum, compression, encryption.

use std::io::{self, Write};

use crate::checksum::Crc32;
use crate::codec::{self, Encoder};
use crate::crypto::Password;
use crate::crypto::zipcrypto::{self, ZipCryptoKeys};
use crate::entry::ZipEntry;
use crate::pool::{Pooled, rent_buffer};
use crate::{Error, Result};

#[cfg(feature = "aes")]
use crate::crypto::aes::{self, TransformMode, ZipAesTransform};

/// Cipher applied to compressed bytes.
pub(crate) enum EntryCipher {
    None,
    ZipCrypto(ZipCryptoKeys),
    #[cfg(feature = "aes")]
    Aes(Box<ZipAesTransform>),
}

impl EntryCipher {
    /// Builds the cipher for an entry and the bytes that precede its data:
    /// the 12-byte classic header, or the AES salt and verifier.
    pub(crate) fn for_entry(entry: &ZipEntry, password: Option<&Password>) -> Result<(Self, Vec<u8>)> {
        if !entry.is_crypted() {
            return Ok((Self::None, Vec::new()));
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
                let salt = aes::generate_salt(bits)?;
                let transform =
                    ZipAesTransform::new(password.as_bytes(), &salt, bits, TransformMode::Encrypt)?;
                let mut prefix = salt;
                prefix.extend_from_slice(&transform.password_verifier());
                return Ok((Self::Aes(Box::new(transform)), prefix));
            }
            #[cfg(not(feature = "aes"))]
            return Err(Error::UnsupportedFeature {
                feature: "WinZip AES encryption (enable the `aes` feature)",
            });
        }

        let mut keys = ZipCryptoKeys::new(password.as_bytes());
        let check = zipcrypto::check_byte(
            entry.crc().unwrap_or(0),
            entry.dos_time(),
            entry.has_descriptor(),
        );
        let header = keys.encryption_header(check)?;
        Ok((Self::ZipCrypto(keys), header.to_vec()))
    }

    fn encrypt(&mut self, data: &mut [u8]) -> io::Result<()> {
        match self {
            Self::None => Ok(()),
            Self::ZipCrypto(keys) => {
                keys.encrypt(data);
                Ok(())
            }
            #[cfg(feature = "aes")]
            Self::Aes(transform) => transform.encrypt(data).map_err(crate::error::to_io_error),
        }
    }

    fn trailer(&self) -> Vec<u8> {
        match self {
            #[cfg(feature = "aes")]
            Self::Aes(transform) => transform.auth_code().to_vec(),
            _ => Vec::new(),
        }
    }
}

/// What an entry amounted to once its data is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryTotals {
    pub crc: u32,
    pub size: u64,
    pub compressed_size: u64,
}

/// Encodes the data of one entry into the archive stream.
pub(crate) struct EntryEncoder {
    encoder: Box<dyn Encoder>,
    cipher: EntryCipher,
    prefix: Vec<u8>,
    crc: Crc32,
    size: u64,
    written: u64,
    buffer: Pooled<'static, Vec<u8>>,
}

impl EntryEncoder {
    pub(crate) fn new(entry: &ZipEntry, level: u32, password: Option<&Password>) -> Result<Self> {
        let encoder = codec::build_encoder(entry.compression_method(), level)?;
        let (cipher, prefix) = EntryCipher::for_entry(entry, password)?;
        Ok(Self {
            encoder,
            cipher,
            prefix,
            crc: Crc32::new(),
            size: 0,
            written: 0,
            buffer: rent_buffer(0),
        })
    }

    /// Writes the encryption header, if any. Call once before any data.
    pub(crate) fn start<W: Write>(&mut self, sink: &mut W) -> io::Result<()> {
        sink.write_all(&self.prefix)?;
        self.written += self.prefix.len() as u64;
        self.prefix.clear();
        Ok(())
    }

    /// Uncompressed bytes accepted so far.
    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// Archive bytes produced so far, encryption header included.
    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    pub(crate) fn write<W: Write>(&mut self, data: &[u8], sink: &mut W) -> io::Result<()> {
        self.crc.update(data);
        self.size += data.len() as u64;
        self.buffer.clear();
        self.encoder.encode(data, &mut self.buffer)?;
        self.emit(sink)
    }

    /// Flushes the compressor and appends the AES authentication code.
    pub(crate) fn finish<W: Write>(&mut self, sink: &mut W) -> io::Result<EntryTotals> {
        self.buffer.clear();
        self.encoder.finish(&mut self.buffer)?;
        self.emit(sink)?;
        let trailer = self.cipher.trailer();
        sink.write_all(&trailer)?;
        self.written += trailer.len() as u64;
        Ok(EntryTotals {
            crc: self.crc.finalize(),
            size: self.size,
            compressed_size: self.written,
        })
    }

    fn emit<W: Write>(&mut self, sink: &mut W) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.cipher.encrypt(&mut self.buffer)?;
        sink.write_all(&self.buffer)?;
        self.written += self.buffer.len() as u64;
        Ok(())
    }
}
