//! Seekable AES-256-CTR codec.
//!
//! The persisted form of an object is a [`CipherEnvelope`]: a random 16-byte
//! IV followed by the ciphertext. In counter mode the keystream for byte
//! position `p` depends only on `(iv, p / block_size)`, so a reader can
//! start keystream generation at the block containing `p` and discard the
//! sub-block remainder. A range read therefore never touches bytes outside
//! the covering blocks of the requested range.

use std::fmt;

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use ctr::Ctr128BE;
use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Initialization vector length in bytes (one AES block).
pub const IV_LEN: usize = 16;

/// Cipher block size in bytes; the counter advances once per block.
pub const CIPHER_BLOCK_SIZE: usize = 16;

/// AES-256 in counter mode with a 128-bit big-endian counter.
type Aes256Ctr = Ctr128BE<Aes256>;

/// Errors from cipher construction and range decryption.
///
/// All of these indicate malformed input, never a transient condition;
/// there is no silent truncation on any of them.
#[derive(Debug, Error, PartialEq)]
pub enum CipherError {
    #[error("invalid key length: expected {KEY_LEN} bytes, got {actual}")]
    KeyLength { actual: usize },

    #[error("invalid iv length: expected {IV_LEN} bytes, got {actual}")]
    IvLength { actual: usize },

    #[error("empty ciphertext")]
    EmptyCiphertext,

    #[error("offset {0} exceeds the cipher keystream range")]
    OffsetOutOfRange(u64),

    #[error("key is not valid hex: {0}")]
    KeyEncoding(#[from] hex::FromHexError),
}

/// A 256-bit object encryption key, zeroized on drop.
///
/// The `Debug` implementation redacts the key material to prevent
/// accidental logging.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ObjectKey([u8; KEY_LEN]);

impl ObjectKey {
    /// Build a key from raw bytes, validating the length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        let raw: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CipherError::KeyLength {
                actual: bytes.len(),
            })?;
        Ok(Self(raw))
    }

    /// Build a key from a hex string (64 hex digits).
    pub fn from_hex(s: &str) -> Result<Self, CipherError> {
        let bytes = hex::decode(s.trim())?;
        Self::from_bytes(&bytes)
    }

    /// Generate a fresh random key from the process CSPRNG.
    pub fn generate() -> Self {
        let mut raw = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut raw);
        Self(raw)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectKey").field(&"[REDACTED]").finish()
    }
}

/// The persisted/transmitted form of an encrypted object: IV plus ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherEnvelope {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl CipherEnvelope {
    /// Serialize as `iv || ciphertext` for upload.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IV_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse `iv || ciphertext`. Fails on anything shorter than one IV.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() < IV_LEN {
            return Err(CipherError::IvLength {
                actual: bytes.len(),
            });
        }
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[..IV_LEN]);
        Ok(Self {
            iv,
            ciphertext: bytes[IV_LEN..].to_vec(),
        })
    }
}

/// Stream cipher with random-access decryption.
///
/// One instance holds one object key; every object encrypted under it gets
/// its own random IV, so keystreams never repeat across objects.
#[derive(Debug, Clone)]
pub struct SeekableCipher {
    key: ObjectKey,
}

impl SeekableCipher {
    pub fn new(key: ObjectKey) -> Self {
        Self { key }
    }

    /// Encrypt a full plaintext stream under a fresh random IV.
    pub fn encrypt_stream(&self, plaintext: &[u8]) -> CipherEnvelope {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        let mut ciphertext = plaintext.to_vec();
        // Key and IV lengths are fixed by construction, so this cannot fail.
        if let Ok(mut cipher) = Aes256Ctr::new_from_slices(self.key.as_bytes(), &iv) {
            cipher.apply_keystream(&mut ciphertext);
        }
        CipherEnvelope { iv, ciphertext }
    }

    /// Decrypt a sub-range of an object.
    ///
    /// `ciphertext_range` must be the ciphertext bytes at plaintext positions
    /// `[offset, offset + len)`; the IV is the one prepended to the object at
    /// encryption time. Returns exactly `ciphertext_range.len()` plaintext
    /// bytes. The offset does not need to be block-aligned: the keystream is
    /// consumed from the start of the covering block and the leading
    /// offset-within-block bytes are discarded.
    pub fn decrypt_range(
        &self,
        iv: &[u8],
        offset: u64,
        ciphertext_range: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        if iv.len() != IV_LEN {
            return Err(CipherError::IvLength { actual: iv.len() });
        }
        if ciphertext_range.is_empty() {
            return Err(CipherError::EmptyCiphertext);
        }

        let mut cipher = Aes256Ctr::new_from_slices(self.key.as_bytes(), iv)
            .map_err(|_| CipherError::IvLength { actual: iv.len() })?;
        cipher
            .try_seek(offset)
            .map_err(|_| CipherError::OffsetOutOfRange(offset))?;

        let mut plaintext = ciphertext_range.to_vec();
        cipher.apply_keystream(&mut plaintext);
        Ok(plaintext)
    }
}
