//! Symmetric codec for remote objects.
//!
//! Objects are encrypted once, sequentially, before upload, and decrypted in
//! arbitrary byte ranges on read. The counter-mode construction in
//! [`seekable`] is what makes the range reads cheap: keystream position is
//! computed from the IV and the absolute offset, so decryption cost is
//! proportional to the requested range, not to the object size.

mod seekable;

pub use seekable::{
    CipherEnvelope, CipherError, ObjectKey, SeekableCipher, CIPHER_BLOCK_SIZE, IV_LEN, KEY_LEN,
};
