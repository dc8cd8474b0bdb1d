//! Symmetric ciphers for Managed-Key Encryption.
//!
//! A cipher is started once per message with a derived key and IV and then
//! fed block-aligned data in place. Built-in ciphers are stream ciphers (block
//! size 1). External ciphers with larger blocks implement [`Cipher`] directly.

use chacha20::{
    ChaCha20,
    cipher::{KeyIvInit, StreamCipher},
};
use serde::{Deserialize, Serialize};

use crate::error::CipherError;

/// Largest supported cipher block, in bytes.
pub const MAX_BLOCK_BYTES: usize = 128;

/// Largest supported cipher key, in bytes.
pub const MAX_KEY_BYTES: usize = 64;

/// Largest supported IV, in bytes.
pub const MAX_IV_BYTES: usize = 32;

type Aes256Ctr = ctr::Ctr64BE<aes::Aes256>;

/// A symmetric cipher family.
pub trait Cipher {
    /// Keyed per-message state.
    type Stream: CipherStream;

    /// Block size in bytes. Chunk lengths must be a multiple of it.
    fn block_bytes(&self) -> usize;

    /// Key length in bytes.
    fn key_bytes(&self) -> usize;

    /// IV length in bytes.
    fn iv_bytes(&self) -> usize;

    /// Key the cipher for one message.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKeyLength` or `InvalidIvLength` on length mismatch.
    fn start(&self, key: &[u8], iv: &[u8]) -> Result<Self::Stream, CipherError>;
}

/// A keyed cipher processing one message.
pub trait CipherStream {
    /// Encrypt `data` in place. `data.len()` must be block-aligned.
    fn encrypt(&mut self, data: &mut [u8]) -> Result<(), CipherError>;

    /// Decrypt `data` in place. `data.len()` must be block-aligned.
    fn decrypt(&mut self, data: &mut [u8]) -> Result<(), CipherError>;
}

/// Built-in cipher selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherKind {
    /// ChaCha20 (IETF, 96-bit nonce)
    ChaCha20,
    /// AES-256 in counter mode
    #[default]
    Aes256Ctr,
}

/// One of the built-in ciphers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuiltinCipher(pub CipherKind);

/// Keyed state of a built-in cipher.
pub enum BuiltinStream {
    /// ChaCha20 keystream
    ChaCha20(ChaCha20),
    /// AES-256-CTR keystream
    Aes256Ctr(Aes256Ctr),
}

impl From<CipherKind> for BuiltinCipher {
    fn from(kind: CipherKind) -> Self {
        Self(kind)
    }
}

impl Cipher for BuiltinCipher {
    type Stream = BuiltinStream;

    fn block_bytes(&self) -> usize {
        1
    }

    fn key_bytes(&self) -> usize {
        32
    }

    fn iv_bytes(&self) -> usize {
        match self.0 {
            CipherKind::ChaCha20 => 12,
            CipherKind::Aes256Ctr => 16,
        }
    }

    fn start(&self, key: &[u8], iv: &[u8]) -> Result<BuiltinStream, CipherError> {
        check_lengths(self, key, iv)?;
        let stream = match self.0 {
            CipherKind::ChaCha20 => ChaCha20::new_from_slices(key, iv).map(BuiltinStream::ChaCha20),
            CipherKind::Aes256Ctr => {
                Aes256Ctr::new_from_slices(key, iv).map(BuiltinStream::Aes256Ctr)
            },
        };
        stream.map_err(|_| CipherError::InvalidKeyLength { expected: 32, actual: key.len() })
    }
}

impl BuiltinStream {
    fn apply(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        let result = match self {
            Self::ChaCha20(c) => c.try_apply_keystream(data),
            Self::Aes256Ctr(c) => c.try_apply_keystream(data),
        };
        result.map_err(|_| CipherError::KeystreamExhausted)
    }
}

impl CipherStream for BuiltinStream {
    fn encrypt(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        self.apply(data)
    }

    fn decrypt(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        self.apply(data)
    }
}

/// Validate key and IV lengths against a cipher's declared sizes.
pub fn check_lengths<C: Cipher + ?Sized>(
    cipher: &C,
    key: &[u8],
    iv: &[u8],
) -> Result<(), CipherError> {
    if key.len() != cipher.key_bytes() {
        return Err(CipherError::InvalidKeyLength { expected: cipher.key_bytes(), actual: key.len() });
    }
    if iv.len() != cipher.iv_bytes() {
        return Err(CipherError::InvalidIvLength { expected: cipher.iv_bytes(), actual: iv.len() });
    }
    Ok(())
}

/// Validate that `len` is a multiple of `block`.
pub fn check_aligned(len: usize, block: usize) -> Result<(), CipherError> {
    if block == 0 || len % block != 0 {
        return Err(CipherError::Misaligned { len, block });
    }
    Ok(())
}
