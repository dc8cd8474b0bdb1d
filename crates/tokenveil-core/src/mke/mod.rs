//! Managed-Key Encryption.
//!
//! Encrypts the payload with a one-time key and authenticates it with a MAC,
//! then tokenizes only a short trailer. Large payloads cost one cipher pass
//! instead of `token_bytes` of stream per byte.
//!
//! # Message layout
//!
//! ```text
//! ciphertext                         payload zero-padded to the block size
//! trailer                            ordinary token whose payload is
//!     [data_len u64 BE][tag]
//! ```
//!
//! Per message the stream yields a 32-byte seed, expanded with HKDF into the
//! cipher key, IV and MAC key, followed by the trailer token body. The amount
//! of stream is the same for every message on a channel, so the windowed
//! sequence modes work whatever the payload lengths.
//!
//! ```text
//! tag = MAC(ciphertext ‖ sequence u64 BE ‖ data_len u64 BE)
//! ```
//!
//! # Streaming
//!
//! [`EncryptSession`] and [`DecryptSession`] process the ciphertext in
//! block-aligned chunks. The concatenated chunk outputs plus the trailer are
//! byte-for-byte the single-shot message. A decrypt session releases plaintext
//! before the tag is checked in `finish`; callers must discard it if `finish`
//! fails.

mod decoder;
mod encoder;
mod session;

pub use decoder::MkeDecoder;
pub use encoder::MkeEncoder;
pub use session::{DecryptFinished, DecryptSession, EncryptSession};
use tokenveil_crypto::{
    Cipher, Drbg, MESSAGE_SEED_BYTES, Mac, MacState,
    cipher::{MAX_BLOCK_BYTES, MAX_IV_BYTES, MAX_KEY_BYTES},
    expand_message_keys,
    mac::{MAX_MAC_KEY_BYTES, MAX_TAG_BYTES},
};
use zeroize::Zeroizing;

use crate::{
    config::MAX_TOKEN_BYTES,
    error::TokenError,
    random::RandomSource,
    token::{MAX_META_BYTES, SEQUENCE_HEADER_BYTES, TokenLayout},
};

/// Bytes of the `data_len` field in the trailer payload.
pub const DATA_LEN_BYTES: usize = 8;

/// Largest trailer payload: `data_len` plus the largest tag.
pub const MAX_TRAILER_PAYLOAD_BYTES: usize = DATA_LEN_BYTES + MAX_TAG_BYTES;

/// Largest encoded trailer over all configurations.
pub const MAX_TRAILER_BYTES: usize =
    SEQUENCE_HEADER_BYTES + (MAX_META_BYTES + MAX_TRAILER_PAYLOAD_BYTES) * MAX_TOKEN_BYTES;

/// Largest tail a decrypt session holds back between chunks.
pub const MAX_HOLDBACK_BYTES: usize = MAX_TRAILER_BYTES + MAX_BLOCK_BYTES;

/// Cipher and MAC pair of one channel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Suite<C, M> {
    pub(crate) cipher: C,
    pub(crate) mac: M,
}

impl<C: Cipher, M: Mac> Suite<C, M> {
    pub(crate) fn new(cipher: C, mac: M) -> Result<Self, TokenError> {
        let block = cipher.block_bytes();
        if block == 0 || block > MAX_BLOCK_BYTES {
            return Err(TokenError::InvalidConfig { reason: "cipher block size must be 1..=128" });
        }
        if cipher.key_bytes() > MAX_KEY_BYTES || cipher.iv_bytes() > MAX_IV_BYTES {
            return Err(TokenError::InvalidConfig { reason: "cipher key or IV too long" });
        }
        if mac.tag_bytes() > MAX_TAG_BYTES || mac.key_bytes() > MAX_MAC_KEY_BYTES {
            return Err(TokenError::InvalidConfig { reason: "MAC key or tag too long" });
        }
        Ok(Self { cipher, mac })
    }

    pub(crate) fn block_bytes(&self) -> usize {
        self.cipher.block_bytes()
    }

    pub(crate) fn trailer_payload_len(&self) -> usize {
        DATA_LEN_BYTES + self.mac.tag_bytes()
    }

    pub(crate) fn trailer_len(&self, layout: &TokenLayout) -> usize {
        layout.encoded_len(self.trailer_payload_len())
    }

    /// Stream consumed per message: seed, then trailer body.
    pub(crate) fn segments(&self, layout: &TokenLayout) -> [usize; 2] {
        [MESSAGE_SEED_BYTES, layout.body_bytes(self.trailer_payload_len())]
    }

    pub(crate) fn padded_len(&self, data_len: usize) -> usize {
        data_len.div_ceil(self.block_bytes()) * self.block_bytes()
    }

    /// Draw the message seed from `random` and key the cipher and MAC.
    pub(crate) fn start_message<D: Drbg>(
        &self,
        random: &mut RandomSource<D>,
        sequence: u64,
    ) -> Result<(C::Stream, M::State), TokenError> {
        let mut seed = Zeroizing::new([0u8; MESSAGE_SEED_BYTES]);
        random.fill(&mut seed[..])?;

        let mut key = Zeroizing::new([0u8; MAX_KEY_BYTES]);
        let mut iv = Zeroizing::new([0u8; MAX_IV_BYTES]);
        let mut mac_key = Zeroizing::new([0u8; MAX_MAC_KEY_BYTES]);
        let key = &mut key[..self.cipher.key_bytes()];
        let iv = &mut iv[..self.cipher.iv_bytes()];
        let mac_key = &mut mac_key[..self.mac.key_bytes()];
        expand_message_keys(&seed, sequence, key, iv, mac_key)?;

        Ok((self.cipher.start(key, iv)?, self.mac.start(mac_key)?))
    }

    /// Close the MAC over the bound fields and write the trailer payload.
    /// Returns its length.
    pub(crate) fn seal(
        &self,
        mut state: M::State,
        sequence: u64,
        data_len: u64,
        out: &mut [u8; MAX_TRAILER_PAYLOAD_BYTES],
    ) -> Result<usize, TokenError> {
        bind(&mut state, sequence, data_len);
        out[..DATA_LEN_BYTES].copy_from_slice(&data_len.to_be_bytes());
        let len = self.trailer_payload_len();
        state.finalize_into(&mut out[DATA_LEN_BYTES..len])?;
        Ok(len)
    }

    /// Recompute the tag and compare it with the one carried by `trailer`.
    pub(crate) fn verify(
        &self,
        mut state: M::State,
        sequence: u64,
        trailer: &[u8],
    ) -> Result<(), TokenError> {
        let data_len = read_data_len(trailer);
        bind(&mut state, sequence, data_len);

        let mut computed = Zeroizing::new([0u8; MAX_TAG_BYTES]);
        let tag_len = self.mac.tag_bytes();
        state.finalize_into(&mut computed[..tag_len])?;
        let expected = &trailer[DATA_LEN_BYTES..DATA_LEN_BYTES + tag_len];
        if !tokenveil_crypto::tags_equal(expected, &computed[..tag_len]) {
            return Err(TokenError::TagMismatch);
        }
        Ok(())
    }

    /// Check the trailer's `data_len` against the ciphertext length.
    pub(crate) fn data_len(&self, trailer: &[u8], cipher_len: usize) -> Result<usize, TokenError> {
        let data_len = usize::try_from(read_data_len(trailer)).map_err(|_| TokenError::TagMismatch)?;
        if data_len > cipher_len || self.padded_len(data_len) != cipher_len {
            return Err(TokenError::TagMismatch);
        }
        Ok(data_len)
    }
}

fn bind(state: &mut impl MacState, sequence: u64, data_len: u64) {
    state.update(&sequence.to_be_bytes());
    state.update(&data_len.to_be_bytes());
}

fn read_data_len(trailer: &[u8]) -> u64 {
    let mut bytes = [0u8; DATA_LEN_BYTES];
    bytes.copy_from_slice(&trailer[..DATA_LEN_BYTES]);
    u64::from_be_bytes(bytes)
}
