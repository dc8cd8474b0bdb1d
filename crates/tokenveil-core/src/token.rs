//! Token layout and the tokenize/detokenize transform.
//!
//! ```text
//! [sequence u64 BE]              only with a sequence verifier, in clear
//! [token] x (meta_len + payload_len)
//!     meta   = [timestamp u64 BE][crc32 u32 BE]   (each only if enabled)
//!     token  = token_bytes of stream, first byte XORed with one input byte
//! ```
//!
//! Every byte of the token body comes from a single stream segment, so a
//! message of `n` payload bytes always consumes `body_bytes(n)` of stream.

use std::iter;

use subtle::{Choice, ConstantTimeEq};
use tokenveil_crypto::{Drbg, wipe};
use zeroize::Zeroizing;

use crate::{
    config::{ChannelConfig, Verifiers},
    error::{TokenError, need},
    random::{RandomSource, STREAM_BLOCK_BYTES},
};

/// Bytes of the clear sequence header.
pub const SEQUENCE_HEADER_BYTES: usize = 8;

/// Largest metadata block (timestamp + CRC-32).
pub const MAX_META_BYTES: usize = 12;

const TIMESTAMP_BYTES: usize = 8;
const CRC_BYTES: usize = 4;

/// Input bytes for one message: caller data followed by optional padding.
///
/// Lets the fixed-length adapter pad without copying the payload.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Payload<'a> {
    data: &'a [u8],
    pad: usize,
    fill: u8,
}

impl<'a> Payload<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pad: 0, fill: 0 }
    }

    /// Truncate or pad `data` to exactly `len` bytes.
    pub(crate) fn fixed(data: &'a [u8], len: usize, fill: u8) -> Self {
        let used = data.len().min(len);
        Self { data: &data[..used], pad: len - used, fill }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len() + self.pad
    }

    fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.data.iter().copied().chain(iter::repeat_n(self.fill, self.pad))
    }

    fn crc32(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.data);
        let block = [self.fill; 64];
        let mut remaining = self.pad;
        while remaining > 0 {
            let n = remaining.min(block.len());
            hasher.update(&block[..n]);
            remaining -= n;
        }
        hasher.finalize()
    }
}

/// Metadata recovered from a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Meta {
    /// Encode timestamp (0 without the timestamp verifier)
    pub timestamp: u64,
    /// Payload CRC-32 (0 without the CRC verifier)
    pub crc32: u32,
}

/// Sizes and transform for one channel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLayout {
    token_bytes: usize,
    verifiers: Verifiers,
}

impl TokenLayout {
    /// Layout for a validated configuration.
    pub fn new(config: &ChannelConfig) -> Result<Self, TokenError> {
        config.validate()?;
        Ok(Self { token_bytes: config.token_bytes, verifiers: config.verifiers })
    }

    /// Bytes per token.
    pub fn token_bytes(&self) -> usize {
        self.token_bytes
    }

    /// Enabled verifiers.
    pub fn verifiers(&self) -> Verifiers {
        self.verifiers
    }

    /// Clear header length.
    pub fn header_bytes(&self) -> usize {
        if self.verifiers.has_sequence() { SEQUENCE_HEADER_BYTES } else { 0 }
    }

    /// Metadata bytes tokenized ahead of the payload.
    pub fn meta_bytes(&self) -> usize {
        let mut len = 0;
        if self.verifiers.has_timestamp() {
            len += TIMESTAMP_BYTES;
        }
        if self.verifiers.has_crc32() {
            len += CRC_BYTES;
        }
        len
    }

    /// Stream bytes consumed by a message with `payload_len` bytes.
    pub fn body_bytes(&self, payload_len: usize) -> usize {
        (self.meta_bytes().saturating_add(payload_len)).saturating_mul(self.token_bytes)
    }

    /// Encoded length of a message with `payload_len` bytes.
    pub fn encoded_len(&self, payload_len: usize) -> usize {
        self.header_bytes().saturating_add(self.body_bytes(payload_len))
    }

    /// Payload length of an encoded message, if `encoded_len` is a valid
    /// length for this layout.
    pub fn payload_len(&self, encoded_len: usize) -> Option<usize> {
        let body = encoded_len.checked_sub(self.header_bytes())?;
        if body % self.token_bytes != 0 {
            return None;
        }
        (body / self.token_bytes).checked_sub(self.meta_bytes())
    }

    /// Largest payload an input of `encoded_len` bytes can hold.
    pub fn max_payload_len(&self, encoded_len: usize) -> usize {
        (encoded_len.saturating_sub(self.header_bytes()) / self.token_bytes)
            .saturating_sub(self.meta_bytes())
    }

    /// Sequence number from the clear header, if the layout has one.
    pub fn read_sequence(&self, encoded: &[u8]) -> Option<u64> {
        if !self.verifiers.has_sequence() {
            return None;
        }
        let header = encoded.get(..SEQUENCE_HEADER_BYTES)?;
        let mut bytes = [0u8; SEQUENCE_HEADER_BYTES];
        bytes.copy_from_slice(header);
        Some(u64::from_be_bytes(bytes))
    }

    fn write_meta(&self, meta: &mut [u8; MAX_META_BYTES], timestamp: u64, payload: Payload<'_>) -> usize {
        let mut len = 0;
        if self.verifiers.has_timestamp() {
            meta[..TIMESTAMP_BYTES].copy_from_slice(&timestamp.to_be_bytes());
            len += TIMESTAMP_BYTES;
        }
        if self.verifiers.has_crc32() {
            meta[len..len + CRC_BYTES].copy_from_slice(&payload.crc32().to_be_bytes());
            len += CRC_BYTES;
        }
        len
    }

    fn read_meta(&self, meta: &[u8; MAX_META_BYTES]) -> Meta {
        let mut parsed = Meta::default();
        let mut pos = 0;
        if self.verifiers.has_timestamp() {
            let mut ts = [0u8; TIMESTAMP_BYTES];
            ts.copy_from_slice(&meta[..TIMESTAMP_BYTES]);
            parsed.timestamp = u64::from_be_bytes(ts);
            pos += TIMESTAMP_BYTES;
        }
        if self.verifiers.has_crc32() {
            let mut crc = [0u8; CRC_BYTES];
            crc.copy_from_slice(&meta[pos..pos + CRC_BYTES]);
            parsed.crc32 = u32::from_be_bytes(crc);
        }
        parsed
    }

    /// Write one message into `out`, consuming `body_bytes(payload.len())`
    /// of stream. Returns the encoded length.
    pub(crate) fn tokenize<D: Drbg>(
        &self,
        random: &mut RandomSource<D>,
        sequence: u64,
        timestamp: u64,
        payload: Payload<'_>,
        out: &mut [u8],
    ) -> Result<usize, TokenError> {
        let len = self.encoded_len(payload.len());
        need(out.len(), len)?;

        let (header, body) = out[..len].split_at_mut(self.header_bytes());
        if !header.is_empty() {
            header.copy_from_slice(&sequence.to_be_bytes());
        }
        random.fill(body)?;

        let mut meta = Zeroizing::new([0u8; MAX_META_BYTES]);
        let meta_len = self.write_meta(&mut meta, timestamp, payload);
        let input = meta[..meta_len].iter().copied().chain(payload.bytes());

        for (token, byte) in body.chunks_exact_mut(self.token_bytes).zip(input) {
            token[0] ^= byte;
        }
        Ok(len)
    }

    /// Reverse one message into `out[..payload_len]`, consuming the same
    /// stream `tokenize` did. Checks every check byte in constant time, then
    /// the CRC-32.
    ///
    /// On failure the written part of `out` is wiped.
    pub(crate) fn detokenize<D: Drbg>(
        &self,
        random: &mut RandomSource<D>,
        encoded: &[u8],
        out: &mut [u8],
    ) -> Result<Meta, TokenError> {
        let payload_len = self
            .payload_len(encoded.len())
            .ok_or(TokenError::MalformedInput { reason: "length does not match token layout" })?;
        need(out.len(), payload_len)?;

        let meta_len = self.meta_bytes();
        let body = &encoded[self.header_bytes()..];
        let mut meta = Zeroizing::new([0u8; MAX_META_BYTES]);
        let mut scratch = Zeroizing::new([0u8; STREAM_BLOCK_BYTES]);
        let mut valid = Choice::from(1u8);
        let mut pos = 0usize;

        for chunk in body.chunks(STREAM_BLOCK_BYTES) {
            let stream = &mut scratch[..chunk.len()];
            if let Err(err) = random.fill(stream) {
                wipe::wipe(&mut out[..payload_len]);
                return Err(err);
            }
            for (i, (&s, &t)) in stream.iter().zip(chunk).enumerate() {
                let at = pos + i;
                if at % self.token_bytes == 0 {
                    let index = at / self.token_bytes;
                    if index < meta_len {
                        meta[index] = s ^ t;
                    } else {
                        out[index - meta_len] = s ^ t;
                    }
                } else {
                    valid &= s.ct_eq(&t);
                }
            }
            pos += chunk.len();
        }

        if !bool::from(valid) {
            wipe::wipe(&mut out[..payload_len]);
            return Err(TokenError::InvalidToken);
        }

        let parsed = self.read_meta(&meta);
        if self.verifiers.has_crc32() && crc32fast::hash(&out[..payload_len]) != parsed.crc32 {
            wipe::wipe(&mut out[..payload_len]);
            return Err(TokenError::CrcMismatch);
        }
        Ok(parsed)
    }
}
