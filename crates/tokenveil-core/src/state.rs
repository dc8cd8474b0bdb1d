//! Saved-state layout.
//!
//! A saved state is the DRBG state followed by the engine counters, all
//! integers big-endian. There is no header or fingerprint: only the length is
//! checked on restore, so restoring into a different configuration of the
//! same size is not detected.
//!
//! ```text
//! encoder: drbg_state ‖ sequence
//! decoder: drbg_state ‖ base ‖ enc_ts ‖ dec_ts ‖ msg_skipped ‖ slot × w
//! slot:    present (u8) ‖ drbg_state            (zeros when absent)
//! ```
//!
//! `w` is the lookback window (0 in strict and catch-up mode). Slot `i` holds
//! the stream position of sequence number `base - w + i`, kept for late
//! messages.

use tokenveil_crypto::{Drbg, wipe};
use zeroize::Zeroizing;

use crate::{
    b64,
    error::{TokenError, need},
    random::RandomSource,
};

/// Sequential writer over a caller buffer of known final length.
pub(crate) struct StateWriter<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl<'a> StateWriter<'a> {
    pub(crate) fn new(out: &'a mut [u8], len: usize) -> Result<Self, TokenError> {
        need(out.len(), len)?;
        Ok(Self { out: &mut out[..len], pos: 0 })
    }

    pub(crate) fn drbg<D: Drbg>(&mut self, random: &RandomSource<D>) -> Result<(), TokenError> {
        let len = random.state_bytes()?;
        random.save(&mut self.out[self.pos..self.pos + len])?;
        self.pos += len;
        Ok(())
    }

    pub(crate) fn u64(&mut self, value: u64) {
        self.out[self.pos..self.pos + 8].copy_from_slice(&value.to_be_bytes());
        self.pos += 8;
    }

    pub(crate) fn u8(&mut self, value: u8) {
        self.out[self.pos] = value;
        self.pos += 1;
    }

    pub(crate) fn zeros(&mut self, len: usize) {
        self.out[self.pos..self.pos + len].fill(0);
        self.pos += len;
    }

    pub(crate) fn finish(self) -> usize {
        self.pos
    }
}

/// Sequential reader over a saved state of exactly the expected length.
pub(crate) struct StateReader<'a> {
    saved: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    pub(crate) fn new(saved: &'a [u8], expected: usize) -> Result<Self, TokenError> {
        if saved.len() != expected {
            return Err(TokenError::InvalidState { expected, actual: saved.len() });
        }
        Ok(Self { saved, pos: 0 })
    }

    pub(crate) fn take(&mut self, len: usize) -> &'a [u8] {
        let bytes = &self.saved[self.pos..self.pos + len];
        self.pos += len;
        bytes
    }

    pub(crate) fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    pub(crate) fn u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8));
        u64::from_be_bytes(bytes)
    }
}

/// Stage a raw save in the tail of `out` and write it as NUL-terminated
/// Base64 to the head. `out` must hold [`b64::encode_buffer_bytes`] of
/// `raw_len`.
pub(crate) fn save_b64(
    raw_len: usize,
    out: &mut [u8],
    save: impl FnOnce(&mut [u8]) -> Result<usize, TokenError>,
) -> Result<usize, TokenError> {
    need(out.len(), b64::encode_buffer_bytes(raw_len))?;
    let (head, tail) = out.split_at_mut(b64::encoded_len(raw_len) + 1);

    let raw = &mut tail[..raw_len];
    let result = save(raw).and_then(|written| b64::encode_nul(&raw[..written], head));
    wipe::wipe(raw);
    result
}

/// Decode a Base64 save and restore from it. The raw state is staged on the
/// heap and wiped when dropped.
pub(crate) fn restore_b64(
    text: &[u8],
    restore: impl FnOnce(&[u8]) -> Result<(), TokenError>,
) -> Result<(), TokenError> {
    let text = b64::trim_nul(text);
    let mut raw = Zeroizing::new(vec![0u8; b64::decoded_capacity(text.len())]);
    let len = b64::decode(text, &mut raw)?;
    restore(&raw[..len])
}
