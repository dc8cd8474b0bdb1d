//! Base64 variants of the buffer APIs.
//!
//! Text output is NUL-terminated; the NUL is not counted in the returned
//! length. Text input may carry trailing NULs.
//!
//! The engines do not allocate for tokens, so the `_b64` buffer sizes include
//! room for the raw form: the caller buffer is split into a head that
//! receives the result and a tail used as raw scratch.

use base64::{Engine, engine::general_purpose::STANDARD};
use tokenveil_crypto::wipe;

use crate::{
    decoder::Decoded,
    encoder::Encoded,
    error::{TokenError, need},
};

/// Length of the Base64 text for `raw_len` bytes, without the NUL.
pub fn encoded_len(raw_len: usize) -> usize {
    base64::encoded_len(raw_len, true).unwrap_or(usize::MAX)
}

/// Upper bound on the raw length of `text_len` bytes of Base64.
pub fn decoded_capacity(text_len: usize) -> usize {
    base64::decoded_len_estimate(text_len)
}

/// Encode `raw` into `out` followed by a NUL. Returns the text length.
pub(crate) fn encode_nul(raw: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
    let text_len = encoded_len(raw.len());
    need(out.len(), text_len.saturating_add(1))?;
    let written = STANDARD
        .encode_slice(raw, &mut out[..text_len])
        .map_err(|_| TokenError::BufferTooSmall { needed: text_len, available: out.len() })?;
    out[written] = 0;
    Ok(written)
}

/// Decode `text` (trailing NULs ignored) into `out`. Returns the raw length.
pub(crate) fn decode(text: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
    let text = trim_nul(text);
    STANDARD.decode_slice(text, out).map_err(|err| match err {
        base64::DecodeSliceError::OutputSliceTooSmall => TokenError::BufferTooSmall {
            needed: decoded_capacity(text.len()),
            available: out.len(),
        },
        base64::DecodeSliceError::DecodeError(_) => TokenError::InvalidBase64,
    })
}

pub(crate) fn trim_nul(text: &[u8]) -> &[u8] {
    let end = text.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &text[..end]
}

/// Buffer size for a Base64 encode whose raw form is `raw_len` bytes.
pub(crate) fn encode_buffer_bytes(raw_len: usize) -> usize {
    encoded_len(raw_len).saturating_add(1).saturating_add(raw_len)
}

/// Run a raw encode into the tail of `out`, then write its Base64 text to the
/// head.
pub(crate) fn encode_via(
    raw_len: usize,
    out: &mut [u8],
    encode: impl FnOnce(&mut [u8]) -> Result<Encoded, TokenError>,
) -> Result<Encoded, TokenError> {
    need(out.len(), encode_buffer_bytes(raw_len))?;
    let (head, tail) = out.split_at_mut(encoded_len(raw_len) + 1);

    let raw = encode(&mut tail[..raw_len])?;
    let result = encode_nul(&tail[raw.offset..raw.offset + raw.len], head);
    wipe::wipe(&mut tail[..raw_len]);
    Ok(Encoded { offset: 0, len: result? })
}

/// Buffer size for a Base64 decode of `text_len` bytes, given the raw decode
/// size function.
pub(crate) fn decode_buffer_bytes(text_len: usize, raw_decode_bytes: impl Fn(usize) -> usize) -> usize {
    let raw_cap = decoded_capacity(text_len);
    raw_decode_bytes(raw_cap).saturating_add(raw_cap)
}

/// Decode Base64 `text` into the tail of `out`, then run a raw decode into
/// the head.
pub(crate) fn decode_via(
    text: &[u8],
    out: &mut [u8],
    raw_decode_bytes: impl Fn(usize) -> usize,
    decode_raw: impl FnOnce(&[u8], &mut [u8]) -> Result<Decoded, TokenError>,
) -> Result<Decoded, TokenError> {
    let text = trim_nul(text);
    let raw_cap = decoded_capacity(text.len());
    let head_len = raw_decode_bytes(raw_cap);
    need(out.len(), head_len.saturating_add(raw_cap))?;

    let (head, tail) = out.split_at_mut(head_len);
    let raw_len = decode(text, &mut tail[..raw_cap])?;
    let result = decode_raw(&tail[..raw_len], head);
    wipe::wipe(&mut tail[..raw_len]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_appends_nul() {
        let mut out = [0xFFu8; 9];
        let len = encode_nul(b"hello", &mut out).unwrap();
        assert_eq!(&out[..len], b"aGVsbG8=");
        assert_eq!(out[len], 0);
    }

    #[test]
    fn encode_needs_room_for_nul() {
        let mut out = [0u8; 8];
        assert!(matches!(encode_nul(b"hello", &mut out), Err(TokenError::BufferTooSmall { .. })));
    }

    #[test]
    fn decode_ignores_trailing_nul() {
        let mut out = [0u8; 8];
        let len = decode(b"aGVsbG8=\0\0", &mut out).unwrap();
        assert_eq!(&out[..len], b"hello");
    }

    #[test]
    fn decode_rejects_garbage() {
        let mut out = [0u8; 8];
        assert_eq!(decode(b"!!!!", &mut out), Err(TokenError::InvalidBase64));
    }

    #[test]
    fn trim_nul_handles_all_nul() {
        assert_eq!(trim_nul(b"\0\0"), b"");
        assert_eq!(trim_nul(b"ab"), b"ab");
    }

    #[test]
    fn capacity_covers_exact_length() {
        for raw in 0..50 {
            assert!(decoded_capacity(encoded_len(raw)) >= raw);
        }
    }
}
