//! Entropy and nonce sources for instantiating a generator.
//!
//! Sources are asked for a length range and report how many bytes they
//! produced. Whoever drives instantiation checks the count against the
//! generator minimum; a source never decides whether its output is enough.

use crate::error::EntropyError;

/// What the generator needs from an entropy source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntropyRequest {
    /// Bytes of real entropy the output must contain
    pub min_entropy: usize,
    /// Minimum output length in bytes
    pub min_len: usize,
    /// Maximum output length in bytes (and the size of the output buffer)
    pub max_len: usize,
}

/// Supplies entropy input.
pub trait EntropySource {
    /// Write entropy into `out` (at most `request.max_len` bytes) and return
    /// how many bytes were written.
    ///
    /// # Errors
    ///
    /// Returns `EntropyError` if the source cannot produce entropy at all.
    fn fill_entropy(&mut self, request: EntropyRequest, out: &mut [u8])
    -> Result<usize, EntropyError>;
}

/// Supplies a nonce.
pub trait NonceSource {
    /// Write a nonce of `min_len..=max_len` bytes into `out` and return its
    /// length.
    fn fill_nonce(&mut self, min_len: usize, max_len: usize, out: &mut [u8]) -> usize;
}

/// Entropy from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_entropy(
        &mut self,
        request: EntropyRequest,
        out: &mut [u8],
    ) -> Result<usize, EntropyError> {
        let len = request.min_len.max(request.min_entropy).min(request.max_len).min(out.len());
        getrandom::fill(&mut out[..len]).map_err(|e| EntropyError::new(e.to_string()))?;
        Ok(len)
    }
}

/// Entropy taken verbatim from a byte slice.
///
/// Used when both ends of a channel are seeded from an agreed secret.
impl EntropySource for &[u8] {
    fn fill_entropy(
        &mut self,
        request: EntropyRequest,
        out: &mut [u8],
    ) -> Result<usize, EntropyError> {
        let len = self.len().min(request.max_len).min(out.len());
        out[..len].copy_from_slice(&self[..len]);
        Ok(len)
    }
}

/// Adapts a closure into an [`EntropySource`].
pub struct EntropyFn<F>(pub F);

impl<F> EntropySource for EntropyFn<F>
where
    F: FnMut(EntropyRequest, &mut [u8]) -> Result<usize, EntropyError>,
{
    fn fill_entropy(
        &mut self,
        request: EntropyRequest,
        out: &mut [u8],
    ) -> Result<usize, EntropyError> {
        (self.0)(request, out)
    }
}

/// Integer nonce: little-endian bytes, zero-padded up to `min_len`.
impl NonceSource for u64 {
    fn fill_nonce(&mut self, min_len: usize, max_len: usize, out: &mut [u8]) -> usize {
        let bytes = self.to_le_bytes();
        let len = min_len.max(bytes.len()).min(max_len).min(out.len());
        out[..len].fill(0);
        let copy = bytes.len().min(len);
        out[..copy].copy_from_slice(&bytes[..copy]);
        len
    }
}

/// Nonce taken verbatim from a byte slice, truncated to `max_len`.
impl NonceSource for &[u8] {
    fn fill_nonce(&mut self, _min_len: usize, max_len: usize, out: &mut [u8]) -> usize {
        let len = self.len().min(max_len).min(out.len());
        out[..len].copy_from_slice(&self[..len]);
        len
    }
}

/// Adapts a closure into a [`NonceSource`].
pub struct NonceFn<F>(pub F);

impl<F> NonceSource for NonceFn<F>
where
    F: FnMut(usize, usize, &mut [u8]) -> usize,
{
    fn fill_nonce(&mut self, min_len: usize, max_len: usize, out: &mut [u8]) -> usize {
        (self.0)(min_len, max_len, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: EntropyRequest = EntropyRequest { min_entropy: 32, min_len: 32, max_len: 128 };

    #[test]
    fn os_entropy_fills_minimum() {
        let mut out = [0u8; 128];
        let n = OsEntropy.fill_entropy(REQUEST, &mut out).unwrap();
        assert_eq!(n, 32);
        // 32 zero bytes from the OS would be astronomically unlikely
        assert!(out[..32].iter().any(|&b| b != 0));
        assert!(out[32..].iter().all(|&b| b == 0));
    }

    #[test]
    fn slice_entropy_copies_and_truncates() {
        let secret = [7u8; 200];
        let mut source: &[u8] = &secret;
        let mut out = [0u8; 128];
        let n = source.fill_entropy(REQUEST, &mut out).unwrap();
        assert_eq!(n, 128);
        assert_eq!(out, [7u8; 128]);
    }

    #[test]
    fn short_slice_reports_short_length() {
        let mut source: &[u8] = &[1, 2, 3];
        let mut out = [0u8; 128];
        assert_eq!(source.fill_entropy(REQUEST, &mut out).unwrap(), 3);
    }

    #[test]
    fn closure_entropy_can_fail() {
        let mut source = EntropyFn(|_req: EntropyRequest, _out: &mut [u8]| {
            Err(EntropyError::new("unplugged"))
        });
        let mut out = [0u8; 128];
        assert_eq!(source.fill_entropy(REQUEST, &mut out).unwrap_err().reason, "unplugged");
    }

    #[test]
    fn integer_nonce_is_le_and_padded() {
        let mut nonce = 0x0102_0304_0506_0708u64;
        let mut out = [0xFFu8; 32];
        let n = nonce.fill_nonce(16, 32, &mut out);
        assert_eq!(n, 16);
        assert_eq!(&out[..8], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&out[8..16], &[0u8; 8]);
    }

    #[test]
    fn integer_nonce_respects_small_max() {
        let mut nonce = 0xAABBu64;
        let mut out = [0u8; 32];
        assert_eq!(nonce.fill_nonce(0, 4, &mut out), 4);
        assert_eq!(&out[..4], &[0xBB, 0xAA, 0, 0]);
    }

    #[test]
    fn slice_nonce_truncates_to_max() {
        let bytes = [9u8; 40];
        let mut source: &[u8] = &bytes;
        let mut out = [0u8; 32];
        assert_eq!(source.fill_nonce(16, 32, &mut out), 32);
    }

    #[test]
    fn closure_nonce() {
        let mut source = NonceFn(|min: usize, _max: usize, out: &mut [u8]| {
            out[..min].fill(0x5A);
            min
        });
        let mut out = [0u8; 32];
        assert_eq!(source.fill_nonce(16, 32, &mut out), 16);
        assert_eq!(&out[..16], &[0x5A; 16]);
    }
}
