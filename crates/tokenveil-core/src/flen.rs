//! Fixed-length adapter.
//!
//! Pads or truncates every payload to one length so that every message on the
//! channel consumes the same amount of stream. Decoding needs no adapter: the
//! ordinary [`Decoder`](crate::Decoder) returns exactly `fixed_bytes` bytes.

use tokenveil_crypto::{BuiltinDrbg, Drbg, EntropySource, NonceSource};

use crate::{
    b64,
    clock::TimestampSource,
    config::{ChannelConfig, FlenConfig},
    encoder::{Encoded, Encoder},
    error::TokenError,
    token::Payload,
};

/// Encoder that emits messages of a single payload length.
#[derive(Clone)]
pub struct FlenEncoder<D = BuiltinDrbg> {
    inner: Encoder<D>,
    flen: FlenConfig,
}

impl FlenEncoder<BuiltinDrbg> {
    /// Create an uninstantiated fixed-length encoder.
    pub fn new(config: &ChannelConfig, flen: FlenConfig) -> Result<Self, TokenError> {
        Self::with_drbg(BuiltinDrbg::new(config.drbg), config, flen)
    }
}

impl<D: Drbg> FlenEncoder<D> {
    /// Create around a caller-supplied DRBG.
    pub fn with_drbg(drbg: D, config: &ChannelConfig, flen: FlenConfig) -> Result<Self, TokenError> {
        flen.validate()?;
        Ok(Self { inner: Encoder::with_drbg(drbg, config)?, flen })
    }

    /// Seed the stream and reset the sequence counter.
    pub fn instantiate(
        &mut self,
        entropy: &mut impl EntropySource,
        nonce: &mut impl NonceSource,
        personalization: &[u8],
    ) -> Result<(), TokenError> {
        self.inner.instantiate(entropy, nonce, personalization)
    }

    /// Reseed the stream.
    pub fn reseed(
        &mut self,
        entropy: &mut impl EntropySource,
        additional: &[u8],
    ) -> Result<(), TokenError> {
        self.inner.reseed(entropy, additional)
    }

    /// Wipe the stream state.
    pub fn uninstantiate(&mut self) {
        self.inner.uninstantiate();
    }

    /// Padding settings.
    pub fn flen(&self) -> &FlenConfig {
        &self.flen
    }

    /// The wrapped encoder.
    pub fn inner(&self) -> &Encoder<D> {
        &self.inner
    }

    /// Buffer size for every encode, whatever the payload length.
    pub fn encode_buffer_bytes(&self) -> usize {
        self.inner.encode_buffer_bytes(self.flen.fixed_bytes)
    }

    /// Buffer size for every Base64 encode.
    pub fn encode_buffer_bytes_b64(&self) -> usize {
        b64::encode_buffer_bytes(self.encode_buffer_bytes())
    }

    /// Encode `payload` padded with the fill byte or truncated to
    /// `fixed_bytes`.
    pub fn encode(
        &mut self,
        clock: &impl TimestampSource,
        payload: &[u8],
        out: &mut [u8],
    ) -> Result<Encoded, TokenError> {
        if payload.len() > self.flen.fixed_bytes {
            tracing::debug!(
                payload_len = payload.len(),
                fixed = self.flen.fixed_bytes,
                "truncating payload"
            );
        }
        let padded = Payload::fixed(payload, self.flen.fixed_bytes, self.flen.fill);
        self.inner.encode_payload(clock, padded, out)
    }

    /// Base64 variant of [`encode`](Self::encode).
    pub fn encode_b64(
        &mut self,
        clock: &impl TimestampSource,
        payload: &[u8],
        out: &mut [u8],
    ) -> Result<Encoded, TokenError> {
        let raw_len = self.encode_buffer_bytes();
        b64::encode_via(raw_len, out, |raw| self.encode(clock, payload, raw))
    }

    /// Size of the saved state.
    pub fn save_bytes(&self) -> Result<usize, TokenError> {
        self.inner.save_bytes()
    }

    /// Size of the saved state as Base64, including the NUL.
    pub fn save_bytes_b64(&self) -> Result<usize, TokenError> {
        self.inner.save_bytes_b64()
    }

    /// Save the inner encoder state.
    pub fn save_state(&self, out: &mut [u8]) -> Result<usize, TokenError> {
        self.inner.save_state(out)
    }

    /// Restore the inner encoder state.
    pub fn restore_state(&mut self, saved: &[u8]) -> Result<(), TokenError> {
        self.inner.restore_state(saved)
    }

    /// Save as NUL-terminated Base64.
    pub fn save_state_b64(&self, out: &mut [u8]) -> Result<usize, TokenError> {
        self.inner.save_state_b64(out)
    }

    /// Restore from Base64.
    pub fn restore_state_b64(&mut self, saved: &[u8]) -> Result<(), TokenError> {
        self.inner.restore_state_b64(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::DecoderOptions, decoder::Decoder};

    const ENTROPY: [u8; 32] = [0x71; 32];

    fn pair(flen: FlenConfig) -> (FlenEncoder, Decoder) {
        let config = ChannelConfig::default();
        let mut encoder = FlenEncoder::new(&config, flen).unwrap();
        let mut decoder = Decoder::new(&config, DecoderOptions::default()).unwrap();
        encoder.instantiate(&mut &ENTROPY[..], &mut 8u64, b"flen").unwrap();
        decoder.instantiate(&mut &ENTROPY[..], &mut 8u64, b"flen").unwrap();
        (encoder, decoder)
    }

    fn roundtrip(encoder: &mut FlenEncoder, decoder: &mut Decoder, payload: &[u8]) -> Vec<u8> {
        let mut token = vec![0u8; encoder.encode_buffer_bytes()];
        let encoded = encoder.encode(&|| 0u64, payload, &mut token).unwrap();
        assert_eq!(encoded.len, token.len());

        let mut out = vec![0u8; decoder.decode_buffer_bytes(token.len())];
        let decoded = decoder.decode(&|| 0u64, &token, &mut out).unwrap();
        decoded.slice(&out).to_vec()
    }

    #[test]
    fn short_payload_padded_with_fill() {
        let (mut enc, mut dec) = pair(FlenConfig { fixed_bytes: 6, fill: b'_' });
        assert_eq!(roundtrip(&mut enc, &mut dec, b"ab"), b"ab____");
    }

    #[test]
    fn long_payload_truncated() {
        let (mut enc, mut dec) = pair(FlenConfig { fixed_bytes: 4, fill: 0 });
        assert_eq!(roundtrip(&mut enc, &mut dec, b"truncate me"), b"trun");
    }

    #[test]
    fn every_message_has_the_same_length() {
        let (mut enc, _) = pair(FlenConfig { fixed_bytes: 32, fill: 0 });
        let expected = enc.encode_buffer_bytes();
        for payload in [&b""[..], b"x", &[7u8; 100]] {
            let mut token = vec![0u8; expected];
            assert_eq!(enc.encode(&|| 0u64, payload, &mut token).unwrap().len, expected);
        }
    }

    #[test]
    fn zero_length_rejected() {
        assert!(matches!(
            FlenEncoder::new(&ChannelConfig::default(), FlenConfig { fixed_bytes: 0, fill: 0 }),
            Err(TokenError::InvalidConfig { .. })
        ));
    }
}
