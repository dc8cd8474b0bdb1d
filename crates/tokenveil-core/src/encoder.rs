//! Encoder engine.

use tokenveil_crypto::{BuiltinDrbg, Drbg, EntropySource, NonceSource};

use crate::{
    b64,
    clock::TimestampSource,
    config::ChannelConfig,
    error::TokenError,
    random::RandomSource,
    state::{StateReader, StateWriter},
    token::{Payload, TokenLayout},
};

/// Location of an encoded message inside the caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoded {
    /// Start of the message
    pub offset: usize,
    /// Length of the message (excluding any NUL terminator)
    pub len: usize,
}

impl Encoded {
    /// The encoded bytes within `buf`.
    pub fn slice<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.offset..self.offset + self.len]
    }
}

/// Turns payloads into tokens for one channel.
///
/// Each encode advances the stream by the message's segment and the
/// sequence counter by one, whether or not the token reaches the decoder.
#[derive(Clone)]
pub struct Encoder<D = BuiltinDrbg> {
    pub(crate) random: RandomSource<D>,
    pub(crate) layout: TokenLayout,
    pub(crate) sequence: u64,
}

impl Encoder<BuiltinDrbg> {
    /// Create an uninstantiated encoder with the configured built-in DRBG.
    pub fn new(config: &ChannelConfig) -> Result<Self, TokenError> {
        Self::with_drbg(BuiltinDrbg::new(config.drbg), config)
    }
}

impl<D: Drbg> Encoder<D> {
    /// Create an uninstantiated encoder around a caller-supplied DRBG.
    /// `config.drbg` is ignored.
    pub fn with_drbg(drbg: D, config: &ChannelConfig) -> Result<Self, TokenError> {
        Ok(Self { random: RandomSource::new(drbg), layout: TokenLayout::new(config)?, sequence: 0 })
    }

    /// Seed the stream and reset the sequence counter to 0.
    pub fn instantiate(
        &mut self,
        entropy: &mut impl EntropySource,
        nonce: &mut impl NonceSource,
        personalization: &[u8],
    ) -> Result<(), TokenError> {
        self.random.instantiate(entropy, nonce, personalization)?;
        self.sequence = 0;
        tracing::debug!(reseed_counter = self.random.reseed_counter(), "encoder instantiated");
        Ok(())
    }

    /// Reseed the stream. The decoder must reseed at the same position.
    pub fn reseed(
        &mut self,
        entropy: &mut impl EntropySource,
        additional: &[u8],
    ) -> Result<(), TokenError> {
        self.random.reseed(entropy, additional)
    }

    /// Wipe the stream state.
    pub fn uninstantiate(&mut self) {
        self.random.uninstantiate();
        self.sequence = 0;
    }

    /// Layout in use.
    pub fn layout(&self) -> &TokenLayout {
        &self.layout
    }

    /// Sequence number the next message will carry.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Generate requests since the last (re)seed, plus one.
    pub fn reseed_counter(&self) -> u64 {
        self.random.reseed_counter()
    }

    /// Buffer size needed to encode `payload_len` bytes.
    pub fn encode_buffer_bytes(&self, payload_len: usize) -> usize {
        self.layout.encoded_len(payload_len)
    }

    /// Buffer size needed for [`encode_b64`](Self::encode_b64).
    pub fn encode_buffer_bytes_b64(&self, payload_len: usize) -> usize {
        b64::encode_buffer_bytes(self.encode_buffer_bytes(payload_len))
    }

    /// Encode `payload` into `out`.
    ///
    /// # Errors
    ///
    /// - `BufferTooSmall` if `out` is shorter than `encode_buffer_bytes`
    /// - `NotInstantiated` / `ChannelFailed` if the stream is not ready
    /// - `Drbg` (possibly catastrophic) if the stream generator fails
    pub fn encode(
        &mut self,
        clock: &impl TimestampSource,
        payload: &[u8],
        out: &mut [u8],
    ) -> Result<Encoded, TokenError> {
        self.encode_payload(clock, Payload::new(payload), out)
    }

    /// Encode `payload` as NUL-terminated Base64 into `out`.
    pub fn encode_b64(
        &mut self,
        clock: &impl TimestampSource,
        payload: &[u8],
        out: &mut [u8],
    ) -> Result<Encoded, TokenError> {
        let raw_len = self.encode_buffer_bytes(payload.len());
        b64::encode_via(raw_len, out, |raw| self.encode(clock, payload, raw))
    }

    pub(crate) fn encode_payload(
        &mut self,
        clock: &impl TimestampSource,
        payload: Payload<'_>,
        out: &mut [u8],
    ) -> Result<Encoded, TokenError> {
        self.random.ensure_ready()?;
        let timestamp = if self.layout.verifiers().has_timestamp() { clock.timestamp() } else { 0 };

        let len = self.layout.tokenize(&mut self.random, self.sequence, timestamp, payload, out)?;
        tracing::debug!(sequence = self.sequence, payload_len = payload.len(), "encoded message");
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Encoded { offset: 0, len })
    }

    /// Size of the saved state.
    pub fn save_bytes(&self) -> Result<usize, TokenError> {
        Ok(self.random.state_bytes()? + 8)
    }

    /// Buffer size for [`save_state_b64`](Self::save_state_b64): the text,
    /// its NUL and room to stage the raw state.
    pub fn save_bytes_b64(&self) -> Result<usize, TokenError> {
        Ok(b64::encode_buffer_bytes(self.save_bytes()?))
    }

    /// Save `drbg_state ‖ sequence` into `out`. Returns the bytes written.
    pub fn save_state(&self, out: &mut [u8]) -> Result<usize, TokenError> {
        let len = self.save_bytes()?;
        let mut writer = StateWriter::new(out, len)?;
        writer.drbg(&self.random)?;
        writer.u64(self.sequence);
        Ok(writer.finish())
    }

    /// Restore a state written by [`save_state`](Self::save_state).
    pub fn restore_state(&mut self, saved: &[u8]) -> Result<(), TokenError> {
        let mut reader = StateReader::new(saved, self.save_bytes()?)?;
        let drbg_state = reader.take(self.random.state_bytes()?);
        let sequence = reader.u64();
        self.random.restore(drbg_state)?;
        self.sequence = sequence;
        Ok(())
    }

    /// Save the state as NUL-terminated Base64. Returns the text length.
    pub fn save_state_b64(&self, out: &mut [u8]) -> Result<usize, TokenError> {
        crate::state::save_b64(self.save_bytes()?, out, |raw| self.save_state(raw))
    }

    /// Restore a state written by [`save_state_b64`](Self::save_state_b64).
    pub fn restore_state_b64(&mut self, saved: &[u8]) -> Result<(), TokenError> {
        crate::state::restore_b64(saved, |raw| self.restore_state(raw))
    }
}

#[cfg(test)]
mod tests {
    use tokenveil_crypto::DrbgKind;

    use super::*;
    use crate::config::Verifiers;

    const ENTROPY: [u8; 32] = [0x24; 32];

    fn encoder(config: &ChannelConfig) -> Encoder {
        let mut encoder = Encoder::new(config).unwrap();
        encoder.instantiate(&mut &ENTROPY[..], &mut 1u64, b"unit").unwrap();
        encoder
    }

    #[test]
    fn uninstantiated_encoder_refuses() {
        let mut encoder = Encoder::new(&ChannelConfig::default()).unwrap();
        let mut out = [0u8; 512];
        assert_eq!(encoder.encode(&|| 0u64, b"x", &mut out), Err(TokenError::NotInstantiated));
    }

    #[test]
    fn encode_advances_sequence() {
        let mut encoder = encoder(&ChannelConfig::default());
        let mut out = vec![0u8; encoder.encode_buffer_bytes(5)];

        for expected in 0..3u64 {
            let encoded = encoder.encode(&|| 0u64, b"hello", &mut out).unwrap();
            assert_eq!(encoded.len, out.len());
            assert_eq!(&out[..8], &expected.to_be_bytes());
        }
        assert_eq!(encoder.sequence(), 3);
    }

    #[test]
    fn small_buffer_rejected_without_advancing() {
        let mut encoder = encoder(&ChannelConfig::default());
        let mut out = vec![0u8; encoder.encode_buffer_bytes(5) - 1];
        let counter = encoder.reseed_counter();

        let err = encoder.encode(&|| 0u64, b"hello", &mut out).unwrap_err();
        assert!(matches!(err, TokenError::BufferTooSmall { .. }));
        assert_eq!(encoder.sequence(), 0);
        assert_eq!(encoder.reseed_counter(), counter);
    }

    #[test]
    fn same_payload_different_tokens() {
        let mut encoder = encoder(&ChannelConfig { verifiers: Verifiers::None, ..Default::default() });
        let mut first = vec![0u8; encoder.encode_buffer_bytes(4)];
        let mut second = first.clone();
        encoder.encode(&|| 0u64, b"same", &mut first).unwrap();
        encoder.encode(&|| 0u64, b"same", &mut second).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn b64_output_is_nul_terminated_text() {
        let mut encoder = encoder(&ChannelConfig::default());
        let mut out = vec![0u8; encoder.encode_buffer_bytes_b64(3)];
        let encoded = encoder.encode_b64(&|| 0u64, b"abc", &mut out).unwrap();

        assert_eq!(encoded.len, b64::encoded_len(encoder.encode_buffer_bytes(3)));
        assert_eq!(out[encoded.len], 0);
        assert!(out[..encoded.len].iter().all(|b| b.is_ascii_alphanumeric() || b"+/=".contains(b)));
    }

    #[test]
    fn save_restore_reproduces_next_token() {
        let config = ChannelConfig { drbg: DrbgKind::HashSha256, ..Default::default() };
        let mut encoder = encoder(&config);
        let mut out = vec![0u8; encoder.encode_buffer_bytes(4)];
        encoder.encode(&|| 9u64, b"warm", &mut out).unwrap();

        let mut saved = vec![0u8; encoder.save_bytes().unwrap()];
        encoder.save_state(&mut saved).unwrap();
        let mut clone = Encoder::new(&config).unwrap();
        clone.restore_state(&saved).unwrap();

        let mut a = vec![0u8; out.len()];
        let mut b = vec![0u8; out.len()];
        encoder.encode(&|| 9u64, b"next", &mut a).unwrap();
        clone.encode(&|| 9u64, b"next", &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn restore_rejects_wrong_length() {
        let mut encoder = encoder(&ChannelConfig::default());
        let len = encoder.save_bytes().unwrap();
        assert_eq!(
            encoder.restore_state(&vec![0u8; len + 1]),
            Err(TokenError::InvalidState { expected: len, actual: len + 1 })
        );
    }
}
