use tokenveil_crypto::{BuiltinCipher, BuiltinDrbg, BuiltinMac, Cipher, Drbg, EntropySource, Mac, NonceSource};

use super::{MAX_TRAILER_BYTES, Suite, session::EncryptSession};
use crate::{
    b64,
    clock::TimestampSource,
    config::{ChannelConfig, MkeConfig},
    encoder::{Encoded, Encoder},
    error::{TokenError, need},
};

/// Encoder for Managed-Key Encryption messages.
#[derive(Clone)]
pub struct MkeEncoder<D = BuiltinDrbg, C = BuiltinCipher, M = BuiltinMac> {
    pub(super) inner: Encoder<D>,
    pub(super) suite: Suite<C, M>,
    pub(super) trailer: [u8; MAX_TRAILER_BYTES],
}

impl MkeEncoder {
    /// Create an uninstantiated encoder with the built-in primitives.
    pub fn new(config: &ChannelConfig, mke: MkeConfig) -> Result<Self, TokenError> {
        Self::with_primitives(
            BuiltinDrbg::new(config.drbg),
            BuiltinCipher(mke.cipher),
            BuiltinMac(mke.mac),
            config,
        )
    }
}

impl<D: Drbg, C: Cipher, M: Mac> MkeEncoder<D, C, M> {
    /// Create around caller-supplied primitives. `config.drbg` is ignored.
    pub fn with_primitives(
        drbg: D,
        cipher: C,
        mac: M,
        config: &ChannelConfig,
    ) -> Result<Self, TokenError> {
        Ok(Self {
            inner: Encoder::with_drbg(drbg, config)?,
            suite: Suite::new(cipher, mac)?,
            trailer: [0u8; MAX_TRAILER_BYTES],
        })
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

    /// Sequence number the next message will carry.
    pub fn sequence(&self) -> u64 {
        self.inner.sequence()
    }

    /// The wrapped token encoder.
    pub fn inner(&self) -> &Encoder<D> {
        &self.inner
    }

    /// Cipher block size; chunk lengths must be multiples of it.
    pub fn block_bytes(&self) -> usize {
        self.suite.block_bytes()
    }

    /// Size of the trailer returned by [`EncryptSession::finish`].
    pub fn encrypt_finish_bytes(&self) -> usize {
        self.suite.trailer_len(&self.inner.layout)
    }

    /// Buffer size needed to encode `payload_len` bytes.
    pub fn encode_buffer_bytes(&self, payload_len: usize) -> usize {
        self.suite.padded_len(payload_len).saturating_add(self.encrypt_finish_bytes())
    }

    /// Buffer size needed for [`encode_b64`](Self::encode_b64).
    pub fn encode_buffer_bytes_b64(&self, payload_len: usize) -> usize {
        b64::encode_buffer_bytes(self.encode_buffer_bytes(payload_len))
    }

    /// Encrypt `payload` into `out` as one message.
    ///
    /// # Errors
    ///
    /// - `BufferTooSmall` if `out` is shorter than `encode_buffer_bytes`
    /// - `NotInstantiated` / `ChannelFailed` if the stream is not ready
    pub fn encode(
        &mut self,
        clock: &impl TimestampSource,
        payload: &[u8],
        out: &mut [u8],
    ) -> Result<Encoded, TokenError> {
        need(out.len(), self.encode_buffer_bytes(payload.len()))?;
        let padded = self.suite.padded_len(payload.len());
        let (body, tail) = out.split_at_mut(padded);
        body[..payload.len()].copy_from_slice(payload);
        body[payload.len()..].fill(0);

        let mut session = self.encrypt_start()?;
        session.chunk_in_place(body)?;
        session.set_data_len(payload.len() as u64);
        let trailer = session.finish(clock)?;
        tail[..trailer.len()].copy_from_slice(trailer);

        Ok(Encoded { offset: 0, len: padded + trailer.len() })
    }

    /// Encrypt `payload` as NUL-terminated Base64.
    pub fn encode_b64(
        &mut self,
        clock: &impl TimestampSource,
        payload: &[u8],
        out: &mut [u8],
    ) -> Result<Encoded, TokenError> {
        let raw_len = self.encode_buffer_bytes(payload.len());
        b64::encode_via(raw_len, out, |raw| self.encode(clock, payload, raw))
    }

    /// Begin a chunked message. The session borrows the encoder until it is
    /// finished or dropped.
    pub fn encrypt_start(&mut self) -> Result<EncryptSession<'_, D, C, M>, TokenError> {
        self.inner.random.ensure_ready()?;
        let sequence = self.inner.sequence;
        match self.suite.start_message(&mut self.inner.random, sequence) {
            Ok((stream, mac)) => {
                tracing::debug!(sequence, "encrypt session started");
                Ok(EncryptSession::new(self, stream, mac, sequence))
            },
            Err(err) => {
                self.abandon_message();
                Err(err)
            },
        }
    }

    /// Skip the rest of the current message's stream and its sequence number,
    /// so the decoder can still catch up past it.
    pub(super) fn abandon_message(&mut self) {
        let [_, trailer_body] = self.suite.segments(&self.inner.layout);
        if let Err(err) = self.inner.random.skip(trailer_body) {
            tracing::warn!(sequence = self.inner.sequence, error = %err, "abandoning message failed");
        }
        self.inner.sequence = self.inner.sequence.wrapping_add(1);
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
