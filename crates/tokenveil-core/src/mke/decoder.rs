use tokenveil_crypto::{
    BuiltinCipher, BuiltinDrbg, BuiltinMac, Cipher, CipherStream, Drbg, EntropySource, Mac,
    MacState, NonceSource, wipe,
};
use zeroize::Zeroizing;

use super::{MAX_HOLDBACK_BYTES, MAX_TRAILER_PAYLOAD_BYTES, Suite, session::DecryptSession};
use crate::{
    b64,
    clock::TimestampSource,
    config::{ChannelConfig, DecoderOptions, MkeConfig},
    decoder::{Decoded, Decoder, merge},
    error::{Status, TokenError, need},
    random::RandomSource,
    verifier::{DecodeReport, SequenceDecision, timestamp},
};

/// Decoder for Managed-Key Encryption messages.
#[derive(Clone)]
pub struct MkeDecoder<D = BuiltinDrbg, C = BuiltinCipher, M = BuiltinMac> {
    pub(super) inner: Decoder<D>,
    pub(super) suite: Suite<C, M>,
    pub(super) holdback: [u8; MAX_HOLDBACK_BYTES],
}

impl MkeDecoder {
    /// Create an uninstantiated decoder with the built-in primitives.
    pub fn new(
        config: &ChannelConfig,
        options: DecoderOptions,
        mke: MkeConfig,
    ) -> Result<Self, TokenError> {
        Self::with_primitives(
            BuiltinDrbg::new(config.drbg),
            BuiltinCipher(mke.cipher),
            BuiltinMac(mke.mac),
            config,
            options,
        )
    }
}

impl<D: Drbg, C: Cipher, M: Mac> MkeDecoder<D, C, M> {
    /// Create around caller-supplied primitives. `config.drbg` is ignored.
    pub fn with_primitives(
        drbg: D,
        cipher: C,
        mac: M,
        config: &ChannelConfig,
        options: DecoderOptions,
    ) -> Result<Self, TokenError> {
        Ok(Self {
            inner: Decoder::with_drbg(drbg, config, options)?,
            suite: Suite::new(cipher, mac)?,
            holdback: [0u8; MAX_HOLDBACK_BYTES],
        })
    }

    /// Seed the stream and expect sequence number 0.
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

    /// The wrapped token decoder, for the verifier report.
    pub fn inner(&self) -> &Decoder<D> {
        &self.inner
    }

    /// Next expected sequence number.
    pub fn base_sequence(&self) -> u64 {
        self.inner.base_sequence()
    }

    /// Cipher block size.
    pub fn block_bytes(&self) -> usize {
        self.suite.block_bytes()
    }

    pub(super) fn trailer_len(&self) -> usize {
        self.suite.trailer_len(&self.inner.layout)
    }

    /// Buffer size needed to decode an input of `encoded_len` bytes,
    /// including the NUL terminator.
    pub fn decode_buffer_bytes(&self, encoded_len: usize) -> usize {
        encoded_len.saturating_sub(self.trailer_len()) + 1
    }

    /// Buffer size needed for [`decode_b64`](Self::decode_b64).
    pub fn decode_buffer_bytes_b64(&self, text_len: usize) -> usize {
        b64::decode_buffer_bytes(text_len, |raw| self.decode_buffer_bytes(raw))
    }

    /// Decrypt one message into `out` and NUL-terminate it.
    ///
    /// The tag is checked before any plaintext is written.
    ///
    /// # Errors
    ///
    /// - `MalformedInput` if the input is shorter than a trailer or the
    ///   ciphertext is not block-aligned
    /// - `SequenceOutOfWindow` before any stream is consumed
    /// - `InvalidToken` / `CrcMismatch` / `TagMismatch` if the message is not
    ///   authentic; the channel state is unchanged
    /// - `TimestampOutOfWindow` under the mandatory policy
    pub fn decode(
        &mut self,
        clock: &impl TimestampSource,
        encoded: &[u8],
        out: &mut [u8],
    ) -> Result<Decoded, TokenError> {
        self.inner.random.ensure_ready()?;
        let trailer_len = self.trailer_len();
        let cipher_len = encoded
            .len()
            .checked_sub(trailer_len)
            .ok_or(TokenError::MalformedInput { reason: "shorter than a trailer" })?;
        if cipher_len % self.suite.block_bytes() != 0 {
            return Err(TokenError::MalformedInput { reason: "ciphertext not block-aligned" });
        }
        need(out.len(), cipher_len + 1)?;
        let (ciphertext, trailer) = encoded.split_at(cipher_len);

        let decision = self.inner.classify(self.inner.incoming_sequence(trailer))?;
        let segments = self.suite.segments(&self.inner.layout);
        let mut working = self.inner.position(&decision, &segments)?;
        let (mut stream, mut mac) = match self.suite.start_message(&mut working, decision.sequence) {
            Ok(started) => started,
            Err(err) => return Err(self.inner.absorb(err)),
        };

        let mut payload = Zeroizing::new([0u8; MAX_TRAILER_PAYLOAD_BYTES]);
        let payload = &mut payload[..self.suite.trailer_payload_len()];
        let meta = match self.inner.layout.detokenize(&mut working, trailer, payload) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(sequence = decision.sequence, error = %err, "trailer rejected");
                return Err(self.inner.absorb(err));
            },
        };

        let data_len = self.suite.data_len(payload, cipher_len)?;
        mac.update(ciphertext);
        if let Err(err) = self.suite.verify(mac, decision.sequence, payload) {
            tracing::warn!(sequence = decision.sequence, "tag mismatch");
            return Err(err);
        }

        let plain = &mut out[..cipher_len];
        plain.copy_from_slice(ciphertext);
        stream.decrypt(plain)?;
        wipe::wipe(&mut plain[data_len..]);

        let status = match self.finish_message(clock, working, &decision, &segments, meta.timestamp) {
            Ok(status) => status,
            Err(err) => {
                wipe::wipe(&mut out[..data_len]);
                return Err(err);
            },
        };
        out[data_len] = 0;
        Ok(Decoded { offset: 0, len: data_len, status: merge(status, decision.status) })
    }

    /// Decrypt a NUL-terminated Base64 message.
    pub fn decode_b64(
        &mut self,
        clock: &impl TimestampSource,
        text: &[u8],
        out: &mut [u8],
    ) -> Result<Decoded, TokenError> {
        let trailer_len = self.trailer_len();
        b64::decode_via(
            text,
            out,
            |raw| raw.saturating_sub(trailer_len) + 1,
            |raw, head| self.decode(clock, raw, head),
        )
    }

    /// Begin a chunked decrypt of the next expected message.
    pub fn decrypt_start(&mut self) -> Result<DecryptSession<'_, D, C, M>, TokenError> {
        self.inner.random.ensure_ready()?;
        let decision = self.inner.classify(self.inner.base_sequence())?;
        let segments = self.suite.segments(&self.inner.layout);
        let mut working = self.inner.position(&decision, &segments)?;
        let (stream, mac) = match self.suite.start_message(&mut working, decision.sequence) {
            Ok(started) => started,
            Err(err) => return Err(self.inner.absorb(err)),
        };
        tracing::debug!(sequence = decision.sequence, "decrypt session started");
        Ok(DecryptSession::new(self, working, decision, stream, mac))
    }

    /// Timestamp check and commit shared by single-shot and chunked decrypt.
    /// The message is committed even when the timestamp is rejected.
    pub(super) fn finish_message(
        &mut self,
        clock: &impl TimestampSource,
        working: RandomSource<D>,
        decision: &SequenceDecision,
        segments: &[usize],
        enc_ts: u64,
    ) -> Result<Status, TokenError> {
        let dec_ts = self.inner.read_clock(clock);
        let options = self.inner.options;
        let verdict =
            timestamp::check(enc_ts, dec_ts, options.timestamp_window, options.timestamp_policy);
        self.inner.commit(
            working,
            decision,
            segments,
            DecodeReport { enc_ts, dec_ts, msg_skipped: decision.skipped },
        )?;
        verdict
    }

    /// Size of the saved state.
    pub fn save_bytes(&self) -> Result<usize, TokenError> {
        self.inner.save_bytes()
    }

    /// Size of the saved state as Base64, including the NUL.
    pub fn save_bytes_b64(&self) -> Result<usize, TokenError> {
        self.inner.save_bytes_b64()
    }

    /// Save the inner decoder state.
    pub fn save_state(&self, out: &mut [u8]) -> Result<usize, TokenError> {
        self.inner.save_state(out)
    }

    /// Restore the inner decoder state.
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
