//! Chunked encrypt and decrypt sessions.

use tokenveil_crypto::{Cipher, CipherStream, Drbg, Mac, MacState};
use zeroize::Zeroizing;

use super::{MAX_TRAILER_PAYLOAD_BYTES, MkeDecoder, MkeEncoder};
use crate::{
    clock::TimestampSource,
    decoder::merge,
    error::{Status, TokenError, need},
    random::RandomSource,
    token::Payload,
    verifier::SequenceDecision,
};

fn check_aligned(len: usize, block: usize) -> Result<(), TokenError> {
    if len % block != 0 {
        return Err(TokenError::Misaligned { len, block });
    }
    Ok(())
}

/// A message being encrypted chunk by chunk.
///
/// Dropping the session without [`finish`](Self::finish) abandons the message:
/// its sequence number and stream are skipped so later messages still decode
/// on a windowed channel.
pub struct EncryptSession<'a, D: Drbg, C: Cipher, M: Mac> {
    engine: Option<&'a mut MkeEncoder<D, C, M>>,
    stream: C::Stream,
    mac: Option<M::State>,
    sequence: u64,
    data_len: u64,
}

impl<'a, D: Drbg, C: Cipher, M: Mac> EncryptSession<'a, D, C, M> {
    pub(super) fn new(
        engine: &'a mut MkeEncoder<D, C, M>,
        stream: C::Stream,
        mac: M::State,
        sequence: u64,
    ) -> Self {
        Self { engine: Some(engine), stream, mac: Some(mac), sequence, data_len: 0 }
    }

    /// Sequence number this message carries.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Encrypt `data` into `out`. `data` must be a multiple of the cipher
    /// block size; exactly `data.len()` bytes are written.
    pub fn chunk(&mut self, data: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
        need(out.len(), data.len())?;
        let out = &mut out[..data.len()];
        out.copy_from_slice(data);
        self.chunk_in_place(out)?;
        Ok(data.len())
    }

    /// Encrypt `data` in place.
    pub fn chunk_in_place(&mut self, data: &mut [u8]) -> Result<(), TokenError> {
        let block = self.engine.as_ref().map_or(1, |engine| engine.suite.block_bytes());
        check_aligned(data.len(), block)?;
        self.stream.encrypt(data)?;
        if let Some(mac) = self.mac.as_mut() {
            mac.update(data);
        }
        self.data_len += data.len() as u64;
        Ok(())
    }

    /// Record the plaintext length when the last chunk carried padding.
    pub(super) fn set_data_len(&mut self, data_len: u64) {
        self.data_len = data_len;
    }

    /// Tokenize the trailer. The returned slice is valid until the encoder is
    /// used again.
    pub fn finish(mut self, clock: &impl TimestampSource) -> Result<&'a [u8], TokenError> {
        let (Some(engine), Some(mac)) = (self.engine.take(), self.mac.take()) else {
            unreachable!("session state is only taken by finish");
        };

        let mut payload = Zeroizing::new([0u8; MAX_TRAILER_PAYLOAD_BYTES]);
        let len = match engine.suite.seal(mac, self.sequence, self.data_len, &mut payload) {
            Ok(len) => len,
            Err(err) => {
                engine.abandon_message();
                return Err(err);
            },
        };

        let trailer =
            engine.inner.encode_payload(clock, Payload::new(&payload[..len]), &mut engine.trailer)?;
        tracing::debug!(
            sequence = self.sequence,
            data_len = self.data_len,
            "encrypt session finished"
        );
        Ok(&engine.trailer[..trailer.len])
    }
}

impl<D: Drbg, C: Cipher, M: Mac> Drop for EncryptSession<'_, D, C, M> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            tracing::debug!(sequence = self.sequence, "encrypt session abandoned");
            engine.abandon_message();
        }
    }
}

/// Outcome of a finished decrypt session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptFinished {
    /// Plaintext length; chunk output beyond it is cipher padding
    pub data_len: usize,
    /// Success or warning
    pub status: Status,
}

/// A message being decrypted chunk by chunk.
///
/// The session expects the decoder's next sequence number and holds back the
/// trailer-sized tail of the input. Nothing is committed until
/// [`finish`](Self::finish) succeeds.
pub struct DecryptSession<'a, D: Drbg, C: Cipher, M: Mac> {
    engine: &'a mut MkeDecoder<D, C, M>,
    working: RandomSource<D>,
    decision: SequenceDecision,
    stream: C::Stream,
    mac: M::State,
    held: usize,
    released: usize,
}

impl<'a, D: Drbg, C: Cipher, M: Mac> DecryptSession<'a, D, C, M> {
    pub(super) fn new(
        engine: &'a mut MkeDecoder<D, C, M>,
        working: RandomSource<D>,
        decision: SequenceDecision,
        stream: C::Stream,
        mac: M::State,
    ) -> Self {
        Self { engine, working, decision, stream, mac, held: 0, released: 0 }
    }

    /// Sequence number the trailer must carry.
    pub fn sequence(&self) -> u64 {
        self.decision.sequence
    }

    /// Output size that always suffices for a chunk of `chunk_len` bytes.
    pub fn chunk_buffer_bytes(&self, chunk_len: usize) -> usize {
        chunk_len + self.held
    }

    /// Feed the next piece of the message and write the plaintext that can be
    /// released into `out`. Returns the number of bytes written, which may be
    /// less than `data.len()`.
    pub fn chunk(&mut self, data: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
        let trailer_len = self.engine.trailer_len();
        let block = self.engine.suite.block_bytes();
        let available = self.held + data.len();
        let release = available.saturating_sub(trailer_len) / block * block;
        need(out.len(), release)?;

        let holdback = &mut self.engine.holdback;
        let from_held = release.min(self.held);
        let from_data = release - from_held;
        out[..from_held].copy_from_slice(&holdback[..from_held]);
        out[from_held..release].copy_from_slice(&data[..from_data]);

        holdback.copy_within(from_held..self.held, 0);
        let kept = self.held - from_held;
        let rest = &data[from_data..];
        holdback[kept..kept + rest.len()].copy_from_slice(rest);
        self.held = kept + rest.len();

        let out = &mut out[..release];
        self.mac.update(out);
        self.stream.decrypt(out)?;
        self.released += release;
        Ok(release)
    }

    /// Verify the trailer and tag, check the timestamp and commit the message.
    ///
    /// # Errors
    ///
    /// - `MalformedInput` if less than a trailer was fed
    /// - `SequenceOutOfWindow` if the trailer carries another sequence number
    /// - `InvalidToken` / `CrcMismatch` / `TagMismatch` if the message is not
    ///   authentic; all released plaintext must be discarded
    /// - `TimestampOutOfWindow` under the mandatory policy
    pub fn finish(self, clock: &impl TimestampSource) -> Result<DecryptFinished, TokenError> {
        let Self { engine, mut working, decision, stream: _, mac, held, released } = self;
        let trailer_len = engine.trailer_len();
        if held != trailer_len {
            return Err(TokenError::MalformedInput {
                reason: "message does not end with a trailer",
            });
        }

        let trailer = &engine.holdback[..trailer_len];
        if let Some(sequence) = engine.inner.layout.read_sequence(trailer)
            && sequence != decision.sequence
        {
            tracing::warn!(sequence, expected = decision.sequence, "trailer sequence mismatch");
            let base = engine.inner.sequence.base();
            return Err(TokenError::SequenceOutOfWindow { sequence, base });
        }

        let mut payload = Zeroizing::new([0u8; MAX_TRAILER_PAYLOAD_BYTES]);
        let payload = &mut payload[..engine.suite.trailer_payload_len()];
        let meta = match engine.inner.layout.detokenize(&mut working, trailer, payload) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(sequence = decision.sequence, error = %err, "trailer rejected");
                return Err(engine.inner.absorb(err));
            },
        };

        let data_len = engine.suite.data_len(payload, released)?;
        if let Err(err) = engine.suite.verify(mac, decision.sequence, payload) {
            tracing::warn!(sequence = decision.sequence, "tag mismatch");
            return Err(err);
        }

        let segments = engine.suite.segments(&engine.inner.layout);
        let status = engine.finish_message(clock, working, &decision, &segments, meta.timestamp)?;
        Ok(DecryptFinished { data_len, status: merge(status, decision.status) })
    }
}
