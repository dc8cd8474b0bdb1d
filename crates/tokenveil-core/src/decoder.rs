//! Decoder engine.
//!
//! # Decode pipeline
//!
//! 1. Read the clear sequence number (no stream work).
//! 2. Classify it against the window. Rejections return here with the state
//!    untouched.
//! 3. Pick a working copy of the stream: the committed stream (which sits at
//!    the base) for on-time and ahead messages, the recorded snapshot for
//!    late ones. Ahead messages skip the copy forward.
//! 4. Detokenize on the copy: check bytes, then CRC-32.
//! 5. Commit the new base and the report, moving the committed stream along
//!    with the base. Only then is the timestamp verdict returned.
//!
//! Positions of messages that have not been seen are found by skipping, which
//! assumes those messages had the same length as the incoming one. That
//! matters only for ahead messages and for a lookback rebase past unseen
//! messages; in-order and late messages always decode from their exact
//! position. Channels that lose or reorder messages of varying length should
//! use the fixed-length adapter or MKE.

use std::mem;

use tokenveil_crypto::{BuiltinDrbg, Drbg, EntropySource, NonceSource, wipe};

use crate::{
    b64,
    clock::TimestampSource,
    config::{ChannelConfig, DecoderOptions, SequenceWindow},
    error::{Status, TokenError, need},
    history::StreamHistory,
    random::RandomSource,
    state::{StateReader, StateWriter},
    token::TokenLayout,
    verifier::{DecodeReport, SequenceDecision, SequenceVerifier, timestamp},
};

/// Location and outcome of a decoded payload inside the caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// Start of the payload
    pub offset: usize,
    /// Payload length (the NUL written after it is not counted)
    pub len: usize,
    /// Success or warning
    pub status: Status,
}

impl Decoded {
    /// The payload bytes within `buf`.
    pub fn slice<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.offset..self.offset + self.len]
    }
}

/// Reverses tokens for one channel and enforces the verifier chain.
#[derive(Clone)]
pub struct Decoder<D = BuiltinDrbg> {
    pub(crate) random: RandomSource<D>,
    pub(crate) layout: TokenLayout,
    pub(crate) options: DecoderOptions,
    pub(crate) sequence: SequenceVerifier,
    pub(crate) history: StreamHistory<D>,
    pub(crate) report: DecodeReport,
}

impl Decoder<BuiltinDrbg> {
    /// Create an uninstantiated decoder with the configured built-in DRBG.
    pub fn new(config: &ChannelConfig, options: DecoderOptions) -> Result<Self, TokenError> {
        Self::with_drbg(BuiltinDrbg::new(config.drbg), config, options)
    }
}

impl<D: Drbg> Decoder<D> {
    /// Create an uninstantiated decoder around a caller-supplied DRBG.
    /// `config.drbg` is ignored.
    pub fn with_drbg(
        drbg: D,
        config: &ChannelConfig,
        options: DecoderOptions,
    ) -> Result<Self, TokenError> {
        options.validate()?;
        Ok(Self {
            random: RandomSource::new(drbg),
            layout: TokenLayout::new(config)?,
            options,
            sequence: SequenceVerifier::new(options.sequence_window),
            history: StreamHistory::new(history_capacity(options.sequence_window)),
            report: DecodeReport::default(),
        })
    }

    /// Seed the stream and expect sequence number 0.
    pub fn instantiate(
        &mut self,
        entropy: &mut impl EntropySource,
        nonce: &mut impl NonceSource,
        personalization: &[u8],
    ) -> Result<(), TokenError> {
        self.random.instantiate(entropy, nonce, personalization)?;
        self.sequence = SequenceVerifier::new(self.options.sequence_window);
        self.history.clear();
        self.report = DecodeReport::default();
        tracing::debug!(window = ?self.options.sequence_window, "decoder instantiated");
        Ok(())
    }

    /// Reseed the stream at the base.
    ///
    /// The encoder must reseed with the same entropy when its sequence
    /// counter equals this decoder's base. Late messages from before that
    /// point still decode: their recorded positions predate the reseed, as
    /// did the encoder's stream when it produced them.
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
        self.sequence = SequenceVerifier::new(self.options.sequence_window);
        self.history.clear();
        self.report = DecodeReport::default();
    }

    /// Layout in use.
    pub fn layout(&self) -> &TokenLayout {
        &self.layout
    }

    /// Tolerance settings.
    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Encode timestamp of the most recent decode.
    pub fn enc_ts(&self) -> u64 {
        self.report.enc_ts
    }

    /// Decode timestamp of the most recent decode.
    pub fn dec_ts(&self) -> u64 {
        self.report.dec_ts
    }

    /// How far ahead of the base the most recent decoded message was.
    pub fn msg_skipped(&self) -> u64 {
        self.report.msg_skipped
    }

    /// Next expected sequence number.
    pub fn base_sequence(&self) -> u64 {
        self.sequence.base()
    }

    /// Generate requests since the last (re)seed, plus one.
    pub fn reseed_counter(&self) -> u64 {
        self.random.reseed_counter()
    }

    /// Buffer size needed to decode an input of `encoded_len` bytes,
    /// including the NUL terminator.
    pub fn decode_buffer_bytes(&self, encoded_len: usize) -> usize {
        self.layout.max_payload_len(encoded_len) + 1
    }

    /// Buffer size needed for [`decode_b64`](Self::decode_b64) of
    /// `text_len` bytes of Base64.
    pub fn decode_buffer_bytes_b64(&self, text_len: usize) -> usize {
        b64::decode_buffer_bytes(text_len, |raw| self.decode_buffer_bytes(raw))
    }

    /// Decode `encoded` into `out` and NUL-terminate it.
    ///
    /// # Errors
    ///
    /// - `SequenceOutOfWindow` before any stream is consumed
    /// - `InvalidToken` / `CrcMismatch` if the message is not authentic;
    ///   the channel state is unchanged
    /// - `TimestampOutOfWindow` under the mandatory policy; the message still
    ///   counts as received
    /// - `ChannelFailed` after a catastrophic failure
    pub fn decode(
        &mut self,
        clock: &impl TimestampSource,
        encoded: &[u8],
        out: &mut [u8],
    ) -> Result<Decoded, TokenError> {
        self.random.ensure_ready()?;
        let payload_len = self
            .layout
            .payload_len(encoded.len())
            .ok_or(TokenError::MalformedInput { reason: "length does not match token layout" })?;
        need(out.len(), payload_len + 1)?;

        let decision = self.classify(self.incoming_sequence(encoded))?;
        let segments = [self.layout.body_bytes(payload_len)];
        let mut working = self.position(&decision, &segments)?;

        let meta = match self.layout.detokenize(&mut working, encoded, out) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(sequence = decision.sequence, error = %err, "token rejected");
                return Err(self.absorb(err));
            },
        };

        let dec_ts = self.read_clock(clock);
        let verdict = timestamp::check(
            meta.timestamp,
            dec_ts,
            self.options.timestamp_window,
            self.options.timestamp_policy,
        );
        self.commit(
            working,
            &decision,
            &segments,
            DecodeReport { enc_ts: meta.timestamp, dec_ts, msg_skipped: decision.skipped },
        )?;

        let status = match verdict {
            Ok(status) => status,
            Err(err) => {
                wipe::wipe(&mut out[..payload_len]);
                return Err(err);
            },
        };
        out[payload_len] = 0;
        Ok(Decoded { offset: 0, len: payload_len, status: merge(status, decision.status) })
    }

    /// Decode NUL-terminated Base64 `text` into `out`.
    pub fn decode_b64(
        &mut self,
        clock: &impl TimestampSource,
        text: &[u8],
        out: &mut [u8],
    ) -> Result<Decoded, TokenError> {
        let layout = self.layout;
        b64::decode_via(
            text,
            out,
            |raw| layout.max_payload_len(raw) + 1,
            |raw, head| self.decode(clock, raw, head),
        )
    }

    pub(crate) fn incoming_sequence(&self, encoded: &[u8]) -> u64 {
        self.layout.read_sequence(encoded).unwrap_or(self.sequence.base())
    }

    pub(crate) fn classify(&self, sequence: u64) -> Result<SequenceDecision, TokenError> {
        self.sequence.check(sequence).inspect_err(|_| {
            tracing::warn!(sequence, base = self.sequence.base(), "sequence outside window");
        })
    }

    pub(crate) fn read_clock(&self, clock: &impl TimestampSource) -> u64 {
        if self.layout.verifiers().has_timestamp() { clock.timestamp() } else { 0 }
    }

    /// Working copy of the stream positioned at the decided message.
    pub(crate) fn position(
        &mut self,
        decision: &SequenceDecision,
        segments: &[usize],
    ) -> Result<RandomSource<D>, TokenError> {
        let base = self.sequence.base();
        if decision.sequence < base {
            return self.history.get(decision.sequence).cloned().ok_or_else(|| {
                tracing::warn!(sequence = decision.sequence, base, "no stream position recorded");
                TokenError::SequenceOutOfWindow { sequence: decision.sequence, base }
            });
        }

        let mut working = self.random.clone();
        match working.skip_messages(decision.sequence - base, segments) {
            Ok(()) => Ok(working),
            Err(err) => Err(self.absorb(err)),
        }
    }

    /// Carry a catastrophic failure from a working copy over to the channel.
    pub(crate) fn absorb(&mut self, err: TokenError) -> TokenError {
        if err.is_catastrophic() {
            self.random.poison();
        }
        err
    }

    /// Accept a decoded message: move the base and bring the committed stream
    /// along with it, recording the positions it leaves behind.
    ///
    /// `working` sits just past the decoded message.
    pub(crate) fn commit(
        &mut self,
        working: RandomSource<D>,
        decision: &SequenceDecision,
        segments: &[usize],
        report: DecodeReport,
    ) -> Result<(), TokenError> {
        let base = self.sequence.base();
        self.sequence.accept(decision);
        let next_base = self.sequence.base();
        let floor = self.sequence.floor();

        let consumed = decision.sequence >= base && next_base == decision.sequence.wrapping_add(1);
        if consumed {
            let previous = mem::replace(&mut self.random, working);
            if decision.sequence == base {
                self.history.record(base, previous);
            }
        } else if next_base > base {
            // Lookback rebase: the new base lies between the old one and the message
            let mut walked = self.random.clone();
            if let Err(err) = self.history.walk(&mut walked, base, next_base, floor, segments) {
                return Err(self.absorb(err));
            }
            self.random = walked;
        }
        self.history.evict_below(floor);
        self.report = report;

        tracing::debug!(
            sequence = decision.sequence,
            base = self.sequence.base(),
            skipped = decision.skipped,
            "decoded message"
        );
        Ok(())
    }

    /// Size of the saved state. Lookback decoders add one slot per window
    /// position.
    pub fn save_bytes(&self) -> Result<usize, TokenError> {
        let drbg_len = self.random.state_bytes()?;
        Ok(drbg_len + 4 * 8 + self.history.capacity() * (1 + drbg_len))
    }

    /// Buffer size for [`save_state_b64`](Self::save_state_b64): the text,
    /// its NUL and room to stage the raw state.
    pub fn save_bytes_b64(&self) -> Result<usize, TokenError> {
        Ok(b64::encode_buffer_bytes(self.save_bytes()?))
    }

    /// Save `drbg_state ‖ base ‖ enc_ts ‖ dec_ts ‖ msg_skipped`, followed in
    /// lookback mode by one `present ‖ drbg_state` slot for each sequence
    /// number from `base - w` to `base - 1`.
    pub fn save_state(&self, out: &mut [u8]) -> Result<usize, TokenError> {
        let len = self.save_bytes()?;
        let drbg_len = self.random.state_bytes()?;
        let base = self.sequence.base();
        let mut writer = StateWriter::new(out, len)?;
        writer.drbg(&self.random)?;
        writer.u64(base);
        writer.u64(self.report.enc_ts);
        writer.u64(self.report.dec_ts);
        writer.u64(self.report.msg_skipped);

        let window = self.history.capacity();
        for slot in 0..window {
            match slot_sequence(base, window, slot).and_then(|s| self.history.get(s)) {
                Some(snapshot) => {
                    writer.u8(1);
                    writer.drbg(snapshot)?;
                },
                None => {
                    writer.u8(0);
                    writer.zeros(drbg_len);
                },
            }
        }
        Ok(writer.finish())
    }

    /// Restore a state written by [`save_state`](Self::save_state).
    pub fn restore_state(&mut self, saved: &[u8]) -> Result<(), TokenError> {
        let mut reader = StateReader::new(saved, self.save_bytes()?)?;
        let drbg_len = self.random.state_bytes()?;
        let drbg_state = reader.take(drbg_len);
        let base = reader.u64();
        let report =
            DecodeReport { enc_ts: reader.u64(), dec_ts: reader.u64(), msg_skipped: reader.u64() };

        let window = self.history.capacity();
        let mut history = StreamHistory::new(window);
        for slot in 0..window {
            let present = reader.u8() != 0;
            let snapshot_state = reader.take(drbg_len);
            if let (true, Some(sequence)) = (present, slot_sequence(base, window, slot)) {
                let mut snapshot = self.random.clone();
                snapshot.restore(snapshot_state)?;
                history.record(sequence, snapshot);
            }
        }

        self.random.restore(drbg_state)?;
        self.sequence.set_base(base);
        self.history = history;
        self.report = report;
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

/// Snapshots a decoder keeps for late messages.
fn history_capacity(window: SequenceWindow) -> usize {
    match window {
        SequenceWindow::Lookback(w) => usize::from(w),
        SequenceWindow::Strict | SequenceWindow::CatchUp(_) => 0,
    }
}

/// Sequence number stored in save slot `slot` of `window` below `base`.
fn slot_sequence(base: u64, window: usize, slot: usize) -> Option<u64> {
    let below = u64::try_from(window - slot).ok()?;
    base.checked_sub(below)
}

/// Timestamp warnings take precedence over sequence warnings.
pub(crate) fn merge(timestamp: Status, sequence: Status) -> Status {
    if timestamp == Status::Success { sequence } else { timestamp }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{SequenceWindow, TimestampPolicy, Verifiers},
        encoder::Encoder,
    };

    const ENTROPY: [u8; 32] = [0x5C; 32];

    fn pair(config: &ChannelConfig, options: DecoderOptions) -> (Encoder, Decoder) {
        let mut encoder = Encoder::new(config).unwrap();
        let mut decoder = Decoder::new(config, options).unwrap();
        encoder.instantiate(&mut &ENTROPY[..], &mut 3u64, b"pair").unwrap();
        decoder.instantiate(&mut &ENTROPY[..], &mut 3u64, b"pair").unwrap();
        (encoder, decoder)
    }

    fn encode(encoder: &mut Encoder, ts: u64, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; encoder.encode_buffer_bytes(payload.len())];
        let encoded = encoder.encode(&|| ts, payload, &mut out).unwrap();
        out.truncate(encoded.len);
        out
    }

    fn decode(decoder: &mut Decoder, ts: u64, token: &[u8]) -> Result<(Vec<u8>, Status), TokenError> {
        let mut out = vec![0u8; decoder.decode_buffer_bytes(token.len())];
        let decoded = decoder.decode(&|| ts, token, &mut out)?;
        assert_eq!(out[decoded.len], 0);
        Ok((decoded.slice(&out).to_vec(), decoded.status))
    }

    #[test]
    fn roundtrip_strict() {
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), DecoderOptions::default());
        for msg in [&b"one"[..], b"", b"three three three"] {
            let token = encode(&mut enc, 10, msg);
            let (plain, status) = decode(&mut dec, 10, &token).unwrap();
            assert_eq!(plain, msg);
            assert_eq!(status, Status::Success);
        }
        assert_eq!(dec.base_sequence(), 3);
        assert_eq!(dec.enc_ts(), 10);
        assert_eq!(dec.dec_ts(), 10);
    }

    #[test]
    fn strict_rejects_out_of_order_without_consuming_stream() {
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), DecoderOptions::default());
        let first = encode(&mut enc, 0, b"first");
        let second = encode(&mut enc, 0, b"second");
        let counter = dec.reseed_counter();

        let err = decode(&mut dec, 0, &second).unwrap_err();
        assert_eq!(err, TokenError::SequenceOutOfWindow { sequence: 1, base: 0 });
        assert_eq!(dec.reseed_counter(), counter);

        assert_eq!(decode(&mut dec, 0, &first).unwrap().0, b"first");
        assert_eq!(decode(&mut dec, 0, &second).unwrap().0, b"second");
    }

    #[test]
    fn tampered_token_leaves_state_unchanged() {
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), DecoderOptions::default());
        let mut token = encode(&mut enc, 0, b"payload");
        token[20] ^= 0x80;

        assert!(decode(&mut dec, 0, &token).unwrap_err().is_rejection());
        assert_eq!(dec.base_sequence(), 0);

        token[20] ^= 0x80;
        assert_eq!(decode(&mut dec, 0, &token).unwrap().0, b"payload");
    }

    #[test]
    fn replay_rejected_in_strict_mode() {
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), DecoderOptions::default());
        let token = encode(&mut enc, 0, b"once");
        decode(&mut dec, 0, &token).unwrap();
        assert!(matches!(decode(&mut dec, 0, &token), Err(TokenError::SequenceOutOfWindow { .. })));
    }

    #[test]
    fn no_sequence_verifier_decodes_in_order() {
        let config = ChannelConfig { verifiers: Verifiers::Crc32, ..Default::default() };
        let (mut enc, mut dec) = pair(&config, DecoderOptions::default());
        for msg in [&b"a"[..], b"bb", b"ccc"] {
            let token = encode(&mut enc, 0, msg);
            assert_eq!(decode(&mut dec, 0, &token).unwrap().0, msg);
        }
    }

    #[test]
    fn lookback_accepts_late_and_ahead() {
        let options =
            DecoderOptions { sequence_window: SequenceWindow::Lookback(3), ..Default::default() };
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), options);
        let tokens: Vec<_> = (0..6).map(|_| encode(&mut enc, 0, b"same-len")).collect();

        // 2 arrives first: ahead, base stays 0
        let (_, status) = decode(&mut dec, 0, &tokens[2]).unwrap();
        assert_eq!(status, Status::SequenceAhead);
        assert_eq!(dec.base_sequence(), 0);
        assert_eq!(dec.msg_skipped(), 2);

        // 0 and 1 in order
        decode(&mut dec, 0, &tokens[0]).unwrap();
        decode(&mut dec, 0, &tokens[1]).unwrap();
        assert_eq!(dec.base_sequence(), 2);

        // 5 is exactly w ahead of base 2
        let (plain, status) = decode(&mut dec, 0, &tokens[5]).unwrap();
        assert_eq!(plain, b"same-len");
        assert_eq!(status, Status::SequenceAhead);
        assert_eq!(dec.base_sequence(), 2);

        // 3 is still reachable
        assert_eq!(decode(&mut dec, 0, &tokens[3]).unwrap().0, b"same-len");
    }

    #[test]
    fn lookback_in_order_tracks_exact_positions() {
        let options =
            DecoderOptions { sequence_window: SequenceWindow::Lookback(3), ..Default::default() };
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), options);
        let payloads: [&[u8]; 5] = [b"a", &[b'b'; 70], b"ccc", &[b'd'; 300], b"e"];

        for payload in payloads {
            let token = encode(&mut enc, 0, payload);
            assert_eq!(decode(&mut dec, 0, &token).unwrap(), (payload.to_vec(), Status::Success));
        }
        assert_eq!(dec.base_sequence(), 5);
    }

    #[test]
    fn lookback_history_survives_save_restore() {
        let options =
            DecoderOptions { sequence_window: SequenceWindow::Lookback(4), ..Default::default() };
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), options);
        let payloads: [&[u8]; 3] = [b"x", b"yy", &[b'z'; 90]];
        let tokens: Vec<_> = payloads.iter().map(|p| encode(&mut enc, 0, p)).collect();
        for token in &tokens {
            decode(&mut dec, 0, token).unwrap();
        }

        let mut saved = vec![0u8; dec.save_bytes_b64().unwrap()];
        let len = dec.save_state_b64(&mut saved).unwrap();
        let mut restored = Decoder::new(&ChannelConfig::default(), options).unwrap();
        restored.restore_state_b64(&saved[..len]).unwrap();

        assert_eq!(decode(&mut restored, 0, &tokens[0]).unwrap(), (b"x".to_vec(), Status::SequenceLate));
        assert_eq!(decode(&mut restored, 0, &tokens[1]).unwrap().0, b"yy");
        let next = encode(&mut enc, 0, b"next");
        assert_eq!(decode(&mut restored, 0, &next).unwrap(), (b"next".to_vec(), Status::Success));
    }

    #[test]
    fn save_bytes_include_lookback_slots() {
        let config = ChannelConfig::default();
        let strict = Decoder::new(&config, DecoderOptions::default()).unwrap();
        let lookback = Decoder::new(
            &config,
            DecoderOptions { sequence_window: SequenceWindow::Lookback(4), ..Default::default() },
        )
        .unwrap();

        let drbg_len = strict.save_bytes().unwrap() - 32;
        assert_eq!(lookback.save_bytes().unwrap(), strict.save_bytes().unwrap() + 4 * (1 + drbg_len));
    }

    #[test]
    fn catch_up_skips_lost_messages() {
        let options =
            DecoderOptions { sequence_window: SequenceWindow::CatchUp(5), ..Default::default() };
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), options);
        let tokens: Vec<_> = (0..4).map(|_| encode(&mut enc, 0, b"fixed")).collect();

        let (plain, status) = decode(&mut dec, 0, &tokens[3]).unwrap();
        assert_eq!(plain, b"fixed");
        assert_eq!(status, Status::SequenceSkipped);
        assert_eq!(dec.msg_skipped(), 3);
        assert_eq!(dec.base_sequence(), 4);

        assert!(decode(&mut dec, 0, &tokens[1]).is_err());
        let next = encode(&mut enc, 0, b"fixed");
        assert_eq!(decode(&mut dec, 0, &next).unwrap().1, Status::Success);
    }

    #[test]
    fn advisory_timestamp_warns_and_commits() {
        let options = DecoderOptions { timestamp_window: 100, ..Default::default() };
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), options);
        let token = encode(&mut enc, 1000, b"late");

        let (plain, status) = decode(&mut dec, 1101, &token).unwrap();
        assert_eq!(plain, b"late");
        assert_eq!(status, Status::TimestampStale);
        assert_eq!(dec.base_sequence(), 1);
    }

    #[test]
    fn mandatory_timestamp_rejects_but_stays_in_sync() {
        let options = DecoderOptions {
            timestamp_window: 100,
            timestamp_policy: TimestampPolicy::Mandatory,
            ..Default::default()
        };
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), options);
        let stale = encode(&mut enc, 1000, b"stale");
        let fresh = encode(&mut enc, 2000, b"fresh");

        assert!(matches!(
            decode(&mut dec, 1101, &stale),
            Err(TokenError::TimestampOutOfWindow { .. })
        ));
        assert_eq!(dec.base_sequence(), 1);
        assert_eq!(decode(&mut dec, 2000, &fresh).unwrap().0, b"fresh");
    }

    #[test]
    fn malformed_length_rejected() {
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), DecoderOptions::default());
        let token = encode(&mut enc, 0, b"abc");
        let mut out = vec![0u8; 256];
        assert!(matches!(
            dec.decode(&|| 0u64, &token[..token.len() - 1], &mut out),
            Err(TokenError::MalformedInput { .. })
        ));
    }

    #[test]
    fn b64_roundtrip() {
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), DecoderOptions::default());
        let mut text = vec![0u8; enc.encode_buffer_bytes_b64(6)];
        let encoded = enc.encode_b64(&|| 0u64, b"base64", &mut text).unwrap();

        let mut out = vec![0u8; dec.decode_buffer_bytes_b64(encoded.len)];
        let decoded = dec.decode_b64(&|| 0u64, &text[..=encoded.len], &mut out).unwrap();
        assert_eq!(decoded.slice(&out), b"base64");
        assert_eq!(out[decoded.len], 0);
    }

    #[test]
    fn save_restore_decoder() {
        let (mut enc, mut dec) = pair(&ChannelConfig::default(), DecoderOptions::default());
        let first = encode(&mut enc, 5, b"first");
        decode(&mut dec, 6, &first).unwrap();

        let mut saved = vec![0u8; dec.save_bytes_b64().unwrap()];
        let len = dec.save_state_b64(&mut saved).unwrap();
        let mut restored = Decoder::new(&ChannelConfig::default(), DecoderOptions::default()).unwrap();
        restored.restore_state_b64(&saved[..len]).unwrap();

        assert_eq!(restored.base_sequence(), 1);
        assert_eq!(restored.enc_ts(), 5);
        assert_eq!(restored.dec_ts(), 6);

        let second = encode(&mut enc, 7, b"second");
        assert_eq!(decode(&mut restored, 7, &second).unwrap().0, b"second");
    }
}
