//! Property-based tests for Managed-Key Encryption
//!
//! 1. **Round-trip**: single-shot and chunked decrypt recover the payload
//! 2. **Chunk equivalence**: chunk outputs plus trailer == single-shot message
//! 3. **Tamper detection**: any flipped byte is rejected without commit
//! 4. **Block ciphers**: a 16-byte block cipher pads and enforces alignment

use proptest::prelude::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tokenveil_core::{
    ChannelConfig, DecoderOptions, MkeConfig, MkeDecoder, MkeEncoder, SequenceWindow, Status,
    TimestampPolicy, TokenError, Verifiers,
};
use tokenveil_crypto::{
    BuiltinDrbg, BuiltinMac, Cipher, CipherError, CipherKind, CipherStream, DrbgKind, MacKind,
    cipher::{check_aligned, check_lengths},
};

const ENTROPY: [u8; 32] = [0x9E; 32];

fn mke_pair(mke: MkeConfig, options: DecoderOptions) -> (MkeEncoder, MkeDecoder) {
    mke_pair_on(&ChannelConfig::default(), mke, options)
}

fn mke_pair_on(
    config: &ChannelConfig,
    mke: MkeConfig,
    options: DecoderOptions,
) -> (MkeEncoder, MkeDecoder) {
    let mut encoder = MkeEncoder::new(config, mke).unwrap();
    let mut decoder = MkeDecoder::new(config, options, mke).unwrap();
    encoder.instantiate(&mut &ENTROPY[..], &mut 77u64, b"mke-props").unwrap();
    decoder.instantiate(&mut &ENTROPY[..], &mut 77u64, b"mke-props").unwrap();
    (encoder, decoder)
}

fn encode(encoder: &mut MkeEncoder, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; encoder.encode_buffer_bytes(payload.len())];
    let encoded = encoder.encode(&|| 500u64, payload, &mut out).unwrap();
    out.truncate(encoded.len);
    out
}

fn decode(decoder: &mut MkeDecoder, message: &[u8]) -> Result<Vec<u8>, TokenError> {
    let mut out = vec![0u8; decoder.decode_buffer_bytes(message.len())];
    let decoded = decoder.decode(&|| 500u64, message, &mut out)?;
    Ok(decoded.slice(&out).to_vec())
}

fn arbitrary_mke() -> impl Strategy<Value = MkeConfig> {
    (
        prop_oneof![Just(CipherKind::ChaCha20), Just(CipherKind::Aes256Ctr)],
        prop_oneof![Just(MacKind::HmacSha256), Just(MacKind::HmacSha512)],
    )
        .prop_map(|(cipher, mac)| MkeConfig { cipher, mac })
}

/// Split `len` into consecutive ranges at the given cut points
fn pieces(len: usize, cuts: &[prop::sample::Index]) -> Vec<(usize, usize)> {
    let mut points: Vec<usize> = cuts.iter().map(|cut| cut.index(len + 1)).collect();
    points.push(0);
    points.push(len);
    points.sort_unstable();
    points.windows(2).map(|pair| (pair[0], pair[1])).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_roundtrip(
        mke in arbitrary_mke(),
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..2000), 1..4),
    ) {
        let (mut encoder, mut decoder) = mke_pair(mke, DecoderOptions::default());
        for payload in &payloads {
            let message = encode(&mut encoder, payload);
            prop_assert_eq!(&decode(&mut decoder, &message).unwrap(), payload);
        }
    }

    #[test]
    fn prop_chunked_encrypt_equals_single_shot(
        mke in arbitrary_mke(),
        payload in prop::collection::vec(any::<u8>(), 0..3000),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let (mut single, _) = mke_pair(mke, DecoderOptions::default());
        let (mut chunked, _) = mke_pair(mke, DecoderOptions::default());
        let expected = encode(&mut single, &payload);

        let mut message = vec![0u8; payload.len()];
        let mut session = chunked.encrypt_start().unwrap();
        for (start, end) in pieces(payload.len(), &cuts) {
            let written = session.chunk(&payload[start..end], &mut message[start..end]).unwrap();
            prop_assert_eq!(written, end - start);
        }
        message.extend_from_slice(session.finish(&|| 500u64).unwrap());

        prop_assert_eq!(message, expected);
    }

    #[test]
    fn prop_chunked_decrypt_equals_payload(
        payload in prop::collection::vec(any::<u8>(), 0..3000),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let (mut encoder, mut decoder) = mke_pair(MkeConfig::default(), DecoderOptions::default());
        let message = encode(&mut encoder, &payload);

        let mut plain = Vec::new();
        let mut session = decoder.decrypt_start().unwrap();
        for (start, end) in pieces(message.len(), &cuts) {
            let mut out = vec![0u8; session.chunk_buffer_bytes(end - start)];
            let written = session.chunk(&message[start..end], &mut out).unwrap();
            plain.extend_from_slice(&out[..written]);
        }
        let finished = session.finish(&|| 500u64).unwrap();

        prop_assert_eq!(finished.data_len, payload.len());
        prop_assert_eq!(plain, payload);
        prop_assert_eq!(decoder.base_sequence(), 1);
    }

    #[test]
    fn prop_any_flipped_byte_is_rejected(
        payload in prop::collection::vec(any::<u8>(), 1..500),
        position in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        // The timestamp is only checked against a window, so leave it out
        let config = ChannelConfig { verifiers: Verifiers::Crc32Seq, ..Default::default() };
        let (mut encoder, mut decoder) =
            mke_pair_on(&config, MkeConfig::default(), DecoderOptions::default());
        let mut message = encode(&mut encoder, &payload);
        let at = position.index(message.len());
        message[at] ^= flip;

        let err = decode(&mut decoder, &message).unwrap_err();
        prop_assert!(err.is_rejection(), "unexpected error {err:?}");
        prop_assert_eq!(decoder.base_sequence(), 0);
    }
}

#[test]
fn decrypt_output_lags_by_trailer() {
    let (mut encoder, mut decoder) = mke_pair(MkeConfig::default(), DecoderOptions::default());
    let payload = [0x42u8; 64];
    let message = encode(&mut encoder, &payload);
    let trailer_len = encoder.encrypt_finish_bytes();

    let mut session = decoder.decrypt_start().unwrap();
    let mut released = 0;
    let mut out = [0u8; 1];
    for (i, byte) in message.iter().enumerate() {
        released += session.chunk(std::slice::from_ref(byte), &mut out).unwrap();
        assert_eq!(released, (i + 1).saturating_sub(trailer_len));
    }
    assert_eq!(released, payload.len());
    session.finish(&|| 500u64).unwrap();
}

#[test]
fn decrypt_session_rejects_unexpected_sequence() {
    let (mut encoder, mut decoder) = mke_pair(MkeConfig::default(), DecoderOptions::default());
    let _lost = encode(&mut encoder, b"lost in transit");
    let second = encode(&mut encoder, b"arrives");

    let mut session = decoder.decrypt_start().unwrap();
    let mut out = vec![0u8; second.len()];
    session.chunk(&second, &mut out).unwrap();
    assert_eq!(
        session.finish(&|| 500u64),
        Err(TokenError::SequenceOutOfWindow { sequence: 1, base: 0 })
    );
    assert_eq!(decoder.base_sequence(), 0);
}

#[test]
fn single_shot_catch_up_after_loss() {
    let options = DecoderOptions { sequence_window: SequenceWindow::CatchUp(3), ..Default::default() };
    let (mut encoder, mut decoder) = mke_pair(MkeConfig::default(), options);
    let _lost = encode(&mut encoder, &[0u8; 300]);
    let second = encode(&mut encoder, b"after the gap");

    assert_eq!(decode(&mut decoder, &second).unwrap(), b"after the gap");
    assert_eq!(decoder.inner().msg_skipped(), 1);
    assert_eq!(decoder.base_sequence(), 2);
}

#[test]
fn abandoned_encrypt_session_is_skippable() {
    let options = DecoderOptions { sequence_window: SequenceWindow::CatchUp(3), ..Default::default() };
    let (mut encoder, mut decoder) = mke_pair(MkeConfig::default(), options);

    let mut session = encoder.encrypt_start().unwrap();
    let mut sink = [0u8; 16];
    session.chunk(&[1u8; 16], &mut sink).unwrap();
    drop(session);

    let message = encode(&mut encoder, b"next");
    assert_eq!(decode(&mut decoder, &message).unwrap(), b"next");
}

#[test]
fn mandatory_timestamp_still_commits() {
    let options = DecoderOptions {
        timestamp_window: 10,
        timestamp_policy: TimestampPolicy::Mandatory,
        ..Default::default()
    };
    let (mut encoder, mut decoder) = mke_pair(MkeConfig::default(), options);
    let message = encode(&mut encoder, b"old news");

    let mut out = vec![0u8; decoder.decode_buffer_bytes(message.len())];
    let err = decoder.decode(&|| 1_000u64, &message, &mut out).unwrap_err();
    assert!(matches!(err, TokenError::TimestampOutOfWindow { .. }));
    assert!(out.iter().all(|&b| b == 0));
    assert_eq!(decoder.base_sequence(), 1);
}

#[test]
fn b64_roundtrip() {
    let (mut encoder, mut decoder) = mke_pair(MkeConfig::default(), DecoderOptions::default());
    let mut text = vec![0u8; encoder.encode_buffer_bytes_b64(11)];
    let encoded = encoder.encode_b64(&|| 500u64, b"hello, mke!", &mut text).unwrap();

    let mut out = vec![0u8; decoder.decode_buffer_bytes_b64(encoded.len)];
    let decoded = decoder.decode_b64(&|| 500u64, &text, &mut out).unwrap();
    assert_eq!(decoded.slice(&out), b"hello, mke!");
    assert_eq!(decoded.status, Status::Success);
}

#[test]
fn save_restore_mke_channel() {
    let (mut encoder, mut decoder) = mke_pair(MkeConfig::default(), DecoderOptions::default());
    let first = encode(&mut encoder, b"before save");
    decode(&mut decoder, &first).unwrap();

    let mut saved = vec![0u8; decoder.save_bytes_b64().unwrap()];
    let len = decoder.save_state_b64(&mut saved).unwrap();
    let mut restored =
        MkeDecoder::new(&ChannelConfig::default(), DecoderOptions::default(), MkeConfig::default())
            .unwrap();
    restored.restore_state_b64(&saved[..len]).unwrap();

    let second = encode(&mut encoder, b"after save");
    assert_eq!(decode(&mut restored, &second).unwrap(), b"after save");
}

/// Test cipher with a 16-byte block: XORs a ChaCha20Rng keystream and
/// refuses unaligned input.
#[derive(Debug, Clone, Copy)]
struct Block16;

struct Block16Stream(ChaCha20Rng);

impl Cipher for Block16 {
    type Stream = Block16Stream;

    fn block_bytes(&self) -> usize {
        16
    }

    fn key_bytes(&self) -> usize {
        32
    }

    fn iv_bytes(&self) -> usize {
        16
    }

    fn start(&self, key: &[u8], iv: &[u8]) -> Result<Block16Stream, CipherError> {
        check_lengths(self, key, iv)?;
        let mut seed = [0u8; 32];
        seed.copy_from_slice(key);
        for (s, v) in seed.iter_mut().zip(iv) {
            *s ^= v;
        }
        Ok(Block16Stream(ChaCha20Rng::from_seed(seed)))
    }
}

impl CipherStream for Block16Stream {
    fn encrypt(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        check_aligned(data.len(), 16)?;
        for block in data.chunks_exact_mut(16) {
            let mut keystream = [0u8; 16];
            self.0.fill_bytes(&mut keystream);
            for (d, k) in block.iter_mut().zip(keystream) {
                *d ^= k;
            }
        }
        Ok(())
    }

    fn decrypt(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        self.encrypt(data)
    }
}

type Block16Encoder = MkeEncoder<BuiltinDrbg, Block16, BuiltinMac>;
type Block16Decoder = MkeDecoder<BuiltinDrbg, Block16, BuiltinMac>;

fn block16_pair() -> (Block16Encoder, Block16Decoder) {
    let config = ChannelConfig::default();
    let drbg = || BuiltinDrbg::new(DrbgKind::HashSha256);
    let mut encoder =
        MkeEncoder::with_primitives(drbg(), Block16, BuiltinMac::default(), &config).unwrap();
    let mut decoder = MkeDecoder::with_primitives(
        drbg(),
        Block16,
        BuiltinMac::default(),
        &config,
        DecoderOptions::default(),
    )
    .unwrap();
    encoder.instantiate(&mut &ENTROPY[..], &mut 1u64, b"block16").unwrap();
    decoder.instantiate(&mut &ENTROPY[..], &mut 1u64, b"block16").unwrap();
    (encoder, decoder)
}

#[test]
fn block_cipher_pads_single_shot() {
    let (mut encoder, mut decoder) = block16_pair();
    let payload = b"twenty-one bytes long";
    let mut message = vec![0u8; encoder.encode_buffer_bytes(payload.len())];
    let encoded = encoder.encode(&|| 0u64, payload, &mut message).unwrap();
    assert_eq!(encoded.len, 32 + encoder.encrypt_finish_bytes());

    let mut out = vec![0u8; decoder.decode_buffer_bytes(encoded.len)];
    let decoded = decoder.decode(&|| 0u64, &message, &mut out).unwrap();
    assert_eq!(decoded.slice(&out), payload);
    assert_eq!(out[payload.len()], 0);
}

#[test]
fn block_cipher_requires_aligned_chunks() {
    let (mut encoder, _) = block16_pair();
    let mut session = encoder.encrypt_start().unwrap();
    let mut out = [0u8; 32];
    assert_eq!(
        session.chunk(&[0u8; 10], &mut out),
        Err(TokenError::Misaligned { len: 10, block: 16 })
    );
    assert_eq!(session.chunk(&[0u8; 32], &mut out), Ok(32));
}

#[test]
fn block_cipher_chunked_decrypt() {
    let (mut encoder, mut decoder) = block16_pair();
    let payload = [0x5Au8; 64];
    let mut message = vec![0u8; encoder.encode_buffer_bytes(payload.len())];
    encoder.encode(&|| 0u64, &payload, &mut message).unwrap();

    let mut plain = Vec::new();
    let mut session = decoder.decrypt_start().unwrap();
    for piece in message.chunks(37) {
        let mut out = vec![0u8; session.chunk_buffer_bytes(piece.len())];
        let written = session.chunk(piece, &mut out).unwrap();
        assert_eq!(written % 16, 0);
        plain.extend_from_slice(&out[..written]);
    }
    assert_eq!(session.finish(&|| 0u64).unwrap().data_len, 64);
    assert_eq!(plain, payload);
}
