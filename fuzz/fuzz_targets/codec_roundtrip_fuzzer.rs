//! Fuzz target for fixed-length encode/decode round-trips
//!
//! Pairs a fixed-length encoder with a catch-up decoder from the same seed
//! and pushes arbitrary payloads through them, dropping some on the way.
//! Fixed-length messages all consume the same stream segment, so the decoder
//! can skip over any dropped run inside its window.
//!
//! # Invariants
//!
//! - Every delivered message decodes to its payload padded or truncated
//! - A gap is reported as `SequenceSkipped` and resynchronizes the channel

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tokenveil_core::{
    ChannelConfig, Decoder, DecoderOptions, FlenConfig, FlenEncoder, SequenceWindow, Status,
    Verifiers,
};

#[derive(Debug, Arbitrary)]
struct Message {
    payload: Vec<u8>,
    delivered: bool,
}

#[derive(Debug, Arbitrary)]
struct Input {
    seed: [u8; 32],
    token_bytes: u8,
    fixed_bytes: u8,
    fill: u8,
    messages: Vec<Message>,
}

/// Gap tolerated between delivered messages.
const CATCH_UP: u32 = 16;

fuzz_target!(|input: Input| {
    let config = ChannelConfig {
        token_bytes: usize::from(input.token_bytes % 32) + 1,
        verifiers: Verifiers::Crc32Seq,
        ..Default::default()
    };
    let flen = FlenConfig { fixed_bytes: usize::from(input.fixed_bytes) + 1, fill: input.fill };
    let options = DecoderOptions {
        sequence_window: SequenceWindow::CatchUp(CATCH_UP),
        ..Default::default()
    };
    let mut encoder = FlenEncoder::new(&config, flen).unwrap();
    let mut decoder = Decoder::new(&config, options).unwrap();
    encoder.instantiate(&mut &input.seed[..], &mut 7u64, b"roundtrip").unwrap();
    decoder.instantiate(&mut &input.seed[..], &mut 7u64, b"roundtrip").unwrap();

    let clock = || 0u64;
    let mut gap = 0u64;
    for message in input.messages.iter().take(64) {
        let mut token = vec![0u8; encoder.encode_buffer_bytes()];
        let encoded = encoder.encode(&clock, &message.payload, &mut token).unwrap();
        assert_eq!(encoded.len, token.len());

        if !message.delivered && gap < u64::from(CATCH_UP) {
            gap += 1;
            continue;
        }

        let mut out = vec![0u8; decoder.decode_buffer_bytes(token.len())];
        let decoded = decoder.decode(&clock, &token, &mut out).unwrap();

        let mut expected = message.payload.clone();
        expected.resize(flen.fixed_bytes, flen.fill);
        assert_eq!(decoded.slice(&out), &expected[..]);
        let status = if gap > 0 { Status::SequenceSkipped } else { Status::Success };
        assert_eq!(decoded.status, status);
        assert_eq!(decoder.base_sequence(), encoder.inner().sequence());
        gap = 0;
    }
});
