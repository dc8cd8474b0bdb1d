//! Fuzz target for the decoders
//!
//! Feeds arbitrary bytes to a freshly instantiated decoder (plain or MKE,
//! raw or Base64) under an arbitrary layout and sequence window.
//!
//! # Invariants
//!
//! - Decoding never panics; every bad input returns an error
//! - A failed decode leaves the base sequence unchanged
//! - An accepted payload fits the output buffer and is NUL-terminated

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tokenveil_core::{
    ChannelConfig, Decoder, DecoderOptions, MkeConfig, MkeDecoder, SequenceWindow, Verifiers,
};
use tokenveil_crypto::{CipherKind, MacKind};

#[derive(Debug, Arbitrary)]
struct Input {
    token_bytes: u8,
    verifiers: u8,
    window: i8,
    mke: bool,
    b64: bool,
    data: Vec<u8>,
}

const ENTROPY: [u8; 48] = [0x42; 48];
const NONCE: [u8; 16] = [0x24; 16];

fn verifiers(choice: u8) -> Verifiers {
    match choice % 8 {
        0 => Verifiers::None,
        1 => Verifiers::T64,
        2 => Verifiers::Crc32,
        3 => Verifiers::Seq,
        4 => Verifiers::T64Crc32,
        5 => Verifiers::T64Seq,
        6 => Verifiers::Crc32Seq,
        _ => Verifiers::T64Crc32Seq,
    }
}

fuzz_target!(|input: Input| {
    let config = ChannelConfig {
        token_bytes: usize::from(input.token_bytes % 32) + 1,
        verifiers: verifiers(input.verifiers),
        ..Default::default()
    };
    let Ok(sequence_window) = SequenceWindow::from_signed(i32::from(input.window)) else {
        return;
    };
    let options = DecoderOptions { timestamp_window: 1_000, sequence_window, ..Default::default() };
    let clock = || 5_000u64;

    if input.mke {
        let mke = MkeConfig { cipher: CipherKind::ChaCha20, mac: MacKind::HmacSha256 };
        let mut decoder = MkeDecoder::new(&config, options, mke).unwrap();
        decoder.instantiate(&mut &ENTROPY[..], &mut &NONCE[..], b"fuzz").unwrap();

        let result = if input.b64 {
            let mut out = vec![0u8; decoder.decode_buffer_bytes_b64(input.data.len())];
            decoder.decode_b64(&clock, &input.data, &mut out).map(|d| out[d.offset + d.len])
        } else {
            let mut out = vec![0u8; decoder.decode_buffer_bytes(input.data.len())];
            decoder.decode(&clock, &input.data, &mut out).map(|d| out[d.offset + d.len])
        };
        match result {
            Ok(terminator) => assert_eq!(terminator, 0),
            Err(_) => assert_eq!(decoder.base_sequence(), 0),
        }
    } else {
        let mut decoder = Decoder::new(&config, options).unwrap();
        decoder.instantiate(&mut &ENTROPY[..], &mut &NONCE[..], b"fuzz").unwrap();

        let result = if input.b64 {
            let mut out = vec![0u8; decoder.decode_buffer_bytes_b64(input.data.len())];
            decoder.decode_b64(&clock, &input.data, &mut out).map(|d| out[d.offset + d.len])
        } else {
            let mut out = vec![0u8; decoder.decode_buffer_bytes(input.data.len())];
            decoder.decode(&clock, &input.data, &mut out).map(|d| out[d.offset + d.len])
        };
        match result {
            Ok(terminator) => assert_eq!(terminator, 0),
            Err(_) => assert_eq!(decoder.base_sequence(), 0),
        }
    }
});
