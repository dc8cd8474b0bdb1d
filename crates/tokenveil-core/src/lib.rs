//! Tokenveil Core
//!
//! Paired encoder and decoder engines that turn payloads into opaque tokens
//! drawn from a shared deterministic random stream, and turn them back.
//!
//! # Architecture
//!
//! ```text
//! payload ─▶ [FlenEncoder] ─▶ Encoder ──tokens──▶ Decoder ─▶ payload
//!                               │                    │
//!                          RandomSource         RandomSource
//!                         (sequence ctr)      SequenceVerifier
//!                                              timestamp check
//! ```
//!
//! Every buffer is supplied by the caller and sized with the matching
//! `*_buffer_bytes` query first. Token and payload bytes never touch the
//! heap. A lookback decoder keeps one stream snapshot per window position,
//! and Base64 restore stages the decoded state in a wiped heap buffer.
//!
//! # Outcomes
//!
//! Operations return `Ok` with a [`Status`] (success or a warning) or `Err`
//! with a [`TokenError`]. Catastrophic errors leave the channel failed until
//! it is reinstantiated or restored.
//!
//! # Extensions
//!
//! - [`flen`]: fixed-length payloads
//! - [`mke`]: Managed-Key Encryption with chunked streaming

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod b64;
pub mod clock;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod flen;
mod history;
pub mod mke;
pub mod random;
pub mod state;
pub mod token;
pub mod verifier;

pub use clock::{NoTimestamp, SystemClock, TimestampSource};
pub use config::{
    ChannelConfig, DecoderOptions, FlenConfig, MkeConfig, SequenceWindow, TimestampPolicy,
    Verifiers,
};
pub use decoder::{Decoded, Decoder};
pub use encoder::{Encoded, Encoder};
pub use error::{Severity, Status, TokenError};
pub use flen::FlenEncoder;
pub use mke::{DecryptFinished, DecryptSession, EncryptSession, MkeDecoder, MkeEncoder};
pub use random::RandomSource;
pub use token::TokenLayout;
pub use verifier::{DecodeReport, SequenceDecision, SequenceVerifier};
