//! Verifier chain: sequence ordering, timestamp window and the runtime state
//! a decoder reports after each message.

pub mod sequence;
pub mod timestamp;

pub use sequence::{SequenceDecision, SequenceVerifier};

/// Verification results of the most recent successful decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeReport {
    /// Timestamp the encoder embedded
    pub enc_ts: u64,
    /// Timestamp read at decode
    pub dec_ts: u64,
    /// How far ahead of the expected sequence number the message was
    pub msg_skipped: u64,
}
