//! Status taxonomy for Tokenveil operations.
//!
//! Every outcome falls into one of four tiers. Success and warnings come back
//! in `Ok` as a [`Status`]; errors and catastrophic failures come back in
//! `Err` as a [`TokenError`].

use thiserror::Error;
use tokenveil_crypto::{CipherError, DrbgError, MacError};

/// Outcome tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Operation completed normally
    Success,
    /// Operation completed; something about the message is worth reporting
    Warning,
    /// Operation failed; the channel is unaffected
    Error,
    /// Operation failed; the channel is unusable until reinstantiated or
    /// restored
    Catastrophic,
}

/// Non-error outcome of a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Message decoded in order and on time
    #[default]
    Success,
    /// Messages between the expected sequence number and this one were
    /// skipped over
    SequenceSkipped,
    /// Message is ahead of the expected sequence number; the base did not move
    SequenceAhead,
    /// Message is behind the expected sequence number but inside the window
    SequenceLate,
    /// Decode timestamp is further after the encode timestamp than the window
    /// allows
    TimestampStale,
    /// Encode timestamp is further after the decode timestamp than the window
    /// allows
    TimestampFuture,
}

impl Status {
    /// Tier of this outcome.
    pub fn severity(self) -> Severity {
        match self {
            Self::Success => Severity::Success,
            Self::SequenceSkipped
            | Self::SequenceAhead
            | Self::SequenceLate
            | Self::TimestampStale
            | Self::TimestampFuture => Severity::Warning,
        }
    }

    /// Returns true for any warning.
    pub fn is_warning(self) -> bool {
        self.severity() == Severity::Warning
    }
}

/// Errors from encoder and decoder operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Configuration rejected at construction
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with it
        reason: &'static str,
    },

    /// Caller buffer is too small; query the matching size first
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes required
        needed: usize,
        /// Bytes supplied
        available: usize,
    },

    /// Input cannot be a message for this channel configuration
    #[error("malformed input: {reason}")]
    MalformedInput {
        /// What is wrong with it
        reason: &'static str,
    },

    /// Sequence number outside the accepted window. Rejected before any
    /// stream material is consumed.
    #[error("sequence {sequence} outside window (base {base})")]
    SequenceOutOfWindow {
        /// Sequence number carried by the message
        sequence: u64,
        /// Next expected sequence number
        base: u64,
    },

    /// Token check bytes did not match the stream
    #[error("invalid token")]
    InvalidToken,

    /// Payload checksum did not match
    #[error("payload checksum mismatch")]
    CrcMismatch,

    /// Authentication tag did not match
    #[error("authentication tag mismatch")]
    TagMismatch,

    /// Timestamp outside the window under the mandatory policy
    #[error("timestamp out of window: encoded {encoded}, decoded {decoded}, window {window}")]
    TimestampOutOfWindow {
        /// Timestamp recorded by the encoder
        encoded: u64,
        /// Timestamp read by the decoder
        decoded: u64,
        /// Configured window
        window: u64,
    },

    /// Chunk data is not a multiple of the cipher block size
    #[error("chunk of {len} bytes is not a multiple of block size {block}")]
    Misaligned {
        /// Chunk length
        len: usize,
        /// Cipher block size
        block: usize,
    },

    /// Saved state has the wrong length for this configuration
    #[error("invalid saved state: expected {expected} bytes, got {actual}")]
    InvalidState {
        /// Length this configuration saves
        expected: usize,
        /// Length supplied
        actual: usize,
    },

    /// Base64 text could not be decoded
    #[error("invalid base64 input")]
    InvalidBase64,

    /// Operation is not supported by the configured primitives
    #[error("operation not supported by the configured primitives")]
    Unsupported,

    /// Engine has not been instantiated
    #[error("engine is not instantiated")]
    NotInstantiated,

    /// An earlier catastrophic failure left the channel unusable
    #[error("channel failed; reinstantiate or restore state")]
    ChannelFailed,

    /// Random source failure
    #[error("random source: {0}")]
    Drbg(#[from] DrbgError),

    /// Cipher failure
    #[error("cipher: {0}")]
    Cipher(#[from] CipherError),

    /// MAC failure
    #[error("mac: {0}")]
    Mac(#[from] MacError),
}

impl TokenError {
    /// Tier of this error: `Error` or `Catastrophic`.
    pub fn severity(&self) -> Severity {
        if self.is_catastrophic() { Severity::Catastrophic } else { Severity::Error }
    }

    /// Returns true if the channel can no longer be used.
    pub fn is_catastrophic(&self) -> bool {
        match self {
            Self::ChannelFailed => true,
            Self::Drbg(err) => err.is_catastrophic(),

            Self::InvalidConfig { .. }
            | Self::BufferTooSmall { .. }
            | Self::MalformedInput { .. }
            | Self::SequenceOutOfWindow { .. }
            | Self::InvalidToken
            | Self::CrcMismatch
            | Self::TagMismatch
            | Self::TimestampOutOfWindow { .. }
            | Self::Misaligned { .. }
            | Self::InvalidState { .. }
            | Self::InvalidBase64
            | Self::Unsupported
            | Self::NotInstantiated
            | Self::Cipher(_)
            | Self::Mac(_) => false,
        }
    }

    /// Returns true if the message was rejected on verification grounds
    /// (ordering, token, checksum, tag or timestamp).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::SequenceOutOfWindow { .. }
                | Self::InvalidToken
                | Self::CrcMismatch
                | Self::TagMismatch
                | Self::TimestampOutOfWindow { .. }
        )
    }
}

/// Check a caller buffer against a required size.
pub(crate) fn need(available: usize, needed: usize) -> Result<(), TokenError> {
    if available < needed {
        return Err(TokenError::BufferTooSmall { needed, available });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Success < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Catastrophic);
    }

    #[test]
    fn warnings_classified() {
        assert_eq!(Status::Success.severity(), Severity::Success);
        assert!(Status::SequenceSkipped.is_warning());
        assert!(Status::SequenceAhead.is_warning());
        assert!(Status::SequenceLate.is_warning());
        assert!(Status::TimestampStale.is_warning());
        assert!(Status::TimestampFuture.is_warning());
    }

    #[test]
    fn seed_life_is_catastrophic() {
        let err: TokenError = DrbgError::SeedLifeReached { interval: 4 }.into();
        assert_eq!(err.severity(), Severity::Catastrophic);
        assert!(TokenError::ChannelFailed.is_catastrophic());
    }

    #[test]
    fn verification_failures_are_errors() {
        for err in [
            TokenError::SequenceOutOfWindow { sequence: 5, base: 3 },
            TokenError::InvalidToken,
            TokenError::CrcMismatch,
            TokenError::TagMismatch,
        ] {
            assert_eq!(err.severity(), Severity::Error);
            assert!(err.is_rejection());
        }
    }

    #[test]
    fn caller_errors_are_not_rejections() {
        let err = TokenError::BufferTooSmall { needed: 10, available: 2 };
        assert!(!err.is_rejection());
        assert_eq!(err.to_string(), "buffer too small: need 10 bytes, have 2");
    }

    #[test]
    fn non_catastrophic_drbg_error_is_error() {
        let err: TokenError = DrbgError::Unsupported.into();
        assert_eq!(err.severity(), Severity::Error);
    }
}
