//! Channel configuration.
//!
//! Both ends of a channel must be built from equal [`ChannelConfig`] values.
//! Nothing in a token or a saved state identifies the configuration, so a
//! mismatch shows up only as decode failures.

use serde::{Deserialize, Serialize};
use tokenveil_crypto::{CipherKind, DrbgKind, MacKind};

use crate::error::TokenError;

/// Largest supported token size in bytes.
pub const MAX_TOKEN_BYTES: usize = 32;

/// Default token size in bytes.
pub const DEFAULT_TOKEN_BYTES: usize = 16;

/// Largest lookback window.
pub const MAX_LOOKBACK: u8 = 63;

/// Which metadata the encoder embeds and the decoder checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verifiers {
    /// No metadata
    None,
    /// 64-bit timestamp
    T64,
    /// CRC-32 of the payload
    Crc32,
    /// Sequence number
    Seq,
    /// Timestamp and CRC-32
    T64Crc32,
    /// Timestamp and sequence number
    T64Seq,
    /// CRC-32 and sequence number
    Crc32Seq,
    /// Timestamp, CRC-32 and sequence number
    #[default]
    T64Crc32Seq,
}

impl Verifiers {
    /// Embeds an encode timestamp.
    pub fn has_timestamp(self) -> bool {
        matches!(self, Self::T64 | Self::T64Crc32 | Self::T64Seq | Self::T64Crc32Seq)
    }

    /// Embeds a payload CRC-32.
    pub fn has_crc32(self) -> bool {
        matches!(self, Self::Crc32 | Self::T64Crc32 | Self::Crc32Seq | Self::T64Crc32Seq)
    }

    /// Carries a sequence number.
    pub fn has_sequence(self) -> bool {
        matches!(self, Self::Seq | Self::T64Seq | Self::Crc32Seq | Self::T64Crc32Seq)
    }
}

/// Ordering tolerance of the sequence verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "window", rename_all = "snake_case")]
pub enum SequenceWindow {
    /// Only the next expected sequence number is accepted
    #[default]
    Strict,
    /// Accept up to `w` behind and `2w` ahead of the base
    Lookback(u8),
    /// Accept up to `w` ahead of the base and re-base onto the message
    CatchUp(u32),
}

impl SequenceWindow {
    /// Build from the signed legacy encoding: `0` strict, `-63..=-1` lookback,
    /// positive catch-up.
    pub fn from_signed(window: i32) -> Result<Self, TokenError> {
        match window {
            0 => Ok(Self::Strict),
            w if w < 0 => {
                let w = w.unsigned_abs();
                if w > u32::from(MAX_LOOKBACK) {
                    return Err(TokenError::InvalidConfig { reason: "lookback window exceeds 63" });
                }
                Ok(Self::Lookback(w as u8))
            },
            w => Ok(Self::CatchUp(w.unsigned_abs())),
        }
    }

    /// Signed legacy encoding of this window.
    pub fn to_signed(self) -> i64 {
        match self {
            Self::Strict => 0,
            Self::Lookback(w) => -i64::from(w),
            Self::CatchUp(w) => i64::from(w),
        }
    }

    /// Check the window magnitude.
    pub fn validate(self) -> Result<(), TokenError> {
        match self {
            Self::Lookback(0) | Self::CatchUp(0) => {
                Err(TokenError::InvalidConfig { reason: "sequence window magnitude must be non-zero" })
            },
            Self::Lookback(w) if w > MAX_LOOKBACK => {
                Err(TokenError::InvalidConfig { reason: "lookback window exceeds 63" })
            },
            _ => Ok(()),
        }
    }
}

/// What an out-of-window timestamp means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// Report a warning and return the payload
    #[default]
    Advisory,
    /// Reject the message
    Mandatory,
}

/// Settings shared by both ends of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Random stream generator
    pub drbg: DrbgKind,
    /// Bytes per token
    pub token_bytes: usize,
    /// Metadata to embed
    pub verifiers: Verifiers,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            drbg: DrbgKind::default(),
            token_bytes: DEFAULT_TOKEN_BYTES,
            verifiers: Verifiers::default(),
        }
    }
}

impl ChannelConfig {
    /// Check ranges.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.token_bytes == 0 || self.token_bytes > MAX_TOKEN_BYTES {
            return Err(TokenError::InvalidConfig { reason: "token_bytes must be 1..=32" });
        }
        Ok(())
    }
}

/// Decoder-only tolerance settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    /// Largest tolerated encode/decode timestamp difference; 0 disables
    pub timestamp_window: u64,
    /// Ordering tolerance
    pub sequence_window: SequenceWindow,
    /// Out-of-window timestamp handling
    pub timestamp_policy: TimestampPolicy,
}

impl DecoderOptions {
    /// Check ranges.
    pub fn validate(&self) -> Result<(), TokenError> {
        self.sequence_window.validate()
    }
}

/// Primitives for Managed-Key Encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MkeConfig {
    /// Payload cipher
    pub cipher: CipherKind,
    /// Authentication MAC
    pub mac: MacKind,
}

/// Fixed-length adapter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlenConfig {
    /// Every payload is padded or truncated to this length
    pub fixed_bytes: usize,
    /// Padding byte
    pub fill: u8,
}

impl Default for FlenConfig {
    fn default() -> Self {
        Self { fixed_bytes: 256, fill: 0 }
    }
}

impl FlenConfig {
    /// Check ranges.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.fixed_bytes == 0 {
            return Err(TokenError::InvalidConfig { reason: "fixed_bytes must be non-zero" });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_flags() {
        assert!(Verifiers::T64Crc32Seq.has_timestamp());
        assert!(Verifiers::T64Crc32Seq.has_crc32());
        assert!(Verifiers::T64Crc32Seq.has_sequence());
        assert!(!Verifiers::None.has_timestamp());
        assert!(!Verifiers::Crc32.has_sequence());
        assert!(Verifiers::Crc32Seq.has_crc32());
        assert!(!Verifiers::T64Seq.has_crc32());
    }

    #[test]
    fn sequence_window_from_signed() {
        assert_eq!(SequenceWindow::from_signed(0).unwrap(), SequenceWindow::Strict);
        assert_eq!(SequenceWindow::from_signed(-5).unwrap(), SequenceWindow::Lookback(5));
        assert_eq!(SequenceWindow::from_signed(-63).unwrap(), SequenceWindow::Lookback(63));
        assert_eq!(SequenceWindow::from_signed(5).unwrap(), SequenceWindow::CatchUp(5));
        assert!(SequenceWindow::from_signed(-64).is_err());
        assert!(SequenceWindow::from_signed(i32::MIN).is_err());
    }

    #[test]
    fn sequence_window_signed_roundtrip() {
        for w in [-63, -1, 0, 1, 1000] {
            assert_eq!(SequenceWindow::from_signed(w).unwrap().to_signed(), i64::from(w));
        }
    }

    #[test]
    fn zero_magnitude_windows_rejected() {
        assert!(SequenceWindow::Lookback(0).validate().is_err());
        assert!(SequenceWindow::CatchUp(0).validate().is_err());
        assert!(SequenceWindow::Lookback(64).validate().is_err());
        assert!(SequenceWindow::Lookback(63).validate().is_ok());
    }

    #[test]
    fn token_bytes_range() {
        let mut config = ChannelConfig::default();
        assert!(config.validate().is_ok());
        config.token_bytes = 0;
        assert!(config.validate().is_err());
        config.token_bytes = MAX_TOKEN_BYTES + 1;
        assert!(config.validate().is_err());
        config.token_bytes = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.drbg, DrbgKind::HmacSha256);
        assert_eq!(config.token_bytes, 16);
        assert_eq!(config.verifiers, Verifiers::T64Crc32Seq);

        let options = DecoderOptions::default();
        assert_eq!(options.timestamp_window, 0);
        assert_eq!(options.sequence_window, SequenceWindow::Strict);
        assert_eq!(options.timestamp_policy, TimestampPolicy::Advisory);
    }
}
