//! Channel settings shared by every subcommand.
//!
//! Both ends must be run with the same settings; state files carry only the
//! generator state and sequence position.

use clap::{Args, ValueEnum};
use tokenveil_core::{
    ChannelConfig, DecoderOptions, FlenConfig, MkeConfig, SequenceWindow, TimestampPolicy,
    TokenError, Verifiers, config::DEFAULT_TOKEN_BYTES,
};
use tokenveil_crypto::{CipherKind, DrbgKind, MacKind};

/// Stream generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DrbgArg {
    /// HMAC_DRBG over SHA-256
    HmacSha256,
    /// Hash_DRBG over SHA-256
    HashSha256,
}

impl From<DrbgArg> for DrbgKind {
    fn from(arg: DrbgArg) -> Self {
        match arg {
            DrbgArg::HmacSha256 => Self::HmacSha256,
            DrbgArg::HashSha256 => Self::HashSha256,
        }
    }
}

/// Embedded verifier metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VerifiersArg {
    /// Nothing
    None,
    /// Timestamp
    T64,
    /// CRC-32
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
    T64Crc32Seq,
}

impl From<VerifiersArg> for Verifiers {
    fn from(arg: VerifiersArg) -> Self {
        match arg {
            VerifiersArg::None => Self::None,
            VerifiersArg::T64 => Self::T64,
            VerifiersArg::Crc32 => Self::Crc32,
            VerifiersArg::Seq => Self::Seq,
            VerifiersArg::T64Crc32 => Self::T64Crc32,
            VerifiersArg::T64Seq => Self::T64Seq,
            VerifiersArg::Crc32Seq => Self::Crc32Seq,
            VerifiersArg::T64Crc32Seq => Self::T64Crc32Seq,
        }
    }
}

/// MKE payload cipher
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CipherArg {
    /// ChaCha20
    Chacha20,
    /// AES-256-CTR
    Aes256Ctr,
}

impl From<CipherArg> for CipherKind {
    fn from(arg: CipherArg) -> Self {
        match arg {
            CipherArg::Chacha20 => Self::ChaCha20,
            CipherArg::Aes256Ctr => Self::Aes256Ctr,
        }
    }
}

/// MKE authentication MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MacArg {
    /// HMAC-SHA256
    HmacSha256,
    /// HMAC-SHA512
    HmacSha512,
}

impl From<MacArg> for MacKind {
    fn from(arg: MacArg) -> Self {
        match arg {
            MacArg::HmacSha256 => Self::HmacSha256,
            MacArg::HmacSha512 => Self::HmacSha512,
        }
    }
}

/// Channel settings
#[derive(Args, Debug, Clone)]
pub struct ChannelArgs {
    /// Stream generator
    #[arg(long, value_enum, default_value_t = DrbgArg::HmacSha256)]
    pub drbg: DrbgArg,

    /// Bytes per token (1-32)
    #[arg(long, default_value_t = DEFAULT_TOKEN_BYTES)]
    pub token_bytes: usize,

    /// Embedded verifier metadata
    #[arg(long, value_enum, default_value_t = VerifiersArg::T64Crc32Seq)]
    pub verifiers: VerifiersArg,

    /// Sequence window: 0 strict, -1..-63 lookback, positive catch-up
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub sequence_window: i32,

    /// Timestamp window in milliseconds (0 disables the check)
    #[arg(long, default_value_t = 0)]
    pub timestamp_window: u64,

    /// Reject messages outside the timestamp window instead of warning
    #[arg(long)]
    pub strict_timestamps: bool,

    /// Pad or truncate every payload to this many bytes
    #[arg(long, conflicts_with = "mke")]
    pub fixed_bytes: Option<usize>,

    /// Padding byte for --fixed-bytes
    #[arg(long, default_value_t = 0)]
    pub fill: u8,

    /// Encrypt payloads with Managed-Key Encryption
    #[arg(long)]
    pub mke: bool,

    /// MKE payload cipher
    #[arg(long, value_enum, default_value_t = CipherArg::Aes256Ctr)]
    pub cipher: CipherArg,

    /// MKE authentication MAC
    #[arg(long, value_enum, default_value_t = MacArg::HmacSha256)]
    pub mac: MacArg,
}

/// Which engine a channel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Plain tokenizing
    Plain,
    /// Fixed-length payloads
    Flen(FlenConfig),
    /// Managed-Key Encryption
    Mke(MkeConfig),
}

impl ChannelArgs {
    /// Settings shared by both ends.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            drbg: self.drbg.into(),
            token_bytes: self.token_bytes,
            verifiers: self.verifiers.into(),
        }
    }

    /// Decoder tolerances.
    pub fn decoder_options(&self) -> Result<DecoderOptions, TokenError> {
        Ok(DecoderOptions {
            timestamp_window: self.timestamp_window,
            sequence_window: SequenceWindow::from_signed(self.sequence_window)?,
            timestamp_policy: if self.strict_timestamps {
                TimestampPolicy::Mandatory
            } else {
                TimestampPolicy::Advisory
            },
        })
    }

    pub fn mode(&self) -> Mode {
        if self.mke {
            Mode::Mke(MkeConfig { cipher: self.cipher.into(), mac: self.mac.into() })
        } else if let Some(fixed_bytes) = self.fixed_bytes {
            Mode::Flen(FlenConfig { fixed_bytes, fill: self.fill })
        } else {
            Mode::Plain
        }
    }
}
