//! Error types for Tokenveil primitives

use thiserror::Error;

/// Errors from a deterministic random bit generator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrbgError {
    /// Entropy source returned less than the algorithm minimum
    #[error("insufficient entropy: need at least {required} bytes, got {provided}")]
    InsufficientEntropy {
        /// Minimum number of bytes the algorithm requires
        required: usize,
        /// Number of bytes the source actually produced
        provided: usize,
    },

    /// Entropy source failed outright
    #[error("entropy source failed: {reason}")]
    EntropyUnavailable {
        /// Reason reported by the source
        reason: String,
    },

    /// Reseed interval exhausted; the generator must be reseeded or replaced
    #[error("seed life reached after {interval} generate requests")]
    SeedLifeReached {
        /// Configured reseed interval
        interval: u64,
    },

    /// Generator has not been instantiated (or was uninstantiated)
    #[error("generator is not instantiated")]
    NotInstantiated,

    /// Nonce length outside the algorithm range
    #[error("invalid nonce length: expected {min}..={max}, got {actual}")]
    InvalidNonceLength {
        /// Minimum nonce length
        min: usize,
        /// Maximum nonce length
        max: usize,
        /// Length supplied
        actual: usize,
    },

    /// Personalization string longer than the algorithm allows
    #[error("personalization string too long: max {max}, got {actual}")]
    PersonalizationTooLong {
        /// Maximum personalization length
        max: usize,
        /// Length supplied
        actual: usize,
    },

    /// A single generate request exceeded the algorithm maximum
    #[error("generate request too large: max {max}, requested {requested}")]
    RequestTooLarge {
        /// Maximum request size in bytes
        max: usize,
        /// Requested size in bytes
        requested: usize,
    },

    /// Saved state has the wrong length for this generator
    #[error("invalid saved state length: expected {expected}, got {actual}")]
    InvalidStateLength {
        /// Length this generator saves
        expected: usize,
        /// Length supplied
        actual: usize,
    },

    /// Operation not supported by this generator (e.g. state export)
    #[error("operation not supported by this generator")]
    Unsupported,

    /// Generator reported an internal failure
    #[error("generator failure: {reason}")]
    Failure {
        /// Reason for the failure
        reason: &'static str,
    },
}

impl DrbgError {
    /// Returns true if the generator can no longer be trusted.
    ///
    /// Catastrophic errors require reinstantiation or a restore from a
    /// known-good saved state. Everything else is a caller error that leaves
    /// the generator state untouched.
    pub fn is_catastrophic(&self) -> bool {
        match self {
            Self::InsufficientEntropy { .. } => true,
            Self::EntropyUnavailable { .. } => true,
            Self::SeedLifeReached { .. } => true,
            Self::Failure { .. } => true,

            Self::NotInstantiated => false,
            Self::InvalidNonceLength { .. } => false,
            Self::PersonalizationTooLong { .. } => false,
            Self::RequestTooLarge { .. } => false,
            Self::InvalidStateLength { .. } => false,
            Self::Unsupported => false,
        }
    }
}

/// Failure reported by an entropy source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entropy unavailable: {reason}")]
pub struct EntropyError {
    /// Why the source could not produce entropy
    pub reason: String,
}

impl EntropyError {
    /// Create an entropy error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl From<EntropyError> for DrbgError {
    fn from(err: EntropyError) -> Self {
        Self::EntropyUnavailable { reason: err.reason }
    }
}

/// Errors from a symmetric cipher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Key material has the wrong length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Key length the cipher requires
        expected: usize,
        /// Length supplied
        actual: usize,
    },

    /// IV has the wrong length
    #[error("invalid iv length: expected {expected}, got {actual}")]
    InvalidIvLength {
        /// IV length the cipher requires
        expected: usize,
        /// Length supplied
        actual: usize,
    },

    /// Data is not a multiple of the cipher block size
    #[error("data length {len} is not a multiple of block size {block}")]
    Misaligned {
        /// Data length
        len: usize,
        /// Cipher block size
        block: usize,
    },

    /// The cipher cannot produce any more keystream for this key/IV
    #[error("keystream exhausted")]
    KeystreamExhausted,
}

/// Errors from a MAC primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacError {
    /// Key material has the wrong length
    #[error("invalid mac key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Key length the MAC requires
        expected: usize,
        /// Length supplied
        actual: usize,
    },

    /// Output buffer does not match the tag length
    #[error("invalid tag length: expected {expected}, got {actual}")]
    InvalidTagLength {
        /// Tag length the MAC produces
        expected: usize,
        /// Length supplied
        actual: usize,
    },
}
