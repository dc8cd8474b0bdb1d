//! Deterministic random bit generators.
//!
//! A channel's token stream is the output of a DRBG seeded identically on both
//! ends. The generator is pluggable: [`BuiltinDrbg`] covers the NIST SP 800-90A
//! HMAC and Hash constructions plus an increment generator for tests, and any
//! type implementing [`Drbg`] can be used instead.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──instantiate──▶ ready ──generate──▶ ready ... ──(interval)──▶ seed life reached
//!                          │  ▲                                          │
//!                          │  └─────────────── reseed ◀──────────────────┘
//!                          └── uninstantiate ──▶ wiped (NotInstantiated)
//! ```
//!
//! Generators never reseed themselves. Both ends of a channel must reseed at
//! the same stream position with the same input, so that decision belongs to
//! the caller.

mod hash_drbg;
mod hmac_drbg;
mod incr;
mod source;

pub use hash_drbg::HashDrbg;
pub use hmac_drbg::HmacDrbg;
pub use incr::IncrDrbg;
use serde::{Deserialize, Serialize};
pub use source::{
    EntropyFn, EntropyRequest, EntropySource, NonceFn, NonceSource, OsEntropy,
};

use crate::error::DrbgError;

/// Largest entropy input accepted by any built-in generator, in bytes.
///
/// Entropy is gathered into a stack buffer of this size.
pub const MAX_ENTROPY_BYTES: usize = 128;

/// Largest nonce accepted by any built-in generator, in bytes.
pub const MAX_NONCE_BYTES: usize = 32;

/// Largest saved state of any built-in generator, in bytes.
pub const MAX_STATE_BYTES: usize = 128;

/// Algorithm parameters of a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrbgLimits {
    /// Security strength in bytes
    pub security_strength: usize,
    /// Minimum entropy input in bytes
    pub min_entropy: usize,
    /// Maximum entropy input in bytes
    pub max_entropy: usize,
    /// Minimum nonce length in bytes
    pub min_nonce: usize,
    /// Maximum nonce length in bytes
    pub max_nonce: usize,
    /// Maximum personalization string length in bytes
    pub max_personalization: usize,
    /// Maximum bytes per generate request
    pub max_request: usize,
    /// Generate requests allowed between (re)seeds
    pub reseed_interval: u64,
}

impl DrbgLimits {
    /// Check a nonce length against this generator's range.
    pub fn check_nonce(&self, len: usize) -> Result<(), DrbgError> {
        if len < self.min_nonce || len > self.max_nonce {
            return Err(DrbgError::InvalidNonceLength {
                min: self.min_nonce,
                max: self.max_nonce,
                actual: len,
            });
        }
        Ok(())
    }

    /// Check an entropy input length against the minimum.
    pub fn check_entropy(&self, len: usize) -> Result<(), DrbgError> {
        if len < self.min_entropy {
            return Err(DrbgError::InsufficientEntropy { required: self.min_entropy, provided: len });
        }
        Ok(())
    }

    /// Check a personalization string length.
    pub fn check_personalization(&self, len: usize) -> Result<(), DrbgError> {
        if len > self.max_personalization {
            return Err(DrbgError::PersonalizationTooLong {
                max: self.max_personalization,
                actual: len,
            });
        }
        Ok(())
    }
}

/// A deterministic random bit generator.
///
/// # Invariants
///
/// - Same instantiate inputs and same sequence of generate request sizes
///   produce the same output on every platform.
/// - A failed call leaves the state untouched, except for catastrophic errors
///   after which the caller must discard or reinstantiate the generator.
/// - `uninstantiate` wipes all secret state.
pub trait Drbg: Clone + Send {
    /// Algorithm parameters.
    fn limits(&self) -> DrbgLimits;

    /// Seed the generator. Replaces any previous state.
    ///
    /// # Errors
    ///
    /// - `InsufficientEntropy` if `entropy` is shorter than the minimum
    /// - `InvalidNonceLength` if `nonce` is outside the allowed range
    /// - `PersonalizationTooLong` if `personalization` is too long
    fn instantiate(
        &mut self,
        entropy: &[u8],
        nonce: &[u8],
        personalization: &[u8],
    ) -> Result<(), DrbgError>;

    /// Mix fresh entropy into the state and reset the reseed counter.
    ///
    /// # Errors
    ///
    /// - `NotInstantiated` before `instantiate`
    /// - `InsufficientEntropy` if `entropy` is shorter than the minimum
    fn reseed(&mut self, entropy: &[u8], additional: &[u8]) -> Result<(), DrbgError>;

    /// Fill `out` with the next output bytes. One call advances the state once.
    ///
    /// # Errors
    ///
    /// - `NotInstantiated` before `instantiate`
    /// - `RequestTooLarge` if `out` exceeds `limits().max_request`
    /// - `SeedLifeReached` once the reseed interval is exhausted
    fn generate(&mut self, out: &mut [u8]) -> Result<(), DrbgError>;

    /// Generate requests served since the last (re)seed, plus one.
    fn reseed_counter(&self) -> u64;

    /// Size of the exported state, or `None` if export is unsupported.
    fn state_bytes(&self) -> Option<usize> {
        None
    }

    /// Export the complete state into `out`, which must be exactly
    /// `state_bytes()` long.
    fn save_state(&self, _out: &mut [u8]) -> Result<(), DrbgError> {
        Err(DrbgError::Unsupported)
    }

    /// Replace the state with a previously exported one.
    fn restore_state(&mut self, _saved: &[u8]) -> Result<(), DrbgError> {
        Err(DrbgError::Unsupported)
    }

    /// Wipe all state. The generator must be instantiated again before use.
    fn uninstantiate(&mut self);
}

/// Built-in generator families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrbgKind {
    /// HMAC_DRBG with SHA-256
    #[default]
    HmacSha256,
    /// Hash_DRBG with SHA-256
    HashSha256,
    /// Counting generator for tests. Not random.
    Incr,
}

impl DrbgKind {
    /// Lowercase name used in configuration and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::HmacSha256 => "hmac_sha256",
            Self::HashSha256 => "hash_sha256",
            Self::Incr => "incr",
        }
    }
}

/// One of the built-in generators, chosen at runtime.
#[derive(Clone)]
pub enum BuiltinDrbg {
    /// HMAC_DRBG-SHA256
    HmacSha256(HmacDrbg),
    /// Hash_DRBG-SHA256
    HashSha256(HashDrbg),
    /// Increment test generator
    Incr(IncrDrbg),
}

impl BuiltinDrbg {
    /// Create an uninstantiated generator of the given kind.
    pub fn new(kind: DrbgKind) -> Self {
        match kind {
            DrbgKind::HmacSha256 => Self::HmacSha256(HmacDrbg::new()),
            DrbgKind::HashSha256 => Self::HashSha256(HashDrbg::new()),
            DrbgKind::Incr => Self::Incr(IncrDrbg::new()),
        }
    }

    /// Which family this generator belongs to.
    pub fn kind(&self) -> DrbgKind {
        match self {
            Self::HmacSha256(_) => DrbgKind::HmacSha256,
            Self::HashSha256(_) => DrbgKind::HashSha256,
            Self::Incr(_) => DrbgKind::Incr,
        }
    }
}

impl From<DrbgKind> for BuiltinDrbg {
    fn from(kind: DrbgKind) -> Self {
        Self::new(kind)
    }
}

impl std::fmt::Debug for BuiltinDrbg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinDrbg")
            .field("kind", &self.kind())
            .field("reseed_counter", &self.reseed_counter())
            .finish_non_exhaustive()
    }
}

macro_rules! dispatch {
    ($self:expr, $drbg:ident => $body:expr) => {
        match $self {
            BuiltinDrbg::HmacSha256($drbg) => $body,
            BuiltinDrbg::HashSha256($drbg) => $body,
            BuiltinDrbg::Incr($drbg) => $body,
        }
    };
}

impl Drbg for BuiltinDrbg {
    fn limits(&self) -> DrbgLimits {
        dispatch!(self, d => d.limits())
    }

    fn instantiate(
        &mut self,
        entropy: &[u8],
        nonce: &[u8],
        personalization: &[u8],
    ) -> Result<(), DrbgError> {
        dispatch!(self, d => d.instantiate(entropy, nonce, personalization))
    }

    fn reseed(&mut self, entropy: &[u8], additional: &[u8]) -> Result<(), DrbgError> {
        dispatch!(self, d => d.reseed(entropy, additional))
    }

    fn generate(&mut self, out: &mut [u8]) -> Result<(), DrbgError> {
        dispatch!(self, d => d.generate(out))
    }

    fn reseed_counter(&self) -> u64 {
        dispatch!(self, d => d.reseed_counter())
    }

    fn state_bytes(&self) -> Option<usize> {
        dispatch!(self, d => d.state_bytes())
    }

    fn save_state(&self, out: &mut [u8]) -> Result<(), DrbgError> {
        dispatch!(self, d => d.save_state(out))
    }

    fn restore_state(&mut self, saved: &[u8]) -> Result<(), DrbgError> {
        dispatch!(self, d => d.restore_state(saved))
    }

    fn uninstantiate(&mut self) {
        dispatch!(self, d => d.uninstantiate());
    }
}
