//! Tokenveil Cryptographic Primitives
//!
//! Pluggable building blocks for the Tokenveil token engine. Every primitive
//! sits behind a trait so callers can bring their own implementation; the
//! built-in families are enums selected at runtime from configuration.
//!
//! # Key Lifecycle
//!
//! Both ends of a channel instantiate a DRBG with the same entropy, nonce and
//! personalization string. The DRBG output is the token stream: the encoder
//! consumes it to produce tokens and the decoder consumes the identical
//! stream to reverse them. Managed-Key Encryption additionally takes a seed
//! from the stream for every message and expands it into one-time cipher and
//! MAC keys.
//!
//! ```text
//! entropy ‖ nonce ‖ personalization
//!        │
//!        ▼
//! DRBG (HMAC_DRBG / Hash_DRBG / custom)
//!        │
//!        ├──▶ token stream (tokenize / detokenize)
//!        │
//!        ▼
//! 32-byte seed → HKDF → cipher key, IV, MAC key (per message)
//! ```
//!
//! # Security
//!
//! - Generators refuse to run on less than their minimum entropy.
//! - Generators stop at their reseed interval instead of reseeding silently.
//! - Secret state is wiped with volatile writes on teardown and drop.
//! - Tags and check bytes are compared in constant time.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod derive;
pub mod drbg;
pub mod error;
pub mod mac;
pub mod wipe;

pub use cipher::{BuiltinCipher, BuiltinStream, Cipher, CipherKind, CipherStream};
pub use derive::{MESSAGE_SEED_BYTES, expand_message_keys};
pub use drbg::{
    BuiltinDrbg, Drbg, DrbgKind, DrbgLimits, EntropyFn, EntropyRequest, EntropySource, HashDrbg,
    HmacDrbg, IncrDrbg, NonceFn, NonceSource, OsEntropy,
};
pub use error::{CipherError, DrbgError, EntropyError, MacError};
pub use mac::{BuiltinMac, BuiltinMacState, Mac, MacKind, MacState, tags_equal};
