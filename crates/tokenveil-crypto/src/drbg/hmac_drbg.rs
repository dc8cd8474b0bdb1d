//! HMAC_DRBG with SHA-256 (NIST SP 800-90A, section 10.1.2).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{Drbg, DrbgLimits};
use crate::{error::DrbgError, wipe};

type HmacSha256 = Hmac<Sha256>;

const OUT_LEN: usize = 32;

/// Saved state: K ‖ V ‖ reseed counter (u64 BE).
const STATE_BYTES: usize = OUT_LEN * 2 + 8;

/// Default reseed interval (2^48 generate requests).
pub const DEFAULT_RESEED_INTERVAL: u64 = 1 << 48;

const LIMITS: DrbgLimits = DrbgLimits {
    security_strength: 32,
    min_entropy: 32,
    max_entropy: super::MAX_ENTROPY_BYTES,
    min_nonce: 16,
    max_nonce: super::MAX_NONCE_BYTES,
    max_personalization: 256,
    max_request: 1 << 16,
    reseed_interval: DEFAULT_RESEED_INTERVAL,
};

/// HMAC_DRBG-SHA256 state.
///
/// No prediction resistance and no automatic reseed. State is wiped on
/// `uninstantiate` and on drop.
#[derive(Clone)]
pub struct HmacDrbg {
    key: [u8; OUT_LEN],
    value: [u8; OUT_LEN],
    reseed_counter: u64,
    reseed_interval: u64,
    instantiated: bool,
}

impl HmacDrbg {
    /// Create an uninstantiated generator.
    pub fn new() -> Self {
        Self {
            key: [0u8; OUT_LEN],
            value: [0u8; OUT_LEN],
            reseed_counter: 0,
            reseed_interval: DEFAULT_RESEED_INTERVAL,
            instantiated: false,
        }
    }

    /// Override the reseed interval. Must match on both ends of a channel.
    #[must_use]
    pub fn with_reseed_interval(mut self, interval: u64) -> Self {
        self.reseed_interval = interval.max(1);
        self
    }

    fn keyed(&self) -> HmacSha256 {
        let Ok(mac) = HmacSha256::new_from_slice(&self.key) else {
            unreachable!("HMAC accepts any key length");
        };
        mac
    }

    /// HMAC_DRBG_Update. `provided` is the concatenation of its parts.
    fn update(&mut self, provided: &[&[u8]]) {
        let has_input = provided.iter().any(|p| !p.is_empty());

        for round in [0x00u8, 0x01] {
            if round == 0x01 && !has_input {
                break;
            }

            let mut mac = self.keyed();
            mac.update(&self.value);
            mac.update(&[round]);
            for part in provided {
                mac.update(part);
            }
            self.key.copy_from_slice(&mac.finalize().into_bytes());

            let mut mac = self.keyed();
            mac.update(&self.value);
            self.value.copy_from_slice(&mac.finalize().into_bytes());
        }
    }
}

impl Default for HmacDrbg {
    fn default() -> Self {
        Self::new()
    }
}

impl Drbg for HmacDrbg {
    fn limits(&self) -> DrbgLimits {
        DrbgLimits { reseed_interval: self.reseed_interval, ..LIMITS }
    }

    fn instantiate(
        &mut self,
        entropy: &[u8],
        nonce: &[u8],
        personalization: &[u8],
    ) -> Result<(), DrbgError> {
        let limits = self.limits();
        limits.check_entropy(entropy.len())?;
        limits.check_nonce(nonce.len())?;
        limits.check_personalization(personalization.len())?;

        self.key = [0x00; OUT_LEN];
        self.value = [0x01; OUT_LEN];
        self.update(&[entropy, nonce, personalization]);
        self.reseed_counter = 1;
        self.instantiated = true;
        Ok(())
    }

    fn reseed(&mut self, entropy: &[u8], additional: &[u8]) -> Result<(), DrbgError> {
        if !self.instantiated {
            return Err(DrbgError::NotInstantiated);
        }
        let limits = self.limits();
        limits.check_entropy(entropy.len())?;
        limits.check_personalization(additional.len())?;

        self.update(&[entropy, additional]);
        self.reseed_counter = 1;
        Ok(())
    }

    fn generate(&mut self, out: &mut [u8]) -> Result<(), DrbgError> {
        if !self.instantiated {
            return Err(DrbgError::NotInstantiated);
        }
        if out.len() > LIMITS.max_request {
            return Err(DrbgError::RequestTooLarge { max: LIMITS.max_request, requested: out.len() });
        }
        if self.reseed_counter > self.reseed_interval {
            return Err(DrbgError::SeedLifeReached { interval: self.reseed_interval });
        }

        for chunk in out.chunks_mut(OUT_LEN) {
            let mut mac = self.keyed();
            mac.update(&self.value);
            self.value.copy_from_slice(&mac.finalize().into_bytes());
            chunk.copy_from_slice(&self.value[..chunk.len()]);
        }

        self.update(&[]);
        self.reseed_counter += 1;
        Ok(())
    }

    fn reseed_counter(&self) -> u64 {
        self.reseed_counter
    }

    fn state_bytes(&self) -> Option<usize> {
        Some(STATE_BYTES)
    }

    fn save_state(&self, out: &mut [u8]) -> Result<(), DrbgError> {
        if !self.instantiated {
            return Err(DrbgError::NotInstantiated);
        }
        if out.len() != STATE_BYTES {
            return Err(DrbgError::InvalidStateLength { expected: STATE_BYTES, actual: out.len() });
        }
        out[..OUT_LEN].copy_from_slice(&self.key);
        out[OUT_LEN..OUT_LEN * 2].copy_from_slice(&self.value);
        out[OUT_LEN * 2..].copy_from_slice(&self.reseed_counter.to_be_bytes());
        Ok(())
    }

    fn restore_state(&mut self, saved: &[u8]) -> Result<(), DrbgError> {
        if saved.len() != STATE_BYTES {
            return Err(DrbgError::InvalidStateLength { expected: STATE_BYTES, actual: saved.len() });
        }
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&saved[OUT_LEN * 2..]);

        self.key.copy_from_slice(&saved[..OUT_LEN]);
        self.value.copy_from_slice(&saved[OUT_LEN..OUT_LEN * 2]);
        self.reseed_counter = u64::from_be_bytes(counter);
        self.instantiated = true;
        Ok(())
    }

    fn uninstantiate(&mut self) {
        wipe::wipe(&mut self.key);
        wipe::wipe(&mut self.value);
        wipe::wipe_u64(&mut self.reseed_counter);
        self.instantiated = false;
    }
}

impl Drop for HmacDrbg {
    fn drop(&mut self) {
        self.uninstantiate();
    }
}
