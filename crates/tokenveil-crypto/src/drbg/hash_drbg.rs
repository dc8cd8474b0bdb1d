//! Hash_DRBG with SHA-256 (NIST SP 800-90A, section 10.1.1).

use sha2::{Digest, Sha256};

use super::{Drbg, DrbgLimits};
use crate::{error::DrbgError, wipe};

/// seedlen for SHA-256 (440 bits).
const SEED_LEN: usize = 55;

const OUT_LEN: usize = 32;

/// Saved state: V ‖ C ‖ reseed counter (u64 BE).
const STATE_BYTES: usize = SEED_LEN * 2 + 8;

const LIMITS: DrbgLimits = DrbgLimits {
    security_strength: 32,
    min_entropy: 32,
    max_entropy: super::MAX_ENTROPY_BYTES,
    min_nonce: 16,
    max_nonce: super::MAX_NONCE_BYTES,
    max_personalization: 256,
    max_request: 1 << 16,
    reseed_interval: 1 << 48,
};

/// Hash_DRBG-SHA256 state.
#[derive(Clone)]
pub struct HashDrbg {
    value: [u8; SEED_LEN],
    constant: [u8; SEED_LEN],
    reseed_counter: u64,
    reseed_interval: u64,
    instantiated: bool,
}

impl HashDrbg {
    /// Create an uninstantiated generator.
    pub fn new() -> Self {
        Self {
            value: [0u8; SEED_LEN],
            constant: [0u8; SEED_LEN],
            reseed_counter: 0,
            reseed_interval: LIMITS.reseed_interval,
            instantiated: false,
        }
    }

    /// Override the reseed interval. Must match on both ends of a channel.
    #[must_use]
    pub fn with_reseed_interval(mut self, interval: u64) -> Self {
        self.reseed_interval = interval.max(1);
        self
    }

    /// Derive V from `parts` and C from V.
    fn seed_from(&mut self, parts: &[&[u8]]) {
        let mut seed = [0u8; SEED_LEN];
        hash_df(parts, &mut seed);
        self.value = seed;
        wipe::wipe(&mut seed);
        hash_df(&[&[0x00], &self.value], &mut self.constant);
    }
}

impl Default for HashDrbg {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash_df: derive `out.len()` bytes from the concatenation of `parts`.
fn hash_df(parts: &[&[u8]], out: &mut [u8]) {
    #[allow(clippy::cast_possible_truncation)]
    let bits = (out.len() * 8) as u32;
    let mut counter = 1u8;

    for chunk in out.chunks_mut(OUT_LEN) {
        let mut hasher = Sha256::new();
        hasher.update([counter]);
        hasher.update(bits.to_be_bytes());
        for part in parts {
            hasher.update(part);
        }
        let digest = hasher.finalize();
        chunk.copy_from_slice(&digest[..chunk.len()]);
        counter = counter.wrapping_add(1);
    }
}

/// `acc = (acc + addend) mod 2^440`, both big-endian.
fn add_be(acc: &mut [u8; SEED_LEN], addend: &[u8]) {
    let mut carry = 0u16;
    let mut remaining = addend.len();

    for i in (0..SEED_LEN).rev() {
        let a = if remaining > 0 {
            remaining -= 1;
            u16::from(addend[remaining])
        } else {
            0
        };
        let sum = u16::from(acc[i]) + a + carry;
        acc[i] = sum.to_be_bytes()[1];
        carry = sum >> 8;
    }
}

impl Drbg for HashDrbg {
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

        self.seed_from(&[entropy, nonce, personalization]);
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

        let mut previous = self.value;
        self.seed_from(&[&[0x01], &previous, entropy, additional]);
        wipe::wipe(&mut previous);
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

        // Hashgen
        let mut data = self.value;
        for chunk in out.chunks_mut(OUT_LEN) {
            let digest = Sha256::digest(data);
            chunk.copy_from_slice(&digest[..chunk.len()]);
            add_be(&mut data, &[0x01]);
        }
        wipe::wipe(&mut data);

        let h = Sha256::new().chain_update([0x03]).chain_update(self.value).finalize();
        add_be(&mut self.value, &h);
        add_be(&mut self.value, &self.constant);
        add_be(&mut self.value, &self.reseed_counter.to_be_bytes());
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
        out[..SEED_LEN].copy_from_slice(&self.value);
        out[SEED_LEN..SEED_LEN * 2].copy_from_slice(&self.constant);
        out[SEED_LEN * 2..].copy_from_slice(&self.reseed_counter.to_be_bytes());
        Ok(())
    }

    fn restore_state(&mut self, saved: &[u8]) -> Result<(), DrbgError> {
        if saved.len() != STATE_BYTES {
            return Err(DrbgError::InvalidStateLength { expected: STATE_BYTES, actual: saved.len() });
        }
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&saved[SEED_LEN * 2..]);

        self.value.copy_from_slice(&saved[..SEED_LEN]);
        self.constant.copy_from_slice(&saved[SEED_LEN..SEED_LEN * 2]);
        self.reseed_counter = u64::from_be_bytes(counter);
        self.instantiated = true;
        Ok(())
    }

    fn uninstantiate(&mut self) {
        wipe::wipe(&mut self.value);
        wipe::wipe(&mut self.constant);
        wipe::wipe_u64(&mut self.reseed_counter);
        self.instantiated = false;
    }
}

impl Drop for HashDrbg {
    fn drop(&mut self) {
        self.uninstantiate();
    }
}
