//! Increment generator for tests.
//!
//! Output is a running byte counter starting from a value taken from the
//! entropy input, so expected tokens can be worked out by hand. Failures can be
//! injected at instantiation or at a chosen generate request.

use super::{Drbg, DrbgLimits};
use crate::{error::DrbgError, wipe};

/// Saved state: counter ‖ reseed counter, both u64 BE.
const STATE_BYTES: usize = 16;

const LIMITS: DrbgLimits = DrbgLimits {
    security_strength: 0,
    min_entropy: 0,
    max_entropy: super::MAX_ENTROPY_BYTES,
    min_nonce: 0,
    max_nonce: super::MAX_NONCE_BYTES,
    max_personalization: 256,
    max_request: 1 << 16,
    reseed_interval: 1 << 32,
};

/// Counting generator. **Not random.** Never use it outside tests.
#[derive(Debug, Clone)]
pub struct IncrDrbg {
    counter: u64,
    reseed_counter: u64,
    reseed_interval: u64,
    instantiated: bool,
    fail_instantiate: bool,
    fail_generate_at: Option<u64>,
}

impl IncrDrbg {
    /// Create an uninstantiated generator.
    pub fn new() -> Self {
        Self {
            counter: 0,
            reseed_counter: 0,
            reseed_interval: LIMITS.reseed_interval,
            instantiated: false,
            fail_instantiate: false,
            fail_generate_at: None,
        }
    }

    /// Override the reseed interval.
    #[must_use]
    pub fn with_reseed_interval(mut self, interval: u64) -> Self {
        self.reseed_interval = interval.max(1);
        self
    }

    /// Make every instantiation fail.
    #[must_use]
    pub fn failing_instantiate(mut self) -> Self {
        self.fail_instantiate = true;
        self
    }

    /// Make the generate request with the given reseed counter fail.
    ///
    /// The first request after instantiation has counter 1.
    #[must_use]
    pub fn failing_generate_at(mut self, reseed_counter: u64) -> Self {
        self.fail_generate_at = Some(reseed_counter);
        self
    }

    fn start_value(entropy: &[u8]) -> u64 {
        let mut bytes = [0u8; 8];
        let len = entropy.len().min(8);
        bytes[..len].copy_from_slice(&entropy[..len]);
        u64::from_be_bytes(bytes)
    }
}

impl Default for IncrDrbg {
    fn default() -> Self {
        Self::new()
    }
}

impl Drbg for IncrDrbg {
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
        limits.check_nonce(nonce.len())?;
        limits.check_personalization(personalization.len())?;
        if self.fail_instantiate {
            return Err(DrbgError::Failure { reason: "injected instantiate failure" });
        }

        self.counter = Self::start_value(entropy);
        self.reseed_counter = 1;
        self.instantiated = true;
        Ok(())
    }

    fn reseed(&mut self, entropy: &[u8], _additional: &[u8]) -> Result<(), DrbgError> {
        if !self.instantiated {
            return Err(DrbgError::NotInstantiated);
        }
        self.counter = self.counter.wrapping_add(Self::start_value(entropy));
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
        if self.fail_generate_at == Some(self.reseed_counter) {
            return Err(DrbgError::Failure { reason: "injected generate failure" });
        }

        for byte in out.iter_mut() {
            *byte = self.counter.to_le_bytes()[0];
            self.counter = self.counter.wrapping_add(1);
        }
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
        out[..8].copy_from_slice(&self.counter.to_be_bytes());
        out[8..].copy_from_slice(&self.reseed_counter.to_be_bytes());
        Ok(())
    }

    fn restore_state(&mut self, saved: &[u8]) -> Result<(), DrbgError> {
        if saved.len() != STATE_BYTES {
            return Err(DrbgError::InvalidStateLength { expected: STATE_BYTES, actual: saved.len() });
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&saved[..8]);
        self.counter = u64::from_be_bytes(word);
        word.copy_from_slice(&saved[8..]);
        self.reseed_counter = u64::from_be_bytes(word);
        self.instantiated = true;
        Ok(())
    }

    fn uninstantiate(&mut self) {
        wipe::wipe_u64(&mut self.counter);
        wipe::wipe_u64(&mut self.reseed_counter);
        self.instantiated = false;
    }
}
