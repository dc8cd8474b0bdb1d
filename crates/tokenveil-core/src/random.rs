//! Random stream shared by the encoder and decoder engines.
//!
//! Wraps a [`Drbg`] with the channel lifecycle (uninstantiated, ready,
//! failed) and the stream framing rule: output is always requested from the
//! generator in [`STREAM_BLOCK_BYTES`] pieces, so two ends that fill or skip
//! the same segment lengths stay in lockstep no matter how they consume the
//! bytes.

use tokenveil_crypto::{
    Drbg, DrbgError, EntropyRequest, EntropySource, NonceSource,
    drbg::{MAX_ENTROPY_BYTES, MAX_NONCE_BYTES},
};
use zeroize::Zeroizing;

use crate::error::TokenError;

/// Size of every generate request, in bytes.
pub const STREAM_BLOCK_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninstantiated,
    Ready,
    Failed,
}

/// A DRBG plus lifecycle tracking.
#[derive(Clone)]
pub struct RandomSource<D> {
    drbg: D,
    lifecycle: Lifecycle,
}

impl<D: Drbg> RandomSource<D> {
    /// Wrap an uninstantiated generator.
    pub fn new(drbg: D) -> Self {
        Self { drbg, lifecycle: Lifecycle::Uninstantiated }
    }

    /// Seed from an entropy source, a nonce source and a personalization
    /// string.
    ///
    /// # Errors
    ///
    /// - `Drbg(InsufficientEntropy)` (catastrophic) if the entropy source
    ///   produced fewer bytes than the generator minimum
    /// - `Drbg(EntropyUnavailable)` (catastrophic) if the source failed
    /// - `Drbg(InvalidNonceLength)` if the nonce is out of range
    pub fn instantiate(
        &mut self,
        entropy: &mut impl EntropySource,
        nonce: &mut impl NonceSource,
        personalization: &[u8],
    ) -> Result<(), TokenError> {
        let limits = self.drbg.limits();

        let mut entropy_buf = Zeroizing::new([0u8; MAX_ENTROPY_BYTES]);
        let max_len = limits.max_entropy.min(MAX_ENTROPY_BYTES);
        let request = EntropyRequest {
            min_entropy: limits.min_entropy,
            min_len: limits.min_entropy,
            max_len,
        };
        let entropy_len = match entropy.fill_entropy(request, &mut entropy_buf[..max_len]) {
            Ok(len) => len.min(max_len),
            Err(err) => return Err(self.fail(err.into())),
        };
        if entropy_len < limits.min_entropy {
            return Err(self.fail(DrbgError::InsufficientEntropy {
                required: limits.min_entropy,
                provided: entropy_len,
            }));
        }

        let mut nonce_buf = Zeroizing::new([0u8; MAX_NONCE_BYTES]);
        let max_nonce = limits.max_nonce.min(MAX_NONCE_BYTES);
        let nonce_len =
            nonce.fill_nonce(limits.min_nonce, max_nonce, &mut nonce_buf[..max_nonce]).min(max_nonce);

        match self.drbg.instantiate(&entropy_buf[..entropy_len], &nonce_buf[..nonce_len], personalization)
        {
            Ok(()) => {
                self.lifecycle = Lifecycle::Ready;
                Ok(())
            },
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Mix fresh entropy into the generator.
    ///
    /// Both ends of a channel must reseed at the same stream position with
    /// the same entropy.
    pub fn reseed(
        &mut self,
        entropy: &mut impl EntropySource,
        additional: &[u8],
    ) -> Result<(), TokenError> {
        self.ensure_ready()?;
        let limits = self.drbg.limits();

        let mut entropy_buf = Zeroizing::new([0u8; MAX_ENTROPY_BYTES]);
        let max_len = limits.max_entropy.min(MAX_ENTROPY_BYTES);
        let request = EntropyRequest {
            min_entropy: limits.min_entropy,
            min_len: limits.min_entropy,
            max_len,
        };
        let len = match entropy.fill_entropy(request, &mut entropy_buf[..max_len]) {
            Ok(len) => len.min(max_len),
            Err(err) => return Err(self.fail(err.into())),
        };

        self.drbg.reseed(&entropy_buf[..len], additional).map_err(|err| self.fail(err))
    }

    /// Fill `out` with the next stream bytes.
    pub fn fill(&mut self, out: &mut [u8]) -> Result<(), TokenError> {
        self.ensure_ready()?;
        for chunk in out.chunks_mut(STREAM_BLOCK_BYTES) {
            self.drbg.generate(chunk).map_err(|err| self.fail(err))?;
        }
        Ok(())
    }

    /// Advance the stream by `len` bytes exactly as `fill` would.
    pub fn skip(&mut self, len: usize) -> Result<(), TokenError> {
        self.ensure_ready()?;
        let mut scratch = Zeroizing::new([0u8; STREAM_BLOCK_BYTES]);
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(STREAM_BLOCK_BYTES);
            self.drbg.generate(&mut scratch[..n]).map_err(|err| self.fail(err))?;
            remaining -= n;
        }
        Ok(())
    }

    /// Advance the stream past `count` messages made of the given segments.
    pub fn skip_messages(&mut self, count: u64, segments: &[usize]) -> Result<(), TokenError> {
        for _ in 0..count {
            for &segment in segments {
                self.skip(segment)?;
            }
        }
        Ok(())
    }

    /// Generate requests since the last (re)seed, plus one.
    pub fn reseed_counter(&self) -> u64 {
        self.drbg.reseed_counter()
    }

    /// Size of the exported generator state.
    pub fn state_bytes(&self) -> Result<usize, TokenError> {
        self.drbg.state_bytes().ok_or(TokenError::Unsupported)
    }

    /// Export the generator state.
    pub fn save(&self, out: &mut [u8]) -> Result<(), TokenError> {
        self.ensure_ready()?;
        self.drbg.save_state(out).map_err(|err| match err {
            DrbgError::Unsupported => TokenError::Unsupported,
            other => TokenError::Drbg(other),
        })
    }

    /// Replace the generator state. Clears a failed lifecycle.
    pub fn restore(&mut self, saved: &[u8]) -> Result<(), TokenError> {
        self.drbg.restore_state(saved).map_err(|err| match err {
            DrbgError::Unsupported => TokenError::Unsupported,
            DrbgError::InvalidStateLength { expected, actual } => {
                TokenError::InvalidState { expected, actual }
            },
            other => TokenError::Drbg(other),
        })?;
        self.lifecycle = Lifecycle::Ready;
        Ok(())
    }

    /// Wipe the generator.
    pub fn uninstantiate(&mut self) {
        self.drbg.uninstantiate();
        self.lifecycle = Lifecycle::Uninstantiated;
    }

    /// Ready to produce stream.
    pub fn is_ready(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    /// A catastrophic failure happened since the last instantiate/restore.
    pub fn is_failed(&self) -> bool {
        self.lifecycle == Lifecycle::Failed
    }

    /// Fail fast unless ready.
    pub fn ensure_ready(&self) -> Result<(), TokenError> {
        match self.lifecycle {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Uninstantiated => Err(TokenError::NotInstantiated),
            Lifecycle::Failed => Err(TokenError::ChannelFailed),
        }
    }

    /// Mark the channel failed after a catastrophic error seen elsewhere
    /// (e.g. on a working copy).
    pub fn poison(&mut self) {
        if self.lifecycle == Lifecycle::Ready {
            self.drbg.uninstantiate();
            self.lifecycle = Lifecycle::Failed;
        }
    }

    /// The wrapped generator.
    pub fn drbg(&self) -> &D {
        &self.drbg
    }

    fn fail(&mut self, err: DrbgError) -> TokenError {
        if err.is_catastrophic() {
            tracing::error!(error = %err, "random source failed; channel unusable");
            self.drbg.uninstantiate();
            self.lifecycle = Lifecycle::Failed;
        }
        TokenError::Drbg(err)
    }
}
