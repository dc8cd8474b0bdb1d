//! Secure wiping of secret material.
//!
//! Every teardown path (uninstantiate, drop, error exits that held key
//! material) goes through [`wipe`]. The writes are volatile so the compiler
//! cannot elide them even when the buffer is dead afterwards.

use zeroize::Zeroize;

/// Overwrite `bytes` with zeros using volatile writes.
pub fn wipe(bytes: &mut [u8]) {
    bytes.zeroize();
}

/// Overwrite a counter or other integer secret.
pub fn wipe_u64(value: &mut u64) {
    value.zeroize();
}

/// Returns true if every byte is zero. Test and debug helper.
pub fn is_wiped(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}
