//! Per-message key expansion for Managed-Key Encryption using HKDF

use hkdf::Hkdf;
use sha2::Sha256;

use crate::{
    cipher::{MAX_IV_BYTES, MAX_KEY_BYTES},
    error::CipherError,
    mac::MAX_MAC_KEY_BYTES,
};

/// Bytes of stream consumed per message to seed the expansion.
pub const MESSAGE_SEED_BYTES: usize = 32;

const KEY_LABEL: &[u8] = b"tokenveilMkeKeyV1";
const IV_LABEL: &[u8] = b"tokenveilMkeIvV1";
const MAC_LABEL: &[u8] = b"tokenveilMkeMacV1";

/// Expand a message seed into cipher key, IV and MAC key.
///
/// Output lengths are taken from the slices. The sequence number is bound into
/// every output so two messages never share keys even if their seeds collide.
///
/// # Errors
///
/// Returns `InvalidKeyLength` / `InvalidIvLength` if an output is longer than
/// the supported maximum.
pub fn expand_message_keys(
    seed: &[u8; MESSAGE_SEED_BYTES],
    sequence: u64,
    key: &mut [u8],
    iv: &mut [u8],
    mac_key: &mut [u8],
) -> Result<(), CipherError> {
    if key.len() > MAX_KEY_BYTES {
        return Err(CipherError::InvalidKeyLength { expected: MAX_KEY_BYTES, actual: key.len() });
    }
    if iv.len() > MAX_IV_BYTES {
        return Err(CipherError::InvalidIvLength { expected: MAX_IV_BYTES, actual: iv.len() });
    }
    if mac_key.len() > MAX_MAC_KEY_BYTES {
        return Err(CipherError::InvalidKeyLength {
            expected: MAX_MAC_KEY_BYTES,
            actual: mac_key.len(),
        });
    }

    let hkdf = Hkdf::<Sha256>::new(None, seed);
    let sequence = sequence.to_be_bytes();

    for (label, out) in [(KEY_LABEL, key), (IV_LABEL, iv), (MAC_LABEL, mac_key)] {
        let Ok(()) = hkdf.expand_multi_info(&[label, &sequence], out) else {
            unreachable!("outputs are bounded well below 255 * 32 bytes");
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(seed: [u8; 32], sequence: u64) -> ([u8; 32], [u8; 16], [u8; 32]) {
        let mut key = [0u8; 32];
        let mut iv = [0u8; 16];
        let mut mac = [0u8; 32];
        expand_message_keys(&seed, sequence, &mut key, &mut iv, &mut mac).unwrap();
        (key, iv, mac)
    }

    #[test]
    fn deterministic() {
        assert_eq!(expand([1u8; 32], 5), expand([1u8; 32], 5));
    }

    #[test]
    fn outputs_are_domain_separated() {
        let (key, iv, mac) = expand([1u8; 32], 5);
        assert_ne!(key, mac);
        assert_ne!(&key[..16], &iv);
    }

    #[test]
    fn sequence_changes_keys() {
        assert_ne!(expand([1u8; 32], 5).0, expand([1u8; 32], 6).0);
    }

    #[test]
    fn seed_changes_keys() {
        assert_ne!(expand([1u8; 32], 5).0, expand([2u8; 32], 5).0);
    }

    #[test]
    fn oversized_key_rejected() {
        let mut key = [0u8; MAX_KEY_BYTES + 1];
        let result = expand_message_keys(&[0u8; 32], 0, &mut key, &mut [0u8; 12], &mut [0u8; 32]);
        assert!(matches!(result, Err(CipherError::InvalidKeyLength { .. })));
    }
}
