//! Message authentication for Managed-Key Encryption.

use hmac::{Hmac, Mac as _};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::error::MacError;

/// Largest supported tag, in bytes.
pub const MAX_TAG_BYTES: usize = 64;

/// Largest supported MAC key, in bytes.
pub const MAX_MAC_KEY_BYTES: usize = 128;

/// A MAC family.
pub trait Mac {
    /// Keyed running state.
    type State: MacState;

    /// Key length in bytes.
    fn key_bytes(&self) -> usize;

    /// Tag length in bytes.
    fn tag_bytes(&self) -> usize;

    /// Key the MAC for one message.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKeyLength` if `key` does not match `key_bytes()`.
    fn start(&self, key: &[u8]) -> Result<Self::State, MacError>;
}

/// Running MAC computation.
pub trait MacState {
    /// Absorb more data.
    fn update(&mut self, data: &[u8]);

    /// Write the tag into `tag`, which must be exactly `tag_bytes()` long.
    fn finalize_into(self, tag: &mut [u8]) -> Result<(), MacError>;
}

/// Built-in MAC selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacKind {
    /// HMAC-SHA256, 32-byte tag
    #[default]
    HmacSha256,
    /// HMAC-SHA512, 64-byte tag
    HmacSha512,
}

/// One of the built-in MACs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuiltinMac(pub MacKind);

/// Running state of a built-in MAC.
pub enum BuiltinMacState {
    /// HMAC-SHA256
    HmacSha256(Hmac<Sha256>),
    /// HMAC-SHA512
    HmacSha512(Hmac<Sha512>),
}

impl From<MacKind> for BuiltinMac {
    fn from(kind: MacKind) -> Self {
        Self(kind)
    }
}

impl Mac for BuiltinMac {
    type State = BuiltinMacState;

    fn key_bytes(&self) -> usize {
        match self.0 {
            MacKind::HmacSha256 => 32,
            MacKind::HmacSha512 => 64,
        }
    }

    fn tag_bytes(&self) -> usize {
        self.key_bytes()
    }

    fn start(&self, key: &[u8]) -> Result<BuiltinMacState, MacError> {
        if key.len() != self.key_bytes() {
            return Err(MacError::InvalidKeyLength { expected: self.key_bytes(), actual: key.len() });
        }
        let state = match self.0 {
            MacKind::HmacSha256 => {
                let Ok(mac) = Hmac::<Sha256>::new_from_slice(key) else {
                    unreachable!("HMAC accepts any key length");
                };
                BuiltinMacState::HmacSha256(mac)
            },
            MacKind::HmacSha512 => {
                let Ok(mac) = Hmac::<Sha512>::new_from_slice(key) else {
                    unreachable!("HMAC accepts any key length");
                };
                BuiltinMacState::HmacSha512(mac)
            },
        };
        Ok(state)
    }
}

impl MacState for BuiltinMacState {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::HmacSha256(mac) => mac.update(data),
            Self::HmacSha512(mac) => mac.update(data),
        }
    }

    fn finalize_into(self, tag: &mut [u8]) -> Result<(), MacError> {
        match self {
            Self::HmacSha256(mac) => copy_tag(&mac.finalize().into_bytes(), tag),
            Self::HmacSha512(mac) => copy_tag(&mac.finalize().into_bytes(), tag),
        }
    }
}

fn copy_tag(computed: &[u8], tag: &mut [u8]) -> Result<(), MacError> {
    if tag.len() != computed.len() {
        return Err(MacError::InvalidTagLength { expected: computed.len(), actual: tag.len() });
    }
    tag.copy_from_slice(computed);
    Ok(())
}

/// Compare two tags in constant time.
///
/// Slices of different lengths compare unequal.
pub fn tags_equal(expected: &[u8], actual: &[u8]) -> bool {
    expected.ct_eq(actual).into()
}
