//! Property-based tests for the built-in primitives
//!
//! 1. **Cipher streaming**: encrypting in pieces equals encrypting at once
//! 2. **Cipher inverse**: decrypt undoes encrypt
//! 3. **MAC streaming**: updating in pieces yields the same tag
//! 4. **DRBG determinism**: equal seeds give equal streams, and any
//!    personalization change gives a different one

use proptest::prelude::*;
use tokenveil_crypto::{
    BuiltinCipher, BuiltinDrbg, BuiltinMac, Cipher, CipherKind, CipherStream, Drbg, DrbgKind, Mac,
    MacKind, MacState, tags_equal,
};

fn cipher_kind() -> impl Strategy<Value = CipherKind> {
    prop_oneof![Just(CipherKind::ChaCha20), Just(CipherKind::Aes256Ctr)]
}

fn mac_kind() -> impl Strategy<Value = MacKind> {
    prop_oneof![Just(MacKind::HmacSha256), Just(MacKind::HmacSha512)]
}

fn drbg_kind() -> impl Strategy<Value = DrbgKind> {
    prop_oneof![Just(DrbgKind::HmacSha256), Just(DrbgKind::HashSha256)]
}

fn keyed(kind: CipherKind, seed: u8) -> <BuiltinCipher as Cipher>::Stream {
    let cipher = BuiltinCipher(kind);
    let key = vec![seed; cipher.key_bytes()];
    let iv = vec![seed.wrapping_add(1); cipher.iv_bytes()];
    cipher.start(&key, &iv).unwrap()
}

fn tag(kind: MacKind, key: &[u8], pieces: &[&[u8]]) -> Vec<u8> {
    let mac = BuiltinMac(kind);
    let mut state = mac.start(&key[..mac.key_bytes()]).unwrap();
    for piece in pieces {
        state.update(piece);
    }
    let mut out = vec![0u8; mac.tag_bytes()];
    state.finalize_into(&mut out).unwrap();
    out
}

fn stream(kind: DrbgKind, personalization: &[u8], len: usize) -> Vec<u8> {
    let mut drbg = BuiltinDrbg::new(kind);
    drbg.instantiate(&[0x11; 32], &[0x22; 16], personalization).unwrap();
    let mut out = vec![0u8; len];
    drbg.generate(&mut out).unwrap();
    out
}

proptest! {
    #[test]
    fn prop_cipher_chunking_is_transparent(
        kind in cipher_kind(),
        seed in any::<u8>(),
        data in prop::collection::vec(any::<u8>(), 0..512),
        cut in any::<prop::sample::Index>(),
    ) {
        let mut whole = data.clone();
        keyed(kind, seed).encrypt(&mut whole).unwrap();

        let mut pieces = data.clone();
        let at = cut.index(pieces.len() + 1);
        let (head, tail) = pieces.split_at_mut(at);
        let mut stream = keyed(kind, seed);
        stream.encrypt(head).unwrap();
        stream.encrypt(tail).unwrap();

        prop_assert_eq!(pieces, whole);
    }

    #[test]
    fn prop_cipher_decrypt_inverts(
        kind in cipher_kind(),
        seed in any::<u8>(),
        data in prop::collection::vec(any::<u8>(), 16..512),
    ) {
        let mut buf = data.clone();
        keyed(kind, seed).encrypt(&mut buf).unwrap();
        prop_assert_ne!(&buf, &data);
        keyed(kind, seed).decrypt(&mut buf).unwrap();
        prop_assert_eq!(buf, data);
    }

    #[test]
    fn prop_mac_chunking_is_transparent(
        kind in mac_kind(),
        key in prop::collection::vec(any::<u8>(), 128),
        data in prop::collection::vec(any::<u8>(), 0..512),
        cut in any::<prop::sample::Index>(),
    ) {
        let at = cut.index(data.len() + 1);
        let whole = tag(kind, &key, &[&data]);
        let split = tag(kind, &key, &[&data[..at], &data[at..]]);
        prop_assert!(tags_equal(&whole, &split));
    }

    #[test]
    fn prop_drbg_personalization_separates_streams(
        kind in drbg_kind(),
        first in prop::collection::vec(any::<u8>(), 0..64),
        second in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        prop_assume!(first != second);
        prop_assert_eq!(stream(kind, &first, 64), stream(kind, &first, 64));
        prop_assert_ne!(stream(kind, &first, 64), stream(kind, &second, 64));
    }
}
