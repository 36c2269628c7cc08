//! AES-256-GCM sealing and opening using the `ring` crate.
//!
//! Every call to [`seal`] draws a fresh random 96-bit nonce, so a key can
//! seal on the order of 2^32 messages before nonce reuse becomes a concern.
//! Associated data is authenticated but not encrypted; opening with
//! different associated data fails exactly like a wrong key does.

use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{AuthError, Result};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A nonce sequence that yields exactly one nonce and then errors, so each
/// bound key is used for a single operation.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Sealing
// ---------------------------------------------------------------------------

/// Encrypt and authenticate `plaintext`, binding `aad` to the result.
///
/// Returns `(nonce, ciphertext)`; the ciphertext carries the
/// [`TAG_LEN`]-byte tag at its end.
pub fn seal(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| AuthError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| AuthError::EncryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;
    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::from(aad), &mut in_out)
        .map_err(|_| AuthError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    tracing::trace!(
        plaintext_len = plaintext.len(),
        ciphertext_len = in_out.len(),
        "sealed payload"
    );
    Ok((nonce_bytes, in_out))
}

/// Verify and decrypt `ciphertext` (tag included) sealed under `nonce`
/// with the same `aad`.
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN_BYTES],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| AuthError::DecryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;
    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(*nonce));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::from(aad), &mut in_out)
        .map_err(|_| AuthError::DecryptionFailed {
            reason: "authentication failed".into(),
        })?;
    Ok(plaintext.to_vec())
}

/// Generate `len` cryptographically secure random bytes.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| AuthError::EncryptionFailed {
            reason: "failed to generate random bytes".into(),
        })?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; KEY_LEN] {
        random_bytes(KEY_LEN).unwrap().try_into().unwrap()
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = key();
        let (nonce, sealed) = seal(&key, b"alice", b"v1.local.").unwrap();
        assert_eq!(sealed.len(), b"alice".len() + TAG_LEN);
        assert_eq!(open(&key, &nonce, &sealed, b"v1.local.").unwrap(), b"alice");
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let (nonce, sealed) = seal(&key(), b"secret", b"").unwrap();
        let result = open(&key(), &nonce, &sealed, b"");
        assert!(matches!(result, Err(AuthError::DecryptionFailed { .. })));
    }

    #[test]
    fn open_with_other_aad_fails() {
        let key = key();
        let (nonce, sealed) = seal(&key, b"secret", b"v1.local.").unwrap();
        assert!(open(&key, &nonce, &sealed, b"v2.local.").is_err());
    }

    #[test]
    fn open_with_tampered_ciphertext_fails() {
        let key = key();
        let (nonce, mut sealed) = seal(&key, b"secret", b"").unwrap();
        if let Some(byte) = sealed.first_mut() {
            *byte ^= 0x01;
        }
        assert!(open(&key, &nonce, &sealed, b"").is_err());
    }

    #[test]
    fn nonces_are_fresh() {
        let key = key();
        let (first, _) = seal(&key, b"same", b"").unwrap();
        let (second, _) = seal(&key, b"same", b"").unwrap();
        assert_ne!(first, second);
    }
}
