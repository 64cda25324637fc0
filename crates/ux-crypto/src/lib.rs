//! # ux-crypto
//!
//! Cryptographic primitives for the uxnode blockchain.
//!
//! This crate provides:
//! - secp256k1 key pairs (33-byte compressed public keys)
//! - ECDSA signing and verification (64-byte compact signatures)
//! - Keccak-256 hashing
//! - 20-byte account addresses with `Ux`-prefixed checked strings
//!
//! All operations are pure functions over byte slices; callers hold the
//! keys and decide the signing policy.

mod error;
mod keys;

pub use error::{CryptoError, CryptoResult};
pub use keys::KeyPair;

use sha3::{Digest, Keccak256};

/// Length of a compressed secp256k1 public key.
pub const PUBLIC_KEY_LENGTH: usize = 33;

/// Length of a compact ECDSA signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of an account address.
pub const ADDRESS_LENGTH: usize = 20;

/// Prefix of the checked string form of an address.
pub const ADDRESS_PREFIX: &str = "Ux";

/// A 20-byte account address.
pub type Address = [u8; ADDRESS_LENGTH];

/// Compute the Keccak-256 digest of the input.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Derive the account address of a compressed public key.
///
/// The address is the first 20 bytes of `keccak256(public_key)`.
pub fn address(public_key: &[u8]) -> CryptoResult<Address> {
    if public_key.len() != PUBLIC_KEY_LENGTH {
        return Err(CryptoError::InvalidPublicKey(format!(
            "expected {} bytes, got {}",
            PUBLIC_KEY_LENGTH,
            public_key.len()
        )));
    }
    let digest = keccak256(public_key);
    let mut addr = [0u8; ADDRESS_LENGTH];
    addr.copy_from_slice(&digest[..ADDRESS_LENGTH]);
    Ok(addr)
}

/// Render an address as a checked string.
///
/// Format: `Ux` + 40 hex chars + 4 hex chars of checksum. The checksum is
/// the first two bytes of `keccak256(address)`.
pub fn address_to_string(addr: &Address) -> String {
    let checksum = keccak256(addr);
    format!(
        "{}{}{}",
        ADDRESS_PREFIX,
        hex::encode(addr),
        hex::encode(&checksum[..2])
    )
}

/// Parse a checked address string.
pub fn address_from_string(s: &str) -> CryptoResult<Address> {
    let body = s
        .strip_prefix(ADDRESS_PREFIX)
        .ok_or_else(|| CryptoError::InvalidAddress(format!("missing {} prefix", ADDRESS_PREFIX)))?;
    if body.len() != ADDRESS_LENGTH * 2 + 4 {
        return Err(CryptoError::InvalidAddress(format!(
            "bad length: {}",
            s.len()
        )));
    }
    let (addr_hex, checksum_hex) = body.split_at(ADDRESS_LENGTH * 2);
    let bytes = hex::decode(addr_hex).map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
    let mut addr = [0u8; ADDRESS_LENGTH];
    addr.copy_from_slice(&bytes);

    let expected = keccak256(&addr);
    if hex::encode(&expected[..2]) != checksum_hex {
        return Err(CryptoError::InvalidAddress("checksum mismatch".to_string()));
    }
    Ok(addr)
}

/// Sign a 32-byte message digest with a secret key.
pub fn sign(digest: &[u8; 32], secret: &secp256k1::SecretKey) -> [u8; SIGNATURE_LENGTH] {
    let secp = secp256k1::Secp256k1::signing_only();
    let msg = secp256k1::Message::from_digest(*digest);
    secp.sign_ecdsa(&msg, secret).serialize_compact()
}

/// Verify a compact signature over a 32-byte message digest.
///
/// Returns `false` on any malformed input; verification never errors out
/// to the caller.
pub fn verify(digest: &[u8; 32], signature: &[u8], public_key: &[u8]) -> bool {
    let secp = secp256k1::Secp256k1::verification_only();
    let msg = secp256k1::Message::from_digest(*digest);
    let Ok(sig) = secp256k1::ecdsa::Signature::from_compact(signature) else {
        return false;
    };
    let Ok(pk) = secp256k1::PublicKey::from_slice(public_key) else {
        return false;
    };
    secp.verify_ecdsa(&msg, &sig, &pk).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_derivation() {
        let pair = KeyPair::generate();
        let addr = address(&pair.public_key_bytes()).unwrap();
        assert_eq!(addr.len(), ADDRESS_LENGTH);

        // Deterministic for the same key
        let again = address(&pair.public_key_bytes()).unwrap();
        assert_eq!(addr, again);
    }

    #[test]
    fn test_address_rejects_bad_key_length() {
        assert!(address(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_checked_string_roundtrip() {
        let pair = KeyPair::generate();
        let addr = address(&pair.public_key_bytes()).unwrap();

        let s = address_to_string(&addr);
        assert!(s.starts_with(ADDRESS_PREFIX));
        assert_eq!(s.len(), 2 + 40 + 4);

        let parsed = address_from_string(&s).unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn test_checked_string_rejects_tampering() {
        let pair = KeyPair::generate();
        let addr = address(&pair.public_key_bytes()).unwrap();
        let s = address_to_string(&addr);

        // Flip one hex digit in the body
        let mut chars: Vec<char> = s.chars().collect();
        chars[5] = if chars[5] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();

        assert!(address_from_string(&tampered).is_err());
        assert!(address_from_string("Wx00").is_err());
    }

    #[test]
    fn test_sign_verify() {
        let pair = KeyPair::generate();
        let digest = keccak256(b"payload bytes");

        let sig = sign(&digest, pair.secret_key());
        assert!(verify(&digest, &sig, &pair.public_key_bytes()));

        // Wrong digest fails
        let other = keccak256(b"other payload");
        assert!(!verify(&other, &sig, &pair.public_key_bytes()));

        // Wrong key fails
        let stranger = KeyPair::generate();
        assert!(!verify(&digest, &sig, &stranger.public_key_bytes()));
    }

    #[test]
    fn test_verify_malformed_inputs() {
        let digest = keccak256(b"data");
        assert!(!verify(&digest, &[0u8; 10], &[0u8; PUBLIC_KEY_LENGTH]));
        assert!(!verify(&digest, &[0u8; SIGNATURE_LENGTH], &[1u8; 5]));
    }
}
