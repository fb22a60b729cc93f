//! # Hashing Utilities
//!
//! Digest primitives and the two content-addressed identifier encodings of
//! the `did:aospace` method:
//!
//! - **`aospace_id`**: the method-specific id of a space DID. Base58 over
//!   `version || RIPEMD-160(SHA3-256(pubkey)) || checksum`, the same shape
//!   as a Bitcoin-style address.
//! - **`verification_hash`**: the short hash embedded in every
//!   `did:aospacekey:` verification method id. Base64 (standard alphabet,
//!   padded) over `version || SHA3-256(content)[..8] || checksum`.
//!
//! In both cases the checksum is the first four bytes of
//! `SHA3-256(version || digest)`. Neither value is secret; they only
//! address content.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ripemd::Ripemd160;
use sha2::Sha256;
use sha3::{Digest, Sha3_256};

use crate::config::{CHECKSUM_LENGTH, HASH_VERSION, VERIFICATION_DIGEST_LENGTH};

/// Compute the SHA-256 hash of the input data.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Compute the SHA3-256 hash of the input data.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    Sha3_256::digest(data).into()
}

/// Compute the RIPEMD-160 hash of the input data.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// Prefix `digest` with the hash version and append its checksum.
fn versioned_with_checksum(digest: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(HASH_VERSION.len() + digest.len() + CHECKSUM_LENGTH);
    payload.extend_from_slice(&HASH_VERSION);
    payload.extend_from_slice(digest);
    let checksum = sha3_256(&payload);
    payload.extend_from_slice(&checksum[..CHECKSUM_LENGTH]);
    payload
}

/// Derive the method-specific id of a space DID from a public key.
///
/// The input is the public key exactly as published (for RSA keys, the
/// PEM text bytes).
///
/// # Example
///
/// ```
/// use aospace_identity::crypto::hash::aospace_id;
///
/// let id = aospace_id(b"-----BEGIN PUBLIC KEY-----");
/// assert_eq!(id, aospace_id(b"-----BEGIN PUBLIC KEY-----"));
/// assert!(bs58::decode(&id).into_vec().is_ok());
/// ```
pub fn aospace_id(public_key: &[u8]) -> String {
    let digest = ripemd160(&sha3_256(public_key));
    bs58::encode(versioned_with_checksum(&digest)).into_string()
}

/// Compute the short content hash used inside verification method ids.
///
/// Always 20 characters of padded standard Base64 (14 encoded bytes).
pub fn verification_hash(content: &[u8]) -> String {
    let digest = sha3_256(content);
    BASE64.encode(versioned_with_checksum(&digest[..VERIFICATION_DIGEST_LENGTH]))
}

/// Check that a decoded identifier carries a valid trailing checksum.
///
/// Works for both encodings: strip the last four bytes, recompute, compare.
pub fn checksum_matches(decoded: &[u8]) -> bool {
    if decoded.len() < HASH_VERSION.len() + CHECKSUM_LENGTH {
        return false;
    }
    let (payload, checksum) = decoded.split_at(decoded.len() - CHECKSUM_LENGTH);
    sha3_256(payload)[..CHECKSUM_LENGTH] == *checksum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            sha256(b"abc")[..4],
            [0xba, 0x78, 0x16, 0xbf],
        );
    }

    #[test]
    fn sha3_256_known_vector() {
        // SHA3-256("abc") = 3a985da7...
        assert_eq!(sha3_256(b"abc")[..4], [0x3a, 0x98, 0x5d, 0xa7]);
    }

    #[test]
    fn aospace_id_known_answer() {
        // base58(00 00 || RIPEMD-160(SHA3-256("abc")) || checksum)
        let id = aospace_id(b"abc");
        assert_eq!(id, "115Uiiv4i1quetY5kyjYWPCMzyB4LiHwHRY");
        assert_eq!(
            bs58::decode(&id).into_vec().unwrap()[2..22],
            ripemd160(&sha3_256(b"abc"))[..]
        );
    }

    #[test]
    fn verification_hash_known_answer() {
        // base64(00 00 || SHA3-256("abc")[..8] || checksum)
        assert_eq!(verification_hash(b"abc"), "AAA6mF2nT+IlsnxW/cQ=");
    }

    #[test]
    fn ripemd160_known_vector() {
        // RIPEMD-160("abc") = 8eb208f7...
        assert_eq!(ripemd160(b"abc")[..4], [0x8e, 0xb2, 0x08, 0xf7]);
    }

    #[test]
    fn aospace_id_layout() {
        let id = aospace_id(b"public key pem");
        let decoded = bs58::decode(&id).into_vec().unwrap();
        // 2 version + 20 ripemd + 4 checksum
        assert_eq!(decoded.len(), 26);
        assert_eq!(&decoded[..2], &HASH_VERSION);
        assert!(checksum_matches(&decoded));
    }

    #[test]
    fn verification_hash_layout() {
        let hash = verification_hash(b"public key pem");
        assert_eq!(hash.len(), 20);
        assert!(hash.starts_with("AA"));
        assert!(hash.ends_with('='));

        let decoded = BASE64.decode(&hash).unwrap();
        assert_eq!(decoded.len(), 14);
        assert!(checksum_matches(&decoded));
    }

    #[test]
    fn hashes_are_deterministic_and_distinct() {
        assert_eq!(verification_hash(b"a"), verification_hash(b"a"));
        assert_ne!(verification_hash(b"a"), verification_hash(b"b"));
        assert_ne!(aospace_id(b"a"), aospace_id(b"b"));
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let mut decoded = bs58::decode(aospace_id(b"key")).into_vec().unwrap();
        let last = decoded.len() - 1;
        decoded[last] ^= 0x01;
        assert!(!checksum_matches(&decoded));
        assert!(!checksum_matches(&[0, 0, 1]));
    }
}
