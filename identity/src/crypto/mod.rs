//! # Cryptographic Primitives
//!
//! Everything the identity core hashes, encrypts or generates flows through
//! here:
//!
//! - **hash**: SHA-256, SHA3-256, RIPEMD-160 and the two content-addressed
//!   id encodings of the `did:aospace` method.
//! - **encryption**: PBKDF2 key derivation and AES-256-CBC key wrapping.
//! - **keys**: RSA key pair generation and PEM encoding.
//!
//! Thin, typed wrappers around RustCrypto implementations. Nothing here is
//! hand-rolled.

pub mod encryption;
pub mod hash;
pub mod keys;

use thiserror::Error;

pub use encryption::{derive_key, unwrap, unwrap_key, wrap};
pub use hash::{aospace_id, verification_hash};
pub use keys::RsaKeyPair;

/// Errors from key generation, key parsing and key wrapping.
///
/// Messages stay vague about key material on purpose. A wrong password
/// and a corrupted blob look the same from here.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed -- wrong password or corrupted key")]
    Decrypt,

    #[error("malformed wrapped key: {0}")]
    MalformedBlob(String),
}
