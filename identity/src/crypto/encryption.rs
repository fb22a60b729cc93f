//! # Password Key Wrapping
//!
//! Password-derived AES-256-CBC encryption for private keys at rest.
//!
//! ## Key derivation
//!
//! `PBKDF2-HMAC-SHA256(password, salt, 4096 iterations, 32 bytes)` where the
//! salt is `SHA-256(WRAP_SALT_SEED)`. The salt is fixed per application, not
//! per record: the same password always derives the same key. The per-blob
//! randomness comes from the IV.
//!
//! ## Wire format
//!
//! ```text
//! +---------+----------+---------------------------+
//! | version |    IV    | AES-256-CBC(PKCS#7) data  |
//! | 4 bytes | 16 bytes |  multiple of 16 bytes     |
//! +---------+----------+---------------------------+
//! ```
//!
//! The version is a zeroed placeholder. CBC carries no authentication tag,
//! so a wrong password usually surfaces as a padding error, and otherwise
//! as plaintext that fails to parse as a private key PEM. [`unwrap`]
//! reports both as [`CryptoError::Decrypt`].

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::Sha256;

use super::hash::sha256;
use super::keys::RsaKeyPair;
use super::CryptoError;
use crate::config::{
    AES_IV_LENGTH, KDF_ITERATIONS, KDF_KEY_LENGTH, WRAP_HEADER_LENGTH, WRAP_SALT_SEED,
    WRAP_VERSION_LENGTH,
};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Derive the 256-bit wrapping key from a password.
pub fn derive_key(password: &str) -> [u8; KDF_KEY_LENGTH] {
    let salt = sha256(WRAP_SALT_SEED.as_bytes());
    let mut key = [0u8; KDF_KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, KDF_ITERATIONS, &mut key);
    key
}

/// Encrypt `plaintext` under a password, returning `version || IV || ciphertext`.
///
/// # Example
///
/// ```
/// use aospace_identity::crypto::encryption::{unwrap, wrap};
/// use aospace_identity::crypto::RsaKeyPair;
///
/// let key = RsaKeyPair::generate(1024).unwrap();
/// let blob = wrap(key.private_pem().as_bytes(), "123456").unwrap();
/// assert_eq!(unwrap(&blob, "123456").unwrap(), key.private_pem().as_bytes());
/// assert!(unwrap(&blob, "654321").is_err());
/// ```
pub fn wrap(plaintext: &[u8], password: &str) -> Result<Vec<u8>, CryptoError> {
    let mut iv = [0u8; AES_IV_LENGTH];
    rand::rngs::OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;
    wrap_with_iv(plaintext, password, &iv)
}

fn wrap_with_iv(
    plaintext: &[u8],
    password: &str,
    iv: &[u8; AES_IV_LENGTH],
) -> Result<Vec<u8>, CryptoError> {
    let key = derive_key(password);
    let ciphertext = Aes256CbcEnc::new(&key.into(), iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut blob = Vec::with_capacity(WRAP_HEADER_LENGTH + ciphertext.len());
    blob.extend_from_slice(&[0u8; WRAP_VERSION_LENGTH]);
    blob.extend_from_slice(iv);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a wrapped private key produced by [`wrap`].
///
/// Fails with [`CryptoError::MalformedBlob`] when the blob is too short or
/// not block-aligned. Fails with [`CryptoError::Decrypt`] when the padding
/// does not check out or the plaintext is not a PKCS#1 private key PEM.
/// Both happen on a wrong password.
pub fn unwrap(blob: &[u8], password: &str) -> Result<Vec<u8>, CryptoError> {
    let plaintext = decrypt(blob, password)?;
    parse_private_pem(&plaintext)?;
    Ok(plaintext)
}

/// Decrypt a wrapped private key and load it.
pub fn unwrap_key(blob: &[u8], password: &str) -> Result<RsaKeyPair, CryptoError> {
    parse_private_pem(&decrypt(blob, password)?)
}

fn parse_private_pem(plaintext: &[u8]) -> Result<RsaKeyPair, CryptoError> {
    let pem = std::str::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)?;
    RsaKeyPair::from_private_pem(pem).map_err(|_| CryptoError::Decrypt)
}

fn decrypt(blob: &[u8], password: &str) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < WRAP_HEADER_LENGTH + AES_IV_LENGTH {
        return Err(CryptoError::MalformedBlob(format!(
            "wrapped key is {} bytes, need at least {}",
            blob.len(),
            WRAP_HEADER_LENGTH + AES_IV_LENGTH
        )));
    }
    let ciphertext = &blob[WRAP_HEADER_LENGTH..];
    if ciphertext.len() % AES_IV_LENGTH != 0 {
        return Err(CryptoError::MalformedBlob(
            "ciphertext is not a whole number of blocks".into(),
        ));
    }

    let mut iv = [0u8; AES_IV_LENGTH];
    iv.copy_from_slice(&blob[WRAP_VERSION_LENGTH..WRAP_HEADER_LENGTH]);
    let key = derive_key(password);

    // CBC has no tag. Valid padding under a wrong key happens about once
    // in 256 tries, so the PEM parse above is the real check.
    Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}
