//! # Key Custody
//!
//! Owns the two private keys of every account:
//!
//! - the **space key**, persisted as cleartext PKCS#1 PEM under
//!   `key--space_rsa_pri--<aoId>`;
//! - the **password key**, persisted only in wrapped form under
//!   `key--password_rsa_pri--<aoId>` (see [`crate::crypto::encryption`]).
//!
//! New key pairs come from the injected [`KeyPool`]. Every operation takes
//! the store to act on, so callers decide whether it runs directly or
//! inside a transaction.

use std::sync::Arc;
use tracing::{debug, info};

use super::pool::{KeyPool, KeyPurpose};
use crate::crypto::{self, CryptoError, RsaKeyPair};
use crate::error::{IdentityError, Result};
use crate::storage::records;
use crate::storage::KvStore;

/// A password key pair together with its persisted wrapped form.
#[derive(Debug, Clone)]
pub struct PasswordKey {
    pub wrapped: Vec<u8>,
    pub key_pair: RsaKeyPair,
}

/// Unwrap a password-key blob and load the key pair inside it.
///
/// A wrong password is [`CryptoError::Decrypt`].
pub fn open_wrapped_key(blob: &[u8], password: &str) -> std::result::Result<RsaKeyPair, CryptoError> {
    crypto::unwrap_key(blob, password)
}

#[derive(Debug, Clone)]
pub struct KeyCustody {
    pool: Arc<KeyPool>,
}

impl KeyCustody {
    pub fn new(pool: Arc<KeyPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<KeyPool> {
        &self.pool
    }

    /// The account's space key, created and persisted on first use.
    pub fn get_or_create_space_key<S: KvStore + ?Sized>(
        &self,
        store: &mut S,
        ao_id: &str,
    ) -> Result<RsaKeyPair> {
        if let Some(pem) = records::get_space_key(&*store, ao_id)? {
            return Ok(RsaKeyPair::from_private_pem(&pem)?);
        }

        let key_pair = self.pool.take_or_generate(KeyPurpose::Space)?;
        records::put_space_key(store, ao_id, key_pair.private_pem())?;
        info!(ao_id, "space key created");
        Ok(key_pair)
    }

    /// The account's password key, created, wrapped under `password` and
    /// persisted on first use.
    ///
    /// An existing key is unwrapped with `password`, so a wrong password
    /// fails here with [`CryptoError::Decrypt`].
    pub fn get_or_create_password_key<S: KvStore + ?Sized>(
        &self,
        store: &mut S,
        ao_id: &str,
        password: &str,
    ) -> Result<PasswordKey> {
        if let Some(wrapped) = records::get_password_key(&*store, ao_id)? {
            let key_pair = open_wrapped_key(&wrapped, password)?;
            return Ok(PasswordKey { wrapped, key_pair });
        }

        let key_pair = self.pool.take_or_generate(KeyPurpose::Password)?;
        let wrapped = crypto::wrap(key_pair.private_pem().as_bytes(), password)?;
        records::put_password_key(store, ao_id, &wrapped)?;
        info!(ao_id, "password key created");
        Ok(PasswordKey { wrapped, key_pair })
    }

    /// The stored wrapped password key, if any.
    pub fn wrapped_password_key<S: KvStore + ?Sized>(
        &self,
        store: &S,
        ao_id: &str,
    ) -> Result<Option<Vec<u8>>> {
        Ok(records::get_password_key(store, ao_id)?)
    }

    /// Re-wrap the password key under a new password. The key pair itself
    /// is unchanged. Returns the new wrapped blob.
    pub fn rotate<S: KvStore + ?Sized>(
        &self,
        store: &mut S,
        ao_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<Vec<u8>> {
        let wrapped = records::get_password_key(&*store, ao_id)?.ok_or_else(|| {
            IdentityError::NotFound(format!("password key for aoId {}", ao_id))
        })?;

        let key_pair = open_wrapped_key(&wrapped, old_password)?;
        let rewrapped = crypto::wrap(key_pair.private_pem().as_bytes(), new_password)?;
        records::put_password_key(store, ao_id, &rewrapped)?;
        info!(ao_id, "password key re-wrapped");
        Ok(rewrapped)
    }

    /// Remove the wrapped password key. Missing records are not an error.
    pub fn delete<S: KvStore + ?Sized>(&self, store: &mut S, ao_id: &str) -> Result<()> {
        records::delete_password_key(store, ao_id)?;
        debug!(ao_id, "password key deleted");
        Ok(())
    }
}
