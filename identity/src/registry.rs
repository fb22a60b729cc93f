//! # DID Registry
//!
//! The operations the agent's service layer calls: create a space DID for
//! an account, read it back, rotate or reissue its password credential, and
//! maintain the `aoId <-> DID` index.
//!
//! Every operation takes an optional transaction. With `Some(txn)` the
//! writes join the caller's transaction and the caller commits; with `None`
//! the registry runs the operation in its own transaction, committed on
//! success and rolled back on any error. Either way, a multi-record
//! operation never lands partially.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{IdentityConfig, MULTISIG_FRAGMENT};
use crate::did::{
    canonicalize, compose_recovery, BinderKey, Document, Identifier, VerificationMethodBuilder,
};
use crate::error::{IdentityError, Result};
use crate::storage::records::{self, normalize_did};
use crate::storage::{DbError, DbTransaction, IdentityDb, KvStore};
use crate::vault::{KeyCustody, KeyPool};

/// How to find an account's document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DidLookup<'a> {
    AoId(&'a str),
    Did(&'a str),
}

/// Result of issuing or reissuing a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedDocument {
    /// The account's wrapped password key, for hand-off to the binder.
    pub wrapped_password_key: Vec<u8>,
    /// Canonical document bytes, as stored.
    pub document: Vec<u8>,
    /// `did:aospace:<id>#did0`.
    pub did: String,
}

#[derive(Debug, Clone)]
pub struct DidRegistry {
    db: IdentityDb,
    custody: KeyCustody,
}

impl DidRegistry {
    pub fn new(db: IdentityDb, custody: KeyCustody) -> Self {
        Self { db, custody }
    }

    /// A registry with a fresh, empty key pool sized by `config`.
    ///
    /// Pre-generation is left to the caller, see
    /// [`crate::vault::spawn_pregeneration`].
    pub fn with_config(db: IdentityDb, config: &IdentityConfig) -> Self {
        let pool = Arc::new(KeyPool::new(config.rsa_bits));
        Self::new(db, KeyCustody::new(pool))
    }

    pub fn db(&self) -> &IdentityDb {
        &self.db
    }

    pub fn custody(&self) -> &KeyCustody {
        &self.custody
    }

    fn in_transaction<T>(
        &self,
        txn: Option<&mut DbTransaction>,
        f: impl FnOnce(&mut DbTransaction) -> Result<T>,
    ) -> Result<T> {
        match txn {
            Some(txn) => f(txn),
            None => self.db.transaction(f),
        }
    }

    fn store<'s>(&'s self, txn: Option<&'s DbTransaction>) -> &'s dyn KvStore {
        match txn {
            Some(txn) => txn as &dyn KvStore,
            None => &self.db,
        }
    }

    // -- Documents ----------------------------------------------------------

    /// Issue the account's space DID.
    ///
    /// Publishes the device key, the caller's binder key, a fresh
    /// password-on-device key wrapped under `password`, and the caller's
    /// password-on-binder key when supplied, then composes the recovery
    /// access structure. Stores the canonical document and both index
    /// directions.
    ///
    /// Re-issuing for an existing account keeps its space key, and with it
    /// the DID, but replaces the password credential.
    pub fn create_document(
        &self,
        txn: Option<&mut DbTransaction>,
        ao_id: &str,
        password: &str,
        external: &[BinderKey],
    ) -> Result<IssuedDocument> {
        self.in_transaction(txn, |txn| {
            let builder = VerificationMethodBuilder::new(&self.custody);
            let mut identifier = Identifier::new();

            builder.add_device(&mut identifier, txn, ao_id)?;
            builder.add_binder(&mut identifier, external)?;
            let (_, password_key) =
                builder.add_password_on_device(&mut identifier, txn, ao_id, password)?;
            builder.add_password_on_binder(&mut identifier, external)?;
            compose_recovery(&mut identifier)?;

            let issued = self.store_identifier(txn, ao_id, &identifier, password_key.wrapped)?;
            info!(ao_id, did = %issued.did, "DID document created");
            Ok(issued)
        })
    }

    /// Canonical bytes of the account's document.
    pub fn get_document(
        &self,
        txn: Option<&DbTransaction>,
        lookup: DidLookup<'_>,
    ) -> Result<Vec<u8>> {
        let store = self.store(txn);
        let did = resolve_did(store, lookup)?;
        records::get_document(store, &did)?
            .ok_or_else(|| IdentityError::NotFound(format!("document for {}", did)))
    }

    /// The account's document, parsed.
    pub fn resolve_document(
        &self,
        txn: Option<&DbTransaction>,
        lookup: DidLookup<'_>,
    ) -> Result<Document> {
        let bytes = self.get_document(txn, lookup)?;
        Ok(Document::from_slice(&bytes)?)
    }

    /// Reissue the password-on-device credential under `new_password`.
    ///
    /// The old password key is destroyed, a new one issued in its place,
    /// and the recovery structure recomposed. Returns the new document and
    /// DID along with the new wrapped key.
    pub fn reset_password_verification_method(
        &self,
        txn: Option<&mut DbTransaction>,
        lookup: DidLookup<'_>,
        new_password: &str,
    ) -> Result<IssuedDocument> {
        self.in_transaction(txn, |txn| {
            let ao_id = resolve_ao_id(&*txn, lookup)?;
            let old_did = resolve_did(&*txn, DidLookup::AoId(&ao_id))?;
            let bytes = records::get_document(&*txn, &old_did)?
                .ok_or_else(|| IdentityError::NotFound(format!("document for {}", old_did)))?;
            let mut identifier = Identifier::from_document(&Document::from_slice(&bytes)?)?;

            identifier.remove_verification_method_by_fragment(MULTISIG_FRAGMENT);
            let builder = VerificationMethodBuilder::new(&self.custody);
            let (_, password_key) =
                builder.add_password_on_device(&mut identifier, txn, &ao_id, new_password)?;
            compose_recovery(&mut identifier)?;

            let issued = self.store_identifier(txn, &ao_id, &identifier, password_key.wrapped)?;
            info!(ao_id = %ao_id, did = %issued.did, "password verification method reset");
            Ok(issued)
        })
    }

    /// Canonicalize and store `identifier`, replacing any previous document
    /// and index entries of the account.
    fn store_identifier(
        &self,
        txn: &mut DbTransaction,
        ao_id: &str,
        identifier: &Identifier,
        wrapped_password_key: Vec<u8>,
    ) -> Result<IssuedDocument> {
        let document = identifier.to_document();
        document.validate()?;
        let canonical = canonicalize(&document)?;
        let did = identifier.did();

        if let Some(previous) = records::lookup_did_by_ao_id(&*txn, ao_id)? {
            if previous != normalize_did(&did) {
                debug!(ao_id, previous = %previous, "replacing document under a new DID");
                records::delete_document(txn, &previous)?;
            }
        }
        records::put_document(txn, &did, &canonical)?;
        records::save_identity_index(txn, ao_id, &did)?;

        Ok(IssuedDocument {
            wrapped_password_key,
            document: canonical,
            did,
        })
    }

    // -- Password key -------------------------------------------------------

    /// The account's wrapped password key, if one exists.
    pub fn get_wrapped_password_key(
        &self,
        txn: Option<&DbTransaction>,
        ao_id: &str,
    ) -> Result<Option<Vec<u8>>> {
        self.custody.wrapped_password_key(self.store(txn), ao_id)
    }

    /// Re-wrap the account's password key under a new password. The key
    /// pair, and therefore the document, is unchanged. Returns the new
    /// wrapped key.
    pub fn update_password_key(
        &self,
        txn: Option<&mut DbTransaction>,
        ao_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<Vec<u8>> {
        self.in_transaction(txn, |txn| {
            self.custody.rotate(txn, ao_id, old_password, new_password)
        })
    }

    // -- Index --------------------------------------------------------------

    /// Record both directions of `ao_id <-> did`. Query and fragment of
    /// `did` are dropped.
    pub fn save_identity_index(
        &self,
        txn: Option<&mut DbTransaction>,
        ao_id: &str,
        did: &str,
    ) -> Result<()> {
        self.in_transaction(txn, |txn| {
            records::save_identity_index(txn, ao_id, did)?;
            debug!(ao_id, did = %normalize_did(did), "identity index saved");
            Ok(())
        })
    }

    /// The account's normalized DID.
    pub fn lookup_did_by_ao_id(
        &self,
        txn: Option<&DbTransaction>,
        ao_id: &str,
    ) -> Result<Option<String>> {
        Ok(records::lookup_did_by_ao_id(self.store(txn), ao_id)?)
    }

    /// The account owning `did`.
    pub fn lookup_ao_id_by_did(
        &self,
        txn: Option<&DbTransaction>,
        did: &str,
    ) -> Result<Option<String>> {
        Ok(records::lookup_ao_id_by_did(self.store(txn), did)?)
    }

    /// Every indexed `(aoId, did)` pair, ordered by aoId.
    pub fn list_accounts(&self) -> Result<Vec<(String, String)>> {
        let prefix = records::aoid_to_did_prefix();
        self.db
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|(key, value)| {
                let ao_id = key[prefix.len()..].to_string();
                let did = String::from_utf8(value).map_err(|e| {
                    DbError::Serialization(format!("indexed DID of aoId {}: {}", ao_id, e))
                })?;
                Ok((ao_id, did))
            })
            .collect()
    }
}

fn resolve_did<S: KvStore + ?Sized>(store: &S, lookup: DidLookup<'_>) -> Result<String> {
    match lookup {
        DidLookup::AoId(ao_id) => records::lookup_did_by_ao_id(store, ao_id)?
            .ok_or_else(|| IdentityError::NotFound(format!("DID for aoId {}", ao_id))),
        DidLookup::Did(did) => Ok(normalize_did(did).to_string()),
    }
}

fn resolve_ao_id<S: KvStore + ?Sized>(store: &S, lookup: DidLookup<'_>) -> Result<String> {
    match lookup {
        DidLookup::AoId(ao_id) => Ok(ao_id.to_string()),
        DidLookup::Did(did) => records::lookup_ao_id_by_did(store, did)?
            .ok_or_else(|| IdentityError::NotFound(format!("aoId for {}", normalize_did(did)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::verification_hash;
    use crate::crypto::RsaKeyPair;
    use crate::did::KeyType;
    use crate::vault::open_wrapped_key;

    fn registry() -> DidRegistry {
        let config = IdentityConfig {
            rsa_bits: 1024,
            ..Default::default()
        };
        DidRegistry::with_config(IdentityDb::open_temporary().unwrap(), &config)
    }

    fn binder() -> BinderKey {
        let kp = RsaKeyPair::generate(1024).unwrap();
        let id = format!(":{}?credentialType=binder", verification_hash(kp.public_pem().as_bytes()));
        BinderKey::new(id, KeyType::RsaVerificationKey2018, kp.public_pem())
    }

    #[test]
    fn create_then_get_by_either_key() {
        let registry = registry();
        let issued = registry
            .create_document(None, "aoId-1", "123456", &[binder()])
            .unwrap();

        let by_ao_id = registry.get_document(None, DidLookup::AoId("aoId-1")).unwrap();
        let by_did = registry.get_document(None, DidLookup::Did(&issued.did)).unwrap();
        assert_eq!(by_ao_id, issued.document);
        assert_eq!(by_did, issued.document);
        assert_eq!(
            registry.lookup_ao_id_by_did(None, &issued.did).unwrap().as_deref(),
            Some("aoId-1")
        );
    }

    #[test]
    fn unknown_account_is_not_found() {
        let registry = registry();
        let err = registry
            .get_document(None, DidLookup::AoId("ghost"))
            .unwrap_err();
        assert!(err.is_not_found());
        let err = registry
            .reset_password_verification_method(None, DidLookup::Did("did:aospace:nope"), "pw")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn failed_create_leaves_no_records() {
        let registry = registry();
        // No binder supplied: fails after the device and space key were
        // written inside the operation's transaction.
        let err = registry.create_document(None, "aoId-1", "pw", &[]).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(registry.db().record_count(), 0);
    }

    #[test]
    fn recreate_keeps_did_and_replaces_password_key() {
        let registry = registry();
        let first = registry
            .create_document(None, "aoId-1", "pw1", &[binder()])
            .unwrap();
        let second = registry
            .create_document(None, "aoId-1", "pw2", &[binder()])
            .unwrap();

        assert_eq!(first.did, second.did);
        assert_ne!(first.wrapped_password_key, second.wrapped_password_key);
        open_wrapped_key(&second.wrapped_password_key, "pw2").unwrap();
        assert_eq!(registry.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn update_password_key_keeps_document() {
        let registry = registry();
        let issued = registry
            .create_document(None, "aoId-1", "pw1", &[binder()])
            .unwrap();
        let before = open_wrapped_key(&issued.wrapped_password_key, "pw1").unwrap();

        let rewrapped = registry
            .update_password_key(None, "aoId-1", "pw1", "pw2")
            .unwrap();
        assert_eq!(
            registry.get_wrapped_password_key(None, "aoId-1").unwrap(),
            Some(rewrapped.clone())
        );
        assert_eq!(open_wrapped_key(&rewrapped, "pw2").unwrap(), before);
        assert_eq!(
            registry.get_document(None, DidLookup::AoId("aoId-1")).unwrap(),
            issued.document
        );
    }

    #[test]
    fn explicit_transaction_is_left_to_the_caller() {
        let registry = registry();
        let mut txn = registry.db().begin();
        let issued = registry
            .create_document(Some(&mut txn), "aoId-1", "pw", &[binder()])
            .unwrap();

        assert_eq!(
            registry
                .get_document(Some(&txn), DidLookup::AoId("aoId-1"))
                .unwrap(),
            issued.document
        );
        assert!(registry.lookup_did_by_ao_id(None, "aoId-1").unwrap().is_none());

        txn.commit().unwrap();
        assert!(registry.lookup_did_by_ao_id(None, "aoId-1").unwrap().is_some());
    }

    #[test]
    fn save_identity_index_keeps_the_mapping_bidirectional() {
        let registry = registry();
        registry.save_identity_index(None, "aoId-1", "did:aospace:one").unwrap();
        registry
            .save_identity_index(None, "aoId-1", "did:aospace:two#did0")
            .unwrap();

        assert!(registry
            .lookup_ao_id_by_did(None, "did:aospace:one")
            .unwrap()
            .is_none());
        assert_eq!(
            registry.lookup_ao_id_by_did(None, "did:aospace:two").unwrap().as_deref(),
            Some("aoId-1")
        );
        assert_eq!(registry.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn list_accounts_in_ao_id_order() {
        let registry = registry();
        registry
            .save_identity_index(None, "b", "did:aospace:two#did0")
            .unwrap();
        registry.save_identity_index(None, "a", "did:aospace:one").unwrap();

        assert_eq!(
            registry.list_accounts().unwrap(),
            vec![
                ("a".to_string(), "did:aospace:one".to_string()),
                ("b".to_string(), "did:aospace:two".to_string()),
            ]
        );
    }
}
