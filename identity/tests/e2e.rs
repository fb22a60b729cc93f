//! End-to-end tests for the identity core.
//!
//! These drive the registry the way the agent's service layer does: issue a
//! space DID for an account, read it back by aoId and by DID, rotate and
//! reset the password credential, and group writes into caller-owned
//! transactions.
//!
//! Each test opens its own temporary database. RSA keys are 1024-bit to
//! keep generation fast; nothing here depends on the key size.

use std::collections::HashSet;
use std::sync::Arc;

use aospace_identity::config::IdentityConfig;
use aospace_identity::crypto::hash::verification_hash;
use aospace_identity::crypto::{CryptoError, RsaKeyPair};
use aospace_identity::did::{
    canonicalize, AccessNode, BinderKey, CredentialType, DidError, Document, Identifier, KeyType,
    Relationship,
};
use aospace_identity::registry::{DidLookup, DidRegistry};
use aospace_identity::storage::{normalize_did, records, IdentityDb, KvStore};
use aospace_identity::vault::{open_wrapped_key, spawn_pregeneration, KeyPurpose};
use aospace_identity::IdentityError;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const TEST_BITS: usize = 1024;

fn setup() -> DidRegistry {
    let config = IdentityConfig {
        rsa_bits: TEST_BITS,
        pregenerate: false,
    };
    DidRegistry::with_config(IdentityDb::open_temporary().expect("temp db"), &config)
}

/// A caller-side key whose id embeds its verification hash.
fn external_key(credential: Option<CredentialType>) -> BinderKey {
    let kp = RsaKeyPair::generate(TEST_BITS).expect("keygen");
    let mut id = format!(":{}", verification_hash(kp.public_pem().as_bytes()));
    if let Some(kind) = credential {
        id.push('?');
        id.push_str(&kind.query_pair());
    }
    BinderKey::new(id, KeyType::RsaVerificationKey2018, kp.public_pem())
}

fn parse_document(bytes: &[u8]) -> Document {
    Document::from_slice(bytes).expect("stored document parses")
}

// ---------------------------------------------------------------------------
// Document Creation
// ---------------------------------------------------------------------------

#[test]
fn create_document_end_to_end() {
    let registry = setup();
    let issued = registry
        .create_document(None, "aoId-1", "123456", &[external_key(None)])
        .expect("create document");

    assert!(issued.did.starts_with("did:aospace:"));
    assert!(issued.did.ends_with("#did0"));
    assert!(issued.wrapped_password_key.len() > 4 + 16);
    assert!(!issued.document.is_empty());

    let doc = parse_document(&issued.document);
    doc.validate().expect("valid document");
    assert_eq!(doc.id, issued.did);

    let key_methods: Vec<_> = doc
        .verification_method
        .iter()
        .filter(|m| m.public_key_pem.is_some())
        .collect();
    assert!(key_methods.len() >= 3);
    for kind in [
        CredentialType::Device,
        CredentialType::Binder,
        CredentialType::PasswordOnDevice,
    ] {
        assert!(
            key_methods.iter().any(|m| m.credential_type() == Some(kind)),
            "missing {} method",
            kind
        );
    }

    let multisig = doc
        .verification_method
        .iter()
        .find(|m| m.key_type == KeyType::ConditionalProof2022)
        .expect("multisig method");
    assert!(multisig.id.ends_with("#multisig-0"));
    assert_eq!(doc.capability_invocation, vec!["#multisig-0".to_string()]);

    // Stored bytes are the canonical form of the document they encode.
    assert_eq!(canonicalize(&doc).unwrap(), issued.document);
}

#[test]
fn recovery_policy_needs_an_anchor_and_a_cosigner() {
    let registry = setup();
    let issued = registry
        .create_document(
            None,
            "aoId-1",
            "123456",
            &[
                external_key(Some(CredentialType::Binder)),
                external_key(Some(CredentialType::PasswordOnBinder)),
            ],
        )
        .unwrap();
    let doc = parse_document(&issued.document);
    let root = doc
        .verification_method
        .iter()
        .find_map(|m| m.access_structure())
        .expect("access structure");

    match &root {
        AccessNode::Or(clauses) => assert_eq!(clauses.len(), 2),
        other => panic!("expected a top-level OR, got {:?}", other),
    }

    let satisfied = |keys: &[&str]| {
        let set: HashSet<&str> = keys.iter().copied().collect();
        root.is_satisfied_by(&set)
    };
    assert!(satisfied(&["#key-0", "#key-1"]));
    assert!(satisfied(&["#key-0", "#key-2"]));
    assert!(satisfied(&["#key-1", "#key-3"]));
    assert!(!satisfied(&["#key-2", "#key-3"]));
    assert!(!satisfied(&["#key-1"]));
}

#[test]
fn tampered_binder_id_is_rejected() {
    let registry = setup();
    let mut binder = external_key(Some(CredentialType::Binder));
    binder.id = ":AAAHtMWCPnvz2q5ONvw=?credentialType=binder".into();

    let err = registry
        .create_document(None, "aoId-1", "123456", &[binder])
        .unwrap_err();
    assert!(matches!(err, IdentityError::Did(DidError::Integrity { .. })));
    assert_eq!(registry.db().record_count(), 0);
}

#[test]
fn stored_document_reconstructs_identifier() {
    let registry = setup();
    let issued = registry
        .create_document(None, "aoId-1", "123456", &[external_key(None)])
        .unwrap();

    let doc = registry
        .resolve_document(None, DidLookup::Did(&issued.did))
        .unwrap();
    let identifier = Identifier::from_document(&doc).unwrap();
    assert_eq!(identifier.did(), issued.did);
    assert!(identifier
        .relationship(Relationship::Authentication)
        .contains(&"#key-2".to_string()));
}

// ---------------------------------------------------------------------------
// Password Credential
// ---------------------------------------------------------------------------

#[test]
fn update_password_key_rotates_wrapping() {
    let registry = setup();
    let issued = registry
        .create_document(None, "aoId-1", "pw1", &[external_key(None)])
        .unwrap();
    let original = open_wrapped_key(&issued.wrapped_password_key, "pw1").unwrap();

    registry
        .update_password_key(None, "aoId-1", "pw1", "pw2")
        .unwrap();

    let stored = registry
        .get_wrapped_password_key(None, "aoId-1")
        .unwrap()
        .expect("wrapped key present");
    assert_eq!(
        open_wrapped_key(&stored, "pw2").unwrap().private_pem(),
        original.private_pem()
    );
    assert!(matches!(
        open_wrapped_key(&stored, "pw1"),
        Err(CryptoError::Decrypt) | Err(CryptoError::MalformedBlob(_))
    ));
}

#[test]
fn update_with_wrong_password_fails_cleanly() {
    let registry = setup();
    let issued = registry
        .create_document(None, "aoId-1", "pw1", &[external_key(None)])
        .unwrap();

    let err = registry
        .update_password_key(None, "aoId-1", "wrong", "pw2")
        .unwrap_err();
    assert!(matches!(err, IdentityError::Crypto(_)));
    assert_eq!(
        registry.get_wrapped_password_key(None, "aoId-1").unwrap(),
        Some(issued.wrapped_password_key)
    );
}

#[test]
fn reset_password_reissues_credential() {
    let registry = setup();
    let issued = registry
        .create_document(None, "aoId-1", "pw1", &[external_key(None)])
        .unwrap();
    let before = parse_document(&issued.document);

    let reset = registry
        .reset_password_verification_method(None, DidLookup::Did(&issued.did), "pw2")
        .unwrap();
    let after = parse_document(&reset.document);
    after.validate().unwrap();

    // The device key pins the DID.
    assert_eq!(reset.did, issued.did);

    let password_method = |doc: &Document| {
        doc.verification_method
            .iter()
            .position(|m| m.credential_type() == Some(CredentialType::PasswordOnDevice))
            .map(|i| (i, doc.verification_method[i].public_key_pem.clone()))
            .expect("password method")
    };
    let (old_index, old_pem) = password_method(&before);
    let (new_index, new_pem) = password_method(&after);
    assert_eq!(old_index, new_index);
    assert_ne!(old_pem, new_pem);

    let methods_of = |doc: &Document, kind| {
        doc.verification_method
            .iter()
            .filter(|m| m.credential_type() == Some(kind))
            .count()
    };
    assert_eq!(methods_of(&after, CredentialType::PasswordOnDevice), 1);
    assert_eq!(after.capability_invocation, vec!["#multisig-0".to_string()]);

    // Only the new password opens the stored key.
    let stored = registry
        .get_wrapped_password_key(None, "aoId-1")
        .unwrap()
        .unwrap();
    assert_eq!(stored, reset.wrapped_password_key);
    let opened = open_wrapped_key(&stored, "pw2").unwrap();
    assert_eq!(Some(opened.public_pem().to_string()), new_pem);

    assert_eq!(
        registry.get_document(None, DidLookup::AoId("aoId-1")).unwrap(),
        reset.document
    );
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

#[test]
fn identity_index_roundtrip() {
    let registry = setup();
    registry
        .save_identity_index(None, "aoId-7", "did:aospace:3QdN8wW6Ub6fQhQZ?versionTime=x#did0")
        .unwrap();

    assert_eq!(
        registry.lookup_did_by_ao_id(None, "aoId-7").unwrap().as_deref(),
        Some("did:aospace:3QdN8wW6Ub6fQhQZ")
    );
    assert_eq!(
        registry
            .lookup_ao_id_by_did(None, "did:aospace:3QdN8wW6Ub6fQhQZ#key-0")
            .unwrap()
            .as_deref(),
        Some("aoId-7")
    );
    assert_eq!(registry.lookup_ao_id_by_did(None, "did:aospace:other").unwrap(), None);
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[test]
fn failed_index_write_rolls_back_document() {
    let registry = setup();
    let db = registry.db().clone();

    let result: Result<(), IdentityError> = db.transaction(|txn| {
        records::put_document(txn, "did:aospace:abc#did0", b"{\"id\":\"did:aospace:abc\"}")?;
        assert!(records::get_document(&*txn, "did:aospace:abc")?.is_some());
        // The index write fails after the document write succeeded.
        Err(IdentityError::Transaction("index write failed".into()))
    });

    assert!(result.is_err());
    assert_eq!(records::get_document(&db, "did:aospace:abc").unwrap(), None);
    assert_eq!(registry.lookup_ao_id_by_did(None, "did:aospace:abc").unwrap(), None);
    assert_eq!(db.record_count(), 0);
}

#[test]
fn caller_transaction_groups_document_with_application_writes() {
    let registry = setup();
    let mut txn = registry.db().begin();

    let issued = registry
        .create_document(Some(&mut txn), "aoId-1", "123456", &[external_key(None)])
        .unwrap();
    txn.put("app--session--aoId-1", b"bound").unwrap();

    // Nothing is visible outside until commit.
    assert!(registry.lookup_did_by_ao_id(None, "aoId-1").unwrap().is_none());
    assert!(registry.get_wrapped_password_key(None, "aoId-1").unwrap().is_none());

    txn.rollback();
    assert_eq!(registry.db().record_count(), 0);

    // Same flow, committed this time.
    let mut txn = registry.db().begin();
    registry
        .create_document(Some(&mut txn), "aoId-1", "123456", &[external_key(None)])
        .unwrap();
    txn.put("app--session--aoId-1", b"bound").unwrap();
    txn.commit().unwrap();

    assert!(registry.db().has("app--session--aoId-1").unwrap());
    let did = registry.lookup_did_by_ao_id(None, "aoId-1").unwrap().unwrap();
    // The space key was rolled back with the first attempt, so the DID differs.
    assert_ne!(did, normalize_did(&issued.did));
}

#[test]
fn duplicate_external_key_is_rejected() {
    let registry = setup();
    let key = external_key(Some(CredentialType::Binder));
    let mut same_material = key.clone();
    same_material.id = format!(
        "{}?credentialType=passwordonbinder",
        key.id.split('?').next().unwrap()
    );

    let err = registry
        .create_document(None, "aoId-1", "123456", &[key, same_material])
        .unwrap_err();
    assert!(err.is_duplicate_key());
    assert_eq!(registry.db().record_count(), 0);
}

// ---------------------------------------------------------------------------
// Key Pool
// ---------------------------------------------------------------------------

#[test]
fn pregenerated_keys_are_consumed_once() {
    let registry = setup();
    let pool = Arc::clone(registry.custody().pool());
    spawn_pregeneration(Arc::clone(&pool))
        .expect("spawn")
        .join()
        .expect("join")
        .expect("pregenerate");

    assert!(pool.is_ready(KeyPurpose::Space));
    assert!(pool.is_ready(KeyPurpose::Password));

    registry
        .create_document(None, "aoId-1", "123456", &[external_key(None)])
        .unwrap();
    assert!(!pool.is_ready(KeyPurpose::Space));
    assert!(!pool.is_ready(KeyPurpose::Password));

    // Falls back to on-demand generation once the pool is drained.
    registry
        .create_document(None, "aoId-2", "123456", &[external_key(None)])
        .unwrap();
    assert_eq!(registry.list_accounts().unwrap().len(), 2);
}
