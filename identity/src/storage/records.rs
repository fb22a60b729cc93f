//! # Identity Records
//!
//! Typed accessors over the prefix-namespaced record keys:
//!
//! | Key                                 | Value                       |
//! |-------------------------------------|-----------------------------|
//! | `key--space_rsa_pri--<aoId>`        | PKCS#1 private PEM, clear   |
//! | `key--password_rsa_pri--<aoId>`     | wrapped private PEM         |
//! | `doc--did_doc--<did>`               | canonical document bytes    |
//! | `index--aoid_to_did--<aoId>`        | normalized DID (UTF-8)      |
//! | `index--did_to_aoid--<did>`         | aoId (UTF-8)                |
//!
//! DID-keyed records always use the normalized DID: any `?query` or
//! `#fragment` suffix is stripped first. Every helper is generic over
//! [`KvStore`], so it runs against the store directly or inside a
//! transaction.

use super::db::{DbError, DbResult, KvStore};
use crate::config::{
    PREFIX_DOC, PREFIX_INDEX, PREFIX_KEY, RECORD_AOID_TO_DID, RECORD_DID_DOC,
    RECORD_DID_TO_AOID, RECORD_PASSWORD_KEY, RECORD_SEPARATOR, RECORD_SPACE_KEY,
};

/// Strip any `?query` or `#fragment` suffix from a DID.
pub fn normalize_did(did: &str) -> &str {
    let end = did.find(|c: char| c == '?' || c == '#').unwrap_or(did.len());
    &did[..end]
}

fn record_key(prefix: &str, kind: &str, id: &str) -> String {
    [prefix, kind, id].join(RECORD_SEPARATOR)
}

pub fn space_key_record(ao_id: &str) -> String {
    record_key(PREFIX_KEY, RECORD_SPACE_KEY, ao_id)
}

pub fn password_key_record(ao_id: &str) -> String {
    record_key(PREFIX_KEY, RECORD_PASSWORD_KEY, ao_id)
}

pub fn document_record(did: &str) -> String {
    record_key(PREFIX_DOC, RECORD_DID_DOC, normalize_did(did))
}

pub fn aoid_to_did_record(ao_id: &str) -> String {
    record_key(PREFIX_INDEX, RECORD_AOID_TO_DID, ao_id)
}

pub fn did_to_aoid_record(did: &str) -> String {
    record_key(PREFIX_INDEX, RECORD_DID_TO_AOID, normalize_did(did))
}

/// Prefix shared by every `aoId -> DID` index record.
pub fn aoid_to_did_prefix() -> String {
    record_key(PREFIX_INDEX, RECORD_AOID_TO_DID, "")
}

fn utf8(bytes: Vec<u8>, what: &str) -> DbResult<String> {
    String::from_utf8(bytes).map_err(|e| DbError::Serialization(format!("{}: {}", what, e)))
}

// -- Keys -------------------------------------------------------------------

pub fn get_space_key<S: KvStore + ?Sized>(store: &S, ao_id: &str) -> DbResult<Option<String>> {
    store
        .get(&space_key_record(ao_id))?
        .map(|bytes| utf8(bytes, "space key"))
        .transpose()
}

pub fn put_space_key<S: KvStore + ?Sized>(
    store: &mut S,
    ao_id: &str,
    private_pem: &str,
) -> DbResult<()> {
    store.put(&space_key_record(ao_id), private_pem.as_bytes())
}

pub fn get_password_key<S: KvStore + ?Sized>(
    store: &S,
    ao_id: &str,
) -> DbResult<Option<Vec<u8>>> {
    store.get(&password_key_record(ao_id))
}

pub fn put_password_key<S: KvStore + ?Sized>(
    store: &mut S,
    ao_id: &str,
    wrapped: &[u8],
) -> DbResult<()> {
    store.put(&password_key_record(ao_id), wrapped)
}

pub fn delete_password_key<S: KvStore + ?Sized>(store: &mut S, ao_id: &str) -> DbResult<()> {
    store.delete(&password_key_record(ao_id))
}

// -- Documents --------------------------------------------------------------

pub fn get_document<S: KvStore + ?Sized>(store: &S, did: &str) -> DbResult<Option<Vec<u8>>> {
    store.get(&document_record(did))
}

pub fn put_document<S: KvStore + ?Sized>(
    store: &mut S,
    did: &str,
    canonical: &[u8],
) -> DbResult<()> {
    store.put(&document_record(did), canonical)
}

pub fn delete_document<S: KvStore + ?Sized>(store: &mut S, did: &str) -> DbResult<()> {
    store.delete(&document_record(did))
}

// -- Indexes ----------------------------------------------------------------

/// Write both directions of the `aoId <-> DID` index.
///
/// Re-pointing an account drops the reverse record of its previous DID,
/// and re-assigning a DID drops the forward record of its previous owner,
/// so the mapping stays one-to-one.
pub fn save_identity_index<S: KvStore + ?Sized>(
    store: &mut S,
    ao_id: &str,
    did: &str,
) -> DbResult<()> {
    let did = normalize_did(did);
    if let Some(previous_did) = lookup_did_by_ao_id(&*store, ao_id)? {
        if previous_did != did {
            store.delete(&did_to_aoid_record(&previous_did))?;
        }
    }
    if let Some(previous_owner) = lookup_ao_id_by_did(&*store, did)? {
        if previous_owner != ao_id {
            store.delete(&aoid_to_did_record(&previous_owner))?;
        }
    }
    store.put(&aoid_to_did_record(ao_id), did.as_bytes())?;
    store.put(&did_to_aoid_record(did), ao_id.as_bytes())
}

/// The normalized DID of an account.
pub fn lookup_did_by_ao_id<S: KvStore + ?Sized>(
    store: &S,
    ao_id: &str,
) -> DbResult<Option<String>> {
    store
        .get(&aoid_to_did_record(ao_id))?
        .map(|bytes| utf8(bytes, "indexed DID"))
        .transpose()
}

/// The account owning a DID. Query and fragment are ignored.
pub fn lookup_ao_id_by_did<S: KvStore + ?Sized>(
    store: &S,
    did: &str,
) -> DbResult<Option<String>> {
    store
        .get(&did_to_aoid_record(did))?
        .map(|bytes| utf8(bytes, "indexed aoId"))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::IdentityDb;

    #[test]
    fn normalize_strips_query_and_fragment() {
        assert_eq!(normalize_did("did:aospace:abc"), "did:aospace:abc");
        assert_eq!(normalize_did("did:aospace:abc#did0"), "did:aospace:abc");
        assert_eq!(normalize_did("did:aospace:abc?x=1#did0"), "did:aospace:abc");
        assert_eq!(normalize_did("did:aospace:abc#a?b"), "did:aospace:abc");
    }

    #[test]
    fn record_key_layout() {
        assert_eq!(space_key_record("aoId-1"), "key--space_rsa_pri--aoId-1");
        assert_eq!(password_key_record("aoId-1"), "key--password_rsa_pri--aoId-1");
        assert_eq!(document_record("did:aospace:x#did0"), "doc--did_doc--did:aospace:x");
        assert_eq!(aoid_to_did_record("aoId-1"), "index--aoid_to_did--aoId-1");
        assert_eq!(did_to_aoid_record("did:aospace:x?q"), "index--did_to_aoid--did:aospace:x");
        assert_eq!(aoid_to_did_prefix(), "index--aoid_to_did--");
    }

    #[test]
    fn index_roundtrip_normalizes() {
        let mut db = IdentityDb::open_temporary().unwrap();
        save_identity_index(&mut db, "aoId-1", "did:aospace:abc?v=1#did0").unwrap();

        assert_eq!(
            lookup_did_by_ao_id(&db, "aoId-1").unwrap().as_deref(),
            Some("did:aospace:abc")
        );
        assert_eq!(
            lookup_ao_id_by_did(&db, "did:aospace:abc#key-0").unwrap().as_deref(),
            Some("aoId-1")
        );
        assert_eq!(lookup_did_by_ao_id(&db, "aoId-2").unwrap(), None);
    }

    #[test]
    fn repointing_an_account_drops_the_old_reverse_record() {
        let mut db = IdentityDb::open_temporary().unwrap();
        save_identity_index(&mut db, "aoId-1", "did:aospace:one").unwrap();
        save_identity_index(&mut db, "aoId-1", "did:aospace:two#did0").unwrap();

        assert_eq!(
            lookup_did_by_ao_id(&db, "aoId-1").unwrap().as_deref(),
            Some("did:aospace:two")
        );
        assert_eq!(
            lookup_ao_id_by_did(&db, "did:aospace:two").unwrap().as_deref(),
            Some("aoId-1")
        );
        assert!(lookup_ao_id_by_did(&db, "did:aospace:one").unwrap().is_none());
    }

    #[test]
    fn reassigning_a_did_drops_the_old_owner() {
        let mut db = IdentityDb::open_temporary().unwrap();
        save_identity_index(&mut db, "aoId-1", "did:aospace:one").unwrap();
        save_identity_index(&mut db, "aoId-2", "did:aospace:one").unwrap();

        assert!(lookup_did_by_ao_id(&db, "aoId-1").unwrap().is_none());
        assert_eq!(
            lookup_ao_id_by_did(&db, "did:aospace:one").unwrap().as_deref(),
            Some("aoId-2")
        );
    }

    #[test]
    fn saving_the_same_pair_twice_is_idempotent() {
        let mut db = IdentityDb::open_temporary().unwrap();
        save_identity_index(&mut db, "aoId-1", "did:aospace:one").unwrap();
        save_identity_index(&mut db, "aoId-1", "did:aospace:one?x=1").unwrap();
        assert_eq!(
            lookup_ao_id_by_did(&db, "did:aospace:one").unwrap().as_deref(),
            Some("aoId-1")
        );
        assert_eq!(
            lookup_did_by_ao_id(&db, "aoId-1").unwrap().as_deref(),
            Some("did:aospace:one")
        );
    }

    #[test]
    fn documents_keyed_by_normalized_did() {
        let mut db = IdentityDb::open_temporary().unwrap();
        put_document(&mut db, "did:aospace:abc#did0", b"{}").unwrap();
        assert_eq!(get_document(&db, "did:aospace:abc").unwrap(), Some(b"{}".to_vec()));
        delete_document(&mut db, "did:aospace:abc?x").unwrap();
        assert_eq!(get_document(&db, "did:aospace:abc").unwrap(), None);
    }

    #[test]
    fn key_records_inside_transaction() {
        let db = IdentityDb::open_temporary().unwrap();
        let mut txn = db.begin();
        put_space_key(&mut txn, "a", "PEM").unwrap();
        put_password_key(&mut txn, "a", &[1, 2, 3]).unwrap();

        assert_eq!(get_space_key(&txn, "a").unwrap().as_deref(), Some("PEM"));
        assert_eq!(get_space_key(&db, "a").unwrap(), None);

        delete_password_key(&mut txn, "a").unwrap();
        assert_eq!(get_password_key(&txn, "a").unwrap(), None);
        txn.commit().unwrap();

        assert_eq!(get_space_key(&db, "a").unwrap().as_deref(), Some("PEM"));
        assert_eq!(get_password_key(&db, "a").unwrap(), None);
    }
}
