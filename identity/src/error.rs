//! Crate-level error type returned by the key custody layer and the
//! registry operations.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::did::{DidError, ParseError};
use crate::storage::DbError;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Did(#[from] DidError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("storage error: {0}")]
    Storage(DbError),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<DbError> for IdentityError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Transaction(message) => IdentityError::Transaction(message),
            other => IdentityError::Storage(other),
        }
    }
}

impl IdentityError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, IdentityError::NotFound(_))
    }

    /// A verification method with the same key material already exists.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, IdentityError::Did(DidError::DuplicateKey { .. }))
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_failures_keep_their_kind() {
        let err = IdentityError::from(DbError::Transaction("commit".into()));
        assert!(matches!(err, IdentityError::Transaction(_)));

        let err = IdentityError::from(DbError::Serialization("bad utf-8".into()));
        assert!(matches!(err, IdentityError::Storage(_)));
    }

    #[test]
    fn classification_helpers() {
        assert!(IdentityError::NotFound("aoId-1".into()).is_not_found());
        let dup = IdentityError::from(DidError::DuplicateKey { hash: "AAA".into() });
        assert!(dup.is_duplicate_key());
        assert!(!dup.is_not_found());
    }

    #[test]
    fn display_carries_context() {
        let err = IdentityError::NotFound("document for aoId aoId-1".into());
        assert_eq!(err.to_string(), "not found: document for aoId aoId-1");
    }
}
