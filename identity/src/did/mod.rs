//! # `did:aospace` Identifiers and Documents
//!
//! - **parser**: DID URL scanner.
//! - **identifier**: mutable working state of one DID.
//! - **document**: serializable snapshot, verification methods, access
//!   structures.
//! - **builder**: creates the device, binder and password methods of a
//!   space DID and their relationships.
//! - **multisig**: composes the threshold access structure over them.
//! - **canonical**: RFC 8785 JSON canonicalization of snapshots.

pub mod builder;
pub mod canonical;
pub mod document;
pub mod identifier;
pub mod multisig;
pub mod parser;

use thiserror::Error;

pub use builder::{compose_recovery, BinderKey, BuiltMethod, VerificationMethodBuilder};
pub use canonical::{canonicalize, canonicalize_value};
pub use document::{AccessNode, CredentialType, Document, KeyType, VerificationKey};
pub use identifier::{Identifier, Relationship};
pub use multisig::compose_access_structure;
pub use parser::{parse, Param, ParseError, ParsedDid};

/// Errors from manipulating identifiers and documents.
#[derive(Debug, Error)]
pub enum DidError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("verification method with key hash {hash} already exists")]
    DuplicateKey { hash: String },

    #[error("binder key does not match its declared id {id}")]
    Integrity { id: String },

    #[error("verification method {id} has no public key material")]
    MissingKeyMaterial { id: String },

    #[error("invalid access structure: {0}")]
    InvalidMultisig(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
