//! # Identifier: Mutable DID Working State
//!
//! An [`Identifier`] is the single-writer, in-memory form of one space DID.
//! Verification methods are added and removed here; a [`Document`] is taken
//! as a snapshot whenever the result has to be hashed, stored or sent.
//!
//! ## Derived id-string
//!
//! The method-specific id of `did:aospace:<id>` is not settable. It is
//! `aospace_id(pem)` of one method's PEM public key, recomputed after every
//! mutation. The source method is the `device` credential when one exists,
//! otherwise the first PEM-carrying method in list order. Pinning it to the
//! device key keeps the DID stable across password resets and reorderings.
//!
//! `Identifier` is not `Sync`-safe for concurrent mutation in any useful
//! sense: callers keep one per request, or lock per account.

use std::fmt;
use tracing::debug;

use super::document::{CredentialType, Document, KeyType, VerificationKey};
use super::parser::{self, Param, ParseError};
use super::DidError;
use crate::config::{DEFAULT_CONTEXTS, DEFAULT_FRAGMENT, DID_METHOD, VERIFICATION_DID_METHOD};
use crate::crypto::hash::{aospace_id, verification_hash};

/// The five verification relationships of a DID document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    Authentication,
    AssertionMethod,
    KeyAgreement,
    CapabilityInvocation,
    CapabilityDelegation,
}

/// Mutable working state of one DID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    method: String,
    id_string: String,
    params: Vec<Param>,
    path_segments: Vec<String>,
    query: Option<String>,
    fragment: Option<String>,

    context: Vec<String>,
    controller: Option<String>,
    verification_methods: Vec<VerificationKey>,

    authentication: Vec<String>,
    assertion_method: Vec<String>,
    key_agreement: Vec<String>,
    capability_invocation: Vec<String>,
    capability_delegation: Vec<String>,
}

impl Default for Identifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Identifier {
    /// An empty `did:aospace` identifier with the default contexts and
    /// fragment.
    pub fn new() -> Self {
        Self {
            method: DID_METHOD.to_string(),
            id_string: String::new(),
            params: Vec::new(),
            path_segments: Vec::new(),
            query: None,
            fragment: None,
            context: DEFAULT_CONTEXTS.iter().map(|c| c.to_string()).collect(),
            controller: None,
            verification_methods: Vec::new(),
            authentication: Vec::new(),
            assertion_method: Vec::new(),
            key_agreement: Vec::new(),
            capability_invocation: Vec::new(),
            capability_delegation: Vec::new(),
        }
    }

    /// Parse a DID URL into an identifier with no verification methods.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let parsed = parser::parse(input)?;
        Ok(Self {
            method: parsed.method,
            id_string: parsed.id,
            params: parsed.params,
            path_segments: parsed.path_segments,
            query: parsed.query,
            fragment: parsed.fragment,
            ..Self::new()
        })
    }

    /// Rebuild working state from a stored document.
    ///
    /// Fails if the subject id does not match the one derived from the
    /// document's own key material.
    pub fn from_document(document: &Document) -> Result<Self, DidError> {
        let mut identifier = Self::parse(&document.id)?;
        identifier.context = document.context.clone();
        identifier.controller = document.controller.clone();
        identifier.verification_methods = document.verification_method.clone();
        identifier.authentication = document.authentication.clone();
        identifier.assertion_method = document.assertion_method.clone();
        identifier.key_agreement = document.key_agreement.clone();
        identifier.capability_invocation = document.capability_invocation.clone();
        identifier.capability_delegation = document.capability_delegation.clone();

        let parsed_id = identifier.id_string.clone();
        identifier.refresh_id_string();
        if identifier.id_string != parsed_id {
            return Err(DidError::InvalidDocument(format!(
                "subject id '{}' does not match its key material (expected '{}')",
                parsed_id, identifier.id_string
            )));
        }
        Ok(identifier)
    }

    // -- Accessors ----------------------------------------------------------

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn id_string(&self) -> &str {
        &self.id_string
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn path_segments(&self) -> &[String] {
        &self.path_segments
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The identifier's own fragment, `did0` unless parsed otherwise.
    pub fn fragment(&self) -> &str {
        self.fragment.as_deref().unwrap_or(DEFAULT_FRAGMENT)
    }

    pub fn controller(&self) -> Option<&str> {
        self.controller.as_deref()
    }

    pub fn verification_methods(&self) -> &[VerificationKey] {
        &self.verification_methods
    }

    /// The space DID: `did:aospace:<id>#<fragment>`.
    pub fn did(&self) -> String {
        format!("did:{}:{}#{}", DID_METHOD, self.id_string, self.fragment())
    }

    /// The per-key sub-identifier `did:aospacekey:<hash>`.
    pub fn verification_did(hash: &str) -> String {
        format!("did:{}:{}", VERIFICATION_DID_METHOD, hash)
    }

    /// Look up a method by fragment, with or without the leading `#`.
    pub fn verification_method(&self, fragment: &str) -> Option<&VerificationKey> {
        let fragment = fragment.trim_start_matches('#');
        self.verification_methods
            .iter()
            .find(|m| m.fragment() == Some(fragment))
    }

    /// Methods issued for the given credential type, in list order.
    pub fn methods_of_credential_type(&self, kind: CredentialType) -> Vec<&VerificationKey> {
        self.verification_methods
            .iter()
            .filter(|m| m.credential_type() == Some(kind))
            .collect()
    }

    /// Index of the first method issued for the given credential type.
    pub fn position_of_credential_type(&self, kind: CredentialType) -> Option<usize> {
        self.verification_methods
            .iter()
            .position(|m| m.credential_type() == Some(kind))
    }

    pub fn relationship(&self, relationship: Relationship) -> &[String] {
        match relationship {
            Relationship::Authentication => &self.authentication,
            Relationship::AssertionMethod => &self.assertion_method,
            Relationship::KeyAgreement => &self.key_agreement,
            Relationship::CapabilityInvocation => &self.capability_invocation,
            Relationship::CapabilityDelegation => &self.capability_delegation,
        }
    }

    fn relationship_mut(&mut self, relationship: Relationship) -> &mut Vec<String> {
        match relationship {
            Relationship::Authentication => &mut self.authentication,
            Relationship::AssertionMethod => &mut self.assertion_method,
            Relationship::KeyAgreement => &mut self.key_agreement,
            Relationship::CapabilityInvocation => &mut self.capability_invocation,
            Relationship::CapabilityDelegation => &mut self.capability_delegation,
        }
    }

    // -- Mutation -----------------------------------------------------------

    /// Reference a method fragment from a relationship list. No-op if the
    /// reference is already listed.
    pub fn add_relationship(&mut self, relationship: Relationship, reference: impl Into<String>) {
        let reference = reference.into();
        let list = self.relationship_mut(relationship);
        if !list.contains(&reference) {
            list.push(reference);
        }
    }

    /// Add a PEM public-key method.
    ///
    /// The method id is `did:aospacekey:<hash>?<query>#<fragment>` with
    /// `hash = verification_hash(public_key_pem)`. Fails with
    /// [`DidError::DuplicateKey`] when a method with the same key hash is
    /// already present, leaving the identifier untouched. `index` inserts at
    /// a position instead of appending (clamped to the list length).
    ///
    /// Returns the new method id.
    pub fn add_verification_method(
        &mut self,
        key_type: KeyType,
        public_key_pem: &str,
        query: &str,
        fragment: &str,
        index: Option<usize>,
    ) -> Result<String, DidError> {
        let hash = verification_hash(public_key_pem.as_bytes());
        if self
            .verification_methods
            .iter()
            .any(|m| m.material_hash().as_deref() == Some(hash.as_str()))
        {
            return Err(DidError::DuplicateKey { hash });
        }

        let mut id = Self::verification_did(&hash);
        if !query.is_empty() {
            id.push('?');
            id.push_str(query);
        }
        id.push('#');
        id.push_str(fragment.trim_start_matches('#'));

        let method = VerificationKey::with_pem(
            id.clone(),
            key_type,
            format!("#{}", self.fragment()),
            public_key_pem,
        );
        self.insert_method(method, index);
        debug!(method = %id, "verification method added");
        Ok(id)
    }

    /// Insert a fully formed method (used for access-structure nodes).
    pub(crate) fn insert_method(&mut self, method: VerificationKey, index: Option<usize>) {
        match index {
            Some(i) => {
                let i = i.min(self.verification_methods.len());
                self.verification_methods.insert(i, method);
            }
            None => self.verification_methods.push(method),
        }
        self.refresh_id_string();
    }

    /// Remove every method whose id contains `query_fragment`.
    ///
    /// Relationship references to removed fragments are dropped with them.
    /// Returns how many methods were removed; zero is not an error.
    pub fn delete_verification_method_of_query(&mut self, query_fragment: &str) -> usize {
        self.remove_methods_where(|m| m.id.contains(query_fragment))
    }

    /// Remove methods whose fragment equals `fragment` (leading `#` optional).
    pub fn remove_verification_method_by_fragment(&mut self, fragment: &str) -> usize {
        let fragment = fragment.trim_start_matches('#');
        self.remove_methods_where(|m| m.fragment() == Some(fragment))
    }

    fn remove_methods_where(&mut self, predicate: impl Fn(&VerificationKey) -> bool) -> usize {
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .verification_methods
            .drain(..)
            .partition(|m| predicate(m));
        self.verification_methods = kept;

        let dangling: Vec<String> = removed.iter().filter_map(|m| m.reference()).collect();
        for list in [
            &mut self.authentication,
            &mut self.assertion_method,
            &mut self.key_agreement,
            &mut self.capability_invocation,
            &mut self.capability_delegation,
        ] {
            list.retain(|r| !dangling.contains(r));
        }

        self.refresh_id_string();
        if !removed.is_empty() {
            debug!(removed = removed.len(), dangling = dangling.len(), "verification methods removed");
        }
        removed.len()
    }

    /// PEM key the derived id-string is computed from.
    fn id_source_pem(&self) -> Option<&str> {
        self.methods_of_credential_type(CredentialType::Device)
            .into_iter()
            .find_map(|m| m.public_key_pem.as_deref())
            .or_else(|| {
                self.verification_methods
                    .iter()
                    .find_map(|m| m.public_key_pem.as_deref())
            })
    }

    fn refresh_id_string(&mut self) {
        self.id_string = self
            .id_source_pem()
            .map(|pem| aospace_id(pem.as_bytes()))
            .unwrap_or_default();
    }

    // -- Snapshot -----------------------------------------------------------

    /// Take an immutable document snapshot.
    pub fn to_document(&self) -> Document {
        Document {
            context: self.context.clone(),
            id: self.did(),
            controller: self.controller.clone(),
            verification_method: self.verification_methods.clone(),
            authentication: self.authentication.clone(),
            assertion_method: self.assertion_method.clone(),
            key_agreement: self.key_agreement.clone(),
            capability_invocation: self.capability_invocation.clone(),
            capability_delegation: self.capability_delegation.clone(),
        }
    }
}

impl fmt::Display for Identifier {
    /// The full DID URL, including any parsed parameters, path and query.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}", self.method, self.id_string)?;
        for param in &self.params {
            write!(f, ";{}", param.name)?;
            if let Some(value) = &param.value {
                write!(f, "={}", value)?;
            }
        }
        for segment in &self.path_segments {
            write!(f, "/{}", segment)?;
        }
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
