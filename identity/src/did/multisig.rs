//! # Multisig Access Structure
//!
//! Composes the recovery policy of a space DID from two groups of method
//! references:
//!
//! - `first`: keys that can anchor a signature set on their own behalf
//!   (device, binder).
//! - `second`: keys that only ever co-sign (the password keys).
//!
//! For every `p` in `first` the policy gains the clause
//! `p AND (any other key)`, and the clauses are joined by one top-level
//! `OR`. With `first = [device, binder]` and `second = [pw-dev, pw-bind]`
//! that reads "two keys, at least one of which is device or binder".

use rand::RngCore;

use super::document::{AccessNode, VerificationKey};
use super::identifier::{Identifier, Relationship};
use super::DidError;
use crate::config::MULTISIG_FRAGMENT;
use crate::crypto::hash::verification_hash;

/// Build the access-structure tree over `first` and `second`.
///
/// Requires at least one reference in `first` and at least two distinct
/// references overall. Duplicates are collapsed, first occurrence wins.
pub fn compose_access_structure(
    first: &[String],
    second: &[String],
) -> Result<AccessNode, DidError> {
    if first.is_empty() {
        return Err(DidError::InvalidMultisig(
            "the first group needs at least one key".into(),
        ));
    }

    let mut all: Vec<&str> = Vec::with_capacity(first.len() + second.len());
    for reference in first.iter().chain(second) {
        if !all.contains(&reference.as_str()) {
            all.push(reference);
        }
    }
    if all.len() < 2 {
        return Err(DidError::InvalidMultisig(format!(
            "need at least two distinct keys, got {}",
            all.len()
        )));
    }

    let mut clauses = Vec::with_capacity(first.len());
    let mut anchored: Vec<&str> = Vec::with_capacity(first.len());
    for anchor in first {
        if anchored.contains(&anchor.as_str()) {
            continue;
        }
        anchored.push(anchor);

        let others = all
            .iter()
            .filter(|r| **r != anchor.as_str())
            .map(|r| AccessNode::key(*r))
            .collect();
        clauses.push(AccessNode::And(vec![
            AccessNode::key(anchor.as_str()),
            AccessNode::Or(others),
        ]));
    }

    Ok(AccessNode::Or(clauses))
}

impl Identifier {
    /// Compose the access structure and install it as the `#multisig-0`
    /// method, referenced from `capabilityInvocation`.
    ///
    /// An existing multisig node is replaced. The node id is content
    /// addressed on a fresh random seed, so every composition yields a new
    /// id. Returns that id.
    pub fn add_multisig_method(
        &mut self,
        first: &[String],
        second: &[String],
    ) -> Result<String, DidError> {
        let root = compose_access_structure(first, second)?;

        for reference in root.references() {
            if self.verification_method(reference).is_none() {
                return Err(DidError::InvalidMultisig(format!(
                    "unknown method reference '{}'",
                    reference
                )));
            }
        }

        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        let id = format!(
            "{}#{}",
            Identifier::verification_did(&verification_hash(&seed)),
            MULTISIG_FRAGMENT
        );

        self.remove_verification_method_by_fragment(MULTISIG_FRAGMENT);
        let node = VerificationKey::with_access_structure(
            id.clone(),
            format!("#{}", self.fragment()),
            root,
        );
        self.insert_method(node, None);
        self.add_relationship(
            Relationship::CapabilityInvocation,
            format!("#{}", MULTISIG_FRAGMENT),
        );
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
