//! # DID Document Types
//!
//! The immutable snapshot of an identifier, in the JSON shape exchanged with
//! peers:
//!
//! ```text
//! {
//!   "@context": [...],
//!   "id": "did:aospace:<id>#did0",
//!   "verificationMethod": [
//!     { "id": "did:aospacekey:<hash>?versionTime=..&credentialType=device#key-0",
//!       "type": "RsaVerificationKey2018", "controller": "#did0",
//!       "publicKeyPem": "-----BEGIN PUBLIC KEY-----..." },
//!     { "id": "did:aospacekey:<hash>#multisig-0",
//!       "type": "ConditionalProof2022", "controller": "#did0",
//!       "conditionOr": [ { "type": "ConditionalProof2022",
//!                          "conditionAnd": ["#key-0", {...}] }, ... ] }
//!   ],
//!   "authentication": ["#key-0", ...],
//!   "capabilityInvocation": ["#multisig-0"]
//! }
//! ```
//!
//! Access structures are modelled as the tagged [`AccessNode`] tree and
//! flattened back to the mixed string/object arrays on the wire.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::DidError;
use crate::config::{DID_METHOD, QUERY_CREDENTIAL_TYPE, VERIFICATION_DID_METHOD};
use crate::crypto::hash::verification_hash;

// ---------------------------------------------------------------------------
// Key Types
// ---------------------------------------------------------------------------

/// Verification method type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    Ed25519VerificationKey2020,
    RsaVerificationKey2018,
    EcdsaSecp256k1VerificationKey2019,
    /// Access-structure pseudo type of multisig nodes.
    ConditionalProof2022,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ed25519VerificationKey2020 => "Ed25519VerificationKey2020",
            KeyType::RsaVerificationKey2018 => "RsaVerificationKey2018",
            KeyType::EcdsaSecp256k1VerificationKey2019 => "EcdsaSecp256k1VerificationKey2019",
            KeyType::ConditionalProof2022 => "ConditionalProof2022",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `credentialType` a verification method was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialType {
    /// The device's own space key.
    Device,
    /// A key held by the paired client ("binder").
    Binder,
    /// Password-gated key custodied on this device.
    PasswordOnDevice,
    /// Password-gated key custodied by the binder.
    PasswordOnBinder,
}

impl CredentialType {
    pub const ALL: [CredentialType; 4] = [
        CredentialType::Device,
        CredentialType::Binder,
        CredentialType::PasswordOnDevice,
        CredentialType::PasswordOnBinder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::Device => "device",
            CredentialType::Binder => "binder",
            CredentialType::PasswordOnDevice => "passwordondevice",
            CredentialType::PasswordOnBinder => "passwordonbinder",
        }
    }

    pub fn from_query_value(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }

    /// The `credentialType=<type>` query pair.
    pub fn query_pair(&self) -> String {
        format!("{}={}", QUERY_CREDENTIAL_TYPE, self.as_str())
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Access Structures
// ---------------------------------------------------------------------------

/// A boolean access-structure over verification method references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireNode", into = "WireNode")]
pub enum AccessNode {
    /// Reference to a verification method fragment, e.g. `#key-0`.
    KeyRef(String),
    And(Vec<AccessNode>),
    Or(Vec<AccessNode>),
}

impl AccessNode {
    pub fn key(reference: impl Into<String>) -> Self {
        AccessNode::KeyRef(reference.into())
    }

    /// Every key reference in the tree, depth first.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            AccessNode::KeyRef(r) => out.push(r),
            AccessNode::And(children) | AccessNode::Or(children) => {
                for child in children {
                    child.collect_references(out);
                }
            }
        }
    }

    /// Evaluate the policy against a set of satisfied key references.
    pub fn is_satisfied_by(&self, satisfied: &HashSet<&str>) -> bool {
        match self {
            AccessNode::KeyRef(r) => satisfied.contains(r.as_str()),
            AccessNode::And(children) => children.iter().all(|c| c.is_satisfied_by(satisfied)),
            AccessNode::Or(children) => children.iter().any(|c| c.is_satisfied_by(satisfied)),
        }
    }
}

/// Wire shape of an access node: either a bare reference string or a
/// verification-method-shaped object carrying `conditionAnd`/`conditionOr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireNode {
    Ref(String),
    Node(WireCondition),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireCondition {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    node_type: Option<KeyType>,
    #[serde(rename = "conditionAnd", default, skip_serializing_if = "Option::is_none")]
    condition_and: Option<Vec<AccessNode>>,
    #[serde(rename = "conditionOr", default, skip_serializing_if = "Option::is_none")]
    condition_or: Option<Vec<AccessNode>>,
}

impl From<AccessNode> for WireNode {
    fn from(node: AccessNode) -> Self {
        match node {
            AccessNode::KeyRef(r) => WireNode::Ref(r),
            AccessNode::And(children) => WireNode::Node(WireCondition {
                node_type: Some(KeyType::ConditionalProof2022),
                condition_and: Some(children),
                condition_or: None,
            }),
            AccessNode::Or(children) => WireNode::Node(WireCondition {
                node_type: Some(KeyType::ConditionalProof2022),
                condition_and: None,
                condition_or: Some(children),
            }),
        }
    }
}

impl TryFrom<WireNode> for AccessNode {
    type Error = String;

    fn try_from(wire: WireNode) -> Result<Self, Self::Error> {
        match wire {
            WireNode::Ref(r) => Ok(AccessNode::KeyRef(r)),
            WireNode::Node(cond) => match (cond.condition_and, cond.condition_or) {
                (Some(children), None) => Ok(AccessNode::And(children)),
                (None, Some(children)) => Ok(AccessNode::Or(children)),
                (Some(_), Some(_)) => {
                    Err("access node carries both conditionAnd and conditionOr".into())
                }
                (None, None) => Err("access node carries neither conditionAnd nor conditionOr".into()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Verification Methods
// ---------------------------------------------------------------------------

/// One verification method: a public key, or an access-structure node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    /// `did:aospacekey:<hash>?<query>#<fragment>`.
    pub id: String,

    #[serde(rename = "type")]
    pub key_type: KeyType,

    pub controller: String,

    #[serde(rename = "publicKeyPem", default, skip_serializing_if = "Option::is_none")]
    pub public_key_pem: Option<String>,

    #[serde(rename = "publicKeyBase58", default, skip_serializing_if = "Option::is_none")]
    pub public_key_base58: Option<String>,

    #[serde(rename = "publicKeyMultibase", default, skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,

    #[serde(rename = "conditionAnd", default, skip_serializing_if = "Option::is_none")]
    pub condition_and: Option<Vec<AccessNode>>,

    #[serde(rename = "conditionOr", default, skip_serializing_if = "Option::is_none")]
    pub condition_or: Option<Vec<AccessNode>>,
}

impl VerificationKey {
    /// A public-key method carrying PEM material.
    pub fn with_pem(
        id: impl Into<String>,
        key_type: KeyType,
        controller: impl Into<String>,
        public_key_pem: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            key_type,
            controller: controller.into(),
            public_key_pem: Some(public_key_pem.into()),
            public_key_base58: None,
            public_key_multibase: None,
            condition_and: None,
            condition_or: None,
        }
    }

    /// An access-structure method whose root is `root`.
    ///
    /// A bare key reference at the root is wrapped in a one-element `OR`.
    pub fn with_access_structure(
        id: impl Into<String>,
        controller: impl Into<String>,
        root: AccessNode,
    ) -> Self {
        let (condition_and, condition_or) = match root {
            AccessNode::And(children) => (Some(children), None),
            AccessNode::Or(children) => (None, Some(children)),
            key @ AccessNode::KeyRef(_) => (None, Some(vec![key])),
        };
        Self {
            id: id.into(),
            key_type: KeyType::ConditionalProof2022,
            controller: controller.into(),
            public_key_pem: None,
            public_key_base58: None,
            public_key_multibase: None,
            condition_and,
            condition_or,
        }
    }

    /// The access-structure rooted at this method, if it is a multisig node.
    pub fn access_structure(&self) -> Option<AccessNode> {
        match (&self.condition_and, &self.condition_or) {
            (Some(children), _) => Some(AccessNode::And(children.clone())),
            (None, Some(children)) => Some(AccessNode::Or(children.clone())),
            (None, None) => None,
        }
    }

    /// Published public key material, preferring PEM.
    pub fn public_key_material(&self) -> Option<&str> {
        self.public_key_pem
            .as_deref()
            .or(self.public_key_base58.as_deref())
            .or(self.public_key_multibase.as_deref())
    }

    /// `verification_hash` of the public key material. Uniqueness of
    /// methods within an identifier is keyed on this value.
    pub fn material_hash(&self) -> Option<String> {
        self.public_key_material()
            .map(|material| verification_hash(material.as_bytes()))
    }

    /// The part of the id after `#`, if any.
    pub fn fragment(&self) -> Option<&str> {
        self.id.split_once('#').map(|(_, fragment)| fragment)
    }

    /// `#<fragment>`, the form used in relationship lists and access nodes.
    pub fn reference(&self) -> Option<String> {
        self.fragment().map(|f| format!("#{}", f))
    }

    /// The query between `?` and `#`, if any.
    pub fn query(&self) -> Option<&str> {
        let without_fragment = self.id.split('#').next().unwrap_or_default();
        without_fragment.split_once('?').map(|(_, query)| query)
    }

    /// `name=value` pairs of the query in order. Pairs without `=` get an
    /// empty value.
    pub fn query_params(&self) -> Vec<(&str, &str)> {
        self.query()
            .map(|query| {
                query
                    .split('&')
                    .filter(|pair| !pair.is_empty())
                    .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The `credentialType` query parameter, when present and recognized.
    pub fn credential_type(&self) -> Option<CredentialType> {
        self.query_params()
            .into_iter()
            .find(|(name, _)| *name == QUERY_CREDENTIAL_TYPE)
            .and_then(|(_, value)| CredentialType::from_query_value(value))
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Immutable snapshot of an identifier.
///
/// Produced by [`Identifier::to_document`](super::Identifier::to_document);
/// mutate the identifier and take a new snapshot instead of editing this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// Subject DID, e.g. `did:aospace:<id>#did0`.
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    #[serde(rename = "verificationMethod", default)]
    pub verification_method: Vec<VerificationKey>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<String>,

    #[serde(rename = "assertionMethod", default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<String>,

    #[serde(rename = "keyAgreement", default, skip_serializing_if = "Vec::is_empty")]
    pub key_agreement: Vec<String>,

    #[serde(rename = "capabilityInvocation", default, skip_serializing_if = "Vec::is_empty")]
    pub capability_invocation: Vec<String>,

    #[serde(rename = "capabilityDelegation", default, skip_serializing_if = "Vec::is_empty")]
    pub capability_delegation: Vec<String>,
}

impl Document {
    /// Parse a document from JSON bytes (canonical or not).
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DidError> {
        serde_json::from_slice(bytes).map_err(|e| DidError::Serialization(e.to_string()))
    }

    /// Pretty-printed JSON for operators. Not for hashing; use
    /// [`canonicalize`](super::canonical::canonicalize) for that.
    pub fn to_json_pretty(&self) -> Result<String, DidError> {
        serde_json::to_string_pretty(self).map_err(|e| DidError::Serialization(e.to_string()))
    }

    /// All five relationship lists, labelled.
    pub fn relationships(&self) -> [(&'static str, &[String]); 5] {
        [
            ("authentication", self.authentication.as_slice()),
            ("assertionMethod", self.assertion_method.as_slice()),
            ("keyAgreement", self.key_agreement.as_slice()),
            ("capabilityInvocation", self.capability_invocation.as_slice()),
            ("capabilityDelegation", self.capability_delegation.as_slice()),
        ]
    }

    /// Validate structural invariants.
    ///
    /// Checks:
    /// - The subject id is a `did:aospace:` DID.
    /// - At least one verification method is present.
    /// - Method ids are `did:aospacekey:` ids and key material hashes are unique.
    /// - Every method carries key material or exactly one root condition.
    /// - Every relationship reference and access-node reference names a
    ///   method fragment present in this document.
    pub fn validate(&self) -> Result<(), DidError> {
        let subject_prefix = format!("did:{}:", DID_METHOD);
        if !self.id.starts_with(&subject_prefix) {
            return Err(DidError::InvalidDocument(format!(
                "subject '{}' is not a did:{} identifier",
                self.id, DID_METHOD
            )));
        }
        if self.verification_method.is_empty() {
            return Err(DidError::InvalidDocument(
                "document has no verification methods".into(),
            ));
        }

        let method_prefix = format!("did:{}:", VERIFICATION_DID_METHOD);
        let mut hashes = HashSet::new();
        let mut references = HashSet::new();
        for method in &self.verification_method {
            if !method.id.starts_with(&method_prefix) {
                return Err(DidError::InvalidDocument(format!(
                    "method id '{}' is not a did:{} identifier",
                    method.id, VERIFICATION_DID_METHOD
                )));
            }
            let conditions = (method.condition_and.is_some(), method.condition_or.is_some());
            match (method.public_key_material(), conditions) {
                (_, (true, true)) => {
                    return Err(DidError::InvalidDocument(format!(
                        "method '{}' carries both conditionAnd and conditionOr",
                        method.id
                    )));
                }
                (None, (false, false)) => {
                    return Err(DidError::MissingKeyMaterial {
                        id: method.id.clone(),
                    });
                }
                _ => {}
            }
            if let Some(hash) = method.material_hash() {
                if !hashes.insert(hash.clone()) {
                    return Err(DidError::DuplicateKey { hash });
                }
            }
            if let Some(reference) = method.reference() {
                references.insert(reference);
            }
        }

        for (name, list) in self.relationships() {
            for reference in list {
                if !references.contains(reference) {
                    return Err(DidError::InvalidDocument(format!(
                        "{} references unknown method '{}'",
                        name, reference
                    )));
                }
            }
        }

        for method in &self.verification_method {
            if let Some(root) = method.access_structure() {
                for reference in root.references() {
                    if !references.contains(reference) {
                        return Err(DidError::InvalidDocument(format!(
                            "access structure '{}' references unknown method '{}'",
                            method.id, reference
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
