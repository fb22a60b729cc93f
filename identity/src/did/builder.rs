//! # Verification Method Builder
//!
//! Issues the four credential types of a space DID onto an [`Identifier`]:
//!
//! | Credential         | Key source                  | Fragment | Relationships                       |
//! |--------------------|-----------------------------|----------|-------------------------------------|
//! | `device`           | account space key           | `key-0`  | authentication, assertionMethod, capabilityDelegation |
//! | `binder`           | supplied by the caller      | `key-1`  | authentication, assertionMethod     |
//! | `passwordondevice` | account password key        | `key-2`  | authentication                      |
//! | `passwordonbinder` | supplied by the caller      | `key-3`  | authentication                      |
//!
//! Every method id carries `versionTime=<RFC3339>&credentialType=<type>`.
//! Caller-supplied keys must prove their id: the id has to contain
//! `verification_hash(publicKeyPem)`, and any extra query parameters on it
//! are forwarded onto the issued id.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::document::{CredentialType, KeyType, VerificationKey};
use super::identifier::{Identifier, Relationship};
use super::DidError;
use crate::config::{QUERY_CREDENTIAL_TYPE, QUERY_VERSION_TIME};
use crate::crypto::hash::verification_hash;
use crate::crypto::keys::validate_public_pem;
use crate::error::{IdentityError, Result};
use crate::storage::KvStore;
use crate::vault::{KeyCustody, PasswordKey};

/// A public key handed in by the paired client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinderKey {
    /// Caller-side id. Must contain the key's verification hash and may
    /// carry a query, e.g. `:AAAHtMWCPnvz2q5ONvw=?credentialType=binder`.
    pub id: String,

    #[serde(rename = "type")]
    pub key_type: KeyType,

    #[serde(rename = "publicKeyPem")]
    pub public_key_pem: String,
}

impl BinderKey {
    pub fn new(id: impl Into<String>, key_type: KeyType, public_key_pem: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key_type,
            public_key_pem: public_key_pem.into(),
        }
    }

    /// `name=value` pairs of the id's query, in order.
    fn query_params(&self) -> Vec<(&str, &str)> {
        let without_fragment = self.id.split('#').next().unwrap_or_default();
        match without_fragment.split_once('?') {
            Some((_, query)) => query
                .split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Credential type declared on the id, if any.
    pub fn credential_type(&self) -> Option<CredentialType> {
        self.query_params()
            .into_iter()
            .find(|(name, _)| *name == QUERY_CREDENTIAL_TYPE)
            .and_then(|(_, value)| CredentialType::from_query_value(value))
    }

    /// Check that the id is bound to this key material.
    fn verify_integrity(&self) -> std::result::Result<(), DidError> {
        let hash = verification_hash(self.public_key_pem.as_bytes());
        if self.id.contains(&hash) {
            Ok(())
        } else {
            Err(DidError::Integrity { id: self.id.clone() })
        }
    }
}

/// Id and query of an issued method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltMethod {
    pub key_id: String,
    pub query: String,
}

impl BuiltMethod {
    /// The `#fragment` reference of the issued method.
    pub fn reference(&self) -> String {
        let fragment = self.key_id.split_once('#').map(|(_, f)| f).unwrap_or_default();
        format!("#{}", fragment)
    }
}

/// Fixed fragment of each credential type.
pub fn credential_fragment(kind: CredentialType) -> &'static str {
    match kind {
        CredentialType::Device => "key-0",
        CredentialType::Binder => "key-1",
        CredentialType::PasswordOnDevice => "key-2",
        CredentialType::PasswordOnBinder => "key-3",
    }
}

fn relationships_of(kind: CredentialType) -> &'static [Relationship] {
    match kind {
        CredentialType::Device => &[
            Relationship::Authentication,
            Relationship::AssertionMethod,
            Relationship::CapabilityDelegation,
        ],
        CredentialType::Binder => &[Relationship::Authentication, Relationship::AssertionMethod],
        CredentialType::PasswordOnDevice | CredentialType::PasswordOnBinder => {
            &[Relationship::Authentication]
        }
    }
}

/// Issues credential methods stamped with one `versionTime`.
#[derive(Debug, Clone)]
pub struct VerificationMethodBuilder<'a> {
    custody: &'a KeyCustody,
    version_time: DateTime<Utc>,
}

impl<'a> VerificationMethodBuilder<'a> {
    pub fn new(custody: &'a KeyCustody) -> Self {
        Self {
            custody,
            version_time: Utc::now(),
        }
    }

    /// Pin the `versionTime` stamp.
    pub fn with_version_time(mut self, version_time: DateTime<Utc>) -> Self {
        self.version_time = version_time;
        self
    }

    /// `versionTime=<RFC3339>&credentialType=<type>`.
    pub fn base_query(&self, kind: CredentialType) -> String {
        format!(
            "{}={}&{}",
            QUERY_VERSION_TIME,
            self.version_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            kind.query_pair()
        )
    }

    /// The base query plus every other parameter on the caller's id.
    fn forwarded_query(&self, kind: CredentialType, external: &BinderKey) -> String {
        let mut query = self.base_query(kind);
        for (name, value) in external.query_params() {
            if name == QUERY_VERSION_TIME || name == QUERY_CREDENTIAL_TYPE {
                continue;
            }
            query.push('&');
            query.push_str(name);
            if !value.is_empty() {
                query.push('=');
                query.push_str(value);
            }
        }
        query
    }

    fn publish(
        &self,
        identifier: &mut Identifier,
        kind: CredentialType,
        key_type: KeyType,
        public_key_pem: &str,
        query: String,
        index: Option<usize>,
    ) -> Result<BuiltMethod> {
        let fragment = credential_fragment(kind);
        let key_id =
            identifier.add_verification_method(key_type, public_key_pem, &query, fragment, index)?;
        for relationship in relationships_of(kind) {
            identifier.add_relationship(*relationship, format!("#{}", fragment));
        }
        debug!(credential = kind.as_str(), key_id = %key_id, "verification method issued");
        Ok(BuiltMethod { key_id, query })
    }

    /// Publish the account's space key as the `device` method.
    pub fn add_device<S: KvStore + ?Sized>(
        &self,
        identifier: &mut Identifier,
        store: &mut S,
        ao_id: &str,
    ) -> Result<BuiltMethod> {
        let key_pair = self.custody.get_or_create_space_key(store, ao_id)?;
        let query = self.base_query(CredentialType::Device);
        self.publish(
            identifier,
            CredentialType::Device,
            KeyType::RsaVerificationKey2018,
            key_pair.public_pem(),
            query,
            None,
        )
    }

    /// Publish the caller's binder key.
    ///
    /// Picks the external key declared as `binder`, else the first one not
    /// declared as `passwordonbinder`. Having none is a `NotFound` error.
    pub fn add_binder(
        &self,
        identifier: &mut Identifier,
        external: &[BinderKey],
    ) -> Result<BuiltMethod> {
        let binder = external
            .iter()
            .find(|k| k.credential_type() == Some(CredentialType::Binder))
            .or_else(|| {
                external
                    .iter()
                    .find(|k| k.credential_type() != Some(CredentialType::PasswordOnBinder))
            })
            .ok_or_else(|| IdentityError::NotFound("binder verification method".into()))?;

        self.publish_external(identifier, CredentialType::Binder, binder)
    }

    /// Publish the caller's password-on-binder key, when one was supplied.
    pub fn add_password_on_binder(
        &self,
        identifier: &mut Identifier,
        external: &[BinderKey],
    ) -> Result<Option<BuiltMethod>> {
        match external
            .iter()
            .find(|k| k.credential_type() == Some(CredentialType::PasswordOnBinder))
        {
            Some(key) => self
                .publish_external(identifier, CredentialType::PasswordOnBinder, key)
                .map(Some),
            None => {
                debug!("no passwordonbinder method supplied");
                Ok(None)
            }
        }
    }

    fn publish_external(
        &self,
        identifier: &mut Identifier,
        kind: CredentialType,
        key: &BinderKey,
    ) -> Result<BuiltMethod> {
        key.verify_integrity()?;
        if key.key_type == KeyType::RsaVerificationKey2018 {
            validate_public_pem(&key.public_key_pem)?;
        }
        let query = self.forwarded_query(kind, key);
        self.publish(identifier, kind, key.key_type, &key.public_key_pem, query, None)
    }

    /// Reissue the `passwordondevice` method under a fresh password key.
    ///
    /// The existing method and its wrapped key record are removed first.
    /// The new method takes the old one's position in the method list.
    pub fn add_password_on_device<S: KvStore + ?Sized>(
        &self,
        identifier: &mut Identifier,
        store: &mut S,
        ao_id: &str,
        password: &str,
    ) -> Result<(BuiltMethod, PasswordKey)> {
        let kind = CredentialType::PasswordOnDevice;
        let index = identifier.position_of_credential_type(kind);
        identifier.delete_verification_method_of_query(&kind.query_pair());
        self.custody.delete(store, ao_id)?;

        let password_key = self
            .custody
            .get_or_create_password_key(store, ao_id, password)?;
        let query = self.base_query(kind);
        let built = self.publish(
            identifier,
            kind,
            KeyType::RsaVerificationKey2018,
            password_key.key_pair.public_pem(),
            query,
            index,
        )?;
        Ok((built, password_key))
    }
}

/// Compose (or recompose) the recovery access structure over the
/// credential methods present on `identifier`.
///
/// Device and binder anchor the policy; password methods only co-sign.
pub fn compose_recovery(identifier: &mut Identifier) -> Result<String> {
    let references = |kinds: &[CredentialType]| -> Vec<String> {
        kinds
            .iter()
            .flat_map(|kind| identifier.methods_of_credential_type(*kind))
            .filter_map(VerificationKey::reference)
            .collect()
    };
    let first = references(&[CredentialType::Device, CredentialType::Binder]);
    let second = references(&[
        CredentialType::PasswordOnDevice,
        CredentialType::PasswordOnBinder,
    ]);
    Ok(identifier.add_multisig_method(&first, &second)?)
}
