//! # Identity Configuration & Constants
//!
//! Every magic string and number of the identity core lives here: DID
//! method names, storage record prefixes, key-derivation parameters and
//! the wrapped-key blob layout.
//!
//! Most of these are wire- or disk-visible. Changing a record prefix or
//! the KDF salt after devices have shipped orphans every stored key, so
//! treat them as frozen.

// ---------------------------------------------------------------------------
// DID Methods
// ---------------------------------------------------------------------------

/// Method name of the top-level space identifier: `did:aospace:<id>`.
pub const DID_METHOD: &str = "aospace";

/// Method name of per-key sub-identifiers: `did:aospacekey:<hash>`.
pub const VERIFICATION_DID_METHOD: &str = "aospacekey";

/// Fragment appended to the space DID when none was parsed.
pub const DEFAULT_FRAGMENT: &str = "did0";

/// Fixed fragment of the recovery access-structure node.
pub const MULTISIG_FRAGMENT: &str = "multisig-0";

/// Default JSON-LD contexts of every document.
pub const DEFAULT_CONTEXTS: [&str; 2] = [
    "https://www.w3.org/ns/did/v1",
    "https://w3id.org/security/suites/secp256k1recovery-2020/v2",
];

/// Minimum length of anything that could be a DID (`did:a:b`).
pub const MIN_DID_LENGTH: usize = 7;

// ---------------------------------------------------------------------------
// Verification Method Query Parameters
// ---------------------------------------------------------------------------

pub const QUERY_VERSION_TIME: &str = "versionTime";
pub const QUERY_CREDENTIAL_TYPE: &str = "credentialType";

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Two-byte version prefix shared by `aospace_id` and `verification_hash`.
pub const HASH_VERSION: [u8; 2] = [0, 0];

/// Length of the checksum suffix, taken from the front of a SHA3-256 digest.
pub const CHECKSUM_LENGTH: usize = 4;

/// Bytes of SHA3-256 kept by `verification_hash`.
pub const VERIFICATION_DIGEST_LENGTH: usize = 8;

// ---------------------------------------------------------------------------
// Key Wrapping
// ---------------------------------------------------------------------------

/// Fixed application salt seed. The PBKDF2 salt is `SHA-256(WRAP_SALT_SEED)`.
pub const WRAP_SALT_SEED: &str = "aospace-agent/password-key-wrap";

/// PBKDF2-HMAC-SHA256 iteration count.
pub const KDF_ITERATIONS: u32 = 4096;

/// Derived AES-256 key length in bytes.
pub const KDF_KEY_LENGTH: usize = 32;

/// AES-CBC initialization vector length.
pub const AES_IV_LENGTH: usize = 16;

/// Leading version placeholder of a wrapped blob. Always zero for now.
pub const WRAP_VERSION_LENGTH: usize = 4;

/// Offset of the ciphertext inside a wrapped blob.
pub const WRAP_HEADER_LENGTH: usize = WRAP_VERSION_LENGTH + AES_IV_LENGTH;

/// RSA modulus size for space and password keys.
pub const RSA_KEY_BITS: usize = 2048;

// ---------------------------------------------------------------------------
// Storage Record Prefixes
// ---------------------------------------------------------------------------

pub const RECORD_SEPARATOR: &str = "--";
pub const PREFIX_KEY: &str = "key";
pub const PREFIX_DOC: &str = "doc";
pub const PREFIX_INDEX: &str = "index";

pub const RECORD_SPACE_KEY: &str = "space_rsa_pri";
pub const RECORD_PASSWORD_KEY: &str = "password_rsa_pri";
pub const RECORD_DID_DOC: &str = "did_doc";
pub const RECORD_AOID_TO_DID: &str = "aoid_to_did";
pub const RECORD_DID_TO_AOID: &str = "did_to_aoid";

/// Name of the sled tree holding every identity record.
pub const IDENTITY_TREE: &str = "aospace_identity";

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Tunables of the identity core that the composition root may override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// RSA modulus size used for newly generated key pairs.
    pub rsa_bits: usize,
    /// Whether the composition root should pre-generate key pairs at start.
    pub pregenerate: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            rsa_bits: RSA_KEY_BITS,
            pregenerate: true,
        }
    }
}
