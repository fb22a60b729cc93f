// Copyright (c) 2026 AO.space. MIT License.
// See LICENSE for details.

//! # AO.space Identity Core
//!
//! The self-sovereign identity subsystem of the AO.space agent: the
//! `did:aospace` identifier scheme, documents whose verification methods
//! include recursive multi-credential access structures, a canonical JSON
//! form for hashing and exchange, and password-protected custody of the
//! private keys behind it all.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants, record prefixes and runtime tunables.
//! - **crypto**: Hashing, RSA keys and password key wrapping.
//! - **did**: Parser, identifier working state, documents, method
//!   builder, multisig composer and canonicalizer.
//! - **vault**: Pre-generated key pool and key custody.
//! - **storage**: sled-backed records with isolated transactions.
//! - **registry**: The operations the agent's service layer calls.
//!
//! ## Quick Start
//!
//! ```no_run
//! use aospace_identity::config::IdentityConfig;
//! use aospace_identity::registry::{DidLookup, DidRegistry};
//! use aospace_identity::storage::IdentityDb;
//!
//! # fn main() -> aospace_identity::error::Result<()> {
//! let db = IdentityDb::open("/var/lib/aospace/identity")?;
//! let registry = DidRegistry::with_config(db, &IdentityConfig::default());
//! let document = registry.get_document(None, DidLookup::AoId("aoId-1"))?;
//! # let _ = document;
//! # Ok(())
//! # }
//! ```
//!
//! Everything here is synchronous. RSA generation, PBKDF2 and sled I/O run
//! to completion on the calling thread; async callers wrap them in
//! `spawn_blocking`.

pub mod config;
pub mod crypto;
pub mod did;
pub mod error;
pub mod registry;
pub mod storage;
pub mod vault;

pub use error::{IdentityError, Result};
pub use registry::{DidLookup, DidRegistry, IssuedDocument};
