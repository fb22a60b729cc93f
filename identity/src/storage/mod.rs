//! # Storage Module
//!
//! Persistent storage of keys, documents and the account index.
//!
//! ```text
//! db.rs     : sled-backed store, isolated transactions, KvStore trait
//! records.rs: prefix-namespaced record keys and typed accessors
//! ```
//!
//! Record helpers take any [`KvStore`]: pass the [`IdentityDb`] for a
//! direct write or a [`DbTransaction`] to group several writes into one
//! atomic commit.

pub mod db;
pub mod records;

pub use db::{DbError, DbResult, DbTransaction, IdentityDb, KvStore};
pub use records::normalize_did;
