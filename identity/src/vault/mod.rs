//! # Vault Module: Private Key Custody
//!
//! Where the private keys of every account live.
//!
//! ```text
//! pool.rs   : single-use cache of pre-generated RSA key pairs
//! custody.rs: space and password keys: create, load, rotate, delete
//! ```
//!
//! The composition root creates one [`KeyPool`], starts its pre-generation
//! off the request path, and injects it into [`KeyCustody`]. No global
//! state is involved.

pub mod custody;
pub mod pool;

pub use custody::{open_wrapped_key, KeyCustody, PasswordKey};
pub use pool::{spawn_pregeneration, KeyPool, KeyPurpose};
