//! # Pre-generated Key Pool
//!
//! RSA-2048 generation takes long enough to be felt on the first account
//! creation after boot. The pool holds at most one ready key pair per
//! [`KeyPurpose`], filled off the request path at start-up and consumed
//! exactly once.
//!
//! ```text
//!   pregenerate()            take(purpose)
//!   ─────────────            ─────────────
//!   generate (unlocked)      lock slot
//!   lock slot                Option::take
//!   fill if still empty      unlock
//!   unlock
//! ```
//!
//! The check-take-clear on the consumer side is a single critical section,
//! so a pre-generated pair is never handed out twice even when producer and
//! consumers race.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

use crate::crypto::{CryptoError, RsaKeyPair};

/// What a pooled key pair will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPurpose {
    Space,
    Password,
}

impl KeyPurpose {
    pub const ALL: [KeyPurpose; 2] = [KeyPurpose::Space, KeyPurpose::Password];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyPurpose::Space => "space",
            KeyPurpose::Password => "password",
        }
    }
}

/// Single-slot, single-use cache of ready key pairs.
#[derive(Debug)]
pub struct KeyPool {
    bits: usize,
    space: Mutex<Option<RsaKeyPair>>,
    password: Mutex<Option<RsaKeyPair>>,
}

impl KeyPool {
    pub fn new(bits: usize) -> Self {
        Self {
            bits,
            space: Mutex::new(None),
            password: Mutex::new(None),
        }
    }

    /// RSA modulus size of pooled and on-demand key pairs.
    pub fn bits(&self) -> usize {
        self.bits
    }

    fn slot(&self, purpose: KeyPurpose) -> &Mutex<Option<RsaKeyPair>> {
        match purpose {
            KeyPurpose::Space => &self.space,
            KeyPurpose::Password => &self.password,
        }
    }

    /// Whether a pre-generated pair is waiting for `purpose`.
    pub fn is_ready(&self, purpose: KeyPurpose) -> bool {
        self.slot(purpose).lock().is_some()
    }

    /// Fill every empty slot. Generation happens outside the lock.
    pub fn pregenerate(&self) -> Result<(), CryptoError> {
        for purpose in KeyPurpose::ALL {
            if self.is_ready(purpose) {
                continue;
            }
            let key_pair = RsaKeyPair::generate(self.bits)?;
            let mut slot = self.slot(purpose).lock();
            if slot.is_none() {
                *slot = Some(key_pair);
                debug!(purpose = purpose.as_str(), bits = self.bits, "key pair pre-generated");
            }
        }
        Ok(())
    }

    /// Take the pre-generated pair for `purpose`, leaving the slot empty.
    pub fn take(&self, purpose: KeyPurpose) -> Option<RsaKeyPair> {
        self.slot(purpose).lock().take()
    }

    /// The pre-generated pair if one is ready, otherwise a fresh one
    /// generated on the calling thread.
    pub fn take_or_generate(&self, purpose: KeyPurpose) -> Result<RsaKeyPair, CryptoError> {
        match self.take(purpose) {
            Some(key_pair) => {
                debug!(purpose = purpose.as_str(), "using pre-generated key pair");
                Ok(key_pair)
            }
            None => {
                debug!(purpose = purpose.as_str(), bits = self.bits, "generating key pair");
                RsaKeyPair::generate(self.bits)
            }
        }
    }
}

/// Fill the pool on a background thread.
///
/// For composition roots without an async runtime. The handle yields the
/// generation result; dropping it detaches the thread.
pub fn spawn_pregeneration(pool: Arc<KeyPool>) -> std::io::Result<JoinHandle<Result<(), CryptoError>>> {
    thread::Builder::new()
        .name("key-pregen".into())
        .spawn(move || {
            let result = pool.pregenerate();
            if result.is_ok() {
                info!(bits = pool.bits(), "key pool ready");
            }
            result
        })
}
