//! Per-identity transaction sequence numbers.
//!
//! Each identity has its own slot behind its own mutex, so unrelated
//! identities never wait on each other. Slots are only locked for the
//! duration of an arithmetic update: callers read the chain's pending count
//! first and pass it in.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::debug;

use crate::record::Identity;

type Slot = Arc<Mutex<Option<u64>>>;

/// Hands out unique nonces per identity.
#[derive(Default)]
pub struct NonceManager {
    slots: DashMap<Identity, Slot>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next nonce for `identity`.
    ///
    /// `pending` is the chain's pending transaction count, read by the caller
    /// before this call. The result is `max(cached, pending)`, and the cache
    /// moves past it, so concurrent callers never receive the same value.
    pub fn reserve(&self, identity: &Identity, pending: u64) -> u64 {
        let slot = self.slot(identity);
        let mut next = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let nonce = next.map_or(pending, |cached| cached.max(pending));
        *next = Some(nonce + 1);
        debug!(identity = %identity, nonce, pending, "Reserved nonce");
        nonce
    }

    /// Forget the cached value so the next reservation follows the chain.
    pub fn invalidate(&self, identity: &Identity) {
        let slot = self.slot(identity);
        let mut next = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *next = None;
        debug!(identity = %identity, "Invalidated cached nonce");
    }

    fn slot(&self, identity: &Identity) -> Slot {
        // Clone the Arc so the map shard is released before the slot is locked.
        self.slots.entry(*identity).or_default().value().clone()
    }
}
