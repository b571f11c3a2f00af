//! In-process content store for tests and offline demos.
//!
//! Identifiers are derived from the content fingerprint, so storing the same
//! bytes twice yields the same identifier, as with IPFS.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::ContentStore;
use crate::error::{MedproofError, Result};
use crate::fingerprint::Fingerprint;
use crate::record::ContentId;

#[derive(Default)]
struct Inner {
    objects: HashMap<ContentId, Vec<u8>>,
    pinned: HashSet<ContentId>,
}

/// Memory-backed [`ContentStore`] with switchable failure modes.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    fail_pins: AtomicBool,
    puts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `StoreUnavailable` until switched back.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make `pin` fail while `put` and `get` keep working.
    pub fn set_pin_failure(&self, fail: bool) {
        self.fail_pins.store(fail, Ordering::SeqCst);
    }

    /// Drop stored content, simulating garbage collection of unpinned data.
    pub fn forget(&self, cid: &ContentId) {
        let mut inner = self.lock();
        inner.objects.remove(cid);
        inner.pinned.remove(cid);
    }

    pub fn is_pinned(&self, cid: &ContentId) -> bool {
        self.lock().pinned.contains(cid)
    }

    /// Number of successful `put` calls.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(MedproofError::StoreUnavailable(
                "memory store switched off".into(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, _file_name: &str, data: &[u8]) -> Result<ContentId> {
        self.ensure_available()?;
        let cid = ContentId::new(format!("mem-{}", Fingerprint::of_bytes(data)));
        self.lock().objects.insert(cid.clone(), data.to_vec());
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(cid)
    }

    async fn pin(&self, cid: &ContentId) -> Result<()> {
        self.ensure_available()?;
        if self.fail_pins.load(Ordering::SeqCst) {
            return Err(MedproofError::StoreUnavailable(format!(
                "pin of {cid} refused"
            )));
        }
        let mut inner = self.lock();
        if !inner.objects.contains_key(cid) {
            return Err(MedproofError::StoreRejected(format!("{cid} is not stored")));
        }
        inner.pinned.insert(cid.clone());
        Ok(())
    }

    async fn get(&self, cid: &ContentId) -> Result<Option<Vec<u8>>> {
        self.ensure_available()?;
        Ok(self.lock().objects.get(cid).cloned())
    }

    async fn health_check(&self) -> Result<()> {
        self.ensure_available()
    }
}
