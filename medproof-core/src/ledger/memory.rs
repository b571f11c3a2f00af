//! In-process ledger for tests and offline demos.
//!
//! Behaves like the registry: ids start at 1 and increase, records are
//! never removed, and logs reference existing records only. Failure modes can
//! be switched on to exercise error paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::Ledger;
use crate::error::{MedproofError, Result};
use crate::fingerprint::Fingerprint;
use crate::record::{FileRecord, Identity, NewRecord, RecordId, SubjectReference, VerificationLog};

#[derive(Default)]
struct State {
    records: Vec<FileRecord>,
    logs: Vec<VerificationLog>,
    unsigned: HashSet<Identity>,
}

/// Memory-backed [`Ledger`].
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
    unavailable: AtomicBool,
    reject_appends: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `LedgerUnavailable` until switched back.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make verification appends fail with a rejection.
    pub fn set_reject_appends(&self, reject: bool) {
        self.reject_appends.store(reject, Ordering::SeqCst);
    }

    /// Treat `identity` as having no key material.
    pub fn revoke_key(&self, identity: &Identity) {
        self.lock().unsigned.insert(*identity);
    }

    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    pub fn log_count(&self) -> usize {
        self.lock().logs.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(MedproofError::LedgerUnavailable(
                "memory ledger switched off".into(),
            ))
        } else {
            Ok(())
        }
    }

    fn ensure_signable(state: &State, identity: &Identity) -> Result<()> {
        if state.unsigned.contains(identity) {
            Err(MedproofError::SigningFailure(format!(
                "No signing key for identity {identity}"
            )))
        } else {
            Ok(())
        }
    }

    fn record_index(state: &State, id: RecordId) -> Result<usize> {
        let index = usize::try_from(id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .filter(|index| *index < state.records.len())
            .ok_or(MedproofError::RecordNotFound(id))?;
        Ok(index)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn register(&self, record: NewRecord, uploader: &Identity) -> Result<FileRecord> {
        self.ensure_available()?;
        let mut state = self.lock();
        Self::ensure_signable(&state, uploader)?;

        let stored = FileRecord {
            id: state.records.len() as RecordId + 1,
            file_name: record.file_name,
            file_type: record.file_type,
            file_size_bytes: record.file_size_bytes,
            fingerprint: record.fingerprint,
            content_id: record.content_id,
            uploader: *uploader,
            subject: record.subject,
            registered_at: Utc::now(),
            metadata: record.metadata,
            valid: true,
        };
        state.records.push(stored.clone());
        Ok(stored)
    }

    async fn get_record(&self, id: RecordId) -> Result<FileRecord> {
        self.ensure_available()?;
        let state = self.lock();
        let index = Self::record_index(&state, id)?;
        Ok(state.records[index].clone())
    }

    async fn append_verification(
        &self,
        record_id: RecordId,
        presented: &Fingerprint,
        notes: &str,
        verifier: &Identity,
    ) -> Result<VerificationLog> {
        self.ensure_available()?;
        if self.reject_appends.load(Ordering::SeqCst) {
            return Err(MedproofError::LedgerRejected {
                code: -32000,
                message: "verification append rejected".into(),
            });
        }

        let mut state = self.lock();
        Self::ensure_signable(&state, verifier)?;
        let index = Self::record_index(&state, record_id)?;
        let registered = state.records[index].fingerprint.clone();

        let log = VerificationLog {
            id: state.logs.len() as u64 + 1,
            file_record_id: record_id,
            is_match: registered.matches(presented),
            registered_fingerprint: registered,
            presented_fingerprint: presented.clone(),
            verified_by: *verifier,
            verified_at: Utc::now(),
            notes: notes.to_string(),
        };
        state.logs.push(log.clone());
        Ok(log)
    }

    async fn list_by_subject(&self, subject: &SubjectReference) -> Result<Vec<FileRecord>> {
        self.ensure_available()?;
        Ok(self
            .lock()
            .records
            .iter()
            .filter(|r| &r.subject == subject)
            .cloned()
            .collect())
    }

    async fn list_by_uploader(&self, uploader: &Identity) -> Result<Vec<FileRecord>> {
        self.ensure_available()?;
        Ok(self
            .lock()
            .records
            .iter()
            .filter(|r| &r.uploader == uploader)
            .cloned()
            .collect())
    }

    async fn verification_logs(&self, record_id: RecordId) -> Result<Vec<VerificationLog>> {
        self.ensure_available()?;
        let state = self.lock();
        Self::record_index(&state, record_id)?;
        Ok(state
            .logs
            .iter()
            .filter(|log| log.file_record_id == record_id)
            .cloned()
            .collect())
    }

    async fn invalidate(&self, record_id: RecordId, actor: &Identity) -> Result<()> {
        self.ensure_available()?;
        let mut state = self.lock();
        Self::ensure_signable(&state, actor)?;
        let index = Self::record_index(&state, record_id)?;
        state.records[index].valid = false;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.ensure_available()
    }
}
