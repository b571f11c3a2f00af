//! Verification Engine.
//!
//! Fetches the registered fingerprint, fingerprints the presented content,
//! compares the two and appends a log entry whatever the result. A mismatch
//! is an answer, not an error. Errors are reserved for cases where no answer
//! exists: unknown record, unreadable content, unreachable ledger.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::{MedproofError, Result};
use crate::fingerprint::Fingerprint;
use crate::ledger::Ledger;
use crate::record::{Identity, LogId, RecordId};

/// Content presented for verification.
#[derive(Debug, Clone)]
pub enum PresentedContent {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl PresentedContent {
    /// Fingerprint the content. Files are hashed on the blocking pool.
    pub async fn fingerprint(&self) -> Result<Fingerprint> {
        match self {
            Self::Bytes(bytes) => Ok(Fingerprint::of_bytes(bytes)),
            Self::File(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || Fingerprint::of_file(path))
                    .await
                    .map_err(|e| MedproofError::ReadError(std::io::Error::other(e)))?
            }
        }
    }
}

impl From<Vec<u8>> for PresentedContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<PathBuf> for PresentedContent {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Result of one verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    pub record_id: RecordId,
    pub is_match: bool,
    pub registered_fingerprint: Fingerprint,
    pub presented_fingerprint: Fingerprint,
    /// Id of the appended log entry, when the append succeeded.
    pub log_id: Option<LogId>,
    /// `false` when the comparison ran but the audit trail is incomplete.
    pub logged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_error: Option<String>,
    /// `false` once the record has been invalidated.
    pub record_valid: bool,
    pub verified_at: DateTime<Utc>,
}

impl VerificationOutcome {
    /// `"verified"` or `"tampered"`.
    pub fn status(&self) -> &'static str {
        if self.is_match {
            "verified"
        } else {
            "tampered"
        }
    }
}

/// Compares presented content against the ledger.
#[derive(Clone)]
pub struct VerificationEngine {
    ledger: Arc<dyn Ledger>,
}

impl VerificationEngine {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    #[instrument(level = "info", skip(self, content, notes), fields(identity = %verifier))]
    pub async fn verify(
        &self,
        record_id: RecordId,
        content: &PresentedContent,
        verifier: &Identity,
        notes: &str,
    ) -> Result<VerificationOutcome> {
        let record = self.ledger.get_record(record_id).await?;
        let presented = content.fingerprint().await?;
        let is_match = record.fingerprint.matches(&presented);

        let (log_id, log_error, verified_at) = match self
            .ledger
            .append_verification(record_id, &presented, notes, verifier)
            .await
        {
            Ok(log) => (Some(log.id), None, log.verified_at),
            Err(e) => {
                warn!(record_id, error = %e, kind = e.kind(), "Verification log not written");
                (None, Some(e.to_string()), Utc::now())
            }
        };

        if is_match {
            info!(record_id, ?log_id, "Content matches registered fingerprint");
        } else {
            warn!(
                record_id,
                ?log_id,
                registered = %record.fingerprint,
                presented = %presented,
                "Content does not match registered fingerprint"
            );
        }

        Ok(VerificationOutcome {
            record_id,
            is_match,
            registered_fingerprint: record.fingerprint,
            presented_fingerprint: presented,
            logged: log_id.is_some(),
            log_id,
            log_error,
            record_valid: record.valid,
            verified_at,
        })
    }
}
