//! Integrity Service: the entry point external collaborators call.
//!
//! Registration runs as explicit stages:
//!
//! 1. role check and validation (no I/O)
//! 2. fingerprint
//! 3. local archive copy
//! 4. content store `put`, then `pin` (pin failure only warns)
//! 5. ledger registration
//!
//! A failure before stage 5 completes leaves no ledger record. Content
//! already sent to the store stays there, which content addressing
//! tolerates; the local copy is removed.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::archive::LocalArchive;
use crate::error::{MedproofError, Result};
use crate::fingerprint::Fingerprint;
use crate::ledger::Ledger;
use crate::record::{
    Actor, FileRecord, Identity, Metadata, NewRecord, RecordId, SubjectReference, VerificationLog,
};
use crate::store::ContentStore;
use crate::validation::IntegrityPolicy;
use crate::verify::{PresentedContent, VerificationEngine, VerificationOutcome};

/// Everything needed to register one file.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    content: Vec<u8>,
    file_name: String,
    file_type: Option<String>,
    subject: SubjectReference,
    metadata: Metadata,
    actor: Actor,
}

impl RegisterRequest {
    pub fn new(
        content: Vec<u8>,
        file_name: impl Into<String>,
        subject: SubjectReference,
        actor: Actor,
    ) -> Self {
        Self {
            content,
            file_name: file_name.into(),
            file_type: None,
            subject,
            metadata: Metadata::new(),
            actor,
        }
    }

    /// Override the file type; defaults to the lowercase extension.
    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A completed registration.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub record: FileRecord,
    pub local_path: PathBuf,
    /// `false` when pinning failed; the content may be garbage-collected.
    pub pinned: bool,
}

/// Where fetched bytes came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum FetchSource {
    ContentStore,
    LocalArchive { path: PathBuf },
}

impl FetchSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ContentStore => "content_store",
            Self::LocalArchive { .. } => "local_archive",
        }
    }
}

/// Stored bytes of a record.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub record: FileRecord,
    pub bytes: Vec<u8>,
    pub source: FetchSource,
    /// Whether the bytes still hash to the registered fingerprint.
    pub fingerprint_matches: bool,
}

/// Reachability of one backing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentStatus {
    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                healthy: true,
                error: None,
            },
            Err(e) => Self {
                healthy: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ledger: ComponentStatus,
    pub store: ComponentStatus,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.ledger.healthy && self.store.healthy
    }
}

/// Façade over ledger, content store, archive and verification.
#[derive(Clone)]
pub struct IntegrityService {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn ContentStore>,
    archive: LocalArchive,
    policy: IntegrityPolicy,
    engine: VerificationEngine,
}

impl IntegrityService {
    pub fn new(ledger: Arc<dyn Ledger>, store: Arc<dyn ContentStore>, archive: LocalArchive) -> Self {
        Self {
            engine: VerificationEngine::new(Arc::clone(&ledger)),
            ledger,
            store,
            archive,
            policy: IntegrityPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: IntegrityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &IntegrityPolicy {
        &self.policy
    }

    pub fn archive(&self) -> &LocalArchive {
        &self.archive
    }

    #[instrument(level = "info", skip_all, fields(
        file_name = %request.file_name,
        identity = %request.actor.identity,
        role = %request.actor.role,
        size = request.content.len()
    ))]
    pub async fn register(&self, request: RegisterRequest) -> Result<Registration> {
        let RegisterRequest {
            content,
            file_name,
            file_type,
            subject,
            metadata,
            actor,
        } = request;

        if !actor.role.can_register() {
            return Err(MedproofError::PermissionDenied(format!(
                "Role '{}' may not register files",
                actor.role
            )));
        }
        let upload = self.policy.validate(&file_name, content.len() as u64)?;
        let fingerprint = Fingerprint::of_bytes(&content);

        let local_path = self.archive.persist(&upload.file_name, &content).await?;

        let file_type = file_type.unwrap_or_else(|| upload.extension.clone());
        let staged = self
            .store_and_register(
                &content,
                &upload.file_name,
                file_type,
                fingerprint,
                subject,
                metadata,
                &actor.identity,
            )
            .await;

        match staged {
            Ok((record, pinned)) => {
                info!(
                    record_id = record.id,
                    content_id = %record.content_id,
                    fingerprint = %record.fingerprint,
                    pinned,
                    "File registered"
                );
                Ok(Registration {
                    record,
                    local_path,
                    pinned,
                })
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Registration aborted");
                self.archive.discard(&local_path).await;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn store_and_register(
        &self,
        content: &[u8],
        file_name: &str,
        file_type: String,
        fingerprint: Fingerprint,
        subject: SubjectReference,
        metadata: Metadata,
        uploader: &Identity,
    ) -> Result<(FileRecord, bool)> {
        let content_id = self.store.put(file_name, content).await?;

        let pinned = match self.store.pin(&content_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(content_id = %content_id, error = %e, "Pinning failed; continuing without pin");
                false
            }
        };

        let record = self
            .ledger
            .register(
                NewRecord {
                    file_name: file_name.to_string(),
                    file_type,
                    file_size_bytes: content.len() as u64,
                    fingerprint,
                    content_id,
                    subject,
                    metadata,
                },
                uploader,
            )
            .await?;
        Ok((record, pinned))
    }

    /// Verify presented content against a record and log the attempt.
    ///
    /// `notes` defaults to a timestamped line naming the actor's role.
    #[instrument(level = "info", skip(self, content, notes), fields(identity = %actor.identity, role = %actor.role))]
    pub async fn verify(
        &self,
        record_id: RecordId,
        content: PresentedContent,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<VerificationOutcome> {
        if !actor.role.can_verify() {
            return Err(MedproofError::PermissionDenied(format!(
                "Role '{}' may not verify files",
                actor.role
            )));
        }
        let notes = notes.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| {
            format!(
                "Verification performed at {} by {}",
                Utc::now().to_rfc3339(),
                actor.role
            )
        });
        self.engine
            .verify(record_id, &content, &actor.identity, &notes)
            .await
    }

    /// Retrieve a record's stored bytes.
    ///
    /// Falls back to the local archive only when the content store is
    /// unreachable. A store that answers "not found" is reported as
    /// `ContentUnavailable`.
    #[instrument(level = "info", skip(self), fields(identity = %actor.identity))]
    pub async fn fetch(&self, record_id: RecordId, actor: &Actor) -> Result<Fetched> {
        if !actor.role.can_verify() {
            return Err(MedproofError::PermissionDenied(format!(
                "Role '{}' may not fetch files",
                actor.role
            )));
        }
        let record = self.ledger.get_record(record_id).await?;

        let fetched = match self.store.get(&record.content_id).await {
            Ok(Some(bytes)) => {
                let fingerprint_matches = Fingerprint::of_bytes(&bytes).matches(&record.fingerprint);
                Fetched {
                    record,
                    bytes,
                    source: FetchSource::ContentStore,
                    fingerprint_matches,
                }
            }
            Ok(None) => {
                warn!(record_id, content_id = %record.content_id, "Ledger record has no stored content");
                return Err(MedproofError::ContentUnavailable {
                    record_id,
                    content_id: record.content_id.to_string(),
                });
            }
            Err(e @ MedproofError::StoreUnavailable(_)) => {
                let Some(copy) = self.archive.find(&record.file_name, &record.fingerprint).await? else {
                    return Err(e);
                };
                warn!(record_id, path = %copy.path.display(), error = %e, "Content store unreachable; serving archived copy");
                let fingerprint_matches = copy.fingerprint.matches(&record.fingerprint);
                Fetched {
                    record,
                    bytes: copy.bytes,
                    source: FetchSource::LocalArchive { path: copy.path },
                    fingerprint_matches,
                }
            }
            Err(e) => return Err(e),
        };

        if !fetched.fingerprint_matches {
            warn!(
                record_id,
                source = fetched.source.label(),
                "Retrieved content does not match registered fingerprint"
            );
        }
        Ok(fetched)
    }

    pub async fn get_record(&self, record_id: RecordId) -> Result<FileRecord> {
        self.ledger.get_record(record_id).await
    }

    pub async fn verification_history(&self, record_id: RecordId) -> Result<Vec<VerificationLog>> {
        self.ledger.verification_logs(record_id).await
    }

    pub async fn list_by_subject(&self, subject: &SubjectReference) -> Result<Vec<FileRecord>> {
        self.ledger.list_by_subject(subject).await
    }

    pub async fn list_by_uploader(&self, uploader: &Identity) -> Result<Vec<FileRecord>> {
        self.ledger.list_by_uploader(uploader).await
    }

    /// Mark a record invalid. Admin only; the record is kept.
    #[instrument(level = "info", skip(self), fields(identity = %actor.identity))]
    pub async fn invalidate(&self, record_id: RecordId, actor: &Actor) -> Result<()> {
        if !actor.role.can_invalidate() {
            return Err(MedproofError::PermissionDenied(format!(
                "Role '{}' may not invalidate records",
                actor.role
            )));
        }
        self.ledger.invalidate(record_id, &actor.identity).await
    }

    pub async fn health(&self) -> HealthReport {
        let (ledger, store) = tokio::join!(self.ledger.health_check(), self.store.health_check());
        HealthReport {
            ledger: ComponentStatus::from_result(ledger),
            store: ComponentStatus::from_result(store),
        }
    }
}
