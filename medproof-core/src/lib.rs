//! Medproof Core - file integrity verification and audit ledger
//!
//! Registers files against an append-only ledger and later proves, or
//! disproves, that a presented copy is byte-identical to what was registered.
//!
//! # Features
//!
//! - SHA-256 content fingerprints, streamed in bounded chunks
//! - Content-addressed storage (IPFS HTTP API) with pinning
//! - EVM registry client with per-identity nonce management and EIP-155 signing
//! - Verification that logs every attempt, match or not
//! - Local archive fallback when the content store is unreachable
//!
//! With `default-features = false` only fingerprinting, the data model,
//! validation and errors are compiled (no async runtime, no network).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use medproof_core::{
//!     Actor, IntegrityService, LocalArchive, MemoryLedger, MemoryStore, PresentedContent,
//!     RegisterRequest, Role, SubjectReference, Identity,
//! };
//!
//! # async fn example() -> medproof_core::Result<()> {
//! let service = IntegrityService::new(
//!     Arc::new(MemoryLedger::new()),
//!     Arc::new(MemoryStore::new()),
//!     LocalArchive::new("uploads/verified_files"),
//! );
//! let clinician = Actor::new(Identity::from_bytes([1; 20]), Role::Clinician);
//!
//! let registration = service
//!     .register(RegisterRequest::new(
//!         b"ok".to_vec(),
//!         "patient_note.txt",
//!         SubjectReference::new("patient-42")?,
//!         clinician,
//!     ))
//!     .await?;
//!
//! let outcome = service
//!     .verify(registration.record.id, PresentedContent::Bytes(b"ok".to_vec()), &clinician, None)
//!     .await?;
//! assert!(outcome.is_match);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fingerprint;
pub mod record;
pub mod validation;

#[cfg(feature = "network")]
pub mod archive;
#[cfg(feature = "network")]
pub mod config;
#[cfg(feature = "network")]
pub mod http;
#[cfg(feature = "network")]
pub mod ledger;
#[cfg(feature = "network")]
pub mod service;
#[cfg(feature = "network")]
pub mod store;
#[cfg(feature = "network")]
pub mod verify;

pub use error::{MedproofError, Result, DEFAULT_MAX_FILE_SIZE};
pub use fingerprint::{Fingerprint, CHUNK_SIZE};
pub use record::{
    Actor, ContentId, FileRecord, Identity, LogId, Metadata, NewRecord, RecordId, Role,
    SubjectReference, VerificationLog,
};
pub use validation::{IntegrityPolicy, ValidatedUpload, DEFAULT_ALLOWED_EXTENSIONS};

// Network-dependent exports (not available in Wasm)
#[cfg(feature = "network")]
pub use archive::LocalArchive;
#[cfg(feature = "network")]
pub use config::ServiceConfig;
#[cfg(feature = "network")]
pub use ledger::{EthLedger, KeyFileSigner, Ledger, LedgerConfig, MemoryLedger, TransactionSigner};
#[cfg(feature = "network")]
pub use service::{
    ComponentStatus, FetchSource, Fetched, HealthReport, IntegrityService, RegisterRequest,
    Registration,
};
#[cfg(feature = "network")]
pub use store::{ContentStore, IpfsStore, IpfsStoreConfig, MemoryStore};
#[cfg(feature = "network")]
pub use verify::{PresentedContent, VerificationEngine, VerificationOutcome};
