//! Append-only ledger of file records and verification logs.
//!
//! The registry program lives on an external EVM-compatible network and is
//! the sole ordering authority: record and log ids are whatever it assigns.
//!
//! - **EthLedger** - JSON-RPC client that signs and submits transactions
//! - **MemoryLedger** - in-process ledger for tests, with failure injection
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use medproof_core::ledger::{EthLedger, KeyFileSigner, Ledger, LedgerConfig};
//!
//! # async fn example() -> medproof_core::Result<()> {
//! let signer = Arc::new(KeyFileSigner::load("private_keys.json")?);
//! let ledger = EthLedger::connect(LedgerConfig::default(), signer).await?;
//! let record = ledger.get_record(1).await?;
//! println!("{} -> {}", record.file_name, record.fingerprint);
//! # Ok(())
//! # }
//! ```

pub mod abi;
mod client;
mod deployment;
mod memory;
mod nonce;
mod rpc;
mod signer;
pub mod tx;

pub use client::{EthLedger, LedgerConfig};
pub use deployment::{discover_contract_address, ARTIFACT_FILE_NAME};
pub use memory::MemoryLedger;
pub use nonce::NonceManager;
pub use rpc::{RpcClient, TransactionReceipt};
pub use signer::{address_of, KeyFileSigner, RecoverableSignature, TransactionSigner};

use async_trait::async_trait;
use sha3::{Digest, Keccak256};

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::record::{FileRecord, Identity, NewRecord, RecordId, SubjectReference, VerificationLog};

/// Keccak-256, the hash used for transaction ids, ABI selectors and addresses.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Client contract for the registry.
///
/// Writes block until the ledger has durably accepted them. Transient
/// failures are retried internally with a bounded attempt count; signing
/// failures and rejections are returned on first occurrence.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Create a record on behalf of `uploader` and return it as the ledger
    /// stored it, including the assigned id and timestamp.
    async fn register(&self, record: NewRecord, uploader: &Identity) -> Result<FileRecord>;

    /// Read a record; `RecordNotFound` for ids the ledger never assigned.
    async fn get_record(&self, id: RecordId) -> Result<FileRecord>;

    /// Append one verification log entry. The ledger stores the outcome it
    /// is given; deciding match or mismatch is the caller's job.
    async fn append_verification(
        &self,
        record_id: RecordId,
        presented: &Fingerprint,
        notes: &str,
        verifier: &Identity,
    ) -> Result<VerificationLog>;

    async fn list_by_subject(&self, subject: &SubjectReference) -> Result<Vec<FileRecord>>;

    async fn list_by_uploader(&self, uploader: &Identity) -> Result<Vec<FileRecord>>;

    /// Every verification log of a record, oldest first.
    async fn verification_logs(&self, record_id: RecordId) -> Result<Vec<VerificationLog>>;

    /// Clear the record's `valid` flag. The record itself is kept.
    async fn invalidate(&self, record_id: RecordId, actor: &Identity) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}
