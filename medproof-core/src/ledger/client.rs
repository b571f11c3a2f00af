//! EVM JSON-RPC ledger client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::abi::{self, ParamType, Token};
use super::deployment::discover_contract_address;
use super::nonce::NonceManager;
use super::rpc::{decode_hex, RpcClient, TransactionReceipt};
use super::signer::TransactionSigner;
use super::tx::{transaction_hash, LegacyTransaction};
use super::{keccak256, Ledger};
use crate::error::{MedproofError, Result};
use crate::fingerprint::Fingerprint;
use crate::http::RetryPolicy;
use crate::record::{
    ContentId, FileRecord, Identity, Metadata, NewRecord, RecordId, SubjectReference,
    VerificationLog,
};

const GAS_REGISTER: u64 = 1_000_000;
const GAS_VERIFY: u64 = 500_000;
const GAS_INVALIDATE: u64 = 200_000;

/// JSON-RPC code reported when a mined transaction reverted.
pub const REVERTED_CODE: i64 = 3;

/// Code reported when nonce collisions outlast every resubmission.
pub const NONCE_EXHAUSTED_CODE: i64 = -32000;

const SUBJECT_DOMAIN: &str = "medproof:subject:";

const FILE_RECORD_TYPES: [ParamType; 10] = [
    ParamType::String,
    ParamType::String,
    ParamType::String,
    ParamType::String,
    ParamType::Uint,
    ParamType::Address,
    ParamType::Address,
    ParamType::Uint,
    ParamType::Bool,
    ParamType::String,
];

const VERIFICATION_LOG_TYPES: [ParamType; 7] = [
    ParamType::Uint,
    ParamType::String,
    ParamType::String,
    ParamType::Bool,
    ParamType::Address,
    ParamType::Uint,
    ParamType::String,
];

/// Connection settings for [`EthLedger`].
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Registry address; overrides artifact discovery when set.
    pub contract_address: Option<String>,
    pub artifacts_dir: PathBuf,
    pub address_file: PathBuf,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Fresh-nonce resubmissions after a nonce collision.
    pub nonce_retries: u32,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let env_u64 = |key: &str, default: u64| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Self {
            rpc_url: std::env::var("MEDPROOF_RPC_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:7545".to_string()),
            contract_address: std::env::var("MEDPROOF_CONTRACT_ADDRESS")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            artifacts_dir: std::env::var("MEDPROOF_ARTIFACTS_DIR")
                .unwrap_or_else(|_| "build/contracts".to_string())
                .into(),
            address_file: std::env::var("MEDPROOF_CONTRACT_ADDRESS_FILE")
                .unwrap_or_else(|_| "contract_address.txt".to_string())
                .into(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default()
                .with_max_attempts(saturating_u32(env_u64("MEDPROOF_LEDGER_MAX_RETRIES", 5))),
            nonce_retries: saturating_u32(env_u64("MEDPROOF_NONCE_RETRIES", 3)),
            receipt_timeout: Duration::from_secs(env_u64("MEDPROOF_RECEIPT_TIMEOUT_SECS", 60)),
            receipt_poll_interval: Duration::from_millis(500),
        }
    }
}

fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Handle to a deployed registry.
///
/// Produced by [`EthLedger::connect`], which fails unless the endpoint
/// answers and the registry has code deployed. The handle does not change
/// after construction; [`EthLedger::reconnect`] builds a new one.
pub struct EthLedger {
    rpc: RpcClient,
    config: LedgerConfig,
    contract: Identity,
    chain_id: u64,
    signer: Arc<dyn TransactionSigner>,
    nonces: Arc<NonceManager>,
}

impl EthLedger {
    #[instrument(level = "info", skip_all, fields(rpc_url = %config.rpc_url))]
    pub async fn connect(config: LedgerConfig, signer: Arc<dyn TransactionSigner>) -> Result<Self> {
        Self::connect_with_nonces(config, signer, Arc::new(NonceManager::new())).await
    }

    /// A fresh handle with the same configuration and signer. Cached nonces
    /// carry over.
    pub async fn reconnect(&self) -> Result<Self> {
        info!(rpc_url = %self.config.rpc_url, "Reconnecting to ledger");
        Self::connect_with_nonces(
            self.config.clone(),
            Arc::clone(&self.signer),
            Arc::clone(&self.nonces),
        )
        .await
    }

    async fn connect_with_nonces(
        config: LedgerConfig,
        signer: Arc<dyn TransactionSigner>,
        nonces: Arc<NonceManager>,
    ) -> Result<Self> {
        let rpc = RpcClient::new(&config.rpc_url, config.request_timeout, config.retry.clone())?;

        let configured = config
            .contract_address
            .as_deref()
            .map(str::parse::<Identity>)
            .transpose()
            .map_err(|e| MedproofError::ConfigError(format!("MEDPROOF_CONTRACT_ADDRESS: {e}")))?;
        let contract =
            discover_contract_address(configured, &config.artifacts_dir, &config.address_file)?;

        let chain_id = rpc.chain_id().await?;
        if rpc.code_at(&contract).await?.is_empty() {
            return Err(MedproofError::ConfigError(format!(
                "No registry code deployed at {contract} on chain {chain_id}"
            )));
        }

        info!(contract = %contract, chain_id, "Connected to ledger");
        Ok(Self {
            rpc,
            config,
            contract,
            chain_id,
            signer,
            nonces,
        })
    }

    pub fn contract_address(&self) -> Identity {
        self.contract
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call(&self, signature: &str, tokens: &[Token], types: &[ParamType]) -> Result<Vec<Token>> {
        let output = self
            .rpc
            .eth_call(&self.contract, &abi::encode_call(signature, tokens))
            .await?;
        abi::decode(types, &output)
    }

    async fn total(&self, signature: &str) -> Result<u64> {
        first(self.call(signature, &[], &[ParamType::Uint]).await?)?.into_uint()
    }

    async fn ensure_exists(&self, id: RecordId) -> Result<()> {
        if id == 0 || id > self.total(abi::GET_TOTAL_FILES).await? {
            return Err(MedproofError::RecordNotFound(id));
        }
        Ok(())
    }

    /// Sign and submit a registry write, then wait for it to be mined.
    #[instrument(level = "debug", skip(self, data), fields(identity = %from))]
    async fn submit(&self, from: &Identity, data: Vec<u8>, gas_limit: u64) -> Result<TransactionReceipt> {
        if !self.signer.can_sign(from) {
            return Err(MedproofError::SigningFailure(format!(
                "No signing key for identity {from}"
            )));
        }

        let attempts = self.config.nonce_retries + 1;
        for attempt in 1..=attempts {
            let pending = self.rpc.pending_nonce(from).await?;
            let gas_price = self.rpc.gas_price().await?;
            let nonce = self.nonces.reserve(from, pending);

            let tx = LegacyTransaction {
                nonce,
                gas_price,
                gas_limit,
                to: self.contract,
                value: 0,
                data: data.clone(),
                chain_id: self.chain_id,
            };
            let signature = match self.signer.sign_hash(from, &tx.signing_hash()).await {
                Ok(signature) => signature,
                Err(e) => {
                    self.nonces.invalidate(from);
                    return Err(e);
                }
            };
            let raw = tx.encode_signed(&signature);
            let tx_hash = transaction_hash(&raw);

            // Transient send failures are retried inside the RPC client with
            // these exact bytes, so the node sees one transaction.
            match self.rpc.send_raw_transaction(&raw).await {
                Ok(_) => return self.await_receipt(&tx_hash).await,
                Err(MedproofError::LedgerRejected { ref message, .. }) if is_already_known(message) => {
                    debug!(tx_hash = %tx_hash, "Node already holds transaction");
                    return self.await_receipt(&tx_hash).await;
                }
                Err(MedproofError::LedgerRejected { ref message, .. }) if is_nonce_conflict(message) => {
                    if let Some(receipt) = self.rpc.transaction_receipt(&tx_hash).await? {
                        return check_receipt(receipt);
                    }
                    warn!(identity = %from, nonce, attempt, reason = %message, "Nonce collision, resubmitting with a fresh nonce");
                    self.nonces.invalidate(from);
                }
                Err(e) => {
                    self.nonces.invalidate(from);
                    return Err(e);
                }
            }
        }

        Err(MedproofError::LedgerRejected {
            code: NONCE_EXHAUSTED_CODE,
            message: format!("Nonce collisions persisted after {attempts} attempts for {from}"),
        })
    }

    async fn await_receipt(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        let deadline = Instant::now() + self.config.receipt_timeout;
        loop {
            if let Some(receipt) = self.rpc.transaction_receipt(tx_hash).await? {
                return check_receipt(receipt);
            }
            if Instant::now() >= deadline {
                return Err(MedproofError::LedgerUnavailable(format!(
                    "Transaction {tx_hash} not mined within {}s",
                    self.config.receipt_timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.config.receipt_poll_interval).await;
        }
    }

    /// Read a record already known to exist.
    async fn read_record(&self, id: RecordId) -> Result<FileRecord> {
        let tokens = self
            .call(abi::GET_FILE, &[Token::Uint(id)], &FILE_RECORD_TYPES)
            .await?;
        decode_file_record(id, tokens)
    }

    async fn verification_log(&self, id: u64) -> Result<VerificationLog> {
        let tokens = self
            .call(abi::GET_VERIFICATION_LOG, &[Token::Uint(id)], &VERIFICATION_LOG_TYPES)
            .await?;
        decode_verification_log(id, tokens)
    }
}

#[async_trait]
impl Ledger for EthLedger {
    #[instrument(level = "info", skip(self, record), fields(identity = %uploader, file_name = %record.file_name))]
    async fn register(&self, record: NewRecord, uploader: &Identity) -> Result<FileRecord> {
        let envelope = encode_metadata(&record.subject, &record.metadata)?;
        let data = abi::encode_call(
            abi::UPLOAD_FILE,
            &[
                Token::String(record.file_name),
                Token::String(record.fingerprint.to_string()),
                Token::String(record.content_id.to_string()),
                Token::String(record.file_type),
                Token::Uint(record.file_size_bytes),
                Token::Address(subject_address(&record.subject)),
                Token::String(envelope),
            ],
        );

        let receipt = self.submit(uploader, data, GAS_REGISTER).await?;
        let id = match event_id(&receipt, &self.contract, abi::FILE_UPLOADED_EVENT) {
            Some(id) => id,
            None => {
                let id = self.total(abi::GET_TOTAL_FILES).await?;
                warn!(tx_hash = %receipt.transaction_hash, record_id = id, "FileUploaded event missing; using record counter");
                id
            }
        };

        info!(record_id = id, tx_hash = %receipt.transaction_hash, "File registered on ledger");
        self.get_record(id).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_record(&self, id: RecordId) -> Result<FileRecord> {
        self.ensure_exists(id).await?;
        self.read_record(id).await
    }

    #[instrument(level = "info", skip(self, presented, notes), fields(identity = %verifier))]
    async fn append_verification(
        &self,
        record_id: RecordId,
        presented: &Fingerprint,
        notes: &str,
        verifier: &Identity,
    ) -> Result<VerificationLog> {
        let data = abi::encode_call(
            abi::VERIFY_FILE,
            &[
                Token::Uint(record_id),
                Token::String(presented.to_string()),
                Token::String(notes.to_string()),
            ],
        );

        let receipt = self.submit(verifier, data, GAS_VERIFY).await?;
        let log_id = match event_id(&receipt, &self.contract, abi::FILE_VERIFIED_EVENT) {
            Some(id) => id,
            None => {
                let id = self.total(abi::GET_TOTAL_VERIFICATIONS).await?;
                warn!(tx_hash = %receipt.transaction_hash, log_id = id, "FileVerified event missing; using log counter");
                id
            }
        };

        self.verification_log(log_id).await
    }

    async fn list_by_subject(&self, subject: &SubjectReference) -> Result<Vec<FileRecord>> {
        let total = self.total(abi::GET_TOTAL_FILES).await?;
        let mut records = Vec::new();
        for id in 1..=total {
            let record = self.read_record(id).await?;
            if subject_matches(&record.subject, subject) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn list_by_uploader(&self, uploader: &Identity) -> Result<Vec<FileRecord>> {
        let ids = first(
            self.call(abi::GET_USER_FILES, &[Token::Address(*uploader)], &[ParamType::UintArray])
                .await?,
        )?
        .into_uint_array()?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            records.push(self.read_record(id).await?);
        }
        Ok(records)
    }

    async fn verification_logs(&self, record_id: RecordId) -> Result<Vec<VerificationLog>> {
        self.ensure_exists(record_id).await?;
        let total = self.total(abi::GET_TOTAL_VERIFICATIONS).await?;
        let mut logs = Vec::new();
        for id in 1..=total {
            let log = self.verification_log(id).await?;
            if log.file_record_id == record_id {
                logs.push(log);
            }
        }
        Ok(logs)
    }

    #[instrument(level = "info", skip(self), fields(identity = %actor))]
    async fn invalidate(&self, record_id: RecordId, actor: &Identity) -> Result<()> {
        self.ensure_exists(record_id).await?;
        let data = abi::encode_call(abi::INVALIDATE_FILE, &[Token::Uint(record_id)]);
        let receipt = self.submit(actor, data, GAS_INVALIDATE).await?;
        info!(record_id, tx_hash = %receipt.transaction_hash, "Record invalidated");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let block = self.rpc.block_number().await?;
        debug!(block, "Ledger reachable");
        Ok(())
    }
}

/// On-chain metadata string: the subject reference plus caller annotations.
#[derive(Debug, Serialize, Deserialize)]
struct MetadataEnvelope {
    subject_reference: String,
    #[serde(default)]
    annotations: Metadata,
}

fn encode_metadata(subject: &SubjectReference, annotations: &Metadata) -> Result<String> {
    Ok(serde_json::to_string(&MetadataEnvelope {
        subject_reference: subject.as_str().to_string(),
        annotations: annotations.clone(),
    })?)
}

/// Recover subject and annotations; records written without the envelope
/// keep their raw string under `raw`.
fn decode_metadata(subject_address: &Identity, raw: &str) -> (SubjectReference, Metadata) {
    if let Ok(envelope) = serde_json::from_str::<MetadataEnvelope>(raw) {
        if let Ok(subject) = SubjectReference::new(envelope.subject_reference) {
            return (subject, envelope.annotations);
        }
    }

    let mut annotations = Metadata::new();
    if !raw.is_empty() {
        annotations.insert("raw".to_string(), raw.to_string());
    }
    (SubjectReference::from_identity(subject_address), annotations)
}

/// Address stored in the registry's subject slot.
fn subject_address(subject: &SubjectReference) -> Identity {
    subject.as_identity().unwrap_or_else(|| {
        let hash = keccak256(format!("{SUBJECT_DOMAIN}{}", subject.as_str()).as_bytes());
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);
        Identity::from_bytes(address)
    })
}

fn subject_matches(stored: &SubjectReference, query: &SubjectReference) -> bool {
    if stored == query {
        return true;
    }
    match (stored.as_identity(), query.as_identity()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn decode_file_record(id: RecordId, tokens: Vec<Token>) -> Result<FileRecord> {
    let mut tokens = tokens.into_iter();
    let mut next = || {
        tokens
            .next()
            .ok_or_else(|| MedproofError::MalformedRecord(format!("record {id}: missing field")))
    };

    let file_name = next()?.into_string()?;
    let fingerprint = Fingerprint::parse(&next()?.into_string()?)
        .map_err(|e| MedproofError::MalformedRecord(format!("record {id}: {e}")))?;
    let content_id = ContentId::new(next()?.into_string()?);
    let file_type = next()?.into_string()?;
    let file_size_bytes = next()?.into_uint()?;
    let uploader = next()?.into_address()?;
    let subject_address = next()?.into_address()?;
    let registered_at = timestamp(id, next()?.into_uint()?)?;
    let valid = next()?.into_bool()?;
    let (subject, metadata) = decode_metadata(&subject_address, &next()?.into_string()?);

    Ok(FileRecord {
        id,
        file_name,
        file_type,
        file_size_bytes,
        fingerprint,
        content_id,
        uploader,
        subject,
        registered_at,
        metadata,
        valid,
    })
}

fn decode_verification_log(id: u64, tokens: Vec<Token>) -> Result<VerificationLog> {
    let mut tokens = tokens.into_iter();
    let mut next = || {
        tokens
            .next()
            .ok_or_else(|| MedproofError::MalformedRecord(format!("log {id}: missing field")))
    };
    let parse = |hex: String| {
        Fingerprint::parse(&hex).map_err(|e| MedproofError::MalformedRecord(format!("log {id}: {e}")))
    };

    let file_record_id = next()?.into_uint()?;
    let registered_fingerprint = parse(next()?.into_string()?)?;
    let presented_fingerprint = parse(next()?.into_string()?)?;
    let is_match = next()?.into_bool()?;
    let verified_by = next()?.into_address()?;
    let verified_at = timestamp(id, next()?.into_uint()?)?;
    let notes = next()?.into_string()?;

    Ok(VerificationLog {
        id,
        file_record_id,
        registered_fingerprint,
        presented_fingerprint,
        is_match,
        verified_by,
        verified_at,
        notes,
    })
}

fn timestamp(id: u64, seconds: u64) -> Result<DateTime<Utc>> {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| MedproofError::MalformedRecord(format!("entry {id}: timestamp {seconds} out of range")))
}

fn first(tokens: Vec<Token>) -> Result<Token> {
    tokens
        .into_iter()
        .next()
        .ok_or_else(|| MedproofError::MalformedRecord("empty return data".into()))
}

fn check_receipt(receipt: TransactionReceipt) -> Result<TransactionReceipt> {
    if receipt.succeeded() {
        Ok(receipt)
    } else {
        Err(MedproofError::LedgerRejected {
            code: REVERTED_CODE,
            message: format!("Transaction {} reverted", receipt.transaction_hash),
        })
    }
}

/// First indexed argument of the registry event with `signature`.
fn event_id(receipt: &TransactionReceipt, contract: &Identity, signature: &str) -> Option<u64> {
    let topic = abi::event_topic(signature);
    receipt
        .logs
        .iter()
        .filter(|log| log.address.parse::<Identity>().ok().as_ref() == Some(contract))
        .find(|log| {
            log.topics
                .first()
                .and_then(|t| decode_hex(t).ok())
                .is_some_and(|t| t == topic)
        })
        .and_then(|log| log.topics.get(1))
        .and_then(|t| decode_hex(t).ok())
        .and_then(|word| abi::word_to_u64(&word).ok())
}

fn is_nonce_conflict(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("nonce too low")
        || lower.contains("replacement transaction underpriced")
        || lower.contains("nonce has already been used")
        || lower.contains("the tx doesn't have the correct nonce")
}

fn is_already_known(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("already known") || lower.contains("known transaction")
}
