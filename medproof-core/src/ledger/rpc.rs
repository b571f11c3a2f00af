//! Ethereum JSON-RPC transport.
//!
//! Every call is retried on connectivity failures and transient HTTP
//! statuses, and surfaces as [`MedproofError::LedgerUnavailable`] once the
//! attempts run out. A JSON-RPC error object is a rejection and is never
//! retried here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::error::{MedproofError, Result};
use crate::http::{is_transient_error, is_transient_status, retry, RetryPolicy};
use crate::record::Identity;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Event log entry of a receipt.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// Subset of `eth_getTransactionReceipt` the ledger client needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl TransactionReceipt {
    /// `true` when the transaction executed without reverting.
    pub fn succeeded(&self) -> bool {
        self.status
            .as_deref()
            .and_then(|s| parse_quantity(s).ok())
            .is_some_and(|s| s == 1)
    }
}

/// JSON-RPC client for one endpoint.
pub struct RpcClient {
    client: Client,
    url: String,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            MedproofError::ConfigError(format!("Failed to create ledger HTTP client: {e}"))
        })?;
        Ok(Self {
            client,
            url: url.into(),
            retry,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` with retries on transient failures.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        retry(&self.retry, "ledger", || self.call_once(method, &params)).await
    }

    #[instrument(level = "debug", skip(self, params), fields(url = %self.url))]
    async fn call_once<T: DeserializeOwned>(&self, method: &str, params: &Value) -> Result<T> {
        let start = Instant::now();
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let latency_ms = start.elapsed().as_millis() as u64;
                if is_transient_error(&e) {
                    warn!(method, error = %e, latency_ms, "Transient ledger error");
                    MedproofError::LedgerUnavailable(format!("{method}: {e}"))
                } else {
                    warn!(method, error = %e, latency_ms, "Ledger request failed");
                    MedproofError::LedgerRejected {
                        code: -32603,
                        message: format!("{method}: {e}"),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if is_transient_status(status) {
                warn!(method, status = %status, "Transient ledger status");
                MedproofError::LedgerUnavailable(format!("{method} returned {status}"))
            } else {
                MedproofError::LedgerRejected {
                    code: i64::from(status.as_u16()),
                    message: format!("{method} returned {status}: {body}"),
                }
            });
        }

        let body: RpcResponse = response.json().await.map_err(|e| {
            MedproofError::LedgerUnavailable(format!("{method}: unreadable response: {e}"))
        })?;

        debug!(
            method,
            latency_ms = start.elapsed().as_millis() as u64,
            "Ledger call completed"
        );

        if let Some(error) = body.error {
            return Err(MedproofError::LedgerRejected {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(body.result.unwrap_or(Value::Null)).map_err(|e| {
            MedproofError::MalformedRecord(format!("{method}: unexpected result shape: {e}"))
        })
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let hex: String = self.call("eth_chainId", json!([])).await?;
        parse_quantity(&hex)
    }

    pub async fn block_number(&self) -> Result<u64> {
        let hex: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&hex)
    }

    pub async fn gas_price(&self) -> Result<u128> {
        let hex: String = self.call("eth_gasPrice", json!([])).await?;
        parse_quantity_u128(&hex)
    }

    /// Deployed bytecode at `address` (empty when nothing is deployed).
    pub async fn code_at(&self, address: &Identity) -> Result<Vec<u8>> {
        let hex: String = self
            .call("eth_getCode", json!([address.to_hex(), "latest"]))
            .await?;
        decode_hex(&hex)
    }

    /// Transaction count including pending transactions.
    pub async fn pending_nonce(&self, address: &Identity) -> Result<u64> {
        let hex: String = self
            .call("eth_getTransactionCount", json!([address.to_hex(), "pending"]))
            .await?;
        parse_quantity(&hex)
    }

    /// Read-only contract call against the latest block.
    pub async fn eth_call(&self, to: &Identity, data: &[u8]) -> Result<Vec<u8>> {
        let hex: String = self
            .call(
                "eth_call",
                json!([{ "to": to.to_hex(), "data": format!("0x{}", hex::encode(data)) }, "latest"]),
            )
            .await?;
        decode_hex(&hex)
    }

    /// Submit raw signed transaction bytes; returns the node's transaction hash.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        self.call(
            "eth_sendRawTransaction",
            json!([format!("0x{}", hex::encode(raw))]),
        )
        .await
    }

    /// Receipt of a mined transaction; `None` while it is pending or unknown.
    pub async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>> {
        self.call("eth_getTransactionReceipt", json!([tx_hash])).await
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(hex: &str) -> Result<u64> {
    let digits = hex.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| MedproofError::MalformedRecord(format!("Invalid quantity '{hex}': {e}")))
}

fn parse_quantity_u128(hex: &str) -> Result<u128> {
    let digits = hex.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| MedproofError::MalformedRecord(format!("Invalid quantity '{hex}': {e}")))
}

/// Decode `0x`-prefixed hex data.
pub fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    let digits = hex.trim().trim_start_matches("0x");
    hex::decode(digits)
        .map_err(|e| MedproofError::MalformedRecord(format!("Invalid hex data: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert_eq!(parse_quantity_u128("0x4a817c800").unwrap(), 20_000_000_000);
        assert!(parse_quantity("0xnope").is_err());
    }

    #[test]
    fn test_receipt_status() {
        let receipt: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "blockNumber": "0x10",
            "status": "0x1",
            "logs": [{ "address": "0x01", "topics": ["0xaa"], "data": "0x" }]
        }))
        .unwrap();
        assert!(receipt.succeeded());
        assert_eq!(receipt.logs.len(), 1);

        let reverted: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "status": "0x0"
        }))
        .unwrap();
        assert!(!reverted.succeeded());
    }

    #[test]
    fn test_error_response_shape() {
        let body: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "nonce too low" }
        }))
        .unwrap();
        let error = body.error.unwrap();
        assert_eq!(error.code, -32000);
        assert_eq!(error.message, "nonce too low");
        assert!(body.result.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_ledger_unavailable() {
        let rpc = RpcClient::new(
            "http://127.0.0.1:9",
            Duration::from_secs(2),
            RetryPolicy::immediate(2),
        )
        .unwrap();
        let err = rpc.block_number().await.unwrap_err();
        assert!(matches!(err, MedproofError::LedgerUnavailable(_)), "{err:?}");
    }
}
