//! IPFS HTTP API client.
//!
//! Talks to the `/api/v0` endpoints of a Kubo-compatible node:
//!
//! - `add` to store bytes and obtain their CID
//! - `pin/add` to keep them from being garbage-collected
//! - `cat` to read them back
//!
//! Transient failures (connect errors, timeouts, 429/502/503/504) are retried
//! with exponential backoff; once retries are exhausted they surface as
//! [`MedproofError::StoreUnavailable`]. No placeholder identifier is ever
//! returned in place of a real one.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::ContentStore;
use crate::error::{MedproofError, Result};
use crate::http::{is_transient_error, is_transient_status, retry, RetryPolicy};
use crate::record::ContentId;

/// Default IPFS API endpoint.
const DEFAULT_API_URL: &str = "http://127.0.0.1:5001";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of attempts for transient errors.
const MAX_RETRIES: u32 = 3;

/// Error messages a node returns for content it does not hold.
const NOT_FOUND_MARKERS: &[&str] = &[
    "not found",
    "no link named",
    "invalid path",
    "failed to resolve",
];

/// Response of `/api/v0/add`.
#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Name")]
    _name: Option<String>,
    #[serde(rename = "Hash")]
    hash: String,
}

/// Error body returned by the node on non-2xx responses.
#[derive(Debug, Deserialize)]
struct IpfsErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

/// Configuration for the IPFS client.
#[derive(Debug, Clone)]
pub struct IpfsStoreConfig {
    /// Base URL of the node's HTTP API (without `/api/v0`).
    pub api_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Backoff applied to transient failures.
    pub retry: RetryPolicy,
    /// Serve `cat` from the node's local blockstore only. An online node
    /// otherwise searches the network for an unknown CID until the request
    /// times out, instead of answering "not found".
    pub offline_reads: bool,
}

impl Default for IpfsStoreConfig {
    fn default() -> Self {
        let max_retries = std::env::var("MEDPROOF_STORE_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(MAX_RETRIES);

        Self {
            api_url: std::env::var("MEDPROOF_IPFS_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default().with_max_attempts(max_retries),
            offline_reads: std::env::var("MEDPROOF_IPFS_OFFLINE_READS")
                .map(|v| !matches!(v.trim(), "0" | "false" | "no"))
                .unwrap_or(true),
        }
    }
}

/// IPFS-backed [`ContentStore`].
pub struct IpfsStore {
    client: Client,
    config: IpfsStoreConfig,
}

impl IpfsStore {
    /// Create a client with configuration taken from the environment.
    pub fn new() -> Result<Self> {
        Self::with_config(IpfsStoreConfig::default())
    }

    /// Create a client with custom configuration.
    #[instrument(level = "debug", skip_all, fields(
        api_url = %config.api_url,
        timeout_ms = config.timeout.as_millis() as u64,
        max_attempts = config.retry.max_attempts
    ))]
    pub fn with_config(config: IpfsStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                MedproofError::ConfigError(format!("Failed to create IPFS HTTP client: {e}"))
            })?;

        debug!("IPFS client created");
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/v0/{}",
            self.config.api_url.trim_end_matches('/'),
            path
        )
    }

    async fn add_once(&self, file_name: &str, data: &[u8]) -> Result<ContentId> {
        let start = Instant::now();
        let form = Form::new().part(
            "file",
            Part::bytes(data.to_vec()).file_name(file_name.to_string()),
        );

        let response = self
            .client
            .post(self.endpoint("add"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| send_error("add", &e, start))?;
        let response = check_status("add", response, start).await?;

        let body = response
            .text()
            .await
            .map_err(|e| MedproofError::StoreUnavailable(format!("IPFS add body: {e}")))?;

        // A single-file add answers with one JSON object per line; the last
        // one describes the file itself.
        let line = body
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| MedproofError::StoreRejected("IPFS add returned an empty body".into()))?;
        let parsed: AddResponse = serde_json::from_str(line).map_err(|e| {
            MedproofError::StoreRejected(format!("Failed to parse IPFS add response: {e}"))
        })?;

        if parsed.hash.is_empty() {
            return Err(MedproofError::StoreRejected(
                "IPFS add response carried no hash".into(),
            ));
        }

        Ok(ContentId::new(parsed.hash))
    }

    async fn pin_once(&self, cid: &ContentId) -> Result<()> {
        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint("pin/add"))
            .query(&[("arg", cid.as_str())])
            .send()
            .await
            .map_err(|e| send_error("pin/add", &e, start))?;
        check_status("pin/add", response, start).await?;
        Ok(())
    }

    async fn cat_once(&self, cid: &ContentId) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint("cat"))
            .query(&[
                ("arg", cid.as_str()),
                ("offline", if self.config.offline_reads { "true" } else { "false" }),
            ])
            .send()
            .await
            .map_err(|e| send_error("cat", &e, start))?;

        let status = response.status();
        if !status.is_success() && !is_transient_status(status) {
            let message = error_message(response).await;
            if is_not_found_message(&message) {
                debug!(cid = %cid, "Content not held by store");
                return Ok(None);
            }
            return Err(MedproofError::StoreRejected(format!(
                "IPFS cat returned {status}: {message}"
            )));
        }
        let response = check_status("cat", response, start).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MedproofError::StoreUnavailable(format!("IPFS cat body: {e}")))?;
        Ok(Some(bytes.to_vec()))
    }
}

#[async_trait]
impl ContentStore for IpfsStore {
    #[instrument(level = "info", skip(self, data), fields(size = data.len()))]
    async fn put(&self, file_name: &str, data: &[u8]) -> Result<ContentId> {
        let cid = retry(&self.config.retry, "ipfs", || self.add_once(file_name, data)).await?;
        info!(cid = %cid, "Content stored");
        Ok(cid)
    }

    #[instrument(level = "info", skip(self), fields(cid = %cid))]
    async fn pin(&self, cid: &ContentId) -> Result<()> {
        retry(&self.config.retry, "ipfs", || self.pin_once(cid)).await
    }

    #[instrument(level = "info", skip(self), fields(cid = %cid))]
    async fn get(&self, cid: &ContentId) -> Result<Option<Vec<u8>>> {
        retry(&self.config.retry, "ipfs", || self.cat_once(cid)).await
    }

    async fn health_check(&self) -> Result<()> {
        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint("version"))
            .send()
            .await
            .map_err(|e| send_error("version", &e, start))?;
        check_status("version", response, start).await?;
        Ok(())
    }
}

fn send_error(operation: &str, e: &reqwest::Error, start: Instant) -> MedproofError {
    let latency_ms = start.elapsed().as_millis() as u64;
    if is_transient_error(e) {
        warn!(operation, error = %e, latency_ms, "Transient IPFS error");
        MedproofError::StoreUnavailable(format!("IPFS {operation} failed: {e}"))
    } else {
        warn!(operation, error = %e, latency_ms, "Permanent IPFS error");
        MedproofError::StoreRejected(format!("IPFS {operation} failed: {e}"))
    }
}

async fn check_status(operation: &str, response: Response, start: Instant) -> Result<Response> {
    let status = response.status();
    debug!(operation, status = %status, "Received IPFS response");
    if status.is_success() {
        return Ok(response);
    }

    let latency_ms = start.elapsed().as_millis() as u64;
    let message = error_message(response).await;
    if is_transient_status(status) {
        warn!(operation, status = %status, latency_ms, "Transient IPFS status");
        Err(MedproofError::StoreUnavailable(format!(
            "IPFS {operation} returned {status}: {message}"
        )))
    } else {
        warn!(operation, status = %status, latency_ms, "IPFS request rejected");
        Err(MedproofError::StoreRejected(format!(
            "IPFS {operation} returned {status}: {message}"
        )))
    }
}

async fn error_message(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<IpfsErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text)
}

fn is_not_found_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    NOT_FOUND_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::LocalArchive;
    use crate::ledger::MemoryLedger;
    use crate::record::{Actor, Identity, Role, SubjectReference};
    use crate::service::{IntegrityService, RegisterRequest};
    use axum::body::Bytes;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::Router;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_default_config() {
        let config = IpfsStoreConfig::default();
        assert!(config.api_url.starts_with("http"));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_endpoint_joins_api_path() {
        let store = IpfsStore::with_config(IpfsStoreConfig {
            api_url: "http://ipfs.local:5001/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(store.endpoint("pin/add"), "http://ipfs.local:5001/api/v0/pin/add");
    }

    #[test]
    fn test_not_found_messages() {
        assert!(is_not_found_message("merkledag: not found"));
        assert!(is_not_found_message("block was not found locally (offline)"));
        assert!(is_not_found_message("no link named \"x\" under QmFoo"));
        assert!(!is_not_found_message("context deadline exceeded"));
    }

    #[test]
    fn test_add_response_parsing() {
        let body = r#"{"Name":"note.txt","Hash":"QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG","Size":"10"}"#;
        let parsed: AddResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.hash, "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG");
    }

    #[tokio::test]
    async fn test_unreachable_node_is_store_unavailable() {
        // Port 9 (discard) is closed on test machines; the connect error is transient.
        let store = IpfsStore::with_config(IpfsStoreConfig {
            api_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(2),
            retry: RetryPolicy::immediate(2),
            offline_reads: true,
        })
        .unwrap();

        let err = store.put("note.txt", b"ok").await.unwrap_err();
        assert!(matches!(err, MedproofError::StoreUnavailable(_)), "{err:?}");
    }

    // Local HTTP node answering `add`, `pin/add` and `cat` the way Kubo does.

    #[derive(Clone, Copy)]
    enum CatReply {
        Content(&'static [u8]),
        Missing,
        Busy,
    }

    struct StubIpfs {
        add_body: &'static str,
        cat: CatReply,
        cat_hits: AtomicUsize,
        cat_queries: Mutex<Vec<HashMap<String, String>>>,
    }

    impl StubIpfs {
        fn new(cat: CatReply) -> Arc<Self> {
            Arc::new(Self {
                add_body: concat!(
                    r#"{"Name":"patient_note.txt","Bytes":2}"#,
                    "\n",
                    r#"{"Name":"patient_note.txt","Hash":"QmNote","Size":"10"}"#,
                    "\n",
                ),
                cat,
                cat_hits: AtomicUsize::new(0),
                cat_queries: Mutex::new(Vec::new()),
            })
        }
    }

    async fn stub_add(State(node): State<Arc<StubIpfs>>, _upload: Bytes) -> &'static str {
        node.add_body
    }

    async fn stub_pin() -> &'static str {
        r#"{"Pins":["QmNote"]}"#
    }

    async fn stub_cat(
        State(node): State<Arc<StubIpfs>>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Response {
        node.cat_hits.fetch_add(1, Ordering::SeqCst);
        node.cat_queries.lock().unwrap().push(query);
        match node.cat {
            CatReply::Content(bytes) => bytes.into_response(),
            CatReply::Missing => (
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"Message":"block was not found locally (offline): ipld: could not find QmNote","Code":0,"Type":"error"}"#,
            )
                .into_response(),
            CatReply::Busy => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        }
    }

    async fn stub_store(node: Arc<StubIpfs>, attempts: u32) -> IpfsStore {
        let app = Router::new()
            .route("/api/v0/add", post(stub_add))
            .route("/api/v0/pin/add", post(stub_pin))
            .route("/api/v0/cat", post(stub_cat))
            .with_state(node);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        IpfsStore::with_config(IpfsStoreConfig {
            api_url: format!("http://{addr}"),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::immediate(attempts),
            offline_reads: true,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_add_uses_last_line_of_progress_output() {
        let node = StubIpfs::new(CatReply::Content(b"ok"));
        let store = stub_store(Arc::clone(&node), 1).await;

        let cid = store.put("patient_note.txt", b"ok").await.unwrap();
        assert_eq!(cid.as_str(), "QmNote");
        store.pin(&cid).await.unwrap();
        assert_eq!(store.get(&cid).await.unwrap().unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_missing_block_is_none_without_retry() {
        let node = StubIpfs::new(CatReply::Missing);
        let store = stub_store(Arc::clone(&node), 3).await;

        let found = store.get(&ContentId::new("QmNote")).await.unwrap();
        assert!(found.is_none());
        assert_eq!(node.cat_hits.load(Ordering::SeqCst), 1);

        let queries = node.cat_queries.lock().unwrap();
        assert_eq!(queries[0].get("arg").map(String::as_str), Some("QmNote"));
        assert_eq!(queries[0].get("offline").map(String::as_str), Some("true"));
    }

    #[tokio::test]
    async fn test_busy_node_is_retried_then_unavailable() {
        let node = StubIpfs::new(CatReply::Busy);
        let store = stub_store(Arc::clone(&node), 3).await;

        let err = store.get(&ContentId::new("QmNote")).await.unwrap_err();
        assert!(matches!(err, MedproofError::StoreUnavailable(_)), "{err:?}");
        assert_eq!(node.cat_hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_of_unheld_content_is_content_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = stub_store(StubIpfs::new(CatReply::Missing), 2).await;
        let service = IntegrityService::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(store),
            LocalArchive::new(dir.path()),
        );
        let clinician = Actor::new(Identity::from_bytes([1; 20]), Role::Clinician);

        let registration = service
            .register(RegisterRequest::new(
                b"ok".to_vec(),
                "patient_note.txt",
                SubjectReference::new("patient-42").unwrap(),
                clinician,
            ))
            .await
            .unwrap();
        assert_eq!(registration.record.content_id.as_str(), "QmNote");
        assert!(registration.pinned);

        let err = service
            .fetch(registration.record.id, &clinician)
            .await
            .unwrap_err();
        assert!(
            matches!(err, MedproofError::ContentUnavailable { record_id: 1, .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    #[ignore = "requires a local IPFS node on 127.0.0.1:5001"]
    async fn test_ipfs_roundtrip_real_node() {
        let store = IpfsStore::new().unwrap();
        let cid = store.put("note.txt", b"ok").await.unwrap();
        store.pin(&cid).await.unwrap();
        assert_eq!(store.get(&cid).await.unwrap().unwrap(), b"ok");
    }
}
