//! Content-addressed object storage.
//!
//! The store keeps the registered bytes; the ledger keeps only their
//! fingerprint and the identifier returned here.
//!
//! - **IPFS** - HTTP API (`add`, `pin/add`, `cat`) of a local or remote node
//! - **Memory** - in-process store for tests, with failure injection

mod ipfs;
mod memory;

pub use ipfs::{IpfsStore, IpfsStoreConfig};
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::ContentId;

/// A content-addressed object store.
///
/// Implementations must be thread-safe (`Send + Sync`) and must surface an
/// unreachable backend as [`MedproofError::StoreUnavailable`] rather than
/// inventing an identifier.
///
/// [`MedproofError::StoreUnavailable`]: crate::MedproofError::StoreUnavailable
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their content identifier.
    async fn put(&self, file_name: &str, data: &[u8]) -> Result<ContentId>;

    /// Protect stored content from garbage collection.
    async fn pin(&self, cid: &ContentId) -> Result<()>;

    /// Retrieve content; `Ok(None)` when the store does not hold it.
    async fn get(&self, cid: &ContentId) -> Result<Option<Vec<u8>>>;

    /// Cheap reachability check.
    async fn health_check(&self) -> Result<()>;
}
