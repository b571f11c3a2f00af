//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use medproof_core::IntegrityService;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Integrity service over the ledger, content store and local archive
    pub service: IntegrityService,
}

impl AppState {
    pub fn new(service: IntegrityService) -> Self {
        Self { service }
    }
}
