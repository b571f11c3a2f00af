//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod health;
pub mod records;
pub mod register;
pub mod verify;

pub use crate::state::AppState;
pub use health::{health, ready, ComponentHealth, HealthResponse, ReadyResponse};
pub use records::{
    get_content_handler, get_record_handler, invalidate_handler, subject_files_handler,
    uploader_files_handler, verification_history_handler, RecordResponse,
    VerificationLogResponse, CONTENT_SOURCE_HEADER, FINGERPRINT_MATCH_HEADER,
};
pub use register::{register_handler, RegisterResponse};
pub use verify::{verify_handler, VerifyResponse};
