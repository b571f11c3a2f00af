//! Verification handler
//!
//! Handles POST /files/{id}/verify requests to compare presented content
//! against a registered record.

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use medproof_core::{PresentedContent, VerificationOutcome};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::RequestActor;
use crate::error::ApiError;
use crate::handlers::AppState;
use crate::multipart::MultipartFields;

/// Response for verification
#[derive(Serialize, ToSchema)]
pub struct VerifyResponse {
    pub record_id: u64,
    /// "verified" or "tampered"
    #[schema(example = "verified")]
    pub status: &'static str,
    pub is_match: bool,
    pub registered_fingerprint: String,
    pub presented_fingerprint: String,
    /// Id of the appended log entry
    pub log_id: Option<u64>,
    /// False when the comparison ran but the log entry could not be written
    pub logged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_error: Option<String>,
    pub record_valid: bool,
    pub verified_at: DateTime<Utc>,
}

impl From<VerificationOutcome> for VerifyResponse {
    fn from(outcome: VerificationOutcome) -> Self {
        Self {
            record_id: outcome.record_id,
            status: outcome.status(),
            is_match: outcome.is_match,
            registered_fingerprint: outcome.registered_fingerprint.to_string(),
            presented_fingerprint: outcome.presented_fingerprint.to_string(),
            log_id: outcome.log_id,
            logged: outcome.logged,
            log_error: outcome.log_error,
            record_valid: outcome.record_valid,
            verified_at: outcome.verified_at,
        }
    }
}

/// Verify content against a registered record
///
/// Accepts multipart/form-data with:
/// - **file** (required): the copy to check
/// - **notes** (optional): stored with the verification log entry
///
/// A mismatch is a successful answer: 200 with `"status": "tampered"`.
/// Every attempt is appended to the record's verification history.
#[utoipa::path(
    post,
    path = "/files/{id}/verify",
    tag = "Verification",
    params(
        ("id" = u64, Path, description = "Record id"),
        ("x-actor-identity" = String, Header, description = "Caller ledger identity"),
        ("x-actor-role" = String, Header, description = "Caller role")
    ),
    request_body(content_type = "multipart/form-data", description = "Content to verify"),
    responses(
        (status = 200, description = "Verification completed", body = VerifyResponse),
        (status = 400, description = "Missing file"),
        (status = 404, description = "No such record"),
        (status = 503, description = "Ledger unavailable")
    )
)]
pub async fn verify_handler(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<u64>,
    mut multipart: Multipart,
) -> Result<Json<VerifyResponse>, ApiError> {
    let max_file_size = state.service.policy().max_file_size;
    let mut fields = MultipartFields::parse(&mut multipart, max_file_size).await?;

    let file = fields.take_file()?;
    let notes = fields.get_text("notes").map(str::to_string);

    let outcome = state
        .service
        .verify(id, PresentedContent::Bytes(file.data), &actor, notes)
        .await?;

    Ok(Json(outcome.into()))
}
