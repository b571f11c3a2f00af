//! Record read and lifecycle handlers
//!
//! Lookups of file records and their audit trail, content retrieval and
//! administrative invalidation.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use medproof_core::validation::sanitize_file_name;
use medproof_core::{FileRecord, Identity, SubjectReference, VerificationLog};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::RequestActor;
use crate::error::ApiError;
use crate::handlers::AppState;

/// Where the bytes served by `/files/{id}/content` came from.
pub const CONTENT_SOURCE_HEADER: HeaderName = HeaderName::from_static("x-content-source");
/// Whether the served bytes still hash to the registered fingerprint.
pub const FINGERPRINT_MATCH_HEADER: HeaderName = HeaderName::from_static("x-fingerprint-match");

/// A file record as registered on the ledger
#[derive(Debug, Serialize, ToSchema)]
pub struct RecordResponse {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "patient_note.txt")]
    pub file_name: String,
    #[schema(example = "txt")]
    pub file_type: String,
    pub file_size_bytes: u64,
    /// Lowercase hex SHA-256 of the content at registration time
    #[schema(example = "2689367b205c16ce32ed4200942b8b8b1e262dfc70d9bc9fbc77c49699a4f1df")]
    pub fingerprint: String,
    /// Content-store locator
    pub content_id: String,
    /// Ledger identity that registered the file
    pub uploader: String,
    pub subject_reference: String,
    pub registered_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
    /// False once an administrator has invalidated the record
    pub valid: bool,
}

impl From<FileRecord> for RecordResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            file_name: record.file_name,
            file_type: record.file_type,
            file_size_bytes: record.file_size_bytes,
            fingerprint: record.fingerprint.to_string(),
            content_id: record.content_id.to_string(),
            uploader: record.uploader.to_hex(),
            subject_reference: record.subject.to_string(),
            registered_at: record.registered_at,
            metadata: record.metadata,
            valid: record.valid,
        }
    }
}

/// One entry of a record's verification history
#[derive(Debug, Serialize, ToSchema)]
pub struct VerificationLogResponse {
    pub id: u64,
    pub file_record_id: u64,
    pub registered_fingerprint: String,
    pub presented_fingerprint: String,
    pub is_match: bool,
    pub verified_by: String,
    pub verified_at: DateTime<Utc>,
    pub notes: String,
}

impl From<VerificationLog> for VerificationLogResponse {
    fn from(log: VerificationLog) -> Self {
        Self {
            id: log.id,
            file_record_id: log.file_record_id,
            registered_fingerprint: log.registered_fingerprint.to_string(),
            presented_fingerprint: log.presented_fingerprint.to_string(),
            is_match: log.is_match,
            verified_by: log.verified_by.to_hex(),
            verified_at: log.verified_at,
            notes: log.notes,
        }
    }
}

fn records(records: Vec<FileRecord>) -> Json<Vec<RecordResponse>> {
    Json(records.into_iter().map(RecordResponse::from).collect())
}

/// Get a file record
#[utoipa::path(
    get,
    path = "/files/{id}",
    tag = "Records",
    params(("id" = u64, Path, description = "Record id")),
    responses(
        (status = 200, description = "File record", body = RecordResponse),
        (status = 404, description = "No such record"),
        (status = 503, description = "Ledger unavailable")
    )
)]
pub async fn get_record_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RecordResponse>, ApiError> {
    let record = state.service.get_record(id).await?;
    Ok(Json(record.into()))
}

/// Download the stored content of a record
///
/// Served from the content store, or from the local archive when the store
/// is unreachable. `X-Content-Source` names the source and
/// `X-Fingerprint-Match` reports whether the bytes still hash to the
/// registered fingerprint.
#[utoipa::path(
    get,
    path = "/files/{id}/content",
    tag = "Records",
    params(
        ("id" = u64, Path, description = "Record id"),
        ("x-actor-identity" = String, Header, description = "Caller ledger identity"),
        ("x-actor-role" = String, Header, description = "Caller role")
    ),
    responses(
        (status = 200, description = "File bytes", content_type = "application/octet-stream"),
        (status = 404, description = "No such record, or content missing from the store"),
        (status = 503, description = "Store unreachable and no archived copy")
    )
)]
pub async fn get_content_handler(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let fetched = state.service.fetch(id, &actor).await?;

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                sanitize_file_name(&fetched.record.file_name)
            ),
        ),
        (CONTENT_SOURCE_HEADER, fetched.source.label().to_string()),
        (FINGERPRINT_MATCH_HEADER, fetched.fingerprint_matches.to_string()),
    ];
    Ok((headers, fetched.bytes))
}

/// List the verification history of a record, oldest first
#[utoipa::path(
    get,
    path = "/files/{id}/verifications",
    tag = "Records",
    params(("id" = u64, Path, description = "Record id")),
    responses(
        (status = 200, description = "Verification log entries", body = [VerificationLogResponse]),
        (status = 404, description = "No such record")
    )
)]
pub async fn verification_history_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<VerificationLogResponse>>, ApiError> {
    let logs = state.service.verification_history(id).await?;
    Ok(Json(logs.into_iter().map(Into::into).collect()))
}

/// Invalidate a record (admin only)
///
/// The record is kept and its history remains readable; only its validity
/// flag is cleared.
#[utoipa::path(
    post,
    path = "/files/{id}/invalidate",
    tag = "Records",
    params(
        ("id" = u64, Path, description = "Record id"),
        ("x-actor-identity" = String, Header, description = "Caller ledger identity"),
        ("x-actor-role" = String, Header, description = "Caller role")
    ),
    responses(
        (status = 204, description = "Record invalidated"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "No such record")
    )
)]
pub async fn invalidate_handler(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state.service.invalidate(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List records registered for a subject
#[utoipa::path(
    get,
    path = "/subjects/{subject}/files",
    tag = "Records",
    params(("subject" = String, Path, description = "Subject reference")),
    responses((status = 200, description = "Records for the subject", body = [RecordResponse]))
)]
pub async fn subject_files_handler(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Result<Json<Vec<RecordResponse>>, ApiError> {
    let subject = SubjectReference::new(subject)?;
    Ok(records(state.service.list_by_subject(&subject).await?))
}

/// List records registered by an uploader identity
#[utoipa::path(
    get,
    path = "/uploaders/{identity}/files",
    tag = "Records",
    params(("identity" = String, Path, description = "0x-prefixed ledger address")),
    responses(
        (status = 200, description = "Records registered by the identity", body = [RecordResponse]),
        (status = 400, description = "Malformed identity")
    )
)]
pub async fn uploader_files_handler(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<Json<Vec<RecordResponse>>, ApiError> {
    let identity: Identity = identity.parse()?;
    Ok(records(state.service.list_by_uploader(&identity).await?))
}
