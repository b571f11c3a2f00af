//! File registration handler
//!
//! Handles POST /files requests: validate, fingerprint, store and record a
//! file on the ledger.

use std::collections::BTreeMap;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use medproof_core::{RegisterRequest, SubjectReference};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::RequestActor;
use crate::error::ApiError;
use crate::handlers::{AppState, RecordResponse};
use crate::multipart::MultipartFields;

/// Response for a successful registration
#[derive(Serialize, ToSchema)]
pub struct RegisterResponse {
    pub record: RecordResponse,
    /// False when the content store accepted the file but would not pin it
    pub pinned: bool,
}

/// Register a file
///
/// Accepts multipart/form-data with:
/// - **file** (required): the file; its filename selects the file type
/// - **subject_reference** (required): who the file pertains to
/// - **file_type** (optional): overrides the extension-derived type
/// - **metadata** (optional): JSON object of string annotations
/// - **description**, **category** (optional): stored as annotations
///
/// Disallowed extensions and oversized files are rejected before any
/// storage or ledger call.
#[utoipa::path(
    post,
    path = "/files",
    tag = "Registration",
    params(
        ("x-actor-identity" = String, Header, description = "Caller ledger identity"),
        ("x-actor-role" = String, Header, description = "Caller role")
    ),
    request_body(content_type = "multipart/form-data", description = "File and registration fields"),
    responses(
        (status = 201, description = "File registered", body = RegisterResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Role may not register files"),
        (status = 503, description = "Ledger or content store unavailable")
    )
)]
pub async fn register_handler(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let max_file_size = state.service.policy().max_file_size;
    let mut fields = MultipartFields::parse(&mut multipart, max_file_size).await?;

    let file = fields.take_file()?;
    let file_name = file
        .file_name
        .ok_or_else(|| ApiError::bad_request("The 'file' part must carry a filename"))?;
    let subject = SubjectReference::new(fields.require_text("subject_reference")?)?;

    let mut metadata: BTreeMap<String, String> = fields.get_json("metadata")?.unwrap_or_default();
    for key in ["description", "category"] {
        if let Some(value) = fields.get_text(key) {
            metadata.insert(key.to_string(), value.to_string());
        }
    }

    let mut request =
        RegisterRequest::new(file.data, file_name, subject, actor).with_metadata(metadata);
    if let Some(file_type) = fields.get_text("file_type") {
        request = request.with_file_type(file_type);
    }

    let registration = state.service.register(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            record: registration.record.into(),
            pinned: registration.pinned,
        }),
    ))
}
