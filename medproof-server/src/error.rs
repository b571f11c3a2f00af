//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use medproof_core::MedproofError;
use thiserror::Error;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unauthorized - the caller's actor headers are missing
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Medproof core error - error from the integrity library
    #[error("Medproof error: {0}")]
    Medproof(#[from] MedproofError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Medproof(e) => match e {
                MedproofError::ValidationError(_) => StatusCode::BAD_REQUEST,
                MedproofError::PermissionDenied(_) => StatusCode::FORBIDDEN,

                MedproofError::RecordNotFound(_) | MedproofError::ContentUnavailable { .. } => {
                    StatusCode::NOT_FOUND
                }

                // Backing service unreachable → 503, refused → 502
                MedproofError::StoreUnavailable(_) | MedproofError::LedgerUnavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                MedproofError::StoreRejected(_)
                | MedproofError::LedgerRejected { .. }
                | MedproofError::MalformedRecord(_) => StatusCode::BAD_GATEWAY,

                MedproofError::SigningFailure(_)
                | MedproofError::ReadError(_)
                | MedproofError::StorageError(_)
                | MedproofError::ConfigError(_)
                | MedproofError::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Medproof(e) => match e {
                MedproofError::ValidationError(_) => "VALIDATION_ERROR",
                MedproofError::PermissionDenied(_) => "PERMISSION_DENIED",
                MedproofError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
                MedproofError::StoreRejected(_) => "STORE_REJECTED",
                MedproofError::LedgerUnavailable(_) => "LEDGER_UNAVAILABLE",
                MedproofError::SigningFailure(_) => "SIGNING_FAILURE",
                MedproofError::LedgerRejected { .. } => "LEDGER_REJECTED",
                MedproofError::RecordNotFound(_) => "RECORD_NOT_FOUND",
                MedproofError::ContentUnavailable { .. } => "CONTENT_UNAVAILABLE",
                MedproofError::ReadError(_) => "READ_ERROR",
                MedproofError::StorageError(_) => "STORAGE_ERROR",
                MedproofError::MalformedRecord(_) => "MALFORMED_RECORD",
                MedproofError::ConfigError(_) => "CONFIG_ERROR",
                MedproofError::SerializationError(_) => "SERIALIZATION_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            // Caller-facing failures keep their detail; server-side ones are summarised
            Self::Medproof(e) => match e {
                MedproofError::ValidationError(_)
                | MedproofError::PermissionDenied(_)
                | MedproofError::RecordNotFound(_)
                | MedproofError::ContentUnavailable { .. } => e.to_string(),
                MedproofError::StoreUnavailable(_) => "Content store unavailable".to_string(),
                MedproofError::LedgerUnavailable(_) => "Ledger unavailable".to_string(),
                MedproofError::StoreRejected(_) => "Content store rejected the request".to_string(),
                MedproofError::LedgerRejected { .. } => "Ledger rejected the request".to_string(),
                MedproofError::MalformedRecord(_) => "Ledger returned a malformed record".to_string(),
                MedproofError::SigningFailure(_) => "Transaction signing failed".to_string(),
                MedproofError::ReadError(_) | MedproofError::StorageError(_) => {
                    "Local storage error".to_string()
                }
                MedproofError::ConfigError(_) | MedproofError::SerializationError(_) => {
                    "Internal error".to_string()
                }
            },
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Medproof(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                client_message = %client_message,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
