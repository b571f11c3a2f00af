use thiserror::Error;

/// Maximum accepted upload size when nothing else is configured (50 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum MedproofError {
    /// Disallowed extension, oversized file, unusable name. Raised before any network I/O.
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Content store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store answered but refused the request; retrying will not help.
    #[error("Content store rejected request: {0}")]
    StoreRejected(String),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// No usable key material for the submitting identity. Never retried.
    #[error("Signing failure: {0}")]
    SigningFailure(String),

    #[error("Ledger rejected request (code {code}): {message}")]
    LedgerRejected { code: i64, message: String },

    #[error("File record {0} not found")]
    RecordNotFound(u64),

    /// The ledger knows the record but the content store has no copy of it.
    #[error("Content {content_id} for record {record_id} is missing from the content store")]
    ContentUnavailable { record_id: u64, content_id: String },

    /// Presented content could not be read, so no fingerprint exists for it.
    #[error("Failed to read content: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Local storage error: {0}")]
    StorageError(String),

    #[error("Malformed ledger record: {0}")]
    MalformedRecord(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl MedproofError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::LedgerUnavailable(_)
        )
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Short machine-readable label, shared by the HTTP and CLI surfaces.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "validation_error",
            Self::PermissionDenied(_) => "permission_denied",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::StoreRejected(_) => "store_rejected",
            Self::LedgerUnavailable(_) => "ledger_unavailable",
            Self::SigningFailure(_) => "signing_failure",
            Self::LedgerRejected { .. } => "ledger_rejected",
            Self::RecordNotFound(_) => "record_not_found",
            Self::ContentUnavailable { .. } => "content_unavailable",
            Self::ReadError(_) => "read_error",
            Self::StorageError(_) => "storage_error",
            Self::MalformedRecord(_) => "malformed_record",
            Self::ConfigError(_) => "config_error",
            Self::SerializationError(_) => "serialization_error",
        }
    }
}

impl From<serde_json::Error> for MedproofError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MedproofError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailability_is_transient() {
        assert!(MedproofError::LedgerUnavailable("down".into()).is_transient());
        assert!(MedproofError::StoreUnavailable("down".into()).is_transient());
        assert!(MedproofError::SigningFailure("no key".into()).is_permanent());
        assert!(MedproofError::LedgerRejected {
            code: -32000,
            message: "execution reverted".into()
        }
        .is_permanent());
        assert!(MedproofError::RecordNotFound(7).is_permanent());
    }

    #[test]
    fn test_display_names_the_record() {
        let err = MedproofError::ContentUnavailable {
            record_id: 3,
            content_id: "QmAbc".into(),
        };
        let message = err.to_string();
        assert!(message.contains("QmAbc"));
        assert!(message.contains("record 3"));
        assert_eq!(err.kind(), "content_unavailable");
    }
}
