//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts and CI systems to handle errors appropriately.

use std::fmt;

use medproof_core::MedproofError;

/// Successful execution.
pub const SUCCESS: u8 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: u8 = 1;

/// Command line usage error, or an upload the validation policy refuses.
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: u8 = 64;

/// Presented content does not match the registered fingerprint.
/// Maps to EX_DATAERR from sysexits.h.
pub const INTEGRITY_MISMATCH: u8 = 65;

/// Cannot open input file, or the record does not exist.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: u8 = 66;

/// Ledger or content store unavailable.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const SERVICE_UNAVAILABLE: u8 = 69;

/// Local I/O error (cannot write output or archive file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: u8 = 74;

/// The record exists but its content cannot be retrieved.
/// Maps to EX_PROTOCOL from sysexits.h.
pub const CONTENT_UNAVAILABLE: u8 = 76;

/// Signing key missing or role not permitted.
/// Maps to EX_NOPERM from sysexits.h.
pub const PERMISSION_ERROR: u8 = 77;

/// Raised after a mismatch has been reported, to select exit code 65.
#[derive(Debug)]
pub struct IntegrityMismatch {
    pub record_id: u64,
}

impl fmt::Display for IntegrityMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "content does not match the fingerprint registered for record {}",
            self.record_id
        )
    }
}

impl std::error::Error for IntegrityMismatch {}

/// Exit code for a core error.
pub fn for_error(err: &MedproofError) -> u8 {
    match err {
        MedproofError::ValidationError(_) => USAGE_ERROR,
        MedproofError::RecordNotFound(_) | MedproofError::ReadError(_) => INPUT_ERROR,
        MedproofError::StoreUnavailable(_)
        | MedproofError::StoreRejected(_)
        | MedproofError::LedgerUnavailable(_)
        | MedproofError::LedgerRejected { .. } => SERVICE_UNAVAILABLE,
        MedproofError::StorageError(_) => IO_ERROR,
        MedproofError::ContentUnavailable { .. } => CONTENT_UNAVAILABLE,
        MedproofError::SigningFailure(_) | MedproofError::PermissionDenied(_) => PERMISSION_ERROR,
        MedproofError::MalformedRecord(_)
        | MedproofError::ConfigError(_)
        | MedproofError::SerializationError(_) => GENERAL_ERROR,
    }
}

/// Classify an error by the first typed cause in its chain.
pub fn from_anyhow(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<IntegrityMismatch>().is_some() {
            return INTEGRITY_MISMATCH;
        }
        if let Some(err) = cause.downcast_ref::<MedproofError>() {
            return for_error(err);
        }
    }
    GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_context_does_not_hide_cause() {
        let err = Err::<(), _>(MedproofError::RecordNotFound(3))
            .context("Failed to load record 3")
            .unwrap_err();
        assert_eq!(from_anyhow(&err), INPUT_ERROR);
    }

    #[test]
    fn test_mismatch_code() {
        let err = anyhow::Error::new(IntegrityMismatch { record_id: 1 });
        assert_eq!(from_anyhow(&err), INTEGRITY_MISMATCH);
    }

    #[test]
    fn test_untyped_error_is_general() {
        assert_eq!(from_anyhow(&anyhow::anyhow!("boom")), GENERAL_ERROR);
    }

    #[test]
    fn test_core_error_codes() {
        assert_eq!(for_error(&MedproofError::ValidationError("x".into())), 64);
        assert_eq!(for_error(&MedproofError::LedgerUnavailable("x".into())), 69);
        assert_eq!(
            for_error(&MedproofError::ContentUnavailable {
                record_id: 1,
                content_id: "Qm".into()
            }),
            76
        );
        assert_eq!(for_error(&MedproofError::SigningFailure("x".into())), 77);
        assert_eq!(for_error(&MedproofError::StorageError("x".into())), 74);
    }
}
