//! Upload validation.
//!
//! Registration is rejected here, before any fingerprinting or network
//! call, when the file name carries a disallowed extension or the content
//! exceeds the size bound.

use std::collections::BTreeSet;

use crate::error::{MedproofError, Result, DEFAULT_MAX_FILE_SIZE};

/// Extensions accepted for registration (compared case-insensitively).
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "tiff", "pdf", "doc", "docx", "txt", "csv", "xlsx", "xls",
    "zip", "rar", "mp4", "avi", "mov",
];

/// Allow-list and size bound applied to every registration.
#[derive(Debug, Clone)]
pub struct IntegrityPolicy {
    pub allowed_extensions: BTreeSet<String>,
    pub max_file_size: u64,
}

impl Default for IntegrityPolicy {
    fn default() -> Self {
        let max_file_size = std::env::var("MEDPROOF_MAX_FILE_SIZE_MB")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(megabytes)
            .unwrap_or(DEFAULT_MAX_FILE_SIZE);

        Self {
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_file_size,
        }
    }
}

/// Size bound in bytes for a configured number of MiB.
fn megabytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

/// A file name and size that passed the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    /// Sanitised name, safe to use as a path component.
    pub file_name: String,
    /// Lowercase extension, used as the record's file type when none is given.
    pub extension: String,
}

impl IntegrityPolicy {
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Validate a prospective upload.
    pub fn validate(&self, file_name: &str, size: u64) -> Result<ValidatedUpload> {
        let sanitized = sanitize_file_name(file_name);
        if sanitized.is_empty() {
            return Err(MedproofError::ValidationError(format!(
                "File name '{file_name}' is empty after sanitisation"
            )));
        }

        let extension = extension_of(&sanitized).ok_or_else(|| {
            MedproofError::ValidationError(format!("File '{sanitized}' has no extension"))
        })?;

        if !self.allowed_extensions.contains(&extension) {
            return Err(MedproofError::ValidationError(format!(
                "File type '.{extension}' is not allowed"
            )));
        }

        validate_file_size(size, self.max_file_size)?;

        Ok(ValidatedUpload {
            file_name: sanitized,
            extension,
        })
    }
}

/// Validates the size of an uploaded file.
pub fn validate_file_size(size: u64, max_size: u64) -> Result<()> {
    if size > max_size {
        let max_mb = max_size / (1024 * 1024);
        Err(MedproofError::ValidationError(format!(
            "File too large: {size} bytes exceeds maximum of {max_mb} MB"
        )))
    } else {
        Ok(())
    }
}

/// Lowercase extension of a file name, if it has one.
pub fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Reduce a client-supplied file name to a single safe path component.
///
/// Keeps only the final path segment, replaces whitespace with `_`, drops
/// characters outside `[A-Za-z0-9._-]` and strips leading dots.
pub fn sanitize_file_name(file_name: &str) -> String {
    let last = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);

    let cleaned: String = last
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    cleaned.trim_start_matches('.').trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> IntegrityPolicy {
        IntegrityPolicy::default().with_max_file_size(10 * 1024 * 1024)
    }

    #[test]
    fn test_allowed_extension_case_insensitive() {
        let upload = policy().validate("Patient_Note.TXT", 2).unwrap();
        assert_eq!(upload.extension, "txt");
        assert_eq!(upload.file_name, "Patient_Note.TXT");
    }

    #[test]
    fn test_disallowed_extension_rejected() {
        let err = policy().validate("payload.exe", 10).unwrap_err();
        assert!(matches!(err, MedproofError::ValidationError(_)));
        assert!(policy().validate("script.sh", 10).is_err());
        assert!(policy().validate("noextension", 10).is_err());
    }

    #[test]
    fn test_size_bound() {
        let max = 10 * 1024 * 1024;
        assert!(policy().validate("scan.pdf", max).is_ok());
        assert!(policy().validate("scan.pdf", max + 1).is_err());
        assert!(validate_file_size(0, max).is_ok());
    }

    #[test]
    fn test_configured_megabytes_saturate() {
        assert_eq!(megabytes(50), 50 * 1024 * 1024);
        assert_eq!(megabytes(u64::MAX), u64::MAX);
        assert_eq!(megabytes(u64::MAX / 1024), u64::MAX);
    }

    #[test]
    fn test_sanitize_strips_paths_and_specials() {
        assert_eq!(sanitize_file_name("../../etc/passwd.txt"), "passwd.txt");
        assert_eq!(sanitize_file_name("C:\\reports\\lab result.pdf"), "lab_result.pdf");
        assert_eq!(sanitize_file_name(".hidden.txt"), "hidden.txt");
        assert_eq!(sanitize_file_name("x<>|*.csv"), "x.csv");
        assert_eq!(sanitize_file_name("///"), "");
    }

    #[test]
    fn test_empty_after_sanitising_rejected() {
        assert!(policy().validate("...", 1).is_err());
        assert!(policy().validate("", 1).is_err());
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.tar.GZ"), Some("gz".into()));
        assert_eq!(extension_of(".txt"), None);
        assert_eq!(extension_of("file."), None);
    }
}
