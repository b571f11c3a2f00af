//! Common utility functions shared across CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use medproof_core::{
    Actor, IntegrityService, KeyFileSigner, MedproofError, Role, ServiceConfig, TransactionSigner,
};
use tracing::debug;

/// Parse a `KEY=VALUE` annotation.
pub fn parse_annotation(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Read a local input file; failures classify as unreadable input.
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(MedproofError::ReadError)
        .with_context(|| format!("Failed to read file: {}", path.display()))
}

/// Check that `path` names a readable regular file without loading it.
pub fn check_readable(path: &Path) -> Result<()> {
    let opened = std::fs::File::open(path).and_then(|file| file.metadata());
    let result = match opened {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )),
        Err(e) => Err(e),
    };
    result
        .map_err(MedproofError::ReadError)
        .with_context(|| format!("Failed to read file: {}", path.display()))
}

/// Write an output file; failures classify as local I/O errors.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes)
        .map_err(|e| MedproofError::StorageError(format!("{}: {e}", path.display())))
        .with_context(|| format!("Failed to write file: {}", path.display()))
}

/// Path of the tampered copy: `report.pdf` becomes `report_tampered.pdf`.
pub fn tampered_path(file: &Path) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let name = match file.extension() {
        Some(ext) => format!("{stem}_tampered.{}", ext.to_string_lossy()),
        None => format!("{stem}_tampered"),
    };
    file.with_file_name(name)
}

/// Connect to the ledger and content store, acting as the configured identity.
pub async fn connect(config: &ServiceConfig, role: Role) -> Result<(IntegrityService, Actor)> {
    let signer = config.load_signer().context("Failed to load signing keys")?;
    let identity = config.resolve_identity(&signer)?;
    debug!(%identity, %role, "Acting as");

    let service = config
        .connect(Arc::new(signer))
        .await
        .context("Failed to connect to ledger")?;
    Ok((service, Actor::new(identity, role)))
}

/// Connect for read-only commands. A missing key file is tolerated since
/// nothing will be signed.
pub async fn connect_read_only(config: &ServiceConfig) -> Result<IntegrityService> {
    let signer: Arc<dyn TransactionSigner> = match config.load_signer() {
        Ok(signer) => Arc::new(signer),
        Err(e) => {
            debug!(error = %e, "No signing keys; continuing read-only");
            Arc::new(KeyFileSigner::from_hex_keys(Vec::<String>::new())?)
        }
    };
    config
        .connect(signer)
        .await
        .context("Failed to connect to ledger")
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// First 16 hex digits, for compact display.
pub fn short(hex: &str) -> &str {
    hex.get(..16).unwrap_or(hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tampered_path() {
        assert_eq!(
            tampered_path(Path::new("dir/report.pdf")),
            PathBuf::from("dir/report_tampered.pdf")
        );
        assert_eq!(
            tampered_path(Path::new("archive.tar.gz")),
            PathBuf::from("archive.tar_tampered.gz")
        );
        assert_eq!(
            tampered_path(Path::new("README")),
            PathBuf::from("README_tampered")
        );
    }

    #[test]
    fn test_check_readable() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("note.txt");
        std::fs::write(&file, b"ok").unwrap();
        assert!(check_readable(&file).is_ok());

        for path in [dir.path().join("missing.txt"), dir.path().to_path_buf()] {
            let err = check_readable(&path).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<MedproofError>(),
                Some(MedproofError::ReadError(_))
            ));
        }
    }

    #[test]
    fn test_parse_annotation() {
        assert_eq!(
            parse_annotation("ward=3B").unwrap(),
            ("ward".to_string(), "3B".to_string())
        );
        assert_eq!(
            parse_annotation("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert!(parse_annotation("ward").is_err());
        assert!(parse_annotation("=3B").is_err());
    }

    #[test]
    fn test_format_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 45).unwrap();
        assert_eq!(format_timestamp(&at), "2024-01-15 12:30:45 UTC");
    }

    #[test]
    fn test_short() {
        assert_eq!(short("0123456789abcdef0123"), "0123456789abcdef");
        assert_eq!(short("abc"), "abc");
    }
}
