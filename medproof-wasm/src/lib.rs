//! WebAssembly bindings for medproof fingerprint checks.
//!
//! Lets a browser fingerprint a file and compare it with a registered
//! fingerprint (or a record exported by `medproof show --json`) without
//! uploading the file anywhere.

use medproof_core::{FileRecord, Fingerprint};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Result of a local comparison.
#[derive(Debug, Serialize)]
pub struct ComparisonResult {
    /// Whether the presented bytes hash to the registered fingerprint
    pub is_match: bool,
    /// "verified", "tampered", or "error"
    pub status: &'static str,
    pub presented_fingerprint: String,
    pub registered_fingerprint: String,
    /// Hex positions that differ between the two fingerprints
    pub hex_distance: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<u64>,
    /// False when the record has been invalidated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComparisonResult {
    fn compare(presented: Fingerprint, registered: Fingerprint) -> Self {
        let is_match = presented.matches(&registered);
        Self {
            is_match,
            status: if is_match { "verified" } else { "tampered" },
            hex_distance: presented.hex_distance(&registered),
            presented_fingerprint: presented.to_string(),
            registered_fingerprint: registered.to_string(),
            record_id: None,
            record_valid: None,
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            is_match: false,
            status: "error",
            presented_fingerprint: String::new(),
            registered_fingerprint: String::new(),
            hex_distance: 0,
            record_id: None,
            record_valid: None,
            error: Some(message),
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"is_match":false,"status":"error","error":"Serialization error: {}"}}"#, e)
        })
    }
}

/// Lowercase hex SHA-256 of `file_bytes`.
#[wasm_bindgen]
pub fn fingerprint_hex(file_bytes: &[u8]) -> String {
    Fingerprint::of_bytes(file_bytes).to_string()
}

/// Compare `file_bytes` with a registered hex fingerprint.
///
/// # Returns
/// A JSON string containing a [`ComparisonResult`]
#[wasm_bindgen]
pub fn compare_with(file_bytes: &[u8], registered_hex: &str) -> String {
    match Fingerprint::parse(registered_hex) {
        Ok(registered) => {
            ComparisonResult::compare(Fingerprint::of_bytes(file_bytes), registered).to_json()
        }
        Err(e) => ComparisonResult::error(e.to_string()).to_json(),
    }
}

/// Compare `file_bytes` with a file record in JSON form.
#[wasm_bindgen]
pub fn compare_with_record(file_bytes: &[u8], record_json: &str) -> String {
    match serde_json::from_str::<FileRecord>(record_json) {
        Ok(record) => {
            let mut result =
                ComparisonResult::compare(Fingerprint::of_bytes(file_bytes), record.fingerprint);
            result.record_id = Some(record.id);
            result.record_valid = Some(record.valid);
            result.to_json()
        }
        Err(e) => ComparisonResult::error(format!("Failed to parse record: {}", e)).to_json(),
    }
}

/// Get the library version.
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const OK_FINGERPRINT: &str = "2689367b205c16ce32ed4200942b8b8b1e262dfc70d9bc9fbc77c49699a4f1df";

    #[test]
    fn test_fingerprint_hex() {
        assert_eq!(fingerprint_hex(b"ok"), OK_FINGERPRINT);
    }

    #[test]
    fn test_compare_with_match_and_mismatch() {
        let json: Value = serde_json::from_str(&compare_with(b"ok", OK_FINGERPRINT)).unwrap();
        assert_eq!(json["status"], "verified");
        assert_eq!(json["hex_distance"], 0);

        let json: Value = serde_json::from_str(&compare_with(b"ok\0", OK_FINGERPRINT)).unwrap();
        assert_eq!(json["status"], "tampered");
        assert_eq!(json["is_match"], false);
        assert!(json["hex_distance"].as_u64().unwrap() > 32);
    }

    #[test]
    fn test_compare_with_uppercase_fingerprint() {
        let json: Value =
            serde_json::from_str(&compare_with(b"ok", &OK_FINGERPRINT.to_uppercase())).unwrap();
        assert_eq!(json["is_match"], true);
    }

    #[test]
    fn test_compare_with_invalid_fingerprint() {
        let json: Value = serde_json::from_str(&compare_with(b"ok", "not-hex")).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["error"].is_string());
    }

    #[test]
    fn test_compare_with_record() {
        let record = format!(
            r#"{{
                "id": 7,
                "file_name": "patient_note.txt",
                "file_type": "txt",
                "file_size_bytes": 2,
                "fingerprint": "{OK_FINGERPRINT}",
                "content_id": "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG",
                "uploader": "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f",
                "subject": "patient-42",
                "registered_at": "2024-01-15T12:30:45Z",
                "metadata": {{}},
                "valid": false
            }}"#
        );
        let json: Value = serde_json::from_str(&compare_with_record(b"ok", &record)).unwrap();
        assert_eq!(json["status"], "verified");
        assert_eq!(json["record_id"], 7);
        assert_eq!(json["record_valid"], false);

        let json: Value = serde_json::from_str(&compare_with_record(b"ok", "{}")).unwrap();
        assert_eq!(json["status"], "error");
    }

    #[test]
    fn test_version_matches_package() {
        assert_eq!(get_version(), env!("CARGO_PKG_VERSION"));
    }
}
