//! Content fingerprinting.
//!
//! A fingerprint is the SHA-256 digest of a file's bytes, rendered as 64
//! lowercase hex characters. Input is consumed in fixed-size chunks so memory
//! use does not depend on file size, and the same bytes always produce the same
//! fingerprint whether they come from a buffer, a reader or a path.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MedproofError, Result};

/// Read buffer size used when streaming content into the hasher.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Length of a rendered fingerprint in hex characters.
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// Canonical (lowercase hex) SHA-256 fingerprint of file content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint an in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        for chunk in data.chunks(CHUNK_SIZE) {
            hasher.update(chunk);
        }
        Self::from_digest(hasher)
    }

    /// Fingerprint everything a reader yields.
    ///
    /// Fails only when the reader does; every byte sequence, including the
    /// empty one, has a fingerprint.
    pub fn of_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(MedproofError::ReadError(e)),
            };
            hasher.update(&buf[..n]);
        }
        Ok(Self::from_digest(hasher))
    }

    /// Fingerprint a file on disk.
    pub fn of_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::of_reader(file)
    }

    /// Parse a hex fingerprint, normalising it to lowercase.
    pub fn parse(hex_digest: &str) -> Result<Self> {
        let trimmed = hex_digest.trim();
        let trimmed = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if trimmed.len() != FINGERPRINT_HEX_LEN || !trimmed.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(MedproofError::ValidationError(format!(
                "Invalid fingerprint '{hex_digest}': expected {FINGERPRINT_HEX_LEN} hex characters"
            )));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Compare two fingerprints in canonical form.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of hex positions at which two fingerprints differ.
    pub fn hex_distance(&self, other: &Fingerprint) -> usize {
        self.0
            .bytes()
            .zip(other.0.bytes())
            .filter(|(a, b)| !a.eq_ignore_ascii_case(b))
            .count()
    }

    fn from_digest(hasher: Sha256) -> Self {
        Self(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = MedproofError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = MedproofError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}
