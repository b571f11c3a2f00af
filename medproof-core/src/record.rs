//! Ledger data model: file records, verification logs and the actors that
//! create them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MedproofError, Result};
use crate::fingerprint::Fingerprint;

/// Ledger-assigned sequence number of a file record.
pub type RecordId = u64;

/// Ledger-assigned sequence number of a verification log entry.
pub type LogId = u64;

/// Free-form caller annotations attached at registration.
pub type Metadata = BTreeMap<String, String>;

/// A ledger account (20-byte address) authorised to submit transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity([u8; 20]);

impl Identity {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase `0x`-prefixed hex form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Identity {
    type Err = MedproofError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits)
            .map_err(|e| MedproofError::ValidationError(format!("Invalid identity '{s}': {e}")))?;
        let bytes: [u8; 20] = bytes.try_into().map_err(|v: Vec<u8>| {
            MedproofError::ValidationError(format!(
                "Invalid identity '{s}': expected 20 bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Identity {
    type Error = MedproofError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.to_hex()
    }
}

/// Opaque reference to the subject (e.g. a patient) a file pertains to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectReference(String);

impl SubjectReference {
    pub fn new(reference: impl Into<String>) -> Result<Self> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(MedproofError::ValidationError(
                "Subject reference must not be empty".into(),
            ));
        }
        Ok(Self(reference))
    }

    /// Reference an account directly by its address.
    pub fn from_identity(identity: &Identity) -> Self {
        Self(identity.to_hex())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The reference as a ledger account, when it is one.
    pub fn as_identity(&self) -> Option<Identity> {
        self.0.parse().ok()
    }
}

impl fmt::Display for SubjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content-addressed locator in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unit of registration. Every field except `valid` is immutable once
/// the ledger has accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: RecordId,
    pub file_name: String,
    pub file_type: String,
    pub file_size_bytes: u64,
    /// Ground truth: digest of the content at registration time.
    pub fingerprint: Fingerprint,
    pub content_id: ContentId,
    pub uploader: Identity,
    pub subject: SubjectReference,
    pub registered_at: DateTime<Utc>,
    pub metadata: Metadata,
    /// Cleared only by an explicit invalidation; records are never deleted.
    pub valid: bool,
}

/// One verification attempt, appended regardless of its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationLog {
    pub id: LogId,
    pub file_record_id: RecordId,
    pub registered_fingerprint: Fingerprint,
    pub presented_fingerprint: Fingerprint,
    pub is_match: bool,
    pub verified_by: Identity,
    pub verified_at: DateTime<Utc>,
    pub notes: String,
}

/// Everything the ledger needs to create a [`FileRecord`]; the ledger
/// supplies the id, uploader and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub file_name: String,
    pub file_type: String,
    pub file_size_bytes: u64,
    pub fingerprint: Fingerprint,
    pub content_id: ContentId,
    pub subject: SubjectReference,
    pub metadata: Metadata,
}

/// Role of an authenticated actor, as supplied by the account subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Clinician,
    Lab,
    Admin,
    Patient,
}

impl Role {
    pub fn can_register(self) -> bool {
        matches!(self, Self::Clinician | Self::Lab | Self::Admin)
    }

    pub fn can_verify(self) -> bool {
        true
    }

    pub fn can_invalidate(self) -> bool {
        self == Self::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clinician => "clinician",
            Self::Lab => "lab",
            Self::Admin => "admin",
            Self::Patient => "patient",
        };
        f.write_str(name)
    }
}

impl FromStr for Role {
    type Err = MedproofError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clinician" | "doctor" => Ok(Self::Clinician),
            "lab" => Ok(Self::Lab),
            "admin" => Ok(Self::Admin),
            "patient" => Ok(Self::Patient),
            other => Err(MedproofError::ValidationError(format!(
                "Unknown role '{other}'"
            ))),
        }
    }
}

/// An authenticated caller: the ledger identity it acts as and its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub identity: Identity,
    pub role: Role,
}

impl Actor {
    pub fn new(identity: Identity, role: Role) -> Self {
        Self { identity, role }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f";

    #[test]
    fn test_identity_roundtrip_is_lowercase() {
        let id: Identity = "0x9D8A62F656A8D1615C1294FD71E9CFB3E4855A4F".parse().unwrap();
        assert_eq!(id.to_hex(), ADDR);
        assert_eq!(id.to_string().parse::<Identity>().unwrap(), id);
    }

    #[test]
    fn test_identity_rejects_wrong_length() {
        assert!("0x1234".parse::<Identity>().is_err());
        assert!("not-an-address".parse::<Identity>().is_err());
    }

    #[test]
    fn test_subject_reference() {
        assert!(SubjectReference::new("  ").is_err());
        let patient = SubjectReference::new("patient-42").unwrap();
        assert!(patient.as_identity().is_none());
        let addressed = SubjectReference::new(ADDR).unwrap();
        assert_eq!(addressed.as_identity().unwrap().to_hex(), ADDR);
    }

    #[test]
    fn test_role_permissions() {
        assert!(Role::Clinician.can_register());
        assert!(Role::Lab.can_register());
        assert!(Role::Admin.can_register());
        assert!(!Role::Patient.can_register());
        assert!(Role::Patient.can_verify());
        assert!(Role::Admin.can_invalidate());
        assert!(!Role::Lab.can_invalidate());
    }

    #[test]
    fn test_role_parsing_accepts_doctor() {
        assert_eq!("doctor".parse::<Role>().unwrap(), Role::Clinician);
        assert_eq!("LAB".parse::<Role>().unwrap(), Role::Lab);
        assert!("nurse".parse::<Role>().is_err());
    }
}
