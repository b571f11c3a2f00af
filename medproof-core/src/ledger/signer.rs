//! Signing-key providers.
//!
//! The ledger client never touches key material directly; it asks a
//! [`TransactionSigner`] to sign a 32-byte transaction hash on behalf of an
//! identity. A missing key is a permanent [`MedproofError::SigningFailure`].

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use k256::ecdsa::{SigningKey, VerifyingKey};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{MedproofError, Result};
use crate::record::Identity;

use super::keccak256;

/// secp256k1 signature with its recovery id (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

/// Pluggable signing-key provider.
///
/// Swap in a hardware-backed or remote implementation without touching the
/// ledger client.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Identities this signer holds keys for.
    fn identities(&self) -> Vec<Identity>;

    /// Whether a key for `identity` is available.
    fn can_sign(&self, identity: &Identity) -> bool {
        self.identities().contains(identity)
    }

    /// Sign a transaction hash as `identity`.
    async fn sign_hash(&self, identity: &Identity, hash: &[u8; 32]) -> Result<RecoverableSignature>;
}

/// Ledger address controlled by a public key.
pub fn address_of(key: &VerifyingKey) -> Identity {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Identity::from_bytes(address)
}

/// Signer backed by a local JSON key file mapping addresses to private keys:
///
/// ```json
/// { "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f": "0x4646...46" }
/// ```
///
/// Keys are indexed by the address they derive. `SigningKey` wipes its
/// scalar on drop; the file contents are held in zeroizing buffers while
/// parsing.
pub struct KeyFileSigner {
    keys: HashMap<Identity, SigningKey>,
}

impl KeyFileSigner {
    /// Load keys from a JSON key file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            MedproofError::SigningFailure(format!(
                "Cannot read key file {}: {e}",
                path.display()
            ))
        })?);
        let signer = Self::from_json(&contents)?;
        info!(path = %path.display(), identities = signer.keys.len(), "Loaded signing keys");
        Ok(signer)
    }

    /// Parse keys from the JSON key-file format.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: HashMap<String, Zeroizing<String>> = serde_json::from_str(json)
            .map_err(|e| MedproofError::SigningFailure(format!("Invalid key file: {e}")))?;

        let mut keys = HashMap::with_capacity(entries.len());
        for (declared, secret) in &entries {
            let key = parse_key(secret)?;
            let derived = address_of(key.verifying_key());
            match declared.parse::<Identity>() {
                Ok(declared) if declared == derived => {}
                _ => warn!(
                    declared = %declared,
                    derived = %derived,
                    "Key file entry does not match its derived address; indexing by derived address"
                ),
            }
            keys.insert(derived, key);
        }
        Ok(Self { keys })
    }

    /// Build a signer from bare hex private keys.
    pub fn from_hex_keys<I, S>(secrets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = secrets
            .into_iter()
            .map(|secret| {
                let key = parse_key(secret.as_ref())?;
                Ok((address_of(key.verifying_key()), key))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn parse_key(secret: &str) -> Result<SigningKey> {
    let trimmed = secret.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = Zeroizing::new(
        hex::decode(digits)
            .map_err(|_| MedproofError::SigningFailure("Private key is not valid hex".into()))?,
    );
    SigningKey::from_slice(&bytes)
        .map_err(|_| MedproofError::SigningFailure("Private key is not a valid secp256k1 scalar".into()))
}

#[async_trait]
impl TransactionSigner for KeyFileSigner {
    fn identities(&self) -> Vec<Identity> {
        let mut ids: Vec<Identity> = self.keys.keys().copied().collect();
        ids.sort();
        ids
    }

    fn can_sign(&self, identity: &Identity) -> bool {
        self.keys.contains_key(identity)
    }

    async fn sign_hash(&self, identity: &Identity, hash: &[u8; 32]) -> Result<RecoverableSignature> {
        let key = self.keys.get(identity).ok_or_else(|| {
            MedproofError::SigningFailure(format!("No signing key for identity {identity}"))
        })?;

        let (signature, recovery_id) = key
            .sign_prehash_recoverable(hash)
            .map_err(|e| MedproofError::SigningFailure(format!("Signing failed: {e}")))?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        debug!(identity = %identity, "Signed transaction hash");
        Ok(RecoverableSignature {
            r,
            s,
            recovery_id: recovery_id.to_byte(),
        })
    }
}
