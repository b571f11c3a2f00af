//! Environment-driven wiring of the production backends.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::archive::LocalArchive;
use crate::error::{MedproofError, Result};
use crate::ledger::{EthLedger, KeyFileSigner, LedgerConfig, TransactionSigner};
use crate::record::Identity;
use crate::service::IntegrityService;
use crate::store::{IpfsStore, IpfsStoreConfig};
use crate::validation::IntegrityPolicy;

/// Settings for a service backed by an EVM ledger and an IPFS node.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub ledger: LedgerConfig,
    pub store: IpfsStoreConfig,
    pub archive_dir: PathBuf,
    pub key_file: PathBuf,
    /// Identity to act as when the caller names none.
    pub default_identity: Option<String>,
    pub policy: IntegrityPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            store: IpfsStoreConfig::default(),
            archive_dir: std::env::var("MEDPROOF_ARCHIVE_DIR")
                .unwrap_or_else(|_| "uploads/verified_files".to_string())
                .into(),
            key_file: std::env::var("MEDPROOF_KEY_FILE")
                .unwrap_or_else(|_| "private_keys.json".to_string())
                .into(),
            default_identity: std::env::var("MEDPROOF_IDENTITY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            policy: IntegrityPolicy::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn load_signer(&self) -> Result<KeyFileSigner> {
        KeyFileSigner::load(&self.key_file)
    }

    /// The configured identity, or the first one the signer holds.
    pub fn resolve_identity(&self, signer: &dyn TransactionSigner) -> Result<Identity> {
        match &self.default_identity {
            Some(raw) => raw
                .parse()
                .map_err(|e| MedproofError::ConfigError(format!("MEDPROOF_IDENTITY: {e}"))),
            None => signer.identities().into_iter().next().ok_or_else(|| {
                MedproofError::SigningFailure(format!(
                    "No identities in key file {}",
                    self.key_file.display()
                ))
            }),
        }
    }

    /// Connect to the ledger and content store and build the service.
    pub async fn connect(&self, signer: Arc<dyn TransactionSigner>) -> Result<IntegrityService> {
        let ledger = EthLedger::connect(self.ledger.clone(), signer).await?;
        let store = IpfsStore::with_config(self.store.clone())?;
        info!(
            contract = %ledger.contract_address(),
            chain_id = ledger.chain_id(),
            ipfs = %self.store.api_url,
            archive = %self.archive_dir.display(),
            "Integrity service ready"
        );

        Ok(IntegrityService::new(
            Arc::new(ledger),
            Arc::new(store),
            LocalArchive::new(&self.archive_dir),
        )
        .with_policy(self.policy.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0x4646464646464646464646464646464646464646464646464646464646464646";

    #[test]
    fn test_resolve_identity_defaults_to_first_key() {
        let signer = KeyFileSigner::from_hex_keys([KEY]).unwrap();
        let config = ServiceConfig {
            default_identity: None,
            ..ServiceConfig::default()
        };
        assert_eq!(
            config.resolve_identity(&signer).unwrap().to_hex(),
            "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"
        );
    }

    #[test]
    fn test_resolve_identity_without_keys_is_signing_failure() {
        let signer = KeyFileSigner::from_hex_keys(Vec::<String>::new()).unwrap();
        let config = ServiceConfig {
            default_identity: None,
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.resolve_identity(&signer),
            Err(MedproofError::SigningFailure(_))
        ));
    }

    #[test]
    fn test_invalid_configured_identity_is_config_error() {
        let signer = KeyFileSigner::from_hex_keys([KEY]).unwrap();
        let config = ServiceConfig {
            default_identity: Some("bob".into()),
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.resolve_identity(&signer),
            Err(MedproofError::ConfigError(_))
        ));
    }
}
