//! Registry contract address discovery.
//!
//! Looked up in order: the configured address, the highest-numbered network
//! entry of the Truffle-style build artifact, then a plain address file.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{MedproofError, Result};
use crate::record::Identity;

/// Build artifact written by the registry's deployment.
pub const ARTIFACT_FILE_NAME: &str = "FileVerificationContract.json";

#[derive(Debug, Deserialize)]
struct Artifact {
    #[serde(default)]
    networks: serde_json::Map<String, Value>,
}

/// Resolve the registry address.
pub fn discover_contract_address(
    configured: Option<Identity>,
    artifacts_dir: &Path,
    address_file: &Path,
) -> Result<Identity> {
    if let Some(address) = configured {
        debug!(address = %address, "Using configured registry address");
        return Ok(address);
    }

    let artifact = artifacts_dir.join(ARTIFACT_FILE_NAME);
    if artifact.is_file() {
        if let Some(address) = address_from_artifact(&artifact)? {
            info!(address = %address, artifact = %artifact.display(), "Registry address from build artifact");
            return Ok(address);
        }
    }

    if address_file.is_file() {
        let contents = std::fs::read_to_string(address_file).map_err(|e| {
            MedproofError::ConfigError(format!(
                "Cannot read {}: {e}",
                address_file.display()
            ))
        })?;
        let address: Identity = contents.trim().parse().map_err(|e| {
            MedproofError::ConfigError(format!("{}: {e}", address_file.display()))
        })?;
        info!(address = %address, file = %address_file.display(), "Registry address from address file");
        return Ok(address);
    }

    Err(MedproofError::ConfigError(format!(
        "No registry address: set MEDPROOF_CONTRACT_ADDRESS, deploy to produce {}, or write {}",
        artifact.display(),
        address_file.display()
    )))
}

fn address_from_artifact(path: &Path) -> Result<Option<Identity>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| MedproofError::ConfigError(format!("Cannot read {}: {e}", path.display())))?;
    let artifact: Artifact = serde_json::from_str(&contents)
        .map_err(|e| MedproofError::ConfigError(format!("{}: {e}", path.display())))?;

    let latest = artifact
        .networks
        .iter()
        .filter_map(|(network, entry)| {
            let network: u64 = network.parse().ok()?;
            let address = entry.get("address")?.as_str()?.parse::<Identity>().ok()?;
            Some((network, address))
        })
        .max_by_key(|(network, _)| *network);

    Ok(latest.map(|(_, address)| address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const A: &str = "0x1111111111111111111111111111111111111111";
    const B: &str = "0x2222222222222222222222222222222222222222";
    const C: &str = "0x3333333333333333333333333333333333333333";

    #[test]
    fn test_configured_address_wins() {
        let dir = TempDir::new().unwrap();
        let configured: Identity = A.parse().unwrap();
        let found = discover_contract_address(
            Some(configured),
            dir.path(),
            &dir.path().join("contract_address.txt"),
        )
        .unwrap();
        assert_eq!(found, configured);
    }

    #[test]
    fn test_artifact_picks_highest_network() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(ARTIFACT_FILE_NAME),
            format!(r#"{{"networks": {{"3": {{"address": "{A}"}}, "5777": {{"address": "{B}"}}, "42": {{}}}}}}"#),
        )
        .unwrap();
        std::fs::write(dir.path().join("contract_address.txt"), C).unwrap();

        let found =
            discover_contract_address(None, dir.path(), &dir.path().join("contract_address.txt"))
                .unwrap();
        assert_eq!(found.to_hex(), B);
    }

    #[test]
    fn test_address_file_fallback() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("contract_address.txt");
        std::fs::write(&file, format!("{C}\n")).unwrap();
        let found = discover_contract_address(None, dir.path(), &file).unwrap();
        assert_eq!(found.to_hex(), C);
    }

    #[test]
    fn test_nothing_configured_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = discover_contract_address(None, dir.path(), &dir.path().join("missing.txt"))
            .unwrap_err();
        assert!(matches!(err, MedproofError::ConfigError(_)));
    }
}
