//! Commands that need no ledger or content store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use medproof_core::{Fingerprint, MedproofError};

use crate::utils;

/// Print `<fingerprint>  <path>`, like `sha256sum`.
pub fn fingerprint(file: PathBuf) -> Result<()> {
    let fingerprint = Fingerprint::of_file(&file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    println!("{fingerprint}  {}", file.display());
    Ok(())
}

/// Write `<stem>_tampered.<ext>`: the original bytes plus a trailing 0x00.
pub fn tamper(file: PathBuf, quiet: bool) -> Result<()> {
    let mut content = utils::read_input(&file)?;
    let original = Fingerprint::of_bytes(&content);
    content.push(0x00);
    let altered = Fingerprint::of_bytes(&content);

    let output = utils::tampered_path(&file);
    if output.exists() {
        return Err(MedproofError::StorageError(format!(
            "{} already exists",
            output.display()
        )))
        .context("Refusing to overwrite");
    }
    utils::write_output(&output, &content)?;

    if !quiet {
        println!("{} {}", "Tampered copy:".yellow().bold(), output.display());
        println!("   {} {}", "Original:".dimmed(), original);
        println!("   {} {}", "Tampered:".dimmed(), altered);
        println!(
            "   {} {} of 64 hex digits",
            "Differs in:".dimmed(),
            original.hex_distance(&altered)
        );
    } else {
        println!("{}", output.display());
    }
    Ok(())
}
