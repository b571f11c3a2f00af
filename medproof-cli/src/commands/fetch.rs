//! Fetch command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use medproof_core::validation::sanitize_file_name;
use medproof_core::{FetchSource, RecordId, Role, ServiceConfig};
use tracing::info;

use crate::exit_codes::IntegrityMismatch;
use crate::utils;

/// Execute the fetch command.
///
/// The bytes are written even when they no longer match the registered
/// fingerprint; the mismatch is then reported through the exit code.
pub async fn execute(id: RecordId, output: Option<PathBuf>, role: Role, quiet: bool) -> Result<()> {
    let config = ServiceConfig::from_env();
    let (service, actor) = utils::connect(&config, role).await?;

    let fetched = service
        .fetch(id, &actor)
        .await
        .with_context(|| format!("Failed to fetch record {id}"))?;

    let output =
        output.unwrap_or_else(|| PathBuf::from(sanitize_file_name(&fetched.record.file_name)));
    utils::write_output(&output, &fetched.bytes)?;
    info!(path = %output.display(), bytes = fetched.bytes.len(), source = fetched.source.label(), "Content saved");

    if !quiet {
        println!();
        println!("   {} {}", "Saved:".dimmed(), output.display());
        match &fetched.source {
            FetchSource::ContentStore => {
                println!("   {} {}", "Source:".dimmed(), "content store")
            }
            FetchSource::LocalArchive { path } => println!(
                "   {} {} ({})",
                "Source:".dimmed(),
                "local archive".yellow(),
                path.display()
            ),
        }
        if fetched.fingerprint_matches {
            println!("   {} {}", "Fingerprint:".dimmed(), "matches registration".green());
        } else {
            println!(
                "   {} {}",
                "Fingerprint:".dimmed(),
                "DOES NOT match registration".red().bold()
            );
        }
    }

    if fetched.fingerprint_matches {
        Ok(())
    } else {
        Err(IntegrityMismatch { record_id: id }.into())
    }
}
