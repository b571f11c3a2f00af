//! Verify command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use medproof_core::{PresentedContent, RecordId, Role, ServiceConfig};
use tracing::info;

use crate::exit_codes::IntegrityMismatch;
use crate::utils;

/// Execute the verify command.
pub async fn execute(
    id: RecordId,
    file: PathBuf,
    notes: Option<String>,
    role: Role,
    quiet: bool,
) -> Result<()> {
    // Checked before connecting so an unreadable file fails fast; the
    // content itself is streamed when fingerprinted.
    utils::check_readable(&file)?;
    info!(path = %file.display(), "Verifying file");

    let config = ServiceConfig::from_env();
    let (service, actor) = utils::connect(&config, role).await?;

    let outcome = service
        .verify(id, PresentedContent::File(file), &actor, notes)
        .await
        .with_context(|| format!("Verification of record {id} failed"))?;

    if !quiet {
        println!();
        if outcome.is_match {
            println!("{}", "╔════════════════════════════════════════╗".green());
            println!("{}", "║              VERIFIED                  ║".green().bold());
            println!("{}", "╚════════════════════════════════════════╝".green());
            println!();
            println!("   {} {}", "Content:".dimmed(), "Matches registration".green());
        } else {
            println!("{}", "╔════════════════════════════════════════╗".red());
            println!("{}", "║              TAMPERED                  ║".red().bold());
            println!("{}", "╚════════════════════════════════════════╝".red());
            println!();
            println!("   {} {}", "Content:".dimmed(), "MODIFIED since registration".red());
        }
        println!("   {} {}", "Registered:".dimmed(), outcome.registered_fingerprint);
        println!("   {} {}", "Presented:".dimmed(), outcome.presented_fingerprint);
        if !outcome.record_valid {
            println!("   {} {}", "Record:".dimmed(), "INVALIDATED".yellow());
        }
        match (outcome.log_id, &outcome.log_error) {
            (Some(log_id), _) => println!("   {} #{log_id}", "Logged as:".dimmed()),
            (None, Some(reason)) => println!(
                "   {} {}",
                "Not logged:".dimmed(),
                reason.as_str().yellow()
            ),
            (None, None) => {}
        }
    }

    if outcome.is_match {
        Ok(())
    } else {
        Err(IntegrityMismatch { record_id: id }.into())
    }
}
