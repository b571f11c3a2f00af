//! Register command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use medproof_core::{RegisterRequest, Role, ServiceConfig, SubjectReference};
use tracing::info;

use crate::utils;

/// Execute the register command.
///
/// The upload is validated before any key is loaded or connection made.
pub async fn execute(
    file: PathBuf,
    subject: String,
    meta: Vec<(String, String)>,
    file_type: Option<String>,
    role: Role,
    quiet: bool,
) -> Result<()> {
    let content = utils::read_input(&file)?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(path = %file.display(), bytes = content.len(), "Read file");

    let config = ServiceConfig::from_env();
    config
        .policy
        .validate(&file_name, content.len() as u64)
        .with_context(|| format!("Cannot register {}", file.display()))?;
    let subject = SubjectReference::new(subject)?;

    let (service, actor) = utils::connect(&config, role).await?;

    let mut request = RegisterRequest::new(content, file_name, subject, actor);
    for (key, value) in meta {
        request = request.with_annotation(key, value);
    }
    if let Some(file_type) = file_type {
        request = request.with_file_type(file_type);
    }

    let registration = service
        .register(request)
        .await
        .context("Registration failed")?;
    let record = &registration.record;

    if !quiet {
        println!();
        println!("{}", "File registered on the ledger".green().bold());
        println!();
        println!("   {} {}", "Record id:".dimmed(), record.id.to_string().bold());
        println!("   {} {}", "File:".dimmed(), record.file_name);
        println!("   {} {}", "Fingerprint:".dimmed(), record.fingerprint);
        println!("   {} {}", "Content id:".dimmed(), record.content_id);
        println!("   {} {}", "Subject:".dimmed(), record.subject);
        println!("   {} {}", "Uploader:".dimmed(), record.uploader);
        println!(
            "   {} {}",
            "Local copy:".dimmed(),
            registration.local_path.display()
        );
        if !registration.pinned {
            println!(
                "   {}",
                "Content was stored but not pinned; it may be garbage-collected".yellow()
            );
        }
    } else {
        println!("{}", record.id);
    }

    Ok(())
}
