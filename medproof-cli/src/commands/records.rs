//! Read-only record commands: show, history, list.

use anyhow::{Context, Result};
use colored::Colorize;
use medproof_core::{FileRecord, Identity, RecordId, ServiceConfig, SubjectReference, VerificationLog};

use crate::utils::{self, format_timestamp, short};

/// Show one record.
pub async fn show(id: RecordId, json: bool, quiet: bool) -> Result<()> {
    let service = utils::connect_read_only(&ServiceConfig::from_env()).await?;
    let record = service
        .get_record(id)
        .await
        .with_context(|| format!("Failed to load record {id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else if !quiet {
        print_record(&record);
    }
    Ok(())
}

/// Show the verification history of one record, oldest first.
pub async fn history(id: RecordId, json: bool, quiet: bool) -> Result<()> {
    let service = utils::connect_read_only(&ServiceConfig::from_env()).await?;
    let logs = service
        .verification_history(id)
        .await
        .with_context(|| format!("Failed to load history of record {id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
    } else if !quiet {
        if logs.is_empty() {
            println!("No verifications recorded for record {id}");
        }
        for log in &logs {
            print_log(log);
        }
    }
    Ok(())
}

/// List records by subject or by uploader.
pub async fn list(
    subject: Option<String>,
    uploader: Option<Identity>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let service = utils::connect_read_only(&ServiceConfig::from_env()).await?;
    let records = match (subject, uploader) {
        (Some(subject), _) => {
            let subject = SubjectReference::new(subject)?;
            service.list_by_subject(&subject).await
        }
        (None, Some(uploader)) => service.list_by_uploader(&uploader).await,
        (None, None) => Ok(Vec::new()),
    }
    .context("Failed to list records")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if !quiet {
        if records.is_empty() {
            println!("No records found");
        }
        for record in &records {
            let validity = if record.valid {
                "valid".green()
            } else {
                "invalidated".yellow()
            };
            println!(
                "{:>6}  {}  {}  {}  {}",
                record.id,
                short(record.fingerprint.as_str()),
                format_timestamp(&record.registered_at),
                record.file_name,
                validity
            );
        }
    }
    Ok(())
}

fn print_record(record: &FileRecord) {
    println!();
    println!("{} {}", "Record".bold(), record.id.to_string().bold());
    println!("   {} {}", "File:".dimmed(), record.file_name);
    println!("   {} {}", "Type:".dimmed(), record.file_type);
    println!("   {} {} bytes", "Size:".dimmed(), record.file_size_bytes);
    println!("   {} {}", "Fingerprint:".dimmed(), record.fingerprint);
    println!("   {} {}", "Content id:".dimmed(), record.content_id);
    println!("   {} {}", "Subject:".dimmed(), record.subject);
    println!("   {} {}", "Uploader:".dimmed(), record.uploader);
    println!(
        "   {} {}",
        "Registered:".dimmed(),
        format_timestamp(&record.registered_at)
    );
    if record.valid {
        println!("   {} {}", "Status:".dimmed(), "valid".green());
    } else {
        println!("   {} {}", "Status:".dimmed(), "INVALIDATED".yellow());
    }
    for (key, value) in &record.metadata {
        println!("   {} {value}", format!("{key}:").dimmed());
    }
}

fn print_log(log: &VerificationLog) {
    let verdict = if log.is_match {
        "verified".green()
    } else {
        "tampered".red().bold()
    };
    println!(
        "#{:<5} {}  {}  by {}  {}",
        log.id,
        format_timestamp(&log.verified_at),
        verdict,
        log.verified_by,
        short(log.presented_fingerprint.as_str())
    );
    if !log.notes.is_empty() {
        println!("       {}", log.notes.dimmed());
    }
}
