//! Medproof CLI - register files on the integrity ledger and verify copies.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use colored::Colorize;
use medproof_core::{Identity, RecordId, Role};
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error or rejected upload (extension, size)
  65  Integrity mismatch (content differs from the registered fingerprint)
  66  Input file unreadable or record not found
  69  Ledger or content store unavailable
  74  Local I/O error
  76  Record content unavailable
  77  Signing key missing or permission denied

Environment:
  MEDPROOF_RPC_URL, MEDPROOF_CONTRACT_ADDRESS, MEDPROOF_IPFS_URL,
  MEDPROOF_KEY_FILE, MEDPROOF_IDENTITY, MEDPROOF_ARCHIVE_DIR, RUST_LOG";

#[derive(Parser)]
#[command(name = "medproof")]
#[command(author, version, about = "File integrity verification and audit ledger", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Suppress human-readable output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log progress to stderr (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a file: fingerprint, store and record it on the ledger
    Register {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Subject the file pertains to (e.g. a patient reference)
        #[arg(short, long)]
        subject: String,

        /// Annotation stored with the record, as KEY=VALUE (repeatable)
        #[arg(short, long = "meta", value_name = "KEY=VALUE", value_parser = utils::parse_annotation)]
        meta: Vec<(String, String)>,

        /// Override the file type derived from the extension
        #[arg(long)]
        file_type: Option<String>,

        /// Role to act in
        #[arg(short, long, default_value = "clinician")]
        role: Role,
    },

    /// Verify a file against a registered record
    Verify {
        #[arg(value_name = "ID")]
        id: RecordId,

        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Notes stored with the verification log entry
        #[arg(short, long)]
        notes: Option<String>,

        /// Role to act in
        #[arg(short, long, default_value = "clinician")]
        role: Role,
    },

    /// Retrieve the stored content of a record
    Fetch {
        #[arg(value_name = "ID")]
        id: RecordId,

        /// Output path (defaults to the registered file name)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Role to act in
        #[arg(short, long, default_value = "clinician")]
        role: Role,
    },

    /// Show a file record
    Show {
        #[arg(value_name = "ID")]
        id: RecordId,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the verification history of a record
    History {
        #[arg(value_name = "ID")]
        id: RecordId,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List records by subject or by uploader
    #[command(group(ArgGroup::new("selector").required(true).args(["subject", "uploader"])))]
    List {
        /// Subject reference
        #[arg(long)]
        subject: Option<String>,

        /// Uploader identity (0x-prefixed address)
        #[arg(long)]
        uploader: Option<Identity>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the SHA-256 fingerprint of a file (offline)
    Fingerprint {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Write a copy of FILE with one byte appended, for demonstrating detection (offline)
    Tamper {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            ExitCode::from(exit_codes::from_anyhow(&e))
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "medproof=info,medproof_core=info",
        _ => "medproof=debug,medproof_core=debug",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let quiet = cli.quiet;
    match cli.command {
        Commands::Register {
            file,
            subject,
            meta,
            file_type,
            role,
        } => commands::register::execute(file, subject, meta, file_type, role, quiet).await,
        Commands::Verify {
            id,
            file,
            notes,
            role,
        } => commands::verify::execute(id, file, notes, role, quiet).await,
        Commands::Fetch { id, output, role } => {
            commands::fetch::execute(id, output, role, quiet).await
        }
        Commands::Show { id, json } => commands::records::show(id, json, quiet).await,
        Commands::History { id, json } => commands::records::history(id, json, quiet).await,
        Commands::List {
            subject,
            uploader,
            json,
        } => commands::records::list(subject, uploader, json, quiet).await,
        Commands::Fingerprint { file } => commands::offline::fingerprint(file),
        Commands::Tamper { file } => commands::offline::tamper(file, quiet),
    }
}
