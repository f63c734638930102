//! CLI binary for pdf2records.
//!
//! A thin shim over the library crate: it wires up a one-session pipeline
//! (store, broker, runner, gateway), submits a single document, and follows
//! the progress channel to a terminal event.

use anyhow::{bail, Context, Result};
use clap::Parser;
use pdf2records::{
    Gateway, IngestConfig, ProgressStatus, JobRunner, ProgressBroker, SessionStore, Upload,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ingest a statement and print the records as JSON
  pdf2records statement.pdf

  # Encrypted statement
  pdf2records --passphrase 48721 statement.pdf

  # Write the record array to a file instead of stdout
  pdf2records statement.pdf -o records.json

  # Pretty-printed output with extraction counters on stderr
  pdf2records --pretty -v statement.pdf

ENVIRONMENT VARIABLES:
  PDFIUM_DYNAMIC_LIB_PATH  Path to a pdfium shared library, if it is not on
                           the default loader search path.
"#;

/// Extract transaction records from a bank-statement PDF.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2records",
    version,
    about = "Extract transaction records from bank-statement PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file to ingest.
    input: PathBuf,

    /// Passphrase for an encrypted statement.
    #[arg(short, long, env = "PDF2RECORDS_PASSPHRASE")]
    passphrase: Option<String>,

    /// Write the JSON record array to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,

    /// Directory for the transient session workspace.
    #[arg(long, env = "PDF2RECORDS_WORKSPACE_ROOT")]
    workspace_root: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors and the records themselves.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── One-shot pipeline wiring ─────────────────────────────────────────
    let mut builder = IngestConfig::builder().max_concurrent_jobs(1);
    if let Some(ref root) = cli.workspace_root {
        builder = builder.workspace_root(root);
    }
    let config = builder.build().context("invalid configuration")?;

    let store = Arc::new(SessionStore::new(&config.workspace_root));
    let broker = Arc::new(ProgressBroker::new());
    let runner = JobRunner::new(Arc::clone(&store), Arc::clone(&broker), config.clone());
    let gateway = Gateway::new(Arc::clone(&store), runner, &config);

    let bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    let filename = cli
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.pdf".to_string());

    let mut events = broker.subscribe("cli");
    let ack = gateway
        .handle_upload(
            None,
            Upload {
                filename,
                bytes,
                passphrase: cli.passphrase.clone(),
                channel_key: Some("cli".to_string()),
            },
        )
        .await
        .context("upload rejected")?;

    if !cli.quiet {
        eprintln!("job {} started (session {})", ack.job_id, ack.session_id);
    }

    // ── Follow the job to its terminal event ─────────────────────────────
    let mut exit: Result<()> = Ok(());
    while let Some(event) = events.recv().await {
        match event.status {
            ProgressStatus::Started => {
                if !cli.quiet {
                    eprintln!("processing…");
                }
            }
            ProgressStatus::Done { data } => {
                let json = if cli.pretty {
                    serde_json::to_string_pretty(&data)
                } else {
                    serde_json::to_string(&data)
                }
                .context("failed to serialize records")?;

                match cli.output {
                    Some(ref path) => {
                        tokio::fs::write(path, json.as_bytes())
                            .await
                            .with_context(|| format!("failed to write {}", path.display()))?;
                        if !cli.quiet {
                            eprintln!("{} records → {}", data.len(), path.display());
                        }
                    }
                    None => {
                        let stdout = io::stdout();
                        let mut handle = stdout.lock();
                        handle
                            .write_all(json.as_bytes())
                            .context("failed to write to stdout")?;
                        handle.write_all(b"\n").ok();
                    }
                }
                break;
            }
            ProgressStatus::Failed { error } => {
                exit = Err(anyhow::anyhow!(error));
                break;
            }
        }
    }

    // The workspace is transient either way.
    gateway
        .end_session(&ack.session_id)
        .context("failed to clean up session workspace")?;

    if let Err(e) = exit {
        bail!("ingestion failed: {e}");
    }
    Ok(())
}
