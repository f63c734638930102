//! # pdf2records
//!
//! Asynchronous ingestion pipeline turning bank-statement PDFs into
//! structured transaction records.
//!
//! ## Why this crate?
//!
//! Statement PDFs are tables wearing a print layout. Generic text dumps
//! scramble the columns and lose the row order that encodes transaction
//! chronology. This crate recovers the tables geometrically, row by row and
//! page by page, and hands downstream consumers a flat, ordered record
//! sequence they can aggregate without ever touching a PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Gateway   validate filename/extension, write into the workspace
//!  ├─ 2. Session   one isolated directory per client session
//!  ├─ 3. Runner    background task per job, bounded by a worker pool
//!  ├─ 4. Decrypt   passphrase removal via pdfium (spawn_blocking)
//!  ├─ 5. Extract   page-ordered table detection → header-keyed records
//!  └─ 6. Progress  push events: started → (done | failed), exactly one
//!                  terminal event per job; output.json in the workspace
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2records::{Gateway, IngestConfig, JobRunner, ProgressBroker, SessionStore, Upload};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::default();
//!     let store = Arc::new(SessionStore::new(&config.workspace_root));
//!     let broker = Arc::new(ProgressBroker::new());
//!     let runner = JobRunner::new(Arc::clone(&store), Arc::clone(&broker), config.clone());
//!     let gateway = Gateway::new(Arc::clone(&store), runner, &config);
//!
//!     let reaper = store.spawn_reaper(config.reap_interval, config.idle_timeout);
//!
//!     let mut events = broker.subscribe("client-1");
//!     let ack = gateway
//!         .handle_upload(None, Upload {
//!             filename: "statement.pdf".into(),
//!             bytes: std::fs::read("statement.pdf")?,
//!             passphrase: None,
//!             channel_key: Some("client-1".into()),
//!         })
//!         .await?;
//!     println!("job {} accepted for session {}", ack.job_id, ack.session_id);
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{}", serde_json::to_string(&event)?);
//!         if event.is_terminal() {
//!             break;
//!         }
//!     }
//!
//!     gateway.end_session(&ack.session_id)?;
//!     reaper.abort();
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2records` binary (clap + anyhow + tracing-subscriber) |
//!
//! The library binds to a pdfium shared library at runtime
//! (`Pdfium::default()`); point `PDFIUM_DYNAMIC_LIB_PATH` at a copy if it is
//! not on the default search path.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod runner;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder};
pub use error::{ErrorKind, IngestError};
pub use gateway::{Gateway, Upload, UploadAck};
pub use pipeline::decrypt::DecryptedDocument;
pub use progress::{ProgressBroker, ProgressEvent, ProgressStatus};
pub use record::{ExtractionOutput, ExtractionStats, Record};
pub use runner::{JobId, JobPhase, JobRequest, JobRunner, JobSnapshot};
pub use session::SessionStore;
