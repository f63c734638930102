//! Ingestion gateway: upload validation and job hand-off.
//!
//! Deliberately thin. The gateway's whole job is to reject unusable uploads
//! synchronously — before any workspace or job exists — and to turn a good
//! one into a workspace file plus a submitted job. The HTTP layer that
//! carries the multipart request lives outside this crate and calls
//! [`Gateway::handle_upload`] with the already-read parts.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::runner::{JobId, JobRequest, JobRunner};
use crate::session::SessionStore;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Characters replaced when reducing an uploaded filename to one safe path
/// segment.
static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("filename regex"));

/// One upload, as handed over by the transport layer.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original filename; used only for extension validation.
    pub filename: String,
    /// Raw document bytes.
    pub bytes: Vec<u8>,
    /// Explicit passphrase for encrypted documents. No default exists.
    pub passphrase: Option<String>,
    /// Progress-channel key supplied by the client (e.g. its socket id).
    pub channel_key: Option<String>,
}

/// Immediate acknowledgment returned while the job proceeds asynchronously.
#[derive(Debug, Clone, Serialize)]
pub struct UploadAck {
    pub job_id: JobId,
    pub session_id: String,
}

/// Boundary component wiring validation, the session store, and the runner.
pub struct Gateway {
    store: Arc<SessionStore>,
    runner: Arc<JobRunner>,
    allowed_extensions: Vec<String>,
}

impl Gateway {
    pub fn new(store: Arc<SessionStore>, runner: Arc<JobRunner>, config: &IngestConfig) -> Self {
        Self {
            store,
            runner,
            allowed_extensions: config.allowed_extensions.clone(),
        }
    }

    /// Validate an upload, persist it into the session's workspace, and
    /// submit the ingestion job.
    ///
    /// Suspends only for the workspace file write; decryption and extraction
    /// happen on the runner's background task. When `session_id` is `None` a
    /// fresh v4 id is generated, which is how a first-contact client gets
    /// its session.
    pub async fn handle_upload(
        &self,
        session_id: Option<&str>,
        upload: Upload,
    ) -> Result<UploadAck, IngestError> {
        validate_upload(&upload, &self.allowed_extensions)?;

        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let workspace = self.store.acquire(&session_id)?;

        let filename = sanitize_filename(&upload.filename);
        let document = workspace.join(&filename);
        tokio::fs::write(&document, &upload.bytes)
            .await
            .map_err(|source| IngestError::Io {
                path: document.clone(),
                source,
            })?;
        debug!(session = %session_id, file = %filename, bytes = upload.bytes.len(), "upload stored");

        let job_id = self.runner.submit(JobRequest {
            session_id: session_id.clone(),
            document,
            passphrase: upload.passphrase,
            channel_key: upload.channel_key,
        });

        Ok(UploadAck { job_id, session_id })
    }

    /// Explicit end-of-session: tear down the calling client's workspace.
    pub fn end_session(&self, session_id: &str) -> Result<(), IngestError> {
        info!(session = session_id, "session ended by client");
        self.store.release(session_id)
    }
}

/// Synchronous upload checks; failures here never create a job.
fn validate_upload(upload: &Upload, allowed: &[String]) -> Result<(), IngestError> {
    if upload.bytes.is_empty() {
        return Err(IngestError::Validation("no file uploaded".into()));
    }
    if upload.filename.trim().is_empty() {
        return Err(IngestError::Validation("no filename supplied".into()));
    }

    let extension = upload
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if allowed.iter().any(|a| *a == ext) => Ok(()),
        _ => Err(IngestError::Validation(format!(
            "file type not allowed (expected one of: {})",
            allowed.join(", ")
        ))),
    }
}

/// Reduce an uploaded filename to a single safe path segment.
///
/// Strips any directory components the client smuggled in, then replaces
/// everything outside `[A-Za-z0-9._-]`. The extension was validated before
/// this runs, so the result still ends in an allowed extension.
fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim_start_matches('.');
    let safe = UNSAFE_FILENAME_CHARS.replace_all(base, "_");
    if safe.is_empty() {
        "upload.pdf".to_string()
    } else {
        safe.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(filename: &str, bytes: &[u8]) -> Upload {
        Upload {
            filename: filename.to_string(),
            bytes: bytes.to_vec(),
            passphrase: None,
            channel_key: None,
        }
    }

    fn pdf_only() -> Vec<String> {
        vec!["pdf".to_string()]
    }

    #[test]
    fn empty_bytes_are_rejected() {
        let err = validate_upload(&upload("statement.pdf", b""), &pdf_only()).unwrap_err();
        assert!(err.to_string().contains("no file"), "{err}");
    }

    #[test]
    fn empty_filename_is_rejected() {
        let err = validate_upload(&upload("   ", b"%PDF"), &pdf_only()).unwrap_err();
        assert!(err.to_string().contains("filename"), "{err}");
    }

    #[test]
    fn disallowed_extension_is_rejected() {
        for name in ["report.docx", "statement", "archive.pdf.zip", ".pdf.exe"] {
            let err = validate_upload(&upload(name, b"%PDF"), &pdf_only()).unwrap_err();
            assert!(
                matches!(err, IngestError::Validation(_)),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn pdf_extension_is_case_insensitive() {
        for name in ["statement.pdf", "STATEMENT.PDF", "mixed.Pdf"] {
            assert!(validate_upload(&upload(name, b"%PDF"), &pdf_only()).is_ok());
        }
    }

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_filename("statement.pdf"), "statement.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd.pdf"), "passwd.pdf");
        assert_eq!(sanitize_filename(r"C:\Users\me\jan 2024.pdf"), "jan_2024.pdf");
        assert_eq!(sanitize_filename("..sneaky.pdf"), "sneaky.pdf");
        assert_eq!(sanitize_filename("état (mars).pdf"), "_tat_mars_.pdf");
    }
}
