//! Error types for the pdf2records library.
//!
//! A single fatal error type, [`IngestError`], covers everything that can
//! sink a job. The one deliberate non-error is a table row whose cell count
//! does not match its header row: those rows are skipped (and logged) inside
//! the extraction stage so one ragged row never costs the rest of the
//! document.
//!
//! [`IngestError::kind`] buckets variants into the coarse taxonomy clients
//! care about — whether to re-prompt for a passphrase, ask for a different
//! file, or simply retry the upload.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2records library.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Gateway / validation errors ───────────────────────────────────────
    /// The upload itself is unusable (missing file, empty filename,
    /// disallowed extension). Returned synchronously, before a job exists.
    #[error("invalid upload: {0}")]
    Validation(String),

    /// A session id failed validation and can never name a workspace.
    #[error("invalid session id: '{0}'")]
    InvalidSessionId(String),

    // ── Decryption errors ─────────────────────────────────────────────────
    /// Document is encrypted and no passphrase was supplied.
    #[error("document '{path}' is encrypted and requires a passphrase")]
    PassphraseRequired { path: PathBuf },

    /// A passphrase was supplied but it is wrong.
    #[error("wrong passphrase for document '{path}'")]
    DecryptionFailed { path: PathBuf },

    /// The bytes are not a structurally valid PDF (bad magic, corrupt xref).
    #[error("document '{path}' is not a readable PDF: {detail}")]
    MalformedDocument { path: PathBuf, detail: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The decrypted document could not be opened for text extraction.
    #[error("document '{path}' could not be parsed for extraction: {detail}")]
    UnreadableDocument { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// A filesystem operation on the workspace failed — typically the
    /// workspace was torn down while the job was still running.
    #[error("workspace I/O failure at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A derived file (decrypted copy, interchange artifact) could not be
    /// written.
    #[error("failed to write derived file '{path}': {detail}")]
    WriteFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked blocking task, poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`IngestError`], for clients that branch on
/// what the user should do next rather than on the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad upload shape — retry with a different input.
    Validation,
    /// Supply or correct a passphrase.
    Passphrase,
    /// The file is not a parseable document — a different file is needed.
    Document,
    /// Workspace unavailable — retriable by re-uploading.
    Io,
    /// Misconfiguration at construction time.
    Config,
    /// Bug territory.
    Internal,
}

impl IngestError {
    /// Bucket this error into the client-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Validation(_) | IngestError::InvalidSessionId(_) => ErrorKind::Validation,
            IngestError::PassphraseRequired { .. } | IngestError::DecryptionFailed { .. } => {
                ErrorKind::Passphrase
            }
            IngestError::MalformedDocument { .. } | IngestError::UnreadableDocument { .. } => {
                ErrorKind::Document
            }
            IngestError::Io { .. } | IngestError::WriteFailed { .. } => ErrorKind::Io,
            IngestError::InvalidConfig(_) => ErrorKind::Config,
            IngestError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-submitting the same document could succeed.
    ///
    /// I/O failures are transient (a concurrent teardown ate the workspace);
    /// passphrase failures succeed once the right passphrase is supplied.
    /// Document-shaped failures never do.
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io | ErrorKind::Passphrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn passphrase_required_display() {
        let e = IngestError::PassphraseRequired {
            path: Path::new("/tmp/s1/statement.pdf").to_path_buf(),
        };
        let msg = e.to_string();
        assert!(msg.contains("statement.pdf"), "got: {msg}");
        assert!(msg.contains("requires a passphrase"), "got: {msg}");
    }

    #[test]
    fn wrong_passphrase_distinct_from_missing() {
        let failed = IngestError::DecryptionFailed {
            path: PathBuf::from("a.pdf"),
        };
        let missing = IngestError::PassphraseRequired {
            path: PathBuf::from("a.pdf"),
        };
        assert_ne!(failed.to_string(), missing.to_string());
        assert_eq!(failed.kind(), ErrorKind::Passphrase);
        assert_eq!(missing.kind(), ErrorKind::Passphrase);
    }

    #[test]
    fn kind_mapping_covers_taxonomy() {
        assert_eq!(
            IngestError::Validation("no file".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            IngestError::MalformedDocument {
                path: PathBuf::from("x.pdf"),
                detail: "bad magic".into(),
            }
            .kind(),
            ErrorKind::Document
        );
        assert_eq!(
            IngestError::UnreadableDocument {
                path: PathBuf::from("x.pdf"),
                detail: "no xref".into(),
            }
            .kind(),
            ErrorKind::Document
        );
        assert_eq!(
            IngestError::Io {
                path: PathBuf::from("/gone"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            }
            .kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn io_is_retriable_document_is_not() {
        let io = IngestError::WriteFailed {
            path: PathBuf::from("output.json"),
            detail: "disk full".into(),
        };
        assert!(io.is_retriable());

        let doc = IngestError::MalformedDocument {
            path: PathBuf::from("x.pdf"),
            detail: "truncated".into(),
        };
        assert!(!doc.is_retriable());
    }
}
