//! Decryption stage: produce a password-free copy of the source document.
//!
//! The stage always writes a copy at the requested output location, even for
//! documents that were never encrypted — downstream extraction then has a
//! single uniform input path and no encrypted/plain branching.
//!
//! pdfium reports every password problem through the same error code, so the
//! presence of a caller-supplied passphrase is what distinguishes "wrong
//! passphrase" from "passphrase missing". There is no passphrase default
//! anywhere in this crate; the parameter is explicit at every call site.

use crate::error::IngestError;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A decrypted (or verified-plain) document ready for extraction.
#[derive(Debug, Clone)]
pub struct DecryptedDocument {
    pub path: PathBuf,
    pub page_count: usize,
}

/// Decrypt `input` into `output`, returning the output path and page count.
///
/// # Errors
/// - [`IngestError::MalformedDocument`] — not a PDF at all, or corrupt
/// - [`IngestError::PassphraseRequired`] — encrypted, no passphrase given
/// - [`IngestError::DecryptionFailed`] — encrypted, wrong passphrase
/// - [`IngestError::Io`] / [`IngestError::WriteFailed`] — workspace trouble,
///   typically a teardown racing this job
pub async fn decrypt(
    input: &Path,
    output: &Path,
    passphrase: Option<&str>,
) -> Result<DecryptedDocument, IngestError> {
    let input = input.to_path_buf();
    let output = output.to_path_buf();
    let passphrase = passphrase.map(str::to_owned);

    tokio::task::spawn_blocking(move || decrypt_blocking(&input, &output, passphrase.as_deref()))
        .await
        .map_err(|e| IngestError::Internal(format!("decrypt task panicked: {e}")))?
}

/// Blocking implementation of the decryption stage.
fn decrypt_blocking(
    input: &Path,
    output: &Path,
    passphrase: Option<&str>,
) -> Result<DecryptedDocument, IngestError> {
    check_magic(input)?;

    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_file(input, passphrase)
        .map_err(|e| classify_open_error(input, passphrase, e))?;

    let page_count = document.pages().len() as usize;
    debug!(pages = page_count, input = %input.display(), "document opened");

    // FPDF_SaveAsCopy writes the document without its security handler, so
    // the copy opens downstream with no passphrase. Page order is the
    // document's own order; nothing is dropped.
    document
        .save_to_file(output)
        .map_err(|e| IngestError::WriteFailed {
            path: output.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    info!(
        pages = page_count,
        output = %output.display(),
        "decrypted copy written"
    );

    Ok(DecryptedDocument {
        path: output.to_path_buf(),
        page_count,
    })
}

/// Verify the `%PDF` magic before handing the file to pdfium, so a renamed
/// spreadsheet gets a precise error instead of a generic engine failure.
fn check_magic(path: &Path) -> Result<(), IngestError> {
    let mut file = std::fs::File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) if &magic == b"%PDF" => Ok(()),
        Ok(()) => Err(IngestError::MalformedDocument {
            path: path.to_path_buf(),
            detail: format!("first bytes {magic:?} are not '%PDF'"),
        }),
        Err(_) => Err(IngestError::MalformedDocument {
            path: path.to_path_buf(),
            detail: "shorter than a PDF header".into(),
        }),
    }
}

/// Map a pdfium open error onto the decryption taxonomy.
fn classify_open_error(path: &Path, passphrase: Option<&str>, err: PdfiumError) -> IngestError {
    let err_str = format!("{err:?}");
    if err_str.contains("Password") || err_str.contains("password") {
        if passphrase.is_some() {
            IngestError::DecryptionFailed {
                path: path.to_path_buf(),
            }
        } else {
            IngestError::PassphraseRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        IngestError::MalformedDocument {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn non_pdf_bytes_are_malformed() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("statement.pdf");
        std::fs::write(&input, b"PK\x03\x04 definitely a zip").unwrap();

        let err = decrypt(&input, &tmp.path().join("unlocked.pdf"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MalformedDocument { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn truncated_file_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("tiny.pdf");
        std::fs::write(&input, b"%P").unwrap();

        let err = decrypt(&input, &tmp.path().join("unlocked.pdf"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MalformedDocument { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn missing_input_is_io() {
        let tmp = TempDir::new().unwrap();
        let err = decrypt(
            &tmp.path().join("never-written.pdf"),
            &tmp.path().join("unlocked.pdf"),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::Io { .. }), "{err:?}");
    }

    #[test]
    fn password_errors_split_on_passphrase_presence() {
        let path = Path::new("doc.pdf");
        let err = PdfiumError::PdfiumLibraryInternalError(
            PdfiumInternalError::PasswordError,
        );
        assert!(matches!(
            classify_open_error(path, None, err),
            IngestError::PassphraseRequired { .. }
        ));

        let err = PdfiumError::PdfiumLibraryInternalError(
            PdfiumInternalError::PasswordError,
        );
        assert!(matches!(
            classify_open_error(path, Some("hunter2"), err),
            IngestError::DecryptionFailed { .. }
        ));

        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError);
        assert!(matches!(
            classify_open_error(path, Some("hunter2"), err),
            IngestError::MalformedDocument { .. }
        ));
    }
}
