//! Pipeline stages for statement ingestion.
//!
//! Each submodule implements exactly one transformation step, keeping stages
//! independently testable and swappable.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ decrypt ──▶ extract ──▶ output.json
//! (workspace) (pdfium)   (tables)    (artifact)
//! ```
//!
//! 1. [`decrypt`] — produce a password-free copy of the uploaded document at
//!    a uniform location, whether or not the source was encrypted; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 2. [`extract`] — walk pages in order, detect tables, and turn rows into
//!    header-keyed records; the only stage that allocates proportionally to
//!    the document's content

pub mod decrypt;
pub mod extract;
