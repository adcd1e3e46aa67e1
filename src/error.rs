//! Error types for the ocrpipe library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Fatal**: the run cannot proceed at all (missing
//!   input directory, cannot create an output directory, cannot write a
//!   manifest or result file, no engine configured). Returned as
//!   `Err(PipelineError)` from the stage entry points.
//!
//! * [`PageError`] — **Non-fatal**: a single document or page failed (bad
//!   PDF, render glitch, unreadable encoded file, inference error) while
//!   the rest of the corpus is fine. Stored inside
//!   [`crate::output::PageOutcome`] and the stage summaries so callers can
//!   inspect partial success rather than losing the whole run to one item.
//!
//! The separation encodes the contract of each stage: rasterization,
//! encoding and dispatch isolate per-item failures and continue; structural
//! I/O failures abort.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ocrpipe library.
///
/// Per-item failures use [`PageError`] and are collected into stage
/// summaries rather than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input directory does not exist.
    #[error("Input directory not found: '{path}'\nCheck the path exists and is readable.")]
    InputDirNotFound { path: PathBuf },

    /// Could not enumerate a directory.
    #[error("Failed to read directory '{path}': {source}")]
    ReadDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Structural I/O errors (always fatal) ─────────────────────────────
    /// Could not create an output directory.
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write a batch manifest file.
    #[error("Failed to write batch manifest '{path}': {source}")]
    ManifestWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write a per-document result file.
    #[error("Failed to write result file '{path}': {source}")]
    ResultWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Batch errors ──────────────────────────────────────────────────────
    /// An encoded file's name does not carry a parsable page index.
    ///
    /// The batch builder must not silently drop pages from a manifest, so
    /// an unparsable stem aborts the stage instead of being skipped.
    #[error("Cannot derive a page index from '{path}': expected a 'p<NNNN>' file stem")]
    InvalidPageFile { path: PathBuf },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// No inference engine could be constructed (missing API key etc.).
    #[error("OCR engine is not configured.\n{hint}")]
    EngineNotConfigured { hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document or page.
///
/// The owning stage logs it, records it in its summary, and moves on.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// A document could not be opened or a page could not be rendered.
    #[error("Document '{doc}': rasterisation failed on page {page}: {detail}")]
    RenderFailed {
        doc: String,
        page: usize,
        detail: String,
    },

    /// A raster file could not be transcoded to its transport encoding.
    #[error("Encoding failed for '{path}': {detail}")]
    EncodeFailed { path: PathBuf, detail: String },

    /// An encoded file could not be read back or base64-decoded.
    #[error("Cannot decode '{path}': {detail}")]
    DecodeFailed { path: PathBuf, detail: String },

    /// The inference engine returned an error for this page.
    #[error("Inference failed for '{path}': {detail}")]
    InferenceFailed { path: PathBuf, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_page_file_display() {
        let e = PipelineError::InvalidPageFile {
            path: PathBuf::from("/enc/doc/x17.b64"),
        };
        let msg = e.to_string();
        assert!(msg.contains("x17.b64"), "got: {msg}");
        assert!(msg.contains("p<NNNN>"));
    }

    #[test]
    fn engine_not_configured_carries_hint() {
        let e = PipelineError::EngineNotConfigured {
            hint: "set OPENAI_API_KEY".into(),
        };
        assert!(e.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn render_failed_display() {
        let e = PageError::RenderFailed {
            doc: "report".into(),
            page: 7,
            detail: "bad xref".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("report"));
        assert!(msg.contains("page 7"));
    }

    #[test]
    fn page_error_round_trips_through_serde() {
        let e = PageError::InferenceFailed {
            path: PathBuf::from("enc/doc_0001.b64"),
            detail: "HTTP 500".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert!(back.to_string().contains("HTTP 500"));
    }
}
