//! Result and summary types produced by the pipeline stages.
//!
//! The per-document JSON written by the dispatcher
//! ([`DocumentResult`]) is best-effort: pages whose inference failed are
//! absent from `pages`, with no placeholder. The typed
//! [`PageOutcome`] list and [`DispatchSummary::failures`] exist so that
//! callers are not limited to diffing expected-vs-produced counts to find
//! out what went wrong.

use crate::docid::DocId;
use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One successfully transcribed page inside a [`DocumentResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    /// Page identifier portion of the encoded file name (string, not
    /// necessarily numeric — ordering is a plain string sort).
    pub page: String,
    /// Path of the encoded file this text was extracted from.
    pub source_file: String,
    /// Text returned by the inference engine.
    pub ocr_text: String,
}

/// The aggregated result for one document, serialised to
/// `results/<doc_id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    pub pdf_id: String,
    /// Successful pages only, sorted by [`PageRecord::page`].
    pub pages: Vec<PageRecord>,
}

/// A discovered encoded page.
///
/// Identity is computed exactly once, at discovery time, and threaded
/// through dispatch and aggregation unchanged.
#[derive(Debug, Clone)]
pub struct PageRef {
    pub doc_id: DocId,
    /// Page identifier (see [`crate::docid::page_label_from_stem`]).
    pub page: String,
    pub path: PathBuf,
}

/// The outcome of one dispatched inference task: the page it belongs to
/// plus an explicit success-or-failure result.
#[derive(Debug)]
pub struct PageOutcome {
    pub page: PageRef,
    pub result: Result<String, PageError>,
}

impl PageOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

// ── Stage summaries ──────────────────────────────────────────────────────

/// Counters returned by [`crate::pipeline::rasterize::rasterize_corpus`].
#[derive(Debug, Default, Clone, Serialize)]
pub struct RasterizeSummary {
    /// Documents discovered in the input directory.
    pub documents: usize,
    /// Documents skipped after a load or render failure.
    pub failed_documents: usize,
    /// Pages rendered in this run.
    pub pages_rendered: usize,
    /// Pages skipped because their output file already existed.
    pub pages_skipped: usize,
}

/// Counters returned by [`crate::pipeline::encode::encode_corpus`].
#[derive(Debug, Default, Clone, Serialize)]
pub struct EncodeSummary {
    pub documents: usize,
    pub files_encoded: usize,
    /// Files whose source was kept because encoding or the output write
    /// failed; they are retried on the next run.
    pub files_failed: usize,
}

/// Counters returned by [`crate::pipeline::batch::build_batches`].
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchSummary {
    pub manifests: usize,
    pub pages: usize,
}

/// The dispatcher's run report.
///
/// `failures` lists every page that was excluded from its document's
/// result file, with the typed error that excluded it.
#[derive(Debug, Default, Serialize)]
pub struct DispatchSummary {
    pub total_pages: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Result files written (documents with at least one successful page).
    pub documents_written: usize,
    pub failures: Vec<(PathBuf, PageError)>,
}
