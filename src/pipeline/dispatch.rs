//! Concurrent dispatch and per-document aggregation.
//!
//! The dispatcher discovers encoded pages on its own (recursively, by
//! extension) rather than consuming batch manifests, so it works on any
//! encoded corpus regardless of which tool produced it. Document identity
//! comes from the file *name* — the final `_`-delimited segment of the
//! stem is the page identifier, the rest is the document — and is computed
//! exactly once at discovery.
//!
//! ## Concurrency model
//!
//! One task per page through `buffer_unordered(workers)`: every page is
//! submitted up front, at most `workers` inference calls are in flight,
//! and completion order is irrelevant because each outcome carries its own
//! page identity. There is no cancellation, no timeout and no retry; the
//! dispatcher joins every task before aggregation begins.
//!
//! ## Failure isolation
//!
//! A failed page yields a typed [`PageOutcome`] error. It is excluded from
//! its document's JSON (best-effort output, no placeholder) but counted
//! and listed in the returned [`DispatchSummary`].

use crate::config::PipelineConfig;
use crate::docid::{page_label_from_stem, DocId};
use crate::engine::OcrEngine;
use crate::error::{PageError, PipelineError};
use crate::output::{DispatchSummary, DocumentResult, PageOutcome, PageRecord, PageRef};
use crate::pipeline::encode::ENCODED_EXT;
use crate::progress::Stage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Completion-log cadence. Purely informational.
const PROGRESS_LOG_EVERY: usize = 10;

/// Transcribe every encoded page under `encoded_dir` and write one
/// aggregated JSON result per document into `results_dir`.
///
/// Result files are named after the document identifier and overwrite any
/// previous file of the same name. A document whose every page failed
/// produces no file.
pub async fn dispatch_corpus(
    encoded_dir: &Path,
    results_dir: &Path,
    engine: Arc<dyn OcrEngine>,
    config: &PipelineConfig,
) -> Result<DispatchSummary, PipelineError> {
    if !encoded_dir.is_dir() {
        return Err(PipelineError::InputDirNotFound {
            path: encoded_dir.to_path_buf(),
        });
    }
    tokio::fs::create_dir_all(results_dir)
        .await
        .map_err(|e| PipelineError::CreateDirFailed {
            path: results_dir.to_path_buf(),
            source: e,
        })?;

    let pages = discover_pages(encoded_dir);
    if pages.is_empty() {
        warn!("no .{ENCODED_EXT} files found in {}", encoded_dir.display());
        return Ok(DispatchSummary::default());
    }

    let doc_count = pages
        .iter()
        .map(|p| &p.doc_id)
        .collect::<BTreeSet<_>>()
        .len();
    info!(
        "found {} files across {} documents",
        pages.len(),
        doc_count
    );
    if let Some(ref cb) = config.progress {
        cb.on_stage_start(Stage::Dispatch, pages.len());
    }

    let total = pages.len();
    let completed = Arc::new(AtomicUsize::new(0));

    let outcomes: Vec<PageOutcome> = stream::iter(pages.into_iter().map(|page| {
        let engine = Arc::clone(&engine);
        let completed = Arc::clone(&completed);
        let progress = config.progress.clone();
        async move {
            let result = transcribe_page(engine.as_ref(), &page).await;

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if done % PROGRESS_LOG_EVERY == 0 {
                info!("processed {done}/{total} pages");
            }
            match &result {
                Ok(_) => {
                    if let Some(ref cb) = progress {
                        cb.on_item_done(Stage::Dispatch, done, total);
                    }
                }
                Err(e) => {
                    warn!("error processing {}: {e}", page.path.display());
                    if let Some(ref cb) = progress {
                        cb.on_item_failed(
                            Stage::Dispatch,
                            &page.path.display().to_string(),
                            &e.to_string(),
                        );
                    }
                }
            }

            PageOutcome { page, result }
        }
    }))
    .buffer_unordered(config.workers)
    .collect()
    .await;

    // Every task has joined; aggregation sees the complete outcome set.
    let summary = aggregate(outcomes, results_dir).await?;

    info!(
        total = summary.total_pages,
        succeeded = summary.succeeded,
        failed = summary.failed,
        documents = summary.documents_written,
        "dispatch complete"
    );
    if let Some(ref cb) = config.progress {
        cb.on_stage_complete(Stage::Dispatch, summary.succeeded, summary.failed);
    }

    Ok(summary)
}

/// Recursively discover encoded pages and fix their identity.
///
/// Sorted by path for stable logs; dispatch order carries no meaning.
fn discover_pages(root: &Path) -> Vec<PageRef> {
    let mut pages: Vec<PageRef> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(ENCODED_EXT))
                .unwrap_or(false)
        })
        .map(|e| {
            let path = e.into_path();
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            PageRef {
                doc_id: DocId::from_encoded_stem(&stem),
                page: page_label_from_stem(&stem).to_string(),
                path,
            }
        })
        .collect();
    pages.sort_by(|a, b| a.path.cmp(&b.path));
    pages
}

/// Read one encoded page, decode it, and run inference on it.
async fn transcribe_page(engine: &dyn OcrEngine, page: &PageRef) -> Result<String, PageError> {
    let b64 = tokio::fs::read_to_string(&page.path)
        .await
        .map_err(|e| PageError::DecodeFailed {
            path: page.path.clone(),
            detail: e.to_string(),
        })?;

    let image = STANDARD
        .decode(b64.trim())
        .map_err(|e| PageError::DecodeFailed {
            path: page.path.clone(),
            detail: e.to_string(),
        })?;

    engine
        .extract_text(&image)
        .await
        .map_err(|e| PageError::InferenceFailed {
            path: page.path.clone(),
            detail: e.to_string(),
        })
}

/// Regroup outcomes by document and write one ordered result per document.
async fn aggregate(
    outcomes: Vec<PageOutcome>,
    results_dir: &Path,
) -> Result<DispatchSummary, PipelineError> {
    let mut summary = DispatchSummary {
        total_pages: outcomes.len(),
        ..Default::default()
    };

    let mut by_doc: BTreeMap<DocId, Vec<(String, PathBuf, String)>> = BTreeMap::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(text) => {
                summary.succeeded += 1;
                by_doc
                    .entry(outcome.page.doc_id)
                    .or_default()
                    .push((outcome.page.page, outcome.page.path, text));
            }
            Err(e) => {
                summary.failed += 1;
                summary.failures.push((outcome.page.path, e));
            }
        }
    }

    for (doc_id, mut pages) in by_doc {
        // Page identifiers are sorted as strings; identifiers of differing
        // width therefore interleave ("1" < "10" < "2").
        pages.sort_by(|a, b| a.0.cmp(&b.0));

        let result = DocumentResult {
            pdf_id: doc_id.as_str().to_string(),
            pages: pages
                .into_iter()
                .map(|(page, path, text)| PageRecord {
                    page,
                    source_file: path.display().to_string(),
                    ocr_text: text,
                })
                .collect(),
        };

        let out_path = results_dir.join(format!("{}.json", doc_id.as_str()));
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| PipelineError::Internal(format!("result serialisation: {e}")))?;
        tokio::fs::write(&out_path, json)
            .await
            .map_err(|e| PipelineError::ResultWriteFailed {
                path: out_path.clone(),
                source: e,
            })?;

        info!(
            "saved results for document {} ({} pages)",
            doc_id,
            result.pages.len()
        );
        summary.documents_written += 1;
    }

    Ok(summary)
}
