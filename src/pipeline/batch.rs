//! Batch manifest construction: flatten the encoded corpus into fixed-size
//! JSONL manifests for bulk submission.
//!
//! Manifests are purely additive: they reference encoded files without
//! consuming or mutating them, so this stage can be re-run at will (each
//! run rewrites the manifest sequence from scratch).
//!
//! Unlike the rasterizer and encoder there is no skip-and-continue here:
//! the stage performs no risky per-item transformation, and a manifest
//! that silently dropped pages would corrupt downstream accounting. Any
//! error is fatal.

use crate::config::PipelineConfig;
use crate::docid::{page_index_from_stem, DocId};
use crate::error::PipelineError;
use crate::output::BatchSummary;
use crate::pipeline::encode::ENCODED_EXT;
use crate::progress::Stage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// One line of a batch manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub pdf_id: DocId,
    pub page_idx: usize,
    pub path: PathBuf,
}

/// Partition the encoded corpus under `encoded_dir` into sequentially
/// numbered manifests of at most `pages_per_batch` records each.
///
/// Documents are taken in directory-enumeration order; pages within a
/// document in filename order. For N pages and capacity B this produces
/// exactly ceil(N/B) manifests, every page appearing exactly once.
pub async fn build_batches(
    encoded_dir: &Path,
    batches_dir: &Path,
    config: &PipelineConfig,
) -> Result<BatchSummary, PipelineError> {
    if !encoded_dir.is_dir() {
        return Err(PipelineError::InputDirNotFound {
            path: encoded_dir.to_path_buf(),
        });
    }
    tokio::fs::create_dir_all(batches_dir)
        .await
        .map_err(|e| PipelineError::CreateDirFailed {
            path: batches_dir.to_path_buf(),
            source: e,
        })?;

    let records = collect_records(encoded_dir)?;
    if records.is_empty() {
        info!("no encoded pages found in {}", encoded_dir.display());
        return Ok(BatchSummary::default());
    }

    if let Some(ref cb) = config.progress {
        cb.on_stage_start(Stage::Batch, records.len());
    }

    let mut manifests = 0;
    let mut pages_done = 0;
    for (i, chunk) in records.chunks(config.pages_per_batch).enumerate() {
        let manifest_path = batches_dir.join(format!("batch_{:04}.jsonl", i + 1));
        write_manifest(&manifest_path, chunk).await?;
        manifests += 1;
        pages_done += chunk.len();
        if let Some(ref cb) = config.progress {
            cb.on_item_done(Stage::Batch, pages_done, records.len());
        }
    }

    info!(manifests, pages = records.len(), "created batch manifests");
    if let Some(ref cb) = config.progress {
        cb.on_stage_complete(Stage::Batch, records.len(), 0);
    }

    Ok(BatchSummary {
        manifests,
        pages: records.len(),
    })
}

/// Enumerate the corpus into a flat record list.
///
/// Document directories keep the order the filesystem enumerates them in;
/// callers wanting a stable cross-run order must sort the tree themselves.
fn collect_records(encoded_dir: &Path) -> Result<Vec<BatchRecord>, PipelineError> {
    let entries = std::fs::read_dir(encoded_dir).map_err(|e| PipelineError::ReadDirFailed {
        path: encoded_dir.to_path_buf(),
        source: e,
    })?;

    let mut records = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let doc_dir = entry.path();
        if !doc_dir.is_dir() {
            continue;
        }
        let pdf_id = DocId::from_dir_name(
            &doc_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        for path in list_encoded_files(&doc_dir)? {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let page_idx =
                page_index_from_stem(&stem).ok_or_else(|| PipelineError::InvalidPageFile {
                    path: path.clone(),
                })?;

            records.push(BatchRecord {
                pdf_id: pdf_id.clone(),
                page_idx,
                path,
            });
        }
    }
    Ok(records)
}

/// Encoded page files of one document directory, in filename order.
fn list_encoded_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::ReadDirFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case(ENCODED_EXT))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Write one manifest: one JSON record per line, write-once.
async fn write_manifest(path: &Path, records: &[BatchRecord]) -> Result<(), PipelineError> {
    let mut body = String::new();
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| PipelineError::Internal(format!("manifest serialisation: {e}")))?;
        body.push_str(&line);
        body.push('\n');
    }

    tokio::fs::write(path, body)
        .await
        .map_err(|e| PipelineError::ManifestWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}
