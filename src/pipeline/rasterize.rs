//! Corpus rasterization: one PNG per page, resumable at page granularity.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not be driven from async contexts.
//! `tokio::task::spawn_blocking` moves each document's rendering onto the
//! blocking pool so the runtime's worker threads never stall on a slow
//! page.
//!
//! ## Resume contract
//!
//! The only persisted progress state is the output tree itself: a page
//! whose `p{idx:04}.png` already exists is skipped. Interrupting a run and
//! restarting it re-renders nothing that completed, at the cost of one
//! `exists()` probe per page.

use crate::config::PipelineConfig;
use crate::docid::{page_file_stem, DocId};
use crate::error::{PageError, PipelineError};
use crate::output::RasterizeSummary;
use crate::progress::Stage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Rasterise every PDF in `pdf_dir` into per-document subdirectories of
/// `images_dir`.
///
/// A document that fails to load or render is logged and skipped; the run
/// continues with the next document. Only structural I/O failures
/// (directory creation/enumeration) abort.
pub async fn rasterize_corpus(
    pdf_dir: &Path,
    images_dir: &Path,
    config: &PipelineConfig,
) -> Result<RasterizeSummary, PipelineError> {
    if !pdf_dir.is_dir() {
        return Err(PipelineError::InputDirNotFound {
            path: pdf_dir.to_path_buf(),
        });
    }
    std::fs::create_dir_all(images_dir).map_err(|e| PipelineError::CreateDirFailed {
        path: images_dir.to_path_buf(),
        source: e,
    })?;

    let pdfs = list_pdf_files(pdf_dir)?;
    if pdfs.is_empty() {
        warn!("no PDF files found in {}", pdf_dir.display());
        return Ok(RasterizeSummary::default());
    }

    if let Some(ref cb) = config.progress {
        cb.on_stage_start(Stage::Rasterize, pdfs.len());
    }

    let mut summary = RasterizeSummary {
        documents: pdfs.len(),
        ..Default::default()
    };

    for (i, pdf_path) in pdfs.iter().enumerate() {
        let Some(doc_id) = DocId::from_source_path(pdf_path) else {
            warn!("skipping '{}': no UTF-8 file stem", pdf_path.display());
            summary.failed_documents += 1;
            continue;
        };

        let doc_dir = images_dir.join(doc_id.as_str());
        std::fs::create_dir_all(&doc_dir).map_err(|e| PipelineError::CreateDirFailed {
            path: doc_dir.clone(),
            source: e,
        })?;

        match rasterize_document(pdf_path, &doc_dir, config.dpi).await {
            Ok((rendered, skipped)) => {
                debug!(
                    doc = doc_id.as_str(),
                    rendered, skipped, "document rasterised"
                );
                summary.pages_rendered += rendered;
                summary.pages_skipped += skipped;
                if let Some(ref cb) = config.progress {
                    cb.on_item_done(Stage::Rasterize, i + 1, pdfs.len());
                }
            }
            Err(e) => {
                warn!("error processing {}: {e}", pdf_path.display());
                summary.failed_documents += 1;
                if let Some(ref cb) = config.progress {
                    cb.on_item_failed(Stage::Rasterize, doc_id.as_str(), &e.to_string());
                }
            }
        }
    }

    info!(
        documents = summary.documents,
        rendered = summary.pages_rendered,
        skipped = summary.pages_skipped,
        failed_documents = summary.failed_documents,
        "rasterisation complete"
    );
    if let Some(ref cb) = config.progress {
        cb.on_stage_complete(
            Stage::Rasterize,
            summary.documents - summary.failed_documents,
            summary.failed_documents,
        );
    }

    Ok(summary)
}

/// Rasterise the pages of one document that are not already on disk.
///
/// Returns `(rendered, skipped)` counts. The page count comes from a
/// metadata probe — no page is decoded until it is known to be pending.
pub async fn rasterize_document(
    pdf_path: &Path,
    out_dir: &Path,
    dpi: u32,
) -> Result<(usize, usize), PageError> {
    let path = pdf_path.to_path_buf();
    let out = out_dir.to_path_buf();

    tokio::task::spawn_blocking(move || rasterize_document_blocking(&path, &out, dpi))
        .await
        .map_err(|e| PageError::RenderFailed {
            doc: doc_label(pdf_path),
            page: 0,
            detail: format!("render task panicked: {e}"),
        })?
}

/// Blocking implementation of single-document rasterisation.
fn rasterize_document_blocking(
    pdf_path: &Path,
    out_dir: &Path,
    dpi: u32,
) -> Result<(usize, usize), PageError> {
    let doc = doc_label(pdf_path);

    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| PageError::RenderFailed {
            doc: doc.clone(),
            page: 0,
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let total = pages.len() as usize;

    let pending = pending_pages(out_dir, total);
    let skipped = total - pending.len();
    debug!(doc = doc.as_str(), total, pending = pending.len(), "page plan");

    // Points are 1/72 inch, so dpi/72 converts page width to pixels.
    let scale = dpi as f32 / 72.0;

    for &idx in &pending {
        let page = pages
            .get((idx - 1) as u16)
            .map_err(|e| PageError::RenderFailed {
                doc: doc.clone(),
                page: idx,
                detail: format!("{e:?}"),
            })?;

        let target_width = (page.width().value * scale).round().max(1.0) as i32;
        let render_config = PdfRenderConfig::new().set_target_width(target_width);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| PageError::RenderFailed {
                doc: doc.clone(),
                page: idx,
                detail: format!("{e:?}"),
            })?;

        let image = bitmap.as_image();
        let out_path = out_dir.join(format!("{}.png", page_file_stem(idx)));
        image.save(&out_path).map_err(|e| PageError::RenderFailed {
            doc: doc.clone(),
            page: idx,
            detail: format!("failed to write '{}': {e}", out_path.display()),
        })?;

        debug!(
            doc = doc.as_str(),
            page = idx,
            width = image.width(),
            height = image.height(),
            "page rendered"
        );
    }

    Ok((pending.len(), skipped))
}

/// 1-based indices of pages whose output file does not exist yet.
///
/// Pure existence probing; this is the entirety of the resume logic.
pub fn pending_pages(out_dir: &Path, page_count: usize) -> Vec<usize> {
    (1..=page_count)
        .filter(|&idx| !out_dir.join(format!("{}.png", page_file_stem(idx))).exists())
        .collect()
}

/// Source PDFs in `dir`, sorted by file name for stable processing order.
fn list_pdf_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::ReadDirFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .collect();
    pdfs.sort();
    Ok(pdfs)
}

fn doc_label(pdf_path: &Path) -> String {
    pdf_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| pdf_path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_pages_skips_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p0001.png"), b"x").unwrap();
        std::fs::write(dir.path().join("p0003.png"), b"x").unwrap();

        assert_eq!(pending_pages(dir.path(), 3), vec![2]);
    }

    #[test]
    fn fully_populated_directory_has_no_pending_pages() {
        let dir = tempfile::tempdir().unwrap();
        for idx in 1..=4 {
            std::fs::write(dir.path().join(format!("{}.png", page_file_stem(idx))), b"x").unwrap();
        }

        assert!(pending_pages(dir.path(), 4).is_empty());
    }

    #[test]
    fn empty_directory_pends_every_page() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(pending_pages(dir.path(), 3), vec![1, 2, 3]);
    }

    #[test]
    fn list_pdf_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("a.PDF"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let names: Vec<String> = list_pdf_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }
}
