//! Transport encoding: raster page images → base64 text files.
//!
//! Inference hosts consume pages as text payloads, so each PNG is
//! re-encoded as standard base64 and the raster deleted afterwards to
//! reclaim space — a corpus at 200 DPI is tens of gigabytes of PNG.
//! The delete happens only after the encoded file has been written
//! successfully; a failed file keeps its source and is picked up again on
//! the next run.
//!
//! The encoding is lossless by construction: decoding an output file
//! yields the original image bytes exactly.

use crate::config::PipelineConfig;
use crate::error::{PageError, PipelineError};
use crate::output::EncodeSummary;
use crate::progress::Stage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File extension for encoded pages.
pub const ENCODED_EXT: &str = "b64";

/// Encode every per-document image subdirectory of `images_dir` into a
/// mirrored subdirectory of `encoded_dir`.
///
/// Per-file failures are logged and skipped (source preserved); directory
/// creation or enumeration failures abort.
pub async fn encode_corpus(
    images_dir: &Path,
    encoded_dir: &Path,
    config: &PipelineConfig,
) -> Result<EncodeSummary, PipelineError> {
    if !images_dir.is_dir() {
        return Err(PipelineError::InputDirNotFound {
            path: images_dir.to_path_buf(),
        });
    }
    tokio::fs::create_dir_all(encoded_dir)
        .await
        .map_err(|e| PipelineError::CreateDirFailed {
            path: encoded_dir.to_path_buf(),
            source: e,
        })?;

    let doc_dirs = list_subdirs(images_dir)?;
    if doc_dirs.is_empty() {
        warn!("no document directories found in {}", images_dir.display());
        return Ok(EncodeSummary::default());
    }

    if let Some(ref cb) = config.progress {
        cb.on_stage_start(Stage::Encode, doc_dirs.len());
    }

    let mut summary = EncodeSummary {
        documents: doc_dirs.len(),
        ..Default::default()
    };

    for (i, doc_dir) in doc_dirs.iter().enumerate() {
        let doc_name = doc_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let out_dir = encoded_dir.join(&doc_name);
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| PipelineError::CreateDirFailed {
                path: out_dir.clone(),
                source: e,
            })?;

        for png_path in list_page_images(doc_dir)? {
            match encode_file(&png_path, &out_dir).await {
                Ok(out_path) => {
                    debug!(
                        src = %png_path.display(),
                        dst = %out_path.display(),
                        "page encoded"
                    );
                    summary.files_encoded += 1;
                }
                Err(e) => {
                    let err = PageError::EncodeFailed {
                        path: png_path.clone(),
                        detail: e.to_string(),
                    };
                    warn!("{err}");
                    summary.files_failed += 1;
                    if let Some(ref cb) = config.progress {
                        cb.on_item_failed(
                            Stage::Encode,
                            &png_path.display().to_string(),
                            &err.to_string(),
                        );
                    }
                }
            }
        }

        // The raster directory is usually empty now; drop it so the images
        // tree shrinks as the run progresses.
        remove_dir_if_empty(doc_dir).await;

        if let Some(ref cb) = config.progress {
            cb.on_item_done(Stage::Encode, i + 1, doc_dirs.len());
        }
    }

    info!(
        documents = summary.documents,
        encoded = summary.files_encoded,
        failed = summary.files_failed,
        "encoding complete"
    );
    if let Some(ref cb) = config.progress {
        cb.on_stage_complete(Stage::Encode, summary.files_encoded, summary.files_failed);
    }

    Ok(summary)
}

/// Encode one raster file and delete it on success. Returns the output path.
async fn encode_file(png_path: &Path, out_dir: &Path) -> Result<PathBuf, std::io::Error> {
    let bytes = tokio::fs::read(png_path).await?;
    let encoded = STANDARD.encode(&bytes);

    let stem = png_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let out_path = out_dir.join(format!("{stem}.{ENCODED_EXT}"));

    tokio::fs::write(&out_path, encoded).await?;

    // Source delete only after the output write succeeded.
    if let Err(e) = tokio::fs::remove_file(png_path).await {
        warn!("encoded but could not delete '{}': {e}", png_path.display());
    }

    Ok(out_path)
}

async fn remove_dir_if_empty(dir: &Path) {
    let empty = matches!(std::fs::read_dir(dir).map(|mut it| it.next().is_none()), Ok(true));
    if empty {
        let _ = tokio::fs::remove_dir(dir).await;
    }
}

/// Immediate subdirectories of `dir`, sorted by name.
fn list_subdirs(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::ReadDirFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// PNG files of one document directory, in filename order.
fn list_page_images(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
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
                    .map(|ext| ext.eq_ignore_ascii_case("png"))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encode_file_round_trips_and_deletes_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("p0001.png");
        let payload: Vec<u8> = (0u8..=255).cycle().take(1024).collect();
        std::fs::write(&src, &payload).unwrap();

        let out_path = encode_file(&src, dir.path()).await.unwrap();

        assert_eq!(out_path.file_name().unwrap(), "p0001.b64");
        assert!(!src.exists(), "source must be deleted after a good encode");

        let b64 = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(STANDARD.decode(b64.trim()).unwrap(), payload);
    }

    #[tokio::test]
    async fn encode_file_keeps_source_on_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("p0001.png");

        assert!(encode_file(&missing, dir.path()).await.is_err());
        assert!(!dir.path().join("p0001.b64").exists());
    }

    #[test]
    fn page_images_come_back_in_filename_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["p0010.png", "p0002.png", "p0001.png", "skip.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let names: Vec<String> = list_page_images(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["p0001.png", "p0002.png", "p0010.png"]);
    }
}
