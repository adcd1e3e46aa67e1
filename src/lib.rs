//! # ocrpipe
//!
//! Convert directories of PDF documents into per-page extracted text with a
//! vision language model, through a staged, resumable pipeline.
//!
//! ## Why staged files instead of one in-memory pass?
//!
//! OCR corpora are measured in thousands of pages and runs are measured in
//! hours. Persisting each stage to disk makes every stage independently
//! resumable (a crashed run re-renders nothing that finished), lets cheap
//! CPU work and expensive inference run on different machines at different
//! times, and leaves an auditable trail of exactly what was submitted.
//!
//! ## Pipeline Overview
//!
//! ```text
//! documents/*.pdf
//!  │
//!  ├─ 1. Rasterize  one PNG per page via pdfium (resume-by-existence)
//!  ├─ 2. Encode     PNG → base64 text file, raster deleted after success
//!  ├─ 3. Batch      flatten into fixed-size JSONL manifests (optional)
//!  └─ 4. Dispatch   bounded-concurrency inference, one JSON per document
//! ```
//!
//! Batch and Dispatch both read the encoded corpus and are independent of
//! each other: manifests feed bulk-submission systems, dispatch drives an
//! engine directly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocrpipe::{
//!     dispatch_corpus, encode_corpus, rasterize_corpus, EngineConfig, PipelineConfig,
//!     VisionLlmEngine,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!
//!     rasterize_corpus(Path::new("documents"), Path::new("images"), &config).await?;
//!     encode_corpus(Path::new("images"), Path::new("encoded"), &config).await?;
//!
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let engine = Arc::new(VisionLlmEngine::new(EngineConfig::default())?);
//!     let summary =
//!         dispatch_corpus(Path::new("encoded"), Path::new("results"), engine, &config).await?;
//!     eprintln!("{}/{} pages transcribed", summary.succeeded, summary.total_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Failure model
//!
//! Per-item failures (one bad PDF, one unreadable page, one engine error)
//! are logged, recorded in the stage summary, and never abort a run.
//! Structural I/O failures (cannot create a directory, cannot write a
//! manifest or result) are fatal. Nothing is retried automatically.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocrpipe` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod docid;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EngineConfig, PipelineConfig, PipelineConfigBuilder};
pub use docid::DocId;
pub use engine::{EngineError, OcrEngine, VisionLlmEngine};
pub use error::{PageError, PipelineError};
pub use output::{
    BatchSummary, DispatchSummary, DocumentResult, EncodeSummary, PageOutcome, PageRecord, PageRef,
    RasterizeSummary,
};
pub use pipeline::batch::{build_batches, BatchRecord};
pub use pipeline::dispatch::dispatch_corpus;
pub use pipeline::encode::{encode_corpus, ENCODED_EXT};
pub use pipeline::rasterize::{pending_pages, rasterize_corpus};
pub use progress::{NoopProgress, PipelineProgress, ProgressHandle, Stage};
