//! Pipeline stages for corpus OCR.
//!
//! Each submodule implements exactly one transformation step over the
//! on-disk corpus. Keeping stages separate makes each independently
//! resumable and testable, and matches how they are run operationally
//! (batch hosts often run rasterize/encode on CPU nodes and dispatch on
//! GPU-adjacent nodes, hours apart).
//!
//! ## Data Flow
//!
//! ```text
//! documents/ ──▶ rasterize ──▶ images/<doc>/pNNNN.png
//!                                 │
//!                              encode (deletes PNGs)
//!                                 │
//!                              encoded/<doc>/pNNNN.b64
//!                               ┌──┴────────────┐
//!                             batch          dispatch
//!                               │               │
//!                  batches/batch_NNNN.jsonl  results/<doc>.json
//! ```
//!
//! 1. [`rasterize`] — one PNG per page via pdfium, resume-by-existence;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 2. [`encode`]    — PNG → base64 text files, reclaiming raster space
//! 3. [`batch`]     — flatten the encoded corpus into fixed-size JSONL
//!    manifests for bulk submission
//! 4. [`dispatch`]  — concurrent inference over the encoded corpus,
//!    aggregated into ordered per-document JSON results
//!
//! `batch` and `dispatch` read the same encoded corpus but serve different
//! consumers; neither depends on the other.

pub mod batch;
pub mod dispatch;
pub mod encode;
pub mod rasterize;
