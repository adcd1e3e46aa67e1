//! Progress-callback trait for stage-level events.
//!
//! Inject an [`Arc<dyn PipelineProgress>`] via
//! [`crate::config::PipelineConfigBuilder::progress`] to receive events as
//! the stages work through a corpus.
//!
//! # Why callbacks instead of channels?
//!
//! A callback is the least-invasive integration point: callers can forward
//! events to a terminal progress bar, a log aggregator, or a job tracker
//! without the library knowing how the host application communicates. The
//! trait is `Send + Sync` because the dispatcher completes pages
//! concurrently from the worker pool.

use std::sync::Arc;

/// The pipeline stage an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Rasterize,
    Encode,
    Batch,
    Dispatch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Rasterize => "rasterize",
            Stage::Encode => "encode",
            Stage::Batch => "batch",
            Stage::Dispatch => "dispatch",
        }
    }
}

/// Called by the pipeline stages as they process items.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// During dispatch, `on_item_done` and `on_item_failed` may be called
/// concurrently from different tasks. Implementations must protect shared
/// mutable state (e.g. `AtomicUsize`, `Mutex`).
pub trait PipelineProgress: Send + Sync {
    /// Called once when a stage starts, with the number of items
    /// (documents for rasterize/encode, pages for batch/dispatch) it will
    /// attempt.
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let _ = (stage, total);
    }

    /// Called when one item completes successfully.
    fn on_item_done(&self, stage: Stage, done: usize, total: usize) {
        let _ = (stage, done, total);
    }

    /// Called when one item fails and is skipped.
    fn on_item_failed(&self, stage: Stage, label: &str, error: &str) {
        let _ = (stage, label, error);
    }

    /// Called once when a stage finishes.
    fn on_stage_complete(&self, stage: Stage, succeeded: usize, failed: usize) {
        let _ = (stage, succeeded, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl PipelineProgress for NoopProgress {}

/// Convenience alias matching the type stored in
/// [`crate::config::PipelineConfig`].
pub type ProgressHandle = Arc<dyn PipelineProgress>;
