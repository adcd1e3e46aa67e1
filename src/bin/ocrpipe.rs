//! CLI binary for ocrpipe.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`/`EngineConfig` and prints stage summaries.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ocrpipe::{
    build_batches, dispatch_corpus, encode_corpus, rasterize_corpus, EngineConfig, OcrEngine,
    PipelineConfig, PipelineProgress, Stage, VisionLlmEngine,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Terminal progress callback using indicatif ───────────────────────────────

/// Renders one progress bar per stage and per-item failure lines.
/// Correct under out-of-order completion (dispatch workers).
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>5}/{len}  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgress for CliProgress {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        self.bar.reset();
        self.bar.set_length(total as u64);
        self.bar.set_prefix(stage.as_str().to_string());
    }

    fn on_item_done(&self, _stage: Stage, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
    }

    fn on_item_failed(&self, _stage: Stage, label: &str, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.len() > 100 {
            format!("{}\u{2026}", &error[..99])
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), label, red(&msg)));
        self.bar.inc(1);
    }

    fn on_stage_complete(&self, _stage: Stage, _succeeded: usize, _failed: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full preprocessing run: rasterize, encode, build manifests
  ocrpipe run ./pdfs --output-base ./out --dpi 200 --pages-per-batch 100

  # Individual stages (each is independently resumable/re-runnable)
  ocrpipe rasterize ./pdfs ./out/images --dpi 175
  ocrpipe encode ./out/images ./out/encoded
  ocrpipe batch ./out/encoded ./out/batches --pages-per-batch 50

  # Transcribe an encoded corpus with 8 concurrent engine calls
  ocrpipe dispatch --input-dir ./out/encoded --output-dir ./out/results \
      --workers 8 --provider openai --model gpt-4.1-nano

  # Custom extraction prompt and sampling
  ocrpipe dispatch --input-dir ./enc --output-dir ./res \
      --prompt-file prompt.txt --do-sample --temperature 0.3

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium

RESUMABILITY:
  Re-running `rasterize` skips every page whose PNG already exists — the
  output tree is the only progress state. `encode` deletes each PNG after
  a verified write, so a crashed encode run resumes where it stopped.
"#;

/// Batch OCR pipeline: rasterise PDF corpora and dispatch pages to a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "ocrpipe",
    version,
    about = "Resumable batch OCR pipeline for PDF corpora",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OCRPIPE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OCRPIPE_QUIET")]
    quiet: bool,

    /// Disable progress bars.
    #[arg(long, global = true, env = "OCRPIPE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rasterise every PDF in a directory to per-page PNGs.
    Rasterize {
        /// Directory containing PDF files.
        pdf_dir: PathBuf,
        /// Output directory (one subdirectory per document).
        images_dir: PathBuf,
        /// Rendering resolution in DPI (72–600).
        #[arg(long, env = "OCRPIPE_DPI", default_value_t = 200)]
        dpi: u32,
    },

    /// Base64-encode page images, deleting each PNG after a verified write.
    Encode {
        /// Directory of per-document image subdirectories.
        images_dir: PathBuf,
        /// Output directory (mirrored per-document layout).
        encoded_dir: PathBuf,
    },

    /// Partition the encoded corpus into fixed-size JSONL batch manifests.
    Batch {
        /// Directory of per-document encoded subdirectories.
        encoded_dir: PathBuf,
        /// Output directory for batch_NNNN.jsonl files.
        batches_dir: PathBuf,
        /// Records per manifest.
        #[arg(long, env = "OCRPIPE_PAGES_PER_BATCH", default_value_t = 100)]
        pages_per_batch: usize,
    },

    /// Transcribe an encoded corpus and write one JSON result per document.
    Dispatch {
        /// Directory containing .b64 files (searched recursively).
        #[arg(long)]
        input_dir: PathBuf,
        /// Directory to save per-document JSON results.
        #[arg(long)]
        output_dir: PathBuf,
        /// Number of concurrent inference calls.
        #[arg(long, env = "OCRPIPE_WORKERS", default_value_t = 4)]
        workers: usize,
        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Preprocessing driver: rasterize, encode, and build batches.
    Run {
        /// Directory containing PDF files.
        pdf_dir: PathBuf,
        /// Base output directory (images/, encoded/, batches/ are created
        /// beneath it).
        #[arg(long)]
        output_base: PathBuf,
        /// Rendering resolution in DPI (72–600).
        #[arg(long, env = "OCRPIPE_DPI", default_value_t = 200)]
        dpi: u32,
        /// Records per manifest.
        #[arg(long, env = "OCRPIPE_PAGES_PER_BATCH", default_value_t = 100)]
        pages_per_batch: usize,
        /// Skip the rasterization step (PNGs already exist).
        #[arg(long)]
        skip_rasterize: bool,
        /// Skip the encoding step (.b64 files already exist).
        #[arg(long)]
        skip_encode: bool,
        /// Skip batch-manifest creation.
        #[arg(long)]
        skip_batches: bool,
    },
}

/// Engine flags shared by transcription commands.
#[derive(Args, Debug)]
struct EngineArgs {
    /// Vision model ID (e.g. gpt-4.1-nano). Provider default if unset.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    /// Auto-detected from API-key env vars if not set.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Maximum tokens the model may generate per page.
    #[arg(long, default_value_t = 4096)]
    max_new_tokens: usize,

    /// Enable sampling (default is greedy decoding).
    #[arg(long)]
    do_sample: bool,

    /// Sampling temperature (used only with --do-sample).
    #[arg(long, default_value_t = 1.0)]
    temperature: f32,

    /// Nucleus-sampling threshold (used only with --do-sample).
    #[arg(long, default_value_t = 1.0)]
    top_p: f32,

    /// Repetition penalty (1.0 disables).
    #[arg(long, default_value_t = 1.0)]
    repetition_penalty: f32,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// System message sent before the extraction prompt.
    #[arg(long, default_value = "You are a helpful assistant.")]
    system_message: String,

    /// Keep `<|…|>` special-token markers in engine output.
    #[arg(long)]
    no_skip_special_tokens: bool,

    /// Keep stray spaces before punctuation in engine output.
    #[arg(long)]
    no_clean_spaces: bool,
}

impl EngineArgs {
    async fn into_config(self) -> Result<EngineConfig> {
        let prompt = if let Some(ref path) = self.prompt_file {
            Some(
                tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read prompt from {path:?}"))?,
            )
        } else {
            None
        };

        Ok(EngineConfig {
            model: self.model,
            provider_name: self.provider,
            max_new_tokens: self.max_new_tokens,
            do_sample: self.do_sample,
            temperature: self.temperature,
            top_p: self.top_p,
            repetition_penalty: self.repetition_penalty,
            prompt,
            system_message: self.system_message,
            skip_special_tokens: !self.no_skip_special_tokens,
            clean_up_spaces: !self.no_clean_spaces,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while a progress bar is active; the
    // bar provides the feedback that matters.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<Arc<dyn PipelineProgress>> = if show_progress {
        Some(CliProgress::new() as Arc<dyn PipelineProgress>)
    } else {
        None
    };
    let quiet = cli.quiet;

    match cli.command {
        Command::Rasterize {
            pdf_dir,
            images_dir,
            dpi,
        } => {
            let config = pipeline_config(dpi, 4, 100, progress)?;
            let summary = rasterize_corpus(&pdf_dir, &images_dir, &config)
                .await
                .context("Rasterization failed")?;
            if !quiet {
                eprintln!(
                    "{} {} pages rendered, {} skipped (already present), {} documents failed",
                    if summary.failed_documents == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    bold(&summary.pages_rendered.to_string()),
                    summary.pages_skipped,
                    summary.failed_documents,
                );
            }
        }

        Command::Encode {
            images_dir,
            encoded_dir,
        } => {
            let config = pipeline_config(200, 4, 100, progress)?;
            let summary = encode_corpus(&images_dir, &encoded_dir, &config)
                .await
                .context("Encoding failed")?;
            if !quiet {
                eprintln!(
                    "{} {} files encoded, {} failed (sources kept)",
                    if summary.files_failed == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    bold(&summary.files_encoded.to_string()),
                    summary.files_failed,
                );
            }
        }

        Command::Batch {
            encoded_dir,
            batches_dir,
            pages_per_batch,
        } => {
            let config = pipeline_config(200, 4, pages_per_batch, progress)?;
            let summary = build_batches(&encoded_dir, &batches_dir, &config)
                .await
                .context("Batch building failed")?;
            if !quiet {
                eprintln!(
                    "{} {} manifests from {} pages",
                    green("✔"),
                    bold(&summary.manifests.to_string()),
                    summary.pages,
                );
            }
        }

        Command::Dispatch {
            input_dir,
            output_dir,
            workers,
            engine,
        } => {
            let config = pipeline_config(200, workers, 100, progress)?;
            let engine_config = engine.into_config().await?;
            let engine: Arc<dyn OcrEngine> = Arc::new(
                VisionLlmEngine::new(engine_config).context("Failed to construct OCR engine")?,
            );

            let summary = dispatch_corpus(&input_dir, &output_dir, engine, &config)
                .await
                .context("Dispatch failed")?;

            if !quiet {
                eprintln!(
                    "{} {}/{} pages transcribed  →  {} result files in {}",
                    if summary.failed == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    bold(&summary.succeeded.to_string()),
                    summary.total_pages,
                    summary.documents_written,
                    bold(&output_dir.display().to_string()),
                );
                for (path, error) in &summary.failures {
                    eprintln!("  {} {}  {}", red("✗"), path.display(), dim(&error.to_string()));
                }
            }
        }

        Command::Run {
            pdf_dir,
            output_base,
            dpi,
            pages_per_batch,
            skip_rasterize,
            skip_encode,
            skip_batches,
        } => {
            let config = pipeline_config(dpi, 4, pages_per_batch, progress)?;
            let images_dir = output_base.join("images");
            let encoded_dir = output_base.join("encoded");
            let batches_dir = output_base.join("batches");

            if skip_rasterize {
                if !quiet {
                    eprintln!("{} rasterize skipped", dim("∅"));
                }
            } else {
                let summary = rasterize_corpus(&pdf_dir, &images_dir, &config)
                    .await
                    .context("Rasterization failed")?;
                if !quiet {
                    eprintln!(
                        "{} rasterize: {} rendered, {} skipped, {} documents failed",
                        green("✔"),
                        summary.pages_rendered,
                        summary.pages_skipped,
                        summary.failed_documents,
                    );
                }
            }

            if skip_encode {
                if !quiet {
                    eprintln!("{} encode skipped", dim("∅"));
                }
            } else {
                let summary = encode_corpus(&images_dir, &encoded_dir, &config)
                    .await
                    .context("Encoding failed")?;
                if !quiet {
                    eprintln!(
                        "{} encode: {} files, {} failed",
                        green("✔"),
                        summary.files_encoded,
                        summary.files_failed,
                    );
                }
            }

            if skip_batches {
                if !quiet {
                    eprintln!("{} batch skipped", dim("∅"));
                }
            } else {
                let summary = build_batches(&encoded_dir, &batches_dir, &config)
                    .await
                    .context("Batch building failed")?;
                if !quiet {
                    eprintln!(
                        "{} batch: {} manifests from {} pages",
                        green("✔"),
                        summary.manifests,
                        summary.pages,
                    );
                }
            }

            if !quiet {
                eprintln!(
                    "\n{}\n  encoded: {}\n  batches: {}",
                    bold("Preprocessing complete."),
                    encoded_dir.display(),
                    batches_dir.display(),
                );
            }
        }
    }

    Ok(())
}

/// Map CLI values to a validated `PipelineConfig`.
fn pipeline_config(
    dpi: u32,
    workers: usize,
    pages_per_batch: usize,
    progress: Option<Arc<dyn PipelineProgress>>,
) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .dpi(dpi)
        .workers(workers)
        .pages_per_batch(pages_per_batch);
    if let Some(cb) = progress {
        builder = builder.progress(cb);
    }
    builder.build().context("Invalid configuration")
}
