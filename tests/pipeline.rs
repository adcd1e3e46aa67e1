//! Integration tests for the pipeline stages over real temp directories.
//!
//! The inference engine is mocked at the `OcrEngine` seam, so every test
//! here is hermetic: no pdfium rendering, no network, no API keys.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ocrpipe::{
    build_batches, dispatch_corpus, encode_corpus, rasterize_corpus, BatchRecord, DocumentResult,
    EngineError, OcrEngine, PipelineConfig, PipelineError,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Echoes the decoded payload back as "ocr::<payload>"; payloads containing
/// `FAIL` produce a synthetic engine error.
struct EchoEngine;

#[async_trait]
impl OcrEngine for EchoEngine {
    async fn extract_text(&self, image: &[u8]) -> Result<String, EngineError> {
        let text = String::from_utf8_lossy(image);
        if text.contains("FAIL") {
            return Err(EngineError::Api("synthetic engine failure".into()));
        }
        Ok(format!("ocr::{text}"))
    }
}

/// Tracks how many extractions run at once.
struct GaugeEngine {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl OcrEngine for GaugeEngine {
    async fn extract_text(&self, _image: &[u8]) -> Result<String, EngineError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok("page".into())
    }
}

/// Write `payload` base64-encoded as `<dir>/<name>.b64`.
fn write_encoded(dir: &Path, name: &str, payload: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(format!("{name}.b64")),
        STANDARD.encode(payload.as_bytes()),
    )
    .unwrap();
}

fn read_result(path: &Path) -> DocumentResult {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn config() -> PipelineConfig {
    PipelineConfig::builder().workers(2).build().unwrap()
}

// ── BatchBuilder ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn small_corpus_fits_one_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let encoded = tmp.path().join("encoded");
    let batches = tmp.path().join("batches");

    // 3 documents with 2, 3, 1 pages; capacity 100.
    for (doc, pages) in [("alpha", 2), ("beta", 3), ("gamma", 1)] {
        for idx in 1..=pages {
            write_encoded(&encoded.join(doc), &format!("p{idx:04}"), "img");
        }
    }

    let summary = build_batches(&encoded, &batches, &config()).await.unwrap();
    assert_eq!(summary.manifests, 1);
    assert_eq!(summary.pages, 6);

    let manifest = batches.join("batch_0001.jsonl");
    assert!(manifest.exists());
    let records: Vec<BatchRecord> = std::fs::read_to_string(&manifest)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 6);

    // Every page exactly once.
    let mut seen: Vec<(String, usize)> = records
        .iter()
        .map(|r| (r.pdf_id.as_str().to_string(), r.page_idx))
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 6);

    // Pages of one document are contiguous and in ascending page order.
    for doc in ["alpha", "beta", "gamma"] {
        let indices: Vec<usize> = records
            .iter()
            .filter(|r| r.pdf_id.as_str() == doc)
            .map(|r| r.page_idx)
            .collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(indices, sorted, "pages of {doc} out of order");
        let first = records
            .iter()
            .position(|r| r.pdf_id.as_str() == doc)
            .unwrap();
        assert!(
            records[first..first + indices.len()]
                .iter()
                .all(|r| r.pdf_id.as_str() == doc),
            "pages of {doc} not contiguous"
        );
    }
}

#[tokio::test]
async fn manifest_count_is_ceil_of_pages_over_capacity() {
    let tmp = tempfile::tempdir().unwrap();
    let encoded = tmp.path().join("encoded");
    let batches = tmp.path().join("batches");

    for idx in 1..=5 {
        write_encoded(&encoded.join("doc"), &format!("p{idx:04}"), "img");
    }

    let config = PipelineConfig::builder()
        .pages_per_batch(2)
        .build()
        .unwrap();
    let summary = build_batches(&encoded, &batches, &config).await.unwrap();
    assert_eq!(summary.manifests, 3); // ceil(5/2)

    let sizes: Vec<usize> = (1..=3)
        .map(|n| {
            std::fs::read_to_string(batches.join(format!("batch_{n:04}.jsonl")))
                .unwrap()
                .lines()
                .count()
        })
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert!(!batches.join("batch_0004.jsonl").exists());
}

// ── Encoder ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn encoding_round_trips_and_reclaims_rasters() {
    let tmp = tempfile::tempdir().unwrap();
    let images = tmp.path().join("images");
    let encoded = tmp.path().join("encoded");

    let doc_dir = images.join("report");
    std::fs::create_dir_all(&doc_dir).unwrap();
    let payload: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
    std::fs::write(doc_dir.join("p0001.png"), &payload).unwrap();

    let summary = encode_corpus(&images, &encoded, &config()).await.unwrap();
    assert_eq!(summary.files_encoded, 1);
    assert_eq!(summary.files_failed, 0);

    // Round-trip law: decoding the output reproduces the input exactly.
    let b64 = std::fs::read_to_string(encoded.join("report/p0001.b64")).unwrap();
    assert_eq!(STANDARD.decode(b64.trim()).unwrap(), payload);

    // The raster is gone, and so is its emptied directory.
    assert!(!doc_dir.join("p0001.png").exists());
    assert!(!doc_dir.exists());
}

// ── Dispatcher/Aggregator ────────────────────────────────────────────────────

#[tokio::test]
async fn dispatch_writes_ordered_results_per_document() {
    let tmp = tempfile::tempdir().unwrap();
    let encoded = tmp.path().join("encoded");
    let results = tmp.path().join("results");

    write_encoded(&encoded, "docA_0001", "first page");
    write_encoded(&encoded, "docA_0002", "second page");
    write_encoded(&encoded, "docB_0001", "other doc");

    let summary = dispatch_corpus(&encoded, &results, Arc::new(EchoEngine), &config())
        .await
        .unwrap();
    assert_eq!(summary.total_pages, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.documents_written, 2);

    let doc_a = read_result(&results.join("docA.json"));
    assert_eq!(doc_a.pdf_id, "docA");
    assert_eq!(doc_a.pages.len(), 2);
    assert_eq!(doc_a.pages[0].page, "0001");
    assert_eq!(doc_a.pages[0].ocr_text, "ocr::first page");
    assert_eq!(doc_a.pages[1].page, "0002");

    let doc_b = read_result(&results.join("docB.json"));
    assert_eq!(doc_b.pages.len(), 1);
}

#[tokio::test]
async fn failed_page_is_omitted_without_placeholder() {
    let tmp = tempfile::tempdir().unwrap();
    let encoded = tmp.path().join("encoded");
    let results = tmp.path().join("results");

    write_encoded(&encoded, "docA_0001", "fine");
    write_encoded(&encoded, "docA_0002", "FAIL here");
    write_encoded(&encoded, "docA_0003", "also fine");

    let summary = dispatch_corpus(&encoded, &results, Arc::new(EchoEngine), &config())
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    // The failure is representable in the summary…
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].0.ends_with("docA_0002.b64"));

    // …but the document JSON is best-effort: N−1 entries, no placeholder.
    let doc = read_result(&results.join("docA.json"));
    assert_eq!(doc.pages.len(), 2);
    assert!(doc.pages.iter().all(|p| p.page != "0002"));
}

#[tokio::test]
async fn page_order_is_string_sorted_not_numeric() {
    let tmp = tempfile::tempdir().unwrap();
    let encoded = tmp.path().join("encoded");
    let results = tmp.path().join("results");

    for name in ["doc_2", "doc_10", "doc_1"] {
        write_encoded(&encoded, name, name);
    }

    dispatch_corpus(&encoded, &results, Arc::new(EchoEngine), &config())
        .await
        .unwrap();

    let doc = read_result(&results.join("doc.json"));
    let order: Vec<&str> = doc.pages.iter().map(|p| p.page.as_str()).collect();
    assert_eq!(order, vec!["1", "10", "2"]);
}

#[tokio::test]
async fn grouping_splits_only_on_the_last_separator() {
    let tmp = tempfile::tempdir().unwrap();
    let encoded = tmp.path().join("encoded");
    let results = tmp.path().join("results");

    write_encoded(&encoded, "doc_A_12", "page");
    write_encoded(&encoded, "solo", "single page, no separator");

    dispatch_corpus(&encoded, &results, Arc::new(EchoEngine), &config())
        .await
        .unwrap();

    let doc_a = read_result(&results.join("doc_A.json"));
    assert_eq!(doc_a.pdf_id, "doc_A");
    assert_eq!(doc_a.pages[0].page, "12");

    let solo = read_result(&results.join("solo.json"));
    assert_eq!(solo.pages[0].page, "1");
}

#[tokio::test]
async fn discovery_recurses_and_ignores_directory_layout() {
    let tmp = tempfile::tempdir().unwrap();
    let encoded = tmp.path().join("encoded");
    let results = tmp.path().join("results");

    write_encoded(&encoded.join("shard-1"), "docA_0001", "a");
    write_encoded(&encoded.join("shard-2/deep"), "docA_0002", "b");

    let summary = dispatch_corpus(&encoded, &results, Arc::new(EchoEngine), &config())
        .await
        .unwrap();
    assert_eq!(summary.total_pages, 2);

    // Both shards land in one document, grouped by file name alone.
    let doc = read_result(&results.join("docA.json"));
    assert_eq!(doc.pages.len(), 2);
}

#[tokio::test]
async fn worker_pool_bounds_concurrent_engine_calls() {
    let tmp = tempfile::tempdir().unwrap();
    let encoded = tmp.path().join("encoded");
    let results = tmp.path().join("results");

    for idx in 1..=8 {
        write_encoded(&encoded, &format!("doc_{idx:04}"), "page");
    }

    let engine = Arc::new(GaugeEngine {
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let config = PipelineConfig::builder().workers(2).build().unwrap();

    let summary = dispatch_corpus(&encoded, &results, engine.clone(), &config)
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 8);

    let peak = engine.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 2, "worker pool exceeded its bound: {peak}");
    assert!(peak >= 1);
}

// ── Rasterizer (corpus-level behaviour without pdfium) ───────────────────────

#[tokio::test]
async fn rasterize_missing_input_dir_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let err = rasterize_corpus(
        &tmp.path().join("nope"),
        &tmp.path().join("images"),
        &config(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::InputDirNotFound { .. }));
}

#[tokio::test]
async fn rasterize_empty_corpus_is_a_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let pdfs = tmp.path().join("pdfs");
    std::fs::create_dir_all(&pdfs).unwrap();

    let summary = rasterize_corpus(&pdfs, &tmp.path().join("images"), &config())
        .await
        .unwrap();
    assert_eq!(summary.documents, 0);
    assert_eq!(summary.pages_rendered, 0);
}
