//! Extraction entry points.
//!
//! [`extract`] is the core: a pure function from one parsed payload and a
//! config to one [`ExtractionOutput`]. Everything else here is plumbing
//! around it: JSON text, files on disk, batches of files, and writing the
//! result back out. Use [`crate::stream::extract_stream`] instead of
//! [`extract_files`] when results should be consumed as they finish.

use crate::config::ExtractionConfig;
use crate::error::{FileError, NutrilabelError};
use crate::model::Line;
use crate::ocr::OcrPayload;
use crate::output::{
    BatchStats, DebugInfo, DroppedLine, ExtractionOutput, FileResult, LabelData,
};
use crate::pipeline::{
    candidates, columns, label, lines, noise, nutrients, rows, rules, serving, text,
};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run the full pipeline on one payload.
///
/// Never fails on content: a payload with no recognisable nutrients yields
/// an empty table. The only error is a payload that violates its own shape
/// (see [`OcrPayload::validate`]).
pub fn extract(
    payload: OcrPayload,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, NutrilabelError> {
    // ── Step 1: Normalise tokens ─────────────────────────────────────────
    let document = payload.into_document(config)?;

    // ── Step 2: Reconstruct lines ────────────────────────────────────────
    let all_lines = lines::reconstruct(&document.tokens, &document.full_text, config);
    let raw_texts: Vec<&str> = all_lines.iter().map(|l| l.text.as_str()).collect();

    // ── Step 3: Drop noise lines ─────────────────────────────────────────
    let mut kept: Vec<Line> = Vec::with_capacity(all_lines.len());
    let mut dropped: Vec<DroppedLine> = Vec::new();
    for line in &all_lines {
        match noise::classify(&text::normalize_line(&line.text)) {
            Some(reason) => dropped.push(DroppedLine {
                text: line.text.clone(),
                reason,
            }),
            None => kept.push(line.clone()),
        }
    }
    debug!(
        "{} lines kept, {} dropped as noise",
        kept.len(),
        dropped.len()
    );

    // ── Step 4: Candidates, labels, rows ─────────────────────────────────
    let scan = candidates::extract(&kept);
    let labeled = label::attach(&scan.candidates, &kept);
    let label_rows = rows::group(&labeled);

    // ── Step 5: Serving metadata ─────────────────────────────────────────
    let serving = serving::resolve(raw_texts.iter().copied());
    let serving_size = nutrients::resolve_serving_size(serving.serving_size.as_ref(), config);

    // ── Step 6: Columns (dual layout only) ───────────────────────────────
    let dual_column = columns::is_dual_column(raw_texts.iter().copied());
    let layout = if dual_column {
        columns::classify(&kept, config)
    } else {
        columns::ColumnLayout::default()
    };
    let resolution = nutrients::resolve_columns(
        &nutrients::collect_columns(&layout.rows),
        serving_size.value,
        config,
    );
    let basis = if dual_column && !resolution.readings.is_empty() {
        resolution.basis
    } else {
        nutrients::single_column_basis(raw_texts.iter().copied())
    };

    // ── Step 7: Merge sources ────────────────────────────────────────────
    let kept_texts: Vec<&str> = kept.iter().map(|l| l.text.as_str()).collect();
    let sources = nutrients::Sources {
        columns: resolution.readings,
        rows: nutrients::map_rows(&label_rows),
        line_rules: rules::parse(&kept_texts),
        rejected: resolution.rejected,
    };
    let nutrient_map = nutrients::merge(&sources, basis);

    info!(
        "Extracted {} nutrients from {} lines ({} rows, basis {:?})",
        nutrient_map.len(),
        kept.len(),
        label_rows.len(),
        basis
    );

    let debug_info = config.include_debug.then(|| DebugInfo {
        tokens: document.tokens.clone(),
        dropped_lines: dropped,
        column_clusters: layout.clusters.clone(),
        dual_column,
        raw_candidates: scan.raw_count,
        percent_dropped: scan.percent_dropped,
    });

    Ok(ExtractionOutput {
        lines: kept_texts.iter().map(|s| s.to_string()).collect(),
        rows: label_rows,
        serving,
        label: LabelData {
            basis,
            serving_size,
            nutrients: nutrient_map,
        },
        debug: debug_info,
    })
}

/// Parse a JSON payload and extract.
pub fn extract_json(
    json: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, NutrilabelError> {
    extract(OcrPayload::from_json(json)?, config)
}

/// Read a payload file and extract.
///
/// # Errors
/// - [`NutrilabelError::FileNotFound`] / [`NutrilabelError::ReadFailed`]
/// - [`NutrilabelError::MalformedPayload`] when the file is not a payload
pub async fn extract_file(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, NutrilabelError> {
    let path = path.as_ref();
    info!("Extracting: {}", path.display());
    let json = read_payload(path).await?;
    extract_json(&json, config)
}

/// Synchronous wrapper around [`extract_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_file_sync(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, NutrilabelError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| NutrilabelError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_file(path, config))
}

/// Extract a payload and write the output as pretty JSON.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn extract_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, NutrilabelError> {
    let output = extract_file(input, config).await?;
    write_json_atomic(output_path.as_ref(), &output).await?;
    Ok(output)
}

/// Extract many files concurrently.
///
/// Individual failures are recorded per file and never abort the batch.
/// Results come back in input order.
pub async fn extract_files<P: AsRef<Path>>(
    paths: &[P],
    config: &ExtractionConfig,
) -> (Vec<FileResult>, BatchStats) {
    let batch_start = Instant::now();
    let total_files = paths.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total_files);
    }

    let mut indexed: Vec<(usize, FileResult)> = stream::iter(paths.iter().enumerate().map(
        |(idx, path)| {
            let path = path.as_ref().to_path_buf();
            async move { (idx, run_one(&path, config).await) }
        },
    ))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;
    indexed.sort_by_key(|(idx, _)| *idx);
    let results: Vec<FileResult> = indexed.into_iter().map(|(_, r)| r).collect();

    let stats = batch_stats(&results, batch_start.elapsed().as_millis() as u64);
    info!(
        "Batch complete: {}/{} files extracted, {} failed, {}ms",
        stats.extracted_files, stats.total_files, stats.failed_files, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total_files, stats.extracted_files);
    }
    (results, stats)
}

// ── Internal helpers ─────────────────────────────────────────────────────

pub(crate) async fn read_payload(path: &Path) -> Result<String, NutrilabelError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            NutrilabelError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            NutrilabelError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}

/// Extract one file of a batch, reporting progress and never failing.
pub(crate) async fn run_one(path: &Path, config: &ExtractionConfig) -> FileResult {
    let start = Instant::now();
    let name = path.display().to_string();
    if let Some(ref cb) = config.progress_callback {
        cb.on_file_start(&name);
    }

    let result = extract_file(path, config).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(output) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_file_complete(&name, output.label.nutrients.len());
            }
            FileResult {
                path: name,
                output: Some(output),
                error: None,
                duration_ms,
            }
        }
        Err(e) => {
            warn!("Failed to extract {}: {}", name, e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_file_error(&name, &e.to_string());
            }
            FileResult {
                error: Some(FileError::from_fatal(&name, &e)),
                path: name,
                output: None,
                duration_ms,
            }
        }
    }
}

fn batch_stats(results: &[FileResult], total_duration_ms: u64) -> BatchStats {
    let extracted: Vec<&FileResult> = results.iter().filter(|r| r.output.is_some()).collect();
    BatchStats {
        total_files: results.len(),
        extracted_files: extracted.len(),
        failed_files: results.len() - extracted.len(),
        empty_files: extracted
            .iter()
            .filter(|r| r.output.as_ref().is_some_and(ExtractionOutput::is_empty))
            .count(),
        total_duration_ms,
    }
}

async fn write_json_atomic(
    path: &Path,
    output: &ExtractionOutput,
) -> Result<(), NutrilabelError> {
    let write_err = |e: std::io::Error| NutrilabelError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| NutrilabelError::Internal(format!("serialise output: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Basis, Confidence, NutrientKey};

    fn flat(words: &[(&str, f64, f64)]) -> OcrPayload {
        let items = words
            .iter()
            .map(|(text, x, y)| crate::ocr::FlatItem {
                text: text.to_string(),
                bounding_box: vec![
                    crate::ocr::Vertex { x: Some(*x), y: Some(*y) },
                    crate::ocr::Vertex { x: Some(x + 50.0), y: Some(y + 12.0) },
                ],
            })
            .collect();
        OcrPayload::Flat(crate::ocr::FlatPayload {
            full_text: String::new(),
            items,
        })
    }

    #[test]
    fn us_label_rows_and_nutrients() {
        let payload = flat(&[
            ("Total", 0.0, 0.0),
            ("Fat", 60.0, 0.0),
            ("3g", 200.0, 0.0),
            ("Sodium", 0.0, 30.0),
            ("300mg", 200.0, 30.0),
            ("Calories", 0.0, 60.0),
            ("90", 200.0, 60.0),
        ]);
        let out = extract(payload, &ExtractionConfig::default()).unwrap();
        assert_eq!(out.lines, vec!["Total Fat 3g", "Sodium 300mg", "Calories 90"]);
        assert_eq!(out.rows.len(), 3);
        assert_eq!(out.label.basis, Basis::PerServe);
        assert_eq!(out.nutrient(NutrientKey::FatG).unwrap().value, 3.0);
        assert_eq!(out.nutrient(NutrientKey::SodiumMg).unwrap().confidence, Confidence::High);
        assert_eq!(out.nutrient(NutrientKey::EnergyKcal).unwrap().confidence, Confidence::Med);
        assert_eq!(out.label.serving_size.value, 1.0);
        assert!(out.debug.is_none());
    }

    #[test]
    fn debug_info_on_request() {
        let payload = flat(&[("%", 0.0, 0.0), ("Daily", 60.0, 0.0), ("Value", 120.0, 0.0)]);
        let config = ExtractionConfig::builder().include_debug(true).build().unwrap();
        let out = extract(payload, &config).unwrap();
        assert!(out.lines.is_empty());
        let debug = out.debug.unwrap();
        assert_eq!(debug.dropped_lines.len(), 1);
        assert_eq!(debug.tokens.len(), 3);
        assert!(!debug.dual_column);
    }

    #[test]
    fn empty_payload_is_empty_result() {
        let out = extract_json(r#"{"fullText": "", "items": []}"#, &ExtractionConfig::default())
            .unwrap();
        assert!(out.is_empty());
        assert!(out.rows.is_empty());
    }

    #[test]
    fn batch_stats_count_outcomes() {
        let ok = FileResult {
            path: "a".into(),
            output: Some(extract_json(r#"{"items": []}"#, &ExtractionConfig::default()).unwrap()),
            error: None,
            duration_ms: 1,
        };
        let failed = FileResult {
            path: "b".into(),
            output: None,
            error: Some(FileError::Rejected {
                path: "b".into(),
                detail: "x".into(),
            }),
            duration_ms: 1,
        };
        let stats = batch_stats(&[ok, failed], 5);
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.extracted_files, 1);
        assert_eq!(stats.failed_files, 1);
        assert_eq!(stats.empty_files, 1);
    }

    #[tokio::test]
    async fn unreadable_file_is_logged_and_reported() {
        let result = run_one(Path::new("/nonexistent/label.json"), &ExtractionConfig::default()).await;
        assert_eq!(result.path, "/nonexistent/label.json");
        assert!(result.output.is_none());
        assert!(matches!(result.error, Some(FileError::Unreadable { .. })));
    }
}
