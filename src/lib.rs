//! # nutrilabel
//!
//! Turn raw OCR output of a nutrition label into a structured nutrient table.
//!
//! ## Why this crate?
//!
//! OCR engines return words with bounding boxes in no useful order. A
//! nutrition panel is a table, but the OCR output knows nothing about rows,
//! columns, %DV footnotes or which number belongs to which label. This
//! crate rebuilds that structure from geometry alone, reconciles the
//! "per serving" and "per 100 g" columns against each other, and tags every
//! number with how much it can be trusted.
//!
//! ## Pipeline Overview
//!
//! ```text
//! OCR payload (flat or structured JSON)
//!  │
//!  ├─ 1. Tokens      validate + normalise boxes into one coordinate space
//!  ├─ 2. Lines       cluster tokens into reading-order lines
//!  ├─ 3. Noise       drop %DV tables, footnotes and column headers
//!  ├─ 4. Candidates  value + unit readings, percent readings dropped
//!  ├─ 5. Labels      label phrase left of each reading
//!  ├─ 6. Rows        one row per label with a deterministic primary
//!  ├─ 7. Columns     per-serve / per-100g bands on dual-column labels
//!  ├─ 8. Nutrients   cross-validate, merge sources, veto implausible values
//!  └─ 9. Serving     serving size and servings per pack
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nutrilabel::{extract_json, ExtractionConfig, NutrientKey};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let json = std::fs::read_to_string("label.json")?;
//!     let output = extract_json(&json, &ExtractionConfig::default())?;
//!     if let Some(protein) = output.nutrient(NutrientKey::ProteinG) {
//!         println!("protein: {} {} ({:?})", protein.value, protein.unit, protein.confidence);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `nutrilabel` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! nutrilabel = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{FileError, NutrilabelError};
pub use extract::{
    extract, extract_file, extract_file_sync, extract_files, extract_json, extract_to_file,
};
pub use model::{LabelRow, LabeledCandidate, Line, Token, ValueUnitCandidate};
pub use ocr::{OcrDocument, OcrPayload};
pub use output::{
    BatchStats, Basis, Confidence, DebugInfo, DroppedLine, ExtractionOutput, FileResult,
    LabelData, NoiseReason, NutrientKey, NutrientRecord, NutrientSource, Quantity, ServingMeta,
};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, FileStream};
