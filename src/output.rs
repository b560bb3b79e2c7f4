//! Result types handed to callers: the nutrient table, its diagnostics, and
//! per-file batch results.

use crate::error::FileError;
use crate::model::{LabelRow, Token};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The fixed set of nutrients the pipeline reports.
///
/// Downstream consumers enumerate [`NutrientKey::ALL`] independently of
/// which keys a given label produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NutrientKey {
    EnergyKj,
    EnergyKcal,
    ProteinG,
    CarbsG,
    FatG,
    SugarsG,
    FibreG,
    SodiumMg,
}

impl NutrientKey {
    pub const ALL: [NutrientKey; 8] = [
        NutrientKey::EnergyKj,
        NutrientKey::EnergyKcal,
        NutrientKey::ProteinG,
        NutrientKey::CarbsG,
        NutrientKey::FatG,
        NutrientKey::SugarsG,
        NutrientKey::FibreG,
        NutrientKey::SodiumMg,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NutrientKey::EnergyKj => "energy_kj",
            NutrientKey::EnergyKcal => "energy_kcal",
            NutrientKey::ProteinG => "protein_g",
            NutrientKey::CarbsG => "carbs_g",
            NutrientKey::FatG => "fat_g",
            NutrientKey::SugarsG => "sugars_g",
            NutrientKey::FibreG => "fibre_g",
            NutrientKey::SodiumMg => "sodium_mg",
        }
    }

    /// The unit every record of this key is expressed in.
    pub fn unit(self) -> &'static str {
        match self {
            NutrientKey::EnergyKj => "kJ",
            NutrientKey::EnergyKcal => "kcal",
            NutrientKey::SodiumMg => "mg",
            _ => "g",
        }
    }
}

impl fmt::Display for NutrientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trust tier attached to every reported value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Med,
    High,
}

/// Which extraction path produced a record, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NutrientSource {
    /// Geometric per-serve / per-100g column table.
    Columns,
    /// Same-line label rows.
    Rows,
    /// Declarative line-rule parser.
    LineRules,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientRecord {
    pub value: f64,
    pub unit: String,
    pub confidence: Confidence,
    pub source: NutrientSource,
}

/// Presentation basis of the reported values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    #[default]
    PerServe,
    Per100g,
}

/// A measured quantity with its unit (`"g"`, `"ml"` or `""`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

/// Serving information read from the label text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServingMeta {
    pub serving_size: Option<Quantity>,
    pub servings_per_pack: Option<f64>,
}

/// The terminal artefact: one nutrient table on one basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelData {
    pub basis: Basis,
    /// Resolved serving size; `value == 1` is the "not detected" sentinel.
    pub serving_size: Quantity,
    pub nutrients: BTreeMap<NutrientKey, NutrientRecord>,
}

impl LabelData {
    /// Whether the serving size is a real reading rather than the sentinel.
    pub fn serving_detected(&self, min_serving_size: f64) -> bool {
        self.serving_size.value >= min_serving_size
    }
}

/// Why a line was excluded from extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseReason {
    DailyValue,
    Header,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedLine {
    pub text: String,
    pub reason: NoiseReason,
}

/// Diagnostics; never needed for correctness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub tokens: Vec<Token>,
    pub dropped_lines: Vec<DroppedLine>,
    /// Ascending x-centers (normalised 0–1) of numeric value clusters.
    pub column_clusters: Vec<f64>,
    pub dual_column: bool,
    /// Candidates found before the percent-drop policy.
    pub raw_candidates: usize,
    pub percent_dropped: usize,
}

/// Everything one extraction run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Surviving (non-noise) lines in reading order.
    pub lines: Vec<String>,
    pub rows: Vec<LabelRow>,
    pub serving: ServingMeta,
    pub label: LabelData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

impl ExtractionOutput {
    /// `true` when no nutrient survived extraction.
    pub fn is_empty(&self) -> bool {
        self.label.nutrients.is_empty()
    }

    pub fn nutrient(&self, key: NutrientKey) -> Option<&NutrientRecord> {
        self.label.nutrients.get(&key)
    }
}

/// Outcome of one file in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ExtractionOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FileError>,
    pub duration_ms: u64,
}

/// Aggregate numbers for a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_files: usize,
    pub extracted_files: usize,
    pub failed_files: usize,
    /// Files that parsed but yielded no nutrient at all.
    pub empty_files: usize,
    pub total_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nutrient_keys_serialise_snake_case() {
        let json = serde_json::to_string(&NutrientKey::EnergyKj).unwrap();
        assert_eq!(json, "\"energy_kj\"");
        for key in NutrientKey::ALL {
            assert_eq!(serde_json::to_string(&key).unwrap(), format!("\"{key}\""));
        }
    }

    #[test]
    fn confidence_orders_low_to_high() {
        assert!(Confidence::Low < Confidence::Med);
        assert!(Confidence::Med < Confidence::High);
    }

    #[test]
    fn key_units() {
        assert_eq!(NutrientKey::EnergyKj.unit(), "kJ");
        assert_eq!(NutrientKey::SodiumMg.unit(), "mg");
        assert_eq!(NutrientKey::FibreG.unit(), "g");
    }
}
