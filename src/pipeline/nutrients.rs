//! Nutrient mapping, cross-validation and source merging.
//!
//! Three sources can report a nutrient, in descending precedence:
//!
//! 1. [`NutrientSource::Columns`]: per-serve / per-100g bands of a dual-column
//!    label, cross-validated against each other.
//! 2. [`NutrientSource::Rows`]: the primary reading of each label row.
//! 3. [`NutrientSource::LineRules`]: the line-rule parser over plain text.
//!
//! [`merge`] is the single place where these meet. A higher source always
//! wins for a key; lower sources only fill gaps. Afterwards the plausibility
//! ceilings veto any value no real food label could carry.
//!
//! ## Cross-validation
//!
//! ```text
//! expected100 = per_serve / serving_size × 100
//! deviation   = |per100 − expected100| / expected100
//! ```
//!
//! A deviation above `reject_deviation` means the two columns disagree and
//! the nutrient is dropped from every source. Below `accept_deviation` the
//! column value is upgraded from Low to Med.

use crate::config::ExtractionConfig;
use crate::model::LabelRow;
use crate::output::{Basis, Confidence, NutrientKey, NutrientRecord, NutrientSource, Quantity};
use crate::pipeline::columns::{match_key, ColumnRow, NutrientKind};
use crate::pipeline::text::{canonical_unit, normalize_key, normalize_line, UNIT_ALTERNATION};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Value and confidence found by one source for one key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub confidence: Confidence,
}

pub type Readings = BTreeMap<NutrientKey, Reading>;

// ── Serving-size sentinel ────────────────────────────────────────────────────

/// Serving size used for the label; below `min_serving_size` (or missing) it
/// becomes the "not detected" sentinel `1`.
pub fn resolve_serving_size(detected: Option<&Quantity>, config: &ExtractionConfig) -> Quantity {
    match detected {
        Some(q) if q.value >= config.min_serving_size => q.clone(),
        Some(q) => Quantity {
            value: 1.0,
            unit: if q.unit.is_empty() { "g".to_string() } else { q.unit.clone() },
        },
        None => Quantity {
            value: 1.0,
            unit: "g".to_string(),
        },
    }
}

// ── Plausibility ceilings ────────────────────────────────────────────────────

/// Largest value a real label can print for `key` on `basis`.
pub fn ceiling(key: NutrientKey, basis: Basis) -> f64 {
    let (per_serve, per_100g) = match key {
        NutrientKey::EnergyKj => (5000.0, 3800.0),
        NutrientKey::EnergyKcal => (1200.0, 900.0),
        NutrientKey::ProteinG => (100.0, 100.0),
        NutrientKey::CarbsG => (150.0, 100.0),
        NutrientKey::FatG => (100.0, 100.0),
        NutrientKey::SugarsG => (150.0, 100.0),
        NutrientKey::FibreG => (60.0, 100.0),
        NutrientKey::SodiumMg => (5000.0, 40000.0),
    };
    match basis {
        Basis::PerServe => per_serve,
        Basis::Per100g => per_100g,
    }
}

// ── Cross-validation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accepted {
        confidence: Confidence,
        deviation: Option<f64>,
    },
    Rejected {
        deviation: f64,
    },
}

/// Check a per-serve reading against its per-100g partner.
pub fn cross_validate(
    per_serve: f64,
    per_100g: f64,
    serving_size: f64,
    config: &ExtractionConfig,
) -> Verdict {
    if serving_size < config.min_serving_size {
        return Verdict::Accepted {
            confidence: Confidence::Low,
            deviation: None,
        };
    }
    let expected = per_serve / serving_size * 100.0;
    if expected <= 0.0 {
        // Zero per serve only agrees with zero per 100 g.
        return if per_100g > 0.0 {
            Verdict::Rejected {
                deviation: f64::INFINITY,
            }
        } else {
            Verdict::Accepted {
                confidence: Confidence::Med,
                deviation: None,
            }
        };
    }
    let deviation = (per_100g - expected).abs() / expected;
    if deviation > config.reject_deviation {
        Verdict::Rejected { deviation }
    } else if deviation < config.accept_deviation {
        Verdict::Accepted {
            confidence: Confidence::Med,
            deviation: Some(deviation),
        }
    } else {
        Verdict::Accepted {
            confidence: Confidence::Low,
            deviation: Some(deviation),
        }
    }
}

// ── Column text parsing ──────────────────────────────────────────────────────

static RE_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)<?(\d+(?:\.\d+)?)\s*({UNIT_ALTERNATION})?")).unwrap()
});

fn values_in(text: &str) -> Vec<(f64, &'static str)> {
    let text = normalize_line(text);
    RE_VALUE
        .captures_iter(&text)
        .filter_map(|caps| {
            let value = caps[1].parse().ok()?;
            let unit = caps.get(2).and_then(|u| canonical_unit(u.as_str())).unwrap_or("");
            (unit != "%").then_some((value, unit))
        })
        .collect()
}

fn energy_hint(label: &str) -> NutrientKey {
    let l = label.to_lowercase();
    if l.contains("kj") {
        NutrientKey::EnergyKj
    } else if l.contains("cal") {
        NutrientKey::EnergyKcal
    } else {
        NutrientKey::EnergyKj
    }
}

fn energy_key(unit: &str, label: &str) -> Option<NutrientKey> {
    match unit {
        "kJ" => Some(NutrientKey::EnergyKj),
        "kcal" | "cal" => Some(NutrientKey::EnergyKcal),
        "" => Some(energy_hint(label)),
        _ => None,
    }
}

/// Convert a mass reading into the unit of `key`.
fn convert_mass(key: NutrientKey, value: f64, unit: &str) -> Option<f64> {
    let grams = match unit {
        "g" => value,
        "mg" => value / 1000.0,
        "mcg" => value / 1_000_000.0,
        "kg" => value * 1000.0,
        _ => return None,
    };
    Some(if key == NutrientKey::SodiumMg { grams * 1000.0 } else { grams })
}

fn kind_key(kind: NutrientKind) -> Option<NutrientKey> {
    match kind {
        NutrientKind::Energy => None,
        NutrientKind::Protein => Some(NutrientKey::ProteinG),
        NutrientKind::Fat => Some(NutrientKey::FatG),
        NutrientKind::Carbs => Some(NutrientKey::CarbsG),
        NutrientKind::Sugars => Some(NutrientKey::SugarsG),
        NutrientKind::Fibre => Some(NutrientKey::FibreG),
        NutrientKind::Sodium => Some(NutrientKey::SodiumMg),
    }
}

/// Parse one band of a column row into `(key, value)` pairs.
pub fn parse_column_text(kind: NutrientKind, label: &str, text: &str) -> Vec<(NutrientKey, f64)> {
    let values = values_in(text);
    match kind {
        NutrientKind::Energy => {
            let mut out: Vec<(NutrientKey, f64)> = Vec::new();
            for (value, unit) in values {
                let Some(key) = energy_key(unit, label) else { continue };
                if !out.iter().any(|(k, _)| *k == key) {
                    out.push((key, value));
                }
            }
            out
        }
        // A bare number is read in the key's own unit (fibre is often printed
        // without one).
        _ => {
            let Some(key) = kind_key(kind) else { return Vec::new() };
            values
                .first()
                .and_then(|&(v, u)| match u {
                    "" => Some(v),
                    _ => convert_mass(key, v, u),
                })
                .map(|v| vec![(key, v)])
                .unwrap_or_default()
        }
    }
}

/// Column readings per key, before cross-validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnPair {
    pub per_serve: Option<f64>,
    pub per_100g: Option<f64>,
}

/// First reading per key and band across all column rows.
pub fn collect_columns(rows: &[ColumnRow]) -> BTreeMap<NutrientKey, ColumnPair> {
    let mut pairs: BTreeMap<NutrientKey, ColumnPair> = BTreeMap::new();
    for row in rows {
        for (key, value) in parse_column_text(row.kind, &row.label, &row.serve_text) {
            pairs.entry(key).or_default().per_serve.get_or_insert(value);
        }
        for (key, value) in parse_column_text(row.kind, &row.label, &row.per100_text) {
            pairs.entry(key).or_default().per_100g.get_or_insert(value);
        }
    }
    pairs
}

/// Outcome of reconciling the two columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnResolution {
    pub basis: Basis,
    pub readings: Readings,
    /// Keys whose columns disagreed; no source may report them.
    pub rejected: BTreeSet<NutrientKey>,
}

/// Pick the basis and cross-validate every key.
///
/// `serving_size` is the resolved size (the sentinel when not detected).
pub fn resolve_columns(
    pairs: &BTreeMap<NutrientKey, ColumnPair>,
    serving_size: f64,
    config: &ExtractionConfig,
) -> ColumnResolution {
    let any_serve = pairs.values().any(|p| p.per_serve.is_some());
    let basis = if any_serve || pairs.is_empty() {
        Basis::PerServe
    } else {
        Basis::Per100g
    };
    let serving_known = serving_size >= config.min_serving_size;

    let mut resolution = ColumnResolution {
        basis,
        ..Default::default()
    };
    for (&key, pair) in pairs {
        let reading = match (basis, pair.per_serve, pair.per_100g) {
            (Basis::Per100g, _, Some(per100)) => Some(Reading {
                value: per100,
                confidence: Confidence::Low,
            }),
            (Basis::PerServe, Some(serve), Some(per100)) => {
                match cross_validate(serve, per100, serving_size, config) {
                    Verdict::Accepted { confidence, .. } => Some(Reading {
                        value: serve,
                        confidence,
                    }),
                    Verdict::Rejected { deviation } => {
                        debug!("{key}: columns disagree (deviation {deviation:.2}), rejected");
                        resolution.rejected.insert(key);
                        None
                    }
                }
            }
            (Basis::PerServe, Some(serve), None) => Some(Reading {
                value: serve,
                confidence: Confidence::Low,
            }),
            (Basis::PerServe, None, Some(per100)) if serving_known => Some(Reading {
                value: per100 * serving_size / 100.0,
                confidence: Confidence::Low,
            }),
            _ => None,
        };
        if let Some(reading) = reading {
            resolution.readings.insert(key, reading);
        }
    }
    resolution
}

// ── Row mapping ──────────────────────────────────────────────────────────────

/// Map label rows to nutrient readings; the first row per key wins.
pub fn map_rows(rows: &[LabelRow]) -> Readings {
    let mut readings = Readings::new();
    for row in rows {
        let c = &row.primary.candidate;
        let Some((key, value)) = row_reading(&row.key, c.value, &c.unit) else {
            continue;
        };
        let confidence = if c.unit.is_empty() {
            Confidence::Med
        } else {
            Confidence::High
        };
        readings.entry(key).or_insert(Reading { value, confidence });
    }
    readings
}

fn row_reading(label: &str, value: f64, unit: &str) -> Option<(NutrientKey, f64)> {
    let label = normalize_key(label);
    match match_key(&label) {
        Some(NutrientKind::Energy) => Some((energy_key(unit, &label)?, value)),
        Some(kind) => {
            let key = kind_key(kind)?;
            Some((key, convert_mass(key, value, unit)?))
        }
        None if label.contains("calories") => match unit {
            "" | "kcal" | "cal" => Some((NutrientKey::EnergyKcal, value)),
            "kJ" => Some((NutrientKey::EnergyKj, value)),
            _ => None,
        },
        None => None,
    }
}

// ── Basis ────────────────────────────────────────────────────────────────────

/// Basis of a single-column label, read from its raw line texts.
pub fn single_column_basis<'a>(raw_lines: impl IntoIterator<Item = &'a str>) -> Basis {
    let mut per_100 = false;
    let mut per_serve = false;
    for line in raw_lines {
        let l = line.to_lowercase();
        per_100 |= l.contains("per 100");
        per_serve |= l.contains("per serv");
    }
    if per_100 && !per_serve {
        Basis::Per100g
    } else {
        Basis::PerServe
    }
}

// ── Merge ────────────────────────────────────────────────────────────────────

/// All readings that compete for the final table.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    pub columns: Readings,
    pub rows: Readings,
    pub line_rules: Readings,
    pub rejected: BTreeSet<NutrientKey>,
}

/// Merge sources by precedence, then apply the ceiling veto.
pub fn merge(sources: &Sources, basis: Basis) -> BTreeMap<NutrientKey, NutrientRecord> {
    let ranked = [
        (NutrientSource::Columns, &sources.columns),
        (NutrientSource::Rows, &sources.rows),
        (NutrientSource::LineRules, &sources.line_rules),
    ];
    let mut merged = BTreeMap::new();
    for key in NutrientKey::ALL {
        if sources.rejected.contains(&key) {
            continue;
        }
        let Some((source, reading)) = ranked
            .iter()
            .find_map(|(source, readings)| readings.get(&key).map(|r| (*source, *r)))
        else {
            continue;
        };
        if !reading.value.is_finite() || reading.value < 0.0 || reading.value > ceiling(key, basis) {
            debug!("{key}: {} vetoed by ceiling", reading.value);
            continue;
        }
        merged.insert(
            key,
            NutrientRecord {
                value: reading.value,
                unit: key.unit().to_string(),
                confidence: reading.confidence,
                source,
            },
        );
    }
    merged
}
