//! Column classification for dual-column ("per serving" / "per 100 g") labels.
//!
//! ## Layout model
//!
//! ```text
//!  0.0            0.33              0.66              1.0
//!  |   label band  |  per-serve band  |  per-100g band  |
//!  Energy             1000kJ             1667kJ
//!  Protein            12g                20g
//! ```
//!
//! Each token's x-center is normalised against the horizontal span of all
//! tokens on the label and dropped into one of three bands. The band
//! boundaries come from [`ExtractionConfig`]. Percent tokens are discarded
//! so a trailing %DV column never lands in the per-100g band.
//!
//! The x-centers of value tokens are also clustered (nearest pair merged
//! until at most three remain and none share a column). The clusters are reported in debug output
//! only; classification itself uses the fixed bands.

use crate::config::ExtractionConfig;
use crate::model::{Line, Token};
use crate::pipeline::text::{
    canonical_unit, has_digit, normalize_line, normalize_token, parse_combined, parse_number,
    UNIT_ALTERNATION,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Printed nutrient a label phrase refers to. Energy stays ambiguous
/// (kJ or kcal) until a unit is seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NutrientKind {
    Energy,
    Protein,
    Fat,
    Carbs,
    Sugars,
    Fibre,
    Sodium,
}

/// Map a label phrase to a nutrient, first rule wins.
pub fn match_key(label: &str) -> Option<NutrientKind> {
    let l = label.to_lowercase();
    if l.contains("energy") {
        Some(NutrientKind::Energy)
    } else if l.contains("protein") {
        Some(NutrientKind::Protein)
    } else if l.contains("fat") && !l.contains("saturated") {
        Some(NutrientKind::Fat)
    } else if l.contains("carbohydrate") || l.contains("carbs") {
        Some(NutrientKind::Carbs)
    } else if l.contains("sugar") {
        Some(NutrientKind::Sugars)
    } else if l.contains("fibre") || l.contains("fiber") {
        Some(NutrientKind::Fibre)
    } else if l.contains("sodium") {
        Some(NutrientKind::Sodium)
    } else {
        None
    }
}

/// One label row split into its three bands.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRow {
    pub kind: NutrientKind,
    pub label: String,
    pub serve_text: String,
    pub per100_text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnLayout {
    /// Ascending normalised x-centers of value clusters.
    pub clusters: Vec<f64>,
    pub rows: Vec<ColumnRow>,
}

const ROW_BLOCKLIST: &[&str] = &["avg", "average", "quantity", "daily", "intake"];

const MAX_CLUSTERS: usize = 3;

/// Whether any raw line is a "per serving … per 100" column header.
pub fn is_dual_column<'a>(raw_lines: impl IntoIterator<Item = &'a str>) -> bool {
    raw_lines.into_iter().any(|line| {
        let l = line.to_lowercase();
        let per_serve = l.contains("per serv")
            || (l.contains("serving") && !l.contains("serving size") && !l.contains("servings"));
        let per_100 = l.contains("per 100")
            || l.contains("100g")
            || l.contains("100 g")
            || l.contains("100ml");
        per_serve && per_100
    })
}

/// Classify every line into label / per-serve / per-100g bands.
pub fn classify(lines: &[Line], config: &ExtractionConfig) -> ColumnLayout {
    let all: Vec<&Token> = lines.iter().flat_map(|l| l.tokens.iter()).collect();
    let Some(span) = Span::of(&all) else {
        return ColumnLayout::default();
    };

    let centers: Vec<f64> = lines
        .iter()
        .flat_map(|l| value_token_indices(l).into_iter().map(move |i| &l.tokens[i]))
        .map(|t| span.normalise(t.x_mid()))
        .collect();
    let clusters = cluster_centers(centers, MAX_CLUSTERS);

    let mut rows = Vec::new();
    for line in lines {
        if !accepts_row(line) {
            continue;
        }
        let mut label = Vec::new();
        let mut serve = Vec::new();
        let mut per100 = Vec::new();
        for token in &line.tokens {
            if is_percent(&token.text) {
                continue;
            }
            let x = span.normalise(token.x_mid());
            if x < config.label_column_max {
                label.push(token.text.as_str());
            } else if x < config.serve_column_max {
                serve.push(token.text.as_str());
            } else {
                per100.push(token.text.as_str());
            }
        }
        let label = label.join(" ");
        let Some(kind) = match_key(&label) else {
            continue;
        };
        rows.push(ColumnRow {
            kind,
            label,
            serve_text: serve.join(" "),
            per100_text: per100.join(" "),
        });
    }

    debug!(
        "Column layout: {} rows, clusters at {:?}",
        rows.len(),
        clusters
    );
    ColumnLayout { clusters, rows }
}

fn is_percent(text: &str) -> bool {
    normalize_token(text).ends_with('%')
}

// A number followed by a unit anywhere in the text, so `1000kJ/239kcal`
// counts even though no single token parses.
static RE_VALUE_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\d\s*({UNIT_ALTERNATION})\b")).unwrap());

fn has_value_unit(text: &str) -> bool {
    RE_VALUE_UNIT
        .captures_iter(text)
        .any(|caps| canonical_unit(&caps[1]).is_some_and(|u| u != "%"))
}

/// A row needs a digit and a unit, and must not be a header or %DV line.
/// Fibre is commonly printed without a unit, so fibre rows skip the unit test.
fn accepts_row(line: &Line) -> bool {
    let text = normalize_line(&line.text);
    let lower = text.to_lowercase();
    if !has_digit(&lower) {
        return false;
    }
    if lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| ROW_BLOCKLIST.contains(&w))
    {
        return false;
    }
    has_value_unit(&text) || lower.contains("fibre") || lower.contains("fiber")
}

/// Indices of tokens carrying a number with a recognised non-percent unit.
fn value_token_indices(line: &Line) -> Vec<usize> {
    let norm: Vec<String> = line.tokens.iter().map(|t| normalize_token(&t.text)).collect();
    (0..norm.len())
        .filter(|&i| {
            if let Some((_, unit)) = parse_combined(&norm[i]) {
                return unit != "%";
            }
            parse_number(&norm[i]).is_some()
                && norm
                    .get(i + 1)
                    .and_then(|n| canonical_unit(n))
                    .is_some_and(|u| u != "%")
        })
        .collect()
}

/// Centers closer than this are one column whatever the cluster count.
const SAME_COLUMN_GAP: f64 = 0.02;

/// Merge the closest pair of neighbouring centers until at most `max` remain
/// and no two remaining centers are within [`SAME_COLUMN_GAP`].
pub fn cluster_centers(mut xs: Vec<f64>, max: usize) -> Vec<f64> {
    xs.sort_by(f64::total_cmp);
    let mut clusters: Vec<(f64, usize)> = xs.into_iter().map(|x| (x, 1)).collect();
    while clusters.len() > 1 {
        let gap = |i: usize| clusters[i + 1].0 - clusters[i].0;
        let Some(i) = (0..clusters.len() - 1).min_by(|&a, &b| gap(a).total_cmp(&gap(b))) else {
            break;
        };
        if clusters.len() <= max.max(1) && gap(i) > SAME_COLUMN_GAP {
            break;
        }
        let (xa, na) = clusters[i];
        let (xb, nb) = clusters.remove(i + 1);
        let n = na + nb;
        clusters[i] = ((xa * na as f64 + xb * nb as f64) / n as f64, n);
    }
    clusters.into_iter().map(|(x, _)| x).collect()
}

struct Span {
    min: f64,
    width: f64,
}

impl Span {
    fn of(tokens: &[&Token]) -> Option<Self> {
        let min = tokens.iter().map(|t| t.x_min).min_by(f64::total_cmp)?;
        let max = tokens.iter().map(|t| t.x_max).max_by(f64::total_cmp)?;
        let width = max - min;
        (width > 0.0).then_some(Self { min, width })
    }

    fn normalise(&self, x: f64) -> f64 {
        (x - self.min) / self.width
    }
}
