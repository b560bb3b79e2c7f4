//! Intermediate data types passed between pipeline stages.
//!
//! All of them are plain values built once per extraction run. Nothing here
//! is shared between runs or mutated after a stage hands it on.

use serde::{Deserialize, Serialize};

/// One OCR word with its axis-aligned bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    /// Per-word OCR confidence, when the payload carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Token {
    pub fn new(text: impl Into<String>, x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            text: text.into(),
            x_min,
            x_max,
            y_min,
            y_max,
            confidence: None,
        }
    }

    pub fn y_mid(&self) -> f64 {
        (self.y_min + self.y_max) / 2.0
    }

    pub fn x_mid(&self) -> f64 {
        (self.x_min + self.x_max) / 2.0
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }
}

/// A reconstructed text line.
///
/// `tokens` is empty when the line came from the newline-split fallback
/// (no geometry available); `text` is always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub tokens: Vec<Token>,
    pub text: String,
    /// Mean vertical midpoint of the member tokens (0 for text-only lines).
    pub y_ref: f64,
}

impl Line {
    pub fn from_tokens(tokens: Vec<Token>, y_ref: f64) -> Self {
        let text = tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            tokens,
            text,
            y_ref,
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            tokens: Vec::new(),
            text: text.into(),
            y_ref: 0.0,
        }
    }

    pub fn has_geometry(&self) -> bool {
        !self.tokens.is_empty()
    }
}

/// A tentative `(value, unit)` reading found on a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueUnitCandidate {
    /// The text the reading was parsed from, e.g. `"300mg"` or `"90"`.
    pub raw: String,
    pub value: f64,
    /// Canonical unit spelling; `""` for the unit-less calories reading.
    pub unit: String,
    /// Text of the line the candidate was found on.
    pub line: String,
    pub line_index: usize,
    /// Index of the anchoring token in its line (token mode only).
    pub token_index: Option<usize>,
}

/// A candidate with the label phrase recovered from its left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledCandidate {
    #[serde(flatten)]
    pub candidate: ValueUnitCandidate,
    pub label: String,
}

/// All readings that share one normalised label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRow {
    /// Display label of the primary reading.
    pub label: String,
    /// Normalised group key (trimmed, single-spaced, lower-case).
    pub key: String,
    pub primary: LabeledCandidate,
    /// Other readings of the same label, kept for inspection only.
    pub alternates: Vec<LabeledCandidate>,
}
