//! OCR payload boundary: parse, validate and normalise provider output.
//!
//! Two payload shapes are accepted and modelled as one tagged union,
//! [`OcrPayload`]:
//!
//! * **Flat**: `{ "fullText": "...", "items": [{ "text", "boundingBox": [{x, y}] }] }`
//! * **Structured**: the page → block → paragraph → word → symbol tree with
//!   per-word confidence, optionally wrapped in `{ "fullTextAnnotation": ... }`.
//!
//! After [`OcrPayload::validate`] the rest of the crate only ever sees an
//! [`OcrDocument`]: the raw full text plus [`Token`]s in one common
//! coordinate space. Words with empty text or no vertices are dropped here,
//! silently, because providers routinely emit such stray annotations.

use crate::config::ExtractionConfig;
use crate::error::NutrilabelError;
use crate::model::Token;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

impl Vertex {
    fn point(&self) -> (f64, f64) {
        (self.x.unwrap_or(0.0), self.y.unwrap_or(0.0))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatItem {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bounding_box: Vec<Vertex>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatPayload {
    #[serde(default)]
    pub full_text: String,
    pub items: Vec<FlatItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingPoly {
    #[serde(default)]
    pub vertices: Vec<Vertex>,
    #[serde(default)]
    pub normalized_vertices: Vec<Vertex>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Symbol {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    #[serde(default)]
    pub bounding_box: BoundingPoly,
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredPayload {
    #[serde(default)]
    pub text: String,
    pub pages: Vec<Page>,
}

/// The two supported provider payload shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OcrPayload {
    Flat(FlatPayload),
    Structured(StructuredPayload),
}

/// A validated payload: raw text plus tokens in one coordinate space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrDocument {
    pub full_text: String,
    pub tokens: Vec<Token>,
}

impl OcrPayload {
    /// Parse a JSON payload of either shape.
    ///
    /// A top-level `fullTextAnnotation` wrapper is unwrapped first. JSON that
    /// fits neither shape is the one hard failure of the crate.
    pub fn from_json(json: &str) -> Result<Self, NutrilabelError> {
        let mut value: serde_json::Value = serde_json::from_str(json)?;
        if let Some(inner) = value.get_mut("fullTextAnnotation").map(serde_json::Value::take) {
            value = inner;
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Check structural rules serde cannot express.
    pub fn validate(&self) -> Result<(), NutrilabelError> {
        match self {
            OcrPayload::Flat(flat) => {
                for (i, item) in flat.items.iter().enumerate() {
                    check_vertices(&item.bounding_box, || format!("item {i}"))?;
                }
            }
            OcrPayload::Structured(doc) => {
                for (p, page) in doc.pages.iter().enumerate() {
                    for (name, dim) in [("width", page.width), ("height", page.height)] {
                        if let Some(v) = dim {
                            if !v.is_finite() || v < 0.0 {
                                return Err(NutrilabelError::InvalidPayload(format!(
                                    "page {p} has invalid {name} {v}"
                                )));
                            }
                        }
                    }
                    for word in page.blocks.iter().flat_map(|b| &b.paragraphs).flat_map(|pa| &pa.words) {
                        check_vertices(&word.bounding_box.vertices, || format!("page {p} word"))?;
                        check_vertices(&word.bounding_box.normalized_vertices, || {
                            format!("page {p} word")
                        })?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate and convert into tokens (the Token Normalizer stage).
    pub fn into_document(self, config: &ExtractionConfig) -> Result<OcrDocument, NutrilabelError> {
        self.validate()?;
        let doc = match self {
            OcrPayload::Flat(flat) => normalise_flat(flat, config),
            OcrPayload::Structured(structured) => normalise_structured(structured, config),
        };
        debug!("Normalised {} tokens", doc.tokens.len());
        Ok(doc)
    }
}

/// Only non-finite coordinates are invalid. Words cut by the image edge come
/// back with small negative coordinates and are kept.
fn check_vertices(vertices: &[Vertex], ctx: impl Fn() -> String) -> Result<(), NutrilabelError> {
    let bad = vertices
        .iter()
        .flat_map(|v| [v.x, v.y])
        .flatten()
        .any(|c| !c.is_finite());
    if bad {
        return Err(NutrilabelError::InvalidPayload(format!(
            "{} has a non-finite coordinate",
            ctx()
        )));
    }
    Ok(())
}

/// Bounding rectangle of a vertex list, scaled by `(sx, sy)`.
fn bounding_rect(vertices: &[Vertex], sx: f64, sy: f64) -> Option<(f64, f64, f64, f64)> {
    if vertices.is_empty() {
        return None;
    }
    let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in vertices {
        let (x, y) = v.point();
        x_min = x_min.min(x * sx);
        x_max = x_max.max(x * sx);
        y_min = y_min.min(y * sy);
        y_max = y_max.max(y * sy);
    }
    Some((x_min, x_max, y_min, y_max))
}

fn normalise_flat(flat: FlatPayload, config: &ExtractionConfig) -> OcrDocument {
    // Fractions and pixels never mix within one payload, so one scale for all.
    let coords: Vec<f64> = flat
        .items
        .iter()
        .flat_map(|i| i.bounding_box.iter())
        .flat_map(|v| [v.x.unwrap_or(0.0), v.y.unwrap_or(0.0)])
        .collect();
    let normalised = !coords.is_empty()
        && coords.iter().all(|c| (0.0..=1.0).contains(c))
        && coords.iter().any(|c| *c > 0.0);
    let scale = if normalised {
        config.normalized_canvas
    } else {
        1.0
    };

    let tokens = flat
        .items
        .into_iter()
        .filter_map(|item| {
            let text = item.text.trim();
            // Whole-block annotations (multi-line text) are not words.
            if text.is_empty() || text.contains('\n') {
                return None;
            }
            let (x_min, x_max, y_min, y_max) = bounding_rect(&item.bounding_box, scale, scale)?;
            Some(Token::new(text, x_min, x_max, y_min, y_max))
        })
        .collect();

    OcrDocument {
        full_text: flat.full_text,
        tokens,
    }
}

fn normalise_structured(doc: StructuredPayload, config: &ExtractionConfig) -> OcrDocument {
    let mut tokens = Vec::new();
    for page in &doc.pages {
        let page_w = page.width.filter(|w| *w > 0.0).unwrap_or(config.normalized_canvas);
        let page_h = page.height.filter(|h| *h > 0.0).unwrap_or(config.normalized_canvas);

        for word in page.blocks.iter().flat_map(|b| &b.paragraphs).flat_map(|p| &p.words) {
            if let Some(c) = word.confidence {
                if c < config.min_word_confidence {
                    continue;
                }
            }
            let text: String = word.symbols.iter().map(|s| s.text.as_str()).collect();
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let poly = &word.bounding_box;
            let rect = if !poly.vertices.is_empty() {
                bounding_rect(&poly.vertices, 1.0, 1.0)
            } else {
                bounding_rect(&poly.normalized_vertices, page_w, page_h)
            };
            if let Some((x_min, x_max, y_min, y_max)) = rect {
                tokens.push(Token {
                    confidence: word.confidence,
                    ..Token::new(text, x_min, x_max, y_min, y_max)
                });
            }
        }
    }
    OcrDocument {
        full_text: doc.text,
        tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ExtractionConfig {
        ExtractionConfig::default()
    }

    #[test]
    fn flat_payload_parses_and_normalises() {
        let json = r#"{
            "fullText": "Protein 5g",
            "items": [
                {"text": "Protein", "boundingBox": [{"x":10,"y":20},{"x":70,"y":20},{"x":70,"y":34},{"x":10,"y":34}]},
                {"text": "5g", "boundingBox": [{"x":200,"y":21},{"x":230,"y":21},{"x":230,"y":35},{"x":200,"y":35}]}
            ]
        }"#;
        let payload = OcrPayload::from_json(json).unwrap();
        assert!(matches!(payload, OcrPayload::Flat(_)));
        let doc = payload.into_document(&cfg()).unwrap();
        assert_eq!(doc.full_text, "Protein 5g");
        assert_eq!(doc.tokens.len(), 2);
        assert_eq!(doc.tokens[0].x_min, 10.0);
        assert_eq!(doc.tokens[0].y_max, 34.0);
    }

    #[test]
    fn missing_coordinates_read_as_zero() {
        let json = r#"{"items": [{"text": "Fat", "boundingBox": [{"y":5},{"x":30,"y":5},{"x":30,"y":15},{"y":15}]}]}"#;
        let doc = OcrPayload::from_json(json).unwrap().into_document(&cfg()).unwrap();
        assert_eq!(doc.tokens[0].x_min, 0.0);
        assert_eq!(doc.tokens[0].x_max, 30.0);
    }

    #[test]
    fn empty_text_and_vertexless_items_dropped() {
        let json = r#"{"items": [
            {"text": "  ", "boundingBox": [{"x":1,"y":1}]},
            {"text": "Sodium", "boundingBox": []},
            {"text": "Energy", "boundingBox": [{"x":1,"y":1},{"x":9,"y":9}]}
        ]}"#;
        let doc = OcrPayload::from_json(json).unwrap().into_document(&cfg()).unwrap();
        assert_eq!(doc.tokens.len(), 1);
        assert_eq!(doc.tokens[0].text, "Energy");
    }

    #[test]
    fn whole_block_annotation_skipped() {
        let json = r#"{"items": [
            {"text": "Protein 5g\nFat 3g", "boundingBox": [{"x":0,"y":0},{"x":300,"y":100}]},
            {"text": "Protein", "boundingBox": [{"x":0,"y":0},{"x":60,"y":12}]}
        ]}"#;
        let doc = OcrPayload::from_json(json).unwrap().into_document(&cfg()).unwrap();
        assert_eq!(doc.tokens.len(), 1);
    }

    #[test]
    fn normalised_flat_coordinates_scaled_to_canvas() {
        let json = r#"{"items": [{"text": "Fat", "boundingBox": [{"x":0.1,"y":0.2},{"x":0.3,"y":0.25}]}]}"#;
        let doc = OcrPayload::from_json(json).unwrap().into_document(&cfg()).unwrap();
        let t = &doc.tokens[0];
        assert!((t.x_min - 100.0).abs() < 1e-9);
        assert!((t.y_max - 250.0).abs() < 1e-9);
    }

    #[test]
    fn structured_payload_with_wrapper() {
        let json = r#"{"fullTextAnnotation": {
            "text": "Sugars 4.1g\n",
            "pages": [{"width": 800, "height": 600, "blocks": [{"paragraphs": [{"words": [
                {"boundingBox": {"vertices": [{"x":10,"y":10},{"x":60,"y":10},{"x":60,"y":22},{"x":10,"y":22}]},
                 "symbols": [{"text":"S"},{"text":"u"},{"text":"g"},{"text":"a"},{"text":"r"},{"text":"s"}],
                 "confidence": 0.97},
                {"boundingBox": {"normalizedVertices": [{"x":0.5,"y":0.02},{"x":0.55,"y":0.04}]},
                 "symbols": [{"text":"4"},{"text":"."},{"text":"1"},{"text":"g"}],
                 "confidence": 0.91}
            ]}]}]}]
        }}"#;
        let payload = OcrPayload::from_json(json).unwrap();
        assert!(matches!(payload, OcrPayload::Structured(_)));
        let doc = payload.into_document(&cfg()).unwrap();
        assert_eq!(doc.tokens.len(), 2);
        assert_eq!(doc.tokens[0].text, "Sugars");
        assert_eq!(doc.tokens[0].confidence, Some(0.97));
        assert_eq!(doc.tokens[1].text, "4.1g");
        assert!((doc.tokens[1].x_min - 400.0).abs() < 1e-9);
        assert!((doc.tokens[1].y_max - 24.0).abs() < 1e-9);
    }

    #[test]
    fn low_confidence_words_dropped_when_configured() {
        let json = r#"{"text": "", "pages": [{"blocks": [{"paragraphs": [{"words": [
            {"boundingBox": {"vertices": [{"x":1,"y":1},{"x":5,"y":5}]}, "symbols": [{"text":"x"}], "confidence": 0.2}
        ]}]}]}]}"#;
        let config = ExtractionConfig::builder().min_word_confidence(0.5).build().unwrap();
        let doc = OcrPayload::from_json(json).unwrap().into_document(&config).unwrap();
        assert!(doc.tokens.is_empty());
    }

    #[test]
    fn negative_coordinates_kept() {
        let json = r#"{"items": [{"text": "Energy", "boundingBox": [{"x":-4,"y":10},{"x":40,"y":10},{"x":40,"y":22},{"x":-4,"y":22}]}]}"#;
        let payload = OcrPayload::from_json(json).unwrap();
        assert!(payload.validate().is_ok());
        let doc = payload.into_document(&cfg()).unwrap();
        assert_eq!(doc.tokens[0].x_min, -4.0);
    }

    #[test]
    fn negative_page_size_rejected() {
        let json = r#"{"text": "", "pages": [{"width": -3, "blocks": []}]}"#;
        let err = OcrPayload::from_json(json).unwrap().validate().unwrap_err();
        assert!(matches!(err, NutrilabelError::InvalidPayload(_)));
    }

    #[test]
    fn unknown_shape_is_malformed() {
        let err = OcrPayload::from_json(r#"{"words": []}"#).unwrap_err();
        assert!(matches!(err, NutrilabelError::MalformedPayload(_)));
        let err = OcrPayload::from_json("not json").unwrap_err();
        assert!(matches!(err, NutrilabelError::MalformedPayload(_)));
    }
}
