//! Configuration types for nutrition-label extraction.
//!
//! Every heuristic threshold of the pipeline is controlled through
//! [`ExtractionConfig`], built via its [`ExtractionConfigBuilder`]. The
//! defaults are the values the heuristics were tuned with; the knobs exist
//! so that a batch run on a new label style can be re-tuned without code
//! changes, and so two runs can be diffed by their serialised config.

use crate::error::NutrilabelError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for an extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use nutrilabel::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .min_serving_size(5.0)
///     .reject_deviation(0.8)
///     .include_debug(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Lower bound on the vertical line-merge tolerance, in pixels. Default: 6.
    pub min_line_tolerance: f64,

    /// Line-merge tolerance as a fraction of the median token height. Default: 0.6.
    ///
    /// Label rows are separated by roughly one text height, while OCR jitter
    /// within a row stays well under half of it.
    pub line_tolerance_factor: f64,

    /// Token height assumed when no token has a positive height. Default: 10.
    pub fallback_token_height: f64,

    /// Side length of the canvas that normalised (0–1) vertices are scaled
    /// onto when the payload gives no page size. Default: 1000.
    pub normalized_canvas: f64,

    /// Structured-payload words below this OCR confidence are dropped.
    /// Default: 0.0 (keep everything).
    pub min_word_confidence: f32,

    /// Normalised x below which a token belongs to the label column. Default: 0.33.
    pub label_column_max: f64,

    /// Normalised x below which a token belongs to the per-serving column;
    /// anything further right is per-100g. Default: 0.66.
    pub serve_column_max: f64,

    /// Serving sizes below this value are treated as "not detected". Default: 5.
    pub min_serving_size: f64,

    /// Relative per-100g deviation above which a value is rejected. Default: 0.8.
    pub reject_deviation: f64,

    /// Relative per-100g deviation below which a value is upgraded from
    /// Low to Med confidence. Default: 0.3.
    pub accept_deviation: f64,

    /// Attach tokens, dropped lines and column clusters to the output. Default: false.
    pub include_debug: bool,

    /// Number of payload files extracted concurrently in batch mode. Default: 8.
    pub concurrency: usize,

    /// Optional progress callback for batch extraction.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_line_tolerance: 6.0,
            line_tolerance_factor: 0.6,
            fallback_token_height: 10.0,
            normalized_canvas: 1000.0,
            min_word_confidence: 0.0,
            label_column_max: 0.33,
            serve_column_max: 0.66,
            min_serving_size: 5.0,
            reject_deviation: 0.8,
            accept_deviation: 0.3,
            include_debug: false,
            concurrency: 8,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("min_line_tolerance", &self.min_line_tolerance)
            .field("line_tolerance_factor", &self.line_tolerance_factor)
            .field("fallback_token_height", &self.fallback_token_height)
            .field("normalized_canvas", &self.normalized_canvas)
            .field("min_word_confidence", &self.min_word_confidence)
            .field("label_column_max", &self.label_column_max)
            .field("serve_column_max", &self.serve_column_max)
            .field("min_serving_size", &self.min_serving_size)
            .field("reject_deviation", &self.reject_deviation)
            .field("accept_deviation", &self.accept_deviation)
            .field("include_debug", &self.include_debug)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn min_line_tolerance(mut self, px: f64) -> Self {
        self.config.min_line_tolerance = px.max(0.0);
        self
    }

    pub fn line_tolerance_factor(mut self, factor: f64) -> Self {
        self.config.line_tolerance_factor = factor.max(0.0);
        self
    }

    pub fn fallback_token_height(mut self, px: f64) -> Self {
        self.config.fallback_token_height = px;
        self
    }

    pub fn normalized_canvas(mut self, size: f64) -> Self {
        self.config.normalized_canvas = size;
        self
    }

    pub fn min_word_confidence(mut self, c: f32) -> Self {
        self.config.min_word_confidence = c.clamp(0.0, 1.0);
        self
    }

    pub fn column_thresholds(mut self, label_max: f64, serve_max: f64) -> Self {
        self.config.label_column_max = label_max;
        self.config.serve_column_max = serve_max;
        self
    }

    pub fn min_serving_size(mut self, v: f64) -> Self {
        self.config.min_serving_size = v.max(0.0);
        self
    }

    pub fn reject_deviation(mut self, d: f64) -> Self {
        self.config.reject_deviation = d;
        self
    }

    pub fn accept_deviation(mut self, d: f64) -> Self {
        self.config.accept_deviation = d;
        self
    }

    pub fn include_debug(mut self, v: bool) -> Self {
        self.config.include_debug = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, NutrilabelError> {
        let c = &self.config;
        if !(c.fallback_token_height > 0.0) {
            return Err(NutrilabelError::InvalidConfig(format!(
                "Fallback token height must be > 0, got {}",
                c.fallback_token_height
            )));
        }
        if !(c.normalized_canvas > 1.0) {
            return Err(NutrilabelError::InvalidConfig(format!(
                "Normalised canvas must be > 1, got {}",
                c.normalized_canvas
            )));
        }
        if !(0.0 < c.label_column_max
            && c.label_column_max < c.serve_column_max
            && c.serve_column_max < 1.0)
        {
            return Err(NutrilabelError::InvalidConfig(format!(
                "Column thresholds must satisfy 0 < label ({}) < serve ({}) < 1",
                c.label_column_max, c.serve_column_max
            )));
        }
        if !(0.0 <= c.accept_deviation && c.accept_deviation <= c.reject_deviation) {
            return Err(NutrilabelError::InvalidConfig(format!(
                "Deviation thresholds must satisfy 0 ≤ accept ({}) ≤ reject ({})",
                c.accept_deviation, c.reject_deviation
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let c = ExtractionConfig::builder().build().unwrap();
        assert_eq!(c.min_line_tolerance, 6.0);
        assert_eq!(c.line_tolerance_factor, 0.6);
        assert_eq!(c.min_serving_size, 5.0);
        assert_eq!(c.reject_deviation, 0.8);
        assert_eq!(c.accept_deviation, 0.3);
        assert!(!c.include_debug);
    }

    #[test]
    fn concurrency_is_clamped() {
        let c = ExtractionConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn inverted_column_thresholds_rejected() {
        let err = ExtractionConfig::builder()
            .column_thresholds(0.7, 0.4)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Column thresholds"));
    }

    #[test]
    fn inverted_deviation_thresholds_rejected() {
        let err = ExtractionConfig::builder()
            .accept_deviation(0.9)
            .reject_deviation(0.5)
            .build()
            .unwrap_err();
        assert!(matches!(err, NutrilabelError::InvalidConfig(_)));
    }

    #[test]
    fn debug_hides_callback() {
        let s = format!("{:?}", ExtractionConfig::default());
        assert!(s.contains("progress_callback: None"));
    }
}
