//! Line reconstruction: cluster unordered tokens into reading-order lines.
//!
//! ## Algorithm
//!
//! 1. Vertical tolerance `y_tol = max(min_tol, factor × median token height)`.
//! 2. Sort tokens by `(y_mid, x_min)`.
//! 3. One greedy pass: each token joins the existing cluster whose running
//!    mean `y_ref` is closest, if that distance is within `y_tol`; otherwise
//!    it opens a new cluster. `y_ref` is updated as the incremental mean of
//!    the members' `y_mid`.
//! 4. Clusters sorted by `y_ref`, members by `x_min`, joined by one space.
//!
//! This is online single-link clustering, deterministic for a fixed input
//! order. Label rows sit about one text height apart, while OCR jitter inside
//! a row stays well under that, so a greedy pass is enough.
//!
//! Without any geometry the raw full text is split on newlines instead.

use crate::config::ExtractionConfig;
use crate::model::{Line, Token};
use tracing::debug;

/// Reconstruct lines from tokens, or from `full_text` when `tokens` is empty.
pub fn reconstruct(tokens: &[Token], full_text: &str, config: &ExtractionConfig) -> Vec<Line> {
    if tokens.is_empty() {
        let lines = split_full_text(full_text);
        debug!("No geometry; split full text into {} lines", lines.len());
        return lines;
    }

    let y_tol = line_tolerance(tokens, config);

    let mut sorted: Vec<&Token> = tokens.iter().collect();
    sorted.sort_by(|a, b| {
        a.y_mid()
            .total_cmp(&b.y_mid())
            .then(a.x_min.total_cmp(&b.x_min))
    });

    let mut clusters: Vec<Cluster> = Vec::new();
    for token in sorted {
        let y = token.y_mid();
        let nearest = clusters
            .iter_mut()
            .map(|c| ((c.y_ref - y).abs(), c))
            .min_by(|a, b| a.0.total_cmp(&b.0));
        match nearest {
            Some((dist, cluster)) if dist <= y_tol => cluster.push(token),
            _ => clusters.push(Cluster::new(token)),
        }
    }

    clusters.sort_by(|a, b| a.y_ref.total_cmp(&b.y_ref));
    let lines: Vec<Line> = clusters
        .into_iter()
        .map(|c| {
            let mut members = c.tokens;
            members.sort_by(|a, b| a.x_min.total_cmp(&b.x_min));
            Line::from_tokens(members, c.y_ref)
        })
        .collect();

    debug!(
        "Clustered {} tokens into {} lines (y_tol = {:.1})",
        tokens.len(),
        lines.len(),
        y_tol
    );
    lines
}

/// `max(min_line_tolerance, factor × median positive token height)`.
pub fn line_tolerance(tokens: &[Token], config: &ExtractionConfig) -> f64 {
    let mut heights: Vec<f64> = tokens
        .iter()
        .map(Token::height)
        .filter(|h| *h > 0.0)
        .collect();
    let median = if heights.is_empty() {
        config.fallback_token_height
    } else {
        heights.sort_by(f64::total_cmp);
        let mid = heights.len() / 2;
        if heights.len() % 2 == 0 {
            (heights[mid - 1] + heights[mid]) / 2.0
        } else {
            heights[mid]
        }
    };
    config
        .min_line_tolerance
        .max(config.line_tolerance_factor * median)
}

fn split_full_text(full_text: &str) -> Vec<Line> {
    full_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(Line::from_text)
        .collect()
}

struct Cluster {
    tokens: Vec<Token>,
    y_ref: f64,
}

impl Cluster {
    fn new(token: &Token) -> Self {
        Self {
            y_ref: token.y_mid(),
            tokens: vec![token.clone()],
        }
    }

    fn push(&mut self, token: &Token) {
        self.tokens.push(token.clone());
        let n = self.tokens.len() as f64;
        self.y_ref += (token.y_mid() - self.y_ref) / n;
    }
}
