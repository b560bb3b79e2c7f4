//! Label attachment: recover the label phrase to the left of each reading.
//!
//! Starting at the token just left of the candidate, numbers, units and
//! punctuation are skipped until the first word-like token. From there,
//! word-like tokens and connectors (`, - : / &`) are collected until a
//! number, a bare unit or a `number+unit` token ends the phrase. The phrase
//! is then cleaned and rejected outright if any digit remains, which keeps a
//! row's numeric prefix from leaking into its own label.
//!
//! Serving-size grams are often printed in a parenthetical aside that
//! confuses the scan, so a `g` reading on a "serving size" line is always
//! labelled "Serving Size".

use crate::model::{LabeledCandidate, Line, ValueUnitCandidate};
use crate::pipeline::text::{
    canonical_unit, has_digit, is_connector, is_word_like, normalize_token, parse_combined,
    parse_number,
};
use once_cell::sync::Lazy;
use regex::Regex;

pub const SERVING_SIZE_LABEL: &str = "Serving Size";

static RE_SERVING_SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)serving\s+size").unwrap());

static RE_LINE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(?(?:\d+|[ivx]+|[a-z])[).:]\s*").unwrap());

const FILLER_WORDS: &[&str] = &[
    "of", "and", "the", "approx", "approx.", "approximately", "about", "contains", "includes",
    "incl", "incl.", "which",
];

/// Attach labels to every candidate. Candidates whose label cannot be
/// recovered (no token index, no words, or a digit survives cleaning) are
/// dropped.
pub fn attach(candidates: &[ValueUnitCandidate], lines: &[Line]) -> Vec<LabeledCandidate> {
    candidates
        .iter()
        .filter_map(|c| {
            let label = label_for(c, lines)?;
            Some(LabeledCandidate {
                candidate: c.clone(),
                label,
            })
        })
        .collect()
}

/// The label of one candidate, if any.
pub fn label_for(candidate: &ValueUnitCandidate, lines: &[Line]) -> Option<String> {
    if candidate.unit == "g" && RE_SERVING_SIZE.is_match(&candidate.line) {
        return Some(SERVING_SIZE_LABEL.to_string());
    }
    let index = candidate.token_index?;
    let line = lines.get(candidate.line_index)?;
    let texts: Vec<&str> = line.tokens.iter().map(|t| t.text.as_str()).collect();
    let raw = scan_left(&texts, index)?;
    clean_label(&raw)
}

fn ends_phrase(token: &str) -> bool {
    let norm = normalize_token(token);
    parse_number(&norm).is_some()
        || canonical_unit(&norm).is_some()
        || parse_combined(&norm).is_some()
}

/// Collect the label phrase left of `index`, in reading order.
fn scan_left(tokens: &[&str], index: usize) -> Option<String> {
    let mut collected: Vec<&str> = Vec::new();
    for &token in tokens[..index.min(tokens.len())].iter().rev() {
        if collected.is_empty() {
            if is_word_like(token) {
                collected.push(token);
            }
            continue;
        }
        if ends_phrase(token) {
            break;
        }
        if is_word_like(token) || is_connector(token) {
            collected.push(token);
        } else {
            break;
        }
    }
    if collected.is_empty() {
        return None;
    }
    collected.reverse();
    Some(collected.join(" "))
}

/// Strip filler words, a line-number artifact and edge punctuation; reject
/// labels that still contain a digit.
pub fn clean_label(raw: &str) -> Option<String> {
    let mut label = raw.trim().to_string();
    label = RE_LINE_NUMBER.replace(&label, "").into_owned();

    loop {
        let trimmed = label.trim_start_matches(|c: char| !c.is_alphanumeric());
        let first = trimmed.split_whitespace().next().unwrap_or("");
        if FILLER_WORDS.contains(&first.to_lowercase().as_str()) {
            label = trimmed[first.len()..].to_string();
        } else {
            label = trimmed.to_string();
            break;
        }
    }

    let keep_paren = label.contains('(');
    let label = label
        .trim_end_matches(|c: char| !c.is_alphanumeric() && !(keep_paren && c == ')'))
        .trim()
        .to_string();
    if label.is_empty() || has_digit(&label) {
        return None;
    }
    Some(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Token;
    use crate::pipeline::candidates;

    fn token_line(words: &[&str]) -> Line {
        let tokens = words
            .iter()
            .enumerate()
            .map(|(i, w)| Token::new(*w, i as f64 * 60.0, i as f64 * 60.0 + 50.0, 0.0, 12.0))
            .collect();
        Line::from_tokens(tokens, 6.0)
    }

    fn labels(words: &[&str]) -> Vec<String> {
        let lines = vec![token_line(words)];
        let scan = candidates::extract(&lines);
        attach(&scan.candidates, &lines)
            .into_iter()
            .map(|c| c.label)
            .collect()
    }

    #[test]
    fn simple_label() {
        assert_eq!(labels(&["Protein", "5.89", "g"]), vec!["Protein"]);
        assert_eq!(labels(&["Total", "Fat", "3g"]), vec!["Total Fat"]);
    }

    #[test]
    fn connectors_kept_inside_label() {
        assert_eq!(labels(&["Fat,", "total", "9.6g"]), vec!["Fat, total"]);
        assert_eq!(labels(&["-", "Saturated", "2g"]), vec!["Saturated"]);
    }

    #[test]
    fn scan_stops_at_previous_reading() {
        // Dual column row read as one line: second reading has no words of its own.
        let got = labels(&["Sodium", "120mg", "400mg"]);
        assert_eq!(got, vec!["Sodium", "Sodium"]);
        let got = labels(&["Energy", "1000kJ", "Protein", "5g"]);
        assert_eq!(got, vec!["Energy", "Protein"]);
    }

    #[test]
    fn leading_numbers_skipped_before_words() {
        assert_eq!(labels(&["Sugars", "12", "4g"]), vec!["Sugars"]);
    }

    #[test]
    fn labels_never_contain_digits() {
        assert!(labels(&["Vitamin", "B12", "2mcg"]).is_empty());
        for l in labels(&["Omega", "3g", "Iron", "2mg"]) {
            assert!(!has_digit(&l));
        }
    }

    #[test]
    fn serving_size_override() {
        let got = labels(&["Serving", "size", "1", "cup", "(30g)"]);
        assert_eq!(got, vec![SERVING_SIZE_LABEL]);
    }

    #[test]
    fn regex_candidates_have_no_label() {
        let lines = vec![Line::from_text("Protein 5.89 g")];
        let scan = candidates::extract(&lines);
        assert_eq!(scan.candidates.len(), 1);
        assert!(attach(&scan.candidates, &lines).is_empty());
    }

    #[test]
    fn cleaning_rules() {
        assert_eq!(clean_label("of which Sugars:").as_deref(), Some("Sugars"));
        assert_eq!(clean_label("- of which saturates").as_deref(), Some("saturates"));
        assert_eq!(clean_label("of which"), None);
        assert_eq!(clean_label("1. Protein").as_deref(), Some("Protein"));
        assert_eq!(clean_label("a) Dietary Fibre -").as_deref(), Some("Dietary Fibre"));
        assert_eq!(clean_label("Sugars (total):").as_deref(), Some("Sugars (total)"));
        assert_eq!(clean_label("Vitamin B6"), None);
        assert_eq!(clean_label(":-"), None);
    }
}
