//! Value-unit candidate extraction.
//!
//! Two modes, chosen per line by whether it carries token geometry:
//!
//! * **Token mode**: a `number+unit` token (`300mg`) yields one candidate at
//!   that token; a bare number followed by a bare unit token (`5.89` `g`)
//!   yields one candidate anchored at the number.
//! * **Regex fallback**: the same unit grammar swept across the line text.
//!   Candidates carry no token index, so they never receive a label.
//!
//! Both modes share the calories rule: when a line mentions "calories" and no
//! `cal`/`kcal` reading was captured on it, the first unclaimed number after
//! the word becomes a unit-less reading ("Calories 90").
//!
//! Percent readings are dropped at the end, unconditionally.

use crate::model::{Line, ValueUnitCandidate};
use crate::pipeline::text::{
    canonical_unit, normalize_line, normalize_token, parse_combined, parse_number,
    UNIT_ALTERNATION,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

/// Candidates of one run plus what the percent policy removed.
#[derive(Debug, Clone, Default)]
pub struct CandidateScan {
    pub candidates: Vec<ValueUnitCandidate>,
    pub raw_count: usize,
    pub percent_dropped: usize,
}

/// Extract candidates from every (already noise-filtered) line.
pub fn extract(lines: &[Line]) -> CandidateScan {
    let mut all = Vec::new();
    for (line_index, line) in lines.iter().enumerate() {
        if line.has_geometry() {
            all.extend(scan_tokens(line, line_index));
        } else {
            all.extend(scan_text(line, line_index));
        }
    }

    let raw_count = all.len();
    let candidates: Vec<ValueUnitCandidate> = all
        .into_iter()
        .filter(|c| c.unit != "%" && !c.raw.contains('%'))
        .collect();
    let percent_dropped = raw_count - candidates.len();

    debug!(
        "Found {} candidates ({} percent readings dropped)",
        candidates.len(),
        percent_dropped
    );
    CandidateScan {
        candidates,
        raw_count,
        percent_dropped,
    }
}

fn is_energy_unit(unit: &str) -> bool {
    unit == "kcal" || unit == "cal"
}

fn mentions_calories(text: &str) -> bool {
    text.to_lowercase().contains("calories")
}

// ── Token mode ───────────────────────────────────────────────────────────────

fn scan_tokens(line: &Line, line_index: usize) -> Vec<ValueUnitCandidate> {
    let norm: Vec<String> = line.tokens.iter().map(|t| normalize_token(&t.text)).collect();
    let mut claimed = vec![false; norm.len()];
    let mut out = Vec::new();

    let candidate = |raw: String, value: f64, unit: &str, index: usize| ValueUnitCandidate {
        raw,
        value,
        unit: unit.to_string(),
        line: line.text.clone(),
        line_index,
        token_index: Some(index),
    };

    for i in 0..norm.len() {
        if claimed[i] {
            continue;
        }
        if let Some((value, unit)) = parse_combined(&norm[i]) {
            out.push(candidate(norm[i].clone(), value, unit, i));
            claimed[i] = true;
            continue;
        }
        let next_unit = norm.get(i + 1).and_then(|n| canonical_unit(n));
        let Some(unit) = next_unit else { continue };
        // A lone letter O before a unit is a misread zero.
        let value = match norm[i].as_str() {
            "O" | "o" => Some(0.0),
            s => parse_number(s),
        };
        if let Some(value) = value {
            out.push(candidate(format!("{} {}", norm[i], norm[i + 1]), value, unit, i));
            claimed[i] = true;
            claimed[i + 1] = true;
        }
    }

    let has_calorie_unit = out.iter().any(|c| is_energy_unit(&c.unit));
    if mentions_calories(&line.text) && !has_calorie_unit {
        let anchor = norm
            .iter()
            .position(|t| t.to_lowercase().starts_with("calories"));
        if let Some(anchor) = anchor {
            let hit = (anchor + 1..norm.len())
                .filter(|&j| !claimed[j])
                .find_map(|j| parse_number(&norm[j]).map(|v| (j, v)));
            if let Some((j, value)) = hit {
                out.push(candidate(norm[j].clone(), value, "", j));
            }
        }
    }

    out.sort_by_key(|c| c.token_index);
    out
}

// ── Regex fallback mode ──────────────────────────────────────────────────────

static RE_VALUE_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)<?(\d+(?:\.\d+)?)\s*({UNIT_ALTERNATION})")).unwrap()
});

static RE_ANY_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

static RE_CALORIES_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)calories").unwrap());

fn glued_before(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_alphanumeric() || c == '.')
}

fn glued_after(text: &str, end: usize) -> bool {
    text[end..].chars().next().is_some_and(char::is_alphabetic)
}

fn scan_text(line: &Line, line_index: usize) -> Vec<ValueUnitCandidate> {
    let text = normalize_line(&line.text);
    let mut out = Vec::new();
    let mut spans: Vec<Range<usize>> = Vec::new();

    for caps in RE_VALUE_UNIT.captures_iter(&text) {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if glued_before(&text, whole.start()) || glued_after(&text, whole.end()) {
            continue;
        }
        let (Ok(value), Some(unit)) = (number.as_str().parse::<f64>(), canonical_unit(&caps[2]))
        else {
            continue;
        };
        spans.push(whole.range());
        out.push(ValueUnitCandidate {
            raw: whole.as_str().to_string(),
            value,
            unit: unit.to_string(),
            line: line.text.clone(),
            line_index,
            token_index: None,
        });
    }

    let has_calorie_unit = out.iter().any(|c| is_energy_unit(&c.unit));
    if !has_calorie_unit {
        if let Some(word) = RE_CALORIES_WORD.find(&text) {
            let hit = RE_ANY_NUMBER
                .find_iter(&text[word.end()..])
                .map(|m| (word.end() + m.start())..(word.end() + m.end()))
                .find(|r| {
                    !spans.iter().any(|s| s.start < r.end && r.start < s.end)
                        && !glued_before(&text, r.start)
                        && !glued_after(&text, r.end)
                });
            if let Some(range) = hit {
                if let Ok(value) = text[range.clone()].parse::<f64>() {
                    out.push(ValueUnitCandidate {
                        raw: text[range].to_string(),
                        value,
                        unit: String::new(),
                        line: line.text.clone(),
                        line_index,
                        token_index: None,
                    });
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Token;

    fn token_line(words: &[&str]) -> Line {
        let tokens = words
            .iter()
            .enumerate()
            .map(|(i, w)| Token::new(*w, i as f64 * 60.0, i as f64 * 60.0 + 50.0, 0.0, 12.0))
            .collect();
        Line::from_tokens(tokens, 6.0)
    }

    #[test]
    fn combined_token_candidate() {
        let scan = extract(&[token_line(&["Sodium", "300mg"])]);
        assert_eq!(scan.candidates.len(), 1);
        let c = &scan.candidates[0];
        assert_eq!((c.value, c.unit.as_str(), c.token_index), (300.0, "mg", Some(1)));
        assert_eq!(c.raw, "300mg");
    }

    #[test]
    fn split_number_unit_candidate_anchored_at_number() {
        let scan = extract(&[token_line(&["Protein", "5.89", "g"])]);
        assert_eq!(scan.candidates.len(), 1);
        let c = &scan.candidates[0];
        assert_eq!((c.value, c.unit.as_str(), c.token_index), (5.89, "g", Some(1)));
    }

    #[test]
    fn unitless_calories_in_token_mode() {
        let scan = extract(&[token_line(&["Calories", "90"])]);
        assert_eq!(scan.candidates.len(), 1);
        assert_eq!(scan.candidates[0].unit, "");
        assert_eq!(scan.candidates[0].value, 90.0);
        assert_eq!(scan.candidates[0].token_index, Some(1));
    }

    #[test]
    fn calories_rule_skipped_when_kcal_present() {
        let scan = extract(&[token_line(&["Calories", "90kcal", "12"])]);
        assert_eq!(scan.candidates.len(), 1);
        assert_eq!(scan.candidates[0].unit, "kcal");
    }

    #[test]
    fn percent_dropped_in_token_mode() {
        let scan = extract(&[token_line(&["Total", "Fat", "3g", "5%"])]);
        assert_eq!(scan.candidates.len(), 1);
        assert_eq!(scan.raw_count, 2);
        assert_eq!(scan.percent_dropped, 1);
        assert!(scan.candidates.iter().all(|c| c.unit != "%" && !c.raw.contains('%')));
    }

    #[test]
    fn misread_zero_before_unit() {
        let scan = extract(&[token_line(&["Trans", "Fat", "O", "g"])]);
        assert_eq!(scan.candidates.len(), 1);
        assert_eq!(scan.candidates[0].value, 0.0);
    }

    #[test]
    fn thousands_separator_in_token() {
        let scan = extract(&[token_line(&["Energy", "2,000kJ"])]);
        assert_eq!(scan.candidates[0].value, 2000.0);
        assert_eq!(scan.candidates[0].unit, "kJ");
    }

    #[test]
    fn regex_fallback_candidate() {
        let scan = extract(&[Line::from_text("Protein 5.89 g")]);
        assert_eq!(scan.candidates.len(), 1);
        let c = &scan.candidates[0];
        assert_eq!((c.value, c.unit.as_str()), (5.89, "g"));
        assert_eq!(c.token_index, None);
        assert_eq!(c.line_index, 0);
    }

    #[test]
    fn regex_fallback_calories_and_percent() {
        let scan = extract(&[
            Line::from_text("Calories 90"),
            Line::from_text("Total Fat 3g 5%"),
            Line::from_text("Sodium 1,200mg"),
        ]);
        let got: Vec<(f64, &str, usize)> = scan
            .candidates
            .iter()
            .map(|c| (c.value, c.unit.as_str(), c.line_index))
            .collect();
        assert_eq!(got, vec![(90.0, "", 0), (3.0, "g", 1), (1200.0, "mg", 2)]);
        assert_eq!(scan.percent_dropped, 1);
    }

    #[test]
    fn regex_fallback_rejects_glued_words() {
        let scan = extract(&[Line::from_text("Vitamin B12mcg 5 grams 2000 calories")]);
        assert!(scan.candidates.is_empty(), "got {:?}", scan.candidates);
    }

    #[test]
    fn regex_calories_skips_number_already_claimed() {
        let scan = extract(&[Line::from_text("Calories 380kJ 91")]);
        let units: Vec<&str> = scan.candidates.iter().map(|c| c.unit.as_str()).collect();
        assert_eq!(units, vec!["kJ", ""]);
        assert_eq!(scan.candidates[1].value, 91.0);
    }
}
