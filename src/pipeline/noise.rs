//! Noise classification: flag whole lines that are label boilerplate.
//!
//! Two independent predicates run on the normalised line text:
//!
//! * **Daily-value noise**: %DV tables and their footnotes. The product does
//!   not model Daily Value percentages at all, so these lines carry nothing
//!   worth extracting.
//! * **Header noise**: column headers ("Avg Quantity per 100g") and bare
//!   section headings ("Nutrition Facts").
//!
//! Flagged lines are removed from candidate extraction and from the `lines`
//! output. Percent readings on surviving lines are dropped separately by the
//! candidate extractor.

use crate::output::NoiseReason;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_DAILY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)daily\s+values?|percent\s+daily|caloric\s+needs|calories\s+per\s+gram|less\s+than",
    )
    .unwrap()
});

// "Calories: 2000 2500" heads the DV footnote table.
static RE_CALORIES_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bcalories\s*:\s*\d+\s+\d+").unwrap());

static RE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bav(?:g|erage)\.?\s+quantity|\bper\s*100\s*(?:g|ml)?\b").unwrap()
});

const SECTION_HEADINGS: &[&str] = &[
    "nutrition facts",
    "nutrition information",
    "nutritional information",
    "nutrition facts panel",
];

/// Line mentions a Daily Value table, its footnote, or its calorie header.
pub fn is_daily_value_noise(line: &str) -> bool {
    RE_DAILY_VALUE.is_match(line) || RE_CALORIES_TABLE.is_match(line)
}

/// Line is a column header or exactly a section heading.
pub fn is_header_noise(line: &str) -> bool {
    if RE_HEADER.is_match(line) {
        return true;
    }
    let key = line
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    SECTION_HEADINGS.contains(&key.as_str())
}

/// Why `line` (already normalised) should be dropped, if at all.
pub fn classify(line: &str) -> Option<NoiseReason> {
    if is_daily_value_noise(line) {
        Some(NoiseReason::DailyValue)
    } else if is_header_noise(line) {
        Some(NoiseReason::Header)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_value_lines() {
        assert!(is_daily_value_noise("% Daily Value*"));
        assert!(is_daily_value_noise("*Percent Daily Values are based on a 2000 calorie diet"));
        assert!(is_daily_value_noise("depending on your caloric needs"));
        assert!(is_daily_value_noise("Calories per gram: Fat 9 Carbohydrate 4"));
        assert!(is_daily_value_noise("Calories: 2000 2500"));
        assert!(is_daily_value_noise("Total Fat Less than 65g 80g"));
    }

    #[test]
    fn nutrient_rows_are_not_daily_value_noise() {
        assert!(!is_daily_value_noise("Calories 90"));
        assert!(!is_daily_value_noise("Calories: 90"));
        assert!(!is_daily_value_noise("Total Fat 3g 5%"));
        assert!(!is_daily_value_noise("Sodium 300mg"));
    }

    #[test]
    fn header_lines() {
        assert!(is_header_noise("Avg Quantity per Serving Avg Quantity per 100g"));
        assert!(is_header_noise("Average Quantity"));
        assert!(is_header_noise("Per 100g"));
        assert!(is_header_noise("Nutrition Facts"));
        assert!(is_header_noise("NUTRITION INFORMATION:"));
    }

    #[test]
    fn rows_containing_heading_words_survive() {
        assert!(!is_header_noise("Nutrition Facts Serving size 30g"));
        assert!(!is_header_noise("Protein 5g"));
        assert!(!is_header_noise("Sodium 1000mg"));
    }

    #[test]
    fn classify_reports_reason() {
        assert_eq!(classify("% Daily Value"), Some(NoiseReason::DailyValue));
        assert_eq!(classify("Nutrition Facts"), Some(NoiseReason::Header));
        assert_eq!(classify("Protein 5.89 g"), None);
    }
}
