//! Text normalisation shared by every stage: thousands separators, the
//! `O mg` typo, and the unit grammar.
//!
//! Units are matched case-insensitively and returned in one canonical
//! spelling: `kJ`, `kcal`, `cal`, `mg`, `g`, `kg`, `mcg`, `ml`, `%`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Alternation of every unit spelling, longest-first where prefixes collide.
pub(crate) const UNIT_ALTERNATION: &str = r"mcg|µg|ug|mg|kg|kj|kcal|cal|ml|g|%";

/// Normalise a whole line before noise classification and matching.
pub fn normalize_line(line: &str) -> String {
    fix_zero_typo(&strip_thousands(line))
}

/// Remove thousands separators: `2,000` → `2000`.
///
/// A comma is only dropped when it sits between a digit and exactly three
/// digits, so `1,5` or `12,3456` are left untouched.
pub fn strip_thousands(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ',' && i > 0 && chars[i - 1].is_ascii_digit() {
            let next3 = chars.get(i + 1..i + 4);
            let after = chars.get(i + 4);
            let three_digits = next3.is_some_and(|d| d.iter().all(char::is_ascii_digit));
            let then_stop = after.is_none_or(|c| !c.is_ascii_digit());
            if three_digits && then_stop {
                continue;
            }
        }
        out.push(c);
    }
    out
}

static RE_ZERO_TYPO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[\s(])[Oo]\s?(mg|g)\b").unwrap());

/// OCR reads a printed zero as the letter O: `"O mg"` / `"Og"` → `"0mg"` / `"0g"`.
pub fn fix_zero_typo(s: &str) -> String {
    RE_ZERO_TYPO.replace_all(s, "${1}0${2}").into_owned()
}

/// Canonical spelling of a unit, or `None` if `raw` is not a unit.
pub fn canonical_unit(raw: &str) -> Option<&'static str> {
    let lower = raw.trim().to_lowercase();
    let unit = match lower.as_str() {
        "mg" => "mg",
        "g" => "g",
        "kg" => "kg",
        "mcg" | "µg" | "ug" => "mcg",
        "kj" => "kJ",
        "kcal" => "kcal",
        "cal" => "cal",
        "ml" => "ml",
        "%" => "%",
        _ => return None,
    };
    Some(unit)
}

/// Strip brackets and list punctuation around a token: `(239kcal)` → `239kcal`.
pub fn trim_token(text: &str) -> &str {
    text.trim_matches(|c: char| "()[]{},;:*".contains(c))
}

static RE_COMBINED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^<?(\d+(?:\.\d+)?)\s*({UNIT_ALTERNATION})$"
    ))
    .unwrap()
});

static RE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<?(\d+(?:\.\d+)?)$").unwrap());

/// Normalise one token's text for matching.
pub fn normalize_token(text: &str) -> String {
    let trimmed = trim_token(text);
    let s = strip_thousands(trimmed);
    match s.as_str() {
        "Omg" | "omg" => "0mg".to_string(),
        "Og" | "og" => "0g".to_string(),
        _ => s,
    }
}

/// A `number+unit` token such as `300mg` or `<1g`.
pub fn parse_combined(token: &str) -> Option<(f64, &'static str)> {
    let caps = RE_COMBINED.captures(token)?;
    let value = caps[1].parse().ok()?;
    Some((value, canonical_unit(&caps[2])?))
}

/// A bare number token such as `90` or `5.89`.
pub fn parse_number(token: &str) -> Option<f64> {
    RE_NUMBER.captures(token)?[1].parse().ok()
}

pub fn has_digit(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
}

/// Trim, collapse internal whitespace, lower-case.
pub fn normalize_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A token that reads as part of a label phrase.
pub fn is_word_like(token: &str) -> bool {
    let t = trim_token(token);
    t.chars().any(char::is_alphabetic)
        && canonical_unit(t).is_none()
        && parse_combined(&normalize_token(t)).is_none()
}

/// Punctuation allowed inside a label phrase.
pub fn is_connector(token: &str) -> bool {
    matches!(token, "," | "-" | "–" | "—" | ":" | "/" | "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_separator_removed() {
        assert_eq!(strip_thousands("Energy 2,000kJ"), "Energy 2000kJ");
        assert_eq!(strip_thousands("1,234,567"), "1234567");
    }

    #[test]
    fn decimal_like_commas_kept() {
        assert_eq!(strip_thousands("1,5g"), "1,5g");
        assert_eq!(strip_thousands("12,3456"), "12,3456");
        assert_eq!(strip_thousands("Fat, total"), "Fat, total");
    }

    #[test]
    fn zero_typo_fixed() {
        assert_eq!(fix_zero_typo("Trans Fat O mg"), "Trans Fat 0mg");
        assert_eq!(fix_zero_typo("Sugars Og"), "Sugars 0g");
        assert_eq!(fix_zero_typo("Omega 3"), "Omega 3");
    }

    #[test]
    fn unit_spellings() {
        assert_eq!(canonical_unit("KJ"), Some("kJ"));
        assert_eq!(canonical_unit("Kcal"), Some("kcal"));
        assert_eq!(canonical_unit("µg"), Some("mcg"));
        assert_eq!(canonical_unit("ug"), Some("mcg"));
        assert_eq!(canonical_unit("MG"), Some("mg"));
        assert_eq!(canonical_unit("grams"), None);
    }

    #[test]
    fn combined_and_bare_tokens() {
        assert_eq!(parse_combined("300mg"), Some((300.0, "mg")));
        assert_eq!(parse_combined("5.89g"), Some((5.89, "g")));
        assert_eq!(parse_combined("<1g"), Some((1.0, "g")));
        assert_eq!(parse_combined("1000KJ"), Some((1000.0, "kJ")));
        assert_eq!(parse_combined("12%"), Some((12.0, "%")));
        assert_eq!(parse_combined("300"), None);
        assert_eq!(parse_number("90"), Some(90.0));
        assert_eq!(parse_number("5.89"), Some(5.89));
        assert_eq!(parse_number("5g"), None);
    }

    #[test]
    fn token_normalisation() {
        assert_eq!(normalize_token("(239kcal)"), "239kcal");
        assert_eq!(normalize_token("2,000"), "2000");
        assert_eq!(normalize_token("Omg"), "0mg");
    }

    #[test]
    fn word_like_tokens() {
        assert!(is_word_like("Protein"));
        assert!(is_word_like("Fat,"));
        assert!(!is_word_like("mg"));
        assert!(!is_word_like("300mg"));
        assert!(!is_word_like("12"));
        assert!(is_connector("-"));
    }

    #[test]
    fn key_normalisation() {
        assert_eq!(normalize_key("  Total   Fat "), "total fat");
    }
}
