//! Line rules: a declarative fallback parser over plain line text.
//!
//! Each [`LineRule`] pairs a label pattern with a value pattern and a search
//! strategy:
//!
//! * `SameLine`: the value follows the label on the same line.
//! * `NextLine`: the label stands alone and the value opens the next line.
//! * `ForwardWindow(n)`: the label stands alone and the value opens one of
//!   the next `n` lines.
//!
//! [`RULES`] is ordered. For each key the first rule that yields a value
//! wins, so a key's rules are listed from most to least specific.

use crate::output::{Confidence, NutrientKey};
use crate::pipeline::nutrients::{Reading, Readings};
use crate::pipeline::text::{has_digit, normalize_line};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    SameLine,
    NextLine,
    ForwardWindow(usize),
}

pub struct LineRule {
    pub key: NutrientKey,
    /// Matched at the start of the label line.
    pub pattern: &'static Lazy<Regex>,
    /// Captures `v` (value) and optionally `u` (unit).
    pub value: &'static Lazy<Regex>,
    pub strategy: Strategy,
    pub confidence: Confidence,
}

// ── Label patterns ───────────────────────────────────────────────────────────

static L_ENERGY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^energy\b").unwrap());
static L_CALORIES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^calories\b").unwrap());
static L_PROTEIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^protein\b").unwrap());
static L_FAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:total\s+)?fat(?:\s*,?\s*total)?\b").unwrap());
static L_CARBS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:total\s+)?(?:carbohydrates?|carbs)(?:\s*,?\s*total)?\b").unwrap()
});
static L_SUGARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:[-–]\s*)?(?:total\s+)?sugars?\b").unwrap());
static L_FIBRE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:[-–]\s*)?(?:dietary\s+)?fib(?:re|er)\b").unwrap());
static L_SODIUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^sodium\b").unwrap());

// ── Value patterns ───────────────────────────────────────────────────────────

// Energy units may sit behind the first figure: "Energy 1000kJ (239kcal)".
static V_KJ: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?P<v>\d+(?:\.\d+)?)\s*kj\b").unwrap());
static V_KCAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?P<v>\d+(?:\.\d+)?)\s*k?cal\b").unwrap());
static V_CALORIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s:]*(?P<v>\d+(?:\.\d+)?)(?:\s*k?cal\b)?(?:\s|$)").unwrap()
});
static V_GRAMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s:\-–]*<?(?P<v>\d+(?:\.\d+)?)\s*(?P<u>mg|g)\b").unwrap()
});
static V_GRAMS_OPTIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s:\-–]*<?(?P<v>\d+(?:\.\d+)?)\s*(?P<u>mg|g)?\b").unwrap()
});
static V_SODIUM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s:\-–]*<?(?P<v>\d+(?:\.\d+)?)\s*(?P<u>mg|g)\b").unwrap()
});

const fn rule(
    key: NutrientKey,
    pattern: &'static Lazy<Regex>,
    value: &'static Lazy<Regex>,
    strategy: Strategy,
    confidence: Confidence,
) -> LineRule {
    LineRule {
        key,
        pattern,
        value,
        strategy,
        confidence,
    }
}

use Confidence::{Low, Med};
use NutrientKey::*;
use Strategy::*;

pub static RULES: [LineRule; 11] = [
    rule(EnergyKj, &L_ENERGY, &V_KJ, SameLine, Med),
    rule(EnergyKcal, &L_ENERGY, &V_KCAL, SameLine, Med),
    rule(EnergyKcal, &L_CALORIES, &V_CALORIES, SameLine, Med),
    rule(ProteinG, &L_PROTEIN, &V_GRAMS, SameLine, Med),
    rule(ProteinG, &L_PROTEIN, &V_GRAMS, NextLine, Med),
    rule(ProteinG, &L_PROTEIN, &V_GRAMS, ForwardWindow(3), Low),
    rule(FatG, &L_FAT, &V_GRAMS, SameLine, Med),
    rule(CarbsG, &L_CARBS, &V_GRAMS, SameLine, Med),
    rule(SugarsG, &L_SUGARS, &V_GRAMS, SameLine, Med),
    rule(FibreG, &L_FIBRE, &V_GRAMS_OPTIONAL, SameLine, Med),
    rule(SodiumMg, &L_SODIUM, &V_SODIUM, SameLine, Med),
];

impl LineRule {
    /// Try this rule with the label on `lines[index]`.
    pub fn apply<S: AsRef<str>>(&self, lines: &[S], index: usize) -> Option<Reading> {
        let line = lines.get(index)?.as_ref().trim();
        let label = self.pattern.find(line)?;
        let rest = &line[label.end()..];
        match self.strategy {
            SameLine => self.read_value(rest),
            NextLine | ForwardWindow(_) if has_digit(rest) => None,
            NextLine => self.read_value(lines.get(index + 1)?.as_ref().trim()),
            ForwardWindow(n) => lines
                .iter()
                .skip(index + 1)
                .take(n)
                .find_map(|l| self.read_value(l.as_ref().trim())),
        }
    }

    fn read_value(&self, text: &str) -> Option<Reading> {
        let caps = self.value.captures(text)?;
        let value: f64 = caps.name("v")?.as_str().parse().ok()?;
        let unit = caps.name("u").map(|u| u.as_str().to_lowercase());
        let value = match (self.key, unit.as_deref()) {
            (SodiumMg, Some("g")) => value * 1000.0,
            (SodiumMg, _) => value,
            (_, Some("mg")) => value / 1000.0,
            _ => value,
        };
        Some(Reading {
            value,
            confidence: self.confidence,
        })
    }
}

/// Run every rule over the lines; the first hit per key wins.
pub fn parse<S: AsRef<str>>(lines: &[S]) -> Readings {
    let lines: Vec<String> = lines.iter().map(|l| normalize_line(l.as_ref())).collect();
    let mut readings = Readings::new();
    for rule in RULES.iter() {
        if readings.contains_key(&rule.key) {
            continue;
        }
        if let Some(reading) = (0..lines.len()).find_map(|i| rule.apply(&lines, i)) {
            readings.insert(rule.key, reading);
        }
    }
    debug!("Line rules matched {} nutrients", readings.len());
    readings
}
