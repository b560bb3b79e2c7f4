//! Row grouping: one [`LabelRow`] per distinct label.
//!
//! The same printed number is often read twice in slightly different forms.
//! Readings are grouped by normalised label and ranked by
//! `(line_index, unit_rank, |value|)`; the minimum becomes the row's
//! `primary`. For energy the bare calorie count is the commonly printed
//! form, so "calories" ranks the unit-less reading first; every other label
//! prefers absolute mass units.

use crate::model::{LabelRow, LabeledCandidate};
use crate::pipeline::text::{has_digit, normalize_key};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Group keys that are headings rather than nutrients.
const NON_DATA_HEADINGS: &[&str] = &[
    "nutrition facts",
    "nutrition information",
    "nutritional information",
    "amount per serving",
    "amount per serve",
    "per serving",
    "per serve",
    "avg quantity",
    "average quantity",
    "quantity per serving",
    "daily value",
    "% daily value",
];

/// Priority of a unit for a given label key; lower wins.
pub fn unit_rank(label_key: &str, unit: &str) -> u8 {
    if label_key == "calories" {
        return match unit {
            "" => 0,
            "kcal" => 1,
            "cal" => 2,
            _ => 3,
        };
    }
    match unit {
        "mg" => 0,
        "g" => 1,
        "kJ" => 2,
        "kcal" => 3,
        "cal" => 4,
        "ml" => 5,
        "" => 6,
        _ => 7,
    }
}

fn is_discarded_key(key: &str) -> bool {
    key.is_empty()
        || has_digit(key)
        || !key.chars().any(char::is_alphanumeric)
        || NON_DATA_HEADINGS.contains(&key)
}

fn rank(key: &str, a: &LabeledCandidate, b: &LabeledCandidate) -> Ordering {
    let (a, b) = (&a.candidate, &b.candidate);
    a.line_index
        .cmp(&b.line_index)
        .then(unit_rank(key, &a.unit).cmp(&unit_rank(key, &b.unit)))
        .then(a.value.abs().total_cmp(&b.value.abs()))
        .then(a.token_index.cmp(&b.token_index))
}

/// Group labelled readings into rows, ordered by where their primary sits.
pub fn group(labeled: &[LabeledCandidate]) -> Vec<LabelRow> {
    let mut groups: BTreeMap<String, Vec<&LabeledCandidate>> = BTreeMap::new();
    for c in labeled {
        let key = normalize_key(&c.label);
        if is_discarded_key(&key) {
            continue;
        }
        groups.entry(key).or_default().push(c);
    }

    let mut rows: Vec<LabelRow> = groups
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by(|a, b| rank(&key, a, b));
            let primary = members[0].clone();
            let alternates = members[1..].iter().map(|c| (*c).clone()).collect();
            LabelRow {
                label: primary.label.clone(),
                key,
                primary,
                alternates,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        let (a, b) = (&a.primary.candidate, &b.primary.candidate);
        a.line_index
            .cmp(&b.line_index)
            .then(a.token_index.cmp(&b.token_index))
    });
    debug!("Grouped {} labelled readings into {} rows", labeled.len(), rows.len());
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValueUnitCandidate;

    fn lc(label: &str, value: f64, unit: &str, line_index: usize, token_index: usize) -> LabeledCandidate {
        LabeledCandidate {
            candidate: ValueUnitCandidate {
                raw: format!("{value}{unit}"),
                value,
                unit: unit.to_string(),
                line: String::new(),
                line_index,
                token_index: Some(token_index),
            },
            label: label.to_string(),
        }
    }

    #[test]
    fn unit_rank_tables() {
        assert!(unit_rank("calories", "") < unit_rank("calories", "kcal"));
        assert!(unit_rank("calories", "kcal") < unit_rank("calories", "cal"));
        assert!(unit_rank("sodium", "mg") < unit_rank("sodium", "g"));
        assert!(unit_rank("energy", "kJ") < unit_rank("energy", "kcal"));
        assert!(unit_rank("fat", "ml") < unit_rank("fat", ""));
        assert!(unit_rank("fat", "") < unit_rank("fat", "mcg"));
    }

    #[test]
    fn groups_by_normalised_label() {
        let rows = group(&[
            lc("Total  Fat", 3.0, "g", 0, 2),
            lc("total fat", 5.0, "g", 0, 3),
            lc("Sodium", 300.0, "mg", 1, 1),
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "total fat");
        assert_eq!(rows[0].primary.candidate.value, 3.0);
        assert_eq!(rows[0].alternates.len(), 1);
        assert_eq!(rows[1].label, "Sodium");
    }

    #[test]
    fn earlier_line_beats_unit_rank() {
        let rows = group(&[lc("Sodium", 0.3, "g", 2, 1), lc("Sodium", 300.0, "mg", 3, 1)]);
        assert_eq!(rows[0].primary.candidate.unit, "g");
    }

    #[test]
    fn calories_prefers_unitless() {
        let rows = group(&[lc("Calories", 90.0, "kcal", 0, 1), lc("Calories", 90.0, "", 0, 2)]);
        assert_eq!(rows[0].primary.candidate.unit, "");
    }

    #[test]
    fn smaller_magnitude_breaks_unit_ties() {
        let rows = group(&[lc("Protein", 12.0, "g", 0, 1), lc("Protein", 5.0, "g", 0, 3)]);
        assert_eq!(rows[0].primary.candidate.value, 5.0);
    }

    #[test]
    fn headings_and_digit_keys_discarded() {
        let rows = group(&[
            lc("Nutrition Facts", 1.0, "g", 0, 1),
            lc("Amount per serving", 2.0, "g", 0, 1),
            lc("---", 2.0, "g", 0, 1),
            lc("Fibre", 2.0, "g", 1, 1),
        ]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "fibre");
    }

    #[test]
    fn primary_selection_is_deterministic() {
        let input = vec![
            lc("Energy", 1000.0, "kJ", 1, 1),
            lc("Energy", 239.0, "kcal", 1, 2),
            lc("Energy", 1667.0, "kJ", 1, 3),
            lc("Energy", 398.0, "kcal", 1, 4),
        ];
        let first = group(&input);
        let mut reversed = input.clone();
        reversed.reverse();
        for _ in 0..5 {
            assert_eq!(group(&input), first);
            assert_eq!(group(&reversed)[0].primary, first[0].primary);
        }
        assert_eq!(first[0].primary.candidate.value, 1000.0);
    }
}
