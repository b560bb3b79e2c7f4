//! Serving metadata: serving size and servings per pack, read from line text.

use crate::output::{Quantity, ServingMeta};
use crate::pipeline::text::normalize_line;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_SERVING_SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)serving\s+size\b.*?(\d+(?:\.\d+)?)\s*(g|ml)\b").unwrap()
});

static RE_SERVING_SIZE_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)serving\s+size\s*:?\s*(\d+(?:\.\d+)?)").unwrap());

static RE_SERVINGS_PER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)servings?\s+per\s+(?:package|pack|container)\b\D*?(\d+(?:\.\d+)?)").unwrap()
});

static RE_N_SERVINGS_PER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s+servings?\s+per\s+(?:package|pack|container)\b").unwrap()
});

/// Resolve serving metadata from raw line texts; first match of each wins.
pub fn resolve<'a>(lines: impl IntoIterator<Item = &'a str>) -> ServingMeta {
    let lines: Vec<String> = lines.into_iter().map(normalize_line).collect();

    let serving_size = lines
        .iter()
        .find_map(|l| {
            let caps = RE_SERVING_SIZE.captures(l)?;
            Some(Quantity {
                value: caps[1].parse().ok()?,
                unit: caps[2].to_lowercase(),
            })
        })
        .or_else(|| {
            lines.iter().find_map(|l| {
                let caps = RE_SERVING_SIZE_BARE.captures(l)?;
                Some(Quantity {
                    value: caps[1].parse().ok()?,
                    unit: String::new(),
                })
            })
        });

    let servings_per_pack = lines.iter().find_map(|l| {
        RE_SERVINGS_PER
            .captures(l)
            .or_else(|| RE_N_SERVINGS_PER.captures(l))
            .and_then(|caps| caps[1].parse().ok())
    });

    ServingMeta {
        serving_size,
        servings_per_pack,
    }
}
