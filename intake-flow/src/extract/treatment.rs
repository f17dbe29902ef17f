//! Dosage and frequency of a treatment.

use std::sync::LazyLock;

use regex::Regex;

use super::vocabulary::{self, NUMBER_TOKEN};
use super::{ExtractionContext, FieldMatcher, Match};
use crate::record::FieldValue;
use crate::schema::FieldSpec;

static DOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(\d+(?:\.\d+)?|{NUMBER_TOKEN}|half\s+a)\s*(mg|mcg|µg|milligrams?|grams?|g|ml|milliliters?|iu|units?|tablets?|tabs?|pills?|capsules?|caps?|puffs?|drops?|teaspoons?|tsp|tablespoons?|tbsp|patch(?:es)?|shots?)\b"
    ))
    .expect("valid dosage regex")
});

pub struct DosageMatcher;

impl FieldMatcher for DosageMatcher {
    fn extract(&self, text: &str, _field: &FieldSpec, _ctx: &ExtractionContext<'_>) -> Option<Match> {
        let lowered = text.to_lowercase();
        let captures = DOSE.captures(&lowered)?;

        let amount = match &captures[1] {
            digits if digits.starts_with(|c: char| c.is_ascii_digit()) => digits.to_string(),
            half if half.starts_with("half") => "0.5".to_string(),
            word => vocabulary::parse_count(word)?.to_string(),
        };
        let unit = normalize_unit(&captures[2]);
        Some(Match::parsed(FieldValue::Text(format!("{} {}", amount, unit)), 0.9))
    }
}

fn normalize_unit(unit: &str) -> &str {
    match unit {
        "milligram" | "milligrams" => "mg",
        "gram" | "grams" => "g",
        "milliliter" | "milliliters" => "ml",
        "µg" => "mcg",
        "tab" | "tabs" | "tablet" => "tablets",
        "pill" => "pills",
        "cap" | "caps" | "capsule" => "capsules",
        "puff" => "puffs",
        "drop" => "drops",
        "unit" => "units",
        "tsp" | "teaspoon" => "teaspoons",
        "tbsp" | "tablespoon" => "tablespoons",
        "patch" => "patches",
        "shot" => "shots",
        other => other,
    }
}

/// Tried in order; the canonical text is either fixed or the lowercased match.
static FREQUENCY_RULES: LazyLock<Vec<(Regex, Option<&'static str>)>> = LazyLock::new(|| {
    let rules: [(&str, Option<&'static str>); 9] = [
        (
            r"\b(?:once|twice|three\s+times|four\s+times|\d+\s+times|\d+x)\s+(?:a|per|each)\s+(?:day|week|month)\b",
            None,
        ),
        (r"\bevery\s+(?:\d+|two|three|four|six|eight|twelve)\s+(?:hours?|days?)\b", None),
        (r"\bevery\s+(?:morning|evening|night|day|other\s+day)\b", None),
        (r"\b(?:daily|nightly|weekly|monthly|hourly)\b", None),
        (r"\b(?:as\s+needed|when\s+needed|if\s+needed|prn)\b", Some("as needed")),
        (r"\b(?:at\s+night|before\s+bed|at\s+bedtime)\b", Some("at night")),
        (r"\bin\s+the\s+morning\b", Some("in the morning")),
        (r"\bwith\s+(?:meals|food)\b", Some("with meals")),
        (r"\b(?:just\s+)?once\b", Some("once")),
    ];
    rules
        .into_iter()
        .map(|(pattern, canonical)| (Regex::new(pattern).expect("valid frequency regex"), canonical))
        .collect()
});

pub struct FrequencyMatcher;

impl FieldMatcher for FrequencyMatcher {
    fn extract(&self, text: &str, _field: &FieldSpec, _ctx: &ExtractionContext<'_>) -> Option<Match> {
        let lowered = text.to_lowercase();
        FREQUENCY_RULES.iter().find_map(|(regex, canonical)| {
            let found = regex.find(&lowered)?;
            let value = match canonical {
                Some(canonical) => canonical.to_string(),
                None => collapse_whitespace(found.as_str()),
            };
            Some(Match::parsed(FieldValue::Text(value), 0.85))
        })
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
