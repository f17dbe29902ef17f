use std::sync::LazyLock;

use regex::Regex;

use super::vocabulary::WEEKDAYS;
use super::{ExtractionContext, FieldMatcher, Match};
use crate::record::FieldValue;
use crate::schema::FieldSpec;

static TITLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:dr\.?|doctor)\s+([a-z][a-z'\-]*)(?:\s+([a-z][a-z'\-]*))?")
        .expect("valid doctor regex")
});

/// Words that can follow "doctor" without being a name.
const NOT_NAMES: &[&str] = &[
    "appointment", "visit", "checkup", "check", "office", "today", "tomorrow", "tonight", "at",
    "on", "in", "for", "about", "next", "this", "is", "was", "and", "to", "said", "says", "told",
    "wants", "the", "my", "a", "an", "after", "before", "soon", "later", "again",
];

/// "dr smith", "Dr. Jane Doe", "doctor patel" → "Dr. Smith".
pub struct DoctorMatcher;

impl FieldMatcher for DoctorMatcher {
    fn extract(&self, text: &str, field: &FieldSpec, ctx: &ExtractionContext<'_>) -> Option<Match> {
        let lowered = text.to_lowercase();

        for captures in TITLED.captures_iter(&lowered) {
            let Some(first) = captures.get(1).map(|m| m.as_str()).filter(|w| is_name(w)) else {
                continue;
            };
            let mut name = vec![first];
            if let Some(second) = captures.get(2).map(|m| m.as_str()).filter(|w| is_name(w)) {
                name.push(second);
            }
            return Some(Match::parsed(FieldValue::Text(titled(&name)), 0.9));
        }

        // A bare name given in answer to "Which doctor?".
        if ctx.is_asking(field.name) {
            let words: Vec<&str> = lowered
                .trim_end_matches(['.', '!', '?'])
                .split_whitespace()
                .collect();
            let plausible = (1..=3).contains(&words.len())
                && words
                    .iter()
                    .all(|w| is_name(w) && w.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-'));
            if plausible {
                return Some(Match::verbatim(FieldValue::Text(titled(&words)), 0.5));
            }
        }
        None
    }
}

fn is_name(word: &str) -> bool {
    !NOT_NAMES.contains(&word) && !WEEKDAYS.contains(&word)
}

fn titled(words: &[&str]) -> String {
    let name: Vec<String> = words.iter().map(|word| capitalize(word)).collect();
    format!("Dr. {}", name.join(" "))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
