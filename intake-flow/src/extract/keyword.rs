use std::sync::LazyLock;

use regex::Regex;

use super::vocabulary::{self, BODY_PARTS};
use super::{ExtractionContext, FieldMatcher, Match};
use crate::record::FieldValue;
use crate::schema::{FieldKind, FieldSpec, Vocabulary};

/// "my knee hurts", "pain in my lower back", "sore throat"-style phrasing.
static BODY_PART_PAIN: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    let parts = BODY_PARTS.join("|");
    [
        format!(
            r"\b({parts})\s+(?:hurts|is hurting|has been hurting|aches|is aching|is sore|is painful|pain)\b"
        ),
        format!(r"\b(?:pain|ache|aching|soreness)\s+in\s+(?:my|the|his|her)\s+({parts})\b"),
        format!(r"\b(?:sore|aching|painful|hurting)\s+({parts})\b"),
        format!(r"\bhurt\s+my\s+({parts})\b"),
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid body part regex"))
    .collect()
});

pub struct KeywordMatcher;

impl FieldMatcher for KeywordMatcher {
    fn extract(&self, text: &str, field: &FieldSpec, ctx: &ExtractionContext<'_>) -> Option<Match> {
        let FieldKind::Keyword(vocab) = field.kind else {
            return None;
        };
        let lowered = text.to_lowercase();

        let mut best = vocabulary::longest_match(&lowered, vocabulary::table(vocab))
            .map(|(canonical, len)| (canonical.to_string(), len));

        if vocab == Vocabulary::Symptom {
            if let Some((symptom, len)) = body_part_pain(&lowered) {
                if best.as_ref().is_none_or(|(_, best_len)| len > *best_len) {
                    best = Some((symptom, len));
                }
            }
        }

        if let Some((canonical, _)) = best {
            return Some(Match::parsed(FieldValue::Text(canonical), 0.9));
        }

        // Short direct answers to this field's own question are taken as-is.
        if ctx.is_asking(field.name) && text.chars().count() < ctx.fallback_max_chars {
            let answer = text.trim_end_matches(['.', '!', '?', ',']).trim();
            if !answer.is_empty() {
                return Some(Match::verbatim(FieldValue::text(answer.to_lowercase()), 0.3));
            }
        }
        None
    }
}

/// Longest body-part pain phrase, as `(canonical symptom, matched length)`.
fn body_part_pain(lowered: &str) -> Option<(String, usize)> {
    BODY_PART_PAIN
        .iter()
        .filter_map(|pattern| {
            let captures = pattern.captures(lowered)?;
            let whole = captures.get(0)?;
            let part = captures.get(1)?;
            Some((vocabulary::body_part_symptom(part.as_str()), whole.len()))
        })
        .max_by_key(|(_, len)| *len)
}
