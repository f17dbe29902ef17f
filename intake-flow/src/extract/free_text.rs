use super::vocabulary::DECLINES;
use super::{ExtractionContext, FieldMatcher, Match};
use crate::record::FieldValue;
use crate::schema::FieldSpec;

/// Answers to open questions (location, purpose, notes). Only the field being
/// asked can take free text, and a decline such as "none" leaves it empty.
pub struct FreeTextMatcher;

impl FieldMatcher for FreeTextMatcher {
    fn extract(&self, text: &str, field: &FieldSpec, ctx: &ExtractionContext<'_>) -> Option<Match> {
        if !ctx.is_asking(field.name) {
            return None;
        }
        let answer = text.trim();
        let normalized = answer.trim_end_matches(['.', '!']).to_lowercase();
        if answer.chars().count() <= 2 || DECLINES.contains(&normalized.as_str()) {
            return None;
        }
        Some(Match::verbatim(FieldValue::text(answer), 0.6))
    }
}
