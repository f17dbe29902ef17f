use std::sync::LazyLock;

use regex::Regex;

use super::vocabulary;
use super::{ExtractionContext, FieldMatcher, Match};
use crate::record::FieldValue;
use crate::schema::FieldSpec;

static RATIO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(?:out\s+of|/)\s*(\d+(?:\.\d+)?)").expect("valid ratio regex")
});

static EXPLICIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:severity|pain\s+level|pain\s+is|rated|rate\s+it|rating)\s*(?:is|of|at|about|around|:|=)?\s*(?:a\s+)?(\d{1,2})\b",
    )
    .expect("valid explicit severity regex")
});

/// A number that is not immediately followed by a time unit.
static BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2}|one|two|three|four|five|six|seven|eight|nine|ten)\b(\s*(?:hours?|hrs?|days?|weeks?|months?|years?|mg|ml|am|pm)\b)?")
        .expect("valid bare number regex")
});

/// A correction that is nothing but a number, e.g. "no, 5" or "actually 8".
static CORRECTION_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:no|nope|actually|it'?s|it\s+was|more\s+like|make\s+it|[\s,.!])*(\d{1,2})[\s.!]*$")
        .expect("valid correction regex")
});

/// Severity on a 1-10 scale.
pub struct SeverityMatcher;

impl FieldMatcher for SeverityMatcher {
    fn extract(&self, text: &str, field: &FieldSpec, ctx: &ExtractionContext<'_>) -> Option<Match> {
        let lowered = text.to_lowercase();

        if let Some(captures) = RATIO.captures(&lowered) {
            let score: f64 = captures[1].parse().ok()?;
            let scale: f64 = captures[2].parse().ok()?;
            if let Some(value) = (scale > 0.0).then(|| scaled(score / scale * 10.0)).flatten() {
                return Some(Match::parsed(value, 0.95));
            }
        }

        if let Some(captures) = EXPLICIT.captures(&lowered) {
            if let Some(value) = in_range(&captures[1]) {
                return Some(Match::parsed(value, 0.9));
            }
        }

        if ctx.is_asking(field.name) {
            if let Some(value) = bare_number(&lowered).or_else(|| descriptive(&lowered)) {
                return Some(Match::parsed(value, 0.7));
            }
        }

        if ctx.correcting {
            if let Some(captures) = CORRECTION_ONLY.captures(&lowered) {
                if let Some(value) = in_range(&captures[1]) {
                    return Some(Match::parsed(value, 0.7));
                }
            }
        }

        None
    }
}

/// `None` for ratios that overflow to infinity or NaN.
fn scaled(raw: f64) -> Option<FieldValue> {
    raw.is_finite()
        .then(|| FieldValue::Severity(raw.round().clamp(1.0, 10.0) as u8))
}

fn in_range(token: &str) -> Option<FieldValue> {
    let value = vocabulary::parse_count(token)?;
    (1..=10)
        .contains(&value)
        .then_some(FieldValue::Severity(value as u8))
}

fn bare_number(lowered: &str) -> Option<FieldValue> {
    BARE.captures_iter(lowered)
        .filter(|captures| captures.get(2).is_none())
        .find_map(|captures| in_range(&captures[1]))
}

/// Word answers to the severity question.
fn descriptive(lowered: &str) -> Option<FieldValue> {
    const LEVELS: &[(&str, u8)] = &[
        ("unbearable", 10),
        ("excruciating", 10),
        ("very bad", 8),
        ("severe", 8),
        ("bad", 6),
        ("moderate", 5),
        ("mild", 3),
        ("slight", 2),
    ];
    LEVELS
        .iter()
        .find(|(word, _)| vocabulary::contains_phrase(lowered, word))
        .map(|(_, level)| FieldValue::Severity(*level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::test_support::monday_morning;
    use crate::schema::{RecordSchema, RecordType};

    fn severity(text: &str, asking: bool, correcting: bool) -> Option<FieldValue> {
        let field = RecordSchema::for_type(RecordType::Symptom)
            .field("severity")
            .unwrap();
        let ctx = ExtractionContext::new(monday_morning(), 40)
            .asking(asking.then_some("severity"))
            .correcting(correcting);
        SeverityMatcher.extract(text, field, &ctx).map(|found| found.value)
    }

    #[test]
    fn test_ratio_forms_are_scaled_to_ten() {
        assert_eq!(severity("7 out of 10", false, false), Some(FieldValue::Severity(7)));
        assert_eq!(severity("3/5", false, false), Some(FieldValue::Severity(6)));
        assert_eq!(severity("maybe 2 out of 5", false, false), Some(FieldValue::Severity(4)));
    }

    #[test]
    fn test_overflowing_ratio_is_ignored() {
        let huge = "9".repeat(400);
        assert_eq!(severity(&format!("{huge} out of {huge}"), false, false), None);
        assert_eq!(severity(&format!("{huge}/3"), false, false), None);
        assert_eq!(severity("500 out of 10", false, false), Some(FieldValue::Severity(10)));
    }

    #[test]
    fn test_ratio_is_clamped() {
        assert_eq!(severity("12/10", false, false), Some(FieldValue::Severity(10)));
        assert_eq!(severity("0 out of 10", false, false), Some(FieldValue::Severity(1)));
        assert_eq!(severity("3/0", false, false), None);
    }

    #[test]
    fn test_explicit_severity() {
        assert_eq!(severity("severity 7", false, false), Some(FieldValue::Severity(7)));
        assert_eq!(severity("pain level is 4", false, false), Some(FieldValue::Severity(4)));
        assert_eq!(severity("I'd rate it a 9", false, false), Some(FieldValue::Severity(9)));
    }

    #[test]
    fn test_bare_number_needs_context() {
        assert_eq!(severity("6", false, false), None);
        assert_eq!(severity("6", true, false), Some(FieldValue::Severity(6)));
        assert_eq!(severity("about a six", true, false), Some(FieldValue::Severity(6)));
        assert_eq!(severity("2 days", true, false), None);
        assert_eq!(severity("no, 5", false, true), Some(FieldValue::Severity(5)));
    }

    #[test]
    fn test_descriptive_answer_when_asked() {
        assert_eq!(severity("pretty mild", true, false), Some(FieldValue::Severity(3)));
        assert_eq!(severity("pretty mild", false, false), None);
    }
}
