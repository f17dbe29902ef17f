use std::sync::LazyLock;

use regex::Regex;

use super::vocabulary::{self, NUMBER_TOKEN};
use super::{ExtractionContext, FieldMatcher, Match};
use crate::record::FieldValue;
use crate::schema::FieldSpec;

enum Rule {
    /// Count followed by a unit; the count is multiplied by the given hours.
    PerUnit(Regex, u32),
    /// Fixed phrase with a fixed number of hours.
    Idiom(Regex, u32),
}

/// Tried in order; the first rule that matches wins.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let per_unit = |unit: &str, hours: u32| {
        let pattern = format!(r"\b({NUMBER_TOKEN})\s*{unit}\b");
        Rule::PerUnit(Regex::new(&pattern).expect("valid duration regex"), hours)
    };
    let idiom = |phrase: &str, hours: u32| {
        Rule::Idiom(
            Regex::new(&format!(r"\b{phrase}\b")).expect("valid duration idiom regex"),
            hours,
        )
    };

    [
        per_unit(r"(?:hours?|hrs?)", 1),
        per_unit(r"days?", 24),
        per_unit(r"weeks?", 168),
        idiom(r"all\s+day", 24),
        idiom(r"(?:a\s+)?few\s+hours", 3),
        idiom(r"since\s+this\s+morning", 8),
        idiom(r"since\s+yesterday", 24),
        idiom(r"since\s+last\s+night", 12),
        idiom(r"(?:a\s+)?couple\s+(?:of\s+)?days", 48),
    ]
    .into_iter()
    .collect()
});

/// Duration normalised to whole hours.
pub struct DurationMatcher;

impl FieldMatcher for DurationMatcher {
    fn extract(&self, text: &str, _field: &FieldSpec, _ctx: &ExtractionContext<'_>) -> Option<Match> {
        let lowered = text.to_lowercase();
        RULES.iter().find_map(|rule| match rule {
            Rule::PerUnit(regex, hours) => {
                let captures = regex.captures(&lowered)?;
                let count = vocabulary::parse_count(&captures[1])?;
                let total = count.checked_mul(*hours)?;
                Some(Match::parsed(FieldValue::DurationHours(total), 0.9))
            }
            Rule::Idiom(regex, hours) => regex
                .is_match(&lowered)
                .then(|| Match::parsed(FieldValue::DurationHours(*hours), 0.7)),
        })
    }
}
