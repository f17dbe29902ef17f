//! Field extraction.
//!
//! Every schema field carries a [`FieldKind`]; each kind maps to a
//! [`FieldMatcher`] that tries to pull a typed value out of one utterance.
//! [`extract_fields`] runs the matchers for the fields a schema still needs and
//! collects whatever they find. Extraction never fails: an utterance that
//! yields nothing produces an empty [`ExtractionResult`].

pub mod datetime;
pub mod doctor;
pub mod duration;
pub mod free_text;
pub mod keyword;
pub mod severity;
pub mod treatment;
pub mod vocabulary;

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::record::{FieldValue, PartialRecord};
use crate::schema::{FieldKind, FieldSpec, RecordSchema};

/// Everything a matcher may consult besides the utterance itself.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext<'a> {
    /// Field whose question the user is answering, if any.
    pub asking: Option<&'a str>,
    /// Set when the utterance corrects values that were already confirmed once.
    pub correcting: bool,
    /// Reference point for relative dates.
    pub now: NaiveDateTime,
    /// Upper bound (exclusive) for verbatim keyword answers.
    pub fallback_max_chars: usize,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(now: NaiveDateTime, fallback_max_chars: usize) -> Self {
        Self {
            asking: None,
            correcting: false,
            now,
            fallback_max_chars,
        }
    }

    pub fn asking(mut self, field: Option<&'a str>) -> Self {
        self.asking = field;
        self
    }

    pub fn correcting(mut self, correcting: bool) -> Self {
        self.correcting = correcting;
        self
    }

    pub fn is_asking(&self, field: &str) -> bool {
        self.asking == Some(field)
    }
}

/// A value found by a matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub value: FieldValue,
    pub confidence: f32,
    /// The whole utterance was taken as the answer rather than parsed out of it.
    pub verbatim: bool,
}

impl Match {
    pub fn parsed(value: FieldValue, confidence: f32) -> Self {
        Self {
            value,
            confidence,
            verbatim: false,
        }
    }

    pub fn verbatim(value: FieldValue, confidence: f32) -> Self {
        Self {
            value,
            confidence,
            verbatim: true,
        }
    }
}

/// Extraction strategy for one [`FieldKind`].
///
/// `text` is the trimmed utterance in its original case.
pub trait FieldMatcher: Send + Sync {
    fn extract(&self, text: &str, field: &FieldSpec, ctx: &ExtractionContext<'_>) -> Option<Match>;
}

/// Matcher for a field kind. Raw-text shadows have none.
pub fn matcher_for(kind: FieldKind) -> Option<&'static dyn FieldMatcher> {
    let matcher: &'static dyn FieldMatcher = match kind {
        FieldKind::Keyword(_) => &keyword::KeywordMatcher,
        FieldKind::Scale => &severity::SeverityMatcher,
        FieldKind::Duration => &duration::DurationMatcher,
        FieldKind::FreeText => &free_text::FreeTextMatcher,
        FieldKind::DateTime => &datetime::DateTimeMatcher,
        FieldKind::Doctor => &doctor::DoctorMatcher,
        FieldKind::Dosage => &treatment::DosageMatcher,
        FieldKind::Frequency => &treatment::FrequencyMatcher,
        FieldKind::RawText => return None,
    };
    Some(matcher)
}

/// One extracted value with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extracted {
    pub value: FieldValue,
    pub confidence: f32,
}

/// Fields found in one utterance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    fields: BTreeMap<String, Extracted>,
}

impl ExtractionResult {
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue, confidence: f32) {
        self.fields.insert(name.into(), Extracted { value, confidence });
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).map(|extracted| &extracted.value)
    }

    pub fn confidence(&self, name: &str) -> Option<f32> {
        self.fields.get(name).map(|extracted| extracted.confidence)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Values ready to merge into a [`PartialRecord`].
    pub fn into_values(self) -> impl Iterator<Item = (String, FieldValue)> {
        self.fields
            .into_iter()
            .map(|(name, extracted)| (name, extracted.value))
    }
}

/// Run the matchers of `schema` over `text`.
///
/// Outside a correction pass, fields already satisfied in `known` are skipped.
/// Verbatim matches are dropped when another field's structured matcher also
/// claims the utterance, so "2 days" asked as a location is not stored as one.
pub fn extract_fields(
    schema: &RecordSchema,
    text: &str,
    known: &PartialRecord,
    ctx: &ExtractionContext<'_>,
) -> ExtractionResult {
    let mut result = ExtractionResult::default();
    let text = text.trim();
    if text.is_empty() {
        return result;
    }

    for field in schema.askable_fields() {
        if !ctx.correcting && known.satisfies(field) {
            continue;
        }
        let Some((target, found)) = extract_one(field, text, ctx) else {
            continue;
        };
        if found.verbatim && competes(schema, field, text, ctx) {
            debug!(field = field.name, "verbatim answer claimed by another field");
            continue;
        }
        result.insert(target, found.value, found.confidence);
    }

    if !result.is_empty() {
        debug!(
            record_type = %schema.record_type(),
            fields = ?result.field_names().collect::<Vec<_>>(),
            "extracted fields"
        );
    }
    result
}

/// Run the matcher of a single field. Returns the name the value should be
/// stored under: unparsed answers for a field with a text companion land in
/// the companion.
pub fn extract_one(
    field: &FieldSpec,
    text: &str,
    ctx: &ExtractionContext<'_>,
) -> Option<(&'static str, Match)> {
    let found = matcher_for(field.kind)?.extract(text, field, ctx)?;
    let target = match (&found.value, field.fallback) {
        (FieldValue::RawText(_), Some(fallback)) => fallback,
        _ => field.name,
    };
    Some((target, found))
}

/// Whether a structured matcher of some other field parses `text`.
fn competes(
    schema: &RecordSchema,
    field: &FieldSpec,
    text: &str,
    ctx: &ExtractionContext<'_>,
) -> bool {
    schema
        .askable_fields()
        .filter(|other| other.name != field.name && is_structured(other.kind))
        .any(|other| {
            let as_asked = ctx.asking(Some(other.name));
            matcher_for(other.kind)
                .and_then(|matcher| matcher.extract(text, other, &as_asked))
                .is_some_and(|found| !found.verbatim)
        })
}

fn is_structured(kind: FieldKind) -> bool {
    matches!(
        kind,
        FieldKind::Scale
            | FieldKind::Duration
            | FieldKind::DateTime
            | FieldKind::Dosage
            | FieldKind::Frequency
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{NaiveDate, NaiveDateTime};

    /// Monday 2026-10-19, 10:30.
    pub fn monday_morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::monday_morning;
    use super::*;
    use crate::schema::RecordType;

    fn ctx(asking: Option<&str>) -> ExtractionContext<'_> {
        ExtractionContext::new(monday_morning(), 40).asking(asking)
    }

    #[test]
    fn test_opening_symptom_sentence_fills_several_fields() {
        let schema = RecordSchema::for_type(RecordType::Symptom);
        let result = extract_fields(
            schema,
            "I have a headache, severity 7, lasted 2 days",
            &PartialRecord::new(),
            &ctx(None),
        );

        assert_eq!(result.get("symptom_name"), Some(&FieldValue::text("headache")));
        assert_eq!(result.get("severity"), Some(&FieldValue::Severity(7)));
        assert_eq!(result.get("duration_hours"), Some(&FieldValue::DurationHours(48)));
        assert!(!result.contains("body_location"));
    }

    #[test]
    fn test_known_fields_are_skipped_unless_correcting() {
        let schema = RecordSchema::for_type(RecordType::Symptom);
        let mut known = PartialRecord::new();
        known.set("severity", FieldValue::Severity(4));

        let result = extract_fields(schema, "severity 8", &known, &ctx(None));
        assert!(result.is_empty());

        let result = extract_fields(schema, "severity 8", &known, &ctx(None).correcting(true));
        assert_eq!(result.get("severity"), Some(&FieldValue::Severity(8)));
    }

    #[test]
    fn test_free_text_rejected_when_another_field_parses_it() {
        let schema = RecordSchema::for_type(RecordType::Symptom);
        let mut known = PartialRecord::new();
        known.set("symptom_name", FieldValue::text("headache"));

        let result = extract_fields(schema, "about 2 days", &known, &ctx(Some("body_location")));
        assert!(!result.contains("body_location"));
        assert_eq!(result.get("duration_hours"), Some(&FieldValue::DurationHours(48)));
    }

    #[test]
    fn test_unparsed_visit_time_goes_to_companion_field() {
        let schema = RecordSchema::for_type(RecordType::Appointment);
        let mut known = PartialRecord::new();
        known.set("doctor_name", FieldValue::text("Dr. Lee"));

        let result = extract_fields(
            schema,
            "sometime after the holidays",
            &known,
            &ctx(Some("visit_ts")),
        );
        assert!(!result.contains("visit_ts"));
        assert_eq!(
            result.get("visit_time_text"),
            Some(&FieldValue::RawText("sometime after the holidays".into()))
        );
    }

    #[test]
    fn test_empty_utterance_yields_nothing() {
        let schema = RecordSchema::for_type(RecordType::Treatment);
        let result = extract_fields(schema, "   ", &PartialRecord::new(), &ctx(Some("dosage")));
        assert!(result.is_empty());
    }

    #[test]
    fn test_confidence_is_reported_per_field() {
        let schema = RecordSchema::for_type(RecordType::Symptom);
        let result = extract_fields(schema, "7 out of 10", &PartialRecord::new(), &ctx(None));
        assert_eq!(result.get("severity"), Some(&FieldValue::Severity(7)));
        assert!(result.confidence("severity").unwrap() > 0.5);
    }
}
