//! Picks the single next question for a partial record.

use serde::{Deserialize, Serialize};

use crate::record::{FieldValue, PartialRecord};
use crate::schema::{FieldSpec, RecordSchema};

/// Fields whose questions have already been posed, in the order they were asked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldsAsked(Vec<String>);

impl FieldsAsked {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the field was already recorded.
    pub fn insert(&mut self, field: &str) -> bool {
        if self.contains(field) {
            return false;
        }
        self.0.push(field.to_string());
        true
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|asked| asked == field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// How many of the asked fields are optional in `schema`.
    pub fn optional_count(&self, schema: &RecordSchema) -> usize {
        self.iter().filter(|field| schema.is_optional(field)).count()
    }
}

/// A question ready to be sent to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub field: &'static str,
    pub text: String,
}

/// Next field to ask about: the first required field that is neither filled
/// nor asked, then optional fields while fewer than `optional_cap` have been asked.
pub fn next_field<'s>(
    schema: &'s RecordSchema,
    record: &PartialRecord,
    asked: &FieldsAsked,
    optional_cap: usize,
) -> Option<&'s FieldSpec> {
    let eligible = |field: &&FieldSpec| !record.satisfies(field) && !asked.contains(field.name);

    if let Some(field) = schema.required().iter().find(eligible) {
        return Some(field);
    }
    if asked.optional_count(schema) >= optional_cap {
        return None;
    }
    schema.optional().iter().find(eligible)
}

pub fn next_question(
    schema: &RecordSchema,
    record: &PartialRecord,
    asked: &FieldsAsked,
    optional_cap: usize,
) -> Option<Question> {
    next_field(schema, record, asked, optional_cap).map(|field| Question {
        field: field.name,
        text: render(field.question, schema, record),
    })
}

/// Fill `{field}` placeholders from `record`; unknown fields render as their
/// generic name and undeclared ones are left as written.
pub fn render(template: &str, schema: &RecordSchema, record: &PartialRecord) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|offset| open + offset) else {
            break;
        };
        rendered.push_str(&rest[..open]);
        let name = &rest[open + 1..close];
        match (record.get(name), schema.field(name)) {
            (Some(value), _) => rendered.push_str(&inline(value)),
            (None, Some(field)) => rendered.push_str(field.generic_name),
            (None, None) => rendered.push_str(&rest[open..=close]),
        }
        rest = &rest[close + 1..];
    }
    rendered.push_str(rest);
    rendered
}

/// Whether every placeholder in `template` has a value in `record`.
pub fn placeholders_filled(template: &str, record: &PartialRecord) -> bool {
    template
        .split('{')
        .skip(1)
        .filter_map(|part| part.split_once('}').map(|(name, _)| name))
        .all(|name| record.contains(name))
}

/// Values inside a sentence keep their own case: "your headache", "Dr. Smith".
fn inline(value: &FieldValue) -> String {
    match value.as_text() {
        Some(text) => text.to_string(),
        None => value.display(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RecordType;

    #[test]
    fn test_required_fields_come_first_in_order() {
        let schema = RecordSchema::for_type(RecordType::Symptom);
        let record = PartialRecord::new();
        let field = next_field(schema, &record, &FieldsAsked::new(), 2).unwrap();
        assert_eq!(field.name, "symptom_name");
    }

    #[test]
    fn test_never_repeats_an_asked_field() {
        let schema = RecordSchema::for_type(RecordType::Symptom);
        let record = PartialRecord::new();
        let mut asked = FieldsAsked::new();
        let mut seen = Vec::new();

        while let Some(field) = next_field(schema, &record, &asked, 2) {
            assert!(!seen.contains(&field.name), "{} asked twice", field.name);
            seen.push(field.name);
            asked.insert(field.name);
        }
        assert_eq!(seen, vec!["symptom_name", "severity", "duration_hours", "body_location"]);
    }

    #[test]
    fn test_optional_cap() {
        let schema = RecordSchema::for_type(RecordType::Treatment);
        let mut record = PartialRecord::new();
        record.set("treatment_name", FieldValue::text("ibuprofen"));
        record.set("dosage", FieldValue::text("200 mg"));

        let mut asked = FieldsAsked::new();
        asked.insert("frequency");
        assert_eq!(next_field(schema, &record, &asked, 2).unwrap().name, "treatment_type");
        asked.insert("treatment_type");
        assert!(next_field(schema, &record, &asked, 2).is_none());
        assert!(next_field(schema, &record, &FieldsAsked::new(), 0).is_none());
    }

    #[test]
    fn test_fallback_companion_counts_as_filled() {
        let schema = RecordSchema::for_type(RecordType::Appointment);
        let mut record = PartialRecord::new();
        record.set("doctor_name", FieldValue::text("Dr. Lee"));
        record.set("visit_time_text", FieldValue::RawText("after lunch sometime".into()));

        let field = next_field(schema, &record, &FieldsAsked::new(), 2).unwrap();
        assert_eq!(field.name, "purpose");
    }

    #[test]
    fn test_render_placeholders() {
        let schema = RecordSchema::for_type(RecordType::Symptom);
        let severity = schema.field("severity").unwrap();

        let mut record = PartialRecord::new();
        assert_eq!(
            render(severity.question, schema, &record),
            "On a scale of 1 to 10, how severe is your symptom?"
        );

        record.set("symptom_name", FieldValue::text("knee pain"));
        assert_eq!(
            render(severity.question, schema, &record),
            "On a scale of 1 to 10, how severe is your knee pain?"
        );
    }

    #[test]
    fn test_fields_asked_is_a_set() {
        let mut asked = FieldsAsked::new();
        assert!(asked.insert("severity"));
        assert!(!asked.insert("severity"));
        assert_eq!(asked.len(), 1);
    }
}
