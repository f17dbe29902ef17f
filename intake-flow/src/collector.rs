//! Schema-driven record collection.
//!
//! One [`RecordCollector`] serves every record type: the schema decides which
//! fields exist and how they are asked for, the collector runs extraction,
//! merges what it finds, and decides between asking another question and
//! presenting a summary for confirmation.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::IntakeConfig;
use crate::error::{IntakeError, Result};
use crate::extract::{self, ExtractionContext, ExtractionResult};
use crate::question::{self, Question};
use crate::record::FieldValue;
use crate::schema::{FieldKind, RecordSchema, RecordType};
use crate::session::Collection;

pub const CONFIRM_PROMPT: &str = "Is this correct? (yes/no)";

/// Outcome of one collection step.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorReply {
    /// Full text to send back, lead-in included.
    pub text: String,
    /// Next question, when the record still needs one.
    pub question: Option<Question>,
    pub progress_percent: u8,
    /// The record is ready for confirmation.
    pub complete: bool,
    /// Fields set or overwritten by this step.
    pub changed: Vec<String>,
}

pub struct RecordCollector<'a> {
    schema: &'a RecordSchema,
    config: &'a IntakeConfig,
}

impl<'a> RecordCollector<'a> {
    pub fn new(schema: &'a RecordSchema, config: &'a IntakeConfig) -> Self {
        Self { schema, config }
    }

    /// Collector for one of the built-in record types.
    pub fn for_type(record_type: RecordType, config: &'a IntakeConfig) -> RecordCollector<'a> {
        RecordCollector::new(RecordSchema::for_type(record_type), config)
    }

    pub fn schema(&self) -> &RecordSchema {
        self.schema
    }

    /// Seed a new collection from the utterance that opened it.
    pub fn start_collection(&self, text: &str, now: NaiveDateTime) -> (Collection, CollectorReply) {
        let mut collection = Collection::new(self.schema.record_type());
        let ctx = ExtractionContext::new(now, self.config.fallback_max_chars);
        let extracted = extract::extract_fields(self.schema, text, &collection.fields, &ctx);
        let changed = self.absorb(&mut collection, extracted, false);

        let acknowledgement = self.schema.acknowledgement();
        let lead = if question::placeholders_filled(acknowledgement, &collection.fields) {
            question::render(acknowledgement, self.schema, &collection.fields)
        } else {
            self.schema.opening().to_string()
        };

        let reply = self.advance(&mut collection, Some(lead), changed);
        (collection, reply)
    }

    /// Fold an answer into the record. A pending correction overwrites.
    pub fn process_response(
        &self,
        collection: &mut Collection,
        text: &str,
        now: NaiveDateTime,
    ) -> CollectorReply {
        let overwrite = collection.correcting;
        let ctx = ExtractionContext::new(now, self.config.fallback_max_chars)
            .asking(collection.pending_question.as_deref())
            .correcting(overwrite);
        let extracted = extract::extract_fields(self.schema, text, &collection.fields, &ctx);
        let changed = self.absorb(collection, extracted, overwrite);

        collection.correcting = false;
        collection.pending_question = None;

        let lead = if changed.is_empty() {
            None
        } else if overwrite {
            Some("Updated.".to_string())
        } else {
            Some("Got it.".to_string())
        };
        self.advance(collection, lead, changed)
    }

    /// Re-open a record the user rejected at confirmation.
    ///
    /// Every question becomes askable again and `text` is read as a
    /// correction. Returns `None` when `text` carries nothing usable; the
    /// collection then stays flagged so the next answer overwrites.
    pub fn apply_correction(
        &self,
        collection: &mut Collection,
        text: &str,
        now: NaiveDateTime,
    ) -> Option<CollectorReply> {
        collection.fields_asked.clear();
        collection.pending_question = None;
        collection.correcting = true;

        let ctx = ExtractionContext::new(now, self.config.fallback_max_chars).correcting(true);
        let extracted = extract::extract_fields(self.schema, text, &collection.fields, &ctx);
        if extracted.is_empty() {
            return None;
        }

        let changed = self.absorb(collection, extracted, true);
        collection.correcting = false;
        Some(self.advance(collection, Some("Updated.".to_string()), changed))
    }

    /// Set one field from `text`, overwriting any current value.
    pub fn apply_edit(
        &self,
        collection: &mut Collection,
        field: &str,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<String>> {
        let spec = self.schema.require_field(field)?;
        let text = text.trim();
        let ctx = ExtractionContext::new(now, usize::MAX)
            .asking(Some(spec.name))
            .correcting(true);

        let (target, value) = match (spec.kind, extract::extract_one(spec, text, &ctx)) {
            (_, Some((target, found))) => (target, found.value),
            (FieldKind::RawText, None) if !text.is_empty() => {
                (spec.name, FieldValue::RawText(text.to_string()))
            }
            (FieldKind::FreeText | FieldKind::Keyword(_), None) if !text.is_empty() => {
                (spec.name, FieldValue::text(text))
            }
            _ => {
                return Err(IntakeError::UnreadableValue {
                    field: field.to_string(),
                    text: text.to_string(),
                });
            }
        };

        let mut extracted = ExtractionResult::default();
        extracted.insert(target, value, 1.0);
        Ok(self.absorb(collection, extracted, true))
    }

    /// All required fields present, the question ceiling reached, or nothing
    /// left worth asking.
    pub fn is_complete(&self, collection: &Collection) -> bool {
        let required = self
            .schema
            .required()
            .iter()
            .all(|field| collection.fields.satisfies(field));
        required
            || collection.fields_asked.len() >= self.config.question_ceiling
            || question::next_field(
                self.schema,
                &collection.fields,
                &collection.fields_asked,
                self.config.optional_question_cap,
            )
            .is_none()
    }

    /// Share of required plus capped optional fields that are filled.
    pub fn progress_percent(&self, collection: &Collection) -> u8 {
        let total = self.schema.progress_total(self.config.optional_question_cap);
        if total == 0 {
            return 100;
        }
        let required = self
            .schema
            .required()
            .iter()
            .filter(|field| collection.fields.satisfies(field))
            .count();
        let optional = self
            .schema
            .optional()
            .iter()
            .filter(|field| collection.fields.satisfies(field))
            .count();
        let filled = (required + optional).min(total);
        ((filled * 100) as f64 / total as f64).round() as u8
    }

    /// Field-by-field summary ending in the yes/no prompt.
    pub fn summary(&self, collection: &Collection) -> String {
        let mut lines = vec![format!(
            "Here's the {} I have for you:",
            self.schema.record_type()
        )];
        for field in self.schema.askable_fields() {
            let value = collection
                .fields
                .get(field.name)
                .or_else(|| field.fallback.and_then(|fallback| collection.fields.get(fallback)));
            if let Some(value) = value {
                lines.push(format!("- {}: {}", field.label, value.display()));
            }
        }
        lines.push(CONFIRM_PROMPT.to_string());
        lines.join("\n")
    }

    /// Flat record for the record store, with defaults for anything missing.
    pub fn prepare_for_persistence(&self, collection: &Collection, today: NaiveDate) -> Map<String, Value> {
        collection.fields.to_persisted(self.schema, today)
    }

    /// Merge extracted values and keep each field and its text companion
    /// from disagreeing: a parsed value replaces its raw text, and a raw-text
    /// correction replaces the parsed value.
    fn absorb(
        &self,
        collection: &mut Collection,
        extracted: ExtractionResult,
        overwrite: bool,
    ) -> Vec<String> {
        let changed = collection.fields.merge(extracted.into_values(), overwrite);

        for name in &changed {
            for field in self.schema.askable_fields() {
                let Some(fallback) = field.fallback else {
                    continue;
                };
                if field.name == name.as_str() {
                    collection.fields.remove(fallback);
                } else if fallback == name.as_str() && overwrite {
                    collection.fields.remove(field.name);
                }
            }
        }

        if !changed.is_empty() {
            debug!(
                record_type = %self.schema.record_type(),
                changed = ?changed,
                overwrite,
                "merged fields"
            );
        }
        changed
    }

    /// Ask the next question or, once complete, present the summary.
    fn advance(
        &self,
        collection: &mut Collection,
        lead: Option<String>,
        changed: Vec<String>,
    ) -> CollectorReply {
        let progress_percent = self.progress_percent(collection);

        if self.is_complete(collection) {
            collection.pending_question = None;
            return CollectorReply {
                text: join(lead, self.summary(collection)),
                question: None,
                progress_percent,
                complete: true,
                changed,
            };
        }

        let next = question::next_question(
            self.schema,
            &collection.fields,
            &collection.fields_asked,
            self.config.optional_question_cap,
        );
        match next {
            Some(question) => {
                collection.fields_asked.insert(question.field);
                collection.pending_question = Some(question.field.to_string());
                CollectorReply {
                    text: join(lead, question.text.clone()),
                    question: Some(question),
                    progress_percent,
                    complete: false,
                    changed,
                }
            }
            // Not reached while is_complete covers the no-question case.
            None => CollectorReply {
                text: join(lead, self.summary(collection)),
                question: None,
                progress_percent,
                complete: true,
                changed,
            },
        }
    }
}

fn join(lead: Option<String>, body: String) -> String {
    match lead {
        Some(lead) => format!("{} {}", lead, body),
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::test_support::monday_morning;

    fn config() -> IntakeConfig {
        IntakeConfig::default()
    }

    #[test]
    fn test_opening_with_all_required_fields_goes_straight_to_summary() {
        let config = config();
        let collector = RecordCollector::for_type(RecordType::Symptom, &config);
        let (collection, reply) =
            collector.start_collection("I have a headache, severity 7, lasted 2 days", monday_morning());

        assert!(reply.complete);
        assert!(reply.question.is_none());
        assert!(reply.text.starts_with("I'm sorry to hear about your headache."));
        assert!(reply.text.contains("Headache"));
        assert!(reply.text.contains("7/10"));
        assert!(reply.text.contains("2 days"));
        assert!(reply.text.ends_with(CONFIRM_PROMPT));
        assert_eq!(reply.progress_percent, 75);
        assert!(collection.fields_asked.is_empty());
    }

    #[test]
    fn test_knee_pain_then_severity() {
        let config = config();
        let collector = RecordCollector::for_type(RecordType::Symptom, &config);
        let (mut collection, reply) = collector.start_collection("my knee hurts", monday_morning());

        assert!(!reply.complete);
        assert_eq!(
            reply.question.as_ref().map(|q| q.field),
            Some("severity")
        );
        assert!(reply.text.contains("how severe is your knee pain"));
        assert_eq!(reply.progress_percent, 25);

        let reply = collector.process_response(&mut collection, "6", monday_morning());
        assert!(reply.complete);
        assert_eq!(collection.fields.get("severity"), Some(&FieldValue::Severity(6)));
        assert_eq!(reply.changed, vec!["severity".to_string()]);
    }

    #[test]
    fn test_generic_opening_when_nothing_recognised() {
        let config = config();
        let collector = RecordCollector::for_type(RecordType::Appointment, &config);
        let (_, reply) = collector.start_collection("I need to book an appointment", monday_morning());
        assert!(reply.text.starts_with("Let's write down your appointment."));
        assert_eq!(reply.question.map(|q| q.field), Some("doctor_name"));
    }

    #[test]
    fn test_question_ceiling_alone_forces_completion() {
        let config = IntakeConfig {
            question_ceiling: 2,
            ..IntakeConfig::default()
        };
        let collector = RecordCollector::for_type(RecordType::Symptom, &config);
        let (mut collection, reply) = collector.start_collection("I have a headache", monday_morning());
        assert_eq!(reply.question.map(|q| q.field), Some("severity"));

        let reply = collector.process_response(&mut collection, "dunno", monday_morning());
        assert!(!reply.complete);
        assert_eq!(reply.question.map(|q| q.field), Some("duration_hours"));

        let reply = collector.process_response(&mut collection, "dunno", monday_morning());
        assert!(reply.complete);
        assert_eq!(collection.fields_asked.len(), 2);
        assert!(!collection.fields.contains("severity"));
        // Questions were still left to ask.
        assert!(
            question::next_field(
                collector.schema(),
                &collection.fields,
                &collection.fields_asked,
                config.optional_question_cap,
            )
            .is_some()
        );

        let persisted = collector.prepare_for_persistence(&collection, monday_morning().date());
        assert_eq!(persisted["incomplete"], Value::Bool(true));
        assert_eq!(persisted["severity"], Value::from(0));
    }

    #[test]
    fn test_running_out_of_questions_forces_completion() {
        let config = config();
        let collector = RecordCollector::for_type(RecordType::Symptom, &config);
        let (mut collection, reply) = collector.start_collection("I don't feel right", monday_morning());
        assert_eq!(reply.question.map(|q| q.field), Some("symptom_name"));

        // Nothing useful in any answer.
        let mut asked = 1;
        let mut reply = collector.process_response(&mut collection, "???", monday_morning());
        while !reply.complete {
            asked += 1;
            reply = collector.process_response(&mut collection, "???", monday_morning());
        }
        assert_eq!(asked, config.question_ceiling);
        assert!(!collection.fields.contains("severity"));

        let persisted = collector.prepare_for_persistence(&collection, monday_morning().date());
        assert_eq!(persisted["incomplete"], Value::Bool(true));
    }

    #[test]
    fn test_correction_overwrites_and_resets_asked_fields() {
        let config = config();
        let collector = RecordCollector::for_type(RecordType::Symptom, &config);
        let (mut collection, _) = collector.start_collection("my knee hurts", monday_morning());
        collector.process_response(&mut collection, "6", monday_morning());
        assert!(!collection.fields_asked.is_empty());

        let reply = collector
            .apply_correction(&mut collection, "no, severity 8", monday_morning())
            .unwrap();
        assert_eq!(collection.fields.get("severity"), Some(&FieldValue::Severity(8)));
        assert!(reply.complete);
        assert!(reply.text.contains("8/10"));
        assert!(collection.fields_asked.is_empty());
    }

    #[test]
    fn test_bare_no_leaves_correction_pending() {
        let config = config();
        let collector = RecordCollector::for_type(RecordType::Symptom, &config);
        let (mut collection, _) = collector.start_collection("headache 7/10", monday_morning());

        assert!(collector.apply_correction(&mut collection, "no", monday_morning()).is_none());
        assert!(collection.correcting);

        let reply = collector.process_response(&mut collection, "it's a migraine", monday_morning());
        assert_eq!(collection.fields.get("symptom_name"), Some(&FieldValue::text("migraine")));
        assert!(!collection.correcting);
        assert!(reply.complete);
    }

    #[test]
    fn test_parsed_visit_time_replaces_raw_text() {
        let config = config();
        let collector = RecordCollector::for_type(RecordType::Appointment, &config);
        let (mut collection, reply) =
            collector.start_collection("appointment with dr lee next month", monday_morning());
        assert!(reply.complete);
        assert!(collection.fields.contains("visit_time_text"));

        collector
            .apply_edit(&mut collection, "visit_ts", "friday at 2pm", monday_morning())
            .unwrap();
        assert!(collection.fields.contains("visit_ts"));
        assert!(!collection.fields.contains("visit_time_text"));
    }

    #[test]
    fn test_edit_of_undeclared_field_is_rejected() {
        let config = config();
        let collector = RecordCollector::for_type(RecordType::Treatment, &config);
        let (mut collection, _) = collector.start_collection("took ibuprofen", monday_morning());

        let err = collector
            .apply_edit(&mut collection, "severity", "5", monday_morning())
            .unwrap_err();
        assert!(matches!(err, IntakeError::SchemaViolation { .. }));

        let err = collector
            .apply_edit(&mut collection, "dosage", "lots", monday_morning())
            .unwrap_err();
        assert!(matches!(err, IntakeError::UnreadableValue { .. }));
    }

    #[test]
    fn test_defaults_fill_uncollected_optional_fields() {
        let config = config();
        let collector = RecordCollector::for_type(RecordType::Treatment, &config);
        let (collection, reply) =
            collector.start_collection("I take 10 mg of lisinopril", monday_morning());
        // Required fields came with the opening line.
        assert!(reply.complete);
        assert!(collection.fields_asked.is_empty());

        let persisted = collector.prepare_for_persistence(&collection, monday_morning().date());
        assert_eq!(persisted["treatment_type"], Value::from("medication"));
        assert_eq!(persisted["frequency"], Value::from("not specified"));
        assert_eq!(persisted["purpose"], Value::from(""));
        assert_eq!(persisted["record_type"], Value::from("treatment"));
    }
}
