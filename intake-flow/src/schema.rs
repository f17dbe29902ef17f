//! Declarative record schemas.
//!
//! A [`RecordSchema`] is the only thing that differs between symptom, treatment
//! and appointment collection: which fields exist, which are required, how each
//! is asked for, how it is extracted and what it defaults to when persisted.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::{IntakeError, Result};

/// Kind of record a conversation is collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Symptom,
    Treatment,
    Appointment,
}

impl RecordType {
    pub const ALL: [RecordType; 3] = [
        RecordType::Symptom,
        RecordType::Treatment,
        RecordType::Appointment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Symptom => "symptom",
            RecordType::Treatment => "treatment",
            RecordType::Appointment => "appointment",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed vocabularies used by keyword fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    Symptom,
    Treatment,
    TreatmentType,
}

/// Extraction strategy and value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Longest match against a vocabulary, with a short-utterance fallback.
    Keyword(Vocabulary),
    /// Severity on a 1-10 scale.
    Scale,
    /// Duration normalised to hours.
    Duration,
    /// Any sufficiently long answer to the field's own question.
    FreeText,
    /// Appointment date and time.
    DateTime,
    /// "Dr. <Name>".
    Doctor,
    /// Amount plus unit, e.g. "200 mg".
    Dosage,
    /// How often a treatment is taken.
    Frequency,
    /// Raw-text shadow of another field. Never asked or extracted directly.
    RawText,
}

/// Value written to the record store for a field that was never collected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Text(&'static str),
    Number(i64),
    /// Tomorrow at the given hour, local time.
    TomorrowAt(u32),
}

/// One field of a record schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Label used in the confirmation summary.
    pub label: &'static str,
    /// Used when a question template references this field before it is known.
    pub generic_name: &'static str,
    /// Question template; `{other_field}` placeholders are rendered from the partial record.
    pub question: &'static str,
    pub kind: FieldKind,
    /// Raw-text companion that satisfies this field when a structured parse fails.
    pub fallback: Option<&'static str>,
    pub default: FieldDefault,
}

impl FieldSpec {
    const fn new(
        name: &'static str,
        label: &'static str,
        generic_name: &'static str,
        question: &'static str,
        kind: FieldKind,
        default: FieldDefault,
    ) -> Self {
        Self {
            name,
            label,
            generic_name,
            question,
            kind,
            fallback: None,
            default,
        }
    }

    const fn with_fallback(mut self, fallback: &'static str) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Ordered description of one record type.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    record_type: RecordType,
    required: Vec<FieldSpec>,
    optional: Vec<FieldSpec>,
    shadows: Vec<FieldSpec>,
    /// Opening line once the first required field is known; may use placeholders.
    acknowledgement: &'static str,
    /// Opening line when nothing identifying was recognised.
    opening: &'static str,
}

impl RecordSchema {
    /// Build and validate a schema.
    pub fn new(
        record_type: RecordType,
        required: Vec<FieldSpec>,
        optional: Vec<FieldSpec>,
        shadows: Vec<FieldSpec>,
    ) -> Result<Self> {
        let schema = Self {
            record_type,
            required,
            optional,
            shadows,
            acknowledgement: "Let's record that.",
            opening: "Let's record that.",
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Field names must be unique across required, optional and shadow fields,
    /// and every fallback must point at a declared shadow field.
    pub fn validate(&self) -> Result<()> {
        if self.required.is_empty() {
            return Err(IntakeError::InvalidSchema(format!(
                "{} schema declares no required fields",
                self.record_type
            )));
        }

        let mut seen = HashSet::new();
        for field in self.all_fields() {
            if !seen.insert(field.name) {
                return Err(IntakeError::InvalidSchema(format!(
                    "{} schema declares `{}` more than once",
                    self.record_type, field.name
                )));
            }
        }

        for field in self.required.iter().chain(self.optional.iter()) {
            if let Some(fallback) = field.fallback {
                let declared = self.shadows.iter().any(|shadow| shadow.name == fallback);
                if !declared {
                    return Err(IntakeError::InvalidSchema(format!(
                        "fallback `{}` of `{}` is not a shadow field",
                        fallback, field.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Built-in schema for a record type.
    pub fn for_type(record_type: RecordType) -> &'static RecordSchema {
        match record_type {
            RecordType::Symptom => &SYMPTOM_SCHEMA,
            RecordType::Treatment => &TREATMENT_SCHEMA,
            RecordType::Appointment => &APPOINTMENT_SCHEMA,
        }
    }

    pub fn acknowledgement(&self) -> &'static str {
        self.acknowledgement
    }

    pub fn opening(&self) -> &'static str {
        self.opening
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn required(&self) -> &[FieldSpec] {
        &self.required
    }

    pub fn optional(&self) -> &[FieldSpec] {
        &self.optional
    }

    pub fn shadows(&self) -> &[FieldSpec] {
        &self.shadows
    }

    /// Required then optional fields, in declaration order. Shadows excluded.
    pub fn askable_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.required.iter().chain(self.optional.iter())
    }

    pub fn all_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .chain(self.shadows.iter())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.all_fields().find(|field| field.name == name)
    }

    pub fn is_optional(&self, name: &str) -> bool {
        self.optional.iter().any(|field| field.name == name)
    }

    /// Look up a field, rejecting names the schema does not declare.
    pub fn require_field(&self, name: &str) -> Result<&FieldSpec> {
        self.field(name).ok_or_else(|| IntakeError::SchemaViolation {
            record_type: self.record_type,
            field: name.to_string(),
        })
    }

    /// Number of fields counted towards progress: all required plus the
    /// optional fields that may be asked under `optional_cap`.
    pub fn progress_total(&self, optional_cap: usize) -> usize {
        self.required.len() + self.optional.len().min(optional_cap)
    }
}

static SYMPTOM_SCHEMA: LazyLock<RecordSchema> = LazyLock::new(|| RecordSchema {
    record_type: RecordType::Symptom,
    required: vec![
        FieldSpec::new(
            "symptom_name",
            "Symptom",
            "symptom",
            "What symptom are you experiencing?",
            FieldKind::Keyword(Vocabulary::Symptom),
            FieldDefault::Text("unspecified symptom"),
        ),
        FieldSpec::new(
            "severity",
            "Severity",
            "symptom",
            "On a scale of 1 to 10, how severe is your {symptom_name}?",
            FieldKind::Scale,
            FieldDefault::Number(0),
        ),
    ],
    optional: vec![
        FieldSpec::new(
            "duration_hours",
            "Duration",
            "symptom",
            "How long have you had the {symptom_name}?",
            FieldKind::Duration,
            FieldDefault::Number(0),
        ),
        FieldSpec::new(
            "body_location",
            "Location",
            "symptom",
            "Where on your body do you feel the {symptom_name}?",
            FieldKind::FreeText,
            FieldDefault::Text(""),
        ),
        FieldSpec::new(
            "notes",
            "Notes",
            "symptom",
            "Is there anything else about the {symptom_name} you'd like to note?",
            FieldKind::FreeText,
            FieldDefault::Text(""),
        ),
    ],
    shadows: Vec::new(),
    acknowledgement: "I'm sorry to hear about your {symptom_name}.",
    opening: "I can help you log a symptom.",
});

static TREATMENT_SCHEMA: LazyLock<RecordSchema> = LazyLock::new(|| RecordSchema {
    record_type: RecordType::Treatment,
    required: vec![
        FieldSpec::new(
            "treatment_name",
            "Treatment",
            "it",
            "What medication or treatment did you take?",
            FieldKind::Keyword(Vocabulary::Treatment),
            FieldDefault::Text("unspecified treatment"),
        ),
        FieldSpec::new(
            "dosage",
            "Dosage",
            "treatment",
            "What dose of {treatment_name} did you take?",
            FieldKind::Dosage,
            FieldDefault::Text("not specified"),
        ),
    ],
    optional: vec![
        FieldSpec::new(
            "frequency",
            "Frequency",
            "treatment",
            "How often do you take {treatment_name}?",
            FieldKind::Frequency,
            FieldDefault::Text("not specified"),
        ),
        FieldSpec::new(
            "treatment_type",
            "Type",
            "treatment",
            "What kind of treatment is {treatment_name} (medication, therapy, supplement)?",
            FieldKind::Keyword(Vocabulary::TreatmentType),
            FieldDefault::Text("medication"),
        ),
        FieldSpec::new(
            "purpose",
            "Purpose",
            "treatment",
            "What are you taking {treatment_name} for?",
            FieldKind::FreeText,
            FieldDefault::Text(""),
        ),
    ],
    shadows: Vec::new(),
    acknowledgement: "Got it, let's log your {treatment_name}.",
    opening: "Let's log a treatment.",
});

static APPOINTMENT_SCHEMA: LazyLock<RecordSchema> = LazyLock::new(|| RecordSchema {
    record_type: RecordType::Appointment,
    required: vec![
        FieldSpec::new(
            "doctor_name",
            "Doctor",
            "your doctor",
            "Which doctor is the appointment with?",
            FieldKind::Doctor,
            FieldDefault::Text("Unknown doctor"),
        ),
        FieldSpec::new(
            "visit_ts",
            "When",
            "appointment",
            "When is your appointment with {doctor_name}?",
            FieldKind::DateTime,
            FieldDefault::TomorrowAt(9),
        )
        .with_fallback("visit_time_text"),
    ],
    optional: vec![
        FieldSpec::new(
            "purpose",
            "Purpose",
            "appointment",
            "What is the appointment with {doctor_name} for?",
            FieldKind::FreeText,
            FieldDefault::Text(""),
        ),
        FieldSpec::new(
            "location",
            "Location",
            "appointment",
            "Where is the appointment taking place?",
            FieldKind::FreeText,
            FieldDefault::Text(""),
        ),
        FieldSpec::new(
            "preparation_notes",
            "Preparation",
            "appointment",
            "Do you need to prepare anything for the visit with {doctor_name}?",
            FieldKind::FreeText,
            FieldDefault::Text(""),
        ),
    ],
    shadows: vec![FieldSpec::new(
        "visit_time_text",
        "When (as given)",
        "appointment time",
        "",
        FieldKind::RawText,
        FieldDefault::Text(""),
    )],
    acknowledgement: "Let's get your appointment with {doctor_name} written down.",
    opening: "Let's write down your appointment.",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schemas_are_valid() {
        for record_type in RecordType::ALL {
            let schema = RecordSchema::for_type(record_type);
            schema.validate().unwrap();
            assert_eq!(schema.record_type(), record_type);
        }
    }

    #[test]
    fn test_required_and_optional_are_disjoint() {
        for record_type in RecordType::ALL {
            let schema = RecordSchema::for_type(record_type);
            for field in schema.required() {
                assert!(!schema.is_optional(field.name));
            }
        }
    }

    #[test]
    fn test_duplicate_field_is_rejected() {
        let severity = RecordSchema::for_type(RecordType::Symptom).required()[1].clone();
        let result = RecordSchema::new(
            RecordType::Symptom,
            vec![severity.clone()],
            vec![severity],
            Vec::new(),
        );
        assert!(matches!(result, Err(IntakeError::InvalidSchema(_))));
    }

    #[test]
    fn test_undeclared_fallback_is_rejected() {
        let visit = RecordSchema::for_type(RecordType::Appointment).required()[1].clone();
        let result = RecordSchema::new(RecordType::Appointment, vec![visit], Vec::new(), Vec::new());
        assert!(matches!(result, Err(IntakeError::InvalidSchema(_))));
    }

    #[test]
    fn test_require_field_reports_schema_violation() {
        let schema = RecordSchema::for_type(RecordType::Treatment);
        assert!(schema.require_field("dosage").is_ok());

        let err = schema.require_field("blood_type").unwrap_err();
        assert!(matches!(
            err,
            IntakeError::SchemaViolation { record_type: RecordType::Treatment, ref field } if field == "blood_type"
        ));
    }

    #[test]
    fn test_progress_total_caps_optional_fields() {
        let schema = RecordSchema::for_type(RecordType::Symptom);
        assert_eq!(schema.progress_total(2), 4);
        assert_eq!(schema.progress_total(10), 5);
    }
}
