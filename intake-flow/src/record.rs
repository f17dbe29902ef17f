use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{FieldDefault, FieldSpec, RecordSchema};

/// A typed value held in a partial record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    /// Severity on a 1-10 scale.
    Severity(u8),
    DurationHours(u32),
    Timestamp(NaiveDateTime),
    /// Unparsed text kept for later best-effort parsing.
    RawText(String),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) | FieldValue::RawText(value) => Some(value),
            _ => None,
        }
    }

    /// JSON representation written to the record store.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(value) | FieldValue::RawText(value) => Value::String(value.clone()),
            FieldValue::Severity(value) => Value::from(*value),
            FieldValue::DurationHours(value) => Value::from(*value),
            FieldValue::Timestamp(value) => {
                Value::String(value.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
        }
    }

    /// Human-readable rendering for summaries and acknowledgements.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(value) => capitalize(value),
            FieldValue::RawText(value) => value.clone(),
            FieldValue::Severity(value) => format!("{}/10", value),
            FieldValue::DurationHours(hours) => format_duration(*hours),
            FieldValue::Timestamp(ts) => ts.format("%A, %b %-d at %-I:%M %p").to_string(),
        }
    }
}

/// Render a duration in the largest whole unit: "2 days", "1 week", "5 hours".
pub fn format_duration(hours: u32) -> String {
    let (amount, unit) = if hours >= 168 && hours % 168 == 0 {
        (hours / 168, "week")
    } else if hours >= 24 && hours % 24 == 0 {
        (hours / 24, "day")
    } else {
        (hours, "hour")
    };

    if amount == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", amount, unit)
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Field values collected so far for one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl PartialRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// A field counts as present when it, or its text-fallback companion, has a value.
    pub fn satisfies(&self, field: &FieldSpec) -> bool {
        self.contains(field.name) || field.fallback.is_some_and(|fallback| self.contains(fallback))
    }

    /// Merge extracted values. Existing values are kept unless `overwrite` is set.
    /// Returns the names of fields that changed.
    pub fn merge(
        &mut self,
        values: impl IntoIterator<Item = (String, FieldValue)>,
        overwrite: bool,
    ) -> Vec<String> {
        let mut changed = Vec::new();
        for (name, value) in values {
            let unchanged = self.fields.get(&name) == Some(&value);
            if unchanged || (!overwrite && self.fields.contains_key(&name)) {
                continue;
            }
            self.fields.insert(name.clone(), value);
            changed.push(name);
        }
        changed
    }

    /// Flatten into the record store's schema. Every declared field gets a
    /// key: collected values as-is, everything else its declared default.
    pub fn to_persisted(&self, schema: &RecordSchema, today: NaiveDate) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert(
            "record_type".to_string(),
            Value::String(schema.record_type().as_str().to_string()),
        );

        for field in schema.all_fields() {
            let value = match self.get(field.name) {
                Some(value) => value.to_json(),
                None => default_value(field, today),
            };
            record.insert(field.name.to_string(), value);
        }

        let incomplete = schema.required().iter().any(|field| !self.satisfies(field));
        record.insert("incomplete".to_string(), Value::Bool(incomplete));
        record
    }
}

fn default_value(field: &FieldSpec, today: NaiveDate) -> Value {
    match field.default {
        FieldDefault::Text(text) => Value::String(text.to_string()),
        FieldDefault::Number(number) => Value::from(number),
        FieldDefault::TomorrowAt(hour) => {
            let tomorrow = today.succ_opt().unwrap_or(today);
            let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
            FieldValue::Timestamp(tomorrow.and_time(time)).to_json()
        }
    }
}
