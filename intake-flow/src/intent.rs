//! Rule-based intent classification.
//!
//! Categories are tested in a fixed order (greeting, history, symptom,
//! treatment, appointment) and the first one that matches wins. Within a
//! category multi-word phrases are checked before single words. The same
//! input always yields the same classification.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extract::doctor::DoctorMatcher;
use crate::extract::keyword::KeywordMatcher;
use crate::extract::vocabulary::{contains_phrase, find_phrase, BODY_PARTS, WEEKDAYS};
use crate::extract::{ExtractionContext, FieldMatcher};
use crate::schema::{RecordSchema, RecordType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    HistoryRequest,
    Record(RecordType),
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
}

const GREETINGS: &[&str] = &[
    "good morning",
    "good afternoon",
    "good evening",
    "how are you",
    "what's up",
    "hello",
    "hi",
    "hey",
    "hiya",
    "howdy",
    "greetings",
];

/// Greetings followed by more than this many words are treated as carrying a request.
const GREETING_MAX_WORDS: usize = 4;

const HISTORY: &[&str] = &[
    "what have i logged",
    "what did i log",
    "show my",
    "show me my",
    "my records",
    "my history",
    "past records",
    "previous records",
    "last time",
    "history",
    "records",
];

const SYMPTOM_TERMS: &[&str] = &[
    "feeling sick",
    "feel sick",
    "not feeling well",
    "symptom",
    "symptoms",
    "pain",
    "hurts",
    "hurting",
    "ache",
    "aches",
    "sick",
    "ill",
];

const TREATMENT_TERMS: &[&str] = &[
    "took some",
    "i took",
    "i'm taking",
    "i am taking",
    "medication",
    "medicine",
    "prescription",
    "treatment",
    "dose",
    "dosage",
    "pill",
    "pills",
    "tablet",
    "tablets",
];

const APPOINTMENT_TERMS: &[&str] = &[
    "see my doctor",
    "seeing the doctor",
    "check-up",
    "appointment",
    "checkup",
    "doctor",
    "clinic",
    "visit",
    "dr",
];

const HEALTH_TOPICS: &[&str] = &[
    "blood pressure",
    "heart rate",
    "health",
    "healthy",
    "medical",
    "diet",
    "nutrition",
    "sleep",
    "exercise",
    "vitamin",
    "cholesterol",
    "diabetes",
    "allergy",
    "allergies",
    "vaccine",
    "stress",
    "weight",
    "flu",
    "covid",
];

pub fn classify(text: &str) -> Classification {
    let lowered = normalize(text);

    if let Some(rest) = after_greeting(&lowered) {
        let carries_record = RecordType::ALL
            .into_iter()
            .any(|record_type| record_confidence(rest, rest, record_type).is_some());
        if !carries_record {
            return Classification {
                intent: Intent::Greeting,
                confidence: 0.9,
            };
        }
    }
    if any_phrase(&lowered, HISTORY) {
        return Classification {
            intent: Intent::HistoryRequest,
            confidence: 0.8,
        };
    }

    for record_type in RecordType::ALL {
        if let Some(confidence) = record_confidence(text, &lowered, record_type) {
            return Classification {
                intent: Intent::Record(record_type),
                confidence,
            };
        }
    }

    Classification {
        intent: Intent::General,
        confidence: 0.3,
    }
}

/// Secondary check for general turns that still deserve a health-flavoured answer.
pub fn mentions_health_topic(text: &str) -> bool {
    any_phrase(&normalize(text), HEALTH_TOPICS)
}

/// What follows a leading greeting, for short utterances that open with one.
fn after_greeting(lowered: &str) -> Option<&str> {
    if lowered.split_whitespace().count() > GREETING_MAX_WORDS {
        return None;
    }
    GREETINGS
        .iter()
        .find(|greeting| find_phrase(lowered, greeting) == Some(0))
        .map(|greeting| lowered[greeting.len()..].trim())
}

/// Confidence for a record category, or `None` if it does not match. A
/// recognised field value (a symptom name, a drug, a doctor) scores higher
/// than a bare category word.
fn record_confidence(text: &str, lowered: &str, record_type: RecordType) -> Option<f32> {
    let schema = RecordSchema::for_type(record_type);
    let (key_field, terms) = match record_type {
        RecordType::Symptom => ("symptom_name", SYMPTOM_TERMS),
        RecordType::Treatment => ("treatment_name", TREATMENT_TERMS),
        RecordType::Appointment => ("doctor_name", APPOINTMENT_TERMS),
    };

    let ctx = ExtractionContext::new(chrono::NaiveDateTime::MIN, 0);
    let recovered = schema.field(key_field).and_then(|field| match record_type {
        RecordType::Appointment => DoctorMatcher.extract(text, field, &ctx),
        _ => KeywordMatcher.extract(text, field, &ctx),
    });

    match (recovered.is_some(), any_phrase(lowered, terms)) {
        (true, true) => Some(0.95),
        (true, false) => Some(0.85),
        (false, true) => Some(0.6),
        (false, false) => None,
    }
}

/// Conversation-level commands, recognised in any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Clear the record in progress and return to idle.
    Reset,
    /// Abandon the conversation entirely.
    Cancel,
}

pub fn command(text: &str) -> Option<Command> {
    let lowered = normalize(text);
    match lowered.as_str() {
        "reset" | "start over" | "restart" | "start again" => Some(Command::Reset),
        "cancel" | "never mind" | "nevermind" | "stop" | "quit" | "forget it" => Some(Command::Cancel),
        _ => None,
    }
}

/// Reading of a reply to "Is this correct? (yes/no)".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Affirm,
    /// A "no", or a reply that carries corrected values.
    Reject,
    Unclear,
}

const AFFIRMATIVES: &[&str] = &[
    "that's right",
    "looks good",
    "sounds good",
    "save it",
    "go ahead",
    "yes",
    "yeah",
    "yep",
    "yup",
    "y",
    "correct",
    "right",
    "sure",
    "ok",
    "okay",
    "confirm",
    "perfect",
];

const NEGATIVES: &[&str] = &[
    "not right",
    "that's wrong",
    "no",
    "nope",
    "nah",
    "n",
    "wrong",
    "incorrect",
    "change",
    "fix",
    "actually",
];

const TIME_WORDS: &[&str] = &[
    "today", "tomorrow", "yesterday", "noon", "hour", "hours", "day", "days", "week",
    "weeks", "morning", "afternoon", "evening", "night",
];

const DOSAGE_UNITS: &[&str] = &[
    "mg", "mcg", "ml", "g", "units", "tablet", "tablets", "pill", "pills", "capsule", "capsules",
    "puffs", "drops",
];

/// Replies that neither confirm nor reject.
const HEDGES: &[&str] = &[
    "not sure",
    "not really sure",
    "don't know",
    "dont know",
    "no idea",
    "i guess",
    "i think so",
    "unsure",
    "maybe",
    "perhaps",
    "probably",
    "kind of",
    "sort of",
];

static NEGATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:not|never|\w+n't|dont|doesnt|didnt|isnt|wasnt|arent|cant|wont)\b")
        .expect("valid negation regex")
});

pub fn confirmation(text: &str) -> Confirmation {
    let lowered = normalize(text);
    if has_correction_signal(&lowered) {
        return Confirmation::Reject;
    }
    if any_phrase(&lowered, HEDGES) {
        return Confirmation::Unclear;
    }
    if any_phrase(&lowered, NEGATIVES) {
        return Confirmation::Reject;
    }

    let Some(affirmed_at) = first_phrase(&lowered, AFFIRMATIVES) else {
        return Confirmation::Unclear;
    };
    // "that's not correct", "I don't think that's right"
    let negated = NEGATION
        .find(&lowered)
        .is_some_and(|negation| negation.start() < affirmed_at);
    if negated {
        Confirmation::Reject
    } else {
        Confirmation::Affirm
    }
}

/// Byte offset of the earliest of `phrases` in `lowered`.
fn first_phrase(lowered: &str, phrases: &[&str]) -> Option<usize> {
    phrases
        .iter()
        .filter_map(|phrase| find_phrase(lowered, phrase))
        .min()
}

/// Numbers, time words, body parts or dosage units.
fn has_correction_signal(lowered: &str) -> bool {
    lowered.chars().any(|c| c.is_ascii_digit())
        || any_phrase(lowered, TIME_WORDS)
        || any_phrase(lowered, WEEKDAYS)
        || any_phrase(lowered, BODY_PARTS)
        || any_phrase(lowered, DOSAGE_UNITS)
}

fn any_phrase(lowered: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| contains_phrase(lowered, phrase))
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(['.', '!', '?', ','])
        .to_lowercase()
        .replace('\u{2019}', "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(text: &str) -> Intent {
        classify(text).intent
    }

    #[test]
    fn test_priority_order() {
        assert_eq!(intent("Hello!"), Intent::Greeting);
        assert_eq!(intent("show my history"), Intent::HistoryRequest);
        assert_eq!(intent("I have a headache"), Intent::Record(RecordType::Symptom));
        assert_eq!(intent("I took 200mg of ibuprofen"), Intent::Record(RecordType::Treatment));
        assert_eq!(
            intent("appointment with dr smith tomorrow"),
            Intent::Record(RecordType::Appointment)
        );
        assert_eq!(intent("what's the weather like"), Intent::General);
    }

    #[test]
    fn test_greeting_with_a_request_is_not_a_greeting() {
        assert_eq!(
            intent("hi there, my knee hurts a lot since yesterday"),
            Intent::Record(RecordType::Symptom)
        );
        assert_eq!(intent("hi there"), Intent::Greeting);
        assert_eq!(intent("hey my knee hurts"), Intent::Record(RecordType::Symptom));
        assert_eq!(intent("hello, took ibuprofen"), Intent::Record(RecordType::Treatment));
        assert_eq!(intent("good morning!"), Intent::Greeting);
    }

    #[test]
    fn test_symptom_beats_appointment() {
        assert_eq!(
            intent("my back pain is why I need a doctor"),
            Intent::Record(RecordType::Symptom)
        );
    }

    #[test]
    fn test_recovered_field_raises_confidence() {
        let named = classify("I have a migraine");
        let vague = classify("I'm feeling sick");
        assert_eq!(named.intent, Intent::Record(RecordType::Symptom));
        assert_eq!(vague.intent, Intent::Record(RecordType::Symptom));
        assert!(named.confidence > vague.confidence);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let text = "took some tylenol for my headache";
        let first = classify(text);
        for _ in 0..10 {
            assert_eq!(classify(text), first);
        }
    }

    #[test]
    fn test_health_topic_detection() {
        assert!(mentions_health_topic("is it healthy to skip breakfast"));
        assert!(!mentions_health_topic("tell me a joke"));
    }

    #[test]
    fn test_commands_match_whole_utterance() {
        assert_eq!(command("Start over"), Some(Command::Reset));
        assert_eq!(command("cancel."), Some(Command::Cancel));
        assert_eq!(command("stop taking it at night"), None);
    }

    #[test]
    fn test_confirmation_replies() {
        assert_eq!(confirmation("yes"), Confirmation::Affirm);
        assert_eq!(confirmation("Yep, looks good"), Confirmation::Affirm);
        assert_eq!(confirmation("no"), Confirmation::Reject);
        assert_eq!(confirmation("it was 5"), Confirmation::Reject);
        assert_eq!(confirmation("yes but tomorrow"), Confirmation::Reject);
        assert_eq!(confirmation("hmm"), Confirmation::Unclear);
    }

    #[test]
    fn test_negated_affirmative_is_a_rejection() {
        assert_eq!(confirmation("that's not correct"), Confirmation::Reject);
        assert_eq!(confirmation("I don't think that's right"), Confirmation::Reject);
        assert_eq!(confirmation("not quite right"), Confirmation::Reject);
        assert_eq!(confirmation("That\u{2019}s not right"), Confirmation::Reject);
        assert_eq!(confirmation("yes, not a problem"), Confirmation::Affirm);
    }

    #[test]
    fn test_hedges_are_unclear() {
        assert_eq!(confirmation("I'm not sure"), Confirmation::Unclear);
        assert_eq!(confirmation("maybe"), Confirmation::Unclear);
        assert_eq!(confirmation("I guess so"), Confirmation::Unclear);
        assert_eq!(confirmation("don't know"), Confirmation::Unclear);
    }
}
