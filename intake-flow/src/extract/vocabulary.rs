//! Static vocabularies for keyword fields and the intent classifier.
//!
//! Tables are ordered: when two phrases match with the same length, the one
//! listed first wins.

use crate::schema::Vocabulary;

/// `(phrase, canonical value)` pairs for symptom names.
pub const SYMPTOMS: &[(&str, &str)] = &[
    ("headache", "headache"),
    ("head ache", "headache"),
    ("migraine", "migraine"),
    ("sore throat", "sore throat"),
    ("runny nose", "runny nose"),
    ("stuffy nose", "congestion"),
    ("congestion", "congestion"),
    ("fever", "fever"),
    ("temperature", "fever"),
    ("chills", "chills"),
    ("cough", "cough"),
    ("coughing", "cough"),
    ("sneezing", "sneezing"),
    ("nausea", "nausea"),
    ("nauseous", "nausea"),
    ("vomiting", "vomiting"),
    ("throwing up", "vomiting"),
    ("diarrhea", "diarrhea"),
    ("constipation", "constipation"),
    ("stomach ache", "stomach ache"),
    ("stomachache", "stomach ache"),
    ("tummy ache", "stomach ache"),
    ("heartburn", "heartburn"),
    ("cramps", "cramps"),
    ("dizziness", "dizziness"),
    ("dizzy", "dizziness"),
    ("lightheaded", "dizziness"),
    ("fatigue", "fatigue"),
    ("tired", "fatigue"),
    ("exhausted", "fatigue"),
    ("insomnia", "insomnia"),
    ("can't sleep", "insomnia"),
    ("shortness of breath", "shortness of breath"),
    ("short of breath", "shortness of breath"),
    ("chest pain", "chest pain"),
    ("back pain", "back pain"),
    ("joint pain", "joint pain"),
    ("muscle pain", "muscle pain"),
    ("muscle ache", "muscle pain"),
    ("earache", "earache"),
    ("toothache", "toothache"),
    ("palpitations", "palpitations"),
    ("rash", "rash"),
    ("itching", "itching"),
    ("itchy", "itching"),
    ("swelling", "swelling"),
    ("numbness", "numbness"),
    ("blurred vision", "blurred vision"),
    ("sinus pressure", "sinus pressure"),
    ("anxiety", "anxiety"),
    ("anxious", "anxiety"),
];

/// Body parts recognised in "my <part> hurts" phrasing, longest first so
/// "lower back" beats "back" inside a regex alternation.
pub const BODY_PARTS: &[&str] = &[
    "lower back",
    "upper back",
    "shoulder",
    "stomach",
    "abdomen",
    "finger",
    "throat",
    "elbow",
    "wrist",
    "ankle",
    "tooth",
    "chest",
    "belly",
    "tummy",
    "knee",
    "neck",
    "back",
    "hand",
    "foot",
    "head",
    "hip",
    "leg",
    "arm",
    "toe",
    "ear",
    "eye",
    "jaw",
];

/// Canonical symptom for pain in a body part.
pub fn body_part_symptom(part: &str) -> String {
    match part {
        "head" => "headache".to_string(),
        "stomach" | "belly" | "tummy" | "abdomen" => "stomach ache".to_string(),
        "tooth" => "toothache".to_string(),
        "ear" => "earache".to_string(),
        "throat" => "sore throat".to_string(),
        other => format!("{} pain", other),
    }
}

pub const TREATMENTS: &[(&str, &str)] = &[
    ("ibuprofen", "ibuprofen"),
    ("advil", "ibuprofen"),
    ("motrin", "ibuprofen"),
    ("acetaminophen", "acetaminophen"),
    ("tylenol", "acetaminophen"),
    ("paracetamol", "paracetamol"),
    ("aspirin", "aspirin"),
    ("naproxen", "naproxen"),
    ("aleve", "naproxen"),
    ("amoxicillin", "amoxicillin"),
    ("antibiotics", "antibiotics"),
    ("antibiotic", "antibiotics"),
    ("metformin", "metformin"),
    ("lisinopril", "lisinopril"),
    ("atorvastatin", "atorvastatin"),
    ("omeprazole", "omeprazole"),
    ("insulin", "insulin"),
    ("prednisone", "prednisone"),
    ("cetirizine", "cetirizine"),
    ("zyrtec", "cetirizine"),
    ("loratadine", "loratadine"),
    ("claritin", "loratadine"),
    ("benadryl", "diphenhydramine"),
    ("antihistamine", "antihistamine"),
    ("sertraline", "sertraline"),
    ("albuterol", "albuterol"),
    ("inhaler", "inhaler"),
    ("melatonin", "melatonin"),
    ("vitamin d", "vitamin D"),
    ("vitamin c", "vitamin C"),
    ("iron supplement", "iron supplement"),
    ("cough syrup", "cough syrup"),
    ("antacid", "antacid"),
    ("nasal spray", "nasal spray"),
    ("eye drops", "eye drops"),
    ("physical therapy", "physical therapy"),
    ("physiotherapy", "physical therapy"),
    ("massage", "massage"),
    ("ice pack", "ice pack"),
    ("heating pad", "heating pad"),
];

pub const TREATMENT_TYPES: &[(&str, &str)] = &[
    ("medication", "medication"),
    ("medicine", "medication"),
    ("prescription", "medication"),
    ("pill", "medication"),
    ("tablet", "medication"),
    ("capsule", "medication"),
    ("physical therapy", "therapy"),
    ("therapy", "therapy"),
    ("counseling", "therapy"),
    ("massage", "therapy"),
    ("exercise", "therapy"),
    ("supplement", "supplement"),
    ("vitamin", "supplement"),
    ("herbal", "supplement"),
    ("injection", "procedure"),
    ("shot", "procedure"),
    ("surgery", "procedure"),
    ("procedure", "procedure"),
    ("home remedy", "home remedy"),
    ("ice pack", "home remedy"),
    ("rest", "home remedy"),
];

pub fn table(vocabulary: Vocabulary) -> &'static [(&'static str, &'static str)] {
    match vocabulary {
        Vocabulary::Symptom => SYMPTOMS,
        Vocabulary::Treatment => TREATMENTS,
        Vocabulary::TreatmentType => TREATMENT_TYPES,
    }
}

pub const WEEKDAYS: &[&str] = &[
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Spelled-out numbers accepted wherever a small count is expected.
pub fn number_word(word: &str) -> Option<u32> {
    let value = match word {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        _ => return None,
    };
    Some(value)
}

/// Regex alternation matching a digit run or a number word.
pub const NUMBER_TOKEN: &str = r"\d+|an?|one|two|three|four|five|six|seven|eight|nine|ten";

/// Parse a token produced by [`NUMBER_TOKEN`].
pub fn parse_count(token: &str) -> Option<u32> {
    token.parse::<u32>().ok().or_else(|| number_word(token))
}

/// Words that decline a free-text question rather than answer it.
pub const DECLINES: &[&str] = &[
    "no",
    "nope",
    "none",
    "nothing",
    "n/a",
    "na",
    "skip",
    "not really",
    "no thanks",
];

/// Byte offset of `phrase` in `haystack` where it sits on word boundaries.
/// Both sides are expected to be lowercase already.
pub fn find_phrase(haystack: &str, phrase: &str) -> Option<usize> {
    let mut start = 0;
    while let Some(offset) = haystack[start..].find(phrase) {
        let begin = start + offset;
        let end = begin + phrase.len();
        let before_ok = haystack[..begin]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return Some(begin);
        }
        start = begin + phrase.chars().next().map_or(1, char::len_utf8);
    }
    None
}

pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    find_phrase(haystack, phrase).is_some()
}

/// Longest vocabulary phrase contained in `text`; ties go to the earlier entry.
/// Returns the canonical value and the matched phrase length.
pub fn longest_match(
    text: &str,
    entries: &'static [(&'static str, &'static str)],
) -> Option<(&'static str, usize)> {
    let mut best: Option<(&'static str, usize)> = None;
    for (phrase, canonical) in entries {
        if !contains_phrase(text, phrase) {
            continue;
        }
        let better = best.is_none_or(|(_, len)| phrase.len() > len);
        if better {
            best = Some((canonical, phrase.len()));
        }
    }
    best
}
