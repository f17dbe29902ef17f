//! Appointment date and time.
//!
//! A relative day ("today", "tomorrow", a weekday name) or an ISO date is
//! combined with an optional clock time. A day without a time means 09:00.
//! A time without a day means the next time that clock time comes round.
//! When nothing parses, the answer is kept as raw text so the appointment
//! can still be recorded.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use regex::Regex;

use super::vocabulary::{self, WEEKDAYS};
use super::{ExtractionContext, FieldMatcher, Match};
use crate::record::FieldValue;
use crate::schema::FieldSpec;

/// Hour used when only a day is given.
pub const DEFAULT_HOUR: u32 = 9;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid iso date regex"));

static RELATIVE_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(day\s+after\s+tomorrow|tomorrow|today|{})\b",
        WEEKDAYS.join("|")
    ))
    .expect("valid relative day regex")
});

/// "3pm", "3:30 pm", "15:00", "at 3".
static CLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:at\s+)?(\d{1,2})(?::(\d{2}))?\s*(a\.?m\.?|p\.?m\.?)|\b(\d{1,2}):(\d{2})\b|\bat\s+(\d{1,2})\b",
    )
    .expect("valid clock regex")
});

static NAMED_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(noon|midday|midnight)\b").expect("valid named time regex"));

/// Words that suggest an utterance is about timing even when it cannot be parsed.
const TIME_WORDS: &[&str] = &[
    "next week",
    "next month",
    "this week",
    "weekend",
    "morning",
    "afternoon",
    "evening",
    "january",
    "february",
    "march",
    "april",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
    "o'clock",
];

pub struct DateTimeMatcher;

impl FieldMatcher for DateTimeMatcher {
    fn extract(&self, text: &str, field: &FieldSpec, ctx: &ExtractionContext<'_>) -> Option<Match> {
        let lowered = text.to_lowercase();

        match (find_day(&lowered, ctx.now.date()), find_time(&lowered)) {
            (Some(day), Some(time)) => {
                return Some(Match::parsed(FieldValue::Timestamp(day.and_time(time)), 0.9));
            }
            (Some(day), None) => {
                let time = NaiveTime::from_hms_opt(DEFAULT_HOUR, 0, 0)?;
                return Some(Match::parsed(FieldValue::Timestamp(day.and_time(time)), 0.75));
            }
            (None, Some(time)) => {
                let today = ctx.now.date().and_time(time);
                let when = if today > ctx.now {
                    today
                } else {
                    today + Duration::days(1)
                };
                return Some(Match::parsed(FieldValue::Timestamp(when), 0.6));
            }
            (None, None) => {}
        }

        let timing = TIME_WORDS
            .iter()
            .any(|word| vocabulary::contains_phrase(&lowered, word));
        if ctx.is_asking(field.name) || timing {
            return Some(Match::verbatim(FieldValue::RawText(text.to_string()), 0.3));
        }
        None
    }
}

fn find_day(lowered: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(captures) = ISO_DATE.captures(lowered) {
        let year = captures[1].parse().ok()?;
        let month = captures[2].parse().ok()?;
        let day = captures[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    let captures = RELATIVE_DAY.captures(lowered)?;
    let word = captures.get(1)?.as_str();
    let offset = match word {
        "today" => 0,
        "tomorrow" => 1,
        w if w.starts_with("day") => 2,
        weekday => days_until(today, weekday)?,
    };
    today.checked_add_signed(Duration::days(offset))
}

/// Days from `today` to the next `weekday`; the same weekday means a week ahead.
fn days_until(today: NaiveDate, weekday: &str) -> Option<i64> {
    let target = WEEKDAYS.iter().position(|day| *day == weekday)? as i64;
    let current = today.weekday().num_days_from_monday() as i64;
    let ahead = (target - current).rem_euclid(7);
    Some(if ahead == 0 { 7 } else { ahead })
}

fn find_time(lowered: &str) -> Option<NaiveTime> {
    if let Some(captures) = NAMED_TIME.captures(lowered) {
        let hour = if &captures[1] == "midnight" { 0 } else { 12 };
        return NaiveTime::from_hms_opt(hour, 0, 0);
    }

    let captures = CLOCK.captures(lowered)?;
    let (hour, minute, meridiem) = if let Some(hour) = captures.get(1) {
        (hour.as_str(), captures.get(2), captures.get(3))
    } else if let Some(hour) = captures.get(4) {
        (hour.as_str(), captures.get(5), None)
    } else {
        (captures.get(6)?.as_str(), None, None)
    };

    let mut hour: u32 = hour.parse().ok()?;
    let minute: u32 = match minute {
        Some(minute) => minute.as_str().parse().ok()?,
        None => 0,
    };

    match meridiem.map(|m| m.as_str().starts_with('p')) {
        Some(true) if hour < 12 => hour += 12,
        Some(false) if hour == 12 => hour = 0,
        Some(_) => {}
        // Appointments are rarely before 8 in the morning: "at 3" means 15:00.
        None if (1..8).contains(&hour) => hour += 12,
        None => {}
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
}
