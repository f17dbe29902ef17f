use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the conversation core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Sessions idle for longer than this are swept.
    pub session_ttl_hours: u64,
    /// How often the background sweeper runs.
    pub sweep_interval_secs: u64,
    /// Maximum optional questions per record.
    pub optional_question_cap: usize,
    /// Once this many questions have been asked the record is treated as complete.
    pub question_ceiling: usize,
    /// Utterances shorter than this may be used verbatim for a keyword field.
    pub fallback_max_chars: usize,
    /// Messages kept per session for the free-text responder.
    pub transcript_limit: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24,
            sweep_interval_secs: 300,
            optional_question_cap: 2,
            question_ceiling: 4,
            fallback_max_chars: 40,
            transcript_limit: 20,
        }
    }
}

impl IntakeConfig {
    /// Build a config from `INTAKE_*` environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`IntakeConfig::from_env`] but reads through `lookup`, so callers
    /// (and tests) can supply values without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        Self {
            session_ttl_hours: read("INTAKE_SESSION_TTL_HOURS", defaults.session_ttl_hours),
            sweep_interval_secs: read("INTAKE_SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs)
                .max(1),
            optional_question_cap: read(
                "INTAKE_OPTIONAL_QUESTION_CAP",
                defaults.optional_question_cap as u64,
            ) as usize,
            question_ceiling: read("INTAKE_QUESTION_CEILING", defaults.question_ceiling as u64)
                .max(1) as usize,
            fallback_max_chars: read(
                "INTAKE_FALLBACK_MAX_CHARS",
                defaults.fallback_max_chars as u64,
            ) as usize,
            transcript_limit: read("INTAKE_TRANSCRIPT_LIMIT", defaults.transcript_limit as u64)
                as usize,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours * 3600)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
