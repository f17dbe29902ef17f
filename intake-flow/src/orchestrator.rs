//! Orchestrator – the per-message entry point.
//!
//! Every turn follows the same shape: lock the user's session, run exactly one
//! state-machine step, hand the session back. The lock is held for the whole
//! step, including the record store write, so two messages from one user
//! never interleave.
//!
//! ```text
//! Idle ──greeting──▶ Greeting
//!  │                    │
//!  └──record intent──▶ Collecting(type) ◀──"no" / correction──┐
//!                         │                                   │
//!                         └──required fields known──▶ Confirming
//!                                                     │  "yes"
//!                                                     ▼
//!                                                   Saving ──ok──▶ Completed
//!                                                     │
//!                                                     └─failure─▶ Confirming
//! ```
//!
//! `reset` returns to Idle at any point; `cancel` discards the session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::collector::{CONFIRM_PROMPT, CollectorReply, RecordCollector};
use crate::config::IntakeConfig;
use crate::error::{IntakeError, Result};
use crate::intent::{self, Command, Confirmation, Intent};
use crate::responder::{HEALTH_FALLBACK, HELP_MESSAGE, Responder, UserProfile};
use crate::schema::RecordType;
use crate::session::{ConversationState, MessageRole, Session};
use crate::storage::{RecordStore, SessionGuard, SessionStore, StoredRecord};

const WELCOME: &str = "Hello! I can help you keep track of your health. Tell me about a symptom, \
a treatment you're taking, or an upcoming doctor's appointment.";

const APOLOGY: &str = "Sorry, something went wrong on my side. Please try that again.";

/// How many recent records are passed to the responder as context.
const RESPONDER_CONTEXT_RECORDS: usize = 5;

/// Side-channel events for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// The user asked to see past records.
    ShowHistory,
    RecordSaved,
    /// The record store rejected the write; the session is back in Confirming.
    SaveFailed,
    Cancelled,
}

/// Reply to one incoming message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub reply_text: String,
    pub next_question: Option<String>,
    pub progress_percent: u8,
    /// The record has every value it is going to get (confirming or saved).
    pub is_complete: bool,
    /// `None` once the session has been discarded.
    pub session_id: Option<String>,
    pub persisted_record: Option<Map<String, Value>>,
    pub state: ConversationState,
    pub signal: Option<Signal>,
}

/// What one step produced, before it is stamped with session details.
#[derive(Debug, Default)]
struct TurnOutcome {
    reply: String,
    question: Option<String>,
    progress_percent: u8,
    complete: bool,
    persisted: Option<Map<String, Value>>,
    signal: Option<Signal>,
}

impl TurnOutcome {
    fn say(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            ..Self::default()
        }
    }

    fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal);
        self
    }

    fn from_collector(reply: CollectorReply) -> Self {
        Self {
            reply: reply.text,
            question: reply.question.map(|question| question.text),
            progress_percent: reply.progress_percent,
            complete: reply.complete,
            ..Self::default()
        }
    }
}

/// Routes each message through intent classification, the active record
/// collector and, on confirmation, the record store.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<IntakeConfig>,
    sessions: Arc<dyn SessionStore>,
    records: Arc<dyn RecordStore>,
    responder: Option<Arc<dyn Responder>>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        config: IntakeConfig,
        sessions: Arc<dyn SessionStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
            records,
            responder: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// Process one message. Never fails: internal errors become an apology.
    pub async fn handle_message(
        &self,
        user_id: &str,
        text: &str,
        active_session_id: Option<&str>,
    ) -> MessageResponse {
        let mut guard = match self.sessions.acquire(user_id, self.clock.now()).await {
            Ok(guard) => guard,
            Err(err) => {
                error!(user_id = %user_id, error = %err, "failed to acquire session");
                return apology(None);
            }
        };

        let response = match self.turn(&mut guard, text, active_session_id).await {
            Ok(response) => response,
            Err(err) => {
                error!(
                    user_id = %user_id,
                    session_id = %guard.session_id,
                    state = %guard.state(),
                    error = %err,
                    "turn failed"
                );
                apology(Some(&*guard))
            }
        };

        if let Err(err) = self.sessions.release(guard).await {
            error!(user_id = %user_id, error = %err, "failed to release session");
        }
        response
    }

    /// Overwrite one field of the record in progress.
    ///
    /// Unlike [`Orchestrator::handle_message`] this reports errors: a field the
    /// record type does not declare is a [`IntakeError::SchemaViolation`].
    pub async fn edit_field(&self, user_id: &str, field: &str, text: &str) -> Result<MessageResponse> {
        if self.sessions.get(user_id).await?.is_none() {
            return Err(IntakeError::SessionNotFound(user_id.to_string()));
        }
        let mut guard = self.sessions.acquire(user_id, self.clock.now()).await?;
        let result = self.edit(&mut guard, field, text);
        self.sessions.release(guard).await?;
        result
    }

    /// Copy of the user's session, if one is live.
    pub async fn session(&self, user_id: &str) -> Result<Option<Session>> {
        self.sessions.get(user_id).await
    }

    pub async fn records(&self, user_id: &str) -> Result<Vec<StoredRecord>> {
        self.records.list(user_id).await
    }

    /// Remove sessions idle for longer than the configured time to live.
    pub async fn sweep_idle(&self) -> Result<usize> {
        let ttl = chrono::Duration::hours(self.config.session_ttl_hours as i64);
        let cutoff = self.clock.now() - ttl;
        self.sessions.sweep_expired(cutoff).await
    }

    async fn turn(
        &self,
        guard: &mut SessionGuard,
        text: &str,
        active_session_id: Option<&str>,
    ) -> Result<MessageResponse> {
        let now = self.clock.now();

        if let Some(requested) = active_session_id {
            if requested != guard.session_id {
                warn!(
                    user_id = %guard.user_id,
                    requested = %requested,
                    current = %guard.session_id,
                    "unknown session id, starting a fresh session"
                );
                let fresh = Session::new(guard.user_id.clone(), now, self.config.transcript_limit);
                **guard = fresh;
            }
        }

        guard.touch(now);
        guard.transcript.push(MessageRole::User, text, now);
        let before = guard.state();

        let outcome = match intent::command(text) {
            Some(command) => self.run_command(guard, command),
            None => match before {
                ConversationState::Collecting(record_type) => self.collect(guard, record_type, text)?,
                ConversationState::Confirming | ConversationState::Saving => {
                    self.confirm(guard, text).await?
                }
                ConversationState::Greeting => self.route(guard, text, true).await?,
                ConversationState::Idle
                | ConversationState::Completed
                | ConversationState::Cancelled => self.route(guard, text, false).await?,
            },
        };

        let after = guard.state();
        if before != after {
            info!(
                user_id = %guard.user_id,
                session_id = %guard.session_id,
                from = %before,
                to = %after,
                "state transition"
            );
        }

        guard.transcript.push(MessageRole::Assistant, outcome.reply.clone(), now);
        Ok(MessageResponse {
            reply_text: outcome.reply,
            next_question: outcome.question,
            progress_percent: outcome.progress_percent,
            is_complete: outcome.complete,
            session_id: (!guard.is_retired()).then(|| guard.session_id.clone()),
            persisted_record: outcome.persisted,
            state: after,
            signal: outcome.signal,
        })
    }

    fn run_command(&self, guard: &mut SessionGuard, command: Command) -> TurnOutcome {
        match command {
            Command::Reset => {
                guard.reset();
                TurnOutcome::say("Okay, let's start over. What would you like to record?")
            }
            Command::Cancel => {
                guard.finish(ConversationState::Cancelled);
                guard.retire();
                TurnOutcome::say("Okay, I've cancelled that. Message me any time.")
                    .with_signal(Signal::Cancelled)
            }
        }
    }

    /// A message outside any record collection.
    async fn route(&self, guard: &mut SessionGuard, text: &str, greeted: bool) -> Result<TurnOutcome> {
        let classification = intent::classify(text);
        debug!(
            user_id = %guard.user_id,
            intent = ?classification.intent,
            confidence = classification.confidence,
            "classified message"
        );

        match classification.intent {
            Intent::Greeting if !greeted => {
                guard.finish(ConversationState::Greeting);
                Ok(TurnOutcome::say(WELCOME))
            }
            Intent::HistoryRequest => {
                guard.finish(ConversationState::Idle);
                Ok(TurnOutcome::say("Here's what you've recorded so far.")
                    .with_signal(Signal::ShowHistory))
            }
            Intent::Record(record_type) => Ok(self.start(guard, record_type, text)),
            Intent::Greeting | Intent::General => {
                guard.finish(ConversationState::Idle);
                Ok(TurnOutcome::say(self.general_reply(&**guard, text).await))
            }
        }
    }

    fn start(&self, guard: &mut SessionGuard, record_type: RecordType, text: &str) -> TurnOutcome {
        let collector = RecordCollector::for_type(record_type, &self.config);
        let (collection, reply) = collector.start_collection(text, self.clock.local_now());
        guard.begin_collection(collection);
        if reply.complete {
            guard.transition(ConversationState::Confirming);
        }
        info!(
            user_id = %guard.user_id,
            session_id = %guard.session_id,
            record_type = %record_type,
            prefilled = ?reply.changed,
            "started collection"
        );
        TurnOutcome::from_collector(reply)
    }

    fn collect(&self, guard: &mut SessionGuard, record_type: RecordType, text: &str) -> Result<TurnOutcome> {
        let collector = RecordCollector::for_type(record_type, &self.config);
        let now = self.clock.local_now();
        let collection = guard.collection_mut().ok_or(IntakeError::NoActiveCollection)?;
        let reply = collector.process_response(collection, text, now);
        if reply.complete {
            guard.transition(ConversationState::Confirming);
        }
        Ok(TurnOutcome::from_collector(reply))
    }

    async fn confirm(&self, guard: &mut SessionGuard, text: &str) -> Result<TurnOutcome> {
        let record_type = guard
            .active_record_type()
            .ok_or(IntakeError::NoActiveCollection)?;
        let collector = RecordCollector::for_type(record_type, &self.config);

        match intent::confirmation(text) {
            Confirmation::Affirm => self.save(guard, &collector).await,
            Confirmation::Reject => {
                let now = self.clock.local_now();
                let collection = guard.collection_mut().ok_or(IntakeError::NoActiveCollection)?;
                let corrected = collector.apply_correction(collection, text, now);
                let progress_percent = collector.progress_percent(collection);

                match corrected {
                    Some(reply) => {
                        let state = if reply.complete {
                            ConversationState::Confirming
                        } else {
                            ConversationState::Collecting(record_type)
                        };
                        guard.transition(state);
                        Ok(TurnOutcome::from_collector(reply))
                    }
                    None => {
                        guard.transition(ConversationState::Collecting(record_type));
                        Ok(TurnOutcome {
                            progress_percent,
                            ..TurnOutcome::say("No problem. What should I change?")
                        })
                    }
                }
            }
            Confirmation::Unclear => {
                let collection = guard.collection().ok_or(IntakeError::NoActiveCollection)?;
                Ok(TurnOutcome {
                    progress_percent: collector.progress_percent(collection),
                    complete: true,
                    ..TurnOutcome::say(format!("Sorry, I didn't catch that. {}", CONFIRM_PROMPT))
                })
            }
        }
    }

    async fn save(&self, guard: &mut SessionGuard, collector: &RecordCollector<'_>) -> Result<TurnOutcome> {
        let record_type = collector.schema().record_type();
        let collection = guard.collection().ok_or(IntakeError::NoActiveCollection)?;
        let fields = collector.prepare_for_persistence(collection, self.clock.local_now().date());
        let progress_percent = collector.progress_percent(collection);

        guard.transition(ConversationState::Saving);
        info!(
            user_id = %guard.user_id,
            session_id = %guard.session_id,
            record_type = %record_type,
            "persisting record"
        );

        match self.records.persist(record_type, fields.clone(), &guard.user_id).await {
            Ok(record_id) => {
                info!(
                    user_id = %guard.user_id,
                    session_id = %guard.session_id,
                    record_id = %record_id,
                    "record saved"
                );
                guard.finish(ConversationState::Completed);
                guard.retire();

                let mut persisted = fields;
                persisted.insert("record_id".to_string(), Value::String(record_id));
                Ok(TurnOutcome {
                    progress_percent: 100,
                    complete: true,
                    persisted: Some(persisted),
                    ..TurnOutcome::say(format!("Your {} has been saved.", record_type))
                        .with_signal(Signal::RecordSaved)
                })
            }
            Err(err) => {
                warn!(
                    user_id = %guard.user_id,
                    session_id = %guard.session_id,
                    error = %err,
                    "record store write failed"
                );
                guard.transition(ConversationState::Confirming);
                Ok(TurnOutcome {
                    progress_percent,
                    complete: true,
                    ..TurnOutcome::say(format!(
                        "Sorry, I couldn't save your {} just now. Reply \"yes\" to try again.",
                        record_type
                    ))
                    .with_signal(Signal::SaveFailed)
                })
            }
        }
    }

    fn edit(&self, guard: &mut SessionGuard, field: &str, text: &str) -> Result<MessageResponse> {
        let record_type = guard
            .active_record_type()
            .ok_or(IntakeError::NoActiveCollection)?;
        let collector = RecordCollector::for_type(record_type, &self.config);
        let now = self.clock.local_now();

        let collection = guard.collection_mut().ok_or(IntakeError::NoActiveCollection)?;
        let changed = collector.apply_edit(collection, field, text, now)?;
        let complete = collector.is_complete(collection);
        let progress_percent = collector.progress_percent(collection);
        let reply_text = if complete {
            format!("Updated. {}", collector.summary(collection))
        } else {
            "Updated.".to_string()
        };

        if complete {
            guard.transition(ConversationState::Confirming);
        }
        guard.touch(self.clock.now());
        info!(
            user_id = %guard.user_id,
            session_id = %guard.session_id,
            changed = ?changed,
            "field edited"
        );

        Ok(MessageResponse {
            reply_text,
            next_question: None,
            progress_percent,
            is_complete: complete,
            session_id: Some(guard.session_id.clone()),
            persisted_record: None,
            state: guard.state(),
            signal: None,
        })
    }

    /// Answer for a message that is not about recording anything.
    async fn general_reply(&self, session: &Session, text: &str) -> String {
        if !intent::mentions_health_topic(text) {
            return HELP_MESSAGE.to_string();
        }
        let Some(responder) = &self.responder else {
            return HEALTH_FALLBACK.to_string();
        };

        let context = match self.records.list(&session.user_id).await {
            Ok(records) => records
                .iter()
                .take(RESPONDER_CONTEXT_RECORDS)
                .map(|record| Value::Object(record.fields.clone()).to_string())
                .collect::<Vec<_>>()
                .join("\n"),
            Err(err) => {
                warn!(user_id = %session.user_id, error = %err, "could not load records for context");
                String::new()
            }
        };
        let profile = UserProfile {
            user_id: session.user_id.clone(),
        };

        match responder
            .generate(text, &context, &profile, &session.transcript.messages())
            .await
        {
            Ok(answer) => answer,
            Err(err) => {
                warn!(user_id = %session.user_id, error = %err, "responder failed, using fallback");
                HEALTH_FALLBACK.to_string()
            }
        }
    }
}

fn apology(session: Option<&Session>) -> MessageResponse {
    MessageResponse {
        reply_text: APOLOGY.to_string(),
        next_question: None,
        progress_percent: 0,
        is_complete: false,
        session_id: session.map(|session| session.session_id.clone()),
        persisted_record: None,
        state: session.map_or(ConversationState::Idle, Session::state),
        signal: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::extract::test_support::monday_morning;
    use crate::storage::{InMemoryRecordStore, InMemorySessionStore};
    use async_trait::async_trait;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            IntakeConfig::default(),
            Arc::new(InMemorySessionStore::default()),
            Arc::new(InMemoryRecordStore::new()),
        )
        .with_clock(Arc::new(ManualClock::new(monday_morning())))
    }

    struct EchoResponder;

    #[async_trait]
    impl Responder for EchoResponder {
        async fn generate(
            &self,
            query: &str,
            _context: &str,
            profile: &UserProfile,
            history: &[crate::session::ChatMessage],
        ) -> Result<String> {
            Ok(format!("{} asked {:?} after {} messages", profile.user_id, query, history.len()))
        }
    }

    struct BrokenResponder;

    #[async_trait]
    impl Responder for BrokenResponder {
        async fn generate(
            &self,
            _query: &str,
            _context: &str,
            _profile: &UserProfile,
            _history: &[crate::session::ChatMessage],
        ) -> Result<String> {
            Err(IntakeError::Responder("model unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_greeting_is_one_shot() {
        let orchestrator = orchestrator();

        let response = orchestrator.handle_message("alice", "hello", None).await;
        assert_eq!(response.state, ConversationState::Greeting);
        assert_eq!(response.reply_text, WELCOME);

        let response = orchestrator.handle_message("alice", "hi again", None).await;
        assert_eq!(response.state, ConversationState::Idle);
        assert_eq!(response.reply_text, HELP_MESSAGE);
    }

    #[tokio::test]
    async fn test_history_request_signals_caller() {
        let orchestrator = orchestrator();
        let response = orchestrator.handle_message("alice", "show my history", None).await;
        assert_eq!(response.signal, Some(Signal::ShowHistory));
        assert_eq!(response.state, ConversationState::Idle);
    }

    #[tokio::test]
    async fn test_health_question_without_responder_uses_fallback() {
        let orchestrator = orchestrator();
        let response = orchestrator
            .handle_message("alice", "is it healthy to skip breakfast", None)
            .await;
        assert_eq!(response.reply_text, HEALTH_FALLBACK);
    }

    #[tokio::test]
    async fn test_health_question_goes_to_responder() {
        let orchestrator = orchestrator().with_responder(Arc::new(EchoResponder));
        let response = orchestrator
            .handle_message("alice", "how much sleep do I need", None)
            .await;
        assert_eq!(
            response.reply_text,
            "alice asked \"how much sleep do I need\" after 1 messages"
        );
    }

    #[tokio::test]
    async fn test_failing_responder_degrades_to_fallback() {
        let orchestrator = orchestrator().with_responder(Arc::new(BrokenResponder));
        let response = orchestrator
            .handle_message("alice", "tips for lowering blood pressure", None)
            .await;
        assert_eq!(response.reply_text, HEALTH_FALLBACK);
    }

    #[tokio::test]
    async fn test_unclear_confirmation_reprompts() {
        let orchestrator = orchestrator();
        orchestrator
            .handle_message("alice", "I have a headache, severity 7", None)
            .await;
        let response = orchestrator.handle_message("alice", "hmm", None).await;
        assert_eq!(response.state, ConversationState::Confirming);
        assert!(response.reply_text.ends_with(CONFIRM_PROMPT));
    }

    #[tokio::test]
    async fn test_negated_confirmation_does_not_save() {
        let orchestrator = orchestrator();
        orchestrator
            .handle_message("alice", "I have a headache, severity 7", None)
            .await;

        let response = orchestrator
            .handle_message("alice", "that's not correct", None)
            .await;
        assert!(response.persisted_record.is_none());
        assert_eq!(response.state, ConversationState::Collecting(RecordType::Symptom));
        assert!(orchestrator.records("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hedged_confirmation_reprompts() {
        let orchestrator = orchestrator();
        orchestrator
            .handle_message("bob", "I have a headache, severity 7", None)
            .await;

        let response = orchestrator.handle_message("bob", "I'm not sure", None).await;
        assert_eq!(response.state, ConversationState::Confirming);
        assert!(response.persisted_record.is_none());
        assert!(response.reply_text.ends_with(CONFIRM_PROMPT));
    }

    #[tokio::test]
    async fn test_mismatched_session_id_starts_fresh() {
        let orchestrator = orchestrator();
        let first = orchestrator.handle_message("alice", "my knee hurts", None).await;
        assert!(matches!(first.state, ConversationState::Collecting(RecordType::Symptom)));

        let response = orchestrator
            .handle_message("alice", "hello", Some("not-a-real-session"))
            .await;
        assert_eq!(response.state, ConversationState::Greeting);
        assert_ne!(response.session_id, first.session_id);
    }

    #[tokio::test]
    async fn test_edit_field_rejects_undeclared_field() {
        let orchestrator = orchestrator();
        orchestrator.handle_message("alice", "my knee hurts", None).await;

        let err = orchestrator
            .edit_field("alice", "dosage", "200 mg")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IntakeError::SchemaViolation { record_type: RecordType::Symptom, .. }
        ));

        let response = orchestrator.edit_field("alice", "severity", "4/10").await.unwrap();
        assert_eq!(response.state, ConversationState::Confirming);
        assert!(response.reply_text.contains("Severity: 4/10"));
    }

    #[tokio::test]
    async fn test_edit_field_without_session() {
        let orchestrator = orchestrator();
        let err = orchestrator
            .edit_field("nobody", "severity", "4")
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_reset_keeps_session_and_cancel_discards_it() {
        let orchestrator = orchestrator();
        let first = orchestrator.handle_message("alice", "my knee hurts", None).await;

        let reset = orchestrator.handle_message("alice", "start over", None).await;
        assert_eq!(reset.state, ConversationState::Idle);
        assert_eq!(reset.session_id, first.session_id);
        let session = orchestrator.session("alice").await.unwrap().unwrap();
        assert!(session.collection().is_none());

        orchestrator.handle_message("alice", "my knee hurts", None).await;
        let cancel = orchestrator.handle_message("alice", "cancel", None).await;
        assert_eq!(cancel.state, ConversationState::Cancelled);
        assert_eq!(cancel.signal, Some(Signal::Cancelled));
        assert!(cancel.session_id.is_none());
        assert!(orchestrator.session("alice").await.unwrap().is_none());
    }
}
