use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::question::FieldsAsked;
use crate::record::PartialRecord;
use crate::schema::RecordType;

/// Where a conversation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "record_type", rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    Greeting,
    Collecting(RecordType),
    Confirming,
    Saving,
    Completed,
    Cancelled,
}

impl ConversationState {
    /// States in which a record is being collected.
    pub fn has_active_record(&self) -> bool {
        matches!(
            self,
            ConversationState::Collecting(_)
                | ConversationState::Confirming
                | ConversationState::Saving
        )
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationState::Idle => f.write_str("idle"),
            ConversationState::Greeting => f.write_str("greeting"),
            ConversationState::Collecting(record_type) => write!(f, "collecting_{}", record_type),
            ConversationState::Confirming => f.write_str("confirming"),
            ConversationState::Saving => f.write_str("saving"),
            ConversationState::Completed => f.write_str("completed"),
            ConversationState::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Most recent messages of a conversation, oldest dropped first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    messages: VecDeque<ChatMessage>,
    limit: usize,
}

impl Transcript {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            limit,
        }
    }

    pub fn push(&mut self, role: MessageRole, content: impl Into<String>, timestamp: DateTime<Utc>) {
        if self.limit == 0 {
            return;
        }
        self.messages.push_back(ChatMessage {
            role,
            content: content.into(),
            timestamp,
        });
        while self.messages.len() > self.limit {
            self.messages.pop_front();
        }
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// The record currently being collected and the bookkeeping that goes with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub record_type: RecordType,
    pub fields: PartialRecord,
    pub fields_asked: FieldsAsked,
    /// Field whose question was sent last, if it is still awaiting an answer.
    pub pending_question: Option<String>,
    /// The next utterance overwrites values instead of only filling gaps.
    pub correcting: bool,
}

impl Collection {
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            fields: PartialRecord::new(),
            fields_asked: FieldsAsked::new(),
            pending_question: None,
            correcting: false,
        }
    }
}

/// One user's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub session_id: String,
    state: ConversationState,
    collection: Option<Collection>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub transcript: Transcript,
}

impl Session {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>, transcript_limit: usize) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: Uuid::new_v4().to_string(),
            state: ConversationState::Idle,
            collection: None,
            created_at: now,
            last_updated_at: now,
            transcript: Transcript::with_limit(transcript_limit),
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn active_record_type(&self) -> Option<RecordType> {
        self.collection.as_ref().map(|collection| collection.record_type)
    }

    pub fn collection(&self) -> Option<&Collection> {
        self.collection.as_ref()
    }

    pub fn collection_mut(&mut self) -> Option<&mut Collection> {
        self.collection.as_mut()
    }

    /// Start collecting a record. Replaces any collection in progress.
    pub fn begin_collection(&mut self, collection: Collection) {
        self.state = ConversationState::Collecting(collection.record_type);
        self.collection = Some(collection);
    }

    /// Move between states that keep the active record. Ignored without one.
    pub fn transition(&mut self, state: ConversationState) {
        if state.has_active_record() != self.collection.is_some() {
            return;
        }
        self.state = match state {
            ConversationState::Collecting(_) => self
                .active_record_type()
                .map_or(state, ConversationState::Collecting),
            other => other,
        };
    }

    /// Drop any record in progress and enter a state without one.
    pub fn finish(&mut self, state: ConversationState) {
        if state.has_active_record() {
            return;
        }
        self.collection = None;
        self.state = state;
    }

    /// Back to `Idle` with nothing collected. Identity and transcript are kept.
    pub fn reset(&mut self) {
        self.finish(ConversationState::Idle);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated_at = now;
    }

    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_updated_at < cutoff
    }
}
