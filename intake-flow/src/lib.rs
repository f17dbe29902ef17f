pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod extract;
pub mod intent;
pub mod orchestrator;
pub mod question;
pub mod record;
pub mod responder;
pub mod schema;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use collector::{CollectorReply, RecordCollector};
pub use config::IntakeConfig;
pub use error::{IntakeError, Result};
pub use extract::{ExtractionContext, ExtractionResult, FieldMatcher};
pub use intent::{Classification, Intent};
pub use orchestrator::{MessageResponse, Orchestrator, Signal};
pub use question::{FieldsAsked, Question};
pub use record::{FieldValue, PartialRecord};
pub use responder::{Responder, UserProfile};
pub use schema::{FieldKind, FieldSpec, RecordSchema, RecordType};
pub use session::{ChatMessage, Collection, ConversationState, MessageRole, Session};
pub use storage::{
    InMemoryRecordStore, InMemorySessionStore, RecordStore, SessionGuard, SessionStore,
    StoredRecord,
};
