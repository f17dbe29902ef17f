use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::ChatMessage;

/// What the core knows about the person it is talking to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
}

/// Free-text answers for turns that are not about recording anything.
///
/// Optional. Without one, or when it fails, a static reply is used.
#[async_trait]
pub trait Responder: Send + Sync {
    /// `context` holds the user's recent records, one per line.
    async fn generate(
        &self,
        query: &str,
        context: &str,
        profile: &UserProfile,
        history: &[ChatMessage],
    ) -> Result<String>;
}

/// Reply used when no responder is configured or the responder fails.
pub const HEALTH_FALLBACK: &str = "I can't answer health questions in detail, but I can help you \
keep track of them. You can tell me about a symptom, a treatment you're taking, or an upcoming \
doctor's appointment.";

pub const HELP_MESSAGE: &str = "I can help you log symptoms, treatments and doctor's appointments. \
Try something like \"I have a headache\" or \"I took 200mg of ibuprofen\".";
