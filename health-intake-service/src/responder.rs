//! OpenRouter-backed answers for health questions that are not record entries.

use async_trait::async_trait;
use intake_flow::{ChatMessage, IntakeError, MessageRole, Responder, UserProfile};
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::{Chat, Message},
    providers::openrouter,
};
use tracing::info;

const MODEL: &str = "openai/gpt-4o-mini";

const PREAMBLE: &str = r#"
You are a friendly health journal assistant.
You help people keep track of their symptoms, treatments and doctor's appointments.
Answer general health questions briefly and in plain language.
Do not diagnose. When something sounds serious, suggest talking to a doctor.
Offer to record a symptom, treatment or appointment when it fits the conversation."#;

pub struct OpenRouterResponder {
    api_key: String,
}

impl OpenRouterResponder {
    /// Returns `None` when `OPENROUTER_API_KEY` is not set.
    pub fn from_env() -> Option<Self> {
        std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| Self { api_key })
    }

    fn agent(&self) -> Agent<openrouter::CompletionModel> {
        let client = openrouter::Client::new(&self.api_key);
        client.agent(MODEL).preamble(PREAMBLE).build()
    }
}

#[async_trait]
impl Responder for OpenRouterResponder {
    async fn generate(
        &self,
        query: &str,
        context: &str,
        profile: &UserProfile,
        history: &[ChatMessage],
    ) -> intake_flow::Result<String> {
        let prompt = if context.is_empty() {
            query.to_string()
        } else {
            format!(
                r#"
            Recently recorded entries for this user, newest first:
            {context}

            Question: {query}"#
            )
        };

        info!(user_id = %profile.user_id, history = history.len(), "asking responder");

        self.agent()
            .chat(&prompt, to_rig_messages(earlier_turns(history, query)))
            .await
            .map_err(|e| IntakeError::Responder(format!("LLM chat failed: {}", e)))
    }
}

/// The transcript ends with the message being answered; leave it out of the history.
fn earlier_turns<'a>(history: &'a [ChatMessage], query: &str) -> &'a [ChatMessage] {
    match history.split_last() {
        Some((last, earlier)) if last.role == MessageRole::User && last.content == query => earlier,
        _ => history,
    }
}

fn to_rig_messages(messages: &[ChatMessage]) -> Vec<Message> {
    messages
        .iter()
        .map(|msg| match msg.role {
            MessageRole::User => Message::user(msg.content.clone()),
            MessageRole::Assistant => Message::assistant(msg.content.clone()),
        })
        .collect()
}
