//! LLM-backed agents and the deadline-bounded invoker that runs them.
//!
//! Every agent reads what it needs from the store, makes one completion call,
//! and returns the text to send back to the user. The router never calls an
//! agent directly: it goes through [`AgentInvoker`], which enforces the
//! per-agent deadline and turns failures into canned replies.

pub mod context;
pub mod food;
pub mod insights;
pub mod invoker;
pub mod questions;
pub mod summary;

pub use context::UserContext;
pub use food::FoodAnalyzer;
pub use insights::InsightsAgent;
pub use invoker::{AgentInvoker, AgentReply};
pub use questions::QuestionsAgent;
pub use summary::DailySummaryAgent;

use std::time::Duration;

use async_trait::async_trait;

use crate::channels::PhotoData;
use crate::config::AgentTimeouts;
use crate::error::AgentError;
use crate::onboarding::User;

/// The agents the bot can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Food,
    Insights,
    Summary,
    Questions,
}

impl AgentKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Food => "food_analyzer",
            Self::Insights => "insights",
            Self::Summary => "daily_summary",
            Self::Questions => "questions",
        }
    }

    pub fn deadline(&self, timeouts: &AgentTimeouts) -> Duration {
        match self {
            Self::Food => timeouts.food,
            Self::Insights => timeouts.insights,
            Self::Summary => timeouts.summary,
            Self::Questions => timeouts.questions,
        }
    }

    /// Sent right before the agent starts.
    pub fn progress_notice(&self) -> &'static str {
        match self {
            Self::Food => "🔍 Analyzing your meal...",
            Self::Insights => {
                "🔍 Analyzing your data to generate personalized insights...\n\n\
                 This may take a moment."
            }
            Self::Summary => "☀️ Putting together your daily summary...",
            Self::Questions => "💭 Thinking...",
        }
    }

    pub fn failure_message(&self) -> &'static str {
        match self {
            Self::Food => "Sorry, I had trouble analyzing that photo. Please try again.",
            Self::Insights => {
                "Sorry, I had trouble generating your insights. Please try again in a moment."
            }
            Self::Summary => {
                "Sorry, I had trouble generating your daily summary. Please try again in a moment."
            }
            Self::Questions => {
                "Sorry, I had trouble answering your question. Please try again in a moment."
            }
        }
    }

    pub fn timeout_message(&self) -> &'static str {
        match self {
            Self::Food => {
                "⏳ Analyzing that photo is taking longer than expected. \
                 Please try sending it again."
            }
            Self::Insights => {
                "⏳ Generating your insights is taking longer than expected. \
                 Please try again in a moment."
            }
            Self::Summary => {
                "⏳ Your daily summary is taking longer than expected. \
                 Please try again in a moment."
            }
            Self::Questions => {
                "⏳ That question is taking longer than expected to answer. \
                 Please try again or rephrase it."
            }
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Input beyond the user record.
#[derive(Debug, Clone)]
pub enum AgentPayload {
    None,
    Text(String),
    Photo(PhotoData),
}

#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub user: User,
    pub payload: AgentPayload,
}

impl AgentRequest {
    pub fn new(user: User) -> Self {
        Self {
            user,
            payload: AgentPayload::None,
        }
    }

    pub fn with_text(user: User, text: impl Into<String>) -> Self {
        Self {
            user,
            payload: AgentPayload::Text(text.into()),
        }
    }

    pub fn with_photo(user: User, photo: PhotoData) -> Self {
        Self {
            user,
            payload: AgentPayload::Photo(photo),
        }
    }
}

/// An agent produces the user-facing text for one request.
#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    async fn run(&self, request: AgentRequest) -> Result<String, AgentError>;
}

/// Pull JSON out of model output that may wrap it in prose or a code fence.
pub(crate) fn extract_json_object(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner;
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return &trimmed[start..=end];
    }

    trimmed
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_object() {
        assert_eq!(extract_json_object(" {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn extracts_fenced_object() {
        let raw = "Here you go:\n```json\n{\"is_food\": true}\n```";
        assert_eq!(extract_json_object(raw), "{\"is_food\": true}");
        let bare = "```\n{\"is_food\": false}\n```";
        assert_eq!(extract_json_object(bare), "{\"is_food\": false}");
    }

    #[test]
    fn extracts_object_from_prose() {
        let raw = "Sure! {\"calories\": 500} Hope that helps.";
        assert_eq!(extract_json_object(raw), "{\"calories\": 500}");
    }

    #[test]
    fn deadlines_follow_config() {
        let t = AgentTimeouts::default();
        assert_eq!(AgentKind::Food.deadline(&t), Duration::from_secs(60));
        assert_eq!(AgentKind::Summary.deadline(&t), Duration::from_secs(30));
    }

    #[test]
    fn timeout_and_failure_copy_differ() {
        for kind in [
            AgentKind::Food,
            AgentKind::Insights,
            AgentKind::Summary,
            AgentKind::Questions,
        ] {
            assert_ne!(kind.timeout_message(), kind.failure_message());
        }
    }
}
