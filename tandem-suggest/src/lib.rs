//! Task suggestion providers.
//!
//! Once two participants are paired they need a small cooperative task
//! to carry out. [`SuggestionProvider`] abstracts where that text comes
//! from: a built-in list, an OpenAI-compatible completion API, or a
//! scripted mock for tests. Providers are stateless; callers pass the
//! pair's history so repeats can be avoided.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod mock;
pub mod openai;
pub mod static_list;

// Re-export main types
pub use mock::ScriptedSuggestions;
pub use openai::OpenAiSuggester;
pub use static_list::StaticSuggestions;

/// Error types for suggestion providers.
#[derive(Debug, thiserror::Error)]
pub enum SuggestError {
    /// Provider is not reachable or disabled
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Rate limited by the provider
    #[error("Rate limited")]
    RateLimited,

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Response could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Context handed to a provider for one proposal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionRequest {
    /// Topic the pair is working within
    pub topic: String,
    /// Tasks the pair already accepted
    pub accepted: Vec<String>,
    /// Tasks the pair turned down
    pub declined: Vec<String>,
}

impl SuggestionRequest {
    /// Create a request for a topic.
    pub fn for_topic(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    /// Record a previously accepted task.
    pub fn with_accepted(mut self, task: impl Into<String>) -> Self {
        self.accepted.push(task.into());
        self
    }

    /// Record a previously declined task.
    pub fn with_declined(mut self, task: impl Into<String>) -> Self {
        self.declined.push(task.into());
        self
    }

    /// Record several previously declined tasks.
    pub fn with_declined_all(mut self, tasks: impl IntoIterator<Item = String>) -> Self {
        self.declined.extend(tasks);
        self
    }
}

/// Source of short cooperative task descriptions.
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    /// Provider identifier for logs.
    fn id(&self) -> &str;

    /// Produce one task description for the given context.
    async fn propose(&self, request: SuggestionRequest) -> Result<String, SuggestError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders_accumulate_history() {
        let request = SuggestionRequest::for_topic("parks")
            .with_accepted("Share a snack.")
            .with_declined("Sing a duet.")
            .with_declined_all(vec!["Plant a tree.".to_string()]);

        assert_eq!(request.topic, "parks");
        assert_eq!(request.accepted, vec!["Share a snack."]);
        assert_eq!(request.declined, vec!["Sing a duet.", "Plant a tree."]);
    }
}
