//! Built-in suggestion list.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::{SuggestError, SuggestionProvider, SuggestionRequest};

/// Default task descriptions.
const DEFAULT_TASKS: &[&str] = &[
    "Give a compliment and buy a small treat for the other person.",
    "Write a short, kind note and leave it somewhere for them to find.",
    "Offer to carry something heavy or help with a small chore.",
    "Draw something meaningful for the other person.",
    "Prepare a surprise snack or drink they might enjoy.",
    "Tell them something you genuinely admire about them.",
    "Offer to listen without interrupting for 5 minutes.",
    "Give them a small handmade item (origami, bracelet, etc.).",
    "Find a photo of a shared memory and write a message about it.",
    "Teach them something useful in less than 2 minutes.",
];

/// Served when every list entry has already been used or declined.
const FALLBACK_TASK: &str = "Do something thoughtful and unexpected.";

/// Uniform pick from a fixed list, skipping tasks the pair has already
/// seen.
pub struct StaticSuggestions {
    tasks: Vec<String>,
}

impl StaticSuggestions {
    /// Create a provider with the default list.
    pub fn new() -> Self {
        Self {
            tasks: DEFAULT_TASKS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Create a provider with a custom list.
    pub fn with_tasks(tasks: impl IntoIterator<Item = String>) -> Self {
        Self {
            tasks: tasks.into_iter().collect(),
        }
    }
}

impl Default for StaticSuggestions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SuggestionProvider for StaticSuggestions {
    fn id(&self) -> &str {
        "static"
    }

    async fn propose(&self, request: SuggestionRequest) -> Result<String, SuggestError> {
        let fresh: Vec<&str> = self
            .tasks
            .iter()
            .map(String::as_str)
            .filter(|task| {
                !request.declined.iter().any(|d| d == task)
                    && !request.accepted.iter().any(|a| a == task)
            })
            .collect();

        let pick = {
            let mut rng = rand::thread_rng();
            fresh.choose(&mut rng).copied()
        };
        let task = pick.unwrap_or(FALLBACK_TASK).to_string();

        debug!(topic = %request.topic, task = %task, "Proposal picked");
        Ok(task)
    }
}
