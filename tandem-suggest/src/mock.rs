//! Scripted suggestion provider for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::{SuggestError, SuggestionProvider, SuggestionRequest};

/// Scripted provider for tests.
///
/// Serves queued proposals in order and repeats the last one once the
/// queue is spent.
pub struct ScriptedSuggestions {
    proposals: Vec<String>,
    available: AtomicBool,
    call_count: AtomicU32,
}

impl ScriptedSuggestions {
    /// Create a provider with one canned proposal.
    pub fn new(proposal: impl Into<String>) -> Self {
        Self {
            proposals: vec![proposal.into()],
            available: AtomicBool::new(true),
            call_count: AtomicU32::new(0),
        }
    }

    /// Queue a further proposal.
    pub fn with_proposal(mut self, proposal: impl Into<String>) -> Self {
        self.proposals.push(proposal.into());
        self
    }

    /// Set whether the provider reports itself reachable.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Number of times `propose` was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedSuggestions {
    fn default() -> Self {
        Self::new("Do something thoughtful and unexpected.")
    }
}

#[async_trait]
impl SuggestionProvider for ScriptedSuggestions {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn propose(&self, _request: SuggestionRequest) -> Result<String, SuggestError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) as usize;

        if !self.available.load(Ordering::SeqCst) {
            return Err(SuggestError::Unavailable(
                "Scripted provider disabled".to_string(),
            ));
        }

        let index = call.min(self.proposals.len() - 1);
        Ok(self.proposals[index].clone())
    }
}
