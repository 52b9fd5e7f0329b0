//! OpenAI-compatible suggestion provider.
//!
//! Works with any OpenAI-compatible chat completions API, including
//! vLLM, Ollama, and the OpenAI API itself.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{SuggestError, SuggestionProvider, SuggestionRequest};

const SYSTEM_PROMPT: &str = "You suggest small, safe, in-person acts of kindness \
between two people who have just met. Reply with exactly one suggestion as a \
single short sentence, with no preamble.";

/// Suggestion provider backed by an OpenAI-compatible API.
pub struct OpenAiSuggester {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiSuggester {
    /// Create a new provider.
    ///
    /// `base_url` should point at the API root, e.g.
    /// `https://api.openai.com/v1` or `http://localhost:8000/v1`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            max_tokens: 120,
            temperature: 0.9,
        }
    }

    /// Provider pointing at a local Ollama instance.
    pub fn ollama(model: &str) -> Self {
        Self::new("http://localhost:11434/v1", model, None)
    }

    /// Provider for the hosted OpenAI API.
    pub fn openai(model: &str, api_key: impl Into<String>) -> Self {
        Self::new("https://api.openai.com/v1", model, Some(api_key.into()))
    }

    /// Override the completion token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|key| format!("Bearer {}", key))
    }

    fn build_prompt(request: &SuggestionRequest) -> String {
        let mut prompt = format!(
            "Suggest one small act of kindness two strangers paired around \
             \"{}\" can do for each other.\n",
            request.topic
        );
        if !request.accepted.is_empty() {
            prompt.push_str(&format!(
                "They already completed: {}\n",
                request.accepted.join("; ")
            ));
        }
        if !request.declined.is_empty() {
            prompt.push_str(&format!(
                "Do not repeat these declined ideas: {}\n",
                request.declined.join("; ")
            ));
        }
        prompt
    }
}

#[async_trait]
impl SuggestionProvider for OpenAiSuggester {
    fn id(&self) -> &str {
        &self.model
    }

    async fn propose(&self, request: SuggestionRequest) -> Result<String, SuggestError> {
        let chat_request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::build_prompt(&request),
                },
            ],
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        };

        let mut http_request = self.client.post(self.chat_completions_url());
        if let Some(auth) = self.auth_header() {
            http_request = http_request.header(header::AUTHORIZATION, auth);
        }

        let response = http_request
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| SuggestError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                return Err(SuggestError::RateLimited);
            }
            let body = response.text().await.unwrap_or_default();
            return Err(SuggestError::RequestFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| SuggestError::ParseError(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        // Models occasionally wrap the sentence in quotes or pad it with
        // blank lines; keep the first non-empty line.
        let task = content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| line.trim_matches('"').to_string())
            .ok_or_else(|| SuggestError::ParseError("Empty completion".to_string()))?;

        debug!(model = %self.model, task = %task, "Proposal generated");
        Ok(task)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
