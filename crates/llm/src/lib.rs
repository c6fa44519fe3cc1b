//! # Summary LLM
//!
//! [`LlmClient`] implementation for any OpenAI-compatible chat-completions endpoint
//! (hosted gateways, vLLM, Ollama and similar).
//!
//! The client sends one request per call and does not retry. Deadlines are applied by the
//! caller through `summary_core::collaborators::invoke_with_timeout`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use summary_core::collaborators::LlmResult;
use summary_core::{CompletionRequest, LlmClient, LlmError};

pub const ENV_LLM_BASE_URL: &str = "LLM_BASE_URL";
pub const ENV_LLM_API_KEY: &str = "LLM_API_KEY";
pub const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434/v1";

const TEMPERATURE: f32 = 0.2;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the completions endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl LlmSettings {
    /// Resolve settings from `LLM_BASE_URL` and `LLM_API_KEY`.
    ///
    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            base_url: non_blank(ENV_LLM_BASE_URL)
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            api_key: non_blank(ENV_LLM_API_KEY),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.into(),
            api_key: None,
        }
    }
}

pub struct HttpLlmClient {
    client: Client,
    settings: LlmSettings,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpLlmClient {
    /// # Errors
    ///
    /// Returns [`LlmError::Transport`] if the HTTP client cannot be built.
    pub fn new(settings: LlmSettings) -> LlmResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn invoke(&self, request: &CompletionRequest) -> LlmResult<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &request.model,
            messages,
            temperature: TEMPERATURE,
        };

        tracing::debug!(model = %request.model, prompt_len = request.prompt.len(), "invoking model");

        let mut http = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.settings.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(model = %request.model, %status, "model API returned an error");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("failed to parse model response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}
