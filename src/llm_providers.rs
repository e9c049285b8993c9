use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::errors::{FlashcardError, Result};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Common message structure for LLM requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
}

impl LLMMessage {
    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

/// Knobs shared by every provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 4000,
            temperature: 0.2,
        }
    }
}

/// Enum-based LLM provider implementation
///
/// Every provider returns the raw completion payload in the content-block
/// shape (`{"content": [{"type": "text", "text": ...}]}`) so extraction
/// never needs to know which vendor answered.
#[derive(Debug, Clone)]
pub enum LLMProvider {
    Anthropic(AnthropicProvider),
    OpenAI(OpenAIProvider),
}

impl LLMProvider {
    pub async fn make_request(&self, system_message: &str, prompt: &str) -> Result<Value> {
        match self {
            LLMProvider::Anthropic(provider) => provider.make_request(system_message, prompt).await,
            LLMProvider::OpenAI(provider) => provider.make_request(system_message, prompt).await,
        }
    }

    /// Get the provider name for logging
    pub fn provider_name(&self) -> &'static str {
        match self {
            LLMProvider::Anthropic(_) => "Anthropic",
            LLMProvider::OpenAI(_) => "OpenAI",
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            LLMProvider::Anthropic(provider) => &provider.model,
            LLMProvider::OpenAI(provider) => &provider.model,
        }
    }
}

async fn failed_request(provider: &'static str, response: reqwest::Response) -> FlashcardError {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    error!(
        provider = provider,
        status = %status,
        error = %error_text,
        "LLM API request failed"
    );
    FlashcardError::RemoteApi {
        status: status.as_u16(),
        body: error_text,
    }
}

/// Anthropic messages API
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    settings: GenerationSettings,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<LLMMessage>,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com/v1".to_string()),
            model: model.unwrap_or_else(|| "claude-3-7-sonnet-20250219".to_string()),
            settings,
        }
    }

    pub async fn make_request(&self, system_message: &str, prompt: &str) -> Result<Value> {
        let request_body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            system: system_message,
            messages: vec![LLMMessage::user(prompt)],
        };

        info!(
            provider = "Anthropic",
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        let response = self
            .client
            .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failed_request("Anthropic", response).await);
        }

        let payload: Value = response.json().await?;
        info!(
            provider = "Anthropic",
            blocks = payload.get("content").and_then(serde_json::Value::as_array).map_or(0, Vec::len),
            "Successfully received LLM response"
        );
        Ok(payload)
    }
}

/// OpenAI-compatible chat completions API
#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    settings: GenerationSettings,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<LLMMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIChoice {
    message: LLMMessage,
}

impl OpenAIProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            settings,
        }
    }

    pub async fn make_request(&self, system_message: &str, prompt: &str) -> Result<Value> {
        let request_body = OpenAIRequest {
            model: &self.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            messages: vec![
                LLMMessage {
                    role: "system".to_string(),
                    content: system_message.to_string(),
                },
                LLMMessage::user(prompt),
            ],
        };

        info!(
            provider = "OpenAI",
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failed_request("OpenAI", response).await);
        }

        let openai_response: OpenAIResponse = response.json().await?;
        Ok(content_blocks_from_openai(openai_response))
    }
}

/// Re-shape a chat completion into the content-block payload extraction expects.
fn content_blocks_from_openai(response: OpenAIResponse) -> Value {
    let blocks: Vec<Value> = response
        .choices
        .into_iter()
        .take(1)
        .map(|choice| json!({"type": "text", "text": choice.message.content}))
        .collect();
    json!({ "content": blocks })
}

/// Factory for creating LLM providers based on provider type
pub struct LLMProviderFactory;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LLMProviderType {
    #[default]
    Anthropic,
    OpenAI,
}

impl LLMProviderType {
    /// Parse a provider name; unknown names fall back to Anthropic.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => LLMProviderType::Anthropic,
            "openai" | "chatgpt" | "gpt" => LLMProviderType::OpenAI,
            _ => {
                info!("Unknown LLM provider '{}', defaulting to Anthropic", name);
                LLMProviderType::Anthropic
            }
        }
    }
}

impl LLMProviderFactory {
    pub fn create_provider(
        provider_type: LLMProviderType,
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        settings: GenerationSettings,
    ) -> LLMProvider {
        match provider_type {
            LLMProviderType::Anthropic => {
                LLMProvider::Anthropic(AnthropicProvider::new(api_key, base_url, model, settings))
            }
            LLMProviderType::OpenAI => {
                LLMProvider::OpenAI(OpenAIProvider::new(api_key, base_url, model, settings))
            }
        }
    }
}
