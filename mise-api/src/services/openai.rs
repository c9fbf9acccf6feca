//! OpenAI-compatible chat completions client
//!
//! Serves both recipe generation (text in, text out) and ingredient
//! recognition (image in, comma-separated names out). Requests share one
//! rate limiter and one HTTP client with a request timeout.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use super::generator::{GenerationError, TextGenerator};
use mise_common::config::OpenAiConfig;

const USER_AGENT: &str = concat!("mise/", env!("CARGO_PKG_VERSION"));

const RECIPE_MAX_TOKENS: u32 = 1000;
const RECIPE_TEMPERATURE: f32 = 0.7;
const VISION_MAX_TOKENS: u32 = 300;

const VISION_PROMPT: &str = "Identify all food ingredients visible in this image. \
Return only a comma-separated list of ingredient names, no descriptions or additional text.";

type DirectRateLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: serde_json::Value,
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

pub struct OpenAiClient {
    http_client: reqwest::Client,
    rate_limiter: DirectRateLimiter,
    api_key: String,
    base_url: String,
    model: String,
    vision_model: String,
}

impl OpenAiClient {
    /// Build a client, or `None` when no API key is configured
    pub fn from_config(config: &OpenAiConfig) -> Result<Option<Self>, GenerationError> {
        let Some(api_key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = governor::RateLimiter::direct(governor::Quota::per_minute(per_minute));

        Ok(Some(Self {
            http_client,
            rate_limiter,
            api_key: api_key.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
        }))
    }

    /// Ask the vision model which ingredients an image shows
    ///
    /// Returns the raw reply text.
    pub async fn describe_image(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<String, GenerationError> {
        let data_url = format!("data:{};base64,{}", mime_type, STANDARD.encode(image));
        let content = serde_json::json!([
            { "type": "text", "text": VISION_PROMPT },
            { "type": "image_url", "image_url": { "url": data_url } }
        ]);

        let request = ChatRequest {
            model: &self.vision_model,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            max_tokens: VISION_MAX_TOKENS,
            temperature: None,
        };

        self.chat(&request).await
    }

    async fn chat(&self, request: &ChatRequest<'_>) -> Result<String, GenerationError> {
        self.rate_limiter.until_ready().await;

        debug!(model = request.model, "Sending chat completion request");

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(status.as_u16(), error_text));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::BadResponse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| GenerationError::BadResponse("empty completion".to_string()))
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: serde_json::Value::String(system.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: serde_json::Value::String(prompt.to_string()),
                },
            ],
            max_tokens: RECIPE_MAX_TOKENS,
            temperature: Some(RECIPE_TEMPERATURE),
        };

        self.chat(&request).await
    }
}
