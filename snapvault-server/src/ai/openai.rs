//! OpenAI chat completions: description generator and vision labeler

use async_trait::async_trait;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use snapvault_common::config::OpenAiSettings;
use snapvault_common::time::with_timeout;
use tracing::debug;

use super::labels;
use super::{DescriptionGenerator, DescriptionSource, ImageLabeler, LabelAnalysis, ProviderError};

const USER_AGENT: &str = concat!("snapvault/", env!("CARGO_PKG_VERSION"));
const TEMPERATURE: f64 = 0.7;
const VISION_TAG_TOKENS: u32 = 300;
const VISION_COLOR_TOKENS: u32 = 100;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// One chat message; `content` is a string or a list of content parts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Value,
}

impl ChatMessage {
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Value::String(text.into()),
        }
    }

    pub fn with_image(prompt: &str, data_url: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: json!([
                { "type": "text", "text": prompt },
                { "type": "image_url", "image_url": { "url": data_url } },
            ]),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatReply,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletion {
    /// Trimmed text of the first choice
    pub fn text(&self) -> String {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }
}

/// Minimal chat completions client
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout_ms: u64,
}

impl OpenAiClient {
    pub fn new(settings: &OpenAiSettings) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            timeout_ms: settings.timeout_ms,
        })
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// One chat completion, bounded by the configured timeout
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: Option<u32>,
        temperature: Option<f64>,
    ) -> Result<ChatCompletion, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("OPENAI_API_KEY"))?;

        let request = ChatRequest {
            model,
            messages,
            max_tokens,
            temperature,
        };

        let send = async {
            let response = self
                .http_client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(api_key)
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| {
                        v.pointer("/error/message")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .unwrap_or(body);
                return Err(ProviderError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            response
                .json::<ChatCompletion>()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()))
        };

        with_timeout(self.timeout_ms, send).await?
    }
}

/// Whether a reply looks cut off and deserves one continuation request
pub fn needs_continuation(text: &str, finish_reason: Option<&str>) -> bool {
    if text.is_empty() {
        return false;
    }
    finish_reason == Some("length") || !text.ends_with(['.', '!', '?'])
}

/// Append a continuation, collapsing whitespace
pub fn join_continuation(head: &str, tail: &str) -> String {
    WHITESPACE
        .replace_all(&format!("{} {}", head, tail), " ")
        .trim()
        .to_string()
}

/// Token budget for the continuation request
pub fn continuation_tokens(max_tokens: u32) -> u32 {
    (max_tokens / 2).clamp(20, 60)
}

fn description_prompt(tags: &[String]) -> String {
    format!(
        "Write exactly two concise sentences describing a photo that includes: {}. \
         Each sentence must be under 22 words, end with a period, and avoid semicolons. \
         Only describe what is actually present based on these tags - \
         do not add imagined objects, settings, or mood elements.",
        tags.join(", ")
    )
}

const CONTINUATION_SYSTEM: &str = "You complete partial outputs succinctly without repeating.";
const CONTINUATION_PROMPT: &str =
    "Continue and finish the description in exactly one short sentence (under 18 words). \
     Do not repeat earlier text. Finish the thought naturally.";

pub struct OpenAiDescriber {
    client: OpenAiClient,
    model: String,
    max_tokens: u32,
}

impl OpenAiDescriber {
    pub fn new(client: OpenAiClient, model: String, max_tokens: u32) -> Self {
        Self {
            client,
            model,
            max_tokens,
        }
    }

    async fn continue_text(&self, text: &str) -> Result<String, ProviderError> {
        let messages = [
            ChatMessage::text("system", CONTINUATION_SYSTEM),
            ChatMessage::text("user", CONTINUATION_PROMPT),
            ChatMessage::text("assistant", text),
        ];
        let completion = self
            .client
            .chat(
                &self.model,
                &messages,
                Some(continuation_tokens(self.max_tokens)),
                Some(TEMPERATURE),
            )
            .await?;
        Ok(completion.text())
    }
}

#[async_trait]
impl DescriptionGenerator for OpenAiDescriber {
    fn source(&self) -> DescriptionSource {
        DescriptionSource::OpenAi
    }

    async fn describe(&self, tags: &[String]) -> Result<String, ProviderError> {
        let messages = [ChatMessage::text("user", description_prompt(tags))];
        let completion = self
            .client
            .chat(&self.model, &messages, Some(self.max_tokens), Some(TEMPERATURE))
            .await?;

        let mut text = completion.text();
        if text.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        if needs_continuation(&text, completion.finish_reason()) {
            match self.continue_text(&text).await {
                Ok(tail) if !tail.is_empty() => text = join_continuation(&text, &tail),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Continuation request failed; keeping partial text"),
            }
        }

        Ok(text)
    }
}

const VISION_TAGS_PROMPT: &str = "Analyze this image and provide a JSON array of \
     10-15 relevant tags/labels that describe what's visible. \
     Focus on: objects, actions, scene type, colors, and notable features. \
     Return ONLY a valid JSON array of strings, no other text.";

const VISION_COLORS_PROMPT: &str = "Identify the 3 most dominant colors in this image. \
     Return ONLY a JSON array of exactly 3 hex color codes \
     (e.g., [\"#ff5733\", \"#33c1ff\", \"#2d5016\"]), no other text.";

/// `data:` URL for inline image content
pub fn data_url(image: &[u8]) -> String {
    let mime = image::guess_format(image)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg");
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(image)
    )
}

/// Tags and colors from a vision-capable chat model
pub struct OpenAiVisionLabeler {
    client: OpenAiClient,
    model: String,
    max_labels: usize,
}

impl OpenAiVisionLabeler {
    pub fn new(client: OpenAiClient, model: String, max_labels: usize) -> Self {
        Self {
            client,
            model,
            max_labels,
        }
    }

    async fn ask(&self, prompt: &str, url: &str, max_tokens: u32) -> Result<String, ProviderError> {
        let messages = [ChatMessage::with_image(prompt, url)];
        let completion = self
            .client
            .chat(&self.model, &messages, Some(max_tokens), None)
            .await?;
        Ok(completion.text())
    }
}

#[async_trait]
impl ImageLabeler for OpenAiVisionLabeler {
    fn name(&self) -> &'static str {
        "openai-vision"
    }

    async fn label(&self, image: &[u8]) -> Result<LabelAnalysis, ProviderError> {
        let url = data_url(image);

        let (tag_reply, color_reply) = futures::future::try_join(
            self.ask(VISION_TAGS_PROMPT, &url, VISION_TAG_TOKENS),
            self.ask(VISION_COLORS_PROMPT, &url, VISION_COLOR_TOKENS),
        )
        .await?;

        let mut tags = labels::parse_tag_reply(&tag_reply);
        tags.truncate(self.max_labels);

        Ok(LabelAnalysis {
            tags,
            colors: labels::parse_color_reply(&color_reply),
        })
    }
}
