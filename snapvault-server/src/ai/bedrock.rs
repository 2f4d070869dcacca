//! AWS Bedrock description generator
//!
//! Request and response bodies differ per model family; the family is picked
//! from the model id prefix.

use async_trait::async_trait;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client;
use serde_json::{json, Value};
use snapvault_common::config::BedrockSettings;
use snapvault_common::time::with_timeout;

use super::{DescriptionGenerator, DescriptionSource, ProviderError};

const TEMPERATURE: f64 = 0.7;
const TOP_P: f64 = 0.9;

/// Payload format of a Bedrock model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Claude,
    Titan,
    Nova,
    Llama,
    Generic,
}

impl ModelFamily {
    pub fn from_model_id(model_id: &str) -> Self {
        if model_id.starts_with("anthropic.claude") {
            ModelFamily::Claude
        } else if model_id.starts_with("amazon.titan") {
            ModelFamily::Titan
        } else if model_id.starts_with("amazon.nova") {
            ModelFamily::Nova
        } else if model_id.starts_with("meta.llama") {
            ModelFamily::Llama
        } else {
            ModelFamily::Generic
        }
    }

    /// Request body for a single-turn prompt
    pub fn build_payload(&self, prompt: &str, max_tokens: u32) -> Value {
        match self {
            ModelFamily::Claude => json!({
                "anthropic_version": "bedrock-2023-05-31",
                "max_tokens": max_tokens,
                "messages": [
                    { "role": "user", "content": [{ "type": "text", "text": prompt }] }
                ],
            }),
            ModelFamily::Titan => json!({
                "inputText": prompt,
                "textGenerationConfig": {
                    "maxTokenCount": max_tokens,
                    "temperature": TEMPERATURE,
                    "topP": TOP_P,
                },
            }),
            ModelFamily::Nova => json!({
                "messages": [
                    { "role": "user", "content": [{ "text": prompt }] }
                ],
                "inferenceConfig": {
                    "max_new_tokens": max_tokens,
                    "temperature": TEMPERATURE,
                    "top_p": TOP_P,
                },
            }),
            ModelFamily::Llama => json!({
                "prompt": prompt,
                "max_gen_len": max_tokens,
                "temperature": TEMPERATURE,
                "top_p": TOP_P,
            }),
            ModelFamily::Generic => json!({
                "prompt": prompt,
                "max_tokens": max_tokens,
            }),
        }
    }

    /// Generated text from a response body, trimmed; empty when absent
    pub fn extract_text(&self, body: &Value) -> String {
        let text = match self {
            ModelFamily::Claude => body.pointer("/content/0/text").and_then(Value::as_str),
            ModelFamily::Titan => body.pointer("/results/0/outputText").and_then(Value::as_str),
            ModelFamily::Nova => body
                .pointer("/output/message/content/0/text")
                .and_then(Value::as_str),
            ModelFamily::Llama => body.get("generation").and_then(Value::as_str),
            ModelFamily::Generic => body
                .get("text")
                .and_then(Value::as_str)
                .or_else(|| body.get("completion").and_then(Value::as_str)),
        };
        text.unwrap_or_default().trim().to_string()
    }
}

/// Prompt asking for two factual sentences about the tags
pub fn description_prompt(tags: &[String]) -> String {
    format!(
        "Write two factual sentences describing what is actually visible \
         in a photo containing: {}. \
         Only describe what is definitively present based on these tags. \
         Do not add imagined elements, mood, or context \
         that cannot be confirmed from the tags alone.",
        tags.join(", ")
    )
}

/// Thin InvokeModel wrapper
#[derive(Clone)]
pub struct BedrockClient {
    client: Client,
    region: Option<String>,
}

impl BedrockClient {
    pub fn new(aws: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(aws),
            region: aws.region().map(|r| r.to_string()),
        }
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Invoke a model with a JSON body and parse the JSON reply
    pub async fn invoke(&self, model_id: &str, payload: &Value) -> Result<Value, ProviderError> {
        let body = serde_json::to_vec(payload).map_err(|e| ProviderError::Parse(e.to_string()))?;

        let output = self
            .client
            .invoke_model()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| ProviderError::Service(DisplayErrorContext(e).to_string()))?;

        serde_json::from_slice(output.body().as_ref())
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

pub struct BedrockDescriber {
    client: BedrockClient,
    settings: BedrockSettings,
}

impl BedrockDescriber {
    pub fn new(client: BedrockClient, settings: BedrockSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl DescriptionGenerator for BedrockDescriber {
    fn source(&self) -> DescriptionSource {
        DescriptionSource::Bedrock
    }

    async fn describe(&self, tags: &[String]) -> Result<String, ProviderError> {
        let model_id = &self.settings.model_id;
        let family = ModelFamily::from_model_id(model_id);
        let payload = family.build_payload(&description_prompt(tags), self.settings.max_tokens);

        let body =
            with_timeout(self.settings.timeout_ms, self.client.invoke(model_id, &payload)).await??;

        let text = family.extract_text(&body);
        if text.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }
}
