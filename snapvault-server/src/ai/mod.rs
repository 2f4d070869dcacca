//! AI analysis: labeling and the description fallback chain
//!
//! An analysis fetches the image, asks the labeler for tags and colors
//! (required), then tries each description generator in priority order,
//! falling back to a fixed template when every provider fails.

pub mod bedrock;
pub mod fastapi;
pub mod fetch;
pub mod labels;
pub mod openai;
pub mod rekognition;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snapvault_common::config::{LabelerKind, Settings};
use snapvault_common::time::TimedOut;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// AI provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Timeout(#[from] TimedOut),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// AWS SDK call failed
    #[error("Service error: {0}")]
    Service(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("Failed to fetch image: {0}")]
    Fetch(String),

    #[error("Image exceeds {0} bytes")]
    TooLarge(usize),

    #[error("Provider returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Network(err.to_string())
    }
}

/// Tags and colors for one image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelAnalysis {
    pub tags: Vec<String>,
    pub colors: Vec<String>,
}

/// Which source produced a description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionSource {
    Bedrock,
    OpenAi,
    Fallback,
}

impl DescriptionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptionSource::Bedrock => "bedrock",
            DescriptionSource::OpenAi => "openai",
            DescriptionSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for DescriptionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loads image bytes for analysis
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Produces tags and dominant colors for an image
#[async_trait]
pub trait ImageLabeler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn label(&self, image: &[u8]) -> Result<LabelAnalysis, ProviderError>;
}

/// Turns tags into a short description
#[async_trait]
pub trait DescriptionGenerator: Send + Sync {
    fn source(&self) -> DescriptionSource;

    async fn describe(&self, tags: &[String]) -> Result<String, ProviderError>;
}

/// Deterministic description used when no provider succeeds
pub fn template_description(tags: &[String]) -> String {
    if tags.is_empty() {
        return "An image.".to_string();
    }
    let top: Vec<&str> = tags.iter().take(3).map(String::as_str).collect();
    format!("A photo of {}.", top.join(", "))
}

/// Description plus where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub text: String,
    pub source: DescriptionSource,
}

/// Result of a complete analysis
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub tags: Vec<String>,
    pub colors: Vec<String>,
    pub description: String,
    pub provider: DescriptionSource,
}

/// Fetch, label, then describe through the fallback chain
pub struct AnalysisPipeline {
    source: Arc<dyn ImageSource>,
    labeler: Arc<dyn ImageLabeler>,
    describers: Vec<Arc<dyn DescriptionGenerator>>,
}

impl AnalysisPipeline {
    pub fn new(source: Arc<dyn ImageSource>, labeler: Arc<dyn ImageLabeler>) -> Self {
        Self {
            source,
            labeler,
            describers: Vec::new(),
        }
    }

    /// Append a describer; earlier describers have priority
    pub fn with_describer(mut self, describer: Arc<dyn DescriptionGenerator>) -> Self {
        self.describers.push(describer);
        self
    }

    /// Build the production pipeline from settings
    pub fn from_settings(
        settings: &Settings,
        aws: &aws_config::SdkConfig,
    ) -> Result<Self, ProviderError> {
        let source = Arc::new(fetch::HttpImageSource::new(settings.server.max_fetch_bytes)?);

        let labeler: Arc<dyn ImageLabeler> = match settings.analysis.labeler {
            LabelerKind::Rekognition => Arc::new(rekognition::RekognitionLabeler::new(
                aws,
                settings.analysis.clone(),
            )),
            LabelerKind::OpenaiVision => Arc::new(openai::OpenAiVisionLabeler::new(
                openai::OpenAiClient::new(&settings.openai)?,
                settings.openai.vision_model.clone(),
                settings.analysis.max_labels,
            )),
        };

        let mut pipeline = Self::new(source, labeler);

        if settings.bedrock.enabled {
            pipeline = pipeline.with_describer(Arc::new(bedrock::BedrockDescriber::new(
                bedrock::BedrockClient::new(aws),
                settings.bedrock.clone(),
            )));
        }
        if settings.openai.is_usable() {
            pipeline = pipeline.with_describer(Arc::new(openai::OpenAiDescriber::new(
                openai::OpenAiClient::new(&settings.openai)?,
                settings.openai.model.clone(),
                settings.openai.max_tokens,
            )));
        } else if settings.openai.enabled {
            warn!("OpenAI descriptions enabled but no API key configured; skipping");
        }

        info!(
            labeler = pipeline.labeler.name(),
            describers = ?pipeline.describer_sources(),
            "Analysis pipeline ready"
        );

        Ok(pipeline)
    }

    pub fn labeler_name(&self) -> &'static str {
        self.labeler.name()
    }

    pub fn describer_sources(&self) -> Vec<DescriptionSource> {
        self.describers.iter().map(|d| d.source()).collect()
    }

    /// Fetch an image and label it
    pub async fn label_url(&self, image_url: &str) -> Result<LabelAnalysis, ProviderError> {
        let bytes = self.source.fetch(image_url).await?;
        debug!(bytes = bytes.len(), labeler = self.labeler.name(), "Labeling image");
        self.labeler.label(&bytes).await
    }

    /// Try each describer in turn; never fails
    pub async fn describe(&self, tags: &[String]) -> Description {
        if tags.is_empty() {
            return Description {
                text: template_description(tags),
                source: DescriptionSource::Fallback,
            };
        }

        for describer in &self.describers {
            let source = describer.source();
            match describer.describe(tags).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Description {
                        text: text.trim().to_string(),
                        source,
                    };
                }
                Ok(_) => {
                    warn!(
                        provider = %source,
                        error = %ProviderError::EmptyResponse,
                        "Description provider failed, falling through"
                    );
                }
                Err(e) => {
                    warn!(
                        provider = %source,
                        error = %e,
                        "Description provider failed, falling through"
                    );
                }
            }
        }

        Description {
            text: template_description(tags),
            source: DescriptionSource::Fallback,
        }
    }

    /// Full analysis; only labeling errors are returned
    pub async fn analyze(&self, image_url: &str) -> Result<AnalysisOutcome, ProviderError> {
        let LabelAnalysis { tags, colors } = self.label_url(image_url).await?;
        let description = self.describe(&tags).await;

        Ok(AnalysisOutcome {
            tags,
            colors,
            description: description.text,
            provider: description.source,
        })
    }
}
