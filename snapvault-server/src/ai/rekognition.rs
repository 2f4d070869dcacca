//! AWS Rekognition labeler
//!
//! DetectLabels supplies labels and dominant colors; DetectText adds OCR
//! words as extra tags when enabled. OCR is best effort.

use async_trait::async_trait;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{DetectLabelsFeatureName, Image, TextTypes};
use aws_sdk_rekognition::Client;
use snapvault_common::config::AnalysisSettings;
use tracing::{debug, warn};

use super::labels::{self, ColorSample, DetectedLabel, DetectedText};
use super::{ImageLabeler, LabelAnalysis, ProviderError};

/// Rekognition always asks for at least this many labels before filtering
const MIN_REQUESTED_LABELS: usize = 20;

fn service_error<E: std::error::Error>(err: E) -> ProviderError {
    ProviderError::Service(DisplayErrorContext(err).to_string())
}

fn image_input(image: &[u8]) -> Image {
    Image::builder().bytes(Blob::new(image.to_vec())).build()
}

pub struct RekognitionLabeler {
    client: Client,
    settings: AnalysisSettings,
}

impl RekognitionLabeler {
    pub fn new(aws: &aws_config::SdkConfig, settings: AnalysisSettings) -> Self {
        Self {
            client: Client::new(aws),
            settings,
        }
    }

    async fn detect_labels(
        &self,
        image: &[u8],
    ) -> Result<(Vec<DetectedLabel>, Vec<ColorSample>), ProviderError> {
        let max_labels = self.settings.max_labels.max(MIN_REQUESTED_LABELS);

        let output = self
            .client
            .detect_labels()
            .image(image_input(image))
            .max_labels(max_labels as i32)
            .min_confidence(self.settings.min_confidence)
            .features(DetectLabelsFeatureName::GeneralLabels)
            .features(DetectLabelsFeatureName::ImageProperties)
            .send()
            .await
            .map_err(service_error)?;

        let detected = output
            .labels()
            .iter()
            .filter_map(|label| {
                Some(DetectedLabel {
                    name: label.name()?.to_string(),
                    confidence: label.confidence().unwrap_or(0.0),
                    parents: label
                        .parents()
                        .iter()
                        .filter_map(|p| p.name().map(str::to_string))
                        .collect(),
                })
            })
            .collect();

        let samples = output
            .image_properties()
            .map(|props| {
                props
                    .dominant_colors()
                    .iter()
                    .map(|c| ColorSample {
                        red: c.red().unwrap_or(0) as f32,
                        green: c.green().unwrap_or(0) as f32,
                        blue: c.blue().unwrap_or(0) as f32,
                        pixel_percent: c.pixel_percent().unwrap_or(0.0),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok((detected, samples))
    }

    async fn detect_words(&self, image: &[u8]) -> Result<Vec<String>, ProviderError> {
        let output = self
            .client
            .detect_text()
            .image(image_input(image))
            .send()
            .await
            .map_err(service_error)?;

        let detections: Vec<DetectedText> = output
            .text_detections()
            .iter()
            .filter_map(|d| {
                Some(DetectedText {
                    text: d.detected_text()?.to_string(),
                    confidence: d.confidence().unwrap_or(0.0),
                    is_word: d.r#type() == Some(&TextTypes::Word),
                })
            })
            .collect();

        Ok(labels::ocr_words(
            &detections,
            self.settings.min_confidence,
            self.settings.ocr_max_words,
        ))
    }
}

#[async_trait]
impl ImageLabeler for RekognitionLabeler {
    fn name(&self) -> &'static str {
        "rekognition"
    }

    async fn label(&self, image: &[u8]) -> Result<LabelAnalysis, ProviderError> {
        let (detected, samples) = self.detect_labels(image).await?;

        let words = if self.settings.ocr_enabled {
            match self.detect_words(image).await {
                Ok(words) => words,
                Err(e) => {
                    warn!(error = %e, "OCR detect_text failed; continuing without text tags");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let tags = labels::collect_tags(&detected, &words, &self.settings);
        let colors = labels::dominant_colors(&samples);
        debug!(tags = tags.len(), colors = colors.len(), "Rekognition labels");

        Ok(LabelAnalysis { tags, colors })
    }
}
