//! Gallery domain models
//!
//! An [`Image`] is one uploaded photo owned by a user. Its AI-derived data
//! lives in at most one [`ImageMetadata`] row, whose
//! [`ProcessingStatus`] follows a small lifecycle:
//!
//! ```text
//! pending ──► processing ──► completed
//!                 │
//!                 └──► failed ──► processing (retry)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// AI processing state of an image's metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// Whether the lifecycle permits moving from `self` to `next`
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
        )
    }

    /// Validate a transition, returning the new status
    pub fn transition_to(&self, next: ProcessingStatus) -> Result<ProcessingStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Statuses from which analysis may be (re)started
    pub fn startable() -> [ProcessingStatus; 2] {
        [ProcessingStatus::Pending, ProcessingStatus::Failed]
    }

    /// True while a client should keep polling for updates
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ProcessingStatus::Pending | ProcessingStatus::Processing)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(Error::InvalidInput(format!(
                "Unknown processing status: {}",
                other
            ))),
        }
    }
}

/// AI-generated metadata for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub id: i64,
    pub image_id: i64,
    pub user_id: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Dominant colors as `#rrggbb`
    pub colors: Vec<String>,
    pub ai_processing_status: ProcessingStatus,
    /// Description source: "bedrock", "openai" or "fallback"
    pub provider: Option<String>,
    pub analysis_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One uploaded photo with its metadata (if any)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub user_id: String,
    pub filename: String,
    pub original_path: String,
    pub thumbnail_path: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub metadata: Option<ImageMetadata>,
}

impl Image {
    pub fn tags(&self) -> &[String] {
        self.metadata.as_ref().map(|m| m.tags.as_slice()).unwrap_or(&[])
    }

    pub fn colors(&self) -> &[String] {
        self.metadata.as_ref().map(|m| m.colors.as_slice()).unwrap_or(&[])
    }

    pub fn description(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.description.as_deref())
    }

    pub fn status(&self) -> Option<ProcessingStatus> {
        self.metadata.as_ref().map(|m| m.ai_processing_status)
    }
}

/// Fields required to register a new image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub filename: String,
    pub original_path: String,
    pub thumbnail_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_allows_forward_transitions() {
        use ProcessingStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Processing));
    }

    #[test]
    fn test_lifecycle_rejects_skips_and_reversals() {
        use ProcessingStatus::*;
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Processing));

        let err = Completed.transition_to(Processing).unwrap_err();
        assert!(err.to_string().contains("completed -> processing"));
    }

    #[test]
    fn test_status_string_round_trip_and_serde_form() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ProcessingStatus>().unwrap(), status);
        }

        let json = serde_json::to_string(&ProcessingStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert!("done".parse::<ProcessingStatus>().is_err());
    }

    #[test]
    fn test_in_flight_statuses() {
        assert!(ProcessingStatus::Pending.is_in_flight());
        assert!(ProcessingStatus::Processing.is_in_flight());
        assert!(!ProcessingStatus::Completed.is_in_flight());
        assert!(!ProcessingStatus::Failed.is_in_flight());
    }

    #[test]
    fn test_image_accessors_without_metadata() {
        let image = Image {
            id: 1,
            user_id: "u1".to_string(),
            filename: "beach.jpg".to_string(),
            original_path: "https://cdn.example/beach.jpg".to_string(),
            thumbnail_path: None,
            uploaded_at: Utc::now(),
            metadata: None,
        };
        assert!(image.tags().is_empty());
        assert!(image.colors().is_empty());
        assert_eq!(image.description(), None);
        assert_eq!(image.status(), None);
    }
}
