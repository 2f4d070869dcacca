//! Gallery search filters
//!
//! Text and color filters applied to a user's gallery listing. Similar-image
//! queries are handled by [`crate::similarity`] and take precedence over both.

use serde::Deserialize;

use crate::models::Image;

/// Query parameters accepted by the gallery listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GalleryQuery {
    /// Single-image lookup
    pub id: Option<i64>,
    /// Case-insensitive text match over filename, description and tags
    pub q: Option<String>,
    /// Exact hex color, `#` optional
    pub color: Option<String>,
    /// Id of the image to find similar images for
    #[serde(rename = "similarTo")]
    pub similar_to: Option<i64>,
}

/// Canonical `#rrggbb` form of a user-supplied color, or None when blank
pub fn normalize_hex(color: &str) -> Option<String> {
    let trimmed = color.trim().trim_start_matches('#');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!("#{}", trimmed.to_lowercase()))
}

/// Combined text/color filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    needle: Option<String>,
    color: Option<String>,
}

impl SearchFilter {
    pub fn new(q: Option<&str>, color: Option<&str>) -> Self {
        let needle = q
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());
        Self {
            needle,
            color: color.and_then(normalize_hex),
        }
    }

    pub fn from_query(query: &GalleryQuery) -> Self {
        Self::new(query.q.as_deref(), query.color.as_deref())
    }

    /// True when no filter is active
    pub fn is_empty(&self) -> bool {
        self.needle.is_none() && self.color.is_none()
    }

    pub fn matches(&self, image: &Image) -> bool {
        self.matches_text(image) && self.matches_color(image)
    }

    fn matches_text(&self, image: &Image) -> bool {
        let Some(needle) = &self.needle else {
            return true;
        };
        image.filename.to_lowercase().contains(needle)
            || image
                .description()
                .is_some_and(|d| d.to_lowercase().contains(needle))
            || image.tags().iter().any(|t| t.to_lowercase().contains(needle))
    }

    fn matches_color(&self, image: &Image) -> bool {
        let Some(color) = &self.color else {
            return true;
        };
        image
            .colors()
            .iter()
            .any(|c| normalize_hex(c).as_ref() == Some(color))
    }

    /// Keep only matching images, preserving order
    pub fn apply(&self, images: Vec<Image>) -> Vec<Image> {
        if self.is_empty() {
            return images;
        }
        images.into_iter().filter(|img| self.matches(img)).collect()
    }
}
