//! Tag and color extraction from labeler output
//!
//! Provider-independent: the Rekognition and OpenAI Vision labelers convert
//! their responses into these inputs and share the filtering rules.

use once_cell::sync::Lazy;
use regex::Regex;
use snapvault_common::config::AnalysisSettings;
use std::collections::HashSet;

/// Plausible OCR word: starts alphanumeric, 2-31 characters
static OCR_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-&+.]{1,30}$").expect("valid OCR regex"));

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#[0-9a-fA-F]{6}").expect("valid hex regex"));

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["']([^"']+)["']"#).expect("valid quoted-word regex"));

/// Most tags a vision model reply may contribute
pub const MAX_VISION_TAGS: usize = 15;
/// Colors kept per image
pub const MAX_COLORS: usize = 3;

/// One detected label
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedLabel {
    pub name: String,
    pub confidence: f32,
    pub parents: Vec<String>,
}

/// One OCR detection
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedText {
    pub text: String,
    pub confidence: f32,
    /// WORD detections only; LINE detections are ignored
    pub is_word: bool,
}

/// One dominant color sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSample {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub pixel_percent: f32,
}

/// Map label synonyms onto the gallery's tag vocabulary
pub fn normalize_tag(name: &str) -> String {
    let trimmed = name.trim();
    match trimmed.to_lowercase().as_str() {
        "dish" | "meal" | "cuisine" => "Food".to_string(),
        "tableware" => "Utensils".to_string(),
        "human" => "Person".to_string(),
        _ => trimmed.to_string(),
    }
}

/// Confident, plausible OCR words, deduplicated and capped
pub fn ocr_words(
    detections: &[DetectedText],
    min_confidence: f32,
    max_words: usize,
) -> Vec<String> {
    let mut seen = HashSet::new();
    detections
        .iter()
        .filter(|d| d.is_word && d.confidence >= min_confidence)
        .map(|d| d.text.trim())
        .filter(|w| OCR_WORD.is_match(w))
        .filter(|w| seen.insert(w.to_string()))
        .take(max_words)
        .map(str::to_string)
        .collect()
}

/// Build the tag list from labels (plus parents) and OCR words.
///
/// First-seen order is kept, duplicates dropped, `Person` removed when
/// configured, and the result truncated to `max_labels`.
pub fn collect_tags(
    labels: &[DetectedLabel],
    words: &[String],
    settings: &AnalysisSettings,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    let mut push = |tag: String| {
        if !tag.is_empty() && seen.insert(tag.clone()) {
            tags.push(tag);
        }
    };

    for label in labels.iter().filter(|l| l.confidence >= settings.min_confidence) {
        push(normalize_tag(&label.name));
        if settings.include_parent_tags {
            for parent in &label.parents {
                push(normalize_tag(parent));
            }
        }
    }
    for word in words {
        push(word.clone());
    }

    tags.into_iter()
        .filter(|t| !(settings.exclude_person && t.eq_ignore_ascii_case("person")))
        .take(settings.max_labels)
        .collect()
}

/// Lowercase `#rrggbb`
pub fn rgb_to_hex(red: u8, green: u8, blue: u8) -> String {
    format!("#{:02x}{:02x}{:02x}", red, green, blue)
}

fn channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Most prevalent colors first, deduplicated, at most [`MAX_COLORS`]
pub fn dominant_colors(samples: &[ColorSample]) -> Vec<String> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| b.pixel_percent.total_cmp(&a.pixel_percent));

    let mut seen = HashSet::new();
    sorted
        .iter()
        .map(|c| rgb_to_hex(channel(c.red), channel(c.green), channel(c.blue)))
        .filter(|hex| seen.insert(hex.clone()))
        .take(MAX_COLORS)
        .collect()
}

/// Drop a surrounding Markdown code fence, if any
fn strip_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Tags from a vision model reply: a JSON string array, else quoted words
pub fn parse_tag_reply(content: &str) -> Vec<String> {
    let body = strip_fence(content);
    let tags: Vec<String> = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Ok(_) => Vec::new(),
        Err(_) => QUOTED
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    };
    tags.into_iter().take(MAX_VISION_TAGS).collect()
}

/// Colors from a vision model reply: a JSON array, else any `#rrggbb` found
pub fn parse_color_reply(content: &str) -> Vec<String> {
    let body = strip_fence(content);
    let candidates: Vec<String> = match serde_json::from_str::<Vec<String>>(body) {
        Ok(items) => items,
        Err(_) => HEX_COLOR
            .find_iter(body)
            .map(|m| m.as_str().to_string())
            .collect(),
    };
    candidates
        .into_iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| c.len() == 7 && HEX_COLOR.is_match(c))
        .take(MAX_COLORS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(name: &str, confidence: f32, parents: &[&str]) -> DetectedLabel {
        DetectedLabel {
            name: name.to_string(),
            confidence,
            parents: parents.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn word(text: &str, confidence: f32) -> DetectedText {
        DetectedText {
            text: text.to_string(),
            confidence,
            is_word: true,
        }
    }

    #[test]
    fn test_normalize_tag_synonyms() {
        assert_eq!(normalize_tag("Dish"), "Food");
        assert_eq!(normalize_tag(" cuisine "), "Food");
        assert_eq!(normalize_tag("Tableware"), "Utensils");
        assert_eq!(normalize_tag("Human"), "Person");
        assert_eq!(normalize_tag(" Beach "), "Beach");
    }

    #[test]
    fn test_ocr_words_filters_noise() {
        let detections = vec![
            word("OPEN", 99.0),
            word("7-Eleven", 95.0),
            word("x", 99.0),      // too short
            word("#sale", 99.0),  // bad first char
            word("blurry", 40.0), // low confidence
            word("OPEN", 98.0),   // duplicate
            DetectedText {
                text: "Whole line".to_string(),
                confidence: 99.0,
                is_word: false,
            },
            word("Cafe", 90.0),
        ];
        assert_eq!(ocr_words(&detections, 80.0, 6), vec!["OPEN", "7-Eleven", "Cafe"]);
        assert_eq!(ocr_words(&detections, 80.0, 1), vec!["OPEN"]);
    }

    #[test]
    fn test_collect_tags_with_parents_and_ocr() {
        let settings = AnalysisSettings::default();
        let labels = vec![
            label("Dish", 95.0, &["Food"]),
            label("Pizza", 92.0, &["Food", "Dish"]),
            label("Table", 60.0, &["Furniture"]),
            label("Human", 90.0, &[]),
        ];
        let words = vec!["Menu".to_string()];
        assert_eq!(
            collect_tags(&labels, &words, &settings),
            vec!["Food", "Pizza", "Person", "Menu"]
        );
    }

    #[test]
    fn test_collect_tags_respects_flags_and_cap() {
        let settings = AnalysisSettings {
            include_parent_tags: false,
            exclude_person: true,
            max_labels: 2,
            ..AnalysisSettings::default()
        };
        let labels = vec![
            label("Person", 99.0, &["Human"]),
            label("Beach", 98.0, &["Outdoors"]),
            label("Ocean", 97.0, &["Water"]),
            label("Sand", 96.0, &[]),
        ];
        assert_eq!(collect_tags(&labels, &[], &settings), vec!["Beach", "Ocean"]);
    }

    #[test]
    fn test_rgb_to_hex_pads_channels() {
        assert_eq!(rgb_to_hex(0, 10, 255), "#000aff");
    }

    fn sample(red: f32, green: f32, blue: f32, pixel_percent: f32) -> ColorSample {
        ColorSample {
            red,
            green,
            blue,
            pixel_percent,
        }
    }

    #[test]
    fn test_dominant_colors_sorted_deduped_capped() {
        let samples = vec![
            sample(10.4, 10.0, 10.0, 5.0),
            sample(255.0, 255.0, 255.0, 40.0),
            sample(10.0, 10.2, 9.6, 30.0),
            sample(200.0, 0.0, 0.0, 20.0),
            sample(0.0, 0.0, 200.0, 10.0),
        ];
        assert_eq!(dominant_colors(&samples), vec!["#ffffff", "#0a0a0a", "#c80000"]);
        assert!(dominant_colors(&[]).is_empty());
    }

    #[test]
    fn test_parse_tag_reply_json_and_fallback() {
        assert_eq!(parse_tag_reply(r#"["beach", "sunset", 3]"#), vec!["beach", "sunset"]);
        assert_eq!(
            parse_tag_reply("```json\n[\"dog\", \"park\"]\n```"),
            vec!["dog", "park"]
        );
        assert_eq!(
            parse_tag_reply(r#"Tags: "dog", 'grass', and "ball""#),
            vec!["dog", "grass", "ball"]
        );
        assert!(parse_tag_reply(r#"{"tags": []}"#).is_empty());

        let many: Vec<String> = (0..20).map(|i| format!("\"t{}\"", i)).collect();
        assert_eq!(parse_tag_reply(&format!("[{}]", many.join(","))).len(), MAX_VISION_TAGS);
    }

    #[test]
    fn test_parse_color_reply_json_and_fallback() {
        assert_eq!(
            parse_color_reply(r##"["#FF5733", "#33c1ff", "#2d5016", "#000000"]"##),
            vec!["#ff5733", "#33c1ff", "#2d5016"]
        );
        assert_eq!(
            parse_color_reply("The colors are #AABBCC and #112233."),
            vec!["#aabbcc", "#112233"]
        );
        assert_eq!(parse_color_reply(r##"["red", "#123456"]"##), vec!["#123456"]);
    }
}
