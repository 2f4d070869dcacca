//! Configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Environment variables (highest priority)
//! 2. TOML config file
//! 3. Compiled defaults (fallback)
//!
//! The binary applies its command-line overrides on top of the result.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SNAPVAULT_CONFIG";

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub analysis: AnalysisSettings,
    pub bedrock: BedrockSettings,
    pub openai: OpenAiSettings,
    pub fastapi: FastApiSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    /// SQLite database file
    pub database: PathBuf,
    /// "production" hides diagnostics and debug fields
    pub environment: String,
    /// Overrides the environment-derived default when set
    pub diagnostics: Option<bool>,
    /// Local media directory; uploads are disabled when unset
    pub media_dir: Option<PathBuf>,
    /// Prefix for public media URLs
    pub public_base_url: String,
    pub max_upload_bytes: usize,
    pub max_fetch_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5800".to_string(),
            database: PathBuf::from("snapvault.db"),
            environment: "development".to_string(),
            diagnostics: None,
            media_dir: None,
            public_base_url: "http://127.0.0.1:5800".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            max_fetch_bytes: 15 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// HS256 secret shared with the token issuer
    pub jwt_secret: String,
    /// Expected `aud` claim; audience is not checked when unset
    pub jwt_audience: Option<String>,
}

/// Which service produces tags and colors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelerKind {
    #[default]
    Rekognition,
    OpenaiVision,
}

impl FromStr for LabelerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rekognition" => Ok(LabelerKind::Rekognition),
            "openai-vision" | "openai" => Ok(LabelerKind::OpenaiVision),
            other => Err(Error::Config(format!("Unknown labeler: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Analyses a user may start per rolling 24 hours; 0 disables the cap
    pub daily_cap: u32,
    pub labeler: LabelerKind,
    pub aws_region: Option<String>,
    pub max_labels: usize,
    pub min_confidence: f32,
    pub include_parent_tags: bool,
    pub ocr_enabled: bool,
    pub ocr_max_words: usize,
    pub exclude_person: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            daily_cap: 200,
            labeler: LabelerKind::Rekognition,
            aws_region: None,
            max_labels: 10,
            min_confidence: 80.0,
            include_parent_tags: true,
            ocr_enabled: true,
            ocr_max_words: 6,
            exclude_person: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BedrockSettings {
    pub enabled: bool,
    pub model_id: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for BedrockSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model_id: "amazon.titan-text-express-v1".to_string(),
            max_tokens: 60,
            timeout_ms: 7000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub vision_model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            vision_model: "gpt-4o-mini".to_string(),
            max_tokens: 120,
            timeout_ms: 8000,
        }
    }
}

impl OpenAiSettings {
    /// Enabled and holding a non-blank key
    pub fn is_usable(&self) -> bool {
        self.enabled && self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastApiSettings {
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for FastApiSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 8000,
        }
    }
}

/// Parse a boolean flag; accepts `true`/`1` (case-insensitive), everything else is false
pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1")
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{} must be a number, got {:?}", name, value)))
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl Settings {
    /// Parse settings from TOML text; missing keys take defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Load settings: TOML file (if found), then environment, then validate
    pub fn load(cli_config: Option<&Path>) -> Result<Self> {
        let mut settings = match resolve_config_path(cli_config, |k| std::env::var(k).ok()) {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                info!(path = %path.display(), "Loaded config file");
                Self::from_toml_str(&content)?
            }
            Some(path) => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        settings.apply_env(|k| std::env::var(k).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay values from environment variables.
    ///
    /// `get` looks up a variable by name; the process environment in
    /// production, a map in tests.
    pub fn apply_env<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Service
        if let Some(v) = get("SNAPVAULT_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = get("SNAPVAULT_DATABASE") {
            self.server.database = PathBuf::from(v);
        }
        if let Some(v) = get("SNAPVAULT_ENV") {
            self.server.environment = v;
        }
        if let Some(v) = get("SNAPVAULT_DIAGNOSTICS") {
            self.server.diagnostics = Some(parse_flag(&v));
        }
        if let Some(v) = get("SNAPVAULT_MEDIA_DIR") {
            self.server.media_dir = non_blank(v).map(PathBuf::from);
        }
        if let Some(v) = get("SNAPVAULT_PUBLIC_BASE_URL") {
            self.server.public_base_url = v;
        }
        if let Some(v) = get("SNAPVAULT_JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = get("SNAPVAULT_JWT_AUDIENCE") {
            self.auth.jwt_audience = non_blank(v);
        }

        // Analysis
        if let Some(v) = get("ANALYSIS_DAILY_CAP") {
            self.analysis.daily_cap = parse_number("ANALYSIS_DAILY_CAP", &v)?;
        }
        if let Some(v) = get("AI_TAGS_PROVIDER") {
            self.analysis.labeler = v.parse()?;
        }
        if let Some(v) = get("AWS_REGION") {
            self.analysis.aws_region = non_blank(v);
        }
        if let Some(v) = get("AI_MAX_LABELS") {
            self.analysis.max_labels = parse_number("AI_MAX_LABELS", &v)?;
        }
        if let Some(v) = get("AI_MIN_CONFIDENCE") {
            self.analysis.min_confidence = parse_number("AI_MIN_CONFIDENCE", &v)?;
        }
        if let Some(v) = get("AI_INCLUDE_PARENT_TAGS") {
            self.analysis.include_parent_tags = parse_flag(&v);
        }
        if let Some(v) = get("AI_OCR_ENABLED") {
            self.analysis.ocr_enabled = parse_flag(&v);
        }
        if let Some(v) = get("AI_OCR_MAX_WORDS") {
            self.analysis.ocr_max_words = parse_number("AI_OCR_MAX_WORDS", &v)?;
        }
        if let Some(v) = get("AI_EXCLUDE_PERSON_FROM_TAGS") {
            self.analysis.exclude_person = parse_flag(&v);
        }

        // Bedrock
        if let Some(v) = get("BEDROCK_ENABLED") {
            self.bedrock.enabled = parse_flag(&v);
        }
        if let Some(v) = get("BEDROCK_MODEL_ID") {
            if let Some(v) = non_blank(v) {
                self.bedrock.model_id = v;
            }
        }
        if let Some(v) = get("BEDROCK_MAX_TOKENS") {
            self.bedrock.max_tokens = parse_number("BEDROCK_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("BEDROCK_TIMEOUT_MS") {
            self.bedrock.timeout_ms = parse_number("BEDROCK_TIMEOUT_MS", &v)?;
        }

        // OpenAI
        if let Some(v) = get("OPENAI_ENABLED") {
            self.openai.enabled = parse_flag(&v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai.api_key = non_blank(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            if let Some(v) = non_blank(v) {
                self.openai.model = v;
            }
        }
        if let Some(v) = get("OPENAI_VISION_MODEL") {
            if let Some(v) = non_blank(v) {
                self.openai.vision_model = v;
            }
        }
        if let Some(v) = get("OPENAI_MAX_TOKENS") {
            self.openai.max_tokens = parse_number("OPENAI_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("OPENAI_TIMEOUT_MS") {
            self.openai.timeout_ms = parse_number("OPENAI_TIMEOUT_MS", &v)?;
        }

        // Description microservice
        if let Some(v) = get("HF_FASTAPI_URL") {
            self.fastapi.url = non_blank(v);
        }
        if let Some(v) = get("HF_FASTAPI_TIMEOUT_MS") {
            self.fastapi.timeout_ms = parse_number("HF_FASTAPI_TIMEOUT_MS", &v)?;
        }

        Ok(())
    }

    /// Reject configurations the server cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(Error::Config(
                "JWT secret is empty (set SNAPVAULT_JWT_SECRET or auth.jwt_secret)".to_string(),
            ));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(Error::Config("server.max_upload_bytes must be > 0".to_string()));
        }
        if self.server.max_fetch_bytes == 0 {
            return Err(Error::Config("server.max_fetch_bytes must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.environment.eq_ignore_ascii_case("production")
    }

    /// Diagnostic routes default to on outside production
    pub fn diagnostics_enabled(&self) -> bool {
        self.server.diagnostics.unwrap_or(!self.is_production())
    }
}

/// Locate the config file: CLI argument, then `SNAPVAULT_CONFIG`, then the
/// per-user config directory.
pub fn resolve_config_path<F>(cli_arg: Option<&Path>, get: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Some(path) = get(CONFIG_PATH_ENV).and_then(non_blank) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir().map(|d| d.join("snapvault").join("config.toml"))
}
