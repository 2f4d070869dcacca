//! Provider diagnostics
//!
//! Unauthenticated round-trip checks against each AI provider. Mounted only
//! when diagnostics are enabled (by default everywhere but production).
//! Bodies mirror what each provider returned so misconfiguration is visible.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use snapvault_common::config::Settings;
use snapvault_common::time::with_timeout;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::ai::bedrock::{BedrockClient, ModelFamily};
use crate::ai::fastapi::{parse_tags_param, FastApiClient};
use crate::ai::openai::{ChatMessage, OpenAiClient};
use crate::ai::ProviderError;
use crate::AppState;

const BEDROCK_PROMPT: &str = "Say hello in one word.";
const BEDROCK_MAX_TOKENS: u32 = 50;
const OPENAI_PROMPT: &str = "Reply with the single word: OK";

/// Clients used by the diagnostic routes
pub struct Diagnostics {
    bedrock: Option<BedrockClient>,
    bedrock_model: String,
    bedrock_timeout_ms: u64,
    openai: OpenAiClient,
    openai_enabled: bool,
    openai_model: String,
    production: bool,
    fastapi: FastApiClient,
}

impl Diagnostics {
    /// `bedrock` is None when no AWS configuration is available
    pub fn new(settings: &Settings, bedrock: Option<BedrockClient>) -> Result<Self, ProviderError> {
        Ok(Self {
            bedrock,
            bedrock_model: settings.bedrock.model_id.clone(),
            bedrock_timeout_ms: settings.bedrock.timeout_ms,
            openai: OpenAiClient::new(&settings.openai)?,
            openai_enabled: settings.openai.enabled,
            openai_model: settings.openai.model.clone(),
            production: settings.is_production(),
            fastapi: FastApiClient::new(&settings.fastapi)?,
        })
    }
}

fn diagnostics(state: &AppState) -> Result<Arc<Diagnostics>, Response> {
    state.diagnostics.clone().ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Diagnostics are disabled" })),
        )
            .into_response()
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct TestBedrockRequest {
    pub model_id: Option<String>,
}

/// POST /api/test-bedrock
pub async fn test_bedrock(
    State(state): State<AppState>,
    body: Option<Json<TestBedrockRequest>>,
) -> Response {
    let diag = match diagnostics(&state) {
        Ok(diag) => diag,
        Err(response) => return response,
    };

    let model = body
        .and_then(|Json(b)| b.model_id)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| diag.bedrock_model.clone());

    let Some(client) = diag.bedrock.as_ref() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "region": null,
                "expectedResourceArn": null,
                "error": "NotConfigured",
                "message": "AWS configuration is not available",
            })),
        )
            .into_response();
    };

    let region = client.region().unwrap_or("us-east-1").to_string();
    let payload =
        ModelFamily::from_model_id(&model).build_payload(BEDROCK_PROMPT, BEDROCK_MAX_TOKENS);
    info!(model = %model, region = %region, "Testing Bedrock");

    let invoke = client.invoke(&model, &payload);
    let result = match with_timeout(diag.bedrock_timeout_ms, invoke).await {
        Ok(result) => result,
        Err(timeout) => Err(ProviderError::from(timeout)),
    };

    let resource_arn = format!("arn:aws:bedrock:{}::foundation-model/{}", region, model);
    match result {
        Ok(response) => Json(json!({
            "success": true,
            "model": model,
            "region": region,
            "expectedResourceArn": resource_arn,
            "response": response,
        }))
        .into_response(),
        Err(e) => {
            warn!(model = %model, error = %e, "Bedrock test failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "region": region,
                    "expectedResourceArn": null,
                    "error": "BedrockError",
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/test-openai
pub async fn test_openai(State(state): State<AppState>) -> Response {
    let diag = match diagnostics(&state) {
        Ok(diag) => diag,
        Err(response) => return response,
    };

    if diag.production {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Not available in production" })),
        )
            .into_response();
    }
    if !diag.openai_enabled {
        return Json(json!({ "ok": true, "openaiEnabled": false })).into_response();
    }
    if !diag.openai.has_key() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "OPENAI_API_KEY is not set" })),
        )
            .into_response();
    }

    let messages = [ChatMessage::text("user", OPENAI_PROMPT)];
    match diag.openai.chat(&diag.openai_model, &messages, Some(2), Some(0.0)).await {
        Ok(completion) => Json(json!({
            "ok": true,
            "model": diag.openai_model,
            "reply": completion.text(),
            "finish_reason": completion.finish_reason(),
            "usage": completion.usage,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "OpenAI test failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TestRekognitionRequest {
    pub image_url: Option<String>,
}

/// POST /api/test-rekognition
///
/// Runs the configured labeler, whichever it is.
pub async fn test_rekognition(
    State(state): State<AppState>,
    body: Option<Json<TestRekognitionRequest>>,
) -> Response {
    let image_url = body
        .and_then(|Json(b)| b.image_url)
        .filter(|u| !u.trim().is_empty());

    let Some(image_url) = image_url else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "image_url required" })),
        )
            .into_response();
    };

    info!(image_url = %image_url, labeler = state.pipeline.labeler_name(), "Testing labeler");

    match state.pipeline.label_url(&image_url).await {
        Ok(labels) => Json(json!({
            "success": true,
            "tags": labels.tags,
            "colors": labels.colors,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Labeler test failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Test failed", "details": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TestFastApiQuery {
    pub tags: Option<String>,
}

/// GET /api/test-fastapi
pub async fn test_fastapi(
    State(state): State<AppState>,
    Query(query): Query<TestFastApiQuery>,
) -> Response {
    let diag = match diagnostics(&state) {
        Ok(diag) => diag,
        Err(response) => return response,
    };

    if !diag.fastapi.is_configured() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "HF_FASTAPI_URL not set" })),
        )
            .into_response();
    }

    let tags = parse_tags_param(query.tags.as_deref());
    let started = Instant::now();

    match diag.fastapi.describe(&tags).await {
        Ok(reply) => {
            let status = if reply.ok {
                StatusCode::OK
            } else {
                StatusCode::BAD_GATEWAY
            };
            (
                status,
                Json(json!({
                    "ok": reply.ok,
                    "status": reply.status,
                    "elapsedMs": reply.elapsed_ms,
                    "response": reply.response,
                })),
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "FastAPI test failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "ok": false,
                    "error": e.to_string(),
                    "elapsedMs": started.elapsed().as_millis() as u64,
                })),
            )
                .into_response()
        }
    }
}

/// Build diagnostic routes (unauthenticated)
pub fn diagnostic_routes() -> Router<AppState> {
    Router::new()
        .route("/api/test-bedrock", post(test_bedrock))
        .route("/api/test-openai", get(test_openai))
        .route("/api/test-rekognition", post(test_rekognition))
        .route("/api/test-fastapi", get(test_fastapi))
}
