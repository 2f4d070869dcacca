//! AI analysis endpoint
//!
//! `POST /api/analyze-image` runs the labeler and description chain once per
//! image. Completed results are returned as stored, in-flight analyses answer
//! 202, and failed ones may be retried.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use snapvault_common::models::{ImageMetadata, ProcessingStatus};
use snapvault_common::time;
use tracing::{error, info, warn};

use super::ApiJson;
use crate::ai::DescriptionSource;
use crate::auth::AuthUser;
use crate::db::images;
use crate::db::metadata::{self, DailyCap, StartOutcome};
use crate::{ApiError, ApiResult, AppState};

/// POST /api/analyze-image body
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub image_id: Option<i64>,
    pub image_url: Option<String>,
}

/// Provider switches echoed back outside production
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFlags {
    pub bedrock_enabled: bool,
    pub openai_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub metadata: ImageMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProcessingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<DescriptionSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<ProviderFlags>,
}

impl AnalyzeResponse {
    fn stored(metadata: ImageMetadata) -> Response {
        let status = metadata.ai_processing_status;
        let completed = status == ProcessingStatus::Completed;
        let body = AnalyzeResponse {
            success: true,
            status: (!completed).then_some(status),
            metadata,
            provider: None,
            debug: None,
        };
        if completed {
            Json(body).into_response()
        } else {
            (StatusCode::ACCEPTED, Json(body)).into_response()
        }
    }
}

/// Existing result to answer with instead of starting a new analysis
fn short_circuit(metadata: &ImageMetadata) -> bool {
    matches!(
        metadata.ai_processing_status,
        ProcessingStatus::Completed | ProcessingStatus::Processing
    )
}

/// POST /api/analyze-image
pub async fn analyze_image(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<AnalyzeRequest>,
) -> ApiResult<Response> {
    let image_url = request.image_url.filter(|u| !u.trim().is_empty());
    let (Some(image_id), Some(image_url)) = (request.image_id, image_url) else {
        return Err(ApiError::BadRequest(
            "image_id and image_url are required".to_string(),
        ));
    };

    let image = images::get_image(&state.db, &user.id, image_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Image {} not found", image_id)))?;

    if let Some(existing) = image.metadata.filter(short_circuit) {
        return Ok(AnalyzeResponse::stored(existing));
    }

    let now = time::now();
    let daily_cap = state.settings.analysis.daily_cap;
    let cap = (daily_cap > 0).then(|| DailyCap {
        since: time::day_window_start(now),
        limit: daily_cap as i64,
    });

    match metadata::begin_processing(&state.db, &user.id, image_id, now, cap).await? {
        StartOutcome::Started => {}
        StartOutcome::CapReached => {
            warn!(user_id = %user.id, daily_cap, "Daily analysis cap reached");
            return Err(ApiError::RateLimited);
        }
        StartOutcome::Busy => {
            // Lost the race to a concurrent request
            let current = metadata::get_metadata(&state.db, &user.id, image_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("Image {} not found", image_id)))?;
            return Ok(AnalyzeResponse::stored(current));
        }
    }

    info!(
        image_id,
        user_id = %user.id,
        labeler = state.pipeline.labeler_name(),
        "Analysis started"
    );

    // The row is `processing` now; the task finishes it even if the caller disconnects
    let task = tokio::spawn(run_analysis(state.clone(), user.id.clone(), image_id, image_url));
    let (saved, provider) = match task.await {
        Ok(result) => result?,
        Err(e) => {
            error!(image_id, error = %e, "Analysis task aborted");
            release(&state, &user.id, image_id).await;
            return Err(ApiError::Internal("Analysis task aborted".to_string()));
        }
    };

    let debug = (!state.settings.is_production()).then_some(ProviderFlags {
        bedrock_enabled: state.settings.bedrock.enabled,
        openai_enabled: state.settings.openai.enabled,
    });

    Ok(Json(AnalyzeResponse {
        success: true,
        metadata: saved,
        status: None,
        provider: Some(provider),
        debug,
    })
    .into_response())
}

/// Label, describe and store; leaves the row `completed` or `failed`
async fn run_analysis(
    state: AppState,
    user_id: String,
    image_id: i64,
    image_url: String,
) -> ApiResult<(ImageMetadata, DescriptionSource)> {
    let outcome = match state.pipeline.analyze(&image_url).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(image_id, error = %e, "Image labeling failed");
            release(&state, &user_id, image_id).await;
            return Err(ApiError::AnalysisFailed {
                details: e.to_string(),
            });
        }
    };

    let saved = metadata::complete_analysis(
        &state.db,
        &user_id,
        image_id,
        &outcome.description,
        &outcome.tags,
        &outcome.colors,
        outcome.provider.as_str(),
    )
    .await;

    let saved = match saved {
        Ok(saved) => saved,
        Err(e) => {
            error!(image_id, error = %e, "Failed to save analysis results");
            release(&state, &user_id, image_id).await;
            return Err(ApiError::Internal("Failed to save analysis results".to_string()));
        }
    };

    info!(
        image_id,
        provider = %outcome.provider,
        tags = saved.tags.len(),
        "Analysis completed"
    );

    Ok((saved, outcome.provider))
}

/// Mark a processing row failed so it can be retried
async fn release(state: &AppState, user_id: &str, image_id: i64) {
    if let Err(e) = metadata::mark_failed(&state.db, user_id, image_id).await {
        error!(image_id, error = %e, "Failed to mark analysis as failed");
    }
}

/// Build analysis routes (authenticated)
pub fn analyze_routes() -> Router<AppState> {
    Router::new().route("/api/analyze-image", post(analyze_image))
}
