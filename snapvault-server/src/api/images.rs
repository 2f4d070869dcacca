//! Gallery CRUD and queries
//!
//! `GET /api/images` resolves its query parameters in this order:
//! `id` (single image), `similarTo` (ranked similar images), then the
//! `q` / `color` filters combined.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use snapvault_common::models::{Image, NewImage};
use snapvault_common::search::{GalleryQuery, SearchFilter};
use snapvault_common::similarity::rank_similar;
use tracing::info;

use super::{ApiJson, ApiQuery};
use crate::auth::AuthUser;
use crate::db::images;
use crate::{ApiError, ApiResult, AppState};

/// POST /api/images body
#[derive(Debug, Deserialize)]
pub struct CreateImageRequest {
    pub filename: Option<String>,
    pub original_path: Option<String>,
    pub thumbnail_path: Option<String>,
}

/// PATCH /api/images body
#[derive(Debug, Deserialize)]
pub struct UpdateImageRequest {
    pub id: Option<i64>,
    #[serde(alias = "name")]
    pub filename: Option<String>,
    pub description: Option<String>,
}

/// DELETE /api/images body
#[derive(Debug, Deserialize)]
pub struct DeleteImageRequest {
    pub id: Option<i64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn image_not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Image {} not found", id))
}

/// GET /api/images
pub async fn list_images(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<GalleryQuery>,
) -> ApiResult<Response> {
    if let Some(id) = query.id {
        let image = images::get_image(&state.db, &user.id, id)
            .await?
            .ok_or_else(|| image_not_found(id))?;
        return Ok(Json(vec![image]).into_response());
    }

    let gallery = images::list_images(&state.db, &user.id).await?;

    if let Some(target_id) = query.similar_to {
        let target = gallery
            .iter()
            .find(|image| image.id == target_id)
            .cloned()
            .ok_or_else(|| image_not_found(target_id))?;
        return Ok(Json(rank_similar(&target, gallery)).into_response());
    }

    let filter = SearchFilter::from_query(&query);
    Ok(Json(filter.apply(gallery)).into_response())
}

/// POST /api/images
pub async fn create_image(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<CreateImageRequest>,
) -> ApiResult<Json<Image>> {
    let (Some(filename), Some(original_path)) =
        (non_blank(request.filename), non_blank(request.original_path))
    else {
        return Err(ApiError::BadRequest(
            "Missing required fields: filename and original_path".to_string(),
        ));
    };

    let image = images::insert_image(
        &state.db,
        &user.id,
        &NewImage {
            filename,
            original_path,
            thumbnail_path: non_blank(request.thumbnail_path),
        },
    )
    .await?;

    info!(image_id = image.id, user_id = %user.id, "Image registered");
    Ok(Json(image))
}

/// PATCH /api/images
pub async fn update_image(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<UpdateImageRequest>,
) -> ApiResult<Json<Image>> {
    let id = request
        .id
        .ok_or_else(|| ApiError::BadRequest("Image id is required".to_string()))?;

    let image = images::update_image(
        &state.db,
        &user.id,
        id,
        non_blank(request.filename).as_deref(),
        request.description.as_deref(),
    )
    .await?
    .ok_or_else(|| image_not_found(id))?;

    Ok(Json(image))
}

/// DELETE /api/images
pub async fn delete_image(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<DeleteImageRequest>,
) -> ApiResult<Json<Vec<Image>>> {
    let id = request
        .id
        .ok_or_else(|| ApiError::BadRequest("Image id is required".to_string()))?;

    let image = images::delete_image(&state.db, &user.id, id)
        .await?
        .ok_or_else(|| image_not_found(id))?;

    if let Some(media) = &state.media {
        media.remove_files(&image).await;
    }

    info!(image_id = id, user_id = %user.id, "Image deleted");
    Ok(Json(vec![image]))
}

/// Build gallery routes (authenticated)
pub fn image_routes() -> Router<AppState> {
    Router::new().route(
        "/api/images",
        get(list_images)
            .post(create_image)
            .patch(update_image)
            .delete(delete_image),
    )
}
